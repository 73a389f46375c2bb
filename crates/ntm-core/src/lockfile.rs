//! A generic, per-session pidfile. The resilience monitor uses one instance
//! per session (`.ntm/pids/monitor-<session>.pid`) so a second monitor for
//! the same session refuses to start, and a crashed monitor's stale pidfile
//! is detected and cleaned up automatically. Grounded on the teacher
//! project's own daemon lockfile (single-daemon-per-host); generalized here
//! to be keyed per session rather than per host.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidLock {
    pub pid: u32,
    pub session: String,
    pub started_at: String,
}

#[derive(Debug)]
pub enum AcquireResult {
    Acquired,
    AlreadyRunning(PidLock),
    StaleRemoved,
}

impl PidLock {
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            pid: std::process::id(),
            session: session.into(),
            started_at: Utc::now().to_rfc3339(),
        }
    }

    /// Attempt to acquire the lock at `path`. If a lockfile already exists
    /// for a live process, returns `AlreadyRunning`. If it exists but the
    /// owning pid is dead, removes it and retries once.
    pub fn acquire(&self, path: &Path) -> std::io::Result<AcquireResult> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let body = serde_json::to_vec_pretty(self)
                    .unwrap_or_else(|_| b"{}".to_vec());
                file.write_all(&body)?;
                Ok(AcquireResult::Acquired)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                match Self::read(path) {
                    Some(existing) if Self::pid_alive(existing.pid) => {
                        Ok(AcquireResult::AlreadyRunning(existing))
                    }
                    _ => {
                        std::fs::remove_file(path)?;
                        self.acquire(path)?;
                        Ok(AcquireResult::StaleRemoved)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    pub fn read(path: &Path) -> Option<PidLock> {
        let body = std::fs::read(path).ok()?;
        serde_json::from_slice(&body).ok()
    }

    pub fn remove(path: &Path) {
        let _ = std::fs::remove_file(path);
    }

    #[cfg(unix)]
    fn pid_alive(pid: u32) -> bool {
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }

    #[cfg(not(unix))]
    fn pid_alive(_pid: u32) -> bool {
        true
    }
}

/// `<project>/.ntm/pids/monitor-<session>.pid`.
pub fn monitor_pid_path(project_dir: &Path, session: &str) -> PathBuf {
    project_dir.join(".ntm").join("pids").join(format!("monitor-{session}.pid"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_fresh_lock_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor-demo.pid");
        let lock = PidLock::new("demo");
        let result = lock.acquire(&path).unwrap();
        assert!(matches!(result, AcquireResult::Acquired));
    }

    #[test]
    fn acquire_against_live_pid_reports_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor-demo.pid");
        let mine = PidLock::new("demo");
        mine.acquire(&path).unwrap();

        let other = PidLock::new("demo");
        let result = other.acquire(&path).unwrap();
        match result {
            AcquireResult::AlreadyRunning(existing) => assert_eq!(existing.pid, mine.pid),
            _ => panic!("expected AlreadyRunning"),
        }
    }

    #[test]
    fn acquire_against_stale_pid_removes_and_retries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor-demo.pid");
        let stale = PidLock { pid: 999_999, session: "demo".into(), started_at: Utc::now().to_rfc3339() };
        std::fs::write(&path, serde_json::to_vec(&stale).unwrap()).unwrap();

        let mine = PidLock::new("demo");
        let result = mine.acquire(&path).unwrap();
        assert!(matches!(result, AcquireResult::StaleRemoved));
    }

    #[test]
    fn remove_then_read_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor-demo.pid");
        PidLock::new("demo").acquire(&path).unwrap();
        PidLock::remove(&path);
        assert!(PidLock::read(&path).is_none());
    }
}
