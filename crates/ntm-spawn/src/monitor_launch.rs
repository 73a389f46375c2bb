//! Resilience monitor launch (§4.4 step 9): abstracted behind a trait so the
//! spawn engine's barrier logic can be exercised in tests without spawning a
//! real OS process. Grounded on the teacher daemon's own
//! spawn-then-lockfile pattern (`at-daemon::main`), adapted from "the
//! daemon IS the long-running process" to "the spawn engine launches a
//! detached child and moves on".

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, SpawnError};

#[async_trait]
pub trait MonitorLauncher: Send + Sync {
    /// Launch the resilience monitor for `session`, redirecting its
    /// stdout/stderr to `log_path`. Returns the monitor's pid.
    async fn launch(&self, session: &str, project_dir: &Path, log_path: &Path) -> Result<u32>;
}

/// Spawns `ntm-monitor <session> --project-dir <dir>` as a detached child,
/// logging to `log_path`.
pub struct ProcessMonitorLauncher {
    binary: String,
}

impl Default for ProcessMonitorLauncher {
    fn default() -> Self {
        Self { binary: "ntm-monitor".to_string() }
    }
}

impl ProcessMonitorLauncher {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl MonitorLauncher for ProcessMonitorLauncher {
    async fn launch(&self, session: &str, project_dir: &Path, log_path: &Path) -> Result<u32> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let log_out = OpenOptions::new().create(true).append(true).open(log_path)?;
        let log_err = log_out.try_clone()?;

        let child = Command::new(&self.binary)
            .arg(session)
            .arg("--project-dir")
            .arg(project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_out))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|e| SpawnError::Io(e))?;

        Ok(child.id())
    }
}

/// Records launch calls instead of spawning a real process.
#[derive(Default)]
pub struct FakeMonitorLauncher {
    calls: Mutex<Vec<(String, PathBuf)>>,
}

impl FakeMonitorLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(String, PathBuf)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl MonitorLauncher for FakeMonitorLauncher {
    async fn launch(&self, session: &str, project_dir: &Path, _log_path: &Path) -> Result<u32> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push((session.to_string(), project_dir.to_path_buf()));
        Ok(4242)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_launcher_records_calls() {
        let launcher = FakeMonitorLauncher::new();
        let pid = launcher.launch("proj", Path::new("/tmp/proj"), Path::new("/tmp/proj/monitor.log")).await.unwrap();
        assert_eq!(pid, 4242);
        assert_eq!(launcher.calls().len(), 1);
        assert_eq!(launcher.calls()[0].0, "proj");
    }
}
