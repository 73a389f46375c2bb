//! The multiplexer driver trait (§4.1) and two implementations: a real one
//! that shells out to `tmux`, and an in-memory fake used by every
//! higher-layer crate's test suite.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{MuxError, Result};
use crate::sanitize::sanitize_send_text;

#[derive(Debug, Clone)]
pub struct PaneInfo {
    pub pane_id: String,
    pub title: String,
    pub index: u32,
}

/// Retry policy for `get_panes`, whose output can lag a split by a beat on a
/// loaded host. Values come from `MuxConfig` (§9a); the driver itself stays
/// config-agnostic and takes them as call parameters.
#[derive(Debug, Clone, Copy)]
pub struct PaneListRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for PaneListRetry {
    fn default() -> Self {
        Self { attempts: 5, delay: Duration::from_millis(100) }
    }
}

#[async_trait]
pub trait MultiplexerDriver: Send + Sync {
    async fn ensure_installed(&self) -> Result<()>;
    async fn session_exists(&self, session: &str) -> Result<bool>;
    async fn create_session(&self, session: &str, first_window_title: &str) -> Result<()>;
    async fn split_window(&self, session: &str) -> Result<String>;
    async fn set_pane_title(&self, pane_id: &str, title: &str) -> Result<()>;
    async fn get_panes(&self, session: &str, retry: PaneListRetry) -> Result<Vec<PaneInfo>>;
    async fn send_keys(&self, pane_id: &str, text: &str, press_enter: bool) -> Result<()>;
    async fn send_interrupt(&self, pane_id: &str) -> Result<()>;
    async fn capture_pane_output(&self, pane_id: &str, lines: u32) -> Result<String>;
    async fn kill_pane(&self, pane_id: &str) -> Result<()>;
    async fn kill_session(&self, session: &str) -> Result<()>;
}

/// Deliver multi-line text (a rendered recovery context, a handoff block)
/// a line at a time, since `send_keys` rejects embedded newlines — the
/// caller is expected to drive one `pressEnter` per logical line instead of
/// one `sendKeys` call for a whole paste. Trailing blank lines produced by
/// the markdown renderer's section spacing are skipped.
pub async fn send_multiline(driver: &dyn MultiplexerDriver, pane_id: &str, text: &str) -> Result<()> {
    for line in text.lines().filter(|l| !l.is_empty()) {
        driver.send_keys(pane_id, line, true).await?;
    }
    Ok(())
}

/// `tmux`-backed implementation. Every operation shells out via
/// `tokio::process::Command`; stdout/stderr are captured so failures surface
/// tmux's own error text in `MuxError::CommandFailed`.
pub struct TmuxDriver {
    binary: String,
}

impl Default for TmuxDriver {
    fn default() -> Self {
        Self { binary: "tmux".to_string() }
    }
}

impl TmuxDriver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            return Err(MuxError::CommandFailed(format!(
                "tmux {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl MultiplexerDriver for TmuxDriver {
    async fn ensure_installed(&self) -> Result<()> {
        Command::new(&self.binary)
            .arg("-V")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|_| MuxError::NotInstalled)?;
        Ok(())
    }

    async fn session_exists(&self, session: &str) -> Result<bool> {
        let status = Command::new(&self.binary)
            .args(["has-session", "-t", session])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        Ok(status.success())
    }

    async fn create_session(&self, session: &str, first_window_title: &str) -> Result<()> {
        if self.session_exists(session).await? {
            return Err(MuxError::AlreadyExists(session.to_string()));
        }
        self.run(&["new-session", "-d", "-s", session, "-n", first_window_title]).await?;
        Ok(())
    }

    async fn split_window(&self, session: &str) -> Result<String> {
        let out = self
            .run(&["split-window", "-t", session, "-P", "-F", "#{pane_id}"])
            .await?;
        Ok(out.trim().to_string())
    }

    async fn set_pane_title(&self, pane_id: &str, title: &str) -> Result<()> {
        self.run(&["select-pane", "-t", pane_id, "-T", title]).await?;
        Ok(())
    }

    async fn get_panes(&self, session: &str, retry: PaneListRetry) -> Result<Vec<PaneInfo>> {
        let mut last_err = None;
        for attempt in 0..retry.attempts {
            match self
                .run(&[
                    "list-panes",
                    "-t",
                    session,
                    "-F",
                    "#{pane_id}\t#{pane_title}\t#{pane_index}",
                ])
                .await
            {
                Ok(out) => {
                    let panes = out
                        .lines()
                        .filter(|l| !l.is_empty())
                        .filter_map(|line| {
                            let mut parts = line.splitn(3, '\t');
                            let pane_id = parts.next()?.to_string();
                            let title = parts.next()?.to_string();
                            let index = parts.next()?.parse().ok()?;
                            Some(PaneInfo { pane_id, title, index })
                        })
                        .collect();
                    return Ok(panes);
                }
                Err(e) => {
                    last_err = Some(e);
                    if attempt + 1 < retry.attempts {
                        tokio::time::sleep(retry.delay).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| MuxError::NotFound(session.to_string())))
    }

    async fn send_keys(&self, pane_id: &str, text: &str, press_enter: bool) -> Result<()> {
        let safe = sanitize_send_text(text)?;
        self.run(&["send-keys", "-t", pane_id, &safe]).await?;
        if press_enter {
            self.run(&["send-keys", "-t", pane_id, "Enter"]).await?;
        }
        Ok(())
    }

    async fn send_interrupt(&self, pane_id: &str) -> Result<()> {
        self.run(&["send-keys", "-t", pane_id, "C-c"]).await?;
        Ok(())
    }

    async fn capture_pane_output(&self, pane_id: &str, lines: u32) -> Result<String> {
        let start = format!("-{lines}");
        self.run(&["capture-pane", "-t", pane_id, "-p", "-S", &start]).await
    }

    async fn kill_pane(&self, pane_id: &str) -> Result<()> {
        self.run(&["kill-pane", "-t", pane_id]).await?;
        Ok(())
    }

    async fn kill_session(&self, session: &str) -> Result<()> {
        self.run(&["kill-session", "-t", session]).await?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
struct FakePane {
    title: String,
    index: u32,
    scrollback: Vec<String>,
    alive: bool,
}

#[derive(Default)]
struct FakeState {
    sessions: HashMap<String, Vec<String>>,
    panes: HashMap<String, FakePane>,
    next_pane_id: u64,
}

/// In-memory multiplexer used by the test suites of every layer above L1.
pub struct FakeMultiplexerDriver {
    state: Mutex<FakeState>,
}

impl Default for FakeMultiplexerDriver {
    fn default() -> Self {
        Self { state: Mutex::new(FakeState::default()) }
    }
}

impl FakeMultiplexerDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: append a line to a pane's recorded scrollback, as if the
    /// agent process had printed it.
    pub fn push_output(&self, pane_id: &str, line: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pane) = state.panes.get_mut(pane_id) {
            pane.scrollback.push(line.to_string());
        }
    }
}

#[async_trait]
impl MultiplexerDriver for FakeMultiplexerDriver {
    async fn ensure_installed(&self) -> Result<()> {
        Ok(())
    }

    async fn session_exists(&self, session: &str) -> Result<bool> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.sessions.contains_key(session))
    }

    async fn create_session(&self, session: &str, first_window_title: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.sessions.contains_key(session) {
            return Err(MuxError::AlreadyExists(session.to_string()));
        }
        let pane_id = format!("%{}", state.next_pane_id);
        state.next_pane_id += 1;
        state.sessions.insert(session.to_string(), vec![pane_id.clone()]);
        state.panes.insert(
            pane_id,
            FakePane { title: first_window_title.to_string(), index: 0, scrollback: Vec::new(), alive: true },
        );
        Ok(())
    }

    async fn split_window(&self, session: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let index = state
            .sessions
            .get(session)
            .ok_or_else(|| MuxError::NotFound(session.to_string()))?
            .len() as u32;
        let pane_id = format!("%{}", state.next_pane_id);
        state.next_pane_id += 1;
        state.panes.insert(pane_id.clone(), FakePane { title: String::new(), index, scrollback: Vec::new(), alive: true });
        state.sessions.get_mut(session).unwrap().push(pane_id.clone());
        Ok(pane_id)
    }

    async fn set_pane_title(&self, pane_id: &str, title: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let pane = state.panes.get_mut(pane_id).ok_or_else(|| MuxError::NotFound(pane_id.to_string()))?;
        pane.title = title.to_string();
        Ok(())
    }

    async fn get_panes(&self, session: &str, _retry: PaneListRetry) -> Result<Vec<PaneInfo>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let pane_ids = state.sessions.get(session).ok_or_else(|| MuxError::NotFound(session.to_string()))?;
        Ok(pane_ids
            .iter()
            .filter_map(|id| {
                let pane = state.panes.get(id)?;
                if !pane.alive {
                    return None;
                }
                Some(PaneInfo { pane_id: id.clone(), title: pane.title.clone(), index: pane.index })
            })
            .collect())
    }

    async fn send_keys(&self, pane_id: &str, text: &str, press_enter: bool) -> Result<()> {
        let safe = sanitize_send_text(text)?;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let pane = state.panes.get_mut(pane_id).ok_or_else(|| MuxError::NotFound(pane_id.to_string()))?;
        let mut line = safe;
        if press_enter {
            line.push('\n');
        }
        pane.scrollback.push(line);
        Ok(())
    }

    async fn send_interrupt(&self, pane_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let pane = state.panes.get_mut(pane_id).ok_or_else(|| MuxError::NotFound(pane_id.to_string()))?;
        pane.scrollback.push("^C".to_string());
        Ok(())
    }

    async fn capture_pane_output(&self, pane_id: &str, lines: u32) -> Result<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let pane = state.panes.get(pane_id).ok_or_else(|| MuxError::NotFound(pane_id.to_string()))?;
        let tail_start = pane.scrollback.len().saturating_sub(lines as usize);
        Ok(pane.scrollback[tail_start..].join(""))
    }

    async fn kill_pane(&self, pane_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let pane = state.panes.get_mut(pane_id).ok_or_else(|| MuxError::NotFound(pane_id.to_string()))?;
        pane.alive = false;
        Ok(())
    }

    async fn kill_session(&self, session: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let pane_ids = state.sessions.remove(session).ok_or_else(|| MuxError::NotFound(session.to_string()))?;
        for id in pane_ids {
            state.panes.remove(&id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_driver_create_split_and_list() {
        let driver = FakeMultiplexerDriver::new();
        driver.create_session("sess", "sess__user_0").await.unwrap();
        let pane2 = driver.split_window("sess").await.unwrap();
        driver.set_pane_title(&pane2, "sess__cc_1").await.unwrap();

        let panes = driver.get_panes("sess", PaneListRetry::default()).await.unwrap();
        assert_eq!(panes.len(), 2);
        assert_eq!(panes[1].title, "sess__cc_1");
    }

    #[tokio::test]
    async fn fake_driver_rejects_duplicate_session() {
        let driver = FakeMultiplexerDriver::new();
        driver.create_session("sess", "title").await.unwrap();
        assert!(matches!(driver.create_session("sess", "title").await, Err(MuxError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn send_multiline_issues_one_send_keys_call_per_line() {
        let driver = FakeMultiplexerDriver::new();
        driver.create_session("sess", "title").await.unwrap();
        let panes = driver.get_panes("sess", PaneListRetry::default()).await.unwrap();
        let pane_id = panes[0].pane_id.clone();

        send_multiline(&driver, &pane_id, "## Recovery Context\n\n### Blocked\n- waiting on review\n\n")
            .await
            .unwrap();

        let out = driver.capture_pane_output(&pane_id, 10).await.unwrap();
        assert!(out.contains("## Recovery Context"));
        assert!(out.contains("waiting on review"));
    }

    #[tokio::test]
    async fn fake_driver_send_keys_and_capture() {
        let driver = FakeMultiplexerDriver::new();
        driver.create_session("sess", "title").await.unwrap();
        let panes = driver.get_panes("sess", PaneListRetry::default()).await.unwrap();
        let pane_id = panes[0].pane_id.clone();

        driver.send_keys(&pane_id, "echo hi", true).await.unwrap();
        let out = driver.capture_pane_output(&pane_id, 10).await.unwrap();
        assert!(out.contains("echo hi"));
    }

    #[tokio::test]
    async fn fake_driver_send_keys_rejects_unsafe_text() {
        let driver = FakeMultiplexerDriver::new();
        driver.create_session("sess", "title").await.unwrap();
        let panes = driver.get_panes("sess", PaneListRetry::default()).await.unwrap();
        let pane_id = panes[0].pane_id.clone();

        assert!(driver.send_keys(&pane_id, "evil\ntext", true).await.is_err());
    }

    #[tokio::test]
    async fn fake_driver_killed_pane_excluded_from_listing() {
        let driver = FakeMultiplexerDriver::new();
        driver.create_session("sess", "title").await.unwrap();
        let pane2 = driver.split_window("sess").await.unwrap();
        driver.kill_pane(&pane2).await.unwrap();

        let panes = driver.get_panes("sess", PaneListRetry::default()).await.unwrap();
        assert_eq!(panes.len(), 1);
    }

    #[tokio::test]
    async fn fake_driver_kill_session_removes_all_panes() {
        let driver = FakeMultiplexerDriver::new();
        driver.create_session("sess", "title").await.unwrap();
        driver.split_window("sess").await.unwrap();
        driver.kill_session("sess").await.unwrap();

        assert!(!driver.session_exists("sess").await.unwrap());
    }
}
