use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// One tmux session hosting one instance's agent process.
///
/// Methods shell out to the tmux binary; all are fallible and must only be
/// called from scheduled async commands.
#[derive(Clone)]
pub struct TmuxSession {
    session_name: String,
}

impl TmuxSession {
    pub fn new(session_name: String) -> Self {
        Self { session_name }
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    fn primary_pane(&self) -> String {
        format!("{}:0.0", self.session_name)
    }

    pub async fn is_alive(&self) -> bool {
        Command::new("tmux")
            .args(["has-session", "-t", &self.session_name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Start a detached session running `program` inside `working_dir`.
    pub async fn start(&self, program: &str, working_dir: &Path) -> Result<()> {
        let dir = working_dir
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Working dir is not UTF-8: {:?}", working_dir))?;

        let output = Command::new("tmux")
            .args([
                "new-session",
                "-d",
                "-s",
                &self.session_name,
                "-c",
                dir,
                program,
            ])
            .output()
            .await
            .context("Failed to create tmux session")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tmux new-session failed: {}", stderr.trim());
        }
        Ok(())
    }

    pub async fn kill(&self) -> Result<()> {
        Command::new("tmux")
            .args(["kill-session", "-t", &self.session_name])
            .output()
            .await
            .context("Failed to kill tmux session")?;
        Ok(())
    }

    /// Send literal text to the primary pane, followed by Enter.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        let pane = self.primary_pane();
        Command::new("tmux")
            .args(["send-keys", "-t", &pane, "-l", text])
            .output()
            .await
            .context("Failed to send text to pane")?;
        Command::new("tmux")
            .args(["send-keys", "-t", &pane, "Enter"])
            .output()
            .await
            .context("Failed to send Enter to pane")?;
        Ok(())
    }

    /// Current primary-pane contents, with escape sequences so the preview
    /// can be rendered in color.
    pub async fn capture_pane(&self) -> Result<String> {
        let pane = self.primary_pane();
        let output = Command::new("tmux")
            .args(["capture-pane", "-t", &pane, "-p", "-e"])
            .output()
            .await
            .context("Failed to capture pane")?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Attach the controlling terminal to the session and block until the
    /// client detaches. Blocks only the calling task, never the dispatcher.
    /// Returns `true` when the caller should reload instance state.
    pub async fn attach(&self) -> Result<bool> {
        let status = Command::new("tmux")
            .args(["attach-session", "-t", &self.session_name])
            .status()
            .await
            .context("Failed to attach to tmux session")?;
        Ok(status.success())
    }

    /// Restart the agent program inside the existing session.
    pub async fn reload(&self, program: &str) -> Result<()> {
        let pane = self.primary_pane();
        let output = Command::new("tmux")
            .args(["respawn-pane", "-k", "-t", &pane, program])
            .output()
            .await
            .context("Failed to respawn pane")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tmux respawn-pane failed: {}", stderr.trim());
        }
        Ok(())
    }
}
