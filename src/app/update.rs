use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::RwLock;

/// Snapshot of the background update probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStatus {
    pub available: bool,
    pub commits_behind: u32,
}

/// Owns the one piece of truly concurrent mutable state in the process:
/// written by a periodic background task, read by the dispatcher each tick.
///
/// Injected into the app at construction; there is no ambient global.
#[derive(Clone)]
pub struct UpdateChecker {
    status: Arc<RwLock<UpdateStatus>>,
}

impl UpdateChecker {
    pub fn new() -> Self {
        Self {
            status: Arc::new(RwLock::new(UpdateStatus::default())),
        }
    }

    /// Non-blocking read for the dispatcher. Falls back to the last value
    /// semantics by returning default when the writer momentarily holds the
    /// lock; the readout refreshes on the next tick anyway.
    pub fn snapshot(&self) -> UpdateStatus {
        self.status
            .try_read()
            .map(|guard| *guard)
            .unwrap_or_default()
    }

    pub async fn set(&self, status: UpdateStatus) {
        *self.status.write().await = status;
    }

    /// Start the periodic probe. Best-effort: failures are logged at debug
    /// and never surface to the error banner.
    pub fn spawn_probe(&self, repo: PathBuf, interval: Duration) {
        let status = Arc::clone(&self.status);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match probe_commits_behind(&repo).await {
                    Some(behind) => {
                        *status.write().await = UpdateStatus {
                            available: behind > 0,
                            commits_behind: behind,
                        };
                    }
                    None => tracing::debug!("update probe failed, keeping last status"),
                }
            }
        });
    }
}

impl Default for UpdateChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// How far HEAD is behind its upstream, or `None` when that cannot be
/// determined (no upstream, no network, not a repo).
async fn probe_commits_behind(repo: &PathBuf) -> Option<u32> {
    let fetch = Command::new("git")
        .args(["fetch", "--quiet"])
        .current_dir(repo)
        .output()
        .await
        .ok()?;
    if !fetch.status.success() {
        return None;
    }

    let output = Command::new("git")
        .args(["rev-list", "--count", "HEAD..@{upstream}"])
        .current_dir(repo)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}
