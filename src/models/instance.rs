use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::session_name_for_worktree;

pub type InstanceId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceStatus {
    /// Agent process running inside the tmux session.
    Running,
    /// Tmux session torn down, worktree and branch kept.
    Paused,
}

impl InstanceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            InstanceStatus::Running => "running",
            InstanceStatus::Paused => "paused",
        }
    }
}

/// One managed coding-agent session: an isolated git worktree plus a
/// background tmux session hosting the agent process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub title: String,
    pub branch: String,
    pub worktree_path: PathBuf,
    pub program: String,
    pub status: InstanceStatus,
    pub created_at: DateTime<Utc>,
}

impl Instance {
    pub fn new(
        id: InstanceId,
        title: String,
        branch: String,
        worktree_path: PathBuf,
        program: String,
    ) -> Self {
        Self {
            id,
            title,
            branch,
            worktree_path,
            program,
            status: InstanceStatus::Running,
            created_at: Utc::now(),
        }
    }

    pub fn session_name(&self) -> String {
        session_name_for_worktree(&self.worktree_path)
    }

    pub fn is_running(&self) -> bool {
        self.status == InstanceStatus::Running
    }
}
