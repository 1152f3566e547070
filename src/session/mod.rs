mod git;
mod github;
mod storage;
mod tmux;

pub use git::{resolve_git_root, BookmarkCommit, GitWorktree, WorktreeService, BOOKMARK_PREFIX};
pub use github::fetch_pull_request;
pub use storage::InstanceStorage;
pub use tmux::TmuxSession;
