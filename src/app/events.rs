use crossterm::event::{KeyEvent, MouseEvent};

use crate::models::{Instance, InstanceId, PullRequest};
use crate::app::navigation::NavigationView;

/// Timer events scheduled through the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerId {
    /// Clear the transient banner message, if `seq` still matches the
    /// message being shown.
    MessageExpiry { seq: u64 },
    /// Capture the selected instance's pane again and re-arm the timer.
    PreviewRefresh,
    /// Stop highlighting the flashed footer hint, if `seq` still matches.
    FlashExpiry { seq: u64 },
    /// Wake-up queued when a confirmation is decided, so the verdict runs
    /// on the very next loop iteration instead of an unrelated event.
    VerdictSweep,
}

/// Completion payloads of async commands. Exactly one per command.
#[derive(Debug)]
pub enum AsyncResult {
    /// Any external-operation failure. The dispatcher is the only writer of
    /// the error log; everything funnels through here.
    Error(String),

    InstanceCreated(Instance),
    InstanceKilled { id: InstanceId },
    InstancePaused { id: InstanceId },
    InstanceResumed { id: InstanceId },

    /// Branch list for the branch picker. `seq` guards against results
    /// arriving after the picker was cancelled.
    BranchesLoaded { seq: u64, branches: Vec<String> },

    /// Fresh PR metadata and comments. Same staleness guard as branches.
    PrLoaded { seq: u64, pr: PullRequest },

    /// Rebase command 1 finished: trunk resolved, branch and pre-rebase SHA
    /// captured. The dispatcher populates the tracker and chains command 2.
    RebaseStarted {
        id: InstanceId,
        branch: String,
        original_sha: String,
        main_branch: String,
    },
    /// Rebase command 2 finished.
    RebaseCompleted { id: InstanceId },

    AttachFinished { id: InstanceId, reload: bool },
    BookmarkCreated { id: InstanceId },
    Pushed { id: InstanceId },

    NavigationBuilt { id: InstanceId, views: Vec<NavigationView> },
    DiffLoaded { id: InstanceId, view_index: usize, text: String },

    GitStatusLoaded { id: InstanceId, text: String },
    HistoryLoaded { id: InstanceId, commits: Vec<String> },

    /// Pane contents for the preview tab.
    PreviewCaptured { id: InstanceId, text: String },
    /// A background persistence write finished; nothing to update.
    Persisted,
}

/// Everything the dispatcher consumes, one at a time, in arrival order.
#[derive(Debug)]
pub enum Event {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize(u16, u16),
    Tick(TimerId),
    Result(AsyncResult),
    /// Transient success text, shown in the banner and self-clearing.
    Message(String),
}
