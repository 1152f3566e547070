use crate::models::InstanceId;

/// Fields captured before the rebase mutates the branch. All populated or
/// not present at all; the tracker never exposes a half-filled session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebaseSession {
    pub instance_id: InstanceId,
    pub branch: String,
    pub original_sha: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Idle,
    /// Action accepted; branch and SHA not yet captured.
    Confirmed { instance_id: InstanceId },
    InProgress { session: RebaseSession },
}

/// Tracks at most one in-flight rebase.
///
/// Lifecycle: Idle -> Confirmed (gate accepted) -> InProgress (branch and
/// pre-rebase SHA captured) -> Idle again on completion or failure. Any
/// error clears every field in one step.
#[derive(Debug, Default)]
pub struct RebaseTracker {
    phase: Phase,
}

impl RebaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self.phase, Phase::InProgress { .. })
    }

    pub fn session(&self) -> Option<&RebaseSession> {
        match &self.phase {
            Phase::InProgress { session } => Some(session),
            _ => None,
        }
    }

    /// Returns false when a rebase is already tracked; at most one runs.
    pub fn confirm(&mut self, instance_id: InstanceId) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        self.phase = Phase::Confirmed { instance_id };
        true
    }

    /// Capture branch and pre-rebase SHA. Only valid from Confirmed, and
    /// only for the confirmed instance; anything else resets to Idle and
    /// reports failure.
    pub fn begin(&mut self, session: RebaseSession) -> bool {
        match &self.phase {
            Phase::Confirmed { instance_id } if *instance_id == session.instance_id => {
                self.phase = Phase::InProgress { session };
                true
            }
            _ => {
                self.phase = Phase::Idle;
                false
            }
        }
    }

    /// Completion clears the tracker and hands back the session for the
    /// success message.
    pub fn complete(&mut self) -> Option<RebaseSession> {
        match std::mem::take(&mut self.phase) {
            Phase::InProgress { session } => Some(session),
            _ => None,
        }
    }

    /// Any failure resets every field atomically.
    pub fn fail(&mut self) {
        self.phase = Phase::Idle;
    }
}
