use crossterm::event::KeyCode;

use crate::models::InstanceId;

/// What an accepted confirmation will do, as a value the dispatcher turns
/// into an async command. A descriptor rather than a closure keeps every
/// state mutation inside the dispatcher where it can be audited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmAction {
    KillInstance { id: InstanceId },
    Rebase { id: InstanceId },
    ResetToRemote { id: InstanceId, remote: String, branch: String },
    ForcePush { id: InstanceId, message: String },
}

#[derive(Debug)]
pub struct PendingAction {
    pub prompt: String,
    pub action: ConfirmAction,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    Accepted(ConfirmAction),
    Rejected,
}

#[derive(Debug, PartialEq, Eq)]
pub enum GateKey {
    /// Decision reached; the overlay should be torn down.
    Decided,
    /// Key consumed without a decision; nothing falls through to global
    /// handling while the gate is up.
    Swallowed,
}

/// Holds at most one deferred action behind a yes/no prompt.
///
/// The verdict is handed out once, on the dispatcher tick after the
/// deciding keypress, so the confirmation UI is gone before the (possibly
/// slow) action is scheduled.
#[derive(Debug, Default)]
pub struct ConfirmationGate {
    pending: Option<PendingAction>,
    verdict: Option<Verdict>,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the action; returns false when one is already pending or
    /// awaiting pickup (the new request is dropped).
    pub fn request(&mut self, prompt: impl Into<String>, action: ConfirmAction) -> bool {
        if self.pending.is_some() || self.verdict.is_some() {
            return false;
        }
        self.pending = Some(PendingAction {
            prompt: prompt.into(),
            action,
        });
        true
    }

    pub fn prompt(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.prompt.as_str())
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Gate input handling: affirmative and negative keys decide, anything
    /// else is swallowed.
    pub fn handle_key(&mut self, code: KeyCode) -> GateKey {
        let Some(pending) = self.pending.take() else {
            return GateKey::Swallowed;
        };

        match code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                self.verdict = Some(Verdict::Accepted(pending.action));
                GateKey::Decided
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.verdict = Some(Verdict::Rejected);
                GateKey::Decided
            }
            _ => {
                self.pending = Some(pending);
                GateKey::Swallowed
            }
        }
    }

    /// Consume the verdict. Yields a value exactly once per decision.
    pub fn take_verdict(&mut self) -> Option<Verdict> {
        self.verdict.take()
    }
}
