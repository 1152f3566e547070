use crate::app::keymap::KeyAction;
use crate::app::widgets::{HelpKind, ListPicker, TextInput};
use crate::models::PullRequest;

/// Action to run when a help screen is dismissed, so first-run help can
/// lead straight into the flow it explains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredAction {
    OpenNaming { with_prompt: bool },
}

#[derive(Debug)]
pub struct NameOverlay {
    pub input: TextInput,
    /// When set, a non-empty name moves on to the prompt editor instead of
    /// creating the instance directly.
    pub with_prompt: bool,
}

#[derive(Debug)]
pub struct PromptOverlay {
    pub input: TextInput,
    pub instance_name: String,
}

#[derive(Debug)]
pub struct HelpOverlay {
    pub kind: HelpKind,
    pub then: Option<DeferredAction>,
}

#[derive(Debug)]
pub struct BranchPickerOverlay {
    pub picker: ListPicker,
    /// Generation of the branch fetch this overlay is waiting on. Results
    /// from an older generation are discarded.
    pub seq: u64,
    pub loading: bool,
}

#[derive(Debug)]
pub struct PrOverlay {
    pub pr: PullRequest,
    pub picker: ListPicker,
}

#[derive(Debug)]
pub struct CommentOverlay {
    /// The review overlay to return to on Esc.
    pub parent: PrOverlay,
    pub index: usize,
    pub scroll: u16,
}

#[derive(Debug)]
pub struct KeybindingsOverlay {
    pub picker: ListPicker,
    /// The action whose next keypress becomes its new binding.
    pub awaiting: Option<KeyAction>,
}

/// The controller's modal state. Every variant that is not `Default`
/// carries the data its overlay draws, so an overlay can never outlive
/// its state or appear without one.
#[derive(Debug, Default)]
pub enum AppState {
    #[default]
    Default,
    NamingInstance(NameOverlay),
    Prompting(PromptOverlay),
    Help(HelpOverlay),
    Confirming {
        prompt: String,
    },
    SelectingBranch(BranchPickerOverlay),
    ErrorLog {
        scroll: u16,
    },
    ReviewingPr(PrOverlay),
    CommentDetail(CommentOverlay),
    Bookmarking {
        input: TextInput,
    },
    History {
        lines: Vec<String>,
        scroll: u16,
    },
    GitStatus {
        text: String,
        scroll: u16,
    },
    EditingKeybindings(KeybindingsOverlay),
}

impl AppState {
    pub fn is_default(&self) -> bool {
        matches!(self, AppState::Default)
    }

    /// Short mode name for the footer.
    pub fn mode_label(&self) -> &'static str {
        match self {
            AppState::Default => "",
            AppState::NamingInstance(_) => "name",
            AppState::Prompting(_) => "prompt",
            AppState::Help(_) => "help",
            AppState::Confirming { .. } => "confirm",
            AppState::SelectingBranch(_) => "branches",
            AppState::ErrorLog { .. } => "errors",
            AppState::ReviewingPr(_) => "review",
            AppState::CommentDetail(_) => "comment",
            AppState::Bookmarking { .. } => "bookmark",
            AppState::History { .. } => "history",
            AppState::GitStatus { .. } => "status",
            AppState::EditingKeybindings(_) => "keys",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_default() {
        let state = AppState::default();
        assert!(state.is_default());
        assert_eq!(state.mode_label(), "");
    }

    #[test]
    fn modal_states_carry_a_mode_label() {
        let states = [
            AppState::NamingInstance(NameOverlay {
                input: TextInput::new(),
                with_prompt: false,
            }),
            AppState::Confirming {
                prompt: "sure?".to_string(),
            },
            AppState::ErrorLog { scroll: 0 },
            AppState::Bookmarking {
                input: TextInput::new(),
            },
        ];
        for state in states {
            assert!(!state.is_default());
            assert!(
                !state.mode_label().is_empty(),
                "mode_label: every modal state names itself in the footer"
            );
        }
    }
}
