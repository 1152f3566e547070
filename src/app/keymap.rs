use std::collections::HashMap;

use anyhow::{bail, Result};
use crossterm::event::KeyCode;

/// Everything a key can trigger from the default state. The keybinding
/// editor iterates `ALL` in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    Quit,
    NewInstance,
    NewWithPrompt,
    Attach,
    Kill,
    PauseResume,
    Push,
    ForcePush,
    Rebase,
    ResetRemote,
    Bookmark,
    SelectBranch,
    ReviewPr,
    History,
    GitStatus,
    ErrorLog,
    EditKeybindings,
    Help,
    ToggleTab,
    DiffOlder,
    DiffNewer,
    Up,
    Down,
}

impl KeyAction {
    pub const ALL: [KeyAction; 23] = [
        KeyAction::Quit,
        KeyAction::NewInstance,
        KeyAction::NewWithPrompt,
        KeyAction::Attach,
        KeyAction::Kill,
        KeyAction::PauseResume,
        KeyAction::Push,
        KeyAction::ForcePush,
        KeyAction::Rebase,
        KeyAction::ResetRemote,
        KeyAction::Bookmark,
        KeyAction::SelectBranch,
        KeyAction::ReviewPr,
        KeyAction::History,
        KeyAction::GitStatus,
        KeyAction::ErrorLog,
        KeyAction::EditKeybindings,
        KeyAction::Help,
        KeyAction::ToggleTab,
        KeyAction::DiffOlder,
        KeyAction::DiffNewer,
        KeyAction::Up,
        KeyAction::Down,
    ];

    /// Stable name used in the config file.
    pub fn config_name(self) -> &'static str {
        match self {
            KeyAction::Quit => "quit",
            KeyAction::NewInstance => "new_instance",
            KeyAction::NewWithPrompt => "new_with_prompt",
            KeyAction::Attach => "attach",
            KeyAction::Kill => "kill",
            KeyAction::PauseResume => "pause_resume",
            KeyAction::Push => "push",
            KeyAction::ForcePush => "force_push",
            KeyAction::Rebase => "rebase",
            KeyAction::ResetRemote => "reset_remote",
            KeyAction::Bookmark => "bookmark",
            KeyAction::SelectBranch => "select_branch",
            KeyAction::ReviewPr => "review_pr",
            KeyAction::History => "history",
            KeyAction::GitStatus => "git_status",
            KeyAction::ErrorLog => "error_log",
            KeyAction::EditKeybindings => "edit_keybindings",
            KeyAction::Help => "help",
            KeyAction::ToggleTab => "toggle_tab",
            KeyAction::DiffOlder => "diff_older",
            KeyAction::DiffNewer => "diff_newer",
            KeyAction::Up => "up",
            KeyAction::Down => "down",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            KeyAction::Quit => "Quit",
            KeyAction::NewInstance => "New instance",
            KeyAction::NewWithPrompt => "New instance with prompt",
            KeyAction::Attach => "Attach",
            KeyAction::Kill => "Kill instance",
            KeyAction::PauseResume => "Pause / resume",
            KeyAction::Push => "Push branch",
            KeyAction::ForcePush => "Force push",
            KeyAction::Rebase => "Rebase onto main",
            KeyAction::ResetRemote => "Reset to remote",
            KeyAction::Bookmark => "Bookmark changes",
            KeyAction::SelectBranch => "Check out branch",
            KeyAction::ReviewPr => "Review pull request",
            KeyAction::History => "Commit history",
            KeyAction::GitStatus => "Git status",
            KeyAction::ErrorLog => "Error log",
            KeyAction::EditKeybindings => "Edit keybindings",
            KeyAction::Help => "Help",
            KeyAction::ToggleTab => "Toggle preview / diff",
            KeyAction::DiffOlder => "Older diff view",
            KeyAction::DiffNewer => "Newer diff view",
            KeyAction::Up => "Select previous",
            KeyAction::Down => "Select next",
        }
    }

    fn from_config_name(name: &str) -> Option<KeyAction> {
        KeyAction::ALL
            .into_iter()
            .find(|a| a.config_name() == name)
    }

    fn default_key(self) -> KeyCode {
        match self {
            KeyAction::Quit => KeyCode::Char('q'),
            KeyAction::NewInstance => KeyCode::Char('n'),
            KeyAction::NewWithPrompt => KeyCode::Char('N'),
            KeyAction::Attach => KeyCode::Enter,
            KeyAction::Kill => KeyCode::Char('d'),
            KeyAction::PauseResume => KeyCode::Char('p'),
            KeyAction::Push => KeyCode::Char('P'),
            KeyAction::ForcePush => KeyCode::Char('F'),
            KeyAction::Rebase => KeyCode::Char('r'),
            KeyAction::ResetRemote => KeyCode::Char('R'),
            KeyAction::Bookmark => KeyCode::Char('b'),
            KeyAction::SelectBranch => KeyCode::Char('c'),
            KeyAction::ReviewPr => KeyCode::Char('v'),
            KeyAction::History => KeyCode::Char('h'),
            KeyAction::GitStatus => KeyCode::Char('g'),
            KeyAction::ErrorLog => KeyCode::Char('e'),
            KeyAction::EditKeybindings => KeyCode::Char('k'),
            KeyAction::Help => KeyCode::Char('?'),
            KeyAction::ToggleTab => KeyCode::Tab,
            KeyAction::DiffOlder => KeyCode::Char('['),
            KeyAction::DiffNewer => KeyCode::Char(']'),
            KeyAction::Up => KeyCode::Up,
            KeyAction::Down => KeyCode::Down,
        }
    }
}

/// Parse a key name from the config file ("n", "enter", "tab", ...).
pub fn parse_key_name(name: &str) -> Result<KeyCode> {
    let code = match name {
        "enter" => KeyCode::Enter,
        "esc" => KeyCode::Esc,
        "tab" => KeyCode::Tab,
        "backspace" => KeyCode::Backspace,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "space" => KeyCode::Char(' '),
        s => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => KeyCode::Char(c),
                _ => bail!("unknown key name: {name:?}"),
            }
        }
    };
    Ok(code)
}

/// Human-readable name for a bound key, shown in the footer and the
/// keybinding editor.
pub fn key_display_name(code: KeyCode) -> String {
    match code {
        KeyCode::Enter => "enter".to_string(),
        KeyCode::Esc => "esc".to_string(),
        KeyCode::Tab => "tab".to_string(),
        KeyCode::Backspace => "backspace".to_string(),
        KeyCode::Up => "up".to_string(),
        KeyCode::Down => "down".to_string(),
        KeyCode::Left => "left".to_string(),
        KeyCode::Right => "right".to_string(),
        KeyCode::Char(' ') => "space".to_string(),
        KeyCode::Char(c) => c.to_string(),
        other => format!("{other:?}"),
    }
}

/// Keys the keybinding editor accepts: everything `key_display_name` can
/// name and `parse_key_name` can read back. Esc is excluded because it
/// cancels the capture.
pub fn is_bindable(code: KeyCode) -> bool {
    matches!(
        code,
        KeyCode::Enter
            | KeyCode::Tab
            | KeyCode::Backspace
            | KeyCode::Up
            | KeyCode::Down
            | KeyCode::Left
            | KeyCode::Right
            | KeyCode::Char(_)
    )
}

/// Key to action mapping for the default state. Defaults first, config
/// overrides on top; an override moves the action off its default key.
#[derive(Debug)]
pub struct Keymap {
    bindings: HashMap<KeyAction, KeyCode>,
}

impl Default for Keymap {
    fn default() -> Self {
        let bindings = KeyAction::ALL
            .into_iter()
            .map(|action| (action, action.default_key()))
            .collect();
        Self { bindings }
    }
}

impl Keymap {
    /// Apply config overrides of the form `action_name: key_name`.
    /// Unknown actions or key names are an error so typos surface at
    /// startup instead of as dead keys.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Result<Self> {
        let mut keymap = Self::default();
        for (action_name, key_name) in overrides {
            let Some(action) = KeyAction::from_config_name(action_name) else {
                bail!("unknown keybinding action: {action_name:?}");
            };
            let code = parse_key_name(key_name)?;
            keymap.rebind(action, code);
        }
        Ok(keymap)
    }

    pub fn key_for(&self, action: KeyAction) -> Option<KeyCode> {
        self.bindings.get(&action).copied()
    }

    pub fn action_for(&self, code: KeyCode) -> Option<KeyAction> {
        self.bindings
            .iter()
            .find(|(_, bound)| **bound == code)
            .map(|(action, _)| *action)
    }

    /// Bind `action` to `code`, unbinding any action that held the key.
    pub fn rebind(&mut self, action: KeyAction, code: KeyCode) {
        self.bindings.retain(|_, bound| *bound != code);
        self.bindings.insert(action, code);
    }

    /// The full binding set in config-file form, written back after an
    /// editor rebind so it survives restarts. Unbound actions are omitted.
    pub fn config_entries(&self) -> HashMap<String, String> {
        self.bindings
            .iter()
            .map(|(action, code)| (action.config_name().to_string(), key_display_name(*code)))
            .collect()
    }

    /// Rows for the keybinding editor, in `KeyAction::ALL` order.
    pub fn rows(&self) -> Vec<(KeyAction, String)> {
        KeyAction::ALL
            .into_iter()
            .map(|action| {
                let key = self
                    .key_for(action)
                    .map(key_display_name)
                    .unwrap_or_else(|| "unbound".to_string());
                (action, key)
            })
            .collect()
    }
}
