mod confirm_modal;
mod help_modal;
mod picker;
mod text_input;

pub use confirm_modal::ConfirmModal;
pub use help_modal::{HelpKind, HelpModal};
pub use picker::ListPicker;
pub use text_input::TextInput;

use ratatui::layout::Rect;

/// A popup rectangle centered in `r`, clamped to fit.
pub fn centered_rect(width: u16, height: u16, r: Rect) -> Rect {
    let width = width.min(r.width.saturating_sub(2));
    let height = height.min(r.height.saturating_sub(2));
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}
