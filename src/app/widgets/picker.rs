use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState},
    Frame,
};

/// Scrollable single-choice list used by the branch selector, PR comment
/// list and keybinding editor. Selection wraps at both ends.
#[derive(Debug, Default)]
pub struct ListPicker {
    items: Vec<String>,
    selected: usize,
}

impl ListPicker {
    pub fn new(items: Vec<String>) -> Self {
        Self { items, selected: 0 }
    }

    pub fn set_items(&mut self, items: Vec<String>) {
        self.items = items;
        self.selected = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_item(&self) -> Option<&str> {
        self.items.get(self.selected).map(String::as_str)
    }

    pub fn next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.selected = (self.selected + 1) % self.items.len();
    }

    pub fn previous(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.selected = if self.selected == 0 {
            self.items.len() - 1
        } else {
            self.selected - 1
        };
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, title: &str) {
        let items: Vec<ListItem> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let style = if i == self.selected {
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::White)
                };
                ListItem::new(Line::from(Span::styled(item.clone(), style)))
            })
            .collect();

        let list = List::new(items).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(title.to_string()),
        );

        let mut state = ListState::default();
        state.select(Some(self.selected));
        frame.render_stateful_widget(list, area, &mut state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn picker() -> ListPicker {
        ListPicker::new(vec!["main".into(), "add-auth".into(), "fix-ci".into()])
    }

    #[test]
    fn starts_at_first_item() {
        let picker = picker();
        assert_eq!(picker.selected_item(), Some("main"));
    }

    #[test]
    fn next_wraps_past_the_end() {
        let mut picker = picker();
        picker.next();
        picker.next();
        assert_eq!(picker.selected_item(), Some("fix-ci"));
        picker.next();
        assert_eq!(
            picker.selected_item(),
            Some("main"),
            "next: selection should wrap to the top"
        );
    }

    #[test]
    fn previous_wraps_before_the_start() {
        let mut picker = picker();
        picker.previous();
        assert_eq!(
            picker.selected_item(),
            Some("fix-ci"),
            "previous: selection should wrap to the bottom"
        );
    }

    #[test]
    fn empty_picker_is_inert() {
        let mut picker = ListPicker::new(vec![]);
        picker.next();
        picker.previous();
        assert_eq!(picker.selected_item(), None);
    }

    #[test]
    fn set_items_resets_selection() {
        let mut picker = picker();
        picker.next();
        picker.set_items(vec!["only".into()]);
        assert_eq!(picker.selected_index(), 0);
        assert_eq!(picker.selected_item(), Some("only"));
    }
}
