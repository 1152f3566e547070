use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthChar;

/// Single-line text entry for names, prompts and bookmark messages.
/// Cursor arithmetic is in characters, so multi-byte input is safe.
#[derive(Debug, Default)]
pub struct TextInput {
    chars: Vec<char>,
    cursor: usize,
}

impl TextInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn set_content(&mut self, content: &str) {
        self.chars = content.chars().collect();
        self.cursor = self.chars.len();
    }

    pub fn is_empty(&self) -> bool {
        self.chars.iter().all(|c| c.is_whitespace())
    }

    pub fn insert_char(&mut self, c: char) {
        if c == '\n' {
            return;
        }
        self.chars.insert(self.cursor, c);
        self.cursor += 1;
    }

    pub fn delete_back(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.chars.remove(self.cursor);
        }
    }

    pub fn delete_forward(&mut self) {
        if self.cursor < self.chars.len() {
            self.chars.remove(self.cursor);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        if self.cursor < self.chars.len() {
            self.cursor += 1;
        }
    }

    pub fn move_start(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.chars.len();
    }

    #[cfg(test)]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Display width of the text before the cursor, for cursor placement.
    pub fn cursor_column(&self) -> u16 {
        self.chars[..self.cursor]
            .iter()
            .map(|c| c.width().unwrap_or(0) as u16)
            .sum()
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, title: &str) {
        let paragraph = Paragraph::new(Line::from(Span::styled(
            self.content(),
            Style::default().fg(Color::White),
        )))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(title.to_string()),
        )
        .wrap(Wrap { trim: false });

        frame.render_widget(paragraph, area);
        frame.set_cursor_position((area.x + 1 + self.cursor_column(), area.y + 1));
    }
}
