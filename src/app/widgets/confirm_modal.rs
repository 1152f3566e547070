use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use super::centered_rect;

/// Yes/no prompt drawn over everything else while a destructive action
/// waits for a decision.
#[derive(Debug)]
pub struct ConfirmModal;

impl ConfirmModal {
    pub fn render(frame: &mut Frame, area: Rect, prompt: &str) {
        let lines = vec![
            Line::from(Span::styled(
                prompt.to_string(),
                Style::default().fg(Color::White),
            )),
            Line::from(""),
            Line::from(vec![
                Span::styled(
                    "y/Enter",
                    Style::default()
                        .fg(Color::Green)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(" confirm   ", Style::default().fg(Color::Gray)),
                Span::styled(
                    "n/Esc",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                ),
                Span::styled(" cancel", Style::default().fg(Color::Gray)),
            ]),
        ];

        let width = (prompt.len() as u16 + 4).clamp(30, 70);
        let popup = centered_rect(width, 5, area);
        frame.render_widget(Clear, popup);
        frame.render_widget(
            Paragraph::new(lines)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(Color::Red))
                        .title(" Confirm "),
                )
                .wrap(Wrap { trim: false }),
            popup,
        );
    }
}
