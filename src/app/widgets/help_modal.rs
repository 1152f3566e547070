use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use super::centered_rect;

/// Which help screen is up. First-run screens are shown once and recorded
/// in storage under `storage_key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpKind {
    Keys,
    FirstInstance,
    FirstPrompt,
}

impl HelpKind {
    pub fn storage_key(self) -> &'static str {
        match self {
            HelpKind::Keys => "keys",
            HelpKind::FirstInstance => "first-instance",
            HelpKind::FirstPrompt => "first-prompt",
        }
    }

    fn title(self) -> &'static str {
        match self {
            HelpKind::Keys => " Help ",
            HelpKind::FirstInstance => " New instance ",
            HelpKind::FirstPrompt => " New instance with prompt ",
        }
    }

    fn body(self) -> Vec<(&'static str, &'static str)> {
        match self {
            HelpKind::Keys => vec![
                ("n", "new instance"),
                ("N", "new instance with prompt"),
                ("Enter", "attach to the selected instance"),
                ("d", "kill instance"),
                ("p", "pause / resume"),
                ("P", "push branch"),
                ("F", "force push"),
                ("r", "rebase onto main"),
                ("R", "reset to remote"),
                ("b", "bookmark current changes"),
                ("c", "check out an existing branch"),
                ("v", "review pull request"),
                ("h", "commit history"),
                ("g", "git status"),
                ("e", "error log"),
                ("k", "edit keybindings"),
                ("Tab", "toggle preview / diff tab"),
                ("[ ]", "older / newer diff view"),
                ("q", "quit"),
            ],
            HelpKind::FirstInstance => vec![
                ("", "Name the instance; the name becomes its git branch."),
                ("", "A worktree and tmux session are created for it."),
                ("Enter", "create"),
                ("Esc", "cancel"),
            ],
            HelpKind::FirstPrompt => vec![
                ("", "Name the instance, then type a prompt that is sent"),
                ("", "to the agent as soon as its session starts."),
                ("Enter", "continue"),
                ("Esc", "cancel"),
            ],
        }
    }
}

#[derive(Debug)]
pub struct HelpModal {
    pub kind: HelpKind,
}

impl HelpModal {
    pub fn new(kind: HelpKind) -> Self {
        Self { kind }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let body = self.kind.body();
        let mut lines: Vec<Line> = body
            .iter()
            .map(|(key, desc)| {
                if key.is_empty() {
                    Line::from(Span::styled(*desc, Style::default().fg(Color::Gray)))
                } else {
                    Line::from(vec![
                        Span::styled(
                            format!("{key:>6}"),
                            Style::default()
                                .fg(Color::Yellow)
                                .add_modifier(Modifier::BOLD),
                        ),
                        Span::raw("  "),
                        Span::styled(*desc, Style::default().fg(Color::White)),
                    ])
                }
            })
            .collect();
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "press any key to continue",
            Style::default().fg(Color::DarkGray),
        )));

        let height = (lines.len() as u16).saturating_add(2);
        let popup = centered_rect(52, height, area);
        frame.render_widget(Clear, popup);
        frame.render_widget(
            Paragraph::new(lines)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(Color::Cyan))
                        .title(self.kind.title()),
                )
                .wrap(Wrap { trim: false }),
            popup,
        );
    }
}
