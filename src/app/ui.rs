use ansi_to_tui::IntoText;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Frame,
};

use super::keymap::{key_display_name, KeyAction};
use super::state::AppState;
use super::widgets::{centered_rect, ConfirmModal, HelpModal};
use super::{App, Tab};
use crate::utils::truncate_str;

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_body(frame, app, chunks[1]);
    render_footer(frame, app, chunks[2]);
    render_overlay(frame, app, chunks[1]);
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled(
            " corral ",
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(
            format!("{} instance(s)", app.instances.len()),
            Style::default().fg(Color::Gray),
        ),
    ];
    if app.update_status.available {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("update available ({} behind)", app.update_status.commits_behind),
            Style::default().fg(Color::Yellow),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_body(frame: &mut Frame, app: &App, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(area);

    render_instance_list(frame, app, columns[0]);
    render_detail(frame, app, columns[1]);
}

fn render_instance_list(frame: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .instances
        .iter()
        .map(|instance| {
            let (marker, marker_color) = if instance.is_running() {
                ("●", Color::Green)
            } else {
                ("◌", Color::DarkGray)
            };
            ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(marker_color)),
                Span::raw(" "),
                Span::styled(
                    truncate_str(&instance.title, 24),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    format!(" ({})", instance.status.label()),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" Instances "))
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default();
    if !app.instances.is_empty() {
        state.select(Some(app.selected));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_detail(frame: &mut Frame, app: &App, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(area);

    let selected = match app.active_tab {
        Tab::Preview => 0,
        Tab::Diff => 1,
    };
    let tabs = Tabs::new(vec!["Preview", "Diff"])
        .select(selected)
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, rows[0]);

    match app.active_tab {
        Tab::Preview => render_preview(frame, app, rows[1]),
        Tab::Diff => render_diff(frame, app, rows[1]),
    }
}

fn render_preview(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Session ");
    if app.instances.is_empty() {
        let hint = hint_line(app, KeyAction::NewInstance, "create an instance");
        frame.render_widget(Paragraph::new(hint).block(block), area);
        return;
    }

    let text = app
        .preview_text
        .into_text()
        .unwrap_or_else(|_| Text::from(app.preview_text.as_str()));
    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn render_diff(frame: &mut Frame, app: &App, area: Rect) {
    let Some(view) = app.navigator.current() else {
        let block = Block::default().borders(Borders::ALL).title(" Diff ");
        frame.render_widget(
            Paragraph::new("No bookmarks yet. Press b to create one.").block(block),
            area,
        );
        return;
    };

    let position = format!(
        " {} — {} [{}/{}] ",
        view.title,
        view.description,
        app.navigator.cursor() + 1,
        app.navigator.len()
    );
    let mut block = Block::default().borders(Borders::ALL).title(position);
    if app.navigator.can_navigate() {
        block = block.title_bottom(Line::from(" [ older / newer ] ").right_aligned());
    }

    match app.navigator.rendered() {
        Some(diff) => {
            let text = diff
                .into_text()
                .unwrap_or_else(|_| Text::from(diff));
            frame.render_widget(Paragraph::new(text).block(block), area);
        }
        None => {
            frame.render_widget(Paragraph::new("Loading diff...").block(block), area);
        }
    }
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    if let Some(message) = &app.message {
        frame.render_widget(
            Paragraph::new(Span::styled(
                format!(" {}", message),
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )),
            area,
        );
        return;
    }

    let mode = app.state.mode_label();
    let line = if mode.is_empty() {
        let hints = [
            (KeyAction::NewInstance, "new"),
            (KeyAction::Attach, "attach"),
            (KeyAction::Kill, "kill"),
            (KeyAction::Bookmark, "bookmark"),
            (KeyAction::ToggleTab, "diff"),
            (KeyAction::Help, "help"),
            (KeyAction::Quit, "quit"),
        ];
        let mut spans = Vec::new();
        for (action, label) in hints {
            if let Some(code) = app.keymap.key_for(action) {
                // A freshly pressed key inverts its hint for a moment.
                let (key_style, label_style) = if app.flash == Some(action) {
                    (
                        Style::default()
                            .fg(Color::Black)
                            .bg(Color::Yellow)
                            .add_modifier(Modifier::BOLD),
                        Style::default().fg(Color::Black).bg(Color::Yellow),
                    )
                } else {
                    (
                        Style::default()
                            .fg(Color::Yellow)
                            .add_modifier(Modifier::BOLD),
                        Style::default().fg(Color::DarkGray),
                    )
                };
                spans.push(Span::styled(format!(" {}", key_display_name(code)), key_style));
                spans.push(Span::styled(format!(" {} ", label), label_style));
            }
        }
        Line::from(spans)
    } else {
        Line::from(Span::styled(
            format!(" -- {} --", mode),
            Style::default().fg(Color::Cyan),
        ))
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn render_overlay(frame: &mut Frame, app: &App, area: Rect) {
    match &app.state {
        AppState::Default => {}

        AppState::NamingInstance(overlay) => {
            let popup = centered_rect(60, 3, area);
            frame.render_widget(Clear, popup);
            let title = if overlay.with_prompt {
                " Instance name (prompt follows) "
            } else {
                " Instance name "
            };
            overlay.input.render(frame, popup, title);
        }

        AppState::Prompting(overlay) => {
            let popup = centered_rect(70, 3, area);
            frame.render_widget(Clear, popup);
            let title = format!(" Prompt for '{}' ", overlay.instance_name);
            overlay.input.render(frame, popup, &title);
        }

        AppState::Help(overlay) => HelpModal::new(overlay.kind).render(frame, area),

        AppState::Confirming { prompt } => ConfirmModal::render(frame, area, prompt),

        AppState::SelectingBranch(overlay) => {
            let popup = centered_rect(50, 16, area);
            frame.render_widget(Clear, popup);
            let title = if overlay.loading {
                " Branches (loading...) "
            } else {
                " Check out branch "
            };
            overlay.picker.render(frame, popup, title);
        }

        AppState::ErrorLog { scroll } => {
            let popup = centered_rect(76, 20, area);
            frame.render_widget(Clear, popup);
            let lines: Vec<Line> = if app.errors.is_empty() {
                vec![Line::from("No errors this session.")]
            } else {
                app.errors
                    .newest_first()
                    .map(|e| Line::from(Span::styled(e, Style::default().fg(Color::Red))))
                    .collect()
            };
            frame.render_widget(
                Paragraph::new(lines)
                    .block(
                        Block::default()
                            .borders(Borders::ALL)
                            .title(format!(" Errors ({}) ", app.errors.len())),
                    )
                    .wrap(Wrap { trim: false })
                    .scroll((*scroll, 0)),
                popup,
            );
        }

        AppState::ReviewingPr(overlay) => {
            let popup = centered_rect(76, 20, area);
            frame.render_widget(Clear, popup);
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(2), Constraint::Min(0)])
                .split(popup);
            frame.render_widget(
                Paragraph::new(format!("#{} {}", overlay.pr.number, overlay.pr.title))
                    .style(Style::default().add_modifier(Modifier::BOLD)),
                rows[0],
            );
            overlay.picker.render(frame, rows[1], " Comments ");
        }

        AppState::CommentDetail(overlay) => {
            let Some(comment) = overlay.parent.pr.comment(overlay.index) else {
                return;
            };
            let popup = centered_rect(70, 18, area);
            frame.render_widget(Clear, popup);
            let title = match &comment.path {
                Some(path) => format!(" {} on {} ", comment.author, path),
                None => format!(" {} ", comment.author),
            };
            frame.render_widget(
                Paragraph::new(comment.body.as_str())
                    .block(Block::default().borders(Borders::ALL).title(title))
                    .wrap(Wrap { trim: false })
                    .scroll((overlay.scroll, 0)),
                popup,
            );
        }

        AppState::Bookmarking { input } => {
            let popup = centered_rect(60, 3, area);
            frame.render_widget(Clear, popup);
            input.render(frame, popup, " Bookmark message ");
        }

        AppState::History { lines, scroll } => {
            let popup = centered_rect(76, 20, area);
            frame.render_widget(Clear, popup);
            let text: Vec<Line> = lines.iter().map(|l| Line::from(l.as_str())).collect();
            frame.render_widget(
                Paragraph::new(text)
                    .block(Block::default().borders(Borders::ALL).title(" History "))
                    .scroll((*scroll, 0)),
                popup,
            );
        }

        AppState::GitStatus { text, scroll } => {
            let popup = centered_rect(70, 18, area);
            frame.render_widget(Clear, popup);
            frame.render_widget(
                Paragraph::new(text.as_str())
                    .block(Block::default().borders(Borders::ALL).title(" Git status "))
                    .scroll((*scroll, 0)),
                popup,
            );
        }

        AppState::EditingKeybindings(overlay) => {
            let popup = centered_rect(60, 22, area);
            frame.render_widget(Clear, popup);
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(0), Constraint::Length(1)])
                .split(popup);
            overlay.picker.render(frame, rows[0], " Keybindings ");
            let hint = match overlay.awaiting {
                Some(action) => format!("press the new key for '{}'", action.label()),
                None => "enter: rebind  esc: close".to_string(),
            };
            frame.render_widget(
                Paragraph::new(Span::styled(hint, Style::default().fg(Color::DarkGray))),
                rows[1],
            );
        }
    }
}

fn hint_line(app: &App, action: KeyAction, label: &str) -> Line<'static> {
    let key = app
        .keymap
        .key_for(action)
        .map(key_display_name)
        .unwrap_or_else(|| "?".to_string());
    Line::from(vec![
        Span::styled("Press ", Style::default().fg(Color::Gray)),
        Span::styled(
            key,
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!(" to {}.", label), Style::default().fg(Color::Gray)),
    ])
}
