use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use tuimux_core::{Focus, PollHealth, ViewState};

use crate::app::Mode;
use crate::keymap::BINDINGS;

const ACCENT: Color = Color::Cyan;

pub fn draw(frame: &mut Frame, state: &ViewState, mode: &Mode) {
    let [main, status] = Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).areas(frame.area());
    let [lists, preview] =
        Layout::horizontal([Constraint::Percentage(30), Constraint::Percentage(70)]).areas(main);
    let [sessions, windows] =
        Layout::vertical([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(lists);

    draw_sessions(frame, sessions, state);
    draw_windows(frame, windows, state);
    draw_preview(frame, preview, state);
    draw_status(frame, status, state);

    match mode {
        Mode::Normal => {}
        Mode::Help => draw_help(frame),
        Mode::Prompt(prompt) => {
            let area = centered(frame.area(), 50, 3);
            let input = Paragraph::new(Line::from(vec![
                Span::raw(prompt.input.as_str()),
                Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)),
            ]))
            .block(panel(prompt.title, true));
            frame.render_widget(Clear, area);
            frame.render_widget(input, area);
        }
        Mode::ConfirmAttach(request) => {
            let name = state
                .snapshot
                .session(&request.session)
                .map(|s| s.name.as_str())
                .unwrap_or(request.session.as_str());
            let area = centered(frame.area(), 50, 5);
            let body = Paragraph::new(vec![
                Line::from(format!("Attach to session {}?", name)),
                Line::from(""),
                Line::from("enter/y: attach   esc/n: cancel"),
            ])
            .block(panel("Attach", true));
            frame.render_widget(Clear, area);
            frame.render_widget(body, area);
        }
    }
}

fn panel(title: &str, focused: bool) -> Block<'_> {
    let border = if focused {
        Style::default().fg(ACCENT)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title(format!(" {} ", title))
}

fn highlight() -> Style {
    Style::default()
        .fg(Color::Black)
        .bg(ACCENT)
        .add_modifier(Modifier::BOLD)
}

fn draw_sessions(frame: &mut Frame, area: Rect, state: &ViewState) {
    let items: Vec<ListItem> = state
        .snapshot
        .sessions
        .iter()
        .map(|s| {
            let mut spans = vec![
                Span::raw(s.name.clone()),
                Span::styled(
                    format!("  {}w", s.windows.len()),
                    Style::default().fg(Color::DarkGray),
                ),
            ];
            if s.attached {
                spans.push(Span::styled(" (attached)", Style::default().fg(Color::Green)));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let selected = state
        .selection
        .session
        .as_ref()
        .and_then(|id| state.snapshot.sessions.iter().position(|s| &s.id == id));
    let list = List::new(items)
        .block(panel("Sessions", state.selection.focus == Focus::Sessions))
        .highlight_style(highlight());
    frame.render_stateful_widget(list, area, &mut ListState::default().with_selected(selected));
}

fn draw_windows(frame: &mut Frame, area: Rect, state: &ViewState) {
    let windows = state
        .selected_session()
        .map(|s| s.windows.as_slice())
        .unwrap_or_default();
    let items: Vec<ListItem> = windows
        .iter()
        .map(|w| {
            let marker = if w.active { "*" } else { "" };
            ListItem::new(format!("{}: {}{}", w.index, w.name, marker))
        })
        .collect();

    let selected = state
        .selection
        .window
        .as_ref()
        .and_then(|id| windows.iter().position(|w| &w.id == id));
    let list = List::new(items)
        .block(panel("Windows", state.selection.focus == Focus::Windows))
        .highlight_style(highlight());
    frame.render_stateful_widget(list, area, &mut ListState::default().with_selected(selected));
}

fn draw_preview(frame: &mut Frame, area: Rect, state: &ViewState) {
    let Some(pane) = state.preview_pane() else {
        let empty = Paragraph::new("No pane selected").block(panel("Preview", false));
        frame.render_widget(empty, area);
        return;
    };

    let title = format!("Preview {} ({})", pane.id, pane.command);
    let capture = pane.capture.as_deref().unwrap_or("");
    // Show the bottom of the capture, like the pane itself
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<&str> = capture.lines().collect();
    let start = lines.len().saturating_sub(visible);
    let text: Vec<Line> = lines[start..].iter().map(|l| Line::raw(*l)).collect();

    frame.render_widget(Paragraph::new(text).block(panel(&title, false)), area);
}

fn draw_status(frame: &mut Frame, area: Rect, state: &ViewState) {
    let line = match &state.health {
        PollHealth::Failing { failures, message } => Line::styled(
            format!("tmux unreachable ({} failed polls): {}", failures, message),
            Style::default().fg(Color::White).bg(Color::Red),
        ),
        PollHealth::Degraded { message, .. } => Line::styled(
            format!("Poll failed: {}", message),
            Style::default().fg(Color::Yellow),
        ),
        PollHealth::Healthy => match &state.status {
            Some(status) if status.is_error => {
                Line::styled(status.text.clone(), Style::default().fg(Color::Red))
            }
            Some(status) => Line::raw(status.text.clone()),
            None => Line::styled("h: help", Style::default().fg(Color::DarkGray)),
        },
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_help(frame: &mut Frame) {
    let lines: Vec<Line> = BINDINGS
        .iter()
        .map(|(keys, description)| {
            Line::from(vec![
                Span::styled(format!("{:>12}  ", keys), Style::default().fg(ACCENT)),
                Span::raw(*description),
            ])
        })
        .collect();
    let area = centered(frame.area(), 56, lines.len() as u16 + 2);
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines)
            .block(panel("Help", true))
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
