//! Status bar with keybindings and playback state

use crate::language::BackendKind;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

/// Everything the status bar shows
pub struct StatusRenderData<'a> {
    pub message: &'a str,
    pub steps: usize,
    pub backend: Option<BackendKind>,
    pub speed_ms: u64,
    pub is_playing: bool,
    pub is_finished: bool,
    pub has_error: bool,
    pub can_step_back: bool,
}

pub fn render_status_bar(frame: &mut Frame, area: Rect, data: StatusRenderData) {
    let layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let badge_bg = if data.has_error {
        DEFAULT_THEME.error
    } else {
        DEFAULT_THEME.primary
    };
    let backend = data
        .backend
        .map(|b| b.to_string())
        .unwrap_or_else(|| "idle".to_string());
    let bar = Style::default().bg(DEFAULT_THEME.current_line_bg);

    let left_spans = vec![
        Span::styled(
            format!(" Step {} ", data.steps),
            Style::default()
                .bg(badge_bg)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!(" {} · {}ms ", backend, data.speed_ms), bar.fg(DEFAULT_THEME.comment)),
        Span::styled("│", bar.fg(DEFAULT_THEME.comment)),
        Span::styled(
            format!(" {} ", data.message),
            bar.fg(if data.has_error {
                DEFAULT_THEME.error
            } else {
                DEFAULT_THEME.fg
            }),
        ),
    ];
    frame.render_widget(
        Paragraph::new(Line::from(left_spans)).style(bar).alignment(Alignment::Left),
        layout[0],
    );

    let key_style = Style::default().bg(DEFAULT_THEME.comment).fg(Color::Black);
    let desc_style = bar.fg(DEFAULT_THEME.fg);
    let sep_style = bar.fg(DEFAULT_THEME.comment);

    let mut keys = vec![("→", "step"), ("⎵", "play"), ("r", "reset"), ("+/-", "speed"), ("l", "lang")];
    if data.can_step_back {
        keys.insert(0, ("←", "back"));
    }
    keys.push(("q", "quit"));

    let mut right_spans = Vec::new();
    for (i, (key, desc)) in keys.iter().enumerate() {
        if i > 0 {
            right_spans.push(Span::styled("│", sep_style));
        }
        right_spans.push(Span::styled(format!(" {} ", key), key_style));
        right_spans.push(Span::styled(format!(" {} ", desc), desc_style));
    }

    let indicator = if data.has_error {
        Some((" ERROR ", DEFAULT_THEME.error))
    } else if data.is_playing {
        Some((" ▶ PLAYING ", DEFAULT_THEME.secondary))
    } else if data.is_finished {
        Some((" END ", DEFAULT_THEME.success))
    } else {
        None
    };
    if let Some((label, color)) = indicator {
        right_spans.push(Span::styled("│", sep_style));
        right_spans.push(Span::styled(
            label,
            Style::default()
                .bg(color)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        ));
    }

    frame.render_widget(
        Paragraph::new(Line::from(right_spans)).style(bar).alignment(Alignment::Right),
        layout[1],
    );
}
