use crate::snapshot::Variable;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::Span,
    widgets::{Block, Borders, ListItem},
};

/// Scroll position of a list pane
#[derive(Debug, Default)]
pub struct ScrollState {
    pub offset: usize,
    pub prev_item_count: usize,
}

pub(super) fn pane_block(title: String, is_focused: bool) -> Block<'static> {
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style)
}

/// Keep the visible slice of `items`, following new content to the bottom
/// only when it grew
pub(super) fn visible_window<'a>(
    items: Vec<ListItem<'a>>,
    area: Rect,
    scroll_state: &mut ScrollState,
    follow_growth: bool,
) -> Vec<ListItem<'a>> {
    let total_items = items.len();
    let visible_height = area.height.saturating_sub(2).max(1) as usize;
    let max_scroll = total_items.saturating_sub(visible_height);

    if follow_growth && total_items > scroll_state.prev_item_count {
        scroll_state.offset = max_scroll;
    } else {
        scroll_state.offset = scroll_state.offset.min(max_scroll);
    }
    scroll_state.prev_item_count = total_items;

    items
        .into_iter()
        .skip(scroll_state.offset)
        .take(visible_height)
        .collect()
}

/// `name = value` spans for a binding or property
pub(super) fn binding_spans(var: &Variable, name_text: String, width: usize) -> Vec<Span<'static>> {
    let name_style = if var.changed {
        Style::default()
            .fg(DEFAULT_THEME.changed)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.fg)
    };
    let value_style = if var.is_reference() {
        Style::default().fg(DEFAULT_THEME.reference)
    } else if var.value.starts_with('"') || var.value.starts_with('\'') {
        Style::default().fg(DEFAULT_THEME.string)
    } else if var.value.parse::<f64>().is_ok() {
        Style::default().fg(DEFAULT_THEME.number)
    } else {
        Style::default().fg(DEFAULT_THEME.fg)
    };
    let value_text = if var.is_reference() {
        format!("→ {}", var.value)
    } else {
        var.value.clone()
    };

    let marker = if var.changed { "● " } else { "  " };
    let used = marker.chars().count() + name_text.chars().count() + 3;
    let value_text = truncate(&value_text, width.saturating_sub(used).max(4));

    vec![
        Span::styled(marker.to_string(), Style::default().fg(DEFAULT_THEME.changed)),
        Span::styled(name_text, name_style),
        Span::styled(" = ", Style::default().fg(DEFAULT_THEME.comment)),
        Span::styled(value_text, value_style),
    ]
}

/// Cut `s` to at most `max_chars` characters, marking the cut with `…`
pub(super) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 6), "hello…");
        assert_eq!(truncate("héllo wörld", 3), "hé…");
    }
}
