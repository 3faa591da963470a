//! Call stack pane
//!
//! One block per frame, outermost first, with the active frame marked and
//! each variable's value inline. References show the heap id they point at.

use super::utils::{binding_spans, pane_block, visible_window, ScrollState};
use crate::snapshot::Snapshot;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem},
    Frame,
};

pub fn render_stack_pane(
    frame: &mut Frame,
    area: Rect,
    snapshot: &Snapshot,
    is_focused: bool,
    scroll_state: &mut ScrollState,
) {
    let block = pane_block(" Call Stack ".to_string(), is_focused);
    let content_width = area.width.saturating_sub(2) as usize;
    let mut all_items = Vec::new();

    if snapshot.stack.is_empty() {
        all_items.push(ListItem::new("(not started)").style(Style::default().fg(DEFAULT_THEME.comment)));
    }

    for (depth, stack_frame) in snapshot.stack.iter().enumerate() {
        let name_style = if stack_frame.active {
            Style::default()
                .fg(DEFAULT_THEME.function)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(DEFAULT_THEME.comment)
        };
        let mut header = vec![
            Span::styled(
                if stack_frame.active { "▸ " } else { "  " },
                Style::default().fg(DEFAULT_THEME.secondary),
            ),
            Span::styled(format!("Frame {} ", depth), Style::default().fg(DEFAULT_THEME.comment)),
            Span::styled("│ ", Style::default().fg(DEFAULT_THEME.comment)),
            Span::styled(stack_frame.name.clone(), name_style),
        ];
        if stack_frame.variables.is_empty() {
            header.push(Span::styled("  (no variables)", Style::default().fg(DEFAULT_THEME.comment)));
        }
        all_items.push(ListItem::new(Line::from(header)));

        for var in &stack_frame.variables {
            let mut spans = vec![Span::raw("  ")];
            spans.extend(binding_spans(var, var.name.clone(), content_width.saturating_sub(2)));
            all_items.push(ListItem::new(Line::from(spans)));
        }

        if depth + 1 < snapshot.stack.len() {
            all_items.push(ListItem::new(""));
        }
    }

    let visible_items = visible_window(all_items, area, scroll_state, true);
    frame.render_widget(List::new(visible_items).block(block), area);
}
