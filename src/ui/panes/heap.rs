//! Heap pane
//!
//! Objects in snapshot order. An object mutated by the last step is drawn on
//! a tinted background; array-likes list their elements as `[i]`.

use super::utils::{binding_spans, pane_block, visible_window, ScrollState};
use crate::snapshot::{HeapObject, Snapshot};
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem},
    Frame,
};

/// Array-likes use consecutive stringified indices as property names
fn is_indexed(obj: &HeapObject) -> bool {
    obj.properties
        .iter()
        .enumerate()
        .all(|(i, p)| p.name == i.to_string())
}

pub fn render_heap_pane(
    frame: &mut Frame,
    area: Rect,
    snapshot: &Snapshot,
    is_focused: bool,
    scroll_state: &mut ScrollState,
) {
    let title = format!(" Heap ({}) ", snapshot.heap.len());
    let block = pane_block(title, is_focused);
    let content_width = area.width.saturating_sub(2) as usize;
    let mut all_items = Vec::new();

    if snapshot.heap.is_empty() {
        all_items.push(ListItem::new("(no objects)").style(Style::default().fg(DEFAULT_THEME.comment)));
    }

    for obj in &snapshot.heap {
        let row_style = if obj.highlight {
            Style::default().bg(DEFAULT_THEME.highlight_bg)
        } else {
            Style::default()
        };
        let header = Line::from(vec![
            Span::styled(obj.id.clone(), Style::default().fg(DEFAULT_THEME.reference)),
            Span::styled(" │ ", Style::default().fg(DEFAULT_THEME.comment)),
            Span::styled(
                obj.class_name.clone(),
                Style::default()
                    .fg(DEFAULT_THEME.type_name)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(" ({})", obj.properties.len()),
                Style::default().fg(DEFAULT_THEME.comment),
            ),
        ]);
        all_items.push(ListItem::new(header).style(row_style));

        let indexed = is_indexed(obj);
        for prop in &obj.properties {
            let name = if indexed {
                format!("[{}]", prop.name)
            } else {
                prop.name.clone()
            };
            let mut spans = vec![Span::raw("  ")];
            spans.extend(binding_spans(prop, name, content_width.saturating_sub(2)));
            all_items.push(ListItem::new(Line::from(spans)).style(row_style));
        }
    }

    let visible_items = visible_window(all_items, area, scroll_state, false);
    frame.render_widget(List::new(visible_items).block(block), area);
}
