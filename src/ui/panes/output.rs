//! Program output pane

use super::utils::{pane_block, visible_window, ScrollState};
use crate::snapshot::{OutputLog, Stream};
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::Style,
    widgets::{List, ListItem, Padding, Paragraph},
    Frame,
};

pub fn render_output_pane(
    frame: &mut Frame,
    area: Rect,
    output: &OutputLog,
    is_focused: bool,
    scroll_state: &mut ScrollState,
) {
    let title = match output.dropped() {
        0 => " Output ".to_string(),
        n => format!(" Output ({} dropped) ", n),
    };
    let block = pane_block(title, is_focused);
    let lines = output.lines();

    if lines.is_empty() {
        let paragraph = Paragraph::new("(no output)")
            .block(block)
            .style(Style::default().fg(DEFAULT_THEME.comment));
        frame.render_widget(paragraph, area);
        return;
    }

    let block = block.padding(Padding::new(1, 0, 0, 0));
    let all_items: Vec<ListItem> = lines
        .into_iter()
        .map(|(stream, text)| {
            let color = match stream {
                Stream::Stdout => DEFAULT_THEME.fg,
                Stream::Stderr => DEFAULT_THEME.error,
            };
            ListItem::new(text).style(Style::default().fg(color))
        })
        .collect();

    let visible_items = visible_window(all_items, area, scroll_state, true);
    frame.render_widget(List::new(visible_items).block(block), area);
}
