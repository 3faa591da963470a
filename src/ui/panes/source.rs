//! Source code pane with light syntax highlighting
//!
//! The highlighter is a per-line character scan that knows each language's
//! line comment prefixes and a shared keyword list. The active line is kept
//! at a fixed visual row while stepping.

use crate::language::Language;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use super::utils::pane_block;

const KEYWORDS: &[&str] = &[
    "function", "return", "if", "else", "while", "for", "do", "break", "continue", "let", "const",
    "var", "val", "def", "class", "new", "throw", "try", "catch", "in", "of", "fn", "func", "mut",
    "pub", "public", "private", "static", "import", "package", "switch", "case", "default",
    "struct", "not", "and", "or", "elif", "pass", "lambda", "fun", "echo", "typeof",
];

const TYPES: &[&str] = &[
    "int", "char", "void", "bool", "boolean", "float", "double", "long", "string", "String",
    "number", "auto", "usize", "i32", "i64", "f64", "str",
];

const CONSTANTS: &[&str] = &[
    "true", "false", "null", "undefined", "None", "True", "False", "nil", "NULL", "nullptr",
];

fn word_style(word: &str, is_function: bool) -> Style {
    if KEYWORDS.contains(&word) {
        Style::default()
            .fg(DEFAULT_THEME.keyword)
            .add_modifier(Modifier::BOLD)
    } else if TYPES.contains(&word) {
        Style::default().fg(DEFAULT_THEME.type_name)
    } else if CONSTANTS.contains(&word) || word.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        Style::default().fg(DEFAULT_THEME.number)
    } else if is_function {
        Style::default().fg(DEFAULT_THEME.function)
    } else {
        Style::default().fg(DEFAULT_THEME.fg)
    }
}

fn highlight_line(line: &str, language: Language) -> Line<'static> {
    let mut spans = Vec::new();
    let mut word = String::new();
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;

    let flush = |word: &mut String, spans: &mut Vec<Span<'static>>, next: Option<char>| {
        if !word.is_empty() {
            let style = word_style(word, next == Some('('));
            spans.push(Span::styled(std::mem::take(word), style));
        }
    };

    while i < chars.len() {
        let c = chars[i];
        let rest: String = chars[i..].iter().collect();

        if language.line_comments().iter().any(|p| rest.starts_with(p)) {
            flush(&mut word, &mut spans, None);
            spans.push(Span::styled(rest, Style::default().fg(DEFAULT_THEME.comment)));
            break;
        }

        if c == '"' || (c == '\'' && !language.single_quote_is_char()) || c == '`' {
            flush(&mut word, &mut spans, None);
            let mut end = i + 1;
            while end < chars.len() && chars[end] != c {
                end += if chars[end] == '\\' { 2 } else { 1 };
            }
            let end = (end + 1).min(chars.len());
            let text: String = chars[i..end].iter().collect();
            spans.push(Span::styled(text, Style::default().fg(DEFAULT_THEME.string)));
            i = end;
            continue;
        }

        if !c.is_alphanumeric() && c != '_' && c != '$' {
            flush(&mut word, &mut spans, Some(c));
            let style = match c {
                '{' | '}' | '(' | ')' | '[' | ']' => Style::default().fg(DEFAULT_THEME.primary),
                _ => Style::default().fg(DEFAULT_THEME.fg),
            };
            spans.push(Span::styled(c.to_string(), style));
            i += 1;
            continue;
        }

        word.push(c);
        i += 1;
    }
    flush(&mut word, &mut spans, None);

    Line::from(spans)
}

/// Keeps the active line on a fixed row
#[derive(Debug, Default)]
pub struct SourceScrollState {
    pub offset: usize,
    pub target_line_row: Option<usize>,
}

#[allow(clippy::too_many_arguments)]
pub fn render_source_pane(
    frame: &mut Frame,
    area: Rect,
    source_code: &str,
    language: Language,
    current_line: usize,
    is_error: bool,
    is_focused: bool,
    scroll_state: &mut SourceScrollState,
) {
    let block = pane_block(format!(" Source · {} ", language), is_focused);
    let lines: Vec<&str> = source_code.lines().collect();
    let total_lines = lines.len();
    let visible_height = area.height.saturating_sub(2).max(1) as usize;

    let target_row = scroll_state
        .target_line_row
        .unwrap_or(visible_height / 2)
        .min(visible_height.saturating_sub(1));
    scroll_state.target_line_row = Some(target_row);

    if current_line > 0 && current_line <= total_lines {
        let max_scroll = total_lines.saturating_sub(visible_height);
        scroll_state.offset = (current_line - 1).saturating_sub(target_row).min(max_scroll);
    }

    let visible_lines: Vec<Line> = lines
        .iter()
        .enumerate()
        .skip(scroll_state.offset)
        .take(visible_height)
        .map(|(idx, line)| {
            let line_num = idx + 1;
            let is_current = line_num == current_line;
            let mut content = highlight_line(line, language);

            let num_style = if is_current && is_error {
                Style::default()
                    .fg(DEFAULT_THEME.error)
                    .add_modifier(Modifier::BOLD)
            } else if is_current {
                Style::default()
                    .fg(DEFAULT_THEME.secondary)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(DEFAULT_THEME.comment)
            };

            if is_current && is_error {
                let error_style = Style::default()
                    .bg(DEFAULT_THEME.error)
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD);
                for span in &mut content.spans {
                    span.style = error_style;
                }
            } else if is_current {
                let bg = Style::default().bg(DEFAULT_THEME.current_line_bg);
                for span in &mut content.spans {
                    span.style = span.style.patch(bg);
                }
            }

            let marker = if is_current { "▶" } else { " " };
            let mut spans = vec![Span::styled(format!("{:4} {}", line_num, marker), num_style)];
            spans.extend(content.spans);
            Line::from(spans)
        })
        .collect();

    frame.render_widget(Paragraph::new(visible_lines).block(block), area);
}
