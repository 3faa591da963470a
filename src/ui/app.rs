//! Main TUI application state and event loop

use super::panes::{self, ScrollState, SourceScrollState, StatusRenderData};
use crate::cache::SourceCache;
use crate::language::Language;
use crate::playback::Playback;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    Frame, Terminal,
};
use std::io;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// How long the loop waits for a key before checking the play timer
const POLL_INTERVAL: Duration = Duration::from_millis(30);

/// Speed change per `+`/`-` press
const SPEED_STEP_MS: u64 = 100;

/// Which pane is currently focused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPane {
    Source,
    Output,
    Stack,
    Heap,
}

impl FocusedPane {
    /// Clockwise: source -> output -> stack -> heap
    pub fn next(self) -> Self {
        match self {
            FocusedPane::Source => FocusedPane::Output,
            FocusedPane::Output => FocusedPane::Stack,
            FocusedPane::Stack => FocusedPane::Heap,
            FocusedPane::Heap => FocusedPane::Source,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            FocusedPane::Source => FocusedPane::Heap,
            FocusedPane::Output => FocusedPane::Source,
            FocusedPane::Stack => FocusedPane::Output,
            FocusedPane::Heap => FocusedPane::Stack,
        }
    }
}

pub struct App {
    pub playback: Playback,
    pub cache: SourceCache,

    pub focused_pane: FocusedPane,
    pub source_scroll: SourceScrollState,
    pub stack_scroll: ScrollState,
    pub heap_scroll: ScrollState,
    pub output_scroll: ScrollState,

    pub should_quit: bool,
    pub status_message: String,
}

impl App {
    /// `playback` should already have a program loaded
    pub fn new(playback: Playback, cache: SourceCache) -> Self {
        App {
            playback,
            cache,
            focused_pane: FocusedPane::Source,
            source_scroll: SourceScrollState::default(),
            stack_scroll: ScrollState::default(),
            heap_scroll: ScrollState::default(),
            output_scroll: ScrollState::default(),
            should_quit: false,
            status_message: String::from("Ready! Press space to play"),
        }
    }

    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;

            if self.should_quit {
                break;
            }

            if self.playback.tick(Instant::now()) {
                self.after_step();
            }

            if event::poll(POLL_INTERVAL)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key_event(key);
                    }
                }
            }
        }

        self.remember_source();
        if let Err(e) = self.cache.save() {
            warn!(error = %e, "could not save the source cache");
        }
        Ok(())
    }

    fn render(&mut self, frame: &mut Frame) {
        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(frame.area());

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(main_chunks[0]);

        let left_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
            .split(columns[0]);

        let right_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(columns[1]);

        let playback = &self.playback;
        panes::render_source_pane(
            frame,
            left_rows[0],
            playback.source(),
            playback.language(),
            playback.active_line(),
            playback.error().is_some(),
            self.focused_pane == FocusedPane::Source,
            &mut self.source_scroll,
        );
        panes::render_output_pane(
            frame,
            left_rows[1],
            playback.output(),
            self.focused_pane == FocusedPane::Output,
            &mut self.output_scroll,
        );
        panes::render_stack_pane(
            frame,
            right_rows[0],
            playback.snapshot(),
            self.focused_pane == FocusedPane::Stack,
            &mut self.stack_scroll,
        );
        panes::render_heap_pane(
            frame,
            right_rows[1],
            playback.snapshot(),
            self.focused_pane == FocusedPane::Heap,
            &mut self.heap_scroll,
        );
        panes::render_status_bar(
            frame,
            main_chunks[1],
            StatusRenderData {
                message: &self.status_message,
                steps: playback.steps_taken(),
                backend: playback.backend_kind(),
                speed_ms: playback.speed_ms(),
                is_playing: playback.is_playing(),
                is_finished: playback.is_finished(),
                has_error: playback.error().is_some(),
                can_step_back: playback.can_step_back(),
            },
        );
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => self.should_quit = true,
            KeyCode::Tab => self.focused_pane = self.focused_pane.next(),
            KeyCode::BackTab => self.focused_pane = self.focused_pane.prev(),
            KeyCode::Right => {
                self.playback.pause();
                self.playback.step_once();
                self.after_step();
            }
            KeyCode::Left => {
                self.playback.pause();
                if self.playback.step_back() {
                    self.status_message = "Stepped back".to_string();
                } else {
                    self.status_message = "Cannot step back here".to_string();
                }
            }
            KeyCode::Char(' ') => {
                if self.playback.is_playing() {
                    self.playback.pause();
                    self.status_message = "Paused".to_string();
                } else if self.playback.play(Instant::now()) {
                    self.status_message = "Playing...".to_string();
                } else {
                    self.status_message = "Press r to run again".to_string();
                }
            }
            KeyCode::Char('r') | KeyCode::Char('R') => {
                self.playback.reset();
                self.reset_scroll();
                self.status_message = "Reset".to_string();
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                let ms = self.playback.speed_ms().saturating_sub(SPEED_STEP_MS);
                let ms = self.playback.set_speed_ms(ms);
                self.status_message = format!("Speed {}ms", ms);
            }
            KeyCode::Char('-') => {
                let ms = self.playback.set_speed_ms(self.playback.speed_ms() + SPEED_STEP_MS);
                self.status_message = format!("Speed {}ms", ms);
            }
            KeyCode::Char('l') | KeyCode::Char('L') => self.switch_language(),
            KeyCode::Up => match self.focused_pane {
                FocusedPane::Source => {
                    // scrolling up moves the active line down visually
                    if let Some(row) = self.source_scroll.target_line_row {
                        self.source_scroll.target_line_row = Some(row.saturating_add(1));
                    }
                }
                FocusedPane::Stack => self.stack_scroll.offset = self.stack_scroll.offset.saturating_sub(1),
                FocusedPane::Heap => self.heap_scroll.offset = self.heap_scroll.offset.saturating_sub(1),
                FocusedPane::Output => {
                    self.output_scroll.offset = self.output_scroll.offset.saturating_sub(1)
                }
            },
            KeyCode::Down => match self.focused_pane {
                FocusedPane::Source => {
                    if let Some(row) = self.source_scroll.target_line_row {
                        self.source_scroll.target_line_row = Some(row.saturating_sub(1));
                    }
                }
                FocusedPane::Stack => self.stack_scroll.offset += 1,
                FocusedPane::Heap => self.heap_scroll.offset += 1,
                FocusedPane::Output => self.output_scroll.offset += 1,
            },
            _ => {}
        }
    }

    fn after_step(&mut self) {
        self.status_message = match (self.playback.error(), self.playback.is_finished()) {
            (Some(err), _) => err.describe(),
            (None, true) => match self.playback.result() {
                Some(result) => format!("Finished, returned {}", result),
                None => "Program finished".to_string(),
            },
            (None, false) if self.playback.is_playing() => "Playing...".to_string(),
            (None, false) => format!("Line {}", self.playback.active_line()),
        };
    }

    fn reset_scroll(&mut self) {
        self.stack_scroll = ScrollState::default();
        self.heap_scroll = ScrollState::default();
        self.output_scroll = ScrollState::default();
    }

    fn remember_source(&mut self) {
        let language = self.playback.language();
        let source = self.playback.source().to_string();
        self.cache.set(language, source);
    }

    /// Keep the current text, then load the next language's cached text
    fn switch_language(&mut self) {
        self.remember_source();
        let current = self.playback.language();
        let index = Language::ALL.iter().position(|l| *l == current).unwrap_or(0);
        let next = Language::ALL[(index + 1) % Language::ALL.len()];

        let source = self.cache.source_or_starter(next);
        self.playback.load(source, next);
        self.source_scroll = SourceScrollState::default();
        self.reset_scroll();
        info!(language = %next, "switched language");
        self.status_message = format!("Switched to {}", next);
    }
}
