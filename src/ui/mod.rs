//! Terminal user interface built on [ratatui](https://github.com/ratatui-org/ratatui).
//!
//! - **[`app`]**: application state, the event loop that drives the playback
//!   timer, pane focus, language switching
//! - **[`panes`]**: stateless render functions for each pane
//! - **[`theme`]**: the color palette shared by all panes
//!
//! Construct an [`App`] around a [`Playback`](crate::playback::Playback) and
//! call [`App::run`](app::App::run).

pub mod app;
pub mod panes;
pub mod theme;

pub use app::App;
