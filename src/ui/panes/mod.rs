//! TUI pane rendering
//!
//! - [`source`]: program text with the active line pinned to a fixed row
//! - [`stack`]: call frames and their variables
//! - [`heap`]: objects with their properties, mutated ones tinted
//! - [`output`]: stdout and stderr lines
//! - [`status`]: step count, backend, keybindings
//!
//! Each pane exports one `render_*` function; list panes share the scroll
//! handling in `utils`.

mod utils;

pub mod heap;
pub mod output;
pub mod source;
pub mod stack;
pub mod status;

pub use heap::render_heap_pane;
pub use output::render_output_pane;
pub use source::{render_source_pane, SourceScrollState};
pub use stack::render_stack_pane;
pub use status::{render_status_bar, StatusRenderData};
pub use utils::ScrollState;
