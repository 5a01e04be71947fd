//! Undo intervals and their history.

mod interval;
mod stack;

pub use interval::{UndoError, UndoInterval};
pub use stack::{Closed, DEFAULT_FLUSH_COUNT, DEFAULT_MAX_UNDO, UndoStack};
