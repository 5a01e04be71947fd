//! Read/write/unchecked action frames.

mod stack;

pub use stack::{ActionError, ActionKind, ActionStack, Checkpoint, Frame, Popped};
