use crate::base::IntervalId;
use crate::model::Change;
use smol_str::SmolStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UndoError {
    #[error("{0} cannot be undone")]
    NotUndoable(IntervalId),
    #[error("{0} cannot be redone")]
    NotRedoable(IntervalId),
    #[error("{0} is not in the history")]
    IntervalNotFound(IntervalId),
    #[error("an undo interval is already open")]
    IntervalOpen,
    #[error("no undo interval is open")]
    NoOpenInterval,
}

/// The recorded changes of one outermost write action, or of an
/// explicitly opened interval spanning several.
#[derive(Clone, Debug)]
pub struct UndoInterval {
    id: IntervalId,
    label: SmolStr,
    description: String,
    pub(crate) changes: Vec<Change>,
    pub(crate) undoable: bool,
    pub(crate) redoable: bool,
}

impl UndoInterval {
    pub(crate) fn new(id: IntervalId, label: &str, description: &str) -> Self {
        Self {
            id,
            label: SmolStr::new(label),
            description: description.to_string(),
            changes: Vec::new(),
            undoable: true,
            redoable: true,
        }
    }

    pub fn id(&self) -> IntervalId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn is_undoable(&self) -> bool {
        self.undoable
    }

    pub fn is_redoable(&self) -> bool {
        self.redoable
    }
}
