//! Errors surfaced by the editing domain.

use super::validation::ValidationStatus;
use crate::action::ActionError;
use crate::base::{ElementId, IntervalId, ResourceId, Uri};
use crate::interchange::InterchangeError;
use crate::model::ModelError;
use crate::notify::DispatchError;
use crate::undo::UndoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    /// Validation of a write action found errors; its changes were rolled back.
    #[error("action abandoned: {0}")]
    ActionAbandoned(ValidationStatus),

    #[error("cannot separate '{element}': {reason}")]
    CannotSeparate { element: ElementId, reason: String },

    #[error("cannot absorb '{element}': {reason}")]
    CannotAbsorb { element: ElementId, reason: String },

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("aborted loading '{uri}': {source}")]
    AbortResourceLoad {
        uri: Uri,
        #[source]
        source: InterchangeError,
    },

    #[error("failed to save '{uri}': {source}")]
    Save {
        uri: Uri,
        #[source]
        source: InterchangeError,
    },

    #[error("undo interval {0} cannot be undone")]
    NotUndoable(IntervalId),

    #[error("undo interval {0} cannot be redone")]
    NotRedoable(IntervalId),

    #[error("unknown object '{0}'")]
    UnknownObject(ElementId),

    #[error("unknown resource {0}")]
    UnknownResource(ResourceId),

    #[error("feature '{feature}' is not defined on class '{class}'")]
    InvalidFeature { class: String, feature: String },

    #[error("a resource named '{0}' already exists")]
    ResourceExists(Uri),

    #[error(transparent)]
    Listener(#[from] DispatchError),

    #[error(transparent)]
    Model(ModelError),

    #[error(transparent)]
    Undo(UndoError),
}

impl DomainError {
    pub fn illegal(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }

    pub fn cannot_separate(element: &ElementId, reason: impl Into<String>) -> Self {
        Self::CannotSeparate {
            element: element.clone(),
            reason: reason.into(),
        }
    }

    pub fn cannot_absorb(element: &ElementId, reason: impl Into<String>) -> Self {
        Self::CannotAbsorb {
            element: element.clone(),
            reason: reason.into(),
        }
    }

    /// Expected refusals a caller is meant to handle, as opposed to
    /// misuse of the action protocol.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DomainError::ActionAbandoned(_)
                | DomainError::CannotSeparate { .. }
                | DomainError::CannotAbsorb { .. }
                | DomainError::NotUndoable(_)
                | DomainError::NotRedoable(_)
        )
    }
}

impl From<ActionError> for DomainError {
    fn from(e: ActionError) -> Self {
        match e {
            ActionError::IllegalState { message } => DomainError::IllegalState(message),
        }
    }
}

impl From<ModelError> for DomainError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::UnknownObject(id) => DomainError::UnknownObject(id),
            ModelError::UnknownResource(id) => DomainError::UnknownResource(id),
            ModelError::InvalidFeature { class, feature } => {
                DomainError::InvalidFeature { class, feature }
            }
            other => DomainError::Model(other),
        }
    }
}

impl From<UndoError> for DomainError {
    fn from(e: UndoError) -> Self {
        match e {
            UndoError::NotUndoable(id) => DomainError::NotUndoable(id),
            UndoError::NotRedoable(id) => DomainError::NotRedoable(id),
            other => DomainError::Undo(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refusals_are_recoverable() {
        let e = DomainError::cannot_separate(&ElementId::new("a"), "same unit");
        assert!(e.is_recoverable());
        assert!(DomainError::from(UndoError::NotUndoable(IntervalId(3))).is_recoverable());
        assert!(!DomainError::illegal("no action").is_recoverable());
    }

    #[test]
    fn test_model_errors_fold_into_domain_variants() {
        let e = DomainError::from(ModelError::UnknownObject(ElementId::new("x")));
        assert!(matches!(e, DomainError::UnknownObject(_)));
        let e = DomainError::from(ModelError::inconsistent("bad"));
        assert!(matches!(e, DomainError::Model(_)));
    }
}
