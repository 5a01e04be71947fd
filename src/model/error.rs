//! Errors raised while changing the object graph.

use crate::base::{ElementId, ResourceId};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("unknown object '{0}'")]
    UnknownObject(ElementId),

    #[error("object '{0}' is a proxy and cannot be modified")]
    Proxy(ElementId),

    #[error("unknown resource {0}")]
    UnknownResource(ResourceId),

    #[error("unknown class #{0}")]
    UnknownClass(u32),

    #[error("class '{0}' is abstract")]
    AbstractClass(String),

    #[error("an object with id '{0}' already exists")]
    DuplicateId(ElementId),

    #[error("feature '{feature}' is not defined on class '{class}'")]
    InvalidFeature { class: String, feature: String },

    #[error("feature '{feature}' is {shape}")]
    Multiplicity { feature: String, shape: &'static str },

    #[error("feature '{feature}': {message}")]
    TypeMismatch { feature: String, message: String },

    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("containing '{0}' would create a containment cycle")]
    ContainmentCycle(ElementId),

    #[error("feature '{feature}' already holds '{value}'")]
    DuplicateValue { feature: String, value: ElementId },

    #[error("change does not match the current graph: {0}")]
    Inconsistent(String),
}

impl ModelError {
    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::Inconsistent(message.into())
    }
}
