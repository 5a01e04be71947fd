//! Error types for persisting and restoring resources.

use crate::base::Uri;
use thiserror::Error;

/// Errors raised at the serialization boundary.
#[derive(Debug, Error)]
pub enum InterchangeError {
    /// Encoding or decoding failed in the format layer.
    #[error("format error: {0}")]
    Format(String),

    /// The store could not read or write bytes.
    #[error("store error for {uri}: {message}")]
    Store { uri: Uri, message: String },

    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot names a class the schema does not define.
    #[error("unknown class: {0}")]
    UnknownClass(String),

    /// The snapshot names a feature the class does not define.
    #[error("unknown feature '{feature}' of class '{class}'")]
    UnknownFeature { class: String, feature: String },

    /// The store refuses writes to this URI.
    #[error("{0} is read-only")]
    ReadOnly(Uri),

    /// Nothing is stored under this URI.
    #[error("{0} not found")]
    NotFound(Uri),

    /// Snapshot content does not describe a consistent tree.
    #[error("invalid {kind}: {message}")]
    Invalid { kind: &'static str, message: String },

    /// Support for the format was compiled out.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl InterchangeError {
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    pub fn store(uri: &Uri, message: impl Into<String>) -> Self {
        Self::Store {
            uri: uri.clone(),
            message: message.into(),
        }
    }

    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::Invalid {
            kind: "record",
            message: message.into(),
        }
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::Invalid {
            kind: "value",
            message: message.into(),
        }
    }
}
