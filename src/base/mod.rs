//! Foundation types for the editing domain.
//!
//! - [`ElementId`] - Persistent identity of a model object
//! - [`ResourceId`], [`IntervalId`], [`ListenerId`] - Registry handles
//! - [`Uri`] - Resource and storage-unit addresses
//! - [`RunOptions`], [`ResourceOptions`], [`DestroyOptions`] - Operation flags
//!
//! This module has NO dependencies on other txmodel modules.

mod id;
mod options;
mod uri;

pub use id::{ElementId, IntervalId, ListenerId, ResourceId};
pub use options::{DestroyOptions, ResourceOptions, RunOptions};
pub use uri::{PATHMAP_SCHEME, Uri};
