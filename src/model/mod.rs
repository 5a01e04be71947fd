//! The in-memory object graph.
//!
//! Objects live in an arena keyed by [`ElementId`](crate::base::ElementId)
//! and refer to each other by id. Their structure is described by a
//! [`Schema`] resolved once into dense class/feature handles. All changes go
//! through [`ModelState`], which records them as reversible [`Change`]s.

mod change;
mod error;
mod object;
mod resource;
mod schema;
mod state;
mod value;

pub use change::Change;
pub use error::ModelError;
pub use object::{Containment, ModelObject};
pub use resource::{Partition, Resource, ResourceSet};
pub use schema::{ClassDef, ClassId, FeatureDef, FeatureId, FeatureKind, Schema, SchemaBuilder};
pub use state::{GraphSnapshot, ModelState};
pub(crate) use state::Recorder;
pub use value::Value;
