//! # txmodel-base
//!
//! Transactional editing of an object graph: scoped read/write actions,
//! undo intervals, batched change notifications and resources that may be
//! split across several physical storage units.
//!
//! ## Module Structure (dependency order)
//!
//! ```text
//! domain       → EditingDomain façade, resource lifecycle, path variables
//!   ↓
//! logical      → Logical resources, separation policies
//!   ↓
//! interchange  → Unit snapshots, formats, stores
//! undo         → Undo intervals and history
//! action       → Per-thread action frames, single writer
//!   ↓
//! model        → Schema, object arena, reversible changes
//!   ⇅            (applying a change yields its notification)
//! notify       → Notifications, filters, broker, demultiplexer
//!   ↓
//! base         → Primitives (ids, Uri, option flags)
//! ```
//!
//! ## Example
//!
//! ```
//! use txmodel::{EditingDomain, ResourceOptions, Schema};
//!
//! let mut builder = Schema::builder();
//! let node = builder.class("Node", &[]);
//! let children = builder.containment(node, "children", true);
//! let domain = EditingDomain::new(builder.build());
//!
//! let resource = domain.create_resource("mem:/model.json", ResourceOptions::AS_URI).unwrap();
//! let outcome = domain
//!     .run_as_write("build", |d| {
//!         let root = d.create(node)?;
//!         d.add_root(resource, &root)?;
//!         let child = d.create(node)?;
//!         d.add(&root, children, &child)?;
//!         Ok::<_, txmodel::DomainError>(root)
//!     })
//!     .unwrap();
//!
//! let interval = outcome.completion.interval.unwrap();
//! domain.undo(interval).unwrap();
//! assert!(!domain.contains(&outcome.value));
//! ```

// ============================================================================
// MODULES (dependency order: base → notify/model → action/undo → ...)
// ============================================================================

/// Foundation types: ElementId, ResourceId, IntervalId, Uri
pub mod base;

/// Schema table, values, object arena and reversible changes
pub mod model;

/// Notifications, filters, event broker and demultiplexer
pub mod notify;

/// Action frames and the single-writer discipline
pub mod action;

/// Undo intervals and history
pub mod undo;

/// Logical resources split across physical units
pub mod logical;

/// Unit persistence: snapshots, formats (JSON), stores
pub mod interchange;

/// The editing domain façade
pub mod domain;

// Re-export foundation types
pub use base::{
    DestroyOptions, ElementId, IntervalId, ListenerId, ResourceId, ResourceOptions, RunOptions, Uri,
};

// Re-export the façade and the types most callers need
pub use domain::{
    ActionScope, Completion, DomainConfig, DomainError, DomainRegistry, EditingDomain, Outcome,
    Severity, ValidationMessage, ValidationStatus,
};
pub use logical::{LogicalResource, SeparationPolicy};
pub use model::{ClassId, FeatureId, Schema, SchemaBuilder, Value};
pub use notify::{DemuxHandler, Demultiplexer, EventKind, Filter, Listener, Notification};
