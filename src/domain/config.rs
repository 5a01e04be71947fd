//! Construction-time settings of an editing domain.

use crate::base::{ResourceOptions, RunOptions};
use crate::interchange::{JsonFormat, MemoryStore, ResourceFormat, ResourceStore};
use crate::undo::{DEFAULT_FLUSH_COUNT, DEFAULT_MAX_UNDO};
use std::sync::Arc;

/// Settings and collaborators of an [`EditingDomain`](super::EditingDomain).
#[derive(Clone)]
pub struct DomainConfig {
    /// Retained undo intervals before the oldest are flushed. `None` keeps all.
    pub max_undo_depth: Option<usize>,
    /// Intervals flushed at once when `max_undo_depth` is exceeded.
    pub flush_count: usize,
    /// Options added to every action.
    pub default_run_options: RunOptions,
    /// Options added to every resource operation.
    pub default_resource_options: ResourceOptions,
    pub format: Arc<dyn ResourceFormat>,
    pub store: Arc<dyn ResourceStore>,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            max_undo_depth: Some(DEFAULT_MAX_UNDO),
            flush_count: DEFAULT_FLUSH_COUNT,
            default_run_options: RunOptions::empty(),
            default_resource_options: ResourceOptions::empty(),
            format: Arc::new(JsonFormat),
            store: Arc::new(MemoryStore::new()),
        }
    }
}

impl DomainConfig {
    pub fn with_max_undo_depth(mut self, depth: Option<usize>) -> Self {
        self.max_undo_depth = depth;
        self
    }

    pub fn with_flush_count(mut self, count: usize) -> Self {
        self.flush_count = count;
        self
    }

    pub fn with_run_options(mut self, options: RunOptions) -> Self {
        self.default_run_options = options;
        self
    }

    pub fn with_resource_options(mut self, options: ResourceOptions) -> Self {
        self.default_resource_options = options;
        self
    }

    pub fn with_format(mut self, format: Arc<dyn ResourceFormat>) -> Self {
        self.format = format;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ResourceStore>) -> Self {
        self.store = store;
        self
    }
}

impl std::fmt::Debug for DomainConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainConfig")
            .field("max_undo_depth", &self.max_undo_depth)
            .field("flush_count", &self.flush_count)
            .field("default_run_options", &self.default_run_options)
            .field("default_resource_options", &self.default_resource_options)
            .field("format", &self.format.name())
            .finish_non_exhaustive()
    }
}
