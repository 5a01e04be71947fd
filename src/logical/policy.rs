//! Separation policies.
//!
//! Policies are consulted around every separate and absorb. A policy may
//! veto the operation, suggest a unit when the caller gave none, or just
//! observe. Any other failure is logged and ignored.

use super::LogicalResource;
use crate::base::{ElementId, Uri};
use crate::model::{ClassId, Schema};
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{trace, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// The policy refuses the operation.
    #[error("vetoed: {0}")]
    Veto(String),
    /// The policy itself failed; the operation goes ahead.
    #[error("policy failed: {0}")]
    Failed(String),
}

/// Hooks around partitioning operations. Every hook defaults to agreeing.
#[allow(unused_variables)]
pub trait SeparationPolicy: Send + Sync {
    fn can_separate(&self, resource: &LogicalResource, element: &ElementId) -> Result<bool, PolicyError> {
        Ok(true)
    }

    /// Returns a suggested unit, used only when the caller supplied none.
    fn pre_separate(
        &self,
        resource: &LogicalResource,
        element: &ElementId,
        unit: Option<&Uri>,
    ) -> Result<Option<Uri>, PolicyError> {
        Ok(None)
    }

    fn post_separate(&self, resource: &LogicalResource, element: &ElementId, unit: &Uri) -> Result<(), PolicyError> {
        Ok(())
    }

    fn pre_absorb(&self, resource: &LogicalResource, element: &ElementId) -> Result<(), PolicyError> {
        Ok(())
    }

    fn post_absorb(&self, resource: &LogicalResource, element: &ElementId) -> Result<(), PolicyError> {
        Ok(())
    }
}

#[derive(Clone)]
struct Registration {
    /// Only elements of this class (or a subclass) are governed.
    class: Option<ClassId>,
    policy: Arc<dyn SeparationPolicy>,
}

/// The policies of one editing domain.
#[derive(Default)]
pub struct PolicyRegistry {
    policies: RwLock<Vec<Registration>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a policy for elements of `class`, or for all elements.
    pub fn register(&self, class: Option<ClassId>, policy: Arc<dyn SeparationPolicy>) {
        self.policies.write().push(Registration { class, policy });
    }

    pub fn len(&self) -> usize {
        self.policies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.read().is_empty()
    }

    /// Policies governing an element of `class`, in registration order.
    pub(crate) fn applicable(&self, schema: &Schema, class: ClassId) -> Vec<Arc<dyn SeparationPolicy>> {
        self.policies
            .read()
            .iter()
            .filter(|r| r.class.is_none_or(|c| schema.is_subclass(class, c)))
            .map(|r| Arc::clone(&r.policy))
            .collect()
    }
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("policies", &self.len())
            .finish()
    }
}

/// Calls hooks in order, logging and skipping failures that are not vetoes.
pub(crate) struct PolicyChain<'a> {
    pub policies: Vec<Arc<dyn SeparationPolicy>>,
    pub resource: &'a LogicalResource,
    pub element: &'a ElementId,
}

impl PolicyChain<'_> {
    /// All policies agree. Stops at the first refusal.
    pub fn can_separate(&self) -> bool {
        for policy in &self.policies {
            match policy.can_separate(self.resource, self.element) {
                Ok(true) => {}
                Ok(false) | Err(PolicyError::Veto(_)) => return false,
                Err(PolicyError::Failed(e)) => warn!(element = %self.element, error = %e, "separation policy failed"),
            }
        }
        true
    }

    /// The unit to separate into: the caller's, else the first suggestion.
    pub fn pre_separate(&self, unit: Option<&Uri>) -> Result<Option<Uri>, String> {
        let mut result = unit.cloned();
        for policy in &self.policies {
            match policy.pre_separate(self.resource, self.element, unit) {
                Ok(suggestion) => {
                    if result.is_none() {
                        result = suggestion;
                    }
                }
                Err(PolicyError::Veto(reason)) => return Err(reason),
                Err(PolicyError::Failed(e)) => warn!(element = %self.element, error = %e, "separation policy failed"),
            }
        }
        trace!(element = %self.element, unit = ?result, "pre-separate consulted");
        Ok(result)
    }

    pub fn post_separate(&self, unit: &Uri) {
        for policy in &self.policies {
            if let Err(e) = policy.post_separate(self.resource, self.element, unit) {
                warn!(element = %self.element, error = %e, "post-separate hook failed");
            }
        }
    }

    pub fn pre_absorb(&self) -> Result<(), String> {
        for policy in &self.policies {
            match policy.pre_absorb(self.resource, self.element) {
                Ok(()) => {}
                Err(PolicyError::Veto(reason)) => return Err(reason),
                Err(PolicyError::Failed(e)) => warn!(element = %self.element, error = %e, "absorb policy failed"),
            }
        }
        Ok(())
    }

    pub fn post_absorb(&self) {
        for policy in &self.policies {
            if let Err(e) = policy.post_absorb(self.resource, self.element) {
                warn!(element = %self.element, error = %e, "post-absorb hook failed");
            }
        }
    }
}
