//! Stable identifiers for objects, resources, undo intervals and listeners.
//!
//! Objects are keyed by [`ElementId`], a string identity that survives
//! detachment, unloading and reloading. The remaining ids are small counters
//! handed out by their owning registries.

use std::fmt;
use std::sync::Arc;

// ============================================================================
// ELEMENT IDS
// ============================================================================

/// Identity of a model object.
///
/// This is the value persisted for an object and the key under which a
/// logical resource remembers the physical unit of a detached element.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub Arc<str>);

impl ElementId {
    /// Create an element ID from an existing identity string.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh UUID-based ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string().into())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ElementId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ElementId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// COUNTER IDS
// ============================================================================

/// Handle of a resource inside one editing domain's resource set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource#{}", self.0)
    }
}

/// Handle of a closed undo interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntervalId(pub u64);

impl fmt::Display for IntervalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interval#{}", self.0)
    }
}

/// Handle returned when registering a listener with the event broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = ElementId::generate();
        let b = ElementId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_element_id_display_and_from() {
        let id: ElementId = "diagram-1".into();
        assert_eq!(id.to_string(), "diagram-1");
        assert_eq!(ElementId::from(String::from("diagram-1")), id);
    }

    #[test]
    fn test_counter_id_display() {
        assert_eq!(ResourceId(3).to_string(), "resource#3");
        assert_eq!(IntervalId(7).to_string(), "interval#7");
        assert_eq!(ListenerId(1).to_string(), "listener#1");
    }
}
