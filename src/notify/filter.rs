//! Notification filters.
//!
//! A [`Filter`] is a predicate tree over notifications. Evaluation is pure:
//! nothing in the domain changes when a filter is tested. The only stateful
//! variant is [`Filter::NotifierIn`], whose [`WatchSet`] is shared with the
//! client and pruned by the broker when a watched object is destroyed.

use super::notification::{EventKind, Feature, Notification, Notifier, NotifierKey};
use crate::model::{ClassId, Schema};
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// NOTIFIER TYPES
// ============================================================================

/// Notifier type tested by [`Filter::NotifierTypeIs`].
#[derive(Clone)]
pub enum NotifierType {
    Object,
    Resource,
    UndoInterval,
    /// Objects of a schema class. The schema answers subtype questions.
    Class { class: ClassId, schema: Arc<Schema> },
}

impl NotifierType {
    pub fn class(schema: &Arc<Schema>, class: ClassId) -> Self {
        NotifierType::Class {
            class,
            schema: Arc::clone(schema),
        }
    }

    /// `strict` asks for the exact type; otherwise subtypes match too.
    fn matches(&self, notifier: &Notifier, strict: bool) -> bool {
        match (self, notifier) {
            (NotifierType::Object, Notifier::Object { .. })
            | (NotifierType::Resource, Notifier::Resource(_))
            | (NotifierType::UndoInterval, Notifier::UndoInterval(_)) => true,
            (NotifierType::Class { class, schema }, Notifier::Object { class: actual, .. }) => {
                if strict {
                    actual == class
                } else {
                    schema.is_subclass(*actual, *class)
                }
            }
            _ => false,
        }
    }
}

impl fmt::Debug for NotifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifierType::Object => f.write_str("Object"),
            NotifierType::Resource => f.write_str("Resource"),
            NotifierType::UndoInterval => f.write_str("UndoInterval"),
            NotifierType::Class { class, schema } => {
                write!(f, "Class({})", schema.class_name(*class))
            }
        }
    }
}

// ============================================================================
// WATCH SET
// ============================================================================

/// A shared, explicitly maintained set of watched notifiers.
#[derive(Clone, Default)]
pub struct WatchSet {
    inner: Arc<RwLock<FxHashSet<NotifierKey>>>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&self, key: impl Into<NotifierKey>) -> bool {
        self.inner.write().insert(key.into())
    }

    pub fn unwatch(&self, key: &NotifierKey) -> bool {
        self.inner.write().remove(key)
    }

    pub fn contains(&self, key: &NotifierKey) -> bool {
        self.inner.read().contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn same_set(&self, other: &WatchSet) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for WatchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSet").field("len", &self.len()).finish()
    }
}

// ============================================================================
// FILTER
// ============================================================================

#[derive(Clone, Debug)]
pub enum Filter {
    /// Matches every notification.
    Wildcard,
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
    EventKindIs(EventKind),
    NotifierTypeIs { ty: NotifierType, strict: bool },
    NotifierIs(NotifierKey),
    NotifierIn(WatchSet),
    FeatureIs(Feature),
}

impl Filter {
    pub fn matches(&self, n: &Notification) -> bool {
        match self {
            Filter::Wildcard => true,
            Filter::And(a, b) => a.matches(n) && b.matches(n),
            Filter::Or(a, b) => a.matches(n) || b.matches(n),
            Filter::Not(f) => !f.matches(n),
            Filter::EventKindIs(kind) => n.kind() == *kind,
            Filter::NotifierTypeIs { ty, strict } => ty.matches(n.notifier(), *strict),
            Filter::NotifierIs(key) => n.notifier().key() == *key,
            Filter::NotifierIn(set) => set.contains(&n.notifier().key()),
            Filter::FeatureIs(feature) => n.feature() == Some(*feature),
        }
    }

    /// True if any notification of the batch matches.
    pub fn matches_any(&self, batch: &[Notification]) -> bool {
        batch.iter().any(|n| self.matches(n))
    }

    pub fn and(self, other: Filter) -> Filter {
        Filter::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Filter) -> Filter {
        Filter::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Filter {
        Filter::Not(Box::new(self))
    }

    pub fn kind(kind: EventKind) -> Filter {
        Filter::EventKindIs(kind)
    }

    pub fn notifier_type(ty: NotifierType, strict: bool) -> Filter {
        Filter::NotifierTypeIs { ty, strict }
    }

    pub fn notifier(key: impl Into<NotifierKey>) -> Filter {
        Filter::NotifierIs(key.into())
    }

    /// Any of several event kinds.
    pub fn any_kind(kinds: &[EventKind]) -> Filter {
        kinds
            .iter()
            .map(|k| Filter::EventKindIs(*k))
            .reduce(Filter::or)
            .unwrap_or_else(|| Filter::Wildcard.negate())
    }

    /// Watch sets referenced anywhere in this filter.
    pub fn watch_sets(&self) -> Vec<WatchSet> {
        let mut out = Vec::new();
        self.collect_watch_sets(&mut out);
        out
    }

    fn collect_watch_sets(&self, out: &mut Vec<WatchSet>) {
        match self {
            Filter::And(a, b) | Filter::Or(a, b) => {
                a.collect_watch_sets(out);
                b.collect_watch_sets(out);
            }
            Filter::Not(f) => f.collect_watch_sets(out),
            Filter::NotifierIn(set) => out.push(set.clone()),
            _ => {}
        }
    }

    // ── Prebuilt filters ────────────────────────────────────────────

    /// Roots added to or removed from a resource.
    pub fn resource_contents_changed() -> Filter {
        Filter::notifier_type(NotifierType::Resource, true)
            .and(Filter::FeatureIs(Feature::Contents))
    }

    /// Resources loaded or unloaded.
    pub fn resource_loaded_changed() -> Filter {
        Filter::notifier_type(NotifierType::Resource, true)
            .and(Filter::FeatureIs(Feature::IsLoaded))
    }

    /// Resources becoming dirty or saved, including save-as.
    pub fn resource_modified_changed() -> Filter {
        Filter::notifier_type(NotifierType::Resource, true).and(
            Filter::FeatureIs(Feature::IsModified).or(Filter::FeatureIs(Feature::Uri)),
        )
    }

    pub fn resource_imports_changed() -> Filter {
        Filter::notifier_type(NotifierType::Resource, true)
            .and(Filter::any_kind(&[EventKind::Import, EventKind::Export]))
    }

    /// Structural changes on objects.
    pub fn element_changed() -> Filter {
        Filter::notifier_type(NotifierType::Object, false).and(Filter::any_kind(&[
            EventKind::Add,
            EventKind::AddMany,
            EventKind::Remove,
            EventKind::RemoveMany,
            EventKind::Set,
            EventKind::Unset,
            EventKind::Move,
        ]))
    }

    /// Separate, absorb and unit loads, wherever they are raised.
    pub fn partition_changed() -> Filter {
        Filter::any_kind(&[EventKind::Separate, EventKind::Absorb, EventKind::Load])
    }

    pub fn undo_interval_closed() -> Filter {
        Filter::notifier_type(NotifierType::UndoInterval, true)
            .and(Filter::EventKindIs(EventKind::Create))
    }

    pub fn undo_intervals_flushed() -> Filter {
        Filter::notifier_type(NotifierType::UndoInterval, true)
            .and(Filter::EventKindIs(EventKind::Destroy))
    }

    /// Everything a [`Demultiplexer`](super::Demultiplexer) can translate.
    pub fn demuxable() -> Filter {
        Filter::resource_contents_changed()
            .or(Filter::resource_loaded_changed())
            .or(Filter::resource_modified_changed())
            .or(Filter::resource_imports_changed())
            .or(Filter::element_changed())
            .or(Filter::partition_changed())
            .or(Filter::undo_interval_closed())
            .or(Filter::undo_intervals_flushed())
    }
}
