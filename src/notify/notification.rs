//! The notification record.

use crate::base::{ElementId, IntervalId, ResourceId};
use crate::model::{ClassId, FeatureId, Value};

/// What happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Add,
    AddMany,
    Remove,
    RemoveMany,
    Set,
    Unset,
    Move,
    Create,
    Destroy,
    Separate,
    Absorb,
    Load,
    Import,
    Export,
}

/// Who changed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Notifier {
    Object { id: ElementId, class: ClassId },
    Resource(ResourceId),
    UndoInterval(IntervalId),
}

/// Identity part of a [`Notifier`], used to watch specific notifiers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NotifierKey {
    Object(ElementId),
    Resource(ResourceId),
    UndoInterval(IntervalId),
}

impl Notifier {
    pub fn key(&self) -> NotifierKey {
        match self {
            Notifier::Object { id, .. } => NotifierKey::Object(id.clone()),
            Notifier::Resource(r) => NotifierKey::Resource(*r),
            Notifier::UndoInterval(i) => NotifierKey::UndoInterval(*i),
        }
    }

    pub fn as_object(&self) -> Option<&ElementId> {
        match self {
            Notifier::Object { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<ResourceId> {
        match self {
            Notifier::Resource(r) => Some(*r),
            _ => None,
        }
    }
}

impl From<&ElementId> for NotifierKey {
    fn from(id: &ElementId) -> Self {
        NotifierKey::Object(id.clone())
    }
}

impl From<ResourceId> for NotifierKey {
    fn from(id: ResourceId) -> Self {
        NotifierKey::Resource(id)
    }
}

/// Which feature changed: a schema feature of an object, or one of the
/// built-in resource features.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    Object(FeatureId),
    Contents,
    IsModified,
    IsLoaded,
    Uri,
}

/// Why the change happened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChangeOrigin {
    #[default]
    Action,
    Undo,
    Redo,
    Client,
}

/// Immutable record of one elementary change.
///
/// Built once with the `with_*` methods before it is handed to the broker;
/// after that only the getters are reachable through shared references.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    notifier: Notifier,
    kind: EventKind,
    feature: Option<Feature>,
    old_value: Value,
    new_value: Value,
    position: Option<usize>,
    origin: ChangeOrigin,
    prior_root: Option<ElementId>,
    element: Option<ElementId>,
}

impl Notification {
    pub fn new(notifier: Notifier, kind: EventKind) -> Self {
        Self {
            notifier,
            kind,
            feature: None,
            old_value: Value::Null,
            new_value: Value::Null,
            position: None,
            origin: ChangeOrigin::Action,
            prior_root: None,
            element: None,
        }
    }

    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.feature = Some(feature);
        self
    }

    pub fn with_old(mut self, value: impl Into<Value>) -> Self {
        self.old_value = value.into();
        self
    }

    pub fn with_new(mut self, value: impl Into<Value>) -> Self {
        self.new_value = value.into();
        self
    }

    pub fn at(mut self, position: Option<usize>) -> Self {
        self.position = position;
        self
    }

    pub fn with_origin(mut self, origin: ChangeOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Root a resource held before it was unloaded.
    pub fn with_prior_root(mut self, root: Option<ElementId>) -> Self {
        self.prior_root = root;
        self
    }

    /// Element a separate, absorb or load notification is about. Positions
    /// go stale once later changes of the same batch are applied.
    pub fn with_element(mut self, element: ElementId) -> Self {
        self.element = Some(element);
        self
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn feature(&self) -> Option<Feature> {
        self.feature
    }

    pub fn object_feature(&self) -> Option<FeatureId> {
        match self.feature {
            Some(Feature::Object(f)) => Some(f),
            _ => None,
        }
    }

    pub fn old_value(&self) -> &Value {
        &self.old_value
    }

    pub fn new_value(&self) -> &Value {
        &self.new_value
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn origin(&self) -> ChangeOrigin {
        self.origin
    }

    pub fn prior_root(&self) -> Option<&ElementId> {
        self.prior_root.as_ref()
    }

    pub fn element(&self) -> Option<&ElementId> {
        self.element.as_ref()
    }

    pub fn is_undo_notification(&self) -> bool {
        self.origin == ChangeOrigin::Undo
    }

    pub fn is_redo_notification(&self) -> bool {
        self.origin == ChangeOrigin::Redo
    }

    pub fn is_object_notification(&self) -> bool {
        matches!(self.notifier, Notifier::Object { .. })
    }
}
