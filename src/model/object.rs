//! Arena entries for model objects.

use super::schema::{ClassId, FeatureId};
use super::value::Value;
use crate::base::{ElementId, ResourceId};
use rustc_hash::FxHashMap;

/// Where an object is contained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Containment {
    pub owner: ElementId,
    pub feature: FeatureId,
}

/// One object of the graph.
///
/// Objects refer to each other by [`ElementId`] only; the arena owns them.
/// A root object records the resource it is a root of, every other attached
/// object records its container.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelObject {
    id: ElementId,
    class: ClassId,
    slots: FxHashMap<FeatureId, Value>,
    container: Option<Containment>,
    resource: Option<ResourceId>,
    proxy: bool,
}

static NULL: Value = Value::Null;

impl ModelObject {
    pub fn new(id: ElementId, class: ClassId) -> Self {
        Self {
            id,
            class,
            slots: FxHashMap::default(),
            container: None,
            resource: None,
            proxy: false,
        }
    }

    /// A stand-in that keeps identity and class but no state.
    pub(crate) fn proxy_of(other: &ModelObject) -> Self {
        Self {
            proxy: true,
            ..Self::new(other.id.clone(), other.class)
        }
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Current value of a feature; `Null` if never set.
    pub fn get(&self, feature: FeatureId) -> &Value {
        self.slots.get(&feature).unwrap_or(&NULL)
    }

    /// Items of a many-valued feature.
    pub fn list(&self, feature: FeatureId) -> &[Value] {
        self.get(feature).as_list()
    }

    pub fn container(&self) -> Option<&Containment> {
        self.container.as_ref()
    }

    /// Resource this object is a root of.
    pub fn root_of(&self) -> Option<ResourceId> {
        self.resource
    }

    pub fn is_proxy(&self) -> bool {
        self.proxy
    }

    pub fn slots(&self) -> impl Iterator<Item = (FeatureId, &Value)> {
        self.slots.iter().map(|(f, v)| (*f, v))
    }

    pub(crate) fn set_slot(&mut self, feature: FeatureId, value: Value) {
        if value.is_null() {
            self.slots.remove(&feature);
        } else {
            self.slots.insert(feature, value);
        }
    }

    /// Mutable access to a many-valued slot, created empty on demand.
    pub(crate) fn list_mut(&mut self, feature: FeatureId) -> &mut Vec<Value> {
        let slot = self.slots.entry(feature).or_insert_with(|| Value::List(Vec::new()));
        if !matches!(slot, Value::List(_)) {
            *slot = Value::List(Vec::new());
        }
        match slot {
            Value::List(items) => items,
            _ => unreachable!("slot was just normalized to a list"),
        }
    }

    /// Forget a many-valued slot that became empty.
    pub(crate) fn prune_empty(&mut self, feature: FeatureId) {
        if self.slots.get(&feature).is_some_and(|v| v.as_list().is_empty()) {
            self.slots.remove(&feature);
        }
    }

    pub(crate) fn set_container(&mut self, container: Option<Containment>) {
        self.container = container;
    }

    pub(crate) fn set_root_of(&mut self, resource: Option<ResourceId>) {
        self.resource = resource;
    }
}
