//! The object graph: object arena, resource set and partition bookkeeping.
//!
//! [`ModelState`] is the single place where the graph changes. Public
//! mutators validate their arguments, translate the request into
//! [`Change`]s and commit each one through [`ModelState::apply`], which
//! performs the change and produces its [`Notification`]. A [`Recorder`]
//! collects both so the caller can keep the changes for undo and publish
//! the notifications.

use super::change::Change;
use super::error::ModelError;
use super::object::{Containment, ModelObject};
use super::resource::{Resource, ResourceSet};
use super::schema::{ClassId, FeatureDef, FeatureId, Schema};
use super::value::Value;
use crate::base::{DestroyOptions, ElementId, ResourceId, Uri};
use crate::notify::{ChangeOrigin, EventKind, Feature, Notification, Notifier};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

// ============================================================================
// RECORDER
// ============================================================================

/// Collects what one batch of mutations produced.
#[derive(Debug)]
pub(crate) struct Recorder {
    origin: ChangeOrigin,
    quiet: bool,
    pub(crate) changes: Vec<Change>,
    pub(crate) notifications: Vec<Notification>,
    /// Resources whose modified flag this batch switched on.
    pub(crate) dirtied: Vec<ResourceId>,
}

impl Recorder {
    pub(crate) fn new(origin: ChangeOrigin) -> Self {
        Self {
            origin,
            quiet: false,
            changes: Vec::new(),
            notifications: Vec::new(),
            dirtied: Vec::new(),
        }
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Order-independent copy of the graph, used to compare states.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphSnapshot {
    pub objects: BTreeMap<ElementId, ModelObject>,
    pub roots: Vec<(ResourceId, Vec<ElementId>)>,
    pub separate: Vec<(ResourceId, Vec<(ElementId, Uri)>)>,
}

// ============================================================================
// MODEL STATE
// ============================================================================

#[derive(Debug)]
pub struct ModelState {
    schema: Arc<Schema>,
    objects: IndexMap<ElementId, ModelObject>,
    resources: ResourceSet,
}

impl ModelState {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            objects: IndexMap::new(),
            resources: ResourceSet::new(),
        }
    }

    // ── Query ───────────────────────────────────────────────────────

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn object(&self, id: &ElementId) -> Option<&ModelObject> {
        self.objects.get(id)
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &ModelObject> {
        self.objects.values()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn resources(&self) -> &ResourceSet {
        &self.resources
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub(crate) fn resources_mut(&mut self) -> &mut ResourceSet {
        &mut self.resources
    }

    /// Objects directly contained by `id`, in feature declaration order.
    pub fn children(&self, id: &ElementId) -> Vec<ElementId> {
        let Some(obj) = self.objects.get(id) else {
            return Vec::new();
        };
        self.schema
            .features_of(obj.class())
            .iter()
            .filter(|f| self.schema.is_containment(**f))
            .flat_map(|f| obj.get(*f).objects().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// `id` and everything it transitively contains, parents first.
    pub fn subtree(&self, id: &ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(next) = stack.pop() {
            if !self.objects.contains_key(&next) {
                continue;
            }
            let mut kids = self.children(&next);
            kids.reverse();
            stack.extend(kids);
            out.push(next);
        }
        out
    }

    /// Resource `id` is (transitively) contained in.
    pub fn resource_of(&self, id: &ElementId) -> Option<ResourceId> {
        let mut current = self.objects.get(id)?;
        // Containment is acyclic, so the walk is bounded by the arena size.
        for _ in 0..=self.objects.len() {
            if let Some(resource) = current.root_of() {
                return Some(resource);
            }
            current = self.objects.get(&current.container()?.owner)?;
        }
        None
    }

    /// Top-most container of `id` (itself if it has none).
    pub fn root_of(&self, id: &ElementId) -> Option<ElementId> {
        let mut current = self.objects.get(id)?;
        for _ in 0..=self.objects.len() {
            match current.container() {
                Some(c) => current = self.objects.get(&c.owner)?,
                None => return Some(current.id().clone()),
            }
        }
        None
    }

    /// True if `ancestor` is `id` or contains it.
    pub fn is_ancestor(&self, ancestor: &ElementId, id: &ElementId) -> bool {
        let mut current = Some(id.clone());
        let mut steps = 0;
        while let Some(cur) = current {
            if &cur == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.objects.len() {
                return false;
            }
            current = self
                .objects
                .get(&cur)
                .and_then(|o| o.container())
                .map(|c| c.owner.clone());
        }
        false
    }

    /// Physical unit `element` is stored in, within a logical resource.
    pub fn unit_of(&self, resource: ResourceId, element: &ElementId) -> Option<Uri> {
        let res = self.resources.get(resource)?;
        if self.resource_of(element) != Some(resource) {
            return None;
        }
        let mut current = element.clone();
        for _ in 0..=self.objects.len() {
            if let Some(unit) = res.partition.separate.get(&current) {
                return Some(unit.clone());
            }
            match self.objects.get(&current).and_then(|o| o.container()) {
                Some(c) => current = c.owner.clone(),
                None => return Some(res.uri().clone()),
            }
        }
        None
    }

    /// Resolve the element a notification addresses through its feature
    /// and position.
    pub fn element_at(
        &self,
        notifier: &Notifier,
        feature: Option<Feature>,
        position: Option<usize>,
    ) -> Option<ElementId> {
        match (notifier, feature) {
            (Notifier::Object { id, .. }, Some(Feature::Object(f))) => {
                let value = self.objects.get(id)?.get(f);
                match position {
                    Some(p) => value.as_list().get(p)?.as_object().cloned(),
                    None => value.as_object().cloned(),
                }
            }
            (Notifier::Resource(r), Some(Feature::Contents)) => {
                self.resources.get(*r)?.contents.get(position?).cloned()
            }
            _ => None,
        }
    }

    /// Resources referenced from `resource` through non-containment references.
    pub fn imports(&self, resource: ResourceId) -> FxHashSet<ResourceId> {
        let mut out = FxHashSet::default();
        let Some(res) = self.resources.get(resource) else {
            return out;
        };
        for root in &res.contents {
            for id in self.subtree(root) {
                let Some(obj) = self.objects.get(&id) else {
                    continue;
                };
                for (feature, value) in obj.slots() {
                    let is_cross = self
                        .schema
                        .feature(feature)
                        .is_some_and(|f| f.is_reference() && !f.is_containment());
                    if !is_cross {
                        continue;
                    }
                    for target in value.objects() {
                        if let Some(other) = self.resource_of(target) {
                            if other != resource {
                                out.insert(other);
                            }
                        }
                    }
                }
            }
        }
        out
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let objects = self
            .objects
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let roots = self
            .resources
            .iter()
            .map(|r| (r.id(), r.contents.clone()))
            .collect();
        let separate = self
            .resources
            .iter()
            .map(|r| {
                let mut units: Vec<_> = r
                    .partition
                    .separate
                    .iter()
                    .map(|(e, u)| (e.clone(), u.clone()))
                    .collect();
                units.sort();
                (r.id(), units)
            })
            .collect();
        GraphSnapshot {
            objects,
            roots,
            separate,
        }
    }

    // ── Mutation ────────────────────────────────────────────────────

    pub(crate) fn create(
        &mut self,
        rec: &mut Recorder,
        class: ClassId,
        id: Option<ElementId>,
    ) -> Result<ElementId, ModelError> {
        let def = self.schema.class(class).ok_or(ModelError::UnknownClass(class.0))?;
        if def.is_abstract {
            return Err(ModelError::AbstractClass(def.name.to_string()));
        }
        let id = id.unwrap_or_else(ElementId::generate);
        if self.objects.get(&id).is_some_and(|o| !o.is_proxy()) {
            return Err(ModelError::DuplicateId(id));
        }
        let object = ModelObject::new(id.clone(), class);
        self.commit(rec, Change::Create { object })?;
        Ok(id)
    }

    pub(crate) fn set(
        &mut self,
        rec: &mut Recorder,
        object: &ElementId,
        feature: FeatureId,
        value: Value,
    ) -> Result<(), ModelError> {
        let def = self.check_feature(object, feature, false)?.clone();
        self.check_value(object, &def, &value)?;
        let old = self.object_ref(object)?.get(feature).clone();
        if def.is_containment() {
            if let Some(child) = value.as_object() {
                if old.as_object() == Some(child) {
                    return Ok(());
                }
                self.detach(rec, child)?;
            }
        }
        // Detaching may have cleared this very slot.
        let old = self.object_ref(object)?.get(feature).clone();
        self.commit(
            rec,
            Change::Set {
                object: object.clone(),
                feature,
                old,
                new: value,
                unset: false,
            },
        )
    }

    pub(crate) fn unset(
        &mut self,
        rec: &mut Recorder,
        object: &ElementId,
        feature: FeatureId,
    ) -> Result<(), ModelError> {
        let many = self.schema.is_many(feature);
        self.check_feature(object, feature, many)?;
        let current = self.object_ref(object)?.get(feature).clone();
        if many {
            let values = current.as_list().to_vec();
            if values.is_empty() {
                return Ok(());
            }
            return self.commit(
                rec,
                Change::RemoveMany {
                    object: object.clone(),
                    feature,
                    indices: (0..values.len()).collect(),
                    values,
                },
            );
        }
        self.commit(
            rec,
            Change::Set {
                object: object.clone(),
                feature,
                old: current,
                new: Value::Null,
                unset: true,
            },
        )
    }

    pub(crate) fn add(
        &mut self,
        rec: &mut Recorder,
        object: &ElementId,
        feature: FeatureId,
        value: Value,
        index: Option<usize>,
    ) -> Result<(), ModelError> {
        let def = self.check_feature(object, feature, true)?.clone();
        self.check_value(object, &def, &value)?;
        self.check_unique(object, &def, std::slice::from_ref(&value))?;
        if def.is_containment() {
            if let Some(child) = value.as_object() {
                self.detach(rec, child)?;
            }
        }
        let len = self.object_ref(object)?.list(feature).len();
        let index = index.unwrap_or(len);
        if index > len {
            return Err(ModelError::IndexOutOfBounds { index, len });
        }
        self.commit(
            rec,
            Change::Insert {
                object: object.clone(),
                feature,
                index,
                value,
            },
        )
    }

    pub(crate) fn add_many(
        &mut self,
        rec: &mut Recorder,
        object: &ElementId,
        feature: FeatureId,
        values: Vec<Value>,
        index: Option<usize>,
    ) -> Result<(), ModelError> {
        if values.is_empty() {
            return Ok(());
        }
        let def = self.check_feature(object, feature, true)?.clone();
        for value in &values {
            self.check_value(object, &def, value)?;
        }
        self.check_unique(object, &def, &values)?;
        if def.is_containment() {
            for child in values.iter().filter_map(Value::as_object) {
                self.detach(rec, child)?;
            }
        }
        let len = self.object_ref(object)?.list(feature).len();
        let index = index.unwrap_or(len);
        if index > len {
            return Err(ModelError::IndexOutOfBounds { index, len });
        }
        self.commit(
            rec,
            Change::InsertMany {
                object: object.clone(),
                feature,
                index,
                values,
            },
        )
    }

    pub(crate) fn remove(
        &mut self,
        rec: &mut Recorder,
        object: &ElementId,
        feature: FeatureId,
        value: &Value,
    ) -> Result<bool, ModelError> {
        self.check_feature(object, feature, true)?;
        let Some(index) = self
            .object_ref(object)?
            .list(feature)
            .iter()
            .position(|v| v == value)
        else {
            return Ok(false);
        };
        self.commit(
            rec,
            Change::Remove {
                object: object.clone(),
                feature,
                index,
                value: value.clone(),
            },
        )?;
        Ok(true)
    }

    pub(crate) fn remove_many(
        &mut self,
        rec: &mut Recorder,
        object: &ElementId,
        feature: FeatureId,
        values: &[Value],
    ) -> Result<usize, ModelError> {
        self.check_feature(object, feature, true)?;
        let list = self.object_ref(object)?.list(feature);
        let mut picked: Vec<usize> = Vec::new();
        for value in values {
            let found = list
                .iter()
                .enumerate()
                .position(|(i, v)| v == value && !picked.contains(&i));
            if let Some(i) = found {
                picked.push(i);
            }
        }
        if picked.is_empty() {
            return Ok(0);
        }
        picked.sort_unstable();
        let removed: Vec<Value> = picked.iter().map(|i| list[*i].clone()).collect();
        let count = picked.len();
        if count == 1 {
            self.commit(
                rec,
                Change::Remove {
                    object: object.clone(),
                    feature,
                    index: picked[0],
                    value: removed[0].clone(),
                },
            )?;
        } else {
            self.commit(
                rec,
                Change::RemoveMany {
                    object: object.clone(),
                    feature,
                    indices: picked,
                    values: removed,
                },
            )?;
        }
        Ok(count)
    }

    pub(crate) fn move_within(
        &mut self,
        rec: &mut Recorder,
        object: &ElementId,
        feature: FeatureId,
        from: usize,
        to: usize,
    ) -> Result<(), ModelError> {
        self.check_feature(object, feature, true)?;
        let len = self.object_ref(object)?.list(feature).len();
        for index in [from, to] {
            if index >= len {
                return Err(ModelError::IndexOutOfBounds { index, len });
            }
        }
        if from == to {
            return Ok(());
        }
        self.commit(
            rec,
            Change::Move {
                object: object.clone(),
                feature,
                from,
                to,
            },
        )
    }

    pub(crate) fn add_root(
        &mut self,
        rec: &mut Recorder,
        resource: ResourceId,
        object: &ElementId,
        index: Option<usize>,
    ) -> Result<(), ModelError> {
        self.live_object(object)?;
        let res = self
            .resources
            .get(resource)
            .ok_or(ModelError::UnknownResource(resource))?;
        if res.contents.contains(object) {
            return Err(ModelError::DuplicateValue {
                feature: "contents".into(),
                value: object.clone(),
            });
        }
        self.detach(rec, object)?;
        let len = self
            .resources
            .get(resource)
            .map(|r| r.contents.len())
            .unwrap_or(0);
        let index = index.unwrap_or(len);
        if index > len {
            return Err(ModelError::IndexOutOfBounds { index, len });
        }
        self.commit(
            rec,
            Change::InsertRoot {
                resource,
                index,
                object: object.clone(),
            },
        )
    }

    pub(crate) fn remove_root(
        &mut self,
        rec: &mut Recorder,
        resource: ResourceId,
        object: &ElementId,
    ) -> Result<bool, ModelError> {
        let res = self
            .resources
            .get(resource)
            .ok_or(ModelError::UnknownResource(resource))?;
        let Some(index) = res.contents.iter().position(|r| r == object) else {
            return Ok(false);
        };
        self.commit(
            rec,
            Change::RemoveRoot {
                resource,
                index,
                object: object.clone(),
            },
        )?;
        Ok(true)
    }

    /// Destroy `object` and everything it contains.
    pub(crate) fn destroy(
        &mut self,
        rec: &mut Recorder,
        object: &ElementId,
        options: DestroyOptions,
    ) -> Result<(), ModelError> {
        self.live_object(object)?;
        let doomed = self.subtree(object);
        self.detach(rec, object)?;

        let keep_refs =
            options.intersects(DestroyOptions::KEEP_REFERENCES | DestroyOptions::MAKE_PROXY);
        if !keep_refs {
            let set: FxHashSet<ElementId> = doomed.iter().cloned().collect();
            self.clear_references_to(rec, &set)?;
        }

        let proxy = options.contains(DestroyOptions::MAKE_PROXY);
        let was_quiet = rec.quiet;
        rec.quiet = was_quiet || options.contains(DestroyOptions::NO_EVENTS);
        let result = doomed.iter().rev().try_for_each(|id| {
            let snapshot = self.object_ref(id)?.clone();
            self.commit(rec, Change::Discard { object: snapshot, proxy })
        });
        rec.quiet = was_quiet;
        result
    }

    pub(crate) fn set_partition(
        &mut self,
        rec: &mut Recorder,
        resource: ResourceId,
        element: &ElementId,
        to: Option<Uri>,
    ) -> Result<(), ModelError> {
        let res = self
            .resources
            .get(resource)
            .ok_or(ModelError::UnknownResource(resource))?;
        let from = res.partition.separate.get(element).cloned();
        self.commit(
            rec,
            Change::Partition {
                resource,
                element: element.clone(),
                from,
                to,
            },
        )
    }

    /// Undo a list of changes, newest first.
    pub(crate) fn revert(&mut self, rec: &mut Recorder, changes: &[Change]) -> Result<(), ModelError> {
        changes
            .iter()
            .rev()
            .try_for_each(|change| self.commit(rec, change.inverse()))
    }

    /// Replay a list of changes, oldest first.
    pub(crate) fn replay(&mut self, rec: &mut Recorder, changes: &[Change]) -> Result<(), ModelError> {
        changes
            .iter()
            .try_for_each(|change| self.commit(rec, change.clone()))
    }

    pub(crate) fn commit(&mut self, rec: &mut Recorder, change: Change) -> Result<(), ModelError> {
        let touched = self.touched_resource(&change);
        let notification = self.apply(&change, rec.origin)?;
        trace!(kind = ?notification.kind(), "applied change");
        if !rec.quiet {
            rec.notifications.push(notification);
        }
        if let Some(resource) = touched {
            self.mark_dirty(rec, resource);
        }
        rec.changes.push(change);
        Ok(())
    }

    /// Switch a resource's modified flag on, announcing the flip.
    pub(crate) fn mark_dirty(&mut self, rec: &mut Recorder, resource: ResourceId) {
        let Some(res) = self.resources.get_mut(resource) else {
            return;
        };
        if !res.loaded || res.modified {
            return;
        }
        res.modified = true;
        rec.dirtied.push(resource);
        rec.notifications.push(
            Notification::new(Notifier::Resource(resource), EventKind::Set)
                .with_feature(Feature::IsModified)
                .with_old(false)
                .with_new(true)
                .with_origin(rec.origin),
        );
    }

    /// Apply one change and describe it.
    pub(crate) fn apply(&mut self, change: &Change, origin: ChangeOrigin) -> Result<Notification, ModelError> {
        let notification = match change {
            Change::Create { object } => {
                if self.objects.get(object.id()).is_some_and(|o| !o.is_proxy()) {
                    return Err(ModelError::DuplicateId(object.id().clone()));
                }
                self.objects.insert(object.id().clone(), object.clone());
                Notification::new(self.notifier(object.id())?, EventKind::Create)
            }
            Change::Discard { object, proxy } => {
                let notifier = self.notifier(object.id())?;
                if *proxy {
                    let stub = ModelObject::proxy_of(object);
                    self.objects.insert(object.id().clone(), stub);
                } else {
                    self.objects.shift_remove(object.id());
                }
                Notification::new(notifier, EventKind::Destroy)
            }
            Change::Set {
                object,
                feature,
                old,
                new,
                unset,
            } => {
                let notifier = self.notifier(object)?;
                self.object_mut(object)?.set_slot(*feature, new.clone());
                if self.schema.is_containment(*feature) {
                    if let Some(child) = old.as_object() {
                        self.release(child)?;
                    }
                    if let Some(child) = new.as_object() {
                        self.adopt(child, object, *feature)?;
                    }
                }
                let kind = if *unset { EventKind::Unset } else { EventKind::Set };
                Notification::new(notifier, kind)
                    .with_feature(Feature::Object(*feature))
                    .with_old(old.clone())
                    .with_new(new.clone())
            }
            Change::Insert {
                object,
                feature,
                index,
                value,
            } => {
                let notifier = self.notifier(object)?;
                let list = self.object_mut(object)?.list_mut(*feature);
                if *index > list.len() {
                    return Err(ModelError::IndexOutOfBounds {
                        index: *index,
                        len: list.len(),
                    });
                }
                list.insert(*index, value.clone());
                if self.schema.is_containment(*feature) {
                    if let Some(child) = value.as_object() {
                        self.adopt(child, object, *feature)?;
                    }
                }
                Notification::new(notifier, EventKind::Add)
                    .with_feature(Feature::Object(*feature))
                    .with_new(value.clone())
                    .at(Some(*index))
            }
            Change::InsertMany {
                object,
                feature,
                index,
                values,
            } => {
                let notifier = self.notifier(object)?;
                let list = self.object_mut(object)?.list_mut(*feature);
                if *index > list.len() {
                    return Err(ModelError::IndexOutOfBounds {
                        index: *index,
                        len: list.len(),
                    });
                }
                for (offset, value) in values.iter().enumerate() {
                    list.insert(*index + offset, value.clone());
                }
                if self.schema.is_containment(*feature) {
                    for child in values.iter().filter_map(Value::as_object) {
                        self.adopt(child, object, *feature)?;
                    }
                }
                Notification::new(notifier, EventKind::AddMany)
                    .with_feature(Feature::Object(*feature))
                    .with_new(Value::List(values.clone()))
                    .at(Some(*index))
            }
            Change::Remove {
                object,
                feature,
                index,
                value,
            } => {
                let notifier = self.notifier(object)?;
                let list = self.object_mut(object)?.list_mut(*feature);
                if list.get(*index) != Some(value) {
                    return Err(ModelError::inconsistent(format!(
                        "no matching value at index {index}"
                    )));
                }
                list.remove(*index);
                self.object_mut(object)?.prune_empty(*feature);
                if self.schema.is_containment(*feature) {
                    if let Some(child) = value.as_object() {
                        self.release(child)?;
                    }
                }
                Notification::new(notifier, EventKind::Remove)
                    .with_feature(Feature::Object(*feature))
                    .with_old(value.clone())
                    .at(Some(*index))
            }
            Change::RemoveMany {
                object,
                feature,
                indices,
                values,
            } => {
                let notifier = self.notifier(object)?;
                let list = self.object_mut(object)?.list_mut(*feature);
                for (index, value) in indices.iter().zip(values).rev() {
                    if list.get(*index) != Some(value) {
                        return Err(ModelError::inconsistent(format!(
                            "no matching value at index {index}"
                        )));
                    }
                    list.remove(*index);
                }
                self.object_mut(object)?.prune_empty(*feature);
                if self.schema.is_containment(*feature) {
                    for child in values.iter().filter_map(Value::as_object) {
                        self.release(child)?;
                    }
                }
                let positions = indices.iter().map(|i| Value::Integer(*i as i64)).collect();
                Notification::new(notifier, EventKind::RemoveMany)
                    .with_feature(Feature::Object(*feature))
                    .with_old(Value::List(values.clone()))
                    .with_new(Value::List(positions))
                    .at(indices.first().copied())
            }
            Change::Restore {
                object,
                feature,
                indices,
                values,
            } => {
                let notifier = self.notifier(object)?;
                let list = self.object_mut(object)?.list_mut(*feature);
                for (index, value) in indices.iter().zip(values) {
                    if *index > list.len() {
                        return Err(ModelError::IndexOutOfBounds {
                            index: *index,
                            len: list.len(),
                        });
                    }
                    list.insert(*index, value.clone());
                }
                if self.schema.is_containment(*feature) {
                    for child in values.iter().filter_map(Value::as_object) {
                        self.adopt(child, object, *feature)?;
                    }
                }
                Notification::new(notifier, EventKind::AddMany)
                    .with_feature(Feature::Object(*feature))
                    .with_new(Value::List(values.clone()))
                    .at(indices.first().copied())
            }
            Change::Move {
                object,
                feature,
                from,
                to,
            } => {
                let notifier = self.notifier(object)?;
                let list = self.object_mut(object)?.list_mut(*feature);
                if *from >= list.len() || *to >= list.len() {
                    return Err(ModelError::IndexOutOfBounds {
                        index: (*from).max(*to),
                        len: list.len(),
                    });
                }
                let moved = list.remove(*from);
                list.insert(*to, moved.clone());
                Notification::new(notifier, EventKind::Move)
                    .with_feature(Feature::Object(*feature))
                    .with_old(Value::Integer(*from as i64))
                    .with_new(moved)
                    .at(Some(*to))
            }
            Change::InsertRoot {
                resource,
                index,
                object,
            } => {
                self.live_object(object)?;
                let res = self.resource_mut(*resource)?;
                if *index > res.contents.len() {
                    return Err(ModelError::IndexOutOfBounds {
                        index: *index,
                        len: res.contents.len(),
                    });
                }
                res.contents.insert(*index, object.clone());
                self.object_mut(object)?.set_root_of(Some(*resource));
                self.reattach_partitions(*resource, object);
                Notification::new(Notifier::Resource(*resource), EventKind::Add)
                    .with_feature(Feature::Contents)
                    .with_new(Value::Object(object.clone()))
                    .at(Some(*index))
            }
            Change::RemoveRoot {
                resource,
                index,
                object,
            } => {
                let res = self.resource_mut(*resource)?;
                if res.contents.get(*index) != Some(object) {
                    return Err(ModelError::inconsistent(format!(
                        "'{object}' is not root {index} of {resource}"
                    )));
                }
                self.detach_partitions(*resource, object);
                self.resource_mut(*resource)?.contents.remove(*index);
                self.object_mut(object)?.set_root_of(None);
                Notification::new(Notifier::Resource(*resource), EventKind::Remove)
                    .with_feature(Feature::Contents)
                    .with_old(Value::Object(object.clone()))
                    .at(Some(*index))
            }
            Change::Partition {
                resource,
                element,
                from,
                to,
            } => {
                let res = self.resource_mut(*resource)?;
                match to {
                    Some(unit) => {
                        res.partition.separate.insert(element.clone(), unit.clone());
                    }
                    None => {
                        res.partition.separate.shift_remove(element);
                    }
                }
                let (notifier, feature, position) = self.locate(element)?;
                let kind = if to.is_some() {
                    EventKind::Separate
                } else {
                    EventKind::Absorb
                };
                let mut n = Notification::new(notifier, kind)
                    .with_old(from.clone())
                    .with_new(to.clone())
                    .with_element(element.clone())
                    .at(position);
                if let Some(feature) = feature {
                    n = n.with_feature(feature);
                }
                n
            }
        };
        Ok(notification.with_origin(origin))
    }

    // ── Loading ─────────────────────────────────────────────────────

    /// Install decoded objects as the roots of `resource`.
    pub(crate) fn install_roots(
        &mut self,
        resource: ResourceId,
        objects: Vec<ModelObject>,
        roots: Vec<ElementId>,
    ) -> Result<(), ModelError> {
        self.install_objects(objects)?;
        for root in &roots {
            self.object_mut(root)?.set_root_of(Some(resource));
        }
        self.resource_mut(resource)?.contents = roots;
        Ok(())
    }

    /// Install decoded objects, replacing proxies and unloaded stand-ins.
    pub(crate) fn install_objects(&mut self, objects: Vec<ModelObject>) -> Result<(), ModelError> {
        if let Some(clash) = objects
            .iter()
            .find(|o| self.objects.get(o.id()).is_some_and(|e| !e.is_proxy()))
        {
            return Err(ModelError::DuplicateId(clash.id().clone()));
        }
        for object in objects {
            self.objects.insert(object.id().clone(), object);
        }
        Ok(())
    }

    /// Fill an unloaded stand-in with the state read from its unit.
    pub(crate) fn fill_stand_in(
        &mut self,
        element: &ElementId,
        slots: Vec<(FeatureId, Value)>,
        objects: Vec<ModelObject>,
    ) -> Result<(), ModelError> {
        self.object_ref(element)?;
        self.install_objects(objects)?;
        let stand_in = self.object_mut(element)?;
        for (feature, value) in slots {
            stand_in.set_slot(feature, value);
        }
        Ok(())
    }

    /// Drop every object of `resource` from the arena. Returns the former first root.
    pub(crate) fn evict(&mut self, resource: ResourceId) -> Result<Option<ElementId>, ModelError> {
        let roots = std::mem::take(&mut self.resource_mut(resource)?.contents);
        let prior = roots.first().cloned();
        for root in &roots {
            for id in self.subtree(root) {
                self.objects.shift_remove(&id);
            }
        }
        let res = self.resource_mut(resource)?;
        res.partition.clear();
        res.loaded = false;
        res.modified = false;
        Ok(prior)
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn object_ref(&self, id: &ElementId) -> Result<&ModelObject, ModelError> {
        self.objects
            .get(id)
            .ok_or_else(|| ModelError::UnknownObject(id.clone()))
    }

    fn object_mut(&mut self, id: &ElementId) -> Result<&mut ModelObject, ModelError> {
        self.objects
            .get_mut(id)
            .ok_or_else(|| ModelError::UnknownObject(id.clone()))
    }

    fn live_object(&self, id: &ElementId) -> Result<&ModelObject, ModelError> {
        let obj = self.object_ref(id)?;
        if obj.is_proxy() {
            return Err(ModelError::Proxy(id.clone()));
        }
        Ok(obj)
    }

    fn resource_mut(&mut self, id: ResourceId) -> Result<&mut Resource, ModelError> {
        self.resources
            .get_mut(id)
            .ok_or(ModelError::UnknownResource(id))
    }

    fn notifier(&self, id: &ElementId) -> Result<Notifier, ModelError> {
        let obj = self.object_ref(id)?;
        Ok(Notifier::Object {
            id: id.clone(),
            class: obj.class(),
        })
    }

    fn check_feature(
        &self,
        object: &ElementId,
        feature: FeatureId,
        many: bool,
    ) -> Result<&FeatureDef, ModelError> {
        let obj = self.live_object(object)?;
        let def = self
            .schema
            .feature(feature)
            .filter(|_| self.schema.has_feature(obj.class(), feature))
            .ok_or_else(|| ModelError::InvalidFeature {
                class: self.schema.class_name(obj.class()).to_string(),
                feature: self.schema.feature_name(feature).to_string(),
            })?;
        if def.many != many {
            return Err(ModelError::Multiplicity {
                feature: def.name.to_string(),
                shape: if def.many { "many-valued" } else { "single-valued" },
            });
        }
        Ok(def)
    }

    fn check_value(&self, owner: &ElementId, def: &FeatureDef, value: &Value) -> Result<(), ModelError> {
        match (def.is_reference(), value) {
            (_, Value::Null) => Ok(()),
            (false, Value::Object(_)) | (false, Value::List(_)) => Err(ModelError::TypeMismatch {
                feature: def.name.to_string(),
                message: "attributes hold data values".into(),
            }),
            (false, _) => Ok(()),
            (true, Value::Object(target)) => {
                self.live_object(target)?;
                if def.is_containment() && self.is_ancestor(target, owner) {
                    return Err(ModelError::ContainmentCycle(target.clone()));
                }
                Ok(())
            }
            (true, _) => Err(ModelError::TypeMismatch {
                feature: def.name.to_string(),
                message: "references hold objects".into(),
            }),
        }
    }

    /// References are unique within a list.
    fn check_unique(&self, owner: &ElementId, def: &FeatureDef, values: &[Value]) -> Result<(), ModelError> {
        if !def.is_reference() {
            return Ok(());
        }
        let current = self.object_ref(owner)?.list(def.id);
        for (i, value) in values.iter().enumerate() {
            if current.contains(value) || values[..i].contains(value) {
                if let Some(id) = value.as_object() {
                    return Err(ModelError::DuplicateValue {
                        feature: def.name.to_string(),
                        value: id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Remove `child` from wherever it is currently contained.
    fn detach(&mut self, rec: &mut Recorder, child: &ElementId) -> Result<(), ModelError> {
        let obj = self.object_ref(child)?;
        if let Some(resource) = obj.root_of() {
            self.remove_root(rec, resource, child)?;
            return Ok(());
        }
        let Some(Containment { owner, feature }) = obj.container().cloned() else {
            return Ok(());
        };
        if self.schema.is_many(feature) {
            let list = self.object_ref(&owner)?.list(feature);
            let target = Value::Object(child.clone());
            if let Some(index) = list.iter().position(|v| *v == target) {
                self.commit(
                    rec,
                    Change::Remove {
                        object: owner,
                        feature,
                        index,
                        value: target,
                    },
                )?;
            }
        } else {
            self.commit(
                rec,
                Change::Set {
                    object: owner,
                    feature,
                    old: Value::Object(child.clone()),
                    new: Value::Null,
                    unset: false,
                },
            )?;
        }
        Ok(())
    }

    fn clear_references_to(
        &mut self,
        rec: &mut Recorder,
        doomed: &FxHashSet<ElementId>,
    ) -> Result<(), ModelError> {
        let mut pending: Vec<Change> = Vec::new();
        for obj in self.objects.values() {
            if doomed.contains(obj.id()) || obj.is_proxy() {
                continue;
            }
            for feature in self.schema.features_of(obj.class()) {
                let Some(def) = self.schema.feature(*feature) else {
                    continue;
                };
                if !def.is_reference() || def.is_containment() {
                    continue;
                }
                let value = obj.get(*feature);
                if def.many {
                    let (indices, values): (Vec<usize>, Vec<Value>) = value
                        .as_list()
                        .iter()
                        .enumerate()
                        .filter(|(_, v)| v.as_object().is_some_and(|t| doomed.contains(t)))
                        .map(|(i, v)| (i, v.clone()))
                        .unzip();
                    if !indices.is_empty() {
                        pending.push(Change::RemoveMany {
                            object: obj.id().clone(),
                            feature: *feature,
                            indices,
                            values,
                        });
                    }
                } else if value.as_object().is_some_and(|t| doomed.contains(t)) {
                    pending.push(Change::Set {
                        object: obj.id().clone(),
                        feature: *feature,
                        old: value.clone(),
                        new: Value::Null,
                        unset: false,
                    });
                }
            }
        }
        pending.into_iter().try_for_each(|change| self.commit(rec, change))
    }

    /// Where a notification about `element` is raised: its container slot,
    /// or the contents of the resource it is a root of.
    pub(crate) fn locate(&self, element: &ElementId) -> Result<(Notifier, Option<Feature>, Option<usize>), ModelError> {
        let obj = self.object_ref(element)?;
        if let Some(c) = obj.container() {
            let owner = self.object_ref(&c.owner)?;
            let position = if self.schema.is_many(c.feature) {
                owner
                    .list(c.feature)
                    .iter()
                    .position(|v| v.as_object() == Some(element))
            } else {
                None
            };
            return Ok((
                self.notifier(&c.owner)?,
                Some(Feature::Object(c.feature)),
                position,
            ));
        }
        if let Some(resource) = obj.root_of() {
            let position = self
                .resources
                .get(resource)
                .and_then(|r| r.contents.iter().position(|e| e == element));
            return Ok((Notifier::Resource(resource), Some(Feature::Contents), position));
        }
        Ok((self.notifier(element)?, None, None))
    }

    fn touched_resource(&self, change: &Change) -> Option<ResourceId> {
        match change {
            Change::InsertRoot { resource, .. }
            | Change::RemoveRoot { resource, .. }
            | Change::Partition { resource, .. } => Some(*resource),
            Change::Create { .. } | Change::Discard { .. } => None,
            other => other.subject().and_then(|id| self.resource_of(id)),
        }
    }

    fn release(&mut self, child: &ElementId) -> Result<(), ModelError> {
        let resource = self.resource_of(child);
        self.object_mut(child)?.set_container(None);
        if let Some(resource) = resource {
            self.detach_partitions(resource, child);
        }
        Ok(())
    }

    fn adopt(&mut self, child: &ElementId, owner: &ElementId, feature: FeatureId) -> Result<(), ModelError> {
        self.object_mut(child)?.set_container(Some(Containment {
            owner: owner.clone(),
            feature,
        }));
        if let Some(resource) = self.resource_of(child) {
            self.reattach_partitions(resource, child);
        }
        Ok(())
    }

    /// Separate elements leaving the resource remember their unit.
    fn detach_partitions(&mut self, resource: ResourceId, element: &ElementId) {
        let subtree = self.subtree(element);
        let Some(res) = self.resources.get_mut(resource) else {
            return;
        };
        for id in subtree {
            if let Some(unit) = res.partition.separate.shift_remove(&id) {
                res.partition.detached.insert(id, unit);
            }
        }
    }

    /// Elements re-entering the resource get their remembered unit back.
    fn reattach_partitions(&mut self, resource: ResourceId, element: &ElementId) {
        let subtree = self.subtree(element);
        let Some(res) = self.resources.get_mut(resource) else {
            return;
        };
        for id in subtree {
            if let Some(unit) = res.partition.detached.remove(&id) {
                res.partition.separate.insert(id, unit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SchemaBuilder;

    struct Fixture {
        state: ModelState,
        node: ClassId,
        name: FeatureId,
        children: FeatureId,
        link: FeatureId,
        links: FeatureId,
    }

    fn fixture() -> Fixture {
        let mut b = SchemaBuilder::default();
        let node = b.class("Node", &[]);
        let name = b.attribute(node, "name", false);
        let children = b.containment(node, "children", true);
        let link = b.reference(node, "link", false);
        let links = b.reference(node, "links", true);
        Fixture {
            state: ModelState::new(b.build()),
            node,
            name,
            children,
            link,
            links,
        }
    }

    fn rec() -> Recorder {
        Recorder::new(ChangeOrigin::Action)
    }

    #[test]
    fn test_containment_add_sets_container() {
        let mut f = fixture();
        let mut r = rec();
        let parent = f.state.create(&mut r, f.node, Some("p".into())).unwrap();
        let child = f.state.create(&mut r, f.node, Some("c".into())).unwrap();
        f.state
            .add(&mut r, &parent, f.children, Value::from(&child), None)
            .unwrap();

        let c = f.state.object(&child).unwrap();
        assert_eq!(c.container().map(|c| c.owner.clone()), Some(parent.clone()));
        assert_eq!(f.state.children(&parent), vec![child]);
        assert_eq!(r.notifications.last().unwrap().kind(), EventKind::Add);
    }

    #[test]
    fn test_moving_child_detaches_from_previous_owner() {
        let mut f = fixture();
        let mut r = rec();
        let a = f.state.create(&mut r, f.node, None).unwrap();
        let b = f.state.create(&mut r, f.node, None).unwrap();
        let c = f.state.create(&mut r, f.node, None).unwrap();
        f.state.add(&mut r, &a, f.children, Value::from(&c), None).unwrap();
        f.state.add(&mut r, &b, f.children, Value::from(&c), None).unwrap();

        assert!(f.state.children(&a).is_empty());
        assert_eq!(f.state.children(&b), vec![c]);
    }

    #[test]
    fn test_containment_cycle_rejected() {
        let mut f = fixture();
        let mut r = rec();
        let a = f.state.create(&mut r, f.node, None).unwrap();
        let b = f.state.create(&mut r, f.node, None).unwrap();
        f.state.add(&mut r, &a, f.children, Value::from(&b), None).unwrap();
        let err = f
            .state
            .add(&mut r, &b, f.children, Value::from(&a), None)
            .unwrap_err();
        assert!(matches!(err, ModelError::ContainmentCycle(_)));
    }

    #[test]
    fn test_attribute_rejects_objects() {
        let mut f = fixture();
        let mut r = rec();
        let a = f.state.create(&mut r, f.node, None).unwrap();
        let err = f
            .state
            .set(&mut r, &a, f.name, Value::from(&a))
            .unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { .. }));
    }

    #[test]
    fn test_revert_restores_snapshot() {
        let mut f = fixture();
        let mut setup = rec();
        let root = f.state.create(&mut setup, f.node, Some("root".into())).unwrap();
        let keep = f.state.create(&mut setup, f.node, Some("keep".into())).unwrap();
        f.state
            .add(&mut setup, &root, f.children, Value::from(&keep), None)
            .unwrap();
        let before = f.state.snapshot();

        let mut r = rec();
        let doomed = f.state.create(&mut r, f.node, Some("doomed".into())).unwrap();
        f.state.add(&mut r, &root, f.children, Value::from(&doomed), Some(0)).unwrap();
        f.state.set(&mut r, &keep, f.link, Value::from(&doomed)).unwrap();
        f.state.add(&mut r, &keep, f.links, Value::from(&doomed), None).unwrap();
        f.state.set(&mut r, &root, f.name, Value::from("renamed")).unwrap();
        f.state.destroy(&mut r, &doomed, DestroyOptions::empty()).unwrap();
        assert!(f.state.object(&keep).unwrap().get(f.link).is_null());
        assert!(!f.state.contains(&doomed));

        let mut undo = rec();
        f.state.revert(&mut undo, &r.changes).unwrap();
        assert_eq!(f.state.snapshot(), before);
    }

    #[test]
    fn test_remove_many_scattered_round_trip() {
        let mut f = fixture();
        let mut r = rec();
        let owner = f.state.create(&mut r, f.node, None).unwrap();
        let targets: Vec<_> = (0..4)
            .map(|_| f.state.create(&mut r, f.node, None).unwrap())
            .collect();
        let values: Vec<Value> = targets.iter().map(Value::from).collect();
        f.state.add_many(&mut r, &owner, f.links, values.clone(), None).unwrap();
        let before = f.state.snapshot();

        let mut removal = rec();
        let removed = f
            .state
            .remove_many(&mut removal, &owner, f.links, &[values[3].clone(), values[0].clone()])
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(f.state.object(&owner).unwrap().list(f.links), &values[1..3]);

        let mut undo = rec();
        f.state.revert(&mut undo, &removal.changes).unwrap();
        assert_eq!(f.state.snapshot(), before);
    }

    #[test]
    fn test_make_proxy_keeps_identity() {
        let mut f = fixture();
        let mut r = rec();
        let a = f.state.create(&mut r, f.node, None).unwrap();
        let b = f.state.create(&mut r, f.node, None).unwrap();
        f.state.set(&mut r, &a, f.link, Value::from(&b)).unwrap();
        f.state.destroy(&mut r, &b, DestroyOptions::MAKE_PROXY).unwrap();

        assert!(f.state.object(&b).unwrap().is_proxy());
        assert_eq!(f.state.object(&a).unwrap().get(f.link), &Value::from(&b));
    }

    #[test]
    fn test_no_events_suppresses_destroy_notifications() {
        let mut f = fixture();
        let mut r = rec();
        let a = f.state.create(&mut r, f.node, None).unwrap();
        let mut quiet = rec();
        f.state.destroy(&mut quiet, &a, DestroyOptions::NO_EVENTS).unwrap();
        assert!(quiet.notifications.is_empty());
        assert_eq!(quiet.changes.len(), 1);
    }

    #[test]
    fn test_detached_separate_element_remembers_unit() {
        let mut f = fixture();
        let res = f.state.resources_mut().create(Uri::new("mem:/m")).unwrap();
        f.state.resources_mut().get_mut(res).unwrap().loaded = true;
        let mut r = rec();
        let root = f.state.create(&mut r, f.node, None).unwrap();
        let e = f.state.create(&mut r, f.node, Some("e".into())).unwrap();
        f.state.add_root(&mut r, res, &root, None).unwrap();
        f.state.add(&mut r, &root, f.children, Value::from(&e), None).unwrap();
        f.state
            .set_partition(&mut r, res, &e, Some(Uri::new("mem:/u")))
            .unwrap();

        f.state.remove(&mut r, &root, f.children, &Value::from(&e)).unwrap();
        let part = f.state.resource(res).unwrap().partition();
        assert!(!part.is_separate(&e));
        assert_eq!(part.detached_unit(&e), Some(&Uri::new("mem:/u")));

        f.state.add(&mut r, &root, f.children, Value::from(&e), None).unwrap();
        assert_eq!(f.state.unit_of(res, &e), Some(Uri::new("mem:/u")));
        assert!(f.state.resource(res).unwrap().is_modified());
    }
}
