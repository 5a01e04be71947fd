//! Resource lifecycle: create, load, save, unload, and the imports
//! between resources.
//!
//! Every lifecycle operation runs in an internal unchecked action so it
//! excludes writers on other threads and its notifications are published
//! as one batch. None of it is recorded for undo.

use super::{DomainError, EditingDomain, ResourceOptions};
use crate::base::{ElementId, ResourceId, Uri};
use crate::interchange::{DecodedUnit, EncodedUnit, InterchangeError, Stub, decode_unit, encode_resource};
use crate::model::{FeatureId, ModelError, ModelObject, ModelState, Value};
use crate::notify::{EventKind, Feature, Notification, Notifier};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// A separate element's unit, read and decoded but not yet installed.
struct StagedUnit {
    element: ElementId,
    /// Feature values of the unit's root, to be copied onto the stand-in.
    slots: Vec<(FeatureId, Value)>,
    /// Everything below the root.
    objects: Vec<ModelObject>,
    /// Separate elements nested in this unit.
    stubs: Vec<Stub>,
}

impl EditingDomain {
    fn to_uri(path: &str, options: ResourceOptions) -> Uri {
        if options.contains(ResourceOptions::AS_URI) {
            Uri::new(path)
        } else {
            Uri::from_file_path(path)
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Register a new, empty and loaded resource.
    pub fn create_resource(&self, path: &str, options: ResourceOptions) -> Result<ResourceId, DomainError> {
        let options = options | self.inner.config.default_resource_options;
        let uri = Self::to_uri(path, options);
        self.unchecked("create resource", || {
            let id = {
                let mut state = self.inner.state.write();
                let resources = state.resources_mut();
                let id = resources
                    .create(uri.clone())
                    .ok_or_else(|| DomainError::ResourceExists(uri.clone()))?;
                if let Some(res) = resources.get_mut(id) {
                    res.loaded = true;
                    res.load_options = options;
                }
                id
            };
            self.inner.imports.lock().insert(id, FxHashSet::default());
            self.emit(loaded_flag(id, true));
            debug!(%uri, resource = %id, "created resource");
            Ok(id)
        })
    }

    /// Load a resource from the store. Loading a resource that is already
    /// loaded does nothing.
    ///
    /// Nothing is installed unless every unit to be read decodes; any
    /// failure aborts the whole load with [`DomainError::AbortResourceLoad`].
    pub fn load_resource(&self, path: &str, options: ResourceOptions) -> Result<ResourceId, DomainError> {
        let options = options | self.inner.config.default_resource_options;
        let uri = Self::to_uri(path, options);
        if let Some(id) = self.find_resource(&uri) {
            if self.is_loaded(id) {
                trace!(%uri, "resource already loaded");
                return Ok(id);
            }
        }

        self.unchecked("load resource", || {
            let abort = |source| DomainError::AbortResourceLoad {
                uri: uri.clone(),
                source,
            };
            let main = self.read_unit(&uri, options).map_err(abort)?;
            let eager = options.contains(ResourceOptions::LOAD_ALL_UNITS)
                || !options.contains(ResourceOptions::DONT_AUTO_LOAD_UNITS);
            let (staged, lazy) = if eager {
                self.stage_units(main.stubs.clone(), options, true).map_err(abort)?
            } else {
                (Vec::new(), main.stubs.clone())
            };

            let id = {
                let mut state = self.inner.state.write();
                let (id, fresh) = match state.resources().find(&uri) {
                    Some(id) => (id, false),
                    None => {
                        let id = state
                            .resources_mut()
                            .create(uri.clone())
                            .ok_or_else(|| DomainError::ResourceExists(uri.clone()))?;
                        (id, true)
                    }
                };
                if let Err(e) = install_resource(&mut state, id, main, staged, lazy, options) {
                    let _ = state.evict(id);
                    if fresh {
                        state.resources_mut().remove(id);
                    }
                    return Err(abort(InterchangeError::invalid_record(e.to_string())));
                }
                id
            };
            self.emit(loaded_flag(id, true));
            self.announce_imports();
            debug!(%uri, resource = %id, "loaded resource");
            Ok(id)
        })
    }

    /// Write a resource and its loaded separate units to the store.
    pub fn save_resource(&self, resource: ResourceId, options: ResourceOptions) -> Result<(), DomainError> {
        let options = options | self.inner.config.default_resource_options;
        self.unchecked("save resource", || {
            let (uri, units) = self.read(|state| {
                let uri = state
                    .resource(resource)
                    .map(|r| r.uri().clone())
                    .ok_or(DomainError::UnknownResource(resource))?;
                let units = encode_resource(state, resource).map_err(|source| DomainError::Save {
                    uri: uri.clone(),
                    source,
                })?;
                Ok::<_, DomainError>((uri, units))
            })?;
            let save_err = |source| DomainError::Save {
                uri: uri.clone(),
                source,
            };

            if options.contains(ResourceOptions::USE_FILE_BUFFER) {
                let buffered = units
                    .iter()
                    .map(|unit| self.encode_unit(unit, options))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(save_err)?;
                for (target, bytes) in &buffered {
                    self.inner.config.store.write(target, bytes).map_err(save_err)?;
                }
            } else {
                for unit in &units {
                    let (target, bytes) = self.encode_unit(unit, options).map_err(save_err)?;
                    self.inner.config.store.write(&target, &bytes).map_err(save_err)?;
                }
            }

            let was_modified = {
                let mut state = self.inner.state.write();
                state
                    .resources_mut()
                    .get_mut(resource)
                    .is_some_and(|res| std::mem::replace(&mut res.modified, false))
            };
            if was_modified {
                self.emit(
                    Notification::new(Notifier::Resource(resource), EventKind::Set)
                        .with_feature(Feature::IsModified)
                        .with_old(true)
                        .with_new(false),
                );
            }
            debug!(%uri, units = units.len(), "saved resource");
            Ok(())
        })
    }

    /// Give a resource a new URI, then save it there.
    pub fn save_resource_as(&self, resource: ResourceId, path: &str, options: ResourceOptions) -> Result<(), DomainError> {
        let options = options | self.inner.config.default_resource_options;
        let uri = Self::to_uri(path, options);
        self.unchecked("rename resource", || {
            let old = {
                let mut state = self.inner.state.write();
                let old = state
                    .resource(resource)
                    .map(|r| r.uri().clone())
                    .ok_or(DomainError::UnknownResource(resource))?;
                if !state.resources_mut().rename(resource, uri.clone()) {
                    return Err(DomainError::ResourceExists(uri.clone()));
                }
                old
            };
            if old != uri {
                self.emit(
                    Notification::new(Notifier::Resource(resource), EventKind::Set)
                        .with_feature(Feature::Uri)
                        .with_old(old)
                        .with_new(uri.clone()),
                );
            }
            Ok(())
        })?;
        self.save_resource(resource, options)
    }

    /// Drop a resource's objects from memory. The resource stays
    /// registered and can be loaded again. Undo history is flushed since
    /// it may refer to the dropped objects.
    pub fn unload_resource(&self, resource: ResourceId) -> Result<(), DomainError> {
        let unloaded = self.unchecked("unload resource", || {
            let prior = {
                let mut state = self.inner.state.write();
                let loaded = state
                    .resource(resource)
                    .map(|r| r.is_loaded())
                    .ok_or(DomainError::UnknownResource(resource))?;
                if !loaded {
                    return Ok(false);
                }
                state.evict(resource)?
            };
            self.emit(loaded_flag(resource, false).with_prior_root(prior));
            self.announce_imports();
            Ok(true)
        })?;
        if unloaded {
            debug!(%resource, "unloaded resource");
            self.flush_all()?;
        }
        Ok(())
    }

    /// Read the unit of an unloaded separate element into its stand-in.
    /// `false` if the element's unit was already loaded.
    pub(crate) fn load_unit(&self, resource: ResourceId, element: &ElementId) -> Result<bool, DomainError> {
        self.unchecked("load unit", || {
            let (uri, options) = self.read(|state| {
                let res = state.resource(resource).ok_or(DomainError::UnknownResource(resource))?;
                Ok::<_, DomainError>((
                    res.partition().unloaded.get(element).cloned(),
                    res.load_options(),
                ))
            })?;
            let Some(uri) = uri else {
                return Ok(false);
            };
            let abort = |source| DomainError::AbortResourceLoad {
                uri: uri.clone(),
                source,
            };
            let first = Stub {
                element: element.clone(),
                uri: uri.clone(),
            };
            let eager = !options.contains(ResourceOptions::DONT_AUTO_LOAD_UNITS);
            let (staged, lazy) = self.stage_units(vec![first], options, eager).map_err(abort)?;
            let loaded: Vec<ElementId> = staged.iter().map(|s| s.element.clone()).collect();

            let notifications = {
                let mut state = self.inner.state.write();
                install_units(&mut state, resource, staged, lazy)
                    .map_err(|e| abort(InterchangeError::invalid_record(e.to_string())))?;
                loaded
                    .iter()
                    .map(|el| load_notification(&state, el))
                    .collect::<Result<Vec<_>, _>>()?
            };
            for n in notifications {
                self.emit(n);
            }
            self.announce_imports();
            debug!(%element, units = loaded.len(), "loaded unit");
            Ok(true)
        })
    }

    // ── Staging ─────────────────────────────────────────────────────

    fn read_unit(&self, uri: &Uri, options: ResourceOptions) -> Result<DecodedUnit, InterchangeError> {
        let format = &self.inner.config.format;
        if !format.capabilities().read {
            return Err(InterchangeError::Unsupported(format!("{} cannot read units", format.name())));
        }
        let target = self.convert_uri(uri);
        let bytes = self.inner.config.store.read(&target)?;
        format.validate(&bytes)?;
        let snapshot = format.read(&bytes)?;
        decode_unit(&self.inner.schema, &snapshot, options)
    }

    fn stage_unit(&self, stub: &Stub, options: ResourceOptions) -> Result<StagedUnit, InterchangeError> {
        let mut decoded = self.read_unit(&stub.uri, options)?;
        if decoded.roots.first() != Some(&stub.element) || decoded.roots.len() != 1 {
            return Err(InterchangeError::invalid_record(format!(
                "unit '{}' does not hold '{}'",
                stub.uri, stub.element
            )));
        }
        let root = decoded
            .take_object(&stub.element)
            .ok_or_else(|| InterchangeError::invalid_record(format!("unit '{}' is empty", stub.uri)))?;
        let slots = root.slots().map(|(f, v)| (f, v.clone())).collect();
        Ok(StagedUnit {
            element: stub.element.clone(),
            slots,
            objects: decoded.objects,
            stubs: decoded.stubs,
        })
    }

    /// Stage the units of `initial`, then their nested units when `eager`.
    /// Returns the staged units parents first, and the stubs left unloaded.
    fn stage_units(
        &self,
        initial: Vec<Stub>,
        options: ResourceOptions,
        eager: bool,
    ) -> Result<(Vec<StagedUnit>, Vec<Stub>), InterchangeError> {
        let mut queue: VecDeque<Stub> = initial.into();
        let mut staged = Vec::new();
        let mut lazy = Vec::new();
        while let Some(stub) = queue.pop_front() {
            let unit = self.stage_unit(&stub, options)?;
            for nested in &unit.stubs {
                if eager {
                    queue.push_back(nested.clone());
                } else {
                    lazy.push(nested.clone());
                }
            }
            trace!(element = %stub.element, uri = %stub.uri, "staged unit");
            staged.push(unit);
        }
        Ok((staged, lazy))
    }

    fn encode_unit(&self, unit: &EncodedUnit, options: ResourceOptions) -> Result<(Uri, Vec<u8>), InterchangeError> {
        let format = &self.inner.config.format;
        if !format.capabilities().write {
            return Err(InterchangeError::Unsupported(format!("{} cannot write units", format.name())));
        }
        let target = self.convert_uri(&unit.uri);
        if !options.contains(ResourceOptions::OVERWRITE_READONLY) && self.inner.config.store.is_read_only(&target) {
            return Err(InterchangeError::ReadOnly(target));
        }
        let bytes = format.write(&unit.snapshot)?;
        Ok((target, bytes))
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn find_resource(&self, uri: &Uri) -> Option<ResourceId> {
        self.read(|state| state.resources().find(uri))
    }

    /// Every registered resource, in creation order.
    pub fn resources(&self) -> Vec<ResourceId> {
        self.read(|state| state.resources().iter().map(|r| r.id()).collect())
    }

    pub fn resource_uri(&self, resource: ResourceId) -> Option<Uri> {
        self.read(|state| state.resource(resource).map(|r| r.uri().clone()))
    }

    pub fn resource_roots(&self, resource: ResourceId) -> Vec<ElementId> {
        self.read(|state| {
            state
                .resource(resource)
                .map(|r| r.contents().to_vec())
                .unwrap_or_default()
        })
    }

    pub fn is_loaded(&self, resource: ResourceId) -> bool {
        self.read(|state| state.resource(resource).is_some_and(|r| r.is_loaded()))
    }

    pub fn is_modified(&self, resource: ResourceId) -> bool {
        self.read(|state| state.resource(resource).is_some_and(|r| r.is_modified()))
    }

    // ── Imports ─────────────────────────────────────────────────────

    /// Resources `resource` refers to directly.
    pub fn imports(&self, resource: ResourceId) -> Vec<ResourceId> {
        let mut out: Vec<_> = self.read(|state| state.imports(resource)).into_iter().collect();
        out.sort();
        out
    }

    /// Resources referring to `resource` directly.
    pub fn exports(&self, resource: ResourceId) -> Vec<ResourceId> {
        let graph = self.import_graph();
        let mut out: Vec<_> = graph
            .iter()
            .filter(|(_, targets)| targets.contains(&resource))
            .map(|(source, _)| *source)
            .collect();
        out.sort();
        out
    }

    /// Resources reachable through imports, excluding `resource` itself.
    pub fn all_imports(&self, resource: ResourceId) -> Vec<ResourceId> {
        let graph = self.import_graph();
        reachable(resource, |r| graph.get(&r).into_iter().flatten().copied().collect())
    }

    /// Resources that reach `resource` through imports.
    pub fn all_exports(&self, resource: ResourceId) -> Vec<ResourceId> {
        let graph = self.import_graph();
        reachable(resource, |r| {
            graph
                .iter()
                .filter(|(_, targets)| targets.contains(&r))
                .map(|(source, _)| *source)
                .collect()
        })
    }

    fn import_graph(&self) -> FxHashMap<ResourceId, FxHashSet<ResourceId>> {
        self.read(|state| {
            state
                .resources()
                .iter()
                .map(|r| (r.id(), state.imports(r.id())))
                .collect()
        })
    }

    /// Recompute imports and describe what changed since the last call as
    /// `Import` notifications on the importer and `Export` notifications on
    /// the imported resource.
    pub(super) fn refresh_imports(&self) -> Vec<Notification> {
        let (current, uris) = self.read(|state| {
            let uris: FxHashMap<ResourceId, Uri> = state
                .resources()
                .iter()
                .map(|r| (r.id(), r.uri().clone()))
                .collect();
            let current: FxHashMap<ResourceId, FxHashSet<ResourceId>> = state
                .resources()
                .iter()
                .map(|r| (r.id(), state.imports(r.id())))
                .collect();
            (current, uris)
        });

        let mut cache = self.inner.imports.lock();
        let mut sources: Vec<ResourceId> = current.keys().chain(cache.keys()).copied().collect();
        sources.sort();
        sources.dedup();

        let empty = FxHashSet::default();
        let mut out = Vec::new();
        for source in sources {
            let now = current.get(&source).unwrap_or(&empty);
            let before = cache.get(&source).unwrap_or(&empty);
            let mut added: Vec<_> = now.difference(before).copied().collect();
            let mut removed: Vec<_> = before.difference(now).copied().collect();
            added.sort();
            removed.sort();
            for (target, linked) in added
                .into_iter()
                .map(|t| (t, true))
                .chain(removed.into_iter().map(|t| (t, false)))
            {
                let (Some(source_uri), Some(target_uri)) = (uris.get(&source), uris.get(&target)) else {
                    continue;
                };
                out.push(import_edge(EventKind::Import, source, target_uri, linked));
                out.push(import_edge(EventKind::Export, target, source_uri, linked));
            }
        }
        *cache = current;
        if !out.is_empty() {
            trace!(notifications = out.len(), "imports changed");
        }
        out
    }

    fn announce_imports(&self) {
        for n in self.refresh_imports() {
            self.emit(n);
        }
    }
}

/// Put a decoded main unit and its staged units into the graph.
fn install_resource(
    state: &mut ModelState,
    resource: ResourceId,
    main: DecodedUnit,
    staged: Vec<StagedUnit>,
    lazy: Vec<Stub>,
    options: ResourceOptions,
) -> Result<(), ModelError> {
    state.install_roots(resource, main.objects, main.roots)?;
    {
        let res = state
            .resources_mut()
            .get_mut(resource)
            .ok_or(ModelError::UnknownResource(resource))?;
        for stub in main.stubs {
            res.partition.separate.insert(stub.element, stub.uri);
        }
        res.loaded = true;
        res.modified = false;
        res.load_options = options;
    }
    install_units(state, resource, staged, lazy)
}

fn install_units(
    state: &mut ModelState,
    resource: ResourceId,
    staged: Vec<StagedUnit>,
    lazy: Vec<Stub>,
) -> Result<(), ModelError> {
    for unit in staged {
        state.fill_stand_in(&unit.element, unit.slots, unit.objects)?;
        let res = state
            .resources_mut()
            .get_mut(resource)
            .ok_or(ModelError::UnknownResource(resource))?;
        res.partition.unloaded.shift_remove(&unit.element);
        for stub in unit.stubs {
            res.partition.separate.insert(stub.element, stub.uri);
        }
    }
    let res = state
        .resources_mut()
        .get_mut(resource)
        .ok_or(ModelError::UnknownResource(resource))?;
    for stub in lazy {
        res.partition.unloaded.insert(stub.element, stub.uri);
    }
    Ok(())
}

fn load_notification(state: &ModelState, element: &ElementId) -> Result<Notification, ModelError> {
    let (notifier, feature, position) = state.locate(element)?;
    let mut n = Notification::new(notifier, EventKind::Load)
        .at(position)
        .with_new(element.clone())
        .with_element(element.clone());
    if let Some(feature) = feature {
        n = n.with_feature(feature);
    }
    Ok(n)
}

fn loaded_flag(resource: ResourceId, loaded: bool) -> Notification {
    Notification::new(Notifier::Resource(resource), EventKind::Set)
        .with_feature(Feature::IsLoaded)
        .with_old(!loaded)
        .with_new(loaded)
}

fn import_edge(kind: EventKind, notifier: ResourceId, other: &Uri, linked: bool) -> Notification {
    let n = Notification::new(Notifier::Resource(notifier), kind);
    if linked {
        n.with_new(other.clone())
    } else {
        n.with_old(other.clone())
    }
}

/// Breadth-first closure from `start`, sorted, without `start`.
fn reachable(start: ResourceId, next: impl Fn(ResourceId) -> Vec<ResourceId>) -> Vec<ResourceId> {
    let mut seen = FxHashSet::default();
    let mut queue = VecDeque::from([start]);
    while let Some(r) = queue.pop_front() {
        for n in next(r) {
            if n != start && seen.insert(n) {
                queue.push_back(n);
            }
        }
    }
    let mut out: Vec<_> = seen.into_iter().collect();
    out.sort();
    out
}
