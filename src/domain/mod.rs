//! The editing domain: one object graph, its resources, and the action,
//! undo and notification machinery around them.
//!
//! ```text
//!                        EditingDomain (cheap to clone)
//!                                  │
//!   ┌──────────────┬───────────────┼───────────────┬──────────────┐
//!   ▼              ▼               ▼               ▼              ▼
//! ActionStack  RwLock<ModelState>  Mutex<Transaction>  Mutex<UndoStack>  EventBroker
//!  (frames)     (graph)            (changes of the      (history)        (listeners)
//!                                   open action)
//! ```
//!
//! Mutations are only legal inside a write or unchecked action. Each one
//! runs under a short write lock on the graph and folds its changes and
//! notifications into the transaction. When the outermost write completes
//! the transaction is validated, recorded as an undo interval and its
//! notifications are published with no lock held.
//!
//! Locks are never nested: the graph, transaction and history locks are
//! each taken and released on their own, and listeners, policies and
//! semantic procedures always run with none of them held.

mod actions;
mod config;
mod error;
mod history;
mod pathmap;
mod registry;
mod resources;
mod validation;

pub use crate::base::{DestroyOptions, ResourceOptions, RunOptions};
pub use actions::{ActionScope, Completion, Outcome};
pub use config::DomainConfig;
pub use error::DomainError;
pub use history::IntervalInfo;
pub use pathmap::PathMap;
pub use registry::DomainRegistry;
pub use validation::{
    SemanticProcedure, Severity, ValidationMessage, ValidationStatus, Validator,
};

use crate::action::ActionStack;
use crate::base::{ElementId, ListenerId, ResourceId, Uri};
use crate::logical::{LogicalResource, PolicyRegistry, SeparationPolicy};
use crate::model::{
    Change, ClassId, FeatureId, GraphSnapshot, ModelError, ModelObject, ModelState, Recorder,
    Schema, Value,
};
use crate::notify::{
    ChangeOrigin, DispatchContext, DispatchError, EventBroker, Feature, Filter, Listener,
    ModelLookup, Notification, Notifier,
};
use crate::undo::UndoStack;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::{debug, warn};

// ============================================================================
// TRANSACTION
// ============================================================================

#[derive(Debug)]
struct Recorded {
    change: Change,
    /// Made while a recording write frame was open.
    undoable: bool,
}

/// What the open exclusive action has done so far.
#[derive(Debug, Default)]
struct Transaction {
    changes: Vec<Recorded>,
    notifications: Vec<Notification>,
    dirtied: Vec<ResourceId>,
    origin: ChangeOrigin,
}

struct DomainInner {
    config: DomainConfig,
    schema: Arc<Schema>,
    actions: ActionStack,
    state: RwLock<ModelState>,
    tx: Mutex<Transaction>,
    history: Mutex<UndoStack>,
    broker: EventBroker,
    paths: PathMap,
    policies: PolicyRegistry,
    validators: RwLock<Vec<Arc<dyn Validator>>>,
    procedures: RwLock<Vec<Arc<dyn SemanticProcedure>>>,
    /// Cross-resource imports as last announced.
    imports: Mutex<FxHashMap<ResourceId, FxHashSet<ResourceId>>>,
}

/// Handle to an editing domain. Clones share the same domain.
#[derive(Clone)]
pub struct EditingDomain {
    inner: Arc<DomainInner>,
}

impl std::fmt::Debug for EditingDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditingDomain")
            .field("config", &self.inner.config)
            .field("broker", &self.inner.broker)
            .finish_non_exhaustive()
    }
}

/// Resolves notification positions against the live graph while a batch
/// is being published.
struct StateLookup<'a> {
    state: &'a RwLock<ModelState>,
}

impl ModelLookup for StateLookup<'_> {
    fn element_at(
        &self,
        notifier: &Notifier,
        feature: Option<Feature>,
        position: Option<usize>,
    ) -> Option<ElementId> {
        self.state.read().element_at(notifier, feature, position)
    }
}

impl EditingDomain {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_config(schema, DomainConfig::default())
    }

    pub fn with_config(schema: Arc<Schema>, config: DomainConfig) -> Self {
        let history = UndoStack::new(config.max_undo_depth, config.flush_count);
        Self {
            inner: Arc::new(DomainInner {
                state: RwLock::new(ModelState::new(Arc::clone(&schema))),
                schema,
                actions: ActionStack::new(),
                tx: Mutex::new(Transaction::default()),
                history: Mutex::new(history),
                broker: EventBroker::new(),
                paths: PathMap::new(),
                policies: PolicyRegistry::new(),
                validators: RwLock::new(Vec::new()),
                procedures: RwLock::new(Vec::new()),
                imports: Mutex::new(FxHashMap::default()),
                config,
            }),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    pub fn config(&self) -> &DomainConfig {
        &self.inner.config
    }

    /// Two handles to the same domain.
    pub fn same_domain(&self, other: &EditingDomain) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Graph queries ───────────────────────────────────────────────
    //
    // The queries below open no action frame. Each call sees the graph as
    // it is between two elementary changes, so a thread outside any action
    // may observe another thread's write before it completes or is rolled
    // back. Wrap them in `run_as_read` to see only completed writes.

    /// Run `f` against the graph under a shared lock, without a read frame.
    ///
    /// `f` must not call back into the domain.
    pub fn read<T>(&self, f: impl FnOnce(&ModelState) -> T) -> T {
        f(&self.inner.state.read())
    }

    pub fn object(&self, id: &ElementId) -> Option<ModelObject> {
        self.inner.state.read().object(id).cloned()
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        self.inner.state.read().contains(id)
    }

    pub fn get(&self, id: &ElementId, feature: FeatureId) -> Option<Value> {
        self.inner
            .state
            .read()
            .object(id)
            .map(|o| o.get(feature).clone())
    }

    pub fn children(&self, id: &ElementId) -> Vec<ElementId> {
        self.inner.state.read().children(id)
    }

    pub fn container(&self, id: &ElementId) -> Option<ElementId> {
        self.inner
            .state
            .read()
            .object(id)
            .and_then(|o| o.container())
            .map(|c| c.owner.clone())
    }

    pub fn resource_of(&self, id: &ElementId) -> Option<ResourceId> {
        self.inner.state.read().resource_of(id)
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.inner.state.read().snapshot()
    }

    // ── Mutations ───────────────────────────────────────────────────

    pub fn create(&self, class: ClassId) -> Result<ElementId, DomainError> {
        self.mutate(|state, rec| state.create(rec, class, None))
    }

    /// Create an object under a caller-chosen identity.
    pub fn create_with_id(&self, class: ClassId, id: impl Into<ElementId>) -> Result<ElementId, DomainError> {
        let id = id.into();
        self.mutate(|state, rec| state.create(rec, class, Some(id)))
    }

    pub fn destroy(&self, object: &ElementId, options: DestroyOptions) -> Result<(), DomainError> {
        self.mutate(|state, rec| state.destroy(rec, object, options))
    }

    /// Set a single-valued feature. A contained value is first detached
    /// from its previous container.
    pub fn set(&self, object: &ElementId, feature: FeatureId, value: impl Into<Value>) -> Result<(), DomainError> {
        let value = value.into();
        self.mutate(|state, rec| state.set(rec, object, feature, value))
    }

    /// Clear a feature; many-valued features lose all their items.
    pub fn unset(&self, object: &ElementId, feature: FeatureId) -> Result<(), DomainError> {
        self.mutate(|state, rec| state.unset(rec, object, feature))
    }

    pub fn add(&self, object: &ElementId, feature: FeatureId, value: impl Into<Value>) -> Result<(), DomainError> {
        let value = value.into();
        self.mutate(|state, rec| state.add(rec, object, feature, value, None))
    }

    pub fn insert(
        &self,
        object: &ElementId,
        feature: FeatureId,
        index: usize,
        value: impl Into<Value>,
    ) -> Result<(), DomainError> {
        let value = value.into();
        self.mutate(|state, rec| state.add(rec, object, feature, value, Some(index)))
    }

    pub fn add_many(&self, object: &ElementId, feature: FeatureId, values: Vec<Value>) -> Result<(), DomainError> {
        self.mutate(|state, rec| state.add_many(rec, object, feature, values, None))
    }

    /// Remove the first occurrence of `value`. `false` if it was not there.
    pub fn remove(&self, object: &ElementId, feature: FeatureId, value: impl Into<Value>) -> Result<bool, DomainError> {
        let value = value.into();
        self.mutate(|state, rec| state.remove(rec, object, feature, &value))
    }

    /// Remove several values at once; returns how many were found.
    pub fn remove_many(&self, object: &ElementId, feature: FeatureId, values: &[Value]) -> Result<usize, DomainError> {
        self.mutate(|state, rec| state.remove_many(rec, object, feature, values))
    }

    pub fn move_within(&self, object: &ElementId, feature: FeatureId, from: usize, to: usize) -> Result<(), DomainError> {
        self.mutate(|state, rec| state.move_within(rec, object, feature, from, to))
    }

    pub fn add_root(&self, resource: ResourceId, object: &ElementId) -> Result<(), DomainError> {
        self.mutate(|state, rec| state.add_root(rec, resource, object, None))
    }

    pub fn remove_root(&self, resource: ResourceId, object: &ElementId) -> Result<bool, DomainError> {
        self.mutate(|state, rec| state.remove_root(rec, resource, object))
    }

    /// Run one mutation against the graph and fold what it did into the
    /// open transaction. A failing mutation leaves no trace.
    pub(crate) fn mutate<T>(
        &self,
        f: impl FnOnce(&mut ModelState, &mut Recorder) -> Result<T, ModelError>,
    ) -> Result<T, DomainError> {
        let actions = &self.inner.actions;
        if !actions.can_write() {
            return Err(DomainError::illegal("no write action in progress"));
        }
        let undoable = actions.is_recording();
        let silent = actions.effective_options().contains(RunOptions::SILENT);
        let origin = self.inner.tx.lock().origin;

        let mut rec = Recorder::new(origin);
        let result = {
            let mut state = self.inner.state.write();
            let result = f(&mut state, &mut rec);
            if result.is_err() && !rec.changes.is_empty() {
                let mut scratch = Recorder::new(origin);
                if let Err(e) = state.revert(&mut scratch, &rec.changes) {
                    warn!(error = %e, "failed to revert a partial mutation");
                }
                clear_modified(&mut state, &rec.dirtied);
            }
            result
        };
        match result {
            Ok(value) => {
                self.fold(rec, undoable, silent);
                Ok(value)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn fold(&self, rec: Recorder, undoable: bool, silent: bool) {
        let mut tx = self.inner.tx.lock();
        tx.changes.extend(
            rec.changes
                .into_iter()
                .map(|change| Recorded { change, undoable }),
        );
        if !silent {
            tx.notifications.extend(rec.notifications);
        }
        tx.dirtied.extend(rec.dirtied);
    }

    /// Queue a notification that no graph change produced.
    fn emit(&self, n: Notification) {
        if self.inner.actions.effective_options().contains(RunOptions::SILENT) {
            return;
        }
        self.inner.tx.lock().notifications.push(n);
    }

    /// Inject a client notification into the current batch, or publish it
    /// at once when no exclusive action is open on this thread.
    pub fn send_notification(&self, n: Notification) -> Result<(), DomainError> {
        let n = n.with_origin(ChangeOrigin::Client);
        if self.inner.actions.can_write() {
            self.emit(n);
            return Ok(());
        }
        self.publish(vec![n])?;
        Ok(())
    }

    // ── Listeners ───────────────────────────────────────────────────

    /// Register a listener. Without a filter it receives nothing.
    pub fn add_listener(&self, filter: Option<Filter>, listener: Arc<dyn Listener>) -> ListenerId {
        self.inner.broker.add_listener(filter, listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.broker.remove_listener(id)
    }

    pub fn broker(&self) -> &EventBroker {
        &self.inner.broker
    }

    fn publish(&self, batch: Vec<Notification>) -> Result<(), DispatchError> {
        if batch.is_empty() {
            return Ok(());
        }
        let lookup = StateLookup {
            state: &self.inner.state,
        };
        self.inner.broker.publish(&DispatchContext::new(&lookup), batch)
    }

    // ── Validation ──────────────────────────────────────────────────

    pub fn add_validator(&self, validator: Arc<dyn Validator>) {
        self.inner.validators.write().push(validator);
    }

    pub fn add_semantic_procedure(&self, procedure: Arc<dyn SemanticProcedure>) {
        self.inner.procedures.write().push(procedure);
    }

    // ── Path variables ──────────────────────────────────────────────

    pub fn path_map(&self) -> &PathMap {
        &self.inner.paths
    }

    pub fn set_path_variable(&self, name: &str, value: &str) {
        self.inner.paths.set(name, value);
    }

    pub fn remove_path_variable(&self, name: &str) -> bool {
        self.inner.paths.remove(name)
    }

    /// The variable's value, or an empty string when it is not set.
    pub fn get_path_variable(&self, name: &str) -> String {
        self.inner.paths.get(name)
    }

    /// Rewrite a `pathmap://` URI through the path variables.
    pub fn convert_uri(&self, uri: &Uri) -> Uri {
        self.inner.paths.resolve(uri)
    }

    /// Rewrite a URI under a variable's value into `pathmap://` form.
    pub fn deresolve_uri(&self, uri: &Uri) -> Uri {
        self.inner.paths.deresolve(uri)
    }

    // ── Logical resources ───────────────────────────────────────────

    /// View of `resource` as a logical resource.
    pub fn logical(&self, resource: ResourceId) -> Result<LogicalResource, DomainError> {
        if self.inner.state.read().resource(resource).is_none() {
            return Err(DomainError::UnknownResource(resource));
        }
        Ok(LogicalResource::new(self.clone(), resource))
    }

    /// Register a separation policy for elements of `class`, or for all.
    pub fn add_separation_policy(&self, class: Option<ClassId>, policy: Arc<dyn SeparationPolicy>) {
        self.inner.policies.register(class, policy);
    }

    pub(crate) fn policies(&self) -> &PolicyRegistry {
        &self.inner.policies
    }
}

/// Reset modified flags a rolled-back batch switched on.
fn clear_modified(state: &mut ModelState, dirtied: &[ResourceId]) {
    for resource in dirtied {
        if let Some(res) = state.resources_mut().get_mut(*resource) {
            res.modified = false;
        }
    }
    if !dirtied.is_empty() {
        debug!(count = dirtied.len(), "restored clean resources");
    }
}
