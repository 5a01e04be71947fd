//! Batched notification delivery.
//!
//! The broker hands each published batch to every listener whose filter
//! matches at least one notification of it. Listeners always see the
//! complete batch, in recorded order, so they can correlate changes.
//!
//! Delivery is synchronous on the publishing thread. A batch published
//! from inside a listener callback is queued and delivered after the
//! current batch has reached every listener, keeping batches ordered.
//! A failing (or panicking) listener does not stop delivery; the first
//! failure is returned once everyone has been called.

use super::filter::{Filter, WatchSet};
use super::notification::{EventKind, Notification, Notifier};
use crate::base::{ElementId, ListenerId};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;
use thiserror::Error;
use tracing::{trace, warn};

// ============================================================================
// LISTENERS
// ============================================================================

/// Failure reported by a listener.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ListenerError {
    message: String,
}

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A listener failure together with the listener that raised it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{listener} failed: {source}")]
pub struct DispatchError {
    pub listener: ListenerId,
    #[source]
    pub source: ListenerError,
}

/// Read access to the graph for listeners that need to resolve
/// notification positions.
pub trait ModelLookup: Send + Sync {
    fn element_at(
        &self,
        notifier: &Notifier,
        feature: Option<super::Feature>,
        position: Option<usize>,
    ) -> Option<ElementId>;
}

/// What a listener can see of the domain while handling a batch.
#[derive(Clone, Copy)]
pub struct DispatchContext<'a> {
    lookup: Option<&'a dyn ModelLookup>,
}

impl<'a> DispatchContext<'a> {
    pub fn new(lookup: &'a dyn ModelLookup) -> Self {
        Self {
            lookup: Some(lookup),
        }
    }

    /// A context with no graph behind it; every lookup misses.
    pub fn detached() -> Self {
        Self { lookup: None }
    }

    /// The element a notification addresses through feature and position.
    pub fn element_at(&self, n: &Notification) -> Option<ElementId> {
        self.lookup?
            .element_at(n.notifier(), n.feature(), n.position())
    }
}

pub trait Listener: Send + Sync {
    fn on_event(&self, cx: &DispatchContext<'_>, batch: &[Notification]) -> Result<(), ListenerError>;
}

/// Plain closures listen to batches without looking at the graph.
impl<F> Listener for F
where
    F: Fn(&[Notification]) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_event(&self, _cx: &DispatchContext<'_>, batch: &[Notification]) -> Result<(), ListenerError> {
        self(batch)
    }
}

#[derive(Clone)]
struct Registration {
    id: ListenerId,
    filter: Option<Filter>,
    listener: Arc<dyn Listener>,
}

// ============================================================================
// BROKER
// ============================================================================

#[derive(Default)]
pub struct EventBroker {
    listeners: RwLock<Vec<Registration>>,
    watch_sets: Mutex<Vec<WatchSet>>,
    /// Batches waiting on threads that are currently dispatching.
    queues: Mutex<FxHashMap<ThreadId, VecDeque<Vec<Notification>>>>,
    next_id: AtomicU64,
}

impl EventBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Without a filter it receives nothing.
    pub fn add_listener(&self, filter: Option<Filter>, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Some(filter) = &filter {
            let mut sets = self.watch_sets.lock();
            for set in filter.watch_sets() {
                if !sets.iter().any(|s| s.same_set(&set)) {
                    sets.push(set);
                }
            }
        }
        self.listeners.write().push(Registration {
            id,
            filter,
            listener,
        });
        trace!(%id, "listener added");
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        let removed = listeners.len() != before;
        if removed {
            let live: Vec<WatchSet> = listeners
                .iter()
                .filter_map(|r| r.filter.as_ref())
                .flat_map(Filter::watch_sets)
                .collect();
            self.watch_sets
                .lock()
                .retain(|s| live.iter().any(|l| l.same_set(s)));
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver a batch. Returns the first listener failure, if any.
    pub fn publish(&self, cx: &DispatchContext<'_>, batch: Vec<Notification>) -> Result<(), DispatchError> {
        if batch.is_empty() {
            return Ok(());
        }
        let me = std::thread::current().id();
        {
            let mut queues = self.queues.lock();
            if let Some(queue) = queues.get_mut(&me) {
                trace!(len = batch.len(), "queued reentrant batch");
                queue.push_back(batch);
                return Ok(());
            }
            queues.insert(me, VecDeque::new());
        }

        let mut first_error = None;
        let mut next = Some(batch);
        while let Some(batch) = next {
            if let Err(e) = self.deliver(cx, &batch) {
                first_error.get_or_insert(e);
            }
            let mut queues = self.queues.lock();
            next = queues.get_mut(&me).and_then(VecDeque::pop_front);
            if next.is_none() {
                queues.remove(&me);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn deliver(&self, cx: &DispatchContext<'_>, batch: &[Notification]) -> Result<(), DispatchError> {
        self.prune_destroyed(batch);
        let listeners: Vec<Registration> = self.listeners.read().clone();
        trace!(len = batch.len(), listeners = listeners.len(), "publishing batch");

        let mut first_error = None;
        for reg in &listeners {
            let Some(filter) = &reg.filter else {
                continue;
            };
            if !filter.matches_any(batch) {
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| reg.listener.on_event(cx, batch)))
                .unwrap_or_else(|_| Err(ListenerError::new("listener panicked")));
            if let Err(source) = outcome {
                warn!(listener = %reg.id, error = %source, "listener failed");
                first_error.get_or_insert(DispatchError {
                    listener: reg.id,
                    source,
                });
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Destroyed objects leave every watch set.
    fn prune_destroyed(&self, batch: &[Notification]) {
        let sets = self.watch_sets.lock();
        if sets.is_empty() {
            return;
        }
        for n in batch.iter().filter(|n| n.kind() == EventKind::Destroy) {
            let key = n.notifier().key();
            for set in sets.iter() {
                set.unwatch(&key);
            }
        }
    }
}

impl std::fmt::Debug for EventBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroker")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
