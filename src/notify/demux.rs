//! Translating raw notification batches into typed lifecycle callbacks.
//!
//! ```text
//! notifier        kind                      feature          callback
//! ─────────────────────────────────────────────────────────────────────────
//! Resource        Add / AddMany             contents         root_added (per object)
//! Resource        Remove / RemoveMany       contents         root_removed (per object)
//! Resource        Set                       is-modified      dirtied (false→true) / saved (true→false)
//! Resource        Set                       uri              saved
//! Resource        Set                       is-loaded        loaded / unloaded (prior root)
//! Resource        Import / Export           -                imported / exported
//! Resource        Separate / Absorb / Load  contents[pos]    separated / absorbed / loaded
//! Object          Add / AddMany             any              created per object, else modified
//! Object          Remove / RemoveMany       any              deleted per object, else modified
//! Object          Set / Unset               1-containment    created(new) and/or deleted(old)
//! Object          Set / Unset / Move        otherwise        modified
//! Object          Separate / Absorb / Load  feature[pos]     separated / absorbed / loaded
//! UndoInterval    Create / Destroy          -                interval closed / flushed
//! ```

use super::broker::{DispatchContext, Listener, ListenerError};
use super::notification::{EventKind, Feature, Notification, Notifier};
use crate::base::{ElementId, IntervalId, ResourceId};
use crate::model::{ModelError, Schema, Value};
use std::sync::Arc;
use tracing::trace;

type Callback = Result<(), ListenerError>;

/// Typed lifecycle callbacks. Every method defaults to doing nothing.
#[allow(unused_variables)]
pub trait DemuxHandler: Send + Sync {
    /// Called once per batch before any other callback.
    fn on_batch_started(&self, batch: &[Notification]) -> Callback {
        Ok(())
    }

    /// Called once per batch after every notification was handled.
    fn on_batch_finished(&self, batch: &[Notification]) -> Callback {
        Ok(())
    }

    fn on_root_added(&self, n: &Notification, resource: ResourceId, root: &ElementId) -> Callback {
        Ok(())
    }

    fn on_root_removed(&self, n: &Notification, resource: ResourceId, root: &ElementId) -> Callback {
        Ok(())
    }

    fn on_resource_dirtied(&self, n: &Notification, resource: ResourceId) -> Callback {
        Ok(())
    }

    fn on_resource_saved(&self, n: &Notification, resource: ResourceId) -> Callback {
        Ok(())
    }

    fn on_resource_loaded(&self, n: &Notification, resource: ResourceId) -> Callback {
        Ok(())
    }

    fn on_resource_unloaded(
        &self,
        n: &Notification,
        resource: ResourceId,
        prior_root: Option<&ElementId>,
    ) -> Callback {
        Ok(())
    }

    fn on_resource_imported(&self, n: &Notification, resource: ResourceId) -> Callback {
        Ok(())
    }

    fn on_resource_exported(&self, n: &Notification, resource: ResourceId) -> Callback {
        Ok(())
    }

    fn on_element_created(&self, n: &Notification, owner: &ElementId, element: &ElementId) -> Callback {
        Ok(())
    }

    fn on_element_deleted(&self, n: &Notification, owner: &ElementId, element: &ElementId) -> Callback {
        Ok(())
    }

    fn on_element_modified(&self, n: &Notification, element: &ElementId) -> Callback {
        Ok(())
    }

    fn on_element_separated(&self, n: &Notification, element: &ElementId) -> Callback {
        Ok(())
    }

    fn on_element_absorbed(&self, n: &Notification, element: &ElementId) -> Callback {
        Ok(())
    }

    fn on_element_loaded(&self, n: &Notification, element: &ElementId) -> Callback {
        Ok(())
    }

    fn on_undo_interval_closed(&self, n: &Notification, interval: IntervalId) -> Callback {
        Ok(())
    }

    fn on_undo_intervals_flushed(&self, n: &Notification, interval: IntervalId) -> Callback {
        Ok(())
    }
}

/// A listener that forwards each notification to a [`DemuxHandler`].
///
/// Register it with [`Filter::demuxable`](super::Filter::demuxable) or a
/// narrower filter. Handler failures do not stop the remaining
/// notifications of the batch; the first one is returned.
pub struct Demultiplexer<H> {
    handler: H,
    schema: Arc<Schema>,
}

impl<H: DemuxHandler> Demultiplexer<H> {
    pub fn new(schema: Arc<Schema>, handler: H) -> Self {
        Self { handler, schema }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Translate one notification.
    pub fn dispatch(&self, cx: &DispatchContext<'_>, n: &Notification) -> Callback {
        trace!(kind = ?n.kind(), "demultiplexing");
        match n.notifier() {
            Notifier::Resource(resource) => self.dispatch_resource(cx, n, *resource),
            Notifier::Object { id, .. } => self.dispatch_object(cx, n, id),
            Notifier::UndoInterval(interval) => match n.kind() {
                EventKind::Create => self.handler.on_undo_interval_closed(n, *interval),
                EventKind::Destroy => self.handler.on_undo_intervals_flushed(n, *interval),
                _ => Ok(()),
            },
        }
    }

    fn dispatch_resource(&self, cx: &DispatchContext<'_>, n: &Notification, resource: ResourceId) -> Callback {
        let h = &self.handler;
        match (n.kind(), n.feature()) {
            (EventKind::Add | EventKind::AddMany, Some(Feature::Contents)) => {
                each_object(n.new_value(), |root| h.on_root_added(n, resource, root))
            }
            (EventKind::Remove | EventKind::RemoveMany, Some(Feature::Contents)) => {
                each_object(n.old_value(), |root| h.on_root_removed(n, resource, root))
            }
            (EventKind::Set, Some(Feature::IsModified)) => {
                match (n.old_value().as_bool(), n.new_value().as_bool()) {
                    (old, Some(true)) if old != Some(true) => h.on_resource_dirtied(n, resource),
                    (old, Some(false)) if old != Some(false) => h.on_resource_saved(n, resource),
                    _ => Ok(()),
                }
            }
            (EventKind::Set, Some(Feature::Uri)) => h.on_resource_saved(n, resource),
            (EventKind::Set, Some(Feature::IsLoaded)) => match n.new_value().as_bool() {
                Some(true) => h.on_resource_loaded(n, resource),
                _ => h.on_resource_unloaded(n, resource, n.prior_root()),
            },
            (EventKind::Import, _) => h.on_resource_imported(n, resource),
            (EventKind::Export, _) => h.on_resource_exported(n, resource),
            (EventKind::Separate | EventKind::Absorb | EventKind::Load, _) => {
                self.dispatch_partition(cx, n)
            }
            _ => Ok(()),
        }
    }

    fn dispatch_object(&self, cx: &DispatchContext<'_>, n: &Notification, owner: &ElementId) -> Callback {
        let h = &self.handler;
        match n.kind() {
            EventKind::Add => match n.new_value().as_object() {
                Some(element) => h.on_element_created(n, owner, element),
                None => h.on_element_modified(n, owner),
            },
            EventKind::AddMany => for_items(n.new_value(), |item| match item.as_object() {
                Some(element) => h.on_element_created(n, owner, element),
                None => h.on_element_modified(n, owner),
            }),
            EventKind::Remove => match n.old_value().as_object() {
                Some(element) => h.on_element_deleted(n, owner, element),
                None => h.on_element_modified(n, owner),
            },
            EventKind::RemoveMany => for_items(n.old_value(), |item| match item.as_object() {
                Some(element) => h.on_element_deleted(n, owner, element),
                None => h.on_element_modified(n, owner),
            }),
            EventKind::Set | EventKind::Unset if self.is_single_containment(n) => {
                let mut first = None;
                if let Some(element) = n.new_value().as_object() {
                    keep_first(&mut first, h.on_element_created(n, owner, element));
                }
                if let Some(element) = n.old_value().as_object() {
                    keep_first(&mut first, h.on_element_deleted(n, owner, element));
                }
                if n.new_value().is_null() && n.old_value().is_null() {
                    keep_first(&mut first, h.on_element_modified(n, owner));
                }
                first.map_or(Ok(()), Err)
            }
            EventKind::Set | EventKind::Unset | EventKind::Move => h.on_element_modified(n, owner),
            EventKind::Separate | EventKind::Absorb | EventKind::Load => self.dispatch_partition(cx, n),
            _ => Ok(()),
        }
    }

    /// Separate/absorb/load name the element by feature and position. The
    /// position is checked against the element carried by the notification,
    /// which wins when later changes of the batch have shifted the feature.
    fn dispatch_partition(&self, cx: &DispatchContext<'_>, n: &Notification) -> Callback {
        let resolved = cx.element_at(n);
        let element = match (n.element(), n.kind(), n.new_value()) {
            (Some(carried), ..) => match resolved {
                Some(at) if &at == carried => Some(at),
                _ => Some(carried.clone()),
            },
            (None, EventKind::Load, Value::Object(id)) => Some(id.clone()),
            (None, ..) => resolved,
        };
        let Some(element) = element else {
            return Err(ListenerError::new(
                ModelError::inconsistent(format!("cannot resolve element of {:?} notification", n.kind()))
                    .to_string(),
            ));
        };
        match n.kind() {
            EventKind::Separate => self.handler.on_element_separated(n, &element),
            EventKind::Absorb => self.handler.on_element_absorbed(n, &element),
            _ => self.handler.on_element_loaded(n, &element),
        }
    }

    fn is_single_containment(&self, n: &Notification) -> bool {
        n.object_feature()
            .and_then(|f| self.schema.feature(f))
            .is_some_and(|def| def.is_containment() && !def.many)
    }
}

impl<H: DemuxHandler> Listener for Demultiplexer<H> {
    fn on_event(&self, cx: &DispatchContext<'_>, batch: &[Notification]) -> Callback {
        let mut first = None;
        keep_first(&mut first, self.handler.on_batch_started(batch));
        for n in batch {
            keep_first(&mut first, self.dispatch(cx, n));
        }
        keep_first(&mut first, self.handler.on_batch_finished(batch));
        first.map_or(Ok(()), Err)
    }
}

fn keep_first(first: &mut Option<ListenerError>, result: Callback) {
    if let Err(e) = result {
        first.get_or_insert(e);
    }
}

fn each_object(value: &Value, mut f: impl FnMut(&ElementId) -> Callback) -> Callback {
    let mut first = None;
    for id in value.objects() {
        keep_first(&mut first, f(id));
    }
    first.map_or(Ok(()), Err)
}

fn for_items(value: &Value, mut f: impl FnMut(&Value) -> Callback) -> Callback {
    let mut first = None;
    for item in value.as_list() {
        keep_first(&mut first, f(item));
    }
    first.map_or(Ok(()), Err)
}
