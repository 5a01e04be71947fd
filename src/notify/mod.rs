//! Change notifications and their delivery.
//!
//! ```text
//! ModelState::apply ──► Notification ──► EventBroker::publish
//!                                             │  (Filter per listener)
//!                                             ▼
//!                                   Listener / Demultiplexer ──► DemuxHandler
//! ```

mod broker;
mod demux;
mod filter;
mod notification;

pub use broker::{DispatchContext, DispatchError, EventBroker, Listener, ListenerError, ModelLookup};
pub use demux::{DemuxHandler, Demultiplexer};
pub use filter::{Filter, NotifierType, WatchSet};
pub use notification::{ChangeOrigin, EventKind, Feature, Notification, Notifier, NotifierKey};
