//! Nesting and exclusion of actions.
//!
//! Every thread has its own stack of frames. Any number of threads may hold
//! read frames at once; one thread at a time may hold write or unchecked
//! frames, and only while no other thread holds any frame.
//!
//! ```text
//!            begin_read ┌────────┐ complete
//!      ┌───────────────►│  Read  │────────────┐
//!      │                └────────┘            ▼
//!   ┌──────┐ begin_write ┌────────┐ complete ┌──────┐
//!   │ Idle │────────────►│ Write  │─────────►│ Idle │
//!   └──────┘             └────────┘          └──────┘
//!      │  yield_for_reads    ▲  (blocks until foreign reads finish)
//!      └─────────────────────┘
//! ```

use crate::base::RunOptions;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use std::thread::ThreadId;
use thiserror::Error;
use tracing::trace;

/// Misuse of the action protocol.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("illegal state: {message}")]
    IllegalState { message: String },
}

impl ActionError {
    pub fn illegal(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Read,
    Write,
    Unchecked,
}

impl ActionKind {
    /// Write and unchecked actions exclude every other thread.
    pub fn is_exclusive(self) -> bool {
        !matches!(self, ActionKind::Read)
    }
}

/// Transaction log lengths when a frame was opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Checkpoint {
    pub changes: usize,
    pub notifications: usize,
    pub dirtied: usize,
}

/// One open action.
#[derive(Clone, Debug)]
pub struct Frame {
    kind: ActionKind,
    abandoned: bool,
    label: SmolStr,
    options: RunOptions,
    checkpoint: Checkpoint,
}

impl Frame {
    pub fn new(kind: ActionKind, label: &str, options: RunOptions, checkpoint: Checkpoint) -> Self {
        Self {
            kind,
            abandoned: false,
            label: SmolStr::new(label),
            options,
            checkpoint,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn options(&self) -> RunOptions {
        self.options
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }
}

/// A frame removed by [`ActionStack::complete`].
#[derive(Clone, Debug)]
pub struct Popped {
    pub frame: Frame,
    /// The frame was the last exclusive frame of its thread.
    pub outermost_exclusive: bool,
    /// The thread has no frames left.
    pub outermost: bool,
}

#[derive(Debug, Default)]
struct Inner {
    frames: FxHashMap<ThreadId, Vec<Frame>>,
    writer: Option<ThreadId>,
    /// A thread waiting in `yield_for_reads`; new readers must wait too.
    reserved: Option<ThreadId>,
}

impl Inner {
    fn own(&self, me: ThreadId) -> &[Frame] {
        self.frames.get(&me).map(Vec::as_slice).unwrap_or(&[])
    }

    fn others_active(&self, me: ThreadId) -> bool {
        self.frames
            .iter()
            .any(|(thread, frames)| *thread != me && !frames.is_empty())
    }

    fn holds_exclusive(&self, me: ThreadId) -> bool {
        self.own(me).iter().any(|f| f.kind.is_exclusive())
    }

    fn push(&mut self, me: ThreadId, frame: Frame) {
        trace!(kind = ?frame.kind, label = %frame.label, "begin action");
        if frame.kind.is_exclusive() {
            self.writer = Some(me);
        }
        self.frames.entry(me).or_default().push(frame);
    }
}

/// Per-thread action frames with single-writer/many-reader exclusion.
#[derive(Debug, Default)]
pub struct ActionStack {
    inner: Mutex<Inner>,
    released: Condvar,
}

impl ActionStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame on the calling thread. Never blocks.
    pub fn begin(&self, frame: Frame) -> Result<(), ActionError> {
        let me = std::thread::current().id();
        let mut inner = self.inner.lock();
        match frame.kind {
            ActionKind::Read => {
                if inner.writer.is_some_and(|w| w != me) {
                    return Err(ActionError::illegal("another thread is writing"));
                }
                if inner.reserved.is_some_and(|r| r != me) {
                    return Err(ActionError::illegal("another thread is waiting to write"));
                }
            }
            ActionKind::Write | ActionKind::Unchecked => {
                if !inner.holds_exclusive(me) {
                    if !inner.own(me).is_empty() {
                        return Err(ActionError::illegal(
                            "read action in progress; use yield_for_reads to upgrade",
                        ));
                    }
                    if inner.writer.is_some_and(|w| w != me) {
                        return Err(ActionError::illegal("another thread is writing"));
                    }
                    if inner.others_active(me) || inner.reserved.is_some_and(|r| r != me) {
                        return Err(ActionError::illegal("other threads hold actions"));
                    }
                }
            }
        }
        inner.push(me, frame);
        Ok(())
    }

    /// Open a write frame, waiting for other threads' actions to finish.
    ///
    /// The caller must not hold read frames only: it would wait on itself.
    pub fn yield_for_reads(&self, frame: Frame) -> Result<(), ActionError> {
        let me = std::thread::current().id();
        let mut inner = self.inner.lock();
        if inner.holds_exclusive(me) {
            inner.push(me, frame);
            return Ok(());
        }
        if !inner.own(me).is_empty() {
            return Err(ActionError::illegal("cannot yield while holding read actions"));
        }
        while inner.reserved.is_some_and(|r| r != me) {
            self.released.wait(&mut inner);
        }
        inner.reserved = Some(me);
        while inner.writer.is_some() || inner.others_active(me) {
            trace!("waiting for readers");
            self.released.wait(&mut inner);
        }
        inner.reserved = None;
        inner.push(me, frame);
        Ok(())
    }

    /// Pop the calling thread's top frame.
    pub fn complete(&self) -> Result<Popped, ActionError> {
        let me = std::thread::current().id();
        let mut inner = self.inner.lock();
        let frame = inner
            .frames
            .get_mut(&me)
            .and_then(Vec::pop)
            .ok_or_else(|| ActionError::illegal("no action in progress on this thread"))?;
        let outermost = inner.own(me).is_empty();
        if outermost {
            inner.frames.remove(&me);
        }
        let outermost_exclusive = frame.kind.is_exclusive() && !inner.holds_exclusive(me);
        if outermost_exclusive {
            inner.writer = None;
        }
        trace!(kind = ?frame.kind, label = %frame.label, outermost, "complete action");
        drop(inner);
        self.released.notify_all();
        Ok(Popped {
            frame,
            outermost_exclusive,
            outermost,
        })
    }

    /// Mark the calling thread's top frame abandoned. Idempotent.
    pub fn abandon(&self) -> Result<(), ActionError> {
        let me = std::thread::current().id();
        let mut inner = self.inner.lock();
        let frame = inner
            .frames
            .get_mut(&me)
            .and_then(|f| f.last_mut())
            .ok_or_else(|| ActionError::illegal("no action in progress on this thread"))?;
        frame.abandoned = true;
        Ok(())
    }

    /// The calling thread's top frame.
    pub fn top(&self) -> Option<Frame> {
        let me = std::thread::current().id();
        self.inner.lock().own(me).last().cloned()
    }

    /// True if the top frame is the only exclusive frame of the thread.
    pub fn is_outermost_exclusive(&self) -> bool {
        let me = std::thread::current().id();
        let inner = self.inner.lock();
        let own = inner.own(me);
        match own.last() {
            Some(top) if top.kind.is_exclusive() => {
                own.iter().filter(|f| f.kind.is_exclusive()).count() == 1
            }
            _ => false,
        }
    }

    pub fn depth(&self) -> usize {
        let me = std::thread::current().id();
        self.inner.lock().own(me).len()
    }

    /// The thread holds any frame.
    pub fn can_read(&self) -> bool {
        self.depth() > 0
    }

    /// The thread holds a write or unchecked frame.
    pub fn can_write(&self) -> bool {
        let me = std::thread::current().id();
        self.inner.lock().holds_exclusive(me)
    }

    /// Changes made now belong in an undo interval.
    pub fn is_recording(&self) -> bool {
        let me = std::thread::current().id();
        let inner = self.inner.lock();
        let own = inner.own(me);
        own.iter().any(|f| f.kind == ActionKind::Write)
            && !own.iter().any(|f| {
                f.kind == ActionKind::Unchecked || f.options.contains(RunOptions::UNCHECKED)
            })
    }

    pub fn is_write_in_progress(&self) -> bool {
        self.holds(ActionKind::Write)
    }

    pub fn is_unchecked_in_progress(&self) -> bool {
        self.holds(ActionKind::Unchecked)
    }

    /// Options accumulated over the thread's open frames.
    pub fn effective_options(&self) -> RunOptions {
        let me = std::thread::current().id();
        self.inner
            .lock()
            .own(me)
            .iter()
            .fold(RunOptions::empty(), |acc, f| acc | f.options)
    }

    /// Another thread currently writes.
    pub fn is_foreign_writer(&self) -> bool {
        let me = std::thread::current().id();
        self.inner.lock().writer.is_some_and(|w| w != me)
    }

    fn holds(&self, kind: ActionKind) -> bool {
        let me = std::thread::current().id();
        self.inner.lock().own(me).iter().any(|f| f.kind == kind)
    }
}
