//! Opening and completing actions.
//!
//! The `run_as_*` family wraps a closure in a frame and completes it on
//! every exit path: normal return, error return and unwinding. Returning
//! an error or calling [`ActionScope::abandon`] rolls back what the frame
//! changed.

use super::{EditingDomain, DomainError, RunOptions, ValidationStatus, clear_modified};
use crate::action::{ActionKind, Checkpoint, Frame};
use crate::base::{IntervalId, ResourceId};
use crate::model::{Change, Recorder};
use crate::notify::{ChangeOrigin, DispatchError, EventKind, Notification, Notifier};
use crate::undo::{Closed, UndoError, UndoStack};
use std::ops::Deref;
use tracing::{debug, trace, warn};

/// How a frame ended.
#[derive(Debug, Default)]
pub struct Completion {
    /// Undo interval closed by this completion.
    pub interval: Option<IntervalId>,
    /// Validator findings; never an error, those abandon the action.
    pub status: ValidationStatus,
    /// The frame's changes were rolled back.
    pub abandoned: bool,
    /// First listener failure while publishing the batch.
    pub dispatch_error: Option<DispatchError>,
}

/// Result of a completed write, unchecked or read action.
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub completion: Completion,
}

/// The domain as seen from inside an action.
pub struct ActionScope<'a> {
    domain: &'a EditingDomain,
}

impl ActionScope<'_> {
    /// Discard this action's changes when it completes.
    pub fn abandon(&self) -> Result<(), DomainError> {
        self.domain.inner.actions.abandon()?;
        Ok(())
    }

    pub fn domain(&self) -> &EditingDomain {
        self.domain
    }
}

impl Deref for ActionScope<'_> {
    type Target = EditingDomain;

    fn deref(&self) -> &EditingDomain {
        self.domain
    }
}

/// Completes the frame if the work unwinds.
struct FrameGuard<'a> {
    domain: &'a EditingDomain,
    armed: bool,
}

impl<'a> FrameGuard<'a> {
    fn new(domain: &'a EditingDomain) -> Self {
        Self { domain, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("action unwound; abandoning");
            let _ = self.domain.inner.actions.abandon();
            let _ = self.domain.complete();
        }
    }
}

enum Acquire {
    /// Fail if another thread holds frames.
    Try,
    /// Wait until other threads' frames are gone.
    Wait,
}

impl EditingDomain {
    // ── Explicit frames ─────────────────────────────────────────────

    pub fn begin_read(&self, label: &str) -> Result<(), DomainError> {
        self.open(ActionKind::Read, label, RunOptions::empty(), Acquire::Try)
    }

    pub fn begin_write(&self, label: &str, options: RunOptions) -> Result<(), DomainError> {
        self.open(ActionKind::Write, label, options, Acquire::Try)
    }

    pub fn begin_unchecked(&self, label: &str, options: RunOptions) -> Result<(), DomainError> {
        self.open(ActionKind::Unchecked, label, options, Acquire::Try)
    }

    /// Open a write frame, blocking until other threads' actions finish.
    pub fn begin_write_yielding(&self, label: &str, options: RunOptions) -> Result<(), DomainError> {
        self.open(ActionKind::Write, label, options, Acquire::Wait)
    }

    /// Mark the calling thread's innermost action abandoned.
    pub fn abandon(&self) -> Result<(), DomainError> {
        self.inner.actions.abandon()?;
        Ok(())
    }

    fn open(&self, kind: ActionKind, label: &str, options: RunOptions, acquire: Acquire) -> Result<(), DomainError> {
        let options = options | self.inner.config.default_run_options;
        // A thread's first exclusive frame always starts on an empty transaction.
        let checkpoint = if self.inner.actions.can_write() {
            self.checkpoint()
        } else {
            Checkpoint::default()
        };
        let frame = Frame::new(kind, label, options, checkpoint);
        match acquire {
            Acquire::Try => self.inner.actions.begin(frame)?,
            Acquire::Wait if kind.is_exclusive() => self.inner.actions.yield_for_reads(frame)?,
            Acquire::Wait => self.inner.actions.begin(frame)?,
        }
        Ok(())
    }

    fn checkpoint(&self) -> Checkpoint {
        let tx = self.inner.tx.lock();
        Checkpoint {
            changes: tx.changes.len(),
            notifications: tx.notifications.len(),
            dirtied: tx.dirtied.len(),
        }
    }

    /// Complete the calling thread's innermost action.
    ///
    /// Completing the outermost write runs semantic procedures and
    /// validators, records the undo interval and publishes the batch.
    /// Validation errors roll the action back and yield
    /// [`DomainError::ActionAbandoned`].
    pub fn complete(&self) -> Result<Completion, DomainError> {
        let actions = &self.inner.actions;
        let top = actions
            .top()
            .ok_or_else(|| DomainError::illegal("no action in progress on this thread"))?;

        let mut status = ValidationStatus::ok();
        let mut procedure_error = None;
        if top.kind() == ActionKind::Write && actions.is_outermost_exclusive() && !top.is_abandoned() {
            let options = actions.effective_options();
            if !options.contains(RunOptions::NO_SEM_PROCS) {
                if let Err(e) = self.run_procedures(top.checkpoint()) {
                    warn!(error = %e, "semantic procedure failed; abandoning");
                    actions.abandon()?;
                    procedure_error = Some(e);
                }
            }
            if procedure_error.is_none() && !options.contains(RunOptions::UNVALIDATED) {
                status = self.validate(top.checkpoint());
            }
        }

        let popped = actions.complete()?;
        let rejected = status.is_error();
        let abandoned = popped.frame.is_abandoned() || rejected;
        if abandoned {
            if rejected {
                warn!(label = popped.frame.label(), %status, "validation failed; rolling back");
            } else {
                debug!(label = popped.frame.label(), "rolling back abandoned action");
            }
            self.rollback(popped.frame.checkpoint());
        }

        let mut completion = Completion {
            status,
            abandoned,
            ..Completion::default()
        };
        if popped.outermost_exclusive {
            let (interval, batch) = self.finish_transaction(popped.frame.kind(), popped.frame.label());
            completion.interval = interval;
            completion.dispatch_error = self.publish(batch).err();
        }

        if let Some(e) = procedure_error {
            return Err(e);
        }
        if rejected {
            return Err(DomainError::ActionAbandoned(completion.status));
        }
        Ok(completion)
    }

    /// Undo everything recorded since `checkpoint`.
    fn rollback(&self, checkpoint: Checkpoint) {
        let (changes, dirtied) = {
            let mut tx = self.inner.tx.lock();
            let at = checkpoint.changes.min(tx.changes.len());
            let changes: Vec<Change> = tx.changes.drain(at..).map(|r| r.change).collect();
            tx.notifications.truncate(checkpoint.notifications);
            let at = checkpoint.dirtied.min(tx.dirtied.len());
            let dirtied: Vec<ResourceId> = tx.dirtied.drain(at..).collect();
            (changes, dirtied)
        };
        let mut state = self.inner.state.write();
        let mut scratch = Recorder::new(ChangeOrigin::Action);
        if let Err(e) = state.revert(&mut scratch, &changes) {
            warn!(error = %e, "rollback did not complete");
        }
        clear_modified(&mut state, &dirtied);
        trace!(changes = changes.len(), "rolled back");
    }

    fn batch_since(&self, checkpoint: Checkpoint) -> Vec<Notification> {
        let tx = self.inner.tx.lock();
        tx.notifications
            .get(checkpoint.notifications..)
            .map(<[Notification]>::to_vec)
            .unwrap_or_default()
    }

    fn run_procedures(&self, checkpoint: Checkpoint) -> Result<(), DomainError> {
        let procedures = self.inner.procedures.read().clone();
        if procedures.is_empty() {
            return Ok(());
        }
        let batch = self.batch_since(checkpoint);
        if batch.is_empty() {
            return Ok(());
        }
        for procedure in procedures {
            procedure.run(self, &batch)?;
        }
        Ok(())
    }

    fn validate(&self, checkpoint: Checkpoint) -> ValidationStatus {
        let validators = self.inner.validators.read().clone();
        let mut status = ValidationStatus::ok();
        if validators.is_empty() {
            return status;
        }
        let batch: Vec<Notification> = self
            .batch_since(checkpoint)
            .into_iter()
            .filter(Notification::is_object_notification)
            .collect();
        if batch.is_empty() {
            return status;
        }
        let state = self.inner.state.read();
        for validator in validators {
            status.extend(validator.validate(&state, &batch));
        }
        status
    }

    /// Empty the transaction: record its undoable changes and build the
    /// batch to publish.
    fn finish_transaction(&self, kind: ActionKind, label: &str) -> (Option<IntervalId>, Vec<Notification>) {
        let tx = std::mem::take(&mut *self.inner.tx.lock());
        let touched = !tx.changes.is_empty();
        let mut batch = tx.notifications;
        let changes: Vec<Change> = tx
            .changes
            .into_iter()
            .filter(|r| r.undoable)
            .map(|r| r.change)
            .collect();
        if touched {
            batch.extend(self.refresh_imports());
        }
        if kind != ActionKind::Write || changes.is_empty() {
            return (None, batch);
        }

        let mut history = self.inner.history.lock();
        let result = if history.is_open() {
            history.record(changes).map(|()| None)
        } else {
            record_interval(&mut history, label, changes)
        };
        drop(history);
        match result {
            Ok(Some(closed)) => {
                batch.extend(interval_notifications(Some(closed.interval), &closed.flushed));
                (Some(closed.interval), batch)
            }
            Ok(None) => (None, batch),
            Err(e) => {
                warn!(error = %e, "could not record undo interval");
                (None, batch)
            }
        }
    }

    // ── Scoped actions ──────────────────────────────────────────────

    /// Run `work` in a read action.
    pub fn run_as_read<T>(&self, work: impl FnOnce(&ActionScope<'_>) -> T) -> Result<T, DomainError> {
        self.begin_read("read")?;
        let guard = FrameGuard::new(self);
        let value = work(&ActionScope { domain: self });
        guard.disarm();
        self.complete()?;
        Ok(value)
    }

    pub fn run_as_write<T, E>(
        &self,
        label: &str,
        work: impl FnOnce(&ActionScope<'_>) -> Result<T, E>,
    ) -> Result<Outcome<T>, E>
    where
        E: From<DomainError>,
    {
        self.run_scoped(ActionKind::Write, label, RunOptions::empty(), Acquire::Try, work)
    }

    /// Run `work` in an unchecked action: writes are allowed but no undo
    /// interval is recorded and nothing is validated.
    pub fn run_as_unchecked<T, E>(
        &self,
        label: &str,
        work: impl FnOnce(&ActionScope<'_>) -> Result<T, E>,
    ) -> Result<Outcome<T>, E>
    where
        E: From<DomainError>,
    {
        self.run_scoped(ActionKind::Unchecked, label, RunOptions::empty(), Acquire::Try, work)
    }

    /// Run `work` in a write action with explicit options.
    pub fn run_with_options<T, E>(
        &self,
        label: &str,
        options: RunOptions,
        work: impl FnOnce(&ActionScope<'_>) -> Result<T, E>,
    ) -> Result<Outcome<T>, E>
    where
        E: From<DomainError>,
    {
        self.run_scoped(ActionKind::Write, label, options, Acquire::Try, work)
    }

    pub fn run_silent<T, E>(&self, label: &str, work: impl FnOnce(&ActionScope<'_>) -> Result<T, E>) -> Result<Outcome<T>, E>
    where
        E: From<DomainError>,
    {
        self.run_with_options(label, RunOptions::SILENT, work)
    }

    pub fn run_unvalidated<T, E>(&self, label: &str, work: impl FnOnce(&ActionScope<'_>) -> Result<T, E>) -> Result<Outcome<T>, E>
    where
        E: From<DomainError>,
    {
        self.run_with_options(label, RunOptions::UNVALIDATED, work)
    }

    pub fn run_with_no_sem_procs<T, E>(
        &self,
        label: &str,
        work: impl FnOnce(&ActionScope<'_>) -> Result<T, E>,
    ) -> Result<Outcome<T>, E>
    where
        E: From<DomainError>,
    {
        self.run_with_options(label, RunOptions::NO_SEM_PROCS, work)
    }

    /// Like [`run_as_write`](Self::run_as_write), but waits for other
    /// threads' read actions to finish instead of failing.
    pub fn yield_for_reads<T, E>(&self, label: &str, work: impl FnOnce(&ActionScope<'_>) -> Result<T, E>) -> Result<Outcome<T>, E>
    where
        E: From<DomainError>,
    {
        self.run_scoped(ActionKind::Write, label, RunOptions::empty(), Acquire::Wait, work)
    }

    fn run_scoped<T, E>(
        &self,
        kind: ActionKind,
        label: &str,
        options: RunOptions,
        acquire: Acquire,
        work: impl FnOnce(&ActionScope<'_>) -> Result<T, E>,
    ) -> Result<Outcome<T>, E>
    where
        E: From<DomainError>,
    {
        self.open(kind, label, options, acquire)?;
        let guard = FrameGuard::new(self);
        let result = work(&ActionScope { domain: self });
        guard.disarm();
        match result {
            Ok(value) => {
                let completion = self.complete()?;
                Ok(Outcome { value, completion })
            }
            Err(e) => {
                let _ = self.inner.actions.abandon();
                if let Err(complete_err) = self.complete() {
                    debug!(error = %complete_err, "completing failed action");
                }
                Err(e)
            }
        }
    }

    /// Internal exclusive frame for resource and history operations.
    pub(crate) fn unchecked<T>(&self, label: &str, work: impl FnOnce() -> Result<T, DomainError>) -> Result<T, DomainError> {
        self.open(
            ActionKind::Unchecked,
            label,
            RunOptions::UNVALIDATED | RunOptions::NO_SEM_PROCS,
            Acquire::Wait,
        )?;
        let guard = FrameGuard::new(self);
        let result = work();
        guard.disarm();
        if result.is_err() {
            let _ = self.inner.actions.abandon();
        }
        let completion = self.complete();
        let value = result?;
        completion?;
        Ok(value)
    }

    // ── Progress queries ────────────────────────────────────────────

    pub fn can_read(&self) -> bool {
        self.inner.actions.can_read()
    }

    pub fn can_write(&self) -> bool {
        self.inner.actions.can_write()
    }

    pub fn is_write_in_progress(&self) -> bool {
        self.inner.actions.is_write_in_progress()
    }

    pub fn is_unchecked_in_progress(&self) -> bool {
        self.inner.actions.is_unchecked_in_progress()
    }
}

fn record_interval(history: &mut UndoStack, label: &str, changes: Vec<Change>) -> Result<Option<Closed>, UndoError> {
    history.open(label, "")?;
    history.record(changes)?;
    history.close()
}

/// `Create` for a closed interval followed by `Destroy` for each flushed one.
pub(super) fn interval_notifications(closed: Option<IntervalId>, flushed: &[IntervalId]) -> Vec<Notification> {
    closed
        .map(|id| Notification::new(Notifier::UndoInterval(id), EventKind::Create))
        .into_iter()
        .chain(
            flushed
                .iter()
                .map(|id| Notification::new(Notifier::UndoInterval(*id), EventKind::Destroy)),
        )
        .collect()
}
