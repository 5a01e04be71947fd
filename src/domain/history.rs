//! Undo, redo and flushing of recorded intervals.

use super::actions::interval_notifications;
use super::{Completion, DomainError, EditingDomain, RunOptions};
use crate::base::IntervalId;
use crate::model::Change;
use crate::notify::ChangeOrigin;
use crate::undo::UndoError;
use tracing::debug;

#[derive(Clone, Copy, Debug)]
enum Direction {
    Undo,
    Redo,
}

/// Snapshot of one retained interval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntervalInfo {
    pub id: IntervalId,
    pub label: String,
    pub description: String,
    pub changes: usize,
    pub undone: bool,
    pub undoable: bool,
    pub redoable: bool,
}

impl EditingDomain {
    /// Undo `interval` and every interval closed after it, newest first.
    pub fn undo(&self, interval: IntervalId) -> Result<Completion, DomainError> {
        self.travel(interval, Direction::Undo)
    }

    /// Redo `interval` and every undone interval before it, oldest first.
    pub fn redo(&self, interval: IntervalId) -> Result<Completion, DomainError> {
        self.travel(interval, Direction::Redo)
    }

    fn travel(&self, interval: IntervalId, direction: Direction) -> Result<Completion, DomainError> {
        if self.inner.actions.can_read() {
            return Err(DomainError::illegal("cannot undo or redo inside an action"));
        }
        let batches: Vec<Vec<Change>> = {
            let history = self.inner.history.lock();
            if history.is_open() {
                return Err(UndoError::IntervalOpen.into());
            }
            let plan = match direction {
                Direction::Undo => history.plan_undo(interval)?,
                Direction::Redo => history.plan_redo(interval)?,
            };
            plan.into_iter().map(|i| i.changes().to_vec()).collect()
        };

        let (label, origin) = match direction {
            Direction::Undo => ("undo", ChangeOrigin::Undo),
            Direction::Redo => ("redo", ChangeOrigin::Redo),
        };
        self.begin_unchecked(label, RunOptions::UNVALIDATED | RunOptions::NO_SEM_PROCS)?;
        self.inner.tx.lock().origin = origin;

        let applied = self
            .mutate(|state, rec| {
                for changes in &batches {
                    match direction {
                        Direction::Undo => state.revert(rec, changes)?,
                        Direction::Redo => state.replay(rec, changes)?,
                    }
                }
                Ok(())
            })
            .and_then(|()| {
                let mut history = self.inner.history.lock();
                match direction {
                    Direction::Undo => history.mark_undone(interval),
                    Direction::Redo => history.mark_redone(interval),
                }
                .map_err(DomainError::from)
            });
        if let Err(e) = applied {
            let _ = self.inner.actions.abandon();
            let _ = self.complete();
            return Err(e);
        }
        debug!(%interval, ?direction, intervals = batches.len(), "travelled history");
        self.complete()
    }

    pub fn can_undo(&self, interval: IntervalId) -> bool {
        self.inner.history.lock().can_undo(interval)
    }

    pub fn can_redo(&self, interval: IntervalId) -> bool {
        self.inner.history.lock().can_redo(interval)
    }

    pub fn set_can_undo(&self, interval: IntervalId, undoable: bool) -> Result<(), DomainError> {
        self.inner.history.lock().set_can_undo(interval, undoable)?;
        Ok(())
    }

    pub fn set_can_redo(&self, interval: IntervalId, redoable: bool) -> Result<(), DomainError> {
        self.inner.history.lock().set_can_redo(interval, redoable)?;
        Ok(())
    }

    /// Most recent interval that has not been undone.
    pub fn last_undoable(&self) -> Option<IntervalId> {
        self.inner.history.lock().last_done()
    }

    /// Oldest undone interval.
    pub fn first_redoable(&self) -> Option<IntervalId> {
        self.inner.history.lock().first_undone()
    }

    /// Retained intervals, oldest first.
    pub fn intervals(&self) -> Vec<IntervalInfo> {
        let history = self.inner.history.lock();
        history
            .intervals()
            .map(|i| IntervalInfo {
                id: i.id(),
                label: i.label().to_string(),
                description: i.description().to_string(),
                changes: i.len(),
                undone: history.is_undone(i.id()),
                undoable: i.is_undoable(),
                redoable: i.is_redoable(),
            })
            .collect()
    }

    /// Drop `interval` and every older interval.
    pub fn flush(&self, interval: IntervalId) -> Result<(), DomainError> {
        let flushed = self.inner.history.lock().flush(interval)?;
        self.publish(interval_notifications(None, &flushed))?;
        Ok(())
    }

    pub fn flush_all(&self) -> Result<(), DomainError> {
        let flushed = self.inner.history.lock().flush_all();
        self.publish(interval_notifications(None, &flushed))?;
        Ok(())
    }

    // ── Explicit intervals ──────────────────────────────────────────

    /// Open an interval that collects every write action until it is closed.
    pub fn open_undo_interval(&self, label: &str, description: &str) -> Result<IntervalId, DomainError> {
        if self.inner.actions.can_write() {
            return Err(DomainError::illegal("cannot open an undo interval inside a write action"));
        }
        Ok(self.inner.history.lock().open(label, description)?)
    }

    /// Close the explicit interval. `None` if nothing was recorded in it.
    pub fn close_undo_interval(&self) -> Result<Option<IntervalId>, DomainError> {
        if self.inner.actions.can_write() {
            return Err(DomainError::illegal("cannot close an undo interval inside a write action"));
        }
        let closed = self.inner.history.lock().close()?;
        let Some(closed) = closed else {
            return Ok(None);
        };
        self.publish(interval_notifications(Some(closed.interval), &closed.flushed))?;
        Ok(Some(closed.interval))
    }

    pub fn is_undo_interval_open(&self) -> bool {
        self.inner.history.lock().is_open()
    }

    /// Run `work` with an explicit interval around it, so every write
    /// action it performs is undone as one.
    pub fn run_in_undo_interval<T, E>(
        &self,
        label: &str,
        work: impl FnOnce(&EditingDomain) -> Result<T, E>,
    ) -> Result<(T, Option<IntervalId>), E>
    where
        E: From<DomainError>,
    {
        self.open_undo_interval(label, "")?;
        let result = work(self);
        let closed = self.close_undo_interval();
        let value = result?;
        Ok((value, closed?))
    }

    /// Whether this thread's changes would be recorded right now.
    pub fn is_recording(&self) -> bool {
        self.inner.actions.is_recording()
    }
}
