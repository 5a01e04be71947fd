//! Linear undo history.
//!
//! Closed intervals are kept in closing order. A frontier index splits them
//! into a done prefix and an undone suffix:
//!
//! ```text
//!   intervals:  [ I1  I2  I3 | I4  I5 ]
//!                  done       ^ undone
//!                          frontier
//! ```
//!
//! Undo and redo always move the frontier over a contiguous run, so an
//! interval is only ever undone together with everything closed after it.

use super::interval::{UndoError, UndoInterval};
use crate::base::IntervalId;
use crate::model::Change;
use std::collections::VecDeque;
use std::ops::Range;
use tracing::{debug, warn};

/// Default maximum number of retained intervals.
pub const DEFAULT_MAX_UNDO: usize = 100;

/// Default number of intervals dropped when the maximum is exceeded.
pub const DEFAULT_FLUSH_COUNT: usize = 10;

/// Result of closing a non-empty interval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Closed {
    pub interval: IntervalId,
    /// Intervals dropped to make room: undone ones and the oldest past the limit.
    pub flushed: Vec<IntervalId>,
}

#[derive(Debug)]
pub struct UndoStack {
    intervals: VecDeque<UndoInterval>,
    frontier: usize,
    open: Option<UndoInterval>,
    next_id: u64,
    max_depth: Option<usize>,
    flush_count: usize,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(Some(DEFAULT_MAX_UNDO), DEFAULT_FLUSH_COUNT)
    }
}

impl UndoStack {
    pub fn new(max_depth: Option<usize>, flush_count: usize) -> Self {
        Self {
            intervals: VecDeque::new(),
            frontier: 0,
            open: None,
            next_id: 1,
            max_depth,
            flush_count: flush_count.max(1),
        }
    }

    // ── Recording ───────────────────────────────────────────────────

    pub fn open(&mut self, label: &str, description: &str) -> Result<IntervalId, UndoError> {
        if self.open.is_some() {
            return Err(UndoError::IntervalOpen);
        }
        let id = IntervalId(self.next_id);
        self.next_id += 1;
        self.open = Some(UndoInterval::new(id, label, description));
        Ok(id)
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn open_interval(&self) -> Option<&UndoInterval> {
        self.open.as_ref()
    }

    pub fn record(&mut self, changes: impl IntoIterator<Item = Change>) -> Result<(), UndoError> {
        let open = self.open.as_mut().ok_or(UndoError::NoOpenInterval)?;
        open.changes.extend(changes);
        Ok(())
    }

    /// Close the open interval. Empty intervals are dropped and yield `None`.
    pub fn close(&mut self) -> Result<Option<Closed>, UndoError> {
        let interval = self.open.take().ok_or(UndoError::NoOpenInterval)?;
        if interval.is_empty() {
            return Ok(None);
        }
        let id = interval.id();
        let mut flushed: Vec<IntervalId> = self
            .intervals
            .drain(self.frontier..)
            .map(|i| i.id())
            .collect();
        self.intervals.push_back(interval);
        self.frontier = self.intervals.len();
        debug!(%id, changes = self.intervals.back().map_or(0, UndoInterval::len), "closed undo interval");

        if let Some(max) = self.max_depth {
            if self.intervals.len() > max {
                let count = self.flush_count.min(self.intervals.len() - 1);
                warn!(max, count, "undo history full; flushing oldest intervals");
                flushed.extend(self.drain_prefix(count));
            }
        }
        Ok(Some(Closed { interval: id, flushed }))
    }

    /// Drop the open interval without keeping it.
    pub fn discard_open(&mut self) -> Option<UndoInterval> {
        self.open.take()
    }

    // ── Undo / redo ─────────────────────────────────────────────────

    /// Intervals that undoing `id` reverts, newest first.
    pub fn plan_undo(&self, id: IntervalId) -> Result<Vec<&UndoInterval>, UndoError> {
        let range = self.undo_range(id)?;
        Ok(self.intervals.range(range).rev().collect())
    }

    /// Intervals that redoing `id` replays, oldest first.
    pub fn plan_redo(&self, id: IntervalId) -> Result<Vec<&UndoInterval>, UndoError> {
        let range = self.redo_range(id)?;
        Ok(self.intervals.range(range).collect())
    }

    pub fn mark_undone(&mut self, id: IntervalId) -> Result<(), UndoError> {
        let range = self.undo_range(id)?;
        self.frontier = range.start;
        Ok(())
    }

    pub fn mark_redone(&mut self, id: IntervalId) -> Result<(), UndoError> {
        let range = self.redo_range(id)?;
        self.frontier = range.end;
        Ok(())
    }

    pub fn can_undo(&self, id: IntervalId) -> bool {
        self.undo_range(id).is_ok()
    }

    pub fn can_redo(&self, id: IntervalId) -> bool {
        self.redo_range(id).is_ok()
    }

    pub fn set_can_undo(&mut self, id: IntervalId, undoable: bool) -> Result<(), UndoError> {
        let idx = self.index_of(id)?;
        if let Some(interval) = self.intervals.get_mut(idx) {
            interval.undoable = undoable;
        }
        Ok(())
    }

    pub fn set_can_redo(&mut self, id: IntervalId, redoable: bool) -> Result<(), UndoError> {
        let idx = self.index_of(id)?;
        if let Some(interval) = self.intervals.get_mut(idx) {
            interval.redoable = redoable;
        }
        Ok(())
    }

    /// The interval has been undone and not redone.
    pub fn is_undone(&self, id: IntervalId) -> bool {
        self.index_of(id).is_ok_and(|idx| idx >= self.frontier)
    }

    /// Most recent interval that is still done.
    pub fn last_done(&self) -> Option<IntervalId> {
        self.frontier
            .checked_sub(1)
            .and_then(|idx| self.intervals.get(idx))
            .map(UndoInterval::id)
    }

    /// Oldest undone interval.
    pub fn first_undone(&self) -> Option<IntervalId> {
        self.intervals.get(self.frontier).map(UndoInterval::id)
    }

    // ── Flushing ────────────────────────────────────────────────────

    /// Drop `id` and every interval closed before it. Returns the dropped ids.
    pub fn flush(&mut self, id: IntervalId) -> Result<Vec<IntervalId>, UndoError> {
        let idx = self.index_of(id)?;
        let flushed = self.drain_prefix(idx + 1);
        debug!(%id, count = flushed.len(), "flushed undo intervals");
        Ok(flushed)
    }

    pub fn flush_all(&mut self) -> Vec<IntervalId> {
        let flushed = self.drain_prefix(self.intervals.len());
        debug!(count = flushed.len(), "flushed undo history");
        flushed
    }

    // ── Query ───────────────────────────────────────────────────────

    pub fn get(&self, id: IntervalId) -> Option<&UndoInterval> {
        self.intervals.iter().find(|i| i.id() == id)
    }

    /// Closed intervals, oldest first.
    pub fn intervals(&self) -> impl Iterator<Item = &UndoInterval> {
        self.intervals.iter()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn index_of(&self, id: IntervalId) -> Result<usize, UndoError> {
        self.intervals
            .iter()
            .position(|i| i.id() == id)
            .ok_or(UndoError::IntervalNotFound(id))
    }

    fn undo_range(&self, id: IntervalId) -> Result<Range<usize>, UndoError> {
        let idx = self.index_of(id)?;
        let range = idx..self.frontier;
        if range.is_empty() || self.intervals.range(range.clone()).any(|i| !i.undoable) {
            return Err(UndoError::NotUndoable(id));
        }
        Ok(range)
    }

    fn redo_range(&self, id: IntervalId) -> Result<Range<usize>, UndoError> {
        let idx = self.index_of(id)?;
        let range = self.frontier..idx + 1;
        if range.is_empty() || self.intervals.range(range.clone()).any(|i| !i.redoable) {
            return Err(UndoError::NotRedoable(id));
        }
        Ok(range)
    }

    fn drain_prefix(&mut self, count: usize) -> Vec<IntervalId> {
        let count = count.min(self.intervals.len());
        self.frontier = self.frontier.saturating_sub(count);
        self.intervals.drain(..count).map(|i| i.id()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::ElementId;
    use crate::model::{ClassId, ModelObject};

    fn change(name: &str) -> Change {
        Change::Create {
            object: ModelObject::new(ElementId::new(name), ClassId(0)),
        }
    }

    fn closed(stack: &mut UndoStack, name: &str) -> IntervalId {
        stack.open(name, "").unwrap();
        stack.record([change(name)]).unwrap();
        stack.close().unwrap().unwrap().interval
    }

    #[test]
    fn test_empty_interval_is_not_kept() {
        let mut stack = UndoStack::default();
        stack.open("nothing", "").unwrap();
        assert_eq!(stack.close().unwrap(), None);
        assert!(stack.is_empty());
        assert_eq!(stack.close(), Err(UndoError::NoOpenInterval));
    }

    #[test]
    fn test_only_one_open_interval() {
        let mut stack = UndoStack::default();
        stack.open("a", "").unwrap();
        assert_eq!(stack.open("b", ""), Err(UndoError::IntervalOpen));
    }

    #[test]
    fn test_undo_covers_newer_intervals() {
        let mut stack = UndoStack::default();
        let a = closed(&mut stack, "a");
        let b = closed(&mut stack, "b");
        let c = closed(&mut stack, "c");

        let plan: Vec<_> = stack.plan_undo(b).unwrap().iter().map(|i| i.id()).collect();
        assert_eq!(plan, vec![c, b]);
        stack.mark_undone(b).unwrap();
        assert!(stack.is_undone(c));
        assert!(!stack.can_undo(c));
        assert!(stack.can_undo(a));

        let plan: Vec<_> = stack.plan_redo(c).unwrap().iter().map(|i| i.id()).collect();
        assert_eq!(plan, vec![b, c]);
    }

    #[test]
    fn test_not_undoable_blocks_older_undo() {
        let mut stack = UndoStack::default();
        let a = closed(&mut stack, "a");
        let b = closed(&mut stack, "b");
        stack.set_can_undo(b, false).unwrap();
        assert_eq!(stack.plan_undo(a).unwrap_err(), UndoError::NotUndoable(a));
        assert!(!stack.can_undo(b));
    }

    #[test]
    fn test_close_discards_undone() {
        let mut stack = UndoStack::default();
        let a = closed(&mut stack, "a");
        let b = closed(&mut stack, "b");
        stack.mark_undone(b).unwrap();
        stack.open("c", "").unwrap();
        stack.record([change("c")]).unwrap();
        let result = stack.close().unwrap().unwrap();
        assert_eq!(result.flushed, vec![b]);
        assert!(stack.get(b).is_none());
        assert!(stack.can_undo(a));
    }

    #[test]
    fn test_flush_keeps_newer() {
        let mut stack = UndoStack::default();
        let a = closed(&mut stack, "a");
        let b = closed(&mut stack, "b");
        let c = closed(&mut stack, "c");
        assert_eq!(stack.flush(b).unwrap(), vec![a, b]);
        assert!(!stack.can_undo(a) && !stack.can_undo(b));
        assert!(stack.can_undo(c));
    }

    #[test]
    fn test_retention_flushes_oldest() {
        let mut stack = UndoStack::new(Some(3), 2);
        let ids: Vec<_> = (0..3).map(|i| closed(&mut stack, &i.to_string())).collect();
        stack.open("overflow", "").unwrap();
        stack.record([change("overflow")]).unwrap();
        let result = stack.close().unwrap().unwrap();
        assert_eq!(result.flushed, ids[..2].to_vec());
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.last_done(), Some(result.interval));
    }
}
