//! Integration tests for scoped actions, undo history and validation.
//!
//! These tests exercise the full pipeline:
//!   write action → changes recorded → interval closed → batch published
//!   undo / redo → graph restored → notifications tagged with their origin

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

mod fixture;

use fixture::{Batches, Journal, MODEL_URI, fixture, fixture_with};
use rstest::rstest;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use txmodel::domain::{DomainConfig, DomainError, EditingDomain, RunOptions, ValidationMessage, ValidationStatus};
use txmodel::model::ModelState;
use txmodel::notify::{Demultiplexer, EventKind, Filter, Notification, Notifier};

// ── Undo / redo ─────────────────────────────────────────────────────

#[test]
fn undo_then_redo_restores_created_child() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);

    let batches = Arc::new(Batches::default());
    f.domain.add_listener(Some(Filter::Wildcard), batches.clone());

    let outcome = f
        .domain
        .run_as_write("add child", |d| {
            let x = d.create_with_id(f.node, "x")?;
            d.add(&tree.root, f.children, &x)?;
            Ok::<_, DomainError>(x)
        })
        .unwrap();
    let x = outcome.value;
    let interval = outcome.completion.interval.expect("write should close an interval");

    let add = batches
        .all()
        .into_iter()
        .find(|n| n.kind() == EventKind::Add)
        .expect("adding a child should raise Add");
    assert_eq!(add.notifier().as_object(), Some(&tree.root));
    assert_eq!(add.new_value().as_object(), Some(&x));

    let after_write = f.domain.snapshot();
    f.domain.undo(interval).unwrap();
    assert!(
        !f.children_of(&tree.root).contains(&x),
        "undo should remove the child"
    );
    assert!(!f.domain.contains(&x));

    f.domain.redo(interval).unwrap();
    assert!(f.children_of(&tree.root).contains(&x));
    assert_eq!(f.domain.snapshot(), after_write, "redo should reproduce the graph");
}

#[test]
fn undo_notifications_carry_origin() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    let outcome = f
        .domain
        .run_as_write("rename", |d| d.set(&tree.a, f.name, "renamed"))
        .unwrap();
    let interval = outcome.completion.interval.unwrap();

    let batches = Arc::new(Batches::default());
    f.domain.add_listener(Some(Filter::kind(EventKind::Set)), batches.clone());
    f.domain.undo(interval).unwrap();
    f.domain.redo(interval).unwrap();

    let seen = batches.all();
    assert!(seen.iter().any(Notification::is_undo_notification));
    assert!(seen.iter().any(Notification::is_redo_notification));
    assert_eq!(f.domain.get(&tree.a, f.name).unwrap().as_str(), Some("renamed"));
}

#[test]
fn undo_inside_action_is_rejected() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    let interval = f
        .domain
        .run_as_write("rename", |d| d.set(&tree.a, f.name, "x"))
        .unwrap()
        .completion
        .interval
        .unwrap();

    let result = f.domain.run_as_read(|d| d.undo(interval)).unwrap();
    assert!(matches!(result, Err(DomainError::IllegalState(_))));
}

#[test]
fn silent_write_publishes_nothing() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    let batches = Arc::new(Batches::default());
    f.domain.add_listener(Some(Filter::Wildcard), batches.clone());

    f.domain.run_silent("quiet", |d| d.set(&tree.a, f.name, "q")).unwrap();
    assert!(
        batches
            .all()
            .iter()
            .all(|n| n.notifier().as_object().is_none()),
        "no object notification should be published"
    );
}

#[test]
fn unchecked_write_is_not_undoable() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    let before = f.domain.intervals().len();

    let outcome = f
        .domain
        .run_as_unchecked("bookkeeping", |d| d.set(&tree.a, f.name, "u"))
        .unwrap();
    assert!(outcome.completion.interval.is_none());
    assert_eq!(f.domain.intervals().len(), before);
}

// ── Abandon and validation ──────────────────────────────────────────

#[test]
fn error_in_write_rolls_back_everything() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    let before = f.domain.snapshot();

    let result = f.domain.run_as_write("fails", |d| {
        d.set(&tree.a, f.name, "changed")?;
        d.remove(&tree.root, f.children, &tree.b)?;
        Err::<(), _>(DomainError::illegal("give up"))
    });
    assert!(result.is_err());
    assert_eq!(f.domain.snapshot(), before, "abandoned write must leave the graph untouched");
}

#[test]
fn abandon_twice_equals_abandon_once() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    let before = f.domain.snapshot();

    let outcome = f
        .domain
        .run_as_write("abandoned", |d| {
            d.set(&tree.a, f.name, "gone")?;
            d.abandon()?;
            d.abandon()?;
            Ok::<_, DomainError>(())
        })
        .unwrap();
    assert!(outcome.completion.abandoned);
    assert!(outcome.completion.interval.is_none());
    assert_eq!(f.domain.snapshot(), before);
}

#[test]
fn validation_error_abandons_action() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    let name = f.name;
    f.domain
        .add_validator(Arc::new(move |state: &ModelState, batch: &[Notification]| {
            let mut status = ValidationStatus::ok();
            for n in batch {
                let Notifier::Object { id, .. } = n.notifier() else {
                    continue;
                };
                let empty = state
                    .object(id)
                    .is_some_and(|o| o.get(name).as_str() == Some(""));
                if empty {
                    status.push(ValidationMessage::error("name must not be empty").on(id));
                }
            }
            status
        }));
    let before = f.domain.snapshot();

    let result = f.domain.run_as_write("blank name", |d| d.set(&tree.a, f.name, ""));
    match result {
        Err(DomainError::ActionAbandoned(status)) => {
            assert!(status.is_error());
            assert_eq!(status.errors().count(), 1);
        }
        other => panic!("expected ActionAbandoned, got {other:?}"),
    }
    assert_eq!(f.domain.snapshot(), before);

    f.domain
        .run_unvalidated("blank name, unchecked", |d| d.set(&tree.a, f.name, ""))
        .unwrap();
    assert_eq!(f.domain.get(&tree.a, f.name).unwrap().as_str(), Some(""));
}

#[test]
fn semantic_procedure_joins_the_action() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let (b, name) = (tree.b.clone(), f.name);
    f.domain
        .add_semantic_procedure(Arc::new(move |d: &EditingDomain, _batch: &[Notification]| {
            counter.fetch_add(1, Ordering::SeqCst);
            d.set(&b, name, "derived")
        }));

    let outcome = f
        .domain
        .run_as_write("trigger", |d| d.set(&tree.a, f.name, "source"))
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(f.domain.get(&tree.b, f.name).unwrap().as_str(), Some("derived"));

    f.domain.undo(outcome.completion.interval.unwrap()).unwrap();
    assert_eq!(
        f.domain.get(&tree.b, f.name).unwrap().as_str(),
        Some("beta"),
        "derived change belongs to the same interval"
    );

    f.domain
        .run_with_no_sem_procs("skip", |d| d.set(&tree.a, f.name, "again"))
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

// ── Exclusivity ─────────────────────────────────────────────────────

#[test]
fn write_requires_write_action() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    assert!(matches!(
        f.domain.set(&tree.a, f.name, "x"),
        Err(DomainError::IllegalState(_))
    ));
    let in_read = f.domain.run_as_read(|d| d.set(&tree.a, f.name, "x")).unwrap();
    assert!(matches!(in_read, Err(DomainError::IllegalState(_))));
}

#[test]
fn second_writer_is_refused_while_first_is_open() {
    let f = fixture();
    let domain = f.domain.clone();
    let (opened_tx, opened_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let writer = thread::spawn(move || {
        domain
            .run_as_write("long write", |_| {
                opened_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                Ok::<_, DomainError>(())
            })
            .unwrap();
    });

    opened_rx.recv().unwrap();
    let refused = f.domain.run_as_write("second", |_| Ok::<_, DomainError>(()));
    assert!(matches!(refused, Err(DomainError::IllegalState(_))));
    let read_refused = f.domain.begin_read("reader");
    assert!(read_refused.is_err(), "readers wait out a foreign writer");

    release_tx.send(()).unwrap();
    writer.join().unwrap();
    f.domain.run_as_write("now free", |_| Ok::<_, DomainError>(())).unwrap();
}

#[test]
fn unframed_queries_see_open_writes_but_read_actions_do_not() {
    let f = fixture();
    let domain = f.domain.clone();
    let node = f.node;
    let (opened_tx, opened_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let writer = thread::spawn(move || {
        domain
            .run_as_write("pending", |d| {
                let pending = d.create_with_id(node, "pending")?;
                opened_tx.send(pending).unwrap();
                release_rx.recv().unwrap();
                d.abandon()
            })
            .unwrap();
    });

    let pending = opened_rx.recv().unwrap();
    assert!(!f.domain.can_read());
    assert!(f.domain.contains(&pending), "plain queries read through open writes");
    let framed = f.domain.run_as_read(|d| d.contains(&pending));
    assert!(matches!(framed, Err(DomainError::IllegalState(_))));

    release_tx.send(()).unwrap();
    writer.join().unwrap();
    assert!(!f.domain.contains(&pending));
    assert!(!f.domain.run_as_read(|d| d.contains(&pending)).unwrap());
}

#[test]
fn readers_share_and_yielding_writer_waits() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    let (reading_tx, reading_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let domain = f.domain.clone();
    let reader = thread::spawn(move || {
        domain
            .run_as_read(|_| {
                reading_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
            .unwrap();
    });
    reading_rx.recv().unwrap();

    f.domain.run_as_read(|d| assert!(d.can_read())).unwrap();
    assert!(f.domain.run_as_write("blocked", |_| Ok::<_, DomainError>(())).is_err());

    let releaser = thread::spawn(move || {
        thread::sleep(std::time::Duration::from_millis(20));
        release_tx.send(()).unwrap();
    });
    f.domain
        .yield_for_reads("after readers", |d| d.set(&tree.a, f.name, "written"))
        .unwrap();
    reader.join().unwrap();
    releaser.join().unwrap();
    assert_eq!(f.domain.get(&tree.a, f.name).unwrap().as_str(), Some("written"));
}

#[test]
fn nested_write_piggybacks_on_outer_interval() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    let outcome = f
        .domain
        .run_as_write("outer", |d| {
            d.set(&tree.a, f.name, "outer")?;
            let inner = d.run_as_write("inner", |d| d.set(&tree.b, f.name, "inner"))?;
            assert!(inner.completion.interval.is_none(), "inner write closes no interval");
            Ok::<_, DomainError>(())
        })
        .unwrap();
    let interval = outcome.completion.interval.unwrap();
    f.domain.undo(interval).unwrap();
    assert_eq!(f.domain.get(&tree.a, f.name).unwrap().as_str(), Some("alpha"));
    assert_eq!(f.domain.get(&tree.b, f.name).unwrap().as_str(), Some("beta"));
}

// ── History ─────────────────────────────────────────────────────────

#[rstest]
#[case(0)]
#[case(2)]
#[case(4)]
fn flush_drops_older_intervals_only(#[case] flush_at: usize) {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    let intervals: Vec<_> = (0..5)
        .map(|i| {
            f.domain
                .run_as_write("step", |d| d.set(&tree.a, f.name, format!("v{i}")))
                .unwrap()
                .completion
                .interval
                .unwrap()
        })
        .collect();

    f.domain.flush(intervals[flush_at]).unwrap();
    for (i, id) in intervals.iter().enumerate() {
        if i <= flush_at {
            assert!(!f.domain.can_undo(*id), "interval {i} should be flushed");
            assert!(!f.domain.can_redo(*id));
        } else {
            assert!(f.domain.can_undo(*id), "interval {i} should survive the flush");
        }
    }
}

#[test]
fn retention_flushes_oldest_intervals() {
    let f = fixture_with(DomainConfig::default().with_max_undo_depth(Some(3)).with_flush_count(2));
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    let journal = Arc::new(Demultiplexer::new(f.domain.schema().clone(), Journal::default()));
    f.domain.add_listener(Some(Filter::demuxable()), journal.clone());

    for i in 0..3 {
        f.domain
            .run_as_write("step", |d| d.set(&tree.a, f.name, format!("v{i}")))
            .unwrap();
    }
    assert!(f.domain.intervals().len() <= 3);
    let entries = journal.handler().entries();
    assert!(entries.iter().any(|e| e.starts_with("closed")));
    assert!(
        entries.iter().any(|e| e.starts_with("flushed")),
        "exceeding the depth should flush: {entries:?}"
    );
}

#[test]
fn explicit_interval_spans_several_writes() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);

    let ((), interval) = f
        .domain
        .run_in_undo_interval("rename both", |d| {
            d.run_as_write("first", |d| d.set(&tree.a, f.name, "A"))?;
            d.run_as_write("second", |d| d.set(&tree.b, f.name, "B"))?;
            Ok::<_, DomainError>(())
        })
        .unwrap();
    let interval = interval.expect("non-empty interval");
    assert!(!f.domain.is_undo_interval_open());

    f.domain.undo(interval).unwrap();
    assert_eq!(f.domain.get(&tree.a, f.name).unwrap().as_str(), Some("alpha"));
    assert_eq!(f.domain.get(&tree.b, f.name).unwrap().as_str(), Some("beta"));
}

#[test]
fn set_can_undo_blocks_undo() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    let interval = f
        .domain
        .run_as_write("rename", |d| d.set(&tree.a, f.name, "x"))
        .unwrap()
        .completion
        .interval
        .unwrap();

    f.domain.set_can_undo(interval, false).unwrap();
    assert!(matches!(f.domain.undo(interval), Err(DomainError::NotUndoable(_))));
    f.domain.set_can_undo(interval, true).unwrap();
    f.domain.undo(interval).unwrap();
    assert!(f.domain.can_redo(interval));
}

#[test]
fn new_write_discards_redo_branch() {
    let f = fixture();
    let res = f.resource(MODEL_URI);
    let tree = f.tree(res);
    let first = f
        .domain
        .run_as_write("first", |d| d.set(&tree.a, f.name, "1"))
        .unwrap()
        .completion
        .interval
        .unwrap();
    f.domain.undo(first).unwrap();
    f.domain
        .run_as_write("second", |d| d.set(&tree.a, f.name, "2"))
        .unwrap();
    assert!(!f.domain.can_redo(first), "undone interval is flushed by a new write");
}

#[test]
fn run_options_are_reported_by_progress_queries() {
    let f = fixture();
    assert!(!f.domain.can_read());
    f.domain
        .run_with_options("opts", RunOptions::UNVALIDATED, |d| {
            assert!(d.can_write());
            assert!(d.is_write_in_progress());
            assert!(!d.is_unchecked_in_progress());
            Ok::<_, DomainError>(())
        })
        .unwrap();
    f.domain
        .run_as_unchecked("unchecked", |d| {
            assert!(d.is_unchecked_in_progress());
            Ok::<_, DomainError>(())
        })
        .unwrap();
}
