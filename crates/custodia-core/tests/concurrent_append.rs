//! Concurrency: racing appenders must serialize on the tail constraint, and
//! retrying losers must converge to one unbroken chain.

use std::sync::Barrier;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use custodia_core::canonical::Value;
use custodia_core::identity::{StaticIdentity, SystemClock};
use custodia_core::ledger::{
    AppendError, Ledger, LedgerKind, LedgerStore, SqliteLedgerStore, StoreError,
};

fn ledger_for(
    path: &std::path::Path,
    actor: &str,
) -> Ledger<SqliteLedgerStore, StaticIdentity, SystemClock> {
    // Generous busy timeout so racing writers block instead of erroring.
    let store = SqliteLedgerStore::open_with_busy_timeout(path, Duration::from_secs(30))
        .expect("open");
    Ledger::new(store, StaticIdentity::new(actor), SystemClock)
}

#[test]
fn two_appenders_from_the_same_tail_yield_one_winner() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger.db");
    // Both connections observe an empty chain before either writes.
    let barrier = Barrier::new(2);
    let conflicts = AtomicU32::new(0);

    let barrier = &barrier;
    let conflicts = &conflicts;
    let path = &path;
    thread::scope(|s| {
        for actor in ["analyst-1", "analyst-2"] {
            s.spawn(move || {
                let ledger = ledger_for(path, actor);
                barrier.wait();
                match ledger.record_activity("case-1", "Case Opened", Value::empty_map()) {
                    Ok(_) => {},
                    Err(AppendError::Store(StoreError::ConcurrentWriteConflict { .. })) => {
                        conflicts.fetch_add(1, Ordering::SeqCst);
                    },
                    Err(other) => panic!("unexpected error: {other}"),
                }
            });
        }
    });

    let ledger = ledger_for(&path, "auditor");
    let chain = ledger
        .store()
        .list_chain(LedgerKind::ActivityLog, "case-1")
        .expect("list");
    // The loser either hit the constraint or re-read the winner's tail in
    // time; in no interleaving may both genesis entries land.
    assert_eq!(chain.len() as u32 + conflicts.load(Ordering::SeqCst), 2);
    assert!(ledger
        .verify_activity_chain("case-1")
        .expect("verify")
        .is_valid());
}

#[test]
fn retrying_losers_converge_to_one_unbroken_chain() {
    const WRITERS: usize = 4;
    const APPENDS_PER_WRITER: usize = 5;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger.db");
    // Create the database before the writers race over it.
    drop(ledger_for(&path, "setup"));

    thread::scope(|s| {
        for w in 0..WRITERS {
            let path = &path;
            s.spawn(move || {
                let actor = format!("analyst-{w}");
                let ledger = ledger_for(path, &actor);
                for i in 0..APPENDS_PER_WRITER {
                    let details = Value::map([
                        ("writer", Value::int(w as i64)),
                        ("attempt", Value::int(i as i64)),
                    ]);
                    loop {
                        match ledger.record_activity("case-1", "Note Added", details.clone()) {
                            Ok(_) => break,
                            Err(err) if err.is_retryable() => {
                                thread::sleep(Duration::from_millis(2));
                            },
                            Err(other) => panic!("unexpected error: {other}"),
                        }
                    }
                }
            });
        }
    });

    let ledger = ledger_for(&path, "auditor");
    let chain = ledger
        .store()
        .list_chain(LedgerKind::ActivityLog, "case-1")
        .expect("list");
    assert_eq!(chain.len(), WRITERS * APPENDS_PER_WRITER);

    // Every append landed exactly once, in one linked line.
    for pair in chain.windows(2) {
        assert_eq!(pair[1].hash_prev, pair[0].hash_current);
    }
    assert!(ledger
        .verify_activity_chain("case-1")
        .expect("verify")
        .is_valid());
}

#[test]
fn concurrent_chains_in_different_scopes_do_not_contend() {
    const WRITERS: usize = 4;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger.db");
    drop(ledger_for(&path, "setup"));

    thread::scope(|s| {
        for w in 0..WRITERS {
            let path = &path;
            s.spawn(move || {
                let actor = format!("analyst-{w}");
                let case_id = format!("case-{w}");
                let ledger = ledger_for(path, &actor);
                for _ in 0..5 {
                    loop {
                        match ledger.record_activity(&case_id, "Note Added", Value::empty_map())
                        {
                            Ok(_) => break,
                            // Writer-lock contention, not a tail race: the
                            // scopes are disjoint.
                            Err(err) if err.is_retryable() => {
                                thread::sleep(Duration::from_millis(2));
                            },
                            Err(other) => panic!("unexpected error: {other}"),
                        }
                    }
                }
            });
        }
    });

    let ledger = ledger_for(&path, "auditor");
    for w in 0..WRITERS {
        let case_id = format!("case-{w}");
        let chain = ledger
            .store()
            .list_chain(LedgerKind::ActivityLog, &case_id)
            .expect("list");
        assert_eq!(chain.len(), 5);
        assert!(ledger
            .verify_activity_chain(&case_id)
            .expect("verify")
            .is_valid());
    }
}
