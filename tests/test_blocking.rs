mod common;

use std::panic::{AssertUnwindSafe, catch_unwind};

use common::{AppError, FakeDriver, people};
use pg_access::prelude::*;

fn blocking_db(capacity: usize) -> BlockingDatabase<FakeDriver> {
    let bridge = SyncBridge::with_worker_threads(2).unwrap();
    BlockingDatabase::new(Database::new(FakeDriver::with_capacity(capacity)), bridge)
}

#[test]
fn query_entries_blocks_until_rows_arrive() {
    let db = blocking_db(2);
    let state = db.database().driver().state.clone();
    state.respond("SELECT id, name FROM t WHERE id = $1", people());

    let rows = db
        .query_entries("SELECT id, name FROM t WHERE id = ?", &[7.into()])
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name").and_then(RowValues::as_text), Some("alice"));
    assert_eq!(state.released(), 1);
}

#[test]
fn statement_errors_come_back_unmodified() {
    let db = blocking_db(2);
    db.database().driver().state.fail_when("bad", "bad statement");

    let err = db.execute("bad", &[]).unwrap_err();

    assert!(matches!(err, AccessError::Execution(msg) if msg == "bad statement"));
}

#[test]
fn query_and_execute_count_share_the_execute_path() {
    let db = blocking_db(2);
    let state = db.database().driver().state.clone();

    db.query("DELETE FROM t WHERE id = ?", &[1.into()]).unwrap();
    assert_eq!(db.execute_count("DELETE FROM t WHERE id = ?", &[2.into()]).unwrap(), 1);
    assert_eq!(db.query_array("SELECT 1", &[]).unwrap(), Vec::<Vec<RowValues>>::new());

    assert_eq!(
        state.statements(),
        [
            "DELETE FROM t WHERE id = $1",
            "DELETE FROM t WHERE id = $1",
            "SELECT 1"
        ]
    );
}

#[test]
fn transaction_commits_on_one_connection() {
    let db = blocking_db(2);
    let state = db.database().driver().state.clone();

    let value = db
        .transaction(|tx| {
            tx.execute("INSERT INTO t (id) VALUES (?)", &[1.into()])?;
            tx.execute("INSERT INTO t (id) VALUES (?)", &[2.into()])?;
            Ok::<_, AccessError>(2)
        })
        .unwrap();

    assert_eq!(value, 2);
    let log = state.log();
    assert_eq!(
        log.iter().map(|l| l.sql.as_str()).collect::<Vec<_>>(),
        [
            "BEGIN",
            "INSERT INTO t (id) VALUES ($1)",
            "INSERT INTO t (id) VALUES ($1)",
            "COMMIT"
        ]
    );
    assert!(log.iter().all(|l| l.conn == log[0].conn));
    assert_eq!(state.released(), 1);
}

#[test]
fn transaction_error_rolls_back_and_returns_the_callback_error() {
    let db = blocking_db(2);
    let state = db.database().driver().state.clone();
    state.fail_when("ROLLBACK", "rollback failed too");

    let err = db
        .transaction(|tx| {
            tx.execute("INSERT INTO t (id) VALUES (1)", &[])?;
            Err::<(), _>(AppError::Validation("nope".into()))
        })
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(msg) if msg == "nope"));
    assert_eq!(
        state.statements(),
        ["BEGIN", "INSERT INTO t (id) VALUES (1)", "ROLLBACK"]
    );
    assert_eq!(state.abandoned(), 1);
    assert_eq!(state.released(), 1);
}

#[test]
fn nested_blocking_transaction_is_rejected() {
    let db = blocking_db(2);
    let state = db.database().driver().state.clone();

    let err = db
        .transaction(|tx| {
            tx.transaction(|_inner| Ok::<_, AccessError>(()))?;
            Ok::<_, AccessError>(())
        })
        .unwrap_err();

    assert!(matches!(err, AccessError::NestedTransaction));
    assert_eq!(state.statements(), ["BEGIN", "ROLLBACK"]);
}

#[test]
fn panicking_callback_abandons_the_transaction() {
    let db = blocking_db(2);
    let state = db.database().driver().state.clone();

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        db.transaction(|tx| -> Result<(), AccessError> {
            tx.execute("UPDATE t SET n = 1", &[])?;
            panic!("callback panicked");
        })
    }));

    assert!(outcome.is_err());
    assert_eq!(state.abandoned(), 1);
    assert_eq!(state.released(), 1);

    // The facade is still usable afterwards.
    db.execute("SELECT 1", &[]).unwrap();
    assert_eq!(state.released(), 2);
}

#[test]
fn calls_from_bridge_workers_are_rejected() {
    let db = std::sync::Arc::new(blocking_db(2));
    let inner = std::sync::Arc::clone(&db);

    let nested = db
        .bridge()
        .run_synchronously(async move { Ok::<_, AccessError>(inner.execute("SELECT 1", &[])) })
        .unwrap();

    assert!(matches!(nested, Err(AccessError::Bridge(_))));
}

#[tokio::test]
async fn blocking_database_can_be_dropped_inside_async_code() {
    let db = blocking_db(1);
    let state = db.database().driver().state.clone();
    drop(db);
    assert_eq!(state.borrowed(), 0);
}
