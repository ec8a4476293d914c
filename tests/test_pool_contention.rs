mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::FakeDriver;
use pg_access::prelude::*;
use tokio::sync::Semaphore;

async fn wait_for(counter: &AtomicUsize, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while counter.load(Ordering::SeqCst) < expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("counter never reached the expected value");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn third_borrower_waits_for_a_release() {
    let db = Database::new(FakeDriver::with_capacity(2));
    let state = db.driver().state.clone();
    let entered = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));

    let mut tasks = Vec::new();
    for _ in 0..3 {
        let db = db.clone();
        let entered = Arc::clone(&entered);
        let gate = Arc::clone(&gate);
        tasks.push(tokio::spawn(async move {
            db.with_connection(move |_conn| {
                Box::pin(async move {
                    entered.fetch_add(1, Ordering::SeqCst);
                    gate.acquire()
                        .await
                        .map_err(|e| AccessError::Execution(e.to_string()))?
                        .forget();
                    Ok::<_, AccessError>(())
                })
            })
            .await
        }));
    }

    wait_for(&entered, 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(entered.load(Ordering::SeqCst), 2);
    assert_eq!(state.borrowed(), 2);

    gate.add_permits(1);
    wait_for(&entered, 3).await;
    assert_eq!(state.borrowed(), 3);

    gate.add_permits(2);
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(state.released(), 3);
}

#[tokio::test]
async fn waiting_borrower_gives_up_cleanly_when_cancelled() {
    let db = Database::new(FakeDriver::with_capacity(1));
    let state = db.driver().state.clone();

    let holder_db = db.clone();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let holder = tokio::spawn(async move {
        holder_db
            .with_connection(move |_conn| {
                Box::pin(async move {
                    let _ = release_rx.await;
                    Ok::<_, AccessError>(())
                })
            })
            .await
    });
    while state.borrowed() < 1 {
        tokio::task::yield_now().await;
    }

    let waiting = db.execute("SELECT 1", &[]);
    assert!(tokio::time::timeout(Duration::from_millis(20), waiting).await.is_err());

    release_tx.send(()).unwrap();
    holder.await.unwrap().unwrap();
    db.execute("SELECT 1", &[]).await.unwrap();

    assert_eq!(state.borrowed(), 2);
    assert_eq!(state.released(), 2);
}
