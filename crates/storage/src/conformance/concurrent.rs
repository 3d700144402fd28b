use std::future::Future;
use std::sync::Arc;

use super::{at, make_item, make_tracking, seed_item, TestResult};
use crate::record::WasteStatus;
use crate::{StorageError, TrackingStorage};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_transitions_exactly_one_wins",
        concurrent_transitions_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_insert_exactly_one_wins",
        concurrent_insert_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_updates_different_items_all_succeed",
        concurrent_updates_different_items_all_succeed(factory).await,
    ));

    results
}

// ── Concurrent transition: exactly one wins ─────────────────────────────────

/// N tasks each read the same item at version 0, stage a status change plus
/// a ledger entry, and commit. Exactly one commit succeeds and exactly one
/// ledger entry survives; losers see ConcurrentConflict at staging or commit.
async fn concurrent_transitions_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed_item(&*storage, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let mut rec = match s.get_item_for_update(&mut snap, "WM1").await {
                Ok(rec) => rec,
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    return Err(e);
                }
            };
            rec.status = WasteStatus::Collected;
            let staged = match s.update_item(&mut snap, 0, rec).await {
                Ok(_) => {
                    let mut entry = make_tracking("WM1", WasteStatus::Collected, at(i as i64));
                    entry.updated_by = Some(100 + i as i64);
                    s.append_tracking(&mut snap, entry).await.map(|_| ())
                }
                Err(e) => Err(e),
            };
            let result = match staged {
                Ok(()) => s.commit_snapshot(snap).await,
                Err(e) => {
                    s.abort_snapshot(snap).await?;
                    Err(e)
                }
            };
            match result {
                Ok(()) => Ok(true),
                Err(StorageError::ConcurrentConflict { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }

    let history = storage
        .tracking_history("WM1")
        .await
        .map_err(|e| e.to_string())?;
    if history.len() != 1 {
        return Err(format!(
            "expected exactly 1 ledger entry, got {}",
            history.len()
        ));
    }
    let item = storage.get_item("WM1").await.map_err(|e| e.to_string())?;
    if item.version != 1 || item.status != WasteStatus::Collected {
        return Err(format!(
            "expected collected at version 1, got {} at {}",
            item.status, item.version
        ));
    }

    Ok(())
}

// ── Concurrent insert: exactly one wins ─────────────────────────────────────

/// N tasks each register an item under the same identifier. Exactly one
/// succeeds; the rest must get ItemAlreadyExists.
async fn concurrent_insert_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for _i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let result = match s
                .insert_item(&mut snap, make_item("WM1", 1, WasteStatus::NotCollected))
                .await
            {
                Ok(()) => s.commit_snapshot(snap).await,
                Err(e) => {
                    s.abort_snapshot(snap).await?;
                    Err(e)
                }
            };
            match result {
                Ok(()) => Ok(true),
                Err(StorageError::ItemAlreadyExists { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}

// ── Concurrent updates to different items: all succeed ──────────────────────

/// N tasks each update a different item. No false conflicts when there is
/// no contention.
async fn concurrent_updates_different_items_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    for i in 0..N {
        seed_item(
            &*storage,
            make_item(&format!("WM{i}"), 1, WasteStatus::PendingCollection),
        )
        .await?;
    }

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let item_id = format!("WM{i}");
            let mut snap = s.begin_snapshot().await?;
            let staged = async {
                let mut rec = s.get_item_for_update(&mut snap, &item_id).await?;
                rec.status = WasteStatus::Collected;
                s.update_item(&mut snap, 0, rec).await?;
                s.append_tracking(
                    &mut snap,
                    make_tracking(&item_id, WasteStatus::Collected, at(0)),
                )
                .await
                .map(|_| ())
            }
            .await;
            match staged {
                Ok(()) => s.commit_snapshot(snap).await,
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("unexpected failure: {e}"))?;
    }

    for i in 0..N {
        let item = storage
            .get_item(&format!("WM{i}"))
            .await
            .map_err(|e| e.to_string())?;
        if item.version != 1 {
            return Err(format!("WM{i}: expected version 1, got {}", item.version));
        }
    }
    Ok(())
}
