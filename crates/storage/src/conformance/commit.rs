//! Atomic commit conformance tests.
//!
//! An item mutation and the ledger entry describing it must become visible
//! together, and multi-item snapshots are all-or-nothing.

use std::future::Future;

use super::{at, make_item, make_tracking, seed_item, stage_status, TestResult};
use crate::record::WasteStatus;
use crate::TrackingStorage;

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "commit",
        "item_and_ledger_visible_after_commit",
        item_and_ledger_visible_after_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "insert_then_update_in_one_snapshot",
        insert_then_update_in_one_snapshot(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "multi_item_updates_all_visible_after_commit",
        multi_item_updates_all_visible_after_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "multi_item_updates_none_visible_after_abort",
        multi_item_updates_none_visible_after_abort(factory).await,
    ));

    results
}

/// Registration shape: insert + first ledger entry in one snapshot.
async fn item_and_ledger_visible_after_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_item(&mut snap, make_item("WM1", 1, WasteStatus::NotCollected))
        .await
        .map_err(|e| e.to_string())?;
    s.append_tracking(&mut snap, make_tracking("WM1", WasteStatus::NotCollected, at(0)))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    s.get_item("WM1").await.map_err(|e| e.to_string())?;
    let latest = s
        .latest_tracking("WM1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("ledger entry missing after commit")?;
    if latest.status != WasteStatus::NotCollected {
        return Err(format!("unexpected ledger status {}", latest.status));
    }
    Ok(())
}

async fn insert_then_update_in_one_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_item(&mut snap, make_item("WM1", 1, WasteStatus::NotCollected))
        .await
        .map_err(|e| e.to_string())?;
    let v = stage_status(&s, &mut snap, "WM1", WasteStatus::PendingCollection)
        .await
        .map_err(|e| e.to_string())?;
    if v != 1 {
        return Err(format!("expected staged version 1, got {v}"));
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s.get_item("WM1").await.map_err(|e| e.to_string())?;
    if rec.status != WasteStatus::PendingCollection || rec.version != 1 {
        return Err(format!(
            "expected pending_collection at version 1, got {} at {}",
            rec.status, rec.version
        ));
    }
    Ok(())
}

async fn multi_item_updates_all_visible_after_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;
    seed_item(&s, make_item("WM2", 1, WasteStatus::PendingCollection)).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    for id in ["WM1", "WM2"] {
        stage_status(&s, &mut snap, id, WasteStatus::Collected)
            .await
            .map_err(|e| e.to_string())?;
        s.append_tracking(&mut snap, make_tracking(id, WasteStatus::Collected, at(30)))
            .await
            .map_err(|e| e.to_string())?;
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    for id in ["WM1", "WM2"] {
        let rec = s.get_item(id).await.map_err(|e| e.to_string())?;
        if rec.status != WasteStatus::Collected {
            return Err(format!("{id}: expected collected, got {}", rec.status));
        }
        let history = s.tracking_history(id).await.map_err(|e| e.to_string())?;
        if history.len() != 1 {
            return Err(format!("{id}: expected 1 ledger entry, got {}", history.len()));
        }
    }
    Ok(())
}

async fn multi_item_updates_none_visible_after_abort<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;
    seed_item(&s, make_item("WM2", 1, WasteStatus::PendingCollection)).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    for id in ["WM1", "WM2"] {
        stage_status(&s, &mut snap, id, WasteStatus::Collected)
            .await
            .map_err(|e| e.to_string())?;
    }
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    for id in ["WM1", "WM2"] {
        let rec = s.get_item(id).await.map_err(|e| e.to_string())?;
        if rec.status != WasteStatus::PendingCollection || rec.version != 0 {
            return Err(format!(
                "{id}: aborted update visible ({} at version {})",
                rec.status, rec.version
            ));
        }
    }
    Ok(())
}
