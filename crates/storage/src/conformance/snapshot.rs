//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! committed writes are visible, and aborted writes are discarded.

use std::future::Future;

use super::{at, make_item, make_tracking, seed_item, TestResult};
use crate::record::{ItemFilter, WasteStatus};
use crate::{StorageError, TrackingStorage};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_item_invisible_to_get",
        uncommitted_item_invisible_to_get(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_item_invisible_to_list",
        uncommitted_item_invisible_to_list(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "snapshot_reads_its_own_insert",
        snapshot_reads_its_own_insert(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_update_invisible",
        uncommitted_update_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "committed_update_visible",
        committed_update_visible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "abort_discards_insert",
        abort_discards_insert(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "abort_discards_update_and_ledger",
        abort_discards_update_and_ledger(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "dropped_snapshot_discards_writes",
        dropped_snapshot_discards_writes(factory).await,
    ));

    results
}

async fn uncommitted_item_invisible_to_get<S, F, Fut>(factory: &F) -> Result<(), String>
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

    let outside = s.get_item("WM1").await;
    let _ = s.abort_snapshot(snap).await;
    match outside {
        Err(StorageError::ItemNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected ItemNotFound, got {e}")),
        Ok(_) => Err("uncommitted item visible outside snapshot".to_string()),
    }
}

async fn uncommitted_item_invisible_to_list<S, F, Fut>(factory: &F) -> Result<(), String>
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

    let listed = s
        .list_items(&ItemFilter::default())
        .await
        .map_err(|e| e.to_string())?;
    let _ = s.abort_snapshot(snap).await;
    if !listed.is_empty() {
        return Err(format!("expected no items, got {}", listed.len()));
    }
    Ok(())
}

async fn snapshot_reads_its_own_insert<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let rec = s
        .get_item_for_update(&mut snap, "WM1")
        .await
        .map_err(|e| format!("own insert not visible: {e}"))?;
    let _ = s.abort_snapshot(snap).await;
    if rec.status != WasteStatus::NotCollected {
        return Err(format!("unexpected status {}", rec.status));
    }
    Ok(())
}

async fn uncommitted_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut rec = s
        .get_item_for_update(&mut snap, "WM1")
        .await
        .map_err(|e| e.to_string())?;
    rec.status = WasteStatus::Collected;
    s.update_item(&mut snap, 0, rec)
        .await
        .map_err(|e| e.to_string())?;

    let outside = s.get_item("WM1").await.map_err(|e| e.to_string())?;
    let _ = s.abort_snapshot(snap).await;
    if outside.status != WasteStatus::PendingCollection || outside.version != 0 {
        return Err(format!(
            "uncommitted update leaked: status {} version {}",
            outside.status, outside.version
        ));
    }
    Ok(())
}

async fn committed_update_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut rec = s
        .get_item_for_update(&mut snap, "WM1")
        .await
        .map_err(|e| e.to_string())?;
    rec.status = WasteStatus::Collected;
    s.update_item(&mut snap, 0, rec)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let after = s.get_item("WM1").await.map_err(|e| e.to_string())?;
    if after.status != WasteStatus::Collected || after.version != 1 {
        return Err(format!(
            "expected collected at version 1, got {} at {}",
            after.status, after.version
        ));
    }
    Ok(())
}

async fn abort_discards_insert<S, F, Fut>(factory: &F) -> Result<(), String>
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
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    match s.get_item("WM1").await {
        Err(StorageError::ItemNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected ItemNotFound, got {e}")),
        Ok(_) => Err("aborted insert is visible".to_string()),
    }
}

async fn abort_discards_update_and_ledger<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut rec = s
        .get_item_for_update(&mut snap, "WM1")
        .await
        .map_err(|e| e.to_string())?;
    rec.status = WasteStatus::Collected;
    s.update_item(&mut snap, 0, rec)
        .await
        .map_err(|e| e.to_string())?;
    s.append_tracking(&mut snap, make_tracking("WM1", WasteStatus::Collected, at(60)))
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let after = s.get_item("WM1").await.map_err(|e| e.to_string())?;
    if after.status != WasteStatus::PendingCollection {
        return Err(format!("aborted update visible: {}", after.status));
    }
    let history = s.tracking_history("WM1").await.map_err(|e| e.to_string())?;
    if !history.is_empty() {
        return Err(format!("aborted ledger entries visible: {}", history.len()));
    }
    Ok(())
}

async fn dropped_snapshot_discards_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.insert_item(&mut snap, make_item("WM1", 1, WasteStatus::NotCollected))
            .await
            .map_err(|e| e.to_string())?;
    }
    if s.get_item("WM1").await.is_ok() {
        return Err("dropped snapshot's insert is visible".to_string());
    }
    Ok(())
}
