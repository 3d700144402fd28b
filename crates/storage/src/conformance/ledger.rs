//! Ledger conformance tests.
//!
//! The tracking ledger is append-only: entries keep the fields they were
//! written with, history is returned in reverse commit order, and each item's
//! ledger is independent of every other item's.

use std::future::Future;

use super::{at, make_item, make_tracking, seed_item, TestResult};
use crate::record::WasteStatus;
use crate::{StorageError, TrackingStorage};

pub(super) async fn run_ledger_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "ledger",
        "append_assigns_increasing_ids",
        append_assigns_increasing_ids(factory).await,
    ));
    results.push(TestResult::from_result(
        "ledger",
        "history_most_recent_first",
        history_most_recent_first(factory).await,
    ));
    results.push(TestResult::from_result(
        "ledger",
        "same_timestamp_ordered_by_id",
        same_timestamp_ordered_by_id(factory).await,
    ));
    results.push(TestResult::from_result(
        "ledger",
        "history_follows_commit_order_not_timestamp",
        history_follows_commit_order_not_timestamp(factory).await,
    ));
    results.push(TestResult::from_result(
        "ledger",
        "latest_matches_history_head",
        latest_matches_history_head(factory).await,
    ));
    results.push(TestResult::from_result(
        "ledger",
        "latest_none_without_entries",
        latest_none_without_entries(factory).await,
    ));
    results.push(TestResult::from_result(
        "ledger",
        "history_unknown_item_not_found",
        history_unknown_item_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "ledger",
        "append_for_unknown_item_fails",
        append_for_unknown_item_fails(factory).await,
    ));
    results.push(TestResult::from_result(
        "ledger",
        "history_is_per_item",
        history_is_per_item(factory).await,
    ));
    results.push(TestResult::from_result(
        "ledger",
        "appended_fields_preserved",
        appended_fields_preserved(factory).await,
    ));

    results
}

/// Append entries in separate committed snapshots.
async fn append_committed<S: TrackingStorage>(
    s: &S,
    item_id: &str,
    entries: &[(WasteStatus, i64)],
) -> Result<(), String> {
    for (status, offset) in entries {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.append_tracking(&mut snap, make_tracking(item_id, *status, at(*offset)))
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    }
    Ok(())
}

async fn append_assigns_increasing_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let a = s
        .append_tracking(&mut snap, make_tracking("WM1", WasteStatus::Collected, at(1)))
        .await
        .map_err(|e| e.to_string())?;
    let b = s
        .append_tracking(&mut snap, make_tracking("WM1", WasteStatus::InTransit, at(2)))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if b.id <= a.id {
        return Err(format!("ids not increasing: {} then {}", a.id, b.id));
    }
    Ok(())
}

async fn history_most_recent_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;
    append_committed(
        &s,
        "WM1",
        &[
            (WasteStatus::PendingCollection, 0),
            (WasteStatus::Collected, 60),
            (WasteStatus::InTransit, 120),
        ],
    )
    .await?;

    let history = s.tracking_history("WM1").await.map_err(|e| e.to_string())?;
    let statuses: Vec<_> = history.iter().map(|r| r.status).collect();
    if statuses
        != [
            WasteStatus::InTransit,
            WasteStatus::Collected,
            WasteStatus::PendingCollection,
        ]
    {
        return Err(format!("unexpected history order: {statuses:?}"));
    }
    Ok(())
}

/// Entries written within the same second keep append order (newest first).
async fn same_timestamp_ordered_by_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;
    append_committed(
        &s,
        "WM1",
        &[(WasteStatus::Collected, 5), (WasteStatus::InTransit, 5)],
    )
    .await?;

    let history = s.tracking_history("WM1").await.map_err(|e| e.to_string())?;
    if history.len() != 2 || history[0].status != WasteStatus::InTransit {
        return Err(format!(
            "expected in_transit first, got {:?}",
            history.iter().map(|r| r.status).collect::<Vec<_>>()
        ));
    }
    Ok(())
}

/// A later commit stays at the head even when its timestamp is older.
async fn history_follows_commit_order_not_timestamp<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::Collected)).await?;
    append_committed(
        &s,
        "WM1",
        &[(WasteStatus::Processed, 120), (WasteStatus::InTransit, 60)],
    )
    .await?;

    let latest = s
        .latest_tracking("WM1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("no latest entry")?;
    if latest.status != WasteStatus::InTransit {
        return Err(format!("expected last commit at head, got {}", latest.status));
    }
    let history = s.tracking_history("WM1").await.map_err(|e| e.to_string())?;
    if history.first() != Some(&latest) {
        return Err("history head differs from latest".to_string());
    }
    Ok(())
}

async fn latest_matches_history_head<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;
    append_committed(
        &s,
        "WM1",
        &[(WasteStatus::PendingCollection, 0), (WasteStatus::Collected, 10)],
    )
    .await?;

    let history = s.tracking_history("WM1").await.map_err(|e| e.to_string())?;
    let latest = s.latest_tracking("WM1").await.map_err(|e| e.to_string())?;
    if latest.as_ref() != history.first() {
        return Err(format!("latest {latest:?} differs from head {:?}", history.first()));
    }
    Ok(())
}

async fn latest_none_without_entries<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;
    match s.latest_tracking("WM1").await {
        Ok(None) => Ok(()),
        other => Err(format!("expected Ok(None), got {other:?}")),
    }
}

async fn history_unknown_item_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.tracking_history("WM404").await {
        Err(StorageError::ItemNotFound { .. }) => Ok(()),
        other => Err(format!("expected ItemNotFound, got {other:?}")),
    }
}

async fn append_for_unknown_item_fails<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let appended = s
        .append_tracking(&mut snap, make_tracking("WM404", WasteStatus::Collected, at(0)))
        .await;
    let result = match appended {
        Ok(_) => s.commit_snapshot(snap).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::ItemNotFound { .. }) => Ok(()),
        other => Err(format!("expected ItemNotFound, got {other:?}")),
    }
}

async fn history_is_per_item<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;
    seed_item(&s, make_item("WM2", 1, WasteStatus::PendingCollection)).await?;
    append_committed(&s, "WM1", &[(WasteStatus::Collected, 0)]).await?;
    append_committed(
        &s,
        "WM2",
        &[(WasteStatus::Collected, 0), (WasteStatus::InTransit, 1)],
    )
    .await?;

    let one = s.tracking_history("WM1").await.map_err(|e| e.to_string())?;
    let two = s.tracking_history("WM2").await.map_err(|e| e.to_string())?;
    if one.len() != 1 || two.len() != 2 {
        return Err(format!("expected 1 and 2 entries, got {} and {}", one.len(), two.len()));
    }
    if one.iter().any(|r| r.item_id != "WM1") {
        return Err("WM1 history contains foreign entries".to_string());
    }
    Ok(())
}

async fn appended_fields_preserved<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;

    let mut entry = make_tracking("WM1", WasteStatus::Collected, at(90));
    entry.latitude = Some(13.4295);
    entry.longitude = Some(123.2532);
    entry.notes = Some("picked up [COORD_ISSUE: swapped]".to_string());
    entry.updated_by = Some(7);

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let written = s
        .append_tracking(&mut snap, entry.clone())
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    append_committed(&s, "WM1", &[(WasteStatus::InTransit, 120)]).await?;

    let history = s.tracking_history("WM1").await.map_err(|e| e.to_string())?;
    let stored = history
        .iter()
        .find(|r| r.id == written.id)
        .ok_or("written entry missing")?;
    if stored != &written
        || stored.latitude != entry.latitude
        || stored.notes != entry.notes
        || stored.updated_by != Some(7)
    {
        return Err(format!("entry changed after later append: {stored:?}"));
    }
    Ok(())
}
