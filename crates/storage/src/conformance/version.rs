//! Version validation / OCC conformance tests.

use std::future::Future;

use super::{make_item, seed_item, stage_status, TestResult};
use crate::record::WasteStatus;
use crate::{StorageError, TrackingStorage};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "version",
        "sequential_updates_increment_version",
        sequential_updates_increment_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "update_with_wrong_version_returns_conflict",
        update_with_wrong_version_returns_conflict(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "conflict_has_correct_fields",
        conflict_has_correct_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "conflict_does_not_change_item",
        conflict_does_not_change_item(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "two_snapshots_race_one_wins",
        two_snapshots_race_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "version_per_item_independent",
        version_per_item_independent(factory).await,
    ));

    results
}

/// Three committed updates must yield versions 0 -> 1 -> 2 -> 3.
async fn sequential_updates_increment_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;

    let steps = [
        WasteStatus::Collected,
        WasteStatus::InTransit,
        WasteStatus::Processed,
    ];
    for (i, status) in steps.into_iter().enumerate() {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        let v = stage_status(&s, &mut snap, "WM1", status)
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
        if v != i as i64 + 1 {
            return Err(format!("step {i}: expected version {}, got {v}", i + 1));
        }
    }

    let rec = s.get_item("WM1").await.map_err(|e| e.to_string())?;
    if rec.version != 3 || rec.status != WasteStatus::Processed {
        return Err(format!(
            "expected processed at version 3, got {} at {}",
            rec.status, rec.version
        ));
    }
    Ok(())
}

async fn update_with_wrong_version_returns_conflict<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;

    for wrong in [999, -1, 1] {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        let result = s
            .update_item(&mut snap, wrong, make_item("WM1", 1, WasteStatus::Collected))
            .await;
        let _ = s.abort_snapshot(snap).await;
        match result {
            Err(StorageError::ConcurrentConflict { .. }) => {}
            other => {
                return Err(format!(
                    "expected ConcurrentConflict for version {wrong}, got {other:?}"
                ))
            }
        }
    }
    Ok(())
}

async fn conflict_has_correct_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .update_item(&mut snap, 5, make_item("WM1", 1, WasteStatus::Collected))
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::ConcurrentConflict {
            item_id,
            expected_version,
        }) => {
            if item_id != "WM1" || expected_version != 5 {
                return Err(format!(
                    "conflict carried ({item_id}, {expected_version}), expected (WM1, 5)"
                ));
            }
            Ok(())
        }
        other => Err(format!("expected ConcurrentConflict, got {other:?}")),
    }
}

async fn conflict_does_not_change_item<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let _ = s
        .update_item(&mut snap, 3, make_item("WM1", 1, WasteStatus::Disposed))
        .await;
    let _ = s.abort_snapshot(snap).await;

    let rec = s.get_item("WM1").await.map_err(|e| e.to_string())?;
    if rec.status != WasteStatus::PendingCollection || rec.version != 0 {
        return Err(format!(
            "conflicting update changed item: {} at {}",
            rec.status, rec.version
        ));
    }
    Ok(())
}

/// Two snapshots both read v0, snap1 commits (v1), snap2 update(v0) must conflict.
async fn two_snapshots_race_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;

    let mut snap1 = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let rec1 = s
        .get_item_for_update(&mut snap1, "WM1")
        .await
        .map_err(|e| e.to_string())?;
    let mut snap2 = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let rec2 = s
        .get_item_for_update(&mut snap2, "WM1")
        .await
        .map_err(|e| e.to_string())?;
    if rec1.version != 0 || rec2.version != 0 {
        let _ = s.abort_snapshot(snap1).await;
        let _ = s.abort_snapshot(snap2).await;
        return Err("both snapshots should read version 0".to_string());
    }

    let mut winner = rec1;
    winner.status = WasteStatus::Collected;
    s.update_item(&mut snap1, 0, winner)
        .await
        .map_err(|e| format!("snap1 update failed: {e}"))?;
    s.commit_snapshot(snap1).await.map_err(|e| e.to_string())?;

    let mut loser = rec2;
    loser.status = WasteStatus::Disposed;
    let result = match s.update_item(&mut snap2, 0, loser).await {
        Ok(_) => s.commit_snapshot(snap2).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap2).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        other => return Err(format!("expected ConcurrentConflict, got {other:?}")),
    }

    let rec = s.get_item("WM1").await.map_err(|e| e.to_string())?;
    if rec.status != WasteStatus::Collected {
        return Err(format!("expected winner's status, got {}", rec.status));
    }
    Ok(())
}

async fn version_per_item_independent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::PendingCollection)).await?;
    seed_item(&s, make_item("WM2", 1, WasteStatus::PendingCollection)).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    stage_status(&s, &mut snap, "WM1", WasteStatus::Collected)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let other = s.get_item("WM2").await.map_err(|e| e.to_string())?;
    if other.version != 0 {
        return Err(format!("WM2 version changed to {}", other.version));
    }
    Ok(())
}
