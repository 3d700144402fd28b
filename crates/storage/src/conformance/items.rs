use std::future::Future;

use super::{make_item, seed_item, TestResult};
use crate::record::{ItemFilter, WasteStatus};
use crate::{StorageError, TrackingStorage};

pub(super) async fn run_item_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "items",
        "insert_creates_item_at_version_0",
        insert_creates_item_at_version_0(factory).await,
    ));
    results.push(TestResult::from_result(
        "items",
        "inserted_fields_round_trip",
        inserted_fields_round_trip(factory).await,
    ));
    results.push(TestResult::from_result(
        "items",
        "duplicate_insert_returns_already_exists",
        duplicate_insert_returns_already_exists(factory).await,
    ));
    results.push(TestResult::from_result(
        "items",
        "duplicate_insert_within_one_snapshot",
        duplicate_insert_within_one_snapshot(factory).await,
    ));
    results.push(TestResult::from_result(
        "items",
        "get_item_nonexistent",
        get_item_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "items",
        "get_item_for_update_nonexistent",
        get_item_for_update_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "items",
        "update_item_nonexistent",
        update_item_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "items",
        "list_items_filters_by_barangay_and_status",
        list_items_filters_by_barangay_and_status(factory).await,
    ));
    results.push(TestResult::from_result(
        "items",
        "list_items_respects_limit",
        list_items_respects_limit(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// After insert + commit, the item version must be 0.
async fn insert_creates_item_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut item = make_item("WM1", 1, WasteStatus::NotCollected);
    item.version = 42;
    seed_item(&s, item).await?;

    let rec = s.get_item("WM1").await.map_err(|e| e.to_string())?;
    if rec.version != 0 {
        return Err(format!("expected version 0, got {}", rec.version));
    }
    Ok(())
}

async fn inserted_fields_round_trip<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let item = make_item("WM1", 3, WasteStatus::PendingCollection);
    seed_item(&s, item.clone()).await?;

    let rec = s.get_item("WM1").await.map_err(|e| e.to_string())?;
    if rec != item {
        return Err(format!("stored item differs: {rec:?} vs {item:?}"));
    }
    Ok(())
}

async fn duplicate_insert_returns_already_exists<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::NotCollected)).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let insert = s
        .insert_item(&mut snap, make_item("WM1", 1, WasteStatus::NotCollected))
        .await;
    // A backend may defer the uniqueness check to commit.
    let result = match insert {
        Ok(()) => s.commit_snapshot(snap).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::ItemAlreadyExists { item_id }) if item_id == "WM1" => Ok(()),
        Err(e) => Err(format!("expected ItemAlreadyExists(WM1), got {e}")),
        Ok(()) => Err("duplicate insert committed".to_string()),
    }
}

async fn duplicate_insert_within_one_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
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
    match s
        .insert_item(&mut snap, make_item("WM1", 1, WasteStatus::NotCollected))
        .await
    {
        Err(StorageError::ItemAlreadyExists { .. }) => Ok(()),
        Err(e) => Err(format!("expected ItemAlreadyExists, got {e}")),
        Ok(()) => Err("second insert in same snapshot succeeded".to_string()),
    }
}

async fn get_item_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_item("WM404").await {
        Err(StorageError::ItemNotFound { item_id }) if item_id == "WM404" => Ok(()),
        Err(e) => Err(format!("expected ItemNotFound(WM404), got {e}")),
        Ok(_) => Err("expected error for missing item".to_string()),
    }
}

async fn get_item_for_update_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.get_item_for_update(&mut snap, "WM404").await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::ItemNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected ItemNotFound, got {e}")),
        Ok(_) => Err("expected error for missing item".to_string()),
    }
}

async fn update_item_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .update_item(&mut snap, 0, make_item("WM404", 1, WasteStatus::Collected))
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::ItemNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected ItemNotFound, got {e}")),
        Ok(_) => Err("update of missing item succeeded".to_string()),
    }
}

async fn list_items_filters_by_barangay_and_status<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, make_item("WM1", 1, WasteStatus::NotCollected)).await?;
    seed_item(&s, make_item("WM2", 1, WasteStatus::PendingCollection)).await?;
    seed_item(&s, make_item("WM3", 2, WasteStatus::PendingCollection)).await?;

    let in_one = s
        .list_items(&ItemFilter {
            barangay_id: Some(1),
            ..ItemFilter::default()
        })
        .await
        .map_err(|e| e.to_string())?;
    if in_one.len() != 2 {
        return Err(format!("expected 2 items in barangay 1, got {}", in_one.len()));
    }

    let pending = s
        .list_items(&ItemFilter {
            status: Some(WasteStatus::PendingCollection),
            ..ItemFilter::default()
        })
        .await
        .map_err(|e| e.to_string())?;
    let mut ids: Vec<_> = pending.iter().map(|i| i.item_id.as_str()).collect();
    ids.sort_unstable();
    if ids != ["WM2", "WM3"] {
        return Err(format!("expected WM2, WM3 pending, got {ids:?}"));
    }
    Ok(())
}

async fn list_items_respects_limit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for i in 0..5 {
        seed_item(&s, make_item(&format!("WM{i}"), 1, WasteStatus::NotCollected)).await?;
    }
    let items = s
        .list_items(&ItemFilter {
            limit: 3,
            ..ItemFilter::default()
        })
        .await
        .map_err(|e| e.to_string())?;
    if items.len() != 3 {
        return Err(format!("expected 3 items, got {}", items.len()));
    }
    Ok(())
}
