//! Reference data and collector presence conformance tests.

use std::future::Future;

use super::{at, make_barangay, make_collector, TestResult};
use crate::{StorageError, TrackingStorage};

pub(super) async fn run_presence_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "presence",
        "barangays_listed_by_name",
        barangays_listed_by_name(factory).await,
    ));
    results.push(TestResult::from_result(
        "presence",
        "get_barangay_nonexistent",
        get_barangay_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "presence",
        "presence_update_overwrites",
        presence_update_overwrites(factory).await,
    ));
    results.push(TestResult::from_result(
        "presence",
        "presence_for_unknown_collector_fails",
        presence_for_unknown_collector_fails(factory).await,
    ));
    results.push(TestResult::from_result(
        "presence",
        "aborted_presence_update_discarded",
        aborted_presence_update_discarded(factory).await,
    ));
    results.push(TestResult::from_result(
        "presence",
        "list_collectors_filters_by_barangay",
        list_collectors_filters_by_barangay(factory).await,
    ));

    results
}

async fn barangays_listed_by_name<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    for (id, name) in [(1, "San Roque"), (2, "Angustia"), (3, "La Purisima")] {
        s.upsert_barangay(&mut snap, make_barangay(id, name))
            .await
            .map_err(|e| e.to_string())?;
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let names: Vec<String> = s
        .list_barangays()
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|b| b.name)
        .collect();
    if names != ["Angustia", "La Purisima", "San Roque"] {
        return Err(format!("unexpected order: {names:?}"));
    }
    Ok(())
}

async fn get_barangay_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_barangay(99).await {
        Err(StorageError::BarangayNotFound { barangay_id: 99 }) => Ok(()),
        other => Err(format!("expected BarangayNotFound(99), got {other:?}")),
    }
}

async fn presence_update_overwrites<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.upsert_collector(&mut snap, make_collector(10, Some(1)))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    for (lat, lon, offset) in [(13.40, 123.30, 0), (13.41, 123.31, 30)] {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.update_collector_presence(&mut snap, 10, lat, lon, at(offset))
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    }

    let c = s.get_collector(10).await.map_err(|e| e.to_string())?;
    if c.last_latitude != Some(13.41)
        || c.last_longitude != Some(123.31)
        || c.last_seen != Some(at(30))
    {
        return Err(format!("presence not overwritten: {c:?}"));
    }
    Ok(())
}

async fn presence_for_unknown_collector_fails<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let staged = s
        .update_collector_presence(&mut snap, 404, 13.4, 123.3, at(0))
        .await;
    let result = match staged {
        Ok(()) => s.commit_snapshot(snap).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::CollectorNotFound { collector_id: 404 }) => Ok(()),
        other => Err(format!("expected CollectorNotFound(404), got {other:?}")),
    }
}

async fn aborted_presence_update_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.upsert_collector(&mut snap, make_collector(10, Some(1)))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_collector_presence(&mut snap, 10, 13.4, 123.3, at(0))
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let c = s.get_collector(10).await.map_err(|e| e.to_string())?;
    if c.last_seen.is_some() || c.last_latitude.is_some() {
        return Err(format!("aborted presence visible: {c:?}"));
    }
    Ok(())
}

async fn list_collectors_filters_by_barangay<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    for c in [
        make_collector(10, Some(1)),
        make_collector(11, Some(2)),
        make_collector(12, Some(1)),
        make_collector(13, None),
    ] {
        s.upsert_collector(&mut snap, c)
            .await
            .map_err(|e| e.to_string())?;
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let ids: Vec<i64> = s
        .list_collectors(Some(1))
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|c| c.id)
        .collect();
    if ids != [10, 12] {
        return Err(format!("expected collectors [10, 12], got {ids:?}"));
    }
    let all = s.list_collectors(None).await.map_err(|e| e.to_string())?;
    if all.len() != 4 {
        return Err(format!("expected 4 collectors, got {}", all.len()));
    }
    Ok(())
}
