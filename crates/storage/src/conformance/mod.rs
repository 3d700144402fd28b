//! Conformance test suite for `TrackingStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `TrackingStorage` implementation can run to verify correctness. The suite
//! covers:
//!
//! - **Items**: creation, duplicate detection, lookup errors
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes visible
//! - **Atomic commit**: item mutation and ledger entry land together or not at all
//! - **Version validation / OCC**: optimistic concurrency conflict detection
//! - **Ledger**: append-only ordering, latest entry, per-item separation
//! - **Presence**: last-write-wins collector positions, barangay scoping
//! - **Concurrency**: real racing tasks, exactly one winner
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use wastetrack_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod commit;
mod concurrent;
mod items;
mod ledger;
mod presence;
mod snapshot;
mod version;

use std::fmt;
use std::future::Future;

use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use crate::record::{
    BarangayRecord, CollectorRecord, NewTrackingRecord, WasteItemRecord, WasteStatus, WasteType,
};
use crate::TrackingStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "items", "snapshot", "ledger").
    pub category: String,
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(items::run_item_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(ledger::run_ledger_tests(&factory).await);
    results.extend(presence::run_presence_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

const BASE_TIME: OffsetDateTime = datetime!(2025-01-01 08:00 UTC);

fn at(offset_secs: i64) -> OffsetDateTime {
    BASE_TIME + Duration::seconds(offset_secs)
}

fn make_item(item_id: &str, barangay_id: i64, status: WasteStatus) -> WasteItemRecord {
    WasteItemRecord {
        item_id: item_id.to_string(),
        item_name: WasteType::Recyclable.display_name().to_string(),
        waste_type: WasteType::Recyclable,
        weight: Some(2.5),
        description: None,
        status,
        barangay_id,
        address: Some("Zone 1".to_string()),
        contact_person: None,
        contact_number: None,
        is_sorted: status != WasteStatus::NotCollected,
        sorted_at: None,
        sorted_by: None,
        client_confirmed: false,
        confirmed_at: None,
        created_by: Some(1),
        created_at: BASE_TIME,
        updated_at: BASE_TIME,
        version: 0,
    }
}

fn make_tracking(
    item_id: &str,
    status: WasteStatus,
    timestamp: OffsetDateTime,
) -> NewTrackingRecord {
    NewTrackingRecord {
        item_id: item_id.to_string(),
        status,
        location: Some("Zone 1".to_string()),
        latitude: None,
        longitude: None,
        notes: None,
        updated_by: Some(1),
        timestamp,
    }
}

fn make_barangay(id: i64, name: &str) -> BarangayRecord {
    BarangayRecord {
        id,
        name: name.to_string(),
        code: format!("BRGY-{id}"),
        municipality: "Nabua".to_string(),
        province: Some("Camarines Sur".to_string()),
        is_active: true,
    }
}

fn make_collector(id: i64, barangay_id: Option<i64>) -> CollectorRecord {
    CollectorRecord {
        id,
        username: format!("collector{id}"),
        full_name: format!("Collector {id}"),
        barangay_id,
        last_latitude: None,
        last_longitude: None,
        last_seen: None,
    }
}

/// Insert and commit one item in a fresh snapshot.
async fn seed_item<S: TrackingStorage>(s: &S, item: WasteItemRecord) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_item(&mut snap, item)
        .await
        .map_err(|e| format!("insert: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit seed: {e}"))
}

/// Read an item inside `snap` and stage a status change at its current version.
async fn stage_status<S: TrackingStorage>(
    s: &S,
    snap: &mut S::Snapshot,
    item_id: &str,
    status: WasteStatus,
) -> Result<i64, crate::StorageError> {
    let mut rec = s.get_item_for_update(snap, item_id).await?;
    let expected = rec.version;
    rec.status = status;
    s.update_item(snap, expected, rec).await
}
