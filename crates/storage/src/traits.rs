use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::record::{
    ActorId, BarangayId, BarangayRecord, CollectorRecord, ItemFilter, NewTrackingRecord,
    TrackingRecord, WasteItemRecord,
};

/// The storage trait for waste-item tracking backends.
///
/// A `TrackingStorage` implementation provides durable, transactional storage
/// for waste items, their append-only tracking ledger, barangay reference
/// data, and collector presence.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)`: commit and consume the transaction
///    OR `abort_snapshot(snapshot)`: roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, its writes MUST be
/// discarded.
///
/// ## OCC Conflict Detection
///
/// `update_item` is a compare-and-swap on `WasteItemRecord::version`.
/// If the stored version differs from `expected_version` (at staging time or
/// at commit time), the backend returns `StorageError::ConcurrentConflict`.
/// Two snapshots that read the same version can never both commit an update.
///
/// ## Ledger
///
/// There is no update or delete for tracking records. `append_tracking` must
/// be called in the same snapshot as the item mutation it describes.
#[async_trait]
pub trait TrackingStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Item operations (within snapshot) ─────────────────────────────────────

    /// Insert a new waste item. Its `version` is stored as 0.
    ///
    /// Returns `Err(StorageError::ItemAlreadyExists)` if the identifier is taken.
    async fn insert_item(
        &self,
        snapshot: &mut Self::Snapshot,
        item: WasteItemRecord,
    ) -> Result<(), StorageError>;

    /// Read an item as visible to this snapshot, for a later `update_item`.
    async fn get_item_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        item_id: &str,
    ) -> Result<WasteItemRecord, StorageError>;

    /// Replace an item record if its version still equals `expected_version`.
    ///
    /// Returns the new version number on success.
    async fn update_item(
        &self,
        snapshot: &mut Self::Snapshot,
        expected_version: i64,
        item: WasteItemRecord,
    ) -> Result<i64, StorageError>;

    /// Append one ledger entry for an item visible to this snapshot.
    async fn append_tracking(
        &self,
        snapshot: &mut Self::Snapshot,
        record: NewTrackingRecord,
    ) -> Result<TrackingRecord, StorageError>;

    // ── Reference data and presence (within snapshot) ─────────────────────────

    /// Insert or replace a barangay reference record.
    async fn upsert_barangay(
        &self,
        snapshot: &mut Self::Snapshot,
        barangay: BarangayRecord,
    ) -> Result<(), StorageError>;

    /// Insert or replace a collector account.
    async fn upsert_collector(
        &self,
        snapshot: &mut Self::Snapshot,
        collector: CollectorRecord,
    ) -> Result<(), StorageError>;

    /// Overwrite a collector's last known position. Last write wins.
    ///
    /// Returns `Err(StorageError::CollectorNotFound)` for unknown collectors.
    async fn update_collector_presence(
        &self,
        snapshot: &mut Self::Snapshot,
        collector_id: ActorId,
        latitude: f64,
        longitude: f64,
        seen_at: OffsetDateTime,
    ) -> Result<(), StorageError>;

    // ── Query operations (outside snapshot) ───────────────────────────────────

    async fn get_item(&self, item_id: &str) -> Result<WasteItemRecord, StorageError>;

    /// List items newest first (by `created_at`, then `item_id`).
    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<WasteItemRecord>, StorageError>;

    /// An item's ledger, most recent first in commit order (descending
    /// record id). Timestamps are informational and do not affect order.
    ///
    /// Returns `Err(StorageError::ItemNotFound)` if the item does not exist.
    async fn tracking_history(&self, item_id: &str) -> Result<Vec<TrackingRecord>, StorageError>;

    /// The most recent ledger entry, or `None` for an item with no entries.
    async fn latest_tracking(&self, item_id: &str)
        -> Result<Option<TrackingRecord>, StorageError>;

    async fn get_barangay(&self, barangay_id: BarangayId) -> Result<BarangayRecord, StorageError>;

    /// All barangays ordered by name.
    async fn list_barangays(&self) -> Result<Vec<BarangayRecord>, StorageError>;

    async fn get_collector(&self, collector_id: ActorId) -> Result<CollectorRecord, StorageError>;

    /// Collectors ordered by id, optionally restricted to one barangay assignment.
    async fn list_collectors(
        &self,
        barangay_id: Option<BarangayId>,
    ) -> Result<Vec<CollectorRecord>, StorageError>;
}
