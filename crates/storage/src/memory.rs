//! In-memory `TrackingStorage` backend.
//!
//! Snapshots stage their writes locally and apply them under a single write
//! lock at commit. Every staged item update carries the version it was based
//! on; commit re-validates those versions so two snapshots racing on the
//! same item cannot both succeed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::{
    ActorId, BarangayId, BarangayRecord, CollectorRecord, ItemFilter, NewTrackingRecord,
    TrackingRecord, WasteItemRecord,
};
use crate::traits::TrackingStorage;

#[derive(Default)]
struct MemoryState {
    items: BTreeMap<String, WasteItemRecord>,
    /// Ledger in append order.
    tracking: Vec<TrackingRecord>,
    barangays: BTreeMap<BarangayId, BarangayRecord>,
    collectors: BTreeMap<ActorId, CollectorRecord>,
}

/// Process-local storage shared by cloning.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
    next_tracking_id: Arc<AtomicI64>,
}

#[derive(Debug)]
struct StagedUpdate {
    /// Committed version this update was computed from.
    base_version: i64,
    record: WasteItemRecord,
}

#[derive(Debug, Clone, Copy)]
struct StagedPresence {
    latitude: f64,
    longitude: f64,
    seen_at: OffsetDateTime,
}

/// Writes staged by one in-progress transaction.
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    inserted: BTreeMap<String, WasteItemRecord>,
    updated: BTreeMap<String, StagedUpdate>,
    tracking: Vec<TrackingRecord>,
    barangays: Vec<BarangayRecord>,
    collectors: BTreeMap<ActorId, CollectorRecord>,
    presence: BTreeMap<ActorId, StagedPresence>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Item as seen from inside `snapshot`: staged writes shadow committed ones.
    async fn visible_item(
        &self,
        snapshot: &MemorySnapshot,
        item_id: &str,
    ) -> Option<WasteItemRecord> {
        if let Some(item) = snapshot.inserted.get(item_id) {
            return Some(item.clone());
        }
        if let Some(staged) = snapshot.updated.get(item_id) {
            return Some(staged.record.clone());
        }
        self.state.read().await.items.get(item_id).cloned()
    }

    async fn collector_visible(&self, snapshot: &MemorySnapshot, collector_id: ActorId) -> bool {
        snapshot.collectors.contains_key(&collector_id)
            || self.state.read().await.collectors.contains_key(&collector_id)
    }
}

fn item_not_found(item_id: &str) -> StorageError {
    StorageError::ItemNotFound {
        item_id: item_id.to_string(),
    }
}

#[async_trait]
impl TrackingStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        Ok(MemorySnapshot::default())
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let mut state = self.state.write().await;

        // Validate everything before applying anything.
        for item_id in snapshot.inserted.keys() {
            if state.items.contains_key(item_id) {
                return Err(StorageError::ItemAlreadyExists {
                    item_id: item_id.clone(),
                });
            }
        }
        for (item_id, staged) in &snapshot.updated {
            let current = state
                .items
                .get(item_id)
                .ok_or_else(|| item_not_found(item_id))?;
            if current.version != staged.base_version {
                tracing::debug!(
                    item_id = %item_id,
                    expected = staged.base_version,
                    found = current.version,
                    "commit rejected by version check"
                );
                return Err(StorageError::ConcurrentConflict {
                    item_id: item_id.clone(),
                    expected_version: staged.base_version,
                });
            }
        }
        for collector_id in snapshot.presence.keys() {
            if !state.collectors.contains_key(collector_id)
                && !snapshot.collectors.contains_key(collector_id)
            {
                return Err(StorageError::CollectorNotFound {
                    collector_id: *collector_id,
                });
            }
        }

        for (item_id, item) in snapshot.inserted {
            state.items.insert(item_id, item);
        }
        for (item_id, staged) in snapshot.updated {
            state.items.insert(item_id, staged.record);
        }
        state.tracking.extend(snapshot.tracking);
        for barangay in snapshot.barangays {
            state.barangays.insert(barangay.id, barangay);
        }
        for (id, collector) in snapshot.collectors {
            state.collectors.insert(id, collector);
        }
        for (id, presence) in snapshot.presence {
            if let Some(collector) = state.collectors.get_mut(&id) {
                collector.last_latitude = Some(presence.latitude);
                collector.last_longitude = Some(presence.longitude);
                collector.last_seen = Some(presence.seen_at);
            }
        }
        Ok(())
    }

    async fn abort_snapshot(&self, _snapshot: MemorySnapshot) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_item(
        &self,
        snapshot: &mut MemorySnapshot,
        mut item: WasteItemRecord,
    ) -> Result<(), StorageError> {
        if self.visible_item(snapshot, &item.item_id).await.is_some() {
            return Err(StorageError::ItemAlreadyExists {
                item_id: item.item_id,
            });
        }
        item.version = 0;
        snapshot.inserted.insert(item.item_id.clone(), item);
        Ok(())
    }

    async fn get_item_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        item_id: &str,
    ) -> Result<WasteItemRecord, StorageError> {
        self.visible_item(snapshot, item_id)
            .await
            .ok_or_else(|| item_not_found(item_id))
    }

    async fn update_item(
        &self,
        snapshot: &mut MemorySnapshot,
        expected_version: i64,
        mut item: WasteItemRecord,
    ) -> Result<i64, StorageError> {
        let current = self
            .visible_item(snapshot, &item.item_id)
            .await
            .ok_or_else(|| item_not_found(&item.item_id))?;
        if current.version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                item_id: item.item_id,
                expected_version,
            });
        }

        let new_version = expected_version + 1;
        item.version = new_version;

        if let Some(inserted) = snapshot.inserted.get_mut(&item.item_id) {
            *inserted = item;
        } else if let Some(staged) = snapshot.updated.get_mut(&item.item_id) {
            staged.record = item;
        } else {
            snapshot.updated.insert(
                item.item_id.clone(),
                StagedUpdate {
                    base_version: expected_version,
                    record: item,
                },
            );
        }
        Ok(new_version)
    }

    async fn append_tracking(
        &self,
        snapshot: &mut MemorySnapshot,
        record: NewTrackingRecord,
    ) -> Result<TrackingRecord, StorageError> {
        if self.visible_item(snapshot, &record.item_id).await.is_none() {
            return Err(item_not_found(&record.item_id));
        }
        let id = self.next_tracking_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = TrackingRecord::from_new(id, record);
        snapshot.tracking.push(record.clone());
        Ok(record)
    }

    async fn upsert_barangay(
        &self,
        snapshot: &mut MemorySnapshot,
        barangay: BarangayRecord,
    ) -> Result<(), StorageError> {
        snapshot.barangays.push(barangay);
        Ok(())
    }

    async fn upsert_collector(
        &self,
        snapshot: &mut MemorySnapshot,
        collector: CollectorRecord,
    ) -> Result<(), StorageError> {
        snapshot.collectors.insert(collector.id, collector);
        Ok(())
    }

    async fn update_collector_presence(
        &self,
        snapshot: &mut MemorySnapshot,
        collector_id: ActorId,
        latitude: f64,
        longitude: f64,
        seen_at: OffsetDateTime,
    ) -> Result<(), StorageError> {
        if !self.collector_visible(snapshot, collector_id).await {
            return Err(StorageError::CollectorNotFound { collector_id });
        }
        snapshot.presence.insert(
            collector_id,
            StagedPresence {
                latitude,
                longitude,
                seen_at,
            },
        );
        Ok(())
    }

    async fn get_item(&self, item_id: &str) -> Result<WasteItemRecord, StorageError> {
        self.state
            .read()
            .await
            .items
            .get(item_id)
            .cloned()
            .ok_or_else(|| item_not_found(item_id))
    }

    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<WasteItemRecord>, StorageError> {
        let state = self.state.read().await;
        let mut items: Vec<WasteItemRecord> = state
            .items
            .values()
            .filter(|item| filter.barangay_id.map_or(true, |b| item.barangay_id == b))
            .filter(|item| filter.status.map_or(true, |s| item.status == s))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.item_id.cmp(&a.item_id))
        });
        if filter.limit > 0 {
            items.truncate(filter.limit);
        }
        Ok(items)
    }

    async fn tracking_history(&self, item_id: &str) -> Result<Vec<TrackingRecord>, StorageError> {
        let state = self.state.read().await;
        if !state.items.contains_key(item_id) {
            return Err(item_not_found(item_id));
        }
        let mut history: Vec<TrackingRecord> = state
            .tracking
            .iter()
            .filter(|r| r.item_id == item_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(history)
    }

    async fn latest_tracking(&self, item_id: &str) -> Result<Option<TrackingRecord>, StorageError> {
        Ok(self.tracking_history(item_id).await?.into_iter().next())
    }

    async fn get_barangay(&self, barangay_id: BarangayId) -> Result<BarangayRecord, StorageError> {
        self.state
            .read()
            .await
            .barangays
            .get(&barangay_id)
            .cloned()
            .ok_or(StorageError::BarangayNotFound { barangay_id })
    }

    async fn list_barangays(&self) -> Result<Vec<BarangayRecord>, StorageError> {
        let state = self.state.read().await;
        let mut barangays: Vec<BarangayRecord> = state.barangays.values().cloned().collect();
        barangays.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(barangays)
    }

    async fn get_collector(&self, collector_id: ActorId) -> Result<CollectorRecord, StorageError> {
        self.state
            .read()
            .await
            .collectors
            .get(&collector_id)
            .cloned()
            .ok_or(StorageError::CollectorNotFound { collector_id })
    }

    async fn list_collectors(
        &self,
        barangay_id: Option<BarangayId>,
    ) -> Result<Vec<CollectorRecord>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .collectors
            .values()
            .filter(|c| barangay_id.map_or(true, |b| c.barangay_id == Some(b)))
            .cloned()
            .collect())
    }
}
