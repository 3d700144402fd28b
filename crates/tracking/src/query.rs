//! Item lookup, filtered listings, and dashboard aggregates.
//!
//! Barangay representatives are always scoped to their own barangay;
//! collectors and admins see every barangay.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use time::{Date, OffsetDateTime};
use wastetrack_storage::{
    BarangayId, BarangayRecord, ItemFilter, TrackingStorage, WasteItemRecord, WasteStatus,
    WasteType,
};

use crate::actor::{authorize, Actor, Capability, Role};
use crate::error::TrackingError;
use crate::lifecycle::TrackingService;

const RECENT_ITEMS: usize = 10;

/// Filters for [`TrackingService::list_items`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemQuery {
    pub barangay_id: Option<BarangayId>,
    pub status: Option<WasteStatus>,
    /// Calendar day of creation, in the configured local zone.
    pub created_on: Option<Date>,
    /// Maximum number of results (0 = no limit).
    pub limit: usize,
}

/// Item counts keyed by status. Every status is present, zero or not.
pub type StatusCounts = BTreeMap<WasteStatus, usize>;

fn empty_counts() -> StatusCounts {
    WasteStatus::ALL.into_iter().map(|s| (s, 0)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarangayStats {
    pub barangay_id: BarangayId,
    pub name: String,
    pub total: usize,
    pub by_status: StatusCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total: usize,
    pub by_status: StatusCounts,
    pub by_type: BTreeMap<WasteType, usize>,
    /// Items in `collected` whose last update fell on today's local date.
    pub collected_today: usize,
    pub recent: Vec<WasteItemRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEntry {
    pub barangay_name: String,
    #[serde(flatten)]
    pub item: WasteItemRecord,
}

/// One point on the live-tracking map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationEntry {
    pub item_id: String,
    pub item_name: String,
    pub status: WasteStatus,
    pub barangay_id: BarangayId,
    pub barangay_name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

impl<S: TrackingStorage> TrackingService<S> {
    pub async fn get_item(
        &self,
        item_id: &str,
        actor: &Actor,
    ) -> Result<WasteItemRecord, TrackingError> {
        let item = self.storage.get_item(item_id).await?;
        authorize(
            actor,
            Capability::ViewBarangay {
                barangay_id: item.barangay_id,
            },
        )?;
        Ok(item)
    }

    /// Items matching `query`, newest first.
    pub async fn list_items(
        &self,
        query: &ItemQuery,
        actor: &Actor,
    ) -> Result<Vec<WasteItemRecord>, TrackingError> {
        let barangay_id = self.scope_barangay(query.barangay_id, actor)?;
        let filter = ItemFilter {
            barangay_id,
            status: query.status,
            limit: if query.created_on.is_some() { 0 } else { query.limit },
        };
        let mut items = self.storage.list_items(&filter).await?;
        if let Some(day) = query.created_on {
            items.retain(|item| self.local_date(item.created_at) == day);
            if query.limit > 0 {
                items.truncate(query.limit);
            }
        }
        Ok(items)
    }

    /// Per-barangay counts by status, including barangays with no items.
    pub async fn barangay_stats(&self, actor: &Actor) -> Result<Vec<BarangayStats>, TrackingError> {
        let scope = self.scope_barangay(None, actor)?;
        let items = self
            .storage
            .list_items(&ItemFilter {
                barangay_id: scope,
                ..ItemFilter::default()
            })
            .await?;

        let mut stats: Vec<BarangayStats> = self
            .storage
            .list_barangays()
            .await?
            .into_iter()
            .filter(|b| scope.map_or(true, |id| b.id == id))
            .map(|b| BarangayStats {
                barangay_id: b.id,
                name: b.name,
                total: 0,
                by_status: empty_counts(),
            })
            .collect();
        let index: HashMap<BarangayId, usize> = stats
            .iter()
            .enumerate()
            .map(|(i, s)| (s.barangay_id, i))
            .collect();
        for item in &items {
            if let Some(&i) = index.get(&item.barangay_id) {
                stats[i].total += 1;
                *stats[i].by_status.entry(item.status).or_default() += 1;
            }
        }
        Ok(stats)
    }

    pub async fn dashboard_summary(
        &self,
        actor: &Actor,
    ) -> Result<DashboardSummary, TrackingError> {
        let scope = self.scope_barangay(None, actor)?;
        let items = self
            .storage
            .list_items(&ItemFilter {
                barangay_id: scope,
                ..ItemFilter::default()
            })
            .await?;
        let today = self.local_date(self.clock.now());

        let mut by_status = empty_counts();
        let mut by_type: BTreeMap<WasteType, usize> =
            WasteType::ALL.into_iter().map(|t| (t, 0)).collect();
        let mut collected_today = 0;
        for item in &items {
            *by_status.entry(item.status).or_default() += 1;
            *by_type.entry(item.waste_type).or_default() += 1;
            if item.status == WasteStatus::Collected && self.local_date(item.updated_at) == today {
                collected_today += 1;
            }
        }

        Ok(DashboardSummary {
            total: items.len(),
            by_status,
            by_type,
            collected_today,
            recent: items.into_iter().take(RECENT_ITEMS).collect(),
        })
    }

    /// Items awaiting pickup, grouped by barangay name then oldest first.
    pub async fn pending_queue(&self, actor: &Actor) -> Result<Vec<QueueEntry>, TrackingError> {
        authorize(actor, Capability::ViewQueue)?;
        let names = self.barangay_index().await?;
        let items = self
            .storage
            .list_items(&ItemFilter {
                status: Some(WasteStatus::PendingCollection),
                ..ItemFilter::default()
            })
            .await?;

        let mut queue: Vec<QueueEntry> = items
            .into_iter()
            .map(|item| QueueEntry {
                barangay_name: names
                    .get(&item.barangay_id)
                    .map(|b| b.name.clone())
                    .unwrap_or_default(),
                item,
            })
            .collect();
        queue.sort_by(|a, b| {
            a.barangay_name
                .cmp(&b.barangay_name)
                .then_with(|| a.item.created_at.cmp(&b.item.created_at))
                .then_with(|| a.item.item_id.cmp(&b.item.item_id))
        });
        Ok(queue)
    }

    /// Latest known position of every in-coverage item that has one.
    pub async fn locations_feed(&self, actor: &Actor) -> Result<Vec<LocationEntry>, TrackingError> {
        let scope = self.scope_barangay(None, actor)?;
        let barangays = self.barangay_index().await?;
        let items = self
            .storage
            .list_items(&ItemFilter {
                barangay_id: scope,
                ..ItemFilter::default()
            })
            .await?;

        let mut feed = Vec::new();
        for item in items {
            let Some(barangay) = barangays.get(&item.barangay_id) else {
                continue;
            };
            if !self.config.coverage.covers(barangay) {
                continue;
            }
            let history = self.storage.tracking_history(&item.item_id).await?;
            let Some((record, (latitude, longitude))) = history
                .iter()
                .find_map(|r| r.coordinates().map(|c| (r, c)))
            else {
                continue;
            };
            feed.push(LocationEntry {
                item_id: item.item_id.clone(),
                item_name: item.item_name.clone(),
                status: item.status,
                barangay_id: item.barangay_id,
                barangay_name: barangay.name.clone(),
                latitude,
                longitude,
                recorded_at: record.timestamp,
            });
        }
        Ok(feed)
    }

    /// Resolve the effective barangay filter for `actor`.
    fn scope_barangay(
        &self,
        requested: Option<BarangayId>,
        actor: &Actor,
    ) -> Result<Option<BarangayId>, TrackingError> {
        if actor.role == Role::Barangay && actor.barangay_id.is_none() {
            return Err(TrackingError::Permission(
                "Barangay account has no assigned barangay".into(),
            ));
        }
        match (actor.barangay_scope(), requested) {
            (None, requested) => Ok(requested),
            (Some(own), None) => Ok(Some(own)),
            (Some(_), Some(requested)) => {
                authorize(
                    actor,
                    Capability::ViewBarangay {
                        barangay_id: requested,
                    },
                )?;
                Ok(Some(requested))
            }
        }
    }

    async fn barangay_index(&self) -> Result<HashMap<BarangayId, BarangayRecord>, TrackingError> {
        Ok(self
            .storage
            .list_barangays()
            .await?
            .into_iter()
            .map(|b| (b.id, b))
            .collect())
    }

    pub(crate) fn local_date(&self, at: OffsetDateTime) -> Date {
        at.to_offset(self.config.utc_offset()).date()
    }
}
