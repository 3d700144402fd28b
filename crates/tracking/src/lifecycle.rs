//! The waste-item state machine.
//!
//! Every operation follows the same shape: authorize, open a snapshot, read
//! the item, check guards, mutate the record, append one ledger entry, and
//! commit. A guard failure aborts the snapshot so the item keeps its prior
//! state and the ledger gains nothing.
//!
//! ```text
//!  register(unsorted) ──► not_collected ◄──────── mark_unsorted (from any)
//!                             │
//!                        mark_sorted
//!                             ▼
//!  register(sorted) ──► pending_collection
//!                             │
//!                       mark_collected
//!                             ▼
//!                         collected ──confirm_collection──► (client_confirmed)
//!                             │
//!                       advance_status
//!                             ▼
//!               in_transit / processed / disposed
//! ```

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use wastetrack_storage::{
    BarangayId, NewTrackingRecord, StorageError, TrackingRecord, TrackingStorage,
    WasteItemRecord, WasteStatus, WasteType,
};

use crate::actor::{authorize, Actor, Capability};
use crate::clock::{Clock, SystemClock};
use crate::config::TrackingConfig;
use crate::coords::{normalize, CoordinateOutcome, CoordinateWarning, RawCoordinates};
use crate::error::TrackingError;
use crate::item_id;

const REGISTERED_NOTE: &str = "Waste item registered for collection";

/// Input for [`TrackingService::register`]. Required fields are optional
/// here so that their absence is reported as a validation error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewWasteItem {
    pub waste_type: Option<String>,
    pub barangay_id: Option<BarangayId>,
    pub is_sorted: bool,
    pub address: Option<String>,
    pub contact_person: Option<String>,
    pub contact_number: Option<String>,
    pub weight: Option<f64>,
    pub description: Option<String>,
}

/// Input for [`TrackingService::advance_status`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvanceRequest {
    pub status: String,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub coordinates: RawCoordinates,
}

/// Result of a committed transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    /// The item as committed, including its new version.
    pub item: WasteItemRecord,
    /// The ledger entry appended with it.
    pub record: TrackingRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<CoordinateWarning>,
}

/// What a transition appends to the ledger besides the new status.
struct LedgerDraft {
    location: Option<String>,
    outcome: CoordinateOutcome,
    notes: Option<String>,
}

impl LedgerDraft {
    fn note(item: &WasteItemRecord, notes: impl Into<String>) -> Self {
        Self {
            location: item.address.clone(),
            outcome: CoordinateOutcome::Absent,
            notes: Some(notes.into()),
        }
    }
}

/// Lifecycle, ledger, presence, and query operations over one storage
/// backend. Constructed once per process and shared by reference.
pub struct TrackingService<S: TrackingStorage> {
    pub(crate) storage: S,
    pub(crate) config: TrackingConfig,
    pub(crate) clock: Arc<dyn Clock>,
}

impl<S: TrackingStorage> TrackingService<S> {
    pub fn new(storage: S, config: TrackingConfig) -> Self {
        Self::with_clock(storage, config, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: S, config: TrackingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            config,
            clock,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Write the configured barangays and collectors to storage.
    pub async fn seed_reference_data(&self) -> Result<(), TrackingError> {
        let mut snap = self.storage.begin_snapshot().await?;
        let staged = async {
            for barangay in &self.config.barangays {
                self.storage.upsert_barangay(&mut snap, barangay.clone()).await?;
            }
            for collector in &self.config.collectors {
                self.storage
                    .upsert_collector(&mut snap, collector.clone())
                    .await?;
            }
            Ok::<(), StorageError>(())
        }
        .await;
        if let Err(e) = staged {
            let _ = self.storage.abort_snapshot(snap).await;
            return Err(e.into());
        }
        self.storage.commit_snapshot(snap).await?;
        tracing::info!(
            barangays = self.config.barangays.len(),
            collectors = self.config.collectors.len(),
            "seeded reference data"
        );
        Ok(())
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// Register a new item. Unsorted items start blocked in `not_collected`.
    pub async fn register(
        &self,
        input: NewWasteItem,
        actor: &Actor,
    ) -> Result<TransitionOutcome, TrackingError> {
        let waste_type: WasteType = match input.waste_type.as_deref().map(str::trim) {
            None | Some("") => return Err(TrackingError::validation("Waste type is required")),
            Some(raw) => raw
                .parse()
                .map_err(|_| TrackingError::validation(format!("Unknown waste type '{raw}'")))?,
        };
        let barangay_id = input
            .barangay_id
            .ok_or_else(|| TrackingError::validation("Barangay is required"))?;
        if let Some(weight) = input.weight {
            if !weight.is_finite() || weight < 0.0 {
                return Err(TrackingError::validation(format!(
                    "Weight must be a non-negative number, got {weight}"
                )));
            }
        }
        authorize(actor, Capability::Register { barangay_id })?;
        match self.storage.get_barangay(barangay_id).await {
            Ok(_) => {}
            Err(StorageError::BarangayNotFound { .. }) => {
                return Err(TrackingError::validation(format!(
                    "Unknown barangay {barangay_id}"
                )))
            }
            Err(e) => return Err(e.into()),
        }

        let now = self.clock.now();
        let status = if input.is_sorted {
            WasteStatus::PendingCollection
        } else {
            WasteStatus::NotCollected
        };
        let base =
            item_id::base_item_id(&self.config.item_id_prefix, now, self.config.utc_offset());
        let template = WasteItemRecord {
            item_id: base.clone(),
            item_name: waste_type.display_name().to_string(),
            waste_type,
            weight: input.weight,
            description: clean(input.description),
            status,
            barangay_id,
            address: clean(input.address),
            contact_person: clean(input.contact_person),
            contact_number: clean(input.contact_number),
            is_sorted: input.is_sorted,
            sorted_at: input.is_sorted.then_some(now),
            sorted_by: input.is_sorted.then_some(actor.id),
            client_confirmed: false,
            confirmed_at: None,
            created_by: Some(actor.id),
            created_at: now,
            updated_at: now,
            version: 0,
        };

        for attempt in 1..=self.config.max_id_attempts {
            let mut item = template.clone();
            item.item_id = item_id::candidate(&base, attempt);
            match self.insert_with_entry(item, actor, now).await {
                Ok(outcome) => {
                    tracing::info!(
                        item_id = %outcome.item.item_id,
                        status = %outcome.item.status,
                        actor_id = actor.id,
                        barangay_id,
                        "registered waste item"
                    );
                    return Ok(outcome);
                }
                Err(TrackingError::Storage(StorageError::ItemAlreadyExists { item_id })) => {
                    tracing::debug!(%item_id, attempt, "item id taken, retrying with suffix");
                }
                Err(e) => return Err(e),
            }
        }
        Err(TrackingError::Conflict(format!(
            "Could not allocate a unique item id after {} attempts",
            self.config.max_id_attempts
        )))
    }

    async fn insert_with_entry(
        &self,
        item: WasteItemRecord,
        actor: &Actor,
        now: OffsetDateTime,
    ) -> Result<TransitionOutcome, TrackingError> {
        let entry = NewTrackingRecord {
            item_id: item.item_id.clone(),
            status: item.status,
            location: item.address.clone(),
            latitude: None,
            longitude: None,
            notes: Some(REGISTERED_NOTE.to_string()),
            updated_by: Some(actor.id),
            timestamp: now,
        };
        let mut snap = self.storage.begin_snapshot().await?;
        let staged = async {
            self.storage.insert_item(&mut snap, item.clone()).await?;
            self.storage.append_tracking(&mut snap, entry).await
        }
        .await;
        let record = match staged {
            Ok(record) => record,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snap).await;
                return Err(e.into());
            }
        };
        self.storage.commit_snapshot(snap).await?;
        Ok(TransitionOutcome {
            item,
            record,
            warning: None,
        })
    }

    // ── Sorting gate ─────────────────────────────────────────────────────────

    /// Mark an item sorted, releasing it for collection.
    pub async fn mark_sorted(
        &self,
        item_id: &str,
        actor: &Actor,
    ) -> Result<TransitionOutcome, TrackingError> {
        self.transition(item_id, actor, "mark_sorted", |item, now| {
            authorize(actor, Capability::Sort { creator: item.created_by })?;
            if item.is_sorted {
                return Err(TrackingError::state("Waste item is already marked as sorted"));
            }
            if item.status.is_downstream() {
                return Err(TrackingError::state(format!(
                    "Cannot mark a {} item as sorted",
                    item.status
                )));
            }
            item.is_sorted = true;
            item.sorted_at = Some(now);
            item.sorted_by = Some(actor.id);
            item.status = WasteStatus::PendingCollection;
            Ok(LedgerDraft::note(item, "Waste item marked as sorted"))
        })
        .await
    }

    /// Revoke sorting. The item returns to `not_collected` whatever its
    /// status, and any client confirmation is cleared with it.
    pub async fn mark_unsorted(
        &self,
        item_id: &str,
        actor: &Actor,
    ) -> Result<TransitionOutcome, TrackingError> {
        self.transition(item_id, actor, "mark_unsorted", |item, _now| {
            authorize(actor, Capability::Sort { creator: item.created_by })?;
            if !item.is_sorted {
                return Err(TrackingError::state("Waste item is not marked as sorted"));
            }
            let from = item.status;
            item.is_sorted = false;
            item.sorted_at = None;
            item.sorted_by = None;
            item.status = WasteStatus::NotCollected;
            item.client_confirmed = false;
            item.confirmed_at = None;
            let note = if from == WasteStatus::PendingCollection {
                "Waste item marked as unsorted".to_string()
            } else {
                format!("Waste item marked as unsorted (was {from})")
            };
            Ok(LedgerDraft::note(item, note))
        })
        .await
    }

    // ── Collection handshake ─────────────────────────────────────────────────

    /// Crew attestation that the item was picked up.
    pub async fn mark_collected(
        &self,
        item_id: &str,
        coordinates: &RawCoordinates,
        actor: &Actor,
    ) -> Result<TransitionOutcome, TrackingError> {
        authorize(actor, Capability::Collect)?;
        let offset = self.config.utc_offset();
        self.transition(item_id, actor, "mark_collected", |item, now| {
            if !item.is_sorted {
                return Err(TrackingError::state(
                    "Waste item must be sorted before it can be collected",
                ));
            }
            if item.status != WasteStatus::PendingCollection {
                return Err(TrackingError::state(format!(
                    "Only items pending collection can be collected (current status: {})",
                    item.status
                )));
            }
            item.status = WasteStatus::Collected;
            item.client_confirmed = false;
            item.confirmed_at = None;

            let local = now.to_offset(offset);
            Ok(LedgerDraft {
                location: item.address.clone(),
                outcome: normalize(coordinates, &self.config.coverage.bbox),
                notes: Some(format!(
                    "Collected by collection team at {:04}-{:02}-{:02} {:02}:{:02}",
                    local.year(),
                    u8::from(local.month()),
                    local.day(),
                    local.hour(),
                    local.minute()
                )),
            })
        })
        .await
    }

    /// Beneficiary attestation that pickup occurred. Status is unchanged.
    pub async fn confirm_collection(
        &self,
        item_id: &str,
        actor: &Actor,
    ) -> Result<TransitionOutcome, TrackingError> {
        self.transition(item_id, actor, "confirm_collection", |item, now| {
            authorize(actor, Capability::Confirm { creator: item.created_by })?;
            if item.status != WasteStatus::Collected {
                return Err(TrackingError::state(format!(
                    "Only collected items can be confirmed (current status: {})",
                    item.status
                )));
            }
            if item.client_confirmed {
                return Err(TrackingError::state("Collection was already confirmed"));
            }
            item.client_confirmed = true;
            item.confirmed_at = Some(now);
            Ok(LedgerDraft::note(item, "Collection confirmed by client"))
        })
        .await
    }

    // ── Generic status update ────────────────────────────────────────────────

    /// Set an item's status directly. Used by collection teams for transit,
    /// processing, and disposal, and by the machine-to-machine tracking API.
    ///
    /// Forward-only progression is not enforced. Returning an item to
    /// `not_collected` goes through [`mark_unsorted`](Self::mark_unsorted).
    pub async fn advance_status(
        &self,
        item_id: &str,
        request: &AdvanceRequest,
        actor: &Actor,
    ) -> Result<TransitionOutcome, TrackingError> {
        authorize(actor, Capability::AdvanceStatus)?;
        let target: WasteStatus = request.status.trim().parse().map_err(|_| {
            TrackingError::validation(format!("Unknown status '{}'", request.status))
        })?;
        if target == WasteStatus::NotCollected {
            return Err(TrackingError::validation(
                "Items return to not_collected only by being marked unsorted",
            ));
        }
        let location = request
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty());

        self.transition(item_id, actor, "advance_status", |item, _now| {
            if !item.is_sorted {
                return Err(TrackingError::state(
                    "Waste item must be sorted before its status can be updated",
                ));
            }
            if target != item.status {
                item.client_confirmed = false;
                item.confirmed_at = None;
            }
            item.status = target;
            if let Some(location) = location {
                if item.address.as_deref() != Some(location) {
                    item.address = Some(location.to_string());
                }
            }
            let notes = request
                .notes
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("Status updated to {target}"));
            Ok(LedgerDraft {
                location: location.map(str::to_string).or_else(|| item.address.clone()),
                outcome: normalize(&request.coordinates, &self.config.coverage.bbox),
                notes: Some(notes),
            })
        })
        .await
    }

    // ── Shared transition driver ─────────────────────────────────────────────

    async fn transition<F>(
        &self,
        item_id: &str,
        actor: &Actor,
        operation: &'static str,
        mutate: F,
    ) -> Result<TransitionOutcome, TrackingError>
    where
        F: FnOnce(&mut WasteItemRecord, OffsetDateTime) -> Result<LedgerDraft, TrackingError>
            + Send,
    {
        let mut snap = self.storage.begin_snapshot().await?;
        let staged = self.stage(&mut snap, item_id, actor, mutate).await;
        let (outcome, from) = match staged {
            Ok(staged) => staged,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snap).await;
                tracing::debug!(
                    %item_id,
                    operation,
                    actor_id = actor.id,
                    error = %e,
                    "transition rejected"
                );
                return Err(e);
            }
        };
        if let Err(e) = self.storage.commit_snapshot(snap).await {
            tracing::debug!(%item_id, operation, error = %e, "transition commit failed");
            return Err(e.into());
        }

        tracing::info!(
            %item_id,
            operation,
            from = %from,
            to = %outcome.item.status,
            actor_id = actor.id,
            version = outcome.item.version,
            "transition committed"
        );
        if let Some(warning) = &outcome.warning {
            tracing::warn!(%item_id, issue = ?warning.issue, "{}", warning.message);
        }
        Ok(outcome)
    }

    async fn stage<F>(
        &self,
        snap: &mut S::Snapshot,
        item_id: &str,
        actor: &Actor,
        mutate: F,
    ) -> Result<(TransitionOutcome, WasteStatus), TrackingError>
    where
        F: FnOnce(&mut WasteItemRecord, OffsetDateTime) -> Result<LedgerDraft, TrackingError>
            + Send,
    {
        let mut item = self.storage.get_item_for_update(snap, item_id).await?;
        let from = item.status;
        let expected_version = item.version;
        // Read after the item so a stale clock cannot date this entry
        // before the one it supersedes.
        let now = self.clock.now().max(item.updated_at);

        let draft = mutate(&mut item, now)?;
        item.updated_at = now;
        item.version = self
            .storage
            .update_item(snap, expected_version, item.clone())
            .await?;

        let (latitude, longitude) = draft.outcome.coordinates().unzip();
        let record = self
            .storage
            .append_tracking(
                snap,
                NewTrackingRecord {
                    item_id: item.item_id.clone(),
                    status: item.status,
                    location: draft.location,
                    latitude,
                    longitude,
                    notes: draft.outcome.tag_notes(draft.notes),
                    updated_by: Some(actor.id),
                    timestamp: now,
                },
            )
            .await?;

        if let CoordinateOutcome::Valid {
            in_region: false,
            latitude,
            longitude,
        } = draft.outcome
        {
            tracing::warn!(%item_id, latitude, longitude, "coordinates outside operational region");
        }

        Ok((
            TransitionOutcome {
                item,
                record,
                warning: draft.outcome.warning(),
            },
            from,
        ))
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
