//! Collector presence: last known device position per collector.
//!
//! Pings overwrite the previous position, last write wins, with no history.
//! A ping whose coordinates cannot be trusted is rejected outright so the
//! previous valid position survives.

use serde::Serialize;
use time::OffsetDateTime;
use wastetrack_storage::{ActorId, BarangayId, CollectorRecord, TrackingStorage};

use crate::actor::{authorize, Actor, Capability};
use crate::config::PresenceConfig;
use crate::coords::{normalize, CoordinateOutcome, CoordinateWarning, RawCoordinates};
use crate::error::TrackingError;
use crate::lifecycle::TrackingService;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PingOutcome {
    Accepted {
        latitude: f64,
        longitude: f64,
        #[serde(with = "time::serde::rfc3339")]
        seen_at: OffsetDateTime,
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<CoordinateWarning>,
    },
    /// Nothing was stored.
    Rejected { reason: String },
}

/// How fresh a collector's last ping is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recency {
    Live,
    Recent,
    Stale,
    /// The collector has never reported a position.
    Unknown,
}

impl Recency {
    pub fn classify(
        last_seen: Option<OffsetDateTime>,
        now: OffsetDateTime,
        thresholds: &PresenceConfig,
    ) -> Self {
        let Some(seen) = last_seen else {
            return Recency::Unknown;
        };
        let age = (now - seen).whole_seconds();
        if age < thresholds.live_secs {
            Recency::Live
        } else if age < thresholds.recent_secs {
            Recency::Recent
        } else {
            Recency::Stale
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresenceEntry {
    pub collector_id: ActorId,
    pub username: String,
    pub full_name: String,
    pub barangay_id: Option<BarangayId>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
    pub recency: Recency,
}

impl PresenceEntry {
    fn from_record(c: CollectorRecord, now: OffsetDateTime, thresholds: &PresenceConfig) -> Self {
        Self {
            recency: Recency::classify(c.last_seen, now, thresholds),
            collector_id: c.id,
            username: c.username,
            full_name: c.full_name,
            barangay_id: c.barangay_id,
            latitude: c.last_latitude,
            longitude: c.last_longitude,
            last_seen: c.last_seen,
        }
    }
}

impl<S: TrackingStorage> TrackingService<S> {
    /// Record the acting collector's current position.
    pub async fn ping(
        &self,
        actor: &Actor,
        coordinates: &RawCoordinates,
    ) -> Result<PingOutcome, TrackingError> {
        authorize(actor, Capability::ReportPresence)?;

        let outcome = normalize(coordinates, &self.config.coverage.bbox);
        let Some((latitude, longitude)) = outcome.coordinates() else {
            let reason = match outcome {
                CoordinateOutcome::Absent => "No coordinates supplied",
                _ => "Invalid coordinates",
            };
            tracing::warn!(collector_id = actor.id, reason, "presence ping rejected");
            return Ok(PingOutcome::Rejected {
                reason: reason.to_string(),
            });
        };

        let seen_at = self.clock.now();
        let mut snap = self.storage.begin_snapshot().await?;
        if let Err(e) = self
            .storage
            .update_collector_presence(&mut snap, actor.id, latitude, longitude, seen_at)
            .await
        {
            let _ = self.storage.abort_snapshot(snap).await;
            return Err(e.into());
        }
        self.storage.commit_snapshot(snap).await?;

        let warning = outcome.warning();
        if let Some(w) = &warning {
            tracing::warn!(collector_id = actor.id, issue = ?w.issue, "{}", w.message);
        }
        tracing::debug!(collector_id = actor.id, latitude, longitude, "presence updated");
        Ok(PingOutcome::Accepted {
            latitude,
            longitude,
            seen_at,
            warning,
        })
    }

    /// Collectors assigned to a barangay with their last known positions.
    ///
    /// Admins may query any barangay; barangay representatives only their own.
    pub async fn presence_for_barangay(
        &self,
        barangay_id: BarangayId,
        actor: &Actor,
    ) -> Result<Vec<PresenceEntry>, TrackingError> {
        authorize(actor, Capability::ViewPresence { barangay_id })?;
        self.storage.get_barangay(barangay_id).await?;

        let now = self.clock.now();
        Ok(self
            .storage
            .list_collectors(Some(barangay_id))
            .await?
            .into_iter()
            .map(|c| PresenceEntry::from_record(c, now, &self.config.presence))
            .collect())
    }
}
