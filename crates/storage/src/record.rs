use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseEnumError;

/// Identifier of a user account (representative, collector, or admin).
pub type ActorId = i64;

/// Identifier of a barangay reference record.
pub type BarangayId = i64;

/// Lifecycle status of a waste item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WasteStatus {
    /// Registered but unsorted; blocked from collection.
    NotCollected,
    PendingCollection,
    Collected,
    InTransit,
    Processed,
    Disposed,
}

impl WasteStatus {
    pub const ALL: [WasteStatus; 6] = [
        WasteStatus::NotCollected,
        WasteStatus::PendingCollection,
        WasteStatus::Collected,
        WasteStatus::InTransit,
        WasteStatus::Processed,
        WasteStatus::Disposed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WasteStatus::NotCollected => "not_collected",
            WasteStatus::PendingCollection => "pending_collection",
            WasteStatus::Collected => "collected",
            WasteStatus::InTransit => "in_transit",
            WasteStatus::Processed => "processed",
            WasteStatus::Disposed => "disposed",
        }
    }

    /// Statuses only reachable by passing through the collection gate.
    pub fn is_downstream(self) -> bool {
        matches!(
            self,
            WasteStatus::Collected
                | WasteStatus::InTransit
                | WasteStatus::Processed
                | WasteStatus::Disposed
        )
    }
}

impl fmt::Display for WasteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WasteStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WasteStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "waste status",
                value: s.to_string(),
            })
    }
}

/// Waste classification chosen at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WasteType {
    Recyclable,
    Hazardous,
    Organic,
    Electronic,
    Medical,
    Other,
}

impl WasteType {
    pub const ALL: [WasteType; 6] = [
        WasteType::Recyclable,
        WasteType::Hazardous,
        WasteType::Organic,
        WasteType::Electronic,
        WasteType::Medical,
        WasteType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WasteType::Recyclable => "recyclable",
            WasteType::Hazardous => "hazardous",
            WasteType::Organic => "organic",
            WasteType::Electronic => "electronic",
            WasteType::Medical => "medical",
            WasteType::Other => "other",
        }
    }

    /// Generated item name shown on labels and dashboards.
    pub fn display_name(self) -> &'static str {
        match self {
            WasteType::Recyclable => "Recyclable Waste",
            WasteType::Hazardous => "Hazardous Waste",
            WasteType::Organic => "Organic Waste",
            WasteType::Electronic => "Electronic Waste",
            WasteType::Medical => "Medical Waste",
            WasteType::Other => "Other Waste",
        }
    }
}

impl fmt::Display for WasteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WasteType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WasteType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "waste type",
                value: s.to_string(),
            })
    }
}

/// A registered waste item as stored in the backend.
///
/// The record is a materialized view of the item's latest ledger entry plus
/// the sorting and confirmation fields that are not derived from status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasteItemRecord {
    pub item_id: String,
    pub item_name: String,
    pub waste_type: WasteType,
    pub weight: Option<f64>,
    pub description: Option<String>,
    pub status: WasteStatus,
    pub barangay_id: BarangayId,
    pub address: Option<String>,
    pub contact_person: Option<String>,
    pub contact_number: Option<String>,
    pub is_sorted: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub sorted_at: Option<OffsetDateTime>,
    pub sorted_by: Option<ActorId>,
    pub client_confirmed: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub confirmed_at: Option<OffsetDateTime>,
    /// Historical items may have no recorded creator.
    pub created_by: Option<ActorId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// OCC token. Starts at 0 and increments on every committed update.
    pub version: i64,
}

/// A ledger entry about to be appended. The backend assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrackingRecord {
    pub item_id: String,
    pub status: WasteStatus,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub notes: Option<String>,
    pub updated_by: Option<ActorId>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub id: i64,
    pub item_id: String,
    pub status: WasteStatus,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub notes: Option<String>,
    pub updated_by: Option<ActorId>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl TrackingRecord {
    pub fn from_new(id: i64, record: NewTrackingRecord) -> Self {
        Self {
            id,
            item_id: record.item_id,
            status: record.status,
            location: record.location,
            latitude: record.latitude,
            longitude: record.longitude,
            notes: record.notes,
            updated_by: record.updated_by,
            timestamp: record.timestamp,
        }
    }

    /// Coordinates, when both axes were stored.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

/// Barangay reference data. Owned by the reference-data subsystem; the
/// tracking core only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarangayRecord {
    pub id: BarangayId,
    pub name: String,
    pub code: String,
    pub municipality: String,
    pub province: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// A collector account with its last known device position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorRecord {
    pub id: ActorId,
    pub username: String,
    pub full_name: String,
    pub barangay_id: Option<BarangayId>,
    #[serde(default)]
    pub last_latitude: Option<f64>,
    #[serde(default)]
    pub last_longitude: Option<f64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
}

/// Filters pushed down to `list_items`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub barangay_id: Option<BarangayId>,
    pub status: Option<WasteStatus>,
    /// Maximum number of results (0 = no limit).
    pub limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in WasteStatus::ALL {
            assert_eq!(status.as_str().parse::<WasteStatus>(), Ok(status));
        }
        let err = "lost".parse::<WasteStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown waste status: 'lost'");
    }

    #[test]
    fn downstream_statuses() {
        assert!(!WasteStatus::NotCollected.is_downstream());
        assert!(!WasteStatus::PendingCollection.is_downstream());
        assert!(WasteStatus::Collected.is_downstream());
        assert!(WasteStatus::Disposed.is_downstream());
    }

    #[test]
    fn waste_type_display_names() {
        assert_eq!(WasteType::Hazardous.display_name(), "Hazardous Waste");
        assert_eq!("medical".parse::<WasteType>(), Ok(WasteType::Medical));
        assert!("plastic".parse::<WasteType>().is_err());
    }

    #[test]
    fn tracking_coordinates_require_both_axes() {
        let mut record = TrackingRecord {
            id: 1,
            item_id: "WM1".to_string(),
            status: WasteStatus::Collected,
            location: None,
            latitude: Some(13.1),
            longitude: None,
            notes: None,
            updated_by: None,
            timestamp: OffsetDateTime::UNIX_EPOCH,
        };
        assert_eq!(record.coordinates(), None);
        record.longitude = Some(123.1);
        assert_eq!(record.coordinates(), Some((13.1, 123.1)));
    }
}
