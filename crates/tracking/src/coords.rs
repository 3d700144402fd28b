//! Coordinate normalization for device GPS readings.
//!
//! Mobile browsers submit latitude/longitude as loose strings, sometimes
//! with the axes exchanged and sometimes as garbage. [`normalize`] is the one
//! function every call site (collection, status updates, the tracking API,
//! collector pings) runs those readings through.

use serde::Serialize;

use crate::config::BoundingBox;

/// Tag text appended to ledger notes when a reading had to be repaired or
/// discarded.
const SWAPPED_TAG: &str = "[COORD_ISSUE: swapped]";
const DROPPED_TAG: &str = "[COORD_ISSUE: dropped]";

/// A raw reading as submitted, before any parsing.
///
/// Device fields, when both are present and non-empty, override the generic
/// pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCoordinates {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub device_latitude: Option<String>,
    pub device_longitude: Option<String>,
}

impl RawCoordinates {
    /// A generic pair from already-typed values.
    pub fn pair(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude.to_string()),
            longitude: Some(longitude.to_string()),
            ..Self::default()
        }
    }

    fn selected(&self) -> (Option<&str>, Option<&str>) {
        let device_lat = non_empty(&self.device_latitude);
        let device_lon = non_empty(&self.device_longitude);
        if device_lat.is_some() && device_lon.is_some() {
            return (device_lat, device_lon);
        }
        (non_empty(&self.latitude), non_empty(&self.longitude))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateIssue {
    Swapped,
    Dropped,
}

impl CoordinateIssue {
    pub fn tag(self) -> &'static str {
        match self {
            CoordinateIssue::Swapped => SWAPPED_TAG,
            CoordinateIssue::Dropped => DROPPED_TAG,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            CoordinateIssue::Swapped => "Device coordinates looked swapped and were corrected",
            CoordinateIssue::Dropped => "Device coordinates were invalid and were not stored",
        }
    }
}

/// Data-quality notice attached to an otherwise successful operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoordinateWarning {
    pub issue: CoordinateIssue,
    pub message: &'static str,
}

impl From<CoordinateIssue> for CoordinateWarning {
    fn from(issue: CoordinateIssue) -> Self {
        Self {
            issue,
            message: issue.message(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinateOutcome {
    /// Nothing was submitted.
    Absent,
    /// Stored as submitted. `in_region` is a plausibility hint only.
    Valid {
        latitude: f64,
        longitude: f64,
        in_region: bool,
    },
    /// Axes were exchanged; the fields hold the corrected pair.
    Swapped { latitude: f64, longitude: f64 },
    /// Unparsable, partial, or out of range even after swapping.
    Dropped,
}

impl CoordinateOutcome {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match *self {
            CoordinateOutcome::Valid {
                latitude,
                longitude,
                ..
            }
            | CoordinateOutcome::Swapped {
                latitude,
                longitude,
            } => Some((latitude, longitude)),
            CoordinateOutcome::Absent | CoordinateOutcome::Dropped => None,
        }
    }

    pub fn issue(&self) -> Option<CoordinateIssue> {
        match self {
            CoordinateOutcome::Swapped { .. } => Some(CoordinateIssue::Swapped),
            CoordinateOutcome::Dropped => Some(CoordinateIssue::Dropped),
            CoordinateOutcome::Absent | CoordinateOutcome::Valid { .. } => None,
        }
    }

    pub fn warning(&self) -> Option<CoordinateWarning> {
        self.issue().map(CoordinateWarning::from)
    }

    /// Append this outcome's tag, if any, to a ledger note.
    pub fn tag_notes(&self, notes: Option<String>) -> Option<String> {
        let Some(issue) = self.issue() else {
            return notes;
        };
        match notes.filter(|n| !n.trim().is_empty()) {
            Some(n) => Some(format!("{} {}", n.trim_end(), issue.tag())),
            None => Some(issue.tag().to_string()),
        }
    }
}

fn in_range(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}

fn parse_axis(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Validate and repair a raw reading.
///
/// Already-valid pairs come back unchanged, so normalizing twice is a no-op.
pub fn normalize(raw: &RawCoordinates, region: &BoundingBox) -> CoordinateOutcome {
    let (lat, lon) = match raw.selected() {
        (None, None) => return CoordinateOutcome::Absent,
        (Some(lat), Some(lon)) => (parse_axis(lat), parse_axis(lon)),
        _ => return CoordinateOutcome::Dropped,
    };
    let (Some(latitude), Some(longitude)) = (lat, lon) else {
        return CoordinateOutcome::Dropped;
    };

    if in_range(latitude, longitude) {
        CoordinateOutcome::Valid {
            latitude,
            longitude,
            in_region: region.contains(latitude, longitude),
        }
    } else if in_range(longitude, latitude) {
        CoordinateOutcome::Swapped {
            latitude: longitude,
            longitude: latitude,
        }
    } else {
        CoordinateOutcome::Dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> BoundingBox {
        BoundingBox::default()
    }

    fn raw(lat: &str, lon: &str) -> RawCoordinates {
        RawCoordinates {
            latitude: Some(lat.to_string()),
            longitude: Some(lon.to_string()),
            ..RawCoordinates::default()
        }
    }

    #[test]
    fn valid_pair_is_stored_as_is() {
        let out = normalize(&raw("13.4295", "123.2532"), &region());
        assert_eq!(
            out,
            CoordinateOutcome::Valid {
                latitude: 13.4295,
                longitude: 123.2532,
                in_region: true
            }
        );
        assert_eq!(out.tag_notes(Some("picked up".into())), Some("picked up".into()));
        assert!(out.warning().is_none());
    }

    #[test]
    fn outside_region_is_not_rejected() {
        let out = normalize(&raw("13.77", "123.88"), &region());
        assert_eq!(out.coordinates(), Some((13.77, 123.88)));
        assert!(matches!(out, CoordinateOutcome::Valid { in_region: false, .. }));
    }

    #[test]
    fn normalizing_valid_output_is_idempotent() {
        for (lat, lon) in [(13.3, 123.3), (-45.0, 170.0), (90.0, -180.0), (0.0, 0.0)] {
            let first = normalize(&RawCoordinates::pair(lat, lon), &region());
            let (a, b) = first.coordinates().unwrap();
            let second = normalize(&RawCoordinates::pair(a, b), &region());
            assert_eq!(first, second);
            assert_eq!((a, b), (lat, lon));
        }
    }

    #[test]
    fn swapped_pair_is_corrected() {
        let out = normalize(&raw("123.1", "13.1"), &region());
        assert_eq!(
            out,
            CoordinateOutcome::Swapped {
                latitude: 13.1,
                longitude: 123.1
            }
        );
        assert_eq!(out.issue(), Some(CoordinateIssue::Swapped));
        assert_eq!(
            out.tag_notes(Some("Collected".into())).as_deref(),
            Some("Collected [COORD_ISSUE: swapped]")
        );
        assert_eq!(
            out.warning().unwrap().message,
            "Device coordinates looked swapped and were corrected"
        );
    }

    #[test]
    fn out_of_range_pair_is_dropped() {
        let out = normalize(&raw("999", "999"), &region());
        assert_eq!(out, CoordinateOutcome::Dropped);
        assert_eq!(out.coordinates(), None);
        assert_eq!(out.tag_notes(None).as_deref(), Some("[COORD_ISSUE: dropped]"));
    }

    #[test]
    fn garbage_and_partial_input_is_dropped() {
        assert_eq!(normalize(&raw("abc", "123.2"), &region()), CoordinateOutcome::Dropped);
        assert_eq!(normalize(&raw("NaN", "123.2"), &region()), CoordinateOutcome::Dropped);
        assert_eq!(normalize(&raw("13.2", ""), &region()), CoordinateOutcome::Dropped);
    }

    #[test]
    fn blank_input_is_absent() {
        assert_eq!(
            normalize(&RawCoordinates::default(), &region()),
            CoordinateOutcome::Absent
        );
        assert_eq!(normalize(&raw(" ", ""), &region()), CoordinateOutcome::Absent);
        assert_eq!(CoordinateOutcome::Absent.tag_notes(None), None);
    }

    #[test]
    fn device_pair_takes_precedence() {
        let mut input = raw("13.20", "123.20");
        input.device_latitude = Some("13.77".into());
        input.device_longitude = Some("123.88".into());
        assert_eq!(normalize(&input, &region()).coordinates(), Some((13.77, 123.88)));

        // A half-filled device pair does not override the generic one.
        input.device_longitude = Some(String::new());
        assert_eq!(normalize(&input, &region()).coordinates(), Some((13.20, 123.20)));
    }
}
