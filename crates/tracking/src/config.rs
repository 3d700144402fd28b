//! Service configuration, loaded from TOML.
//!
//! ```toml
//! timezone_offset_hours = 8
//! item_id_prefix = "WM"
//!
//! [coverage]
//! municipality = "Nabua"
//! province = "Camarines Sur"
//!
//! [coverage.bbox]
//! min_lat = 13.15
//! max_lat = 13.45
//! min_lon = 123.15
//! max_lon = 123.45
//!
//! [[barangays]]
//! id = 1
//! name = "San Roque"
//! code = "NAB-SR"
//! municipality = "Nabua"
//! province = "Camarines Sur"
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::UtcOffset;
use wastetrack_storage::{BarangayRecord, CollectorRecord};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub coverage: CoverageConfig,
    /// Local zone of the municipality. Item identifiers and calendar-day
    /// filters use this offset.
    pub timezone_offset_hours: i8,
    pub presence: PresenceConfig,
    pub item_id_prefix: String,
    /// How many suffixed identifiers to try when the timestamp-derived one
    /// is already taken.
    pub max_id_attempts: u32,
    /// Reference data seeded into storage at startup.
    pub barangays: Vec<BarangayRecord>,
    pub collectors: Vec<CollectorRecord>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            coverage: CoverageConfig::default(),
            timezone_offset_hours: 8,
            presence: PresenceConfig::default(),
            item_id_prefix: "WM".to_string(),
            max_id_attempts: 10,
            barangays: Vec::new(),
            collectors: Vec::new(),
        }
    }
}

impl TrackingConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: TrackingConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-12..=14).contains(&self.timezone_offset_hours) {
            return Err(ConfigError::Invalid(format!(
                "timezone_offset_hours must be between -12 and 14, got {}",
                self.timezone_offset_hours
            )));
        }
        if self.item_id_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("item_id_prefix must not be empty".into()));
        }
        if self.max_id_attempts == 0 {
            return Err(ConfigError::Invalid("max_id_attempts must be at least 1".into()));
        }
        self.coverage.bbox.validate()?;
        if self.presence.live_secs >= self.presence.recent_secs {
            return Err(ConfigError::Invalid(format!(
                "presence.live_secs ({}) must be below presence.recent_secs ({})",
                self.presence.live_secs, self.presence.recent_secs
            )));
        }

        let mut seen = HashSet::new();
        for b in &self.barangays {
            if !seen.insert(b.id) {
                return Err(ConfigError::Invalid(format!("duplicate barangay id {}", b.id)));
            }
        }
        let mut seen_collectors = HashSet::new();
        for c in &self.collectors {
            if !seen_collectors.insert(c.id) {
                return Err(ConfigError::Invalid(format!("duplicate collector id {}", c.id)));
            }
            if let Some(b) = c.barangay_id {
                if !seen.contains(&b) {
                    return Err(ConfigError::Invalid(format!(
                        "collector {} is assigned to unknown barangay {b}",
                        c.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn utc_offset(&self) -> UtcOffset {
        UtcOffset::from_hms(self.timezone_offset_hours, 0, 0).unwrap_or(UtcOffset::UTC)
    }
}

/// The region whose data appears on the live-tracking map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub municipality: String,
    pub province: String,
    pub bbox: BoundingBox,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            municipality: "Nabua".to_string(),
            province: "Camarines Sur".to_string(),
            bbox: BoundingBox::default(),
        }
    }
}

impl CoverageConfig {
    /// Whether a barangay belongs to the configured municipality and province.
    pub fn covers(&self, barangay: &BarangayRecord) -> bool {
        let same = |a: &str, b: &str| a.trim().eq_ignore_ascii_case(b.trim());
        same(&barangay.municipality, &self.municipality)
            && barangay
                .province
                .as_deref()
                .is_some_and(|p| same(p, &self.province))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min_lat: 13.15,
            max_lat: 13.45,
            min_lon: 123.15,
            max_lon: 123.45,
        }
    }
}

impl BoundingBox {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&latitude)
            && (self.min_lon..=self.max_lon).contains(&longitude)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_lat >= self.max_lat || self.min_lon >= self.max_lon {
            return Err(ConfigError::Invalid(format!(
                "coverage.bbox is empty: lat {}..{}, lon {}..{}",
                self.min_lat, self.max_lat, self.min_lon, self.max_lon
            )));
        }
        Ok(())
    }
}

/// Thresholds, in seconds since last ping, for collector recency classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub live_secs: i64,
    pub recent_secs: i64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            live_secs: 120,
            recent_secs: 900,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = TrackingConfig::from_toml_str("").unwrap();
        assert_eq!(config, TrackingConfig::default());
        assert_eq!(config.utc_offset(), UtcOffset::from_hms(8, 0, 0).unwrap());
    }

    #[test]
    fn seed_tables_parse() {
        let config = TrackingConfig::from_toml_str(
            r#"
            timezone_offset_hours = 0

            [[barangays]]
            id = 1
            name = "San Roque"
            code = "NAB-SR"
            municipality = "Nabua"
            province = "Camarines Sur"

            [[collectors]]
            id = 10
            username = "team1"
            full_name = "Team One"
            barangay_id = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.timezone_offset_hours, 0);
        assert!(config.barangays[0].is_active);
        assert_eq!(config.collectors[0].last_seen, None);
    }

    #[test]
    fn rejects_collector_in_unknown_barangay() {
        let err = TrackingConfig::from_toml_str(
            r#"
            [[collectors]]
            id = 10
            username = "team1"
            full_name = "Team One"
            barangay_id = 4
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown barangay 4"), "{err}");
    }

    #[test]
    fn rejects_inverted_presence_thresholds() {
        let err = TrackingConfig::from_toml_str("[presence]\nlive_secs = 900\nrecent_secs = 60\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn coverage_matches_municipality_and_province() {
        let coverage = CoverageConfig::default();
        let mut barangay = BarangayRecord {
            id: 1,
            name: "San Roque".into(),
            code: "SR".into(),
            municipality: "nabua ".into(),
            province: Some("Camarines Sur".into()),
            is_active: true,
        };
        assert!(coverage.covers(&barangay));
        barangay.province = None;
        assert!(!coverage.covers(&barangay));
        barangay.province = Some("Camarines Sur".into());
        barangay.municipality = "Iriga".into();
        assert!(!coverage.covers(&barangay));
    }
}
