//! Waste-item lifecycle and tracking.
//!
//! [`TrackingService`] is the single entry point: it owns a
//! [`TrackingStorage`](wastetrack_storage::TrackingStorage) backend, the
//! [`TrackingConfig`], and a [`Clock`], and exposes every lifecycle
//! transition, ledger read, presence update, and dashboard query. Each
//! transition runs in one storage snapshot and appends exactly one ledger
//! entry alongside the item mutation.

pub mod actor;
pub mod clock;
pub mod config;
pub mod coords;
pub mod error;
pub mod item_id;
pub mod ledger;
pub mod lifecycle;
pub mod presence;
pub mod query;

pub use actor::{authorize, Actor, Capability, Role};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{BoundingBox, ConfigError, CoverageConfig, PresenceConfig, TrackingConfig};
pub use coords::{normalize, CoordinateIssue, CoordinateOutcome, CoordinateWarning, RawCoordinates};
pub use error::{ErrorKind, TrackingError};
pub use lifecycle::{AdvanceRequest, NewWasteItem, TrackingService, TransitionOutcome};
pub use presence::{PingOutcome, PresenceEntry, Recency};
pub use query::{
    BarangayStats, DashboardSummary, ItemQuery, LocationEntry, QueueEntry, StatusCounts,
};

pub use wastetrack_storage as storage;
