mod error;
mod memory;
mod record;
mod traits;

pub mod conformance;

pub use error::{ParseEnumError, StorageError};
pub use memory::{MemorySnapshot, MemoryStorage};
pub use record::{
    ActorId, BarangayId, BarangayRecord, CollectorRecord, ItemFilter, NewTrackingRecord,
    TrackingRecord, WasteItemRecord, WasteStatus, WasteType,
};
pub use traits::TrackingStorage;
