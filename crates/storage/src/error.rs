/// All errors that can be returned by a TrackingStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency control conflict: another snapshot modified
    /// the item concurrently. The expected version was not found.
    #[error("concurrent conflict on item {item_id}: expected version {expected_version}")]
    ConcurrentConflict {
        item_id: String,
        expected_version: i64,
    },

    /// No item with the given identifier.
    #[error("waste item not found: {item_id}")]
    ItemNotFound { item_id: String },

    /// An item with this identifier already exists.
    #[error("waste item already exists: {item_id}")]
    ItemAlreadyExists { item_id: String },

    #[error("barangay not found: {barangay_id}")]
    BarangayNotFound { barangay_id: i64 },

    #[error("collector not found: {collector_id}")]
    CollectorNotFound { collector_id: i64 },

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A stored enum column held a value outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}
