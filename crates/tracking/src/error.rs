use serde::Serialize;
use wastetrack_storage::StorageError;

/// Coarse classification of a [`TrackingError`], used by callers that map
/// failures onto transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    State,
    Permission,
    NotFound,
    Conflict,
    Storage,
}

/// Errors returned by lifecycle, presence, and query operations.
///
/// Every variant is per-request: the item is left in its prior state and
/// nothing was appended to the ledger.
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    /// Missing or malformed input. The caller must correct it and retry.
    #[error("{0}")]
    Validation(String),

    /// A lifecycle guard rejected the operation (e.g. collecting unsorted waste).
    #[error("{0}")]
    State(String),

    /// The actor's role does not allow this operation on this item or barangay.
    #[error("{0}")]
    Permission(String),

    #[error("{0}")]
    NotFound(String),

    /// The operation lost a race or could not allocate a unique identifier.
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TrackingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackingError::Validation(_) => ErrorKind::Validation,
            TrackingError::State(_) => ErrorKind::State,
            TrackingError::Permission(_) => ErrorKind::Permission,
            TrackingError::NotFound(_) => ErrorKind::NotFound,
            TrackingError::Conflict(_) => ErrorKind::Conflict,
            TrackingError::Storage(e) => match e {
                StorageError::ItemNotFound { .. }
                | StorageError::BarangayNotFound { .. }
                | StorageError::CollectorNotFound { .. } => ErrorKind::NotFound,
                StorageError::ConcurrentConflict { .. }
                | StorageError::ItemAlreadyExists { .. } => ErrorKind::Conflict,
                StorageError::Backend(_) => ErrorKind::Storage,
            },
        }
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        TrackingError::State(msg.into())
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        TrackingError::Validation(msg.into())
    }

    pub(crate) fn permission(msg: impl Into<String>) -> Self {
        TrackingError::Permission(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_to_kinds() {
        let not_found: TrackingError = StorageError::ItemNotFound {
            item_id: "WM1".into(),
        }
        .into();
        assert_eq!(not_found.kind(), ErrorKind::NotFound);

        let conflict: TrackingError = StorageError::ConcurrentConflict {
            item_id: "WM1".into(),
            expected_version: 3,
        }
        .into();
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        assert_eq!(
            conflict.to_string(),
            "concurrent conflict on item WM1: expected version 3"
        );

        let backend: TrackingError = StorageError::Backend("disk full".into()).into();
        assert_eq!(backend.kind(), ErrorKind::Storage);
    }
}
