//! Application state shared across request handlers.

use wastetrack_core::TrackingService;
use wastetrack_storage::MemoryStorage;

pub(crate) struct AppState {
    pub(crate) service: TrackingService<MemoryStorage>,
    /// Optional API key for authentication. None = no auth required.
    pub(crate) api_key: Option<String>,
}
