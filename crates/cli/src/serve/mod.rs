//! `wastetrack serve` -- HTTP JSON API over the tracking service.
//!
//! Exposes every lifecycle, presence, and query operation as an async HTTP
//! service using `axum` + `tokio`, backed by the in-memory store seeded from
//! the configuration file.
//!
//! The acting user is resolved upstream and handed in through the
//! `X-Actor-Id`, `X-Actor-Role`, and `X-Actor-Barangay` headers.
//! If `WASTETRACK_API_KEY` is set, every route except /health also requires
//! the key.
//!
//! Endpoints:
//! - GET  /health                          - Server status (exempt from auth)
//! - POST /api/items                       - Register a waste item
//! - GET  /api/items                       - List items (barangay_id, status, date, limit)
//! - GET  /api/items/{item_id}             - Item lookup
//! - GET  /api/items/{item_id}/history     - Ledger, most recent first
//! - POST /api/items/{item_id}/sort        - Mark sorted
//! - POST /api/items/{item_id}/unsort      - Mark unsorted
//! - POST /api/items/{item_id}/collect     - Mark collected (optional coordinates)
//! - POST /api/items/{item_id}/confirm     - Client confirmation
//! - POST /api/items/{item_id}/status      - Generic status update
//! - POST /api/waste/track                 - Machine-to-machine status update
//! - POST /api/collectors/ping             - Collector presence ping
//! - GET  /api/barangays/{id}/collectors   - Collector presence for a barangay
//! - GET  /api/barangays/stats             - Per-barangay status counts
//! - GET  /api/locations                   - Live-tracking map feed
//! - GET  /api/dashboard                   - Dashboard summary
//! - GET  /api/queue                       - Pending collection queue
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod middleware;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use wastetrack_core::{ErrorKind, TrackingConfig, TrackingError, TrackingService};
use wastetrack_storage::MemoryStorage;

use self::handlers::{
    handle_advance_status, handle_barangay_collectors, handle_barangay_stats,
    handle_collector_ping, handle_confirm, handle_dashboard, handle_get_item, handle_health,
    handle_history, handle_list_items, handle_locations, handle_mark_collected,
    handle_mark_sorted, handle_mark_unsorted, handle_not_found, handle_pending_queue,
    handle_register, handle_track,
};
use self::middleware::auth_middleware;
use self::state::AppState;

/// Maximum request body size: 64 KB.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({"error": message}))).into_response()
}

/// Map a tracking failure onto an HTTP status and JSON body.
fn tracking_error(err: TrackingError) -> Response {
    let kind = err.kind();
    let status = match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::State | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Permission => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Storage => {
            tracing::error!(error = %err, "storage failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(serde_json::json!({"error": err.to_string(), "kind": kind})),
    )
        .into_response()
}

/// Build the router over shared application state.
pub(crate) fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/items", post(handle_register).get(handle_list_items))
        .route("/api/items/{item_id}", get(handle_get_item))
        .route("/api/items/{item_id}/history", get(handle_history))
        .route("/api/items/{item_id}/sort", post(handle_mark_sorted))
        .route("/api/items/{item_id}/unsort", post(handle_mark_unsorted))
        .route("/api/items/{item_id}/collect", post(handle_mark_collected))
        .route("/api/items/{item_id}/confirm", post(handle_confirm))
        .route("/api/items/{item_id}/status", post(handle_advance_status))
        .route("/api/waste/track", post(handle_track))
        .route("/api/collectors/ping", post(handle_collector_ping))
        .route("/api/barangays/stats", get(handle_barangay_stats))
        .route(
            "/api/barangays/{barangay_id}/collectors",
            get(handle_barangay_collectors),
        )
        .route("/api/locations", get(handle_locations))
        .route("/api/dashboard", get(handle_dashboard))
        .route("/api/queue", get(handle_pending_queue))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server on the given port.
///
/// When TLS cert/key paths are provided, the server listens over HTTPS
/// using `axum-server` with rustls. Otherwise it uses plain HTTP.
pub async fn start_server(
    port: u16,
    config: TrackingConfig,
    _tls_cert: Option<PathBuf>,
    _tls_key: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = TrackingService::new(MemoryStorage::new(), config);
    service.seed_reference_data().await?;

    // API key: from WASTETRACK_API_KEY env var (None = no auth)
    let api_key = std::env::var("WASTETRACK_API_KEY")
        .ok()
        .filter(|k| !k.is_empty());
    if api_key.is_some() {
        tracing::info!("API key authentication enabled");
    }

    let state = Arc::new(AppState { service, api_key });
    let app = router(state);
    let addr = format!("0.0.0.0:{}", port);

    // TLS support via axum-server + rustls (requires `tls` feature)
    #[cfg(feature = "tls")]
    if let (Some(cert_path), Some(key_path)) = (&_tls_cert, &_tls_key) {
        let config =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
        let socket_addr: std::net::SocketAddr = addr.parse()?;
        tracing::info!("wastetrack listening on https://0.0.0.0:{}", port);
        axum_server::bind_rustls(socket_addr, config)
            .serve(app.into_make_service())
            .await?;
        return Ok(());
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("wastetrack listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
