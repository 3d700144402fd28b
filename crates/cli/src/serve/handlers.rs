//! HTTP route handlers. Each handler resolves the actor, calls exactly one
//! service operation, and serializes its outcome.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::macros::format_description;
use time::Date;
use wastetrack_core::{
    AdvanceRequest, ItemQuery, NewWasteItem, PingOutcome, RawCoordinates, TransitionOutcome,
};
use wastetrack_storage::WasteStatus;

use super::middleware::CurrentActor;
use super::state::AppState;
use super::{json_error, tracking_error};

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

// ── Request bodies ──────────────────────────────────────────────────────────

/// Coordinate fields as browsers send them: numbers, numeric strings, or
/// empty strings.
#[derive(Debug, Default, Deserialize)]
struct CoordinateFields {
    #[serde(default)]
    latitude: Option<Value>,
    #[serde(default)]
    longitude: Option<Value>,
    #[serde(default)]
    device_latitude: Option<Value>,
    #[serde(default)]
    device_longitude: Option<Value>,
}

fn loose(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl From<CoordinateFields> for RawCoordinates {
    fn from(f: CoordinateFields) -> Self {
        RawCoordinates {
            latitude: loose(f.latitude),
            longitude: loose(f.longitude),
            device_latitude: loose(f.device_latitude),
            device_longitude: loose(f.device_longitude),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterBody {
    waste_type: Option<String>,
    barangay_id: Option<i64>,
    #[serde(default)]
    is_sorted: bool,
    address: Option<String>,
    contact_person: Option<String>,
    contact_number: Option<String>,
    weight: Option<f64>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CollectBody {
    #[serde(flatten)]
    coordinates: CoordinateFields,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusBody {
    status: String,
    location: Option<String>,
    notes: Option<String>,
    #[serde(flatten)]
    coordinates: CoordinateFields,
}

impl From<StatusBody> for AdvanceRequest {
    fn from(body: StatusBody) -> Self {
        AdvanceRequest {
            status: body.status,
            location: body.location,
            notes: body.notes,
            coordinates: body.coordinates.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrackBody {
    item_id: String,
    #[serde(flatten)]
    update: StatusBody,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListParams {
    barangay_id: Option<i64>,
    status: Option<String>,
    /// Creation day, `YYYY-MM-DD` in the municipality's local zone.
    date: Option<String>,
    #[serde(default)]
    limit: usize,
}

impl ListParams {
    fn into_query(self) -> Result<ItemQuery, Response> {
        let status = self
            .status
            .map(|s| s.parse::<WasteStatus>())
            .transpose()
            .map_err(|e| json_error(StatusCode::BAD_REQUEST, &e.to_string()))?;
        let created_on = self
            .date
            .map(|d| Date::parse(&d, format_description!("[year]-[month]-[day]")))
            .transpose()
            .map_err(|_| json_error(StatusCode::BAD_REQUEST, "date must be YYYY-MM-DD"))?;
        Ok(ItemQuery {
            barangay_id: self.barangay_id,
            status,
            created_on,
            limit: self.limit,
        })
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, &e.body_text()))
}

fn json_ok<T: Serialize>(body: T) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

fn transition_response(outcome: TransitionOutcome) -> Response {
    json_ok(outcome)
}

// ── Items ───────────────────────────────────────────────────────────────────

/// POST /api/items
pub(crate) async fn handle_register(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    payload: Result<Json<RegisterBody>, JsonRejection>,
) -> Response {
    let b = match body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let input = NewWasteItem {
        waste_type: b.waste_type,
        barangay_id: b.barangay_id,
        is_sorted: b.is_sorted,
        address: b.address,
        contact_person: b.contact_person,
        contact_number: b.contact_number,
        weight: b.weight,
        description: b.description,
    };
    match state.service.register(input, &actor).await {
        Ok(outcome) => {
            let response = serde_json::json!({
                "item_id": outcome.item.item_id,
                "item": outcome.item,
                "record": outcome.record,
            });
            (StatusCode::CREATED, Json(response)).into_response()
        }
        Err(e) => tracking_error(e),
    }
}

/// GET /api/items
pub(crate) async fn handle_list_items(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Response {
    let query = match params
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, &e.body_text()))
        .and_then(|Query(p)| p.into_query())
    {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    match state.service.list_items(&query, &actor).await {
        Ok(items) => json_ok(serde_json::json!({ "items": items })),
        Err(e) => tracking_error(e),
    }
}

/// GET /api/items/{item_id}
pub(crate) async fn handle_get_item(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(item_id): Path<String>,
) -> Response {
    match state.service.get_item(&item_id, &actor).await {
        Ok(item) => json_ok(item),
        Err(e) => tracking_error(e),
    }
}

/// GET /api/items/{item_id}/history
pub(crate) async fn handle_history(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(item_id): Path<String>,
) -> Response {
    match state.service.history(&item_id, &actor).await {
        Ok(records) => json_ok(serde_json::json!({ "history": records })),
        Err(e) => tracking_error(e),
    }
}

/// POST /api/items/{item_id}/sort
pub(crate) async fn handle_mark_sorted(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(item_id): Path<String>,
) -> Response {
    match state.service.mark_sorted(&item_id, &actor).await {
        Ok(outcome) => transition_response(outcome),
        Err(e) => tracking_error(e),
    }
}

/// POST /api/items/{item_id}/unsort
pub(crate) async fn handle_mark_unsorted(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(item_id): Path<String>,
) -> Response {
    match state.service.mark_unsorted(&item_id, &actor).await {
        Ok(outcome) => transition_response(outcome),
        Err(e) => tracking_error(e),
    }
}

/// POST /api/items/{item_id}/collect
///
/// The body is optional; an empty body collects without coordinates.
pub(crate) async fn handle_mark_collected(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(item_id): Path<String>,
    payload: Option<Json<CollectBody>>,
) -> Response {
    let coordinates: RawCoordinates = payload
        .map(|Json(b)| b.coordinates)
        .unwrap_or_default()
        .into();
    match state
        .service
        .mark_collected(&item_id, &coordinates, &actor)
        .await
    {
        Ok(outcome) => transition_response(outcome),
        Err(e) => tracking_error(e),
    }
}

/// POST /api/items/{item_id}/confirm
pub(crate) async fn handle_confirm(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(item_id): Path<String>,
) -> Response {
    match state.service.confirm_collection(&item_id, &actor).await {
        Ok(outcome) => transition_response(outcome),
        Err(e) => tracking_error(e),
    }
}

/// POST /api/items/{item_id}/status
pub(crate) async fn handle_advance_status(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(item_id): Path<String>,
    payload: Result<Json<StatusBody>, JsonRejection>,
) -> Response {
    let request: AdvanceRequest = match body(payload) {
        Ok(b) => b.into(),
        Err(resp) => return resp,
    };
    match state
        .service
        .advance_status(&item_id, &request, &actor)
        .await
    {
        Ok(outcome) => transition_response(outcome),
        Err(e) => tracking_error(e),
    }
}

/// POST /api/waste/track
///
/// Machine-to-machine variant of the status update. Responds with
/// `{success, status, warning?}`.
pub(crate) async fn handle_track(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    payload: Result<Json<TrackBody>, JsonRejection>,
) -> Response {
    let b = match body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let request: AdvanceRequest = b.update.into();
    match state
        .service
        .advance_status(&b.item_id, &request, &actor)
        .await
    {
        Ok(outcome) => {
            let mut response = serde_json::json!({
                "success": true,
                "item_id": outcome.item.item_id,
                "status": outcome.item.status,
            });
            if let Some(w) = outcome.warning {
                response["warning"] = Value::String(w.message.to_string());
            }
            json_ok(response)
        }
        Err(e) => tracking_error(e),
    }
}

// ── Presence ────────────────────────────────────────────────────────────────

/// POST /api/collectors/ping
///
/// A ping with unusable coordinates is answered with 422 and stores nothing.
pub(crate) async fn handle_collector_ping(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    payload: Result<Json<CollectBody>, JsonRejection>,
) -> Response {
    let coordinates: RawCoordinates = match body(payload) {
        Ok(b) => b.coordinates.into(),
        Err(resp) => return resp,
    };
    match state.service.ping(&actor, &coordinates).await {
        Ok(outcome) => {
            let status = match outcome {
                PingOutcome::Accepted { .. } => StatusCode::OK,
                PingOutcome::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            };
            (status, Json(outcome)).into_response()
        }
        Err(e) => tracking_error(e),
    }
}

/// GET /api/barangays/{barangay_id}/collectors
pub(crate) async fn handle_barangay_collectors(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(barangay_id): Path<i64>,
) -> Response {
    match state
        .service
        .presence_for_barangay(barangay_id, &actor)
        .await
    {
        Ok(entries) => json_ok(serde_json::json!({ "collectors": entries })),
        Err(e) => tracking_error(e),
    }
}

// ── Dashboards ──────────────────────────────────────────────────────────────

/// GET /api/barangays/stats
pub(crate) async fn handle_barangay_stats(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> Response {
    match state.service.barangay_stats(&actor).await {
        Ok(stats) => json_ok(serde_json::json!({ "barangays": stats })),
        Err(e) => tracking_error(e),
    }
}

/// GET /api/locations
pub(crate) async fn handle_locations(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> Response {
    match state.service.locations_feed(&actor).await {
        Ok(items) => json_ok(serde_json::json!({ "items": items })),
        Err(e) => tracking_error(e),
    }
}

/// GET /api/dashboard
pub(crate) async fn handle_dashboard(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> Response {
    match state.service.dashboard_summary(&actor).await {
        Ok(summary) => json_ok(summary),
        Err(e) => tracking_error(e),
    }
}

/// GET /api/queue
pub(crate) async fn handle_pending_queue(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> Response {
    match state.service.pending_queue(&actor).await {
        Ok(queue) => json_ok(serde_json::json!({ "queue": queue })),
        Err(e) => tracking_error(e),
    }
}
