//! HTTP middleware and extractors: API key authentication and the acting user.

use std::sync::Arc;

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use wastetrack_core::{Actor, Role};

use super::json_error;
use super::state::AppState;

/// API key authentication middleware.
///
/// If `WASTETRACK_API_KEY` is set, all requests (except /health) must include
/// either `Authorization: Bearer <key>` or `X-API-Key: <key>`.
pub(crate) async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let expected_key = match &state.api_key {
        Some(k) => k,
        None => return next.run(request).await,
    };

    // /health is exempt from auth (for load balancer health checks)
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let bearer = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "));
    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    match bearer.or(header_key) {
        Some(key) if key == expected_key => next.run(request).await,
        Some(_) => json_error(StatusCode::FORBIDDEN, "invalid API key"),
        None => json_error(StatusCode::UNAUTHORIZED, "authentication required"),
    }
}

/// The authenticated user, as resolved by the upstream session layer.
pub(crate) struct CurrentActor(pub(crate) Actor);

impl<S: Send + Sync> FromRequestParts<S> for CurrentActor {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers).map(CurrentActor)
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Response> {
    let id = header(headers, "x-actor-id");
    let role = header(headers, "x-actor-role");
    let (Some(id), Some(role)) = (id, role) else {
        return Err(json_error(
            StatusCode::UNAUTHORIZED,
            "X-Actor-Id and X-Actor-Role headers are required",
        ));
    };
    let id = id
        .parse::<i64>()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "X-Actor-Id must be an integer"))?;
    let role = role
        .parse::<Role>()
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, &e.to_string()))?;
    let barangay_id = header(headers, "x-actor-barangay")
        .map(|b| {
            b.parse::<i64>().map_err(|_| {
                json_error(StatusCode::BAD_REQUEST, "X-Actor-Barangay must be an integer")
            })
        })
        .transpose()?;

    if role == Role::Barangay && barangay_id.is_none() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "barangay accounts require X-Actor-Barangay",
        ));
    }
    Ok(Actor {
        id,
        role,
        barangay_id,
    })
}
