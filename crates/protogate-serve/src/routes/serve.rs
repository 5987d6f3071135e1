//! Artifact serving handlers.

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::dispatch::dispatch;
use crate::error::GatewayError;
use crate::state::AppState;

/// `GET {prefix}/{prototyper_id}/{prototype_id}[/]`
pub async fn serve_root(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let Path((prototyper_id, prototype_id)) = path.map_err(rejected_path)?;
    dispatch(
        &state,
        &prototyper_id,
        &prototype_id,
        "",
        if_none_match(&headers),
    )
    .await
}

/// `GET {prefix}/{prototyper_id}/{prototype_id}/{*path}`
pub async fn serve_path(
    State(state): State<AppState>,
    path: Result<Path<(String, String, String)>, PathRejection>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let Path((prototyper_id, prototype_id, path)) = path.map_err(rejected_path)?;
    dispatch(
        &state,
        &prototyper_id,
        &prototype_id,
        &path,
        if_none_match(&headers),
    )
    .await
}

/// Undecodable path segments (bad percent-encoding, invalid UTF-8) become
/// the gateway's JSON error instead of axum's plain-text rejection.
fn rejected_path(rejection: PathRejection) -> GatewayError {
    GatewayError::InvalidPath(rejection.body_text())
}

/// Answer a CORS preflight without touching the artifact.
pub async fn preflight() -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    (StatusCode::NO_CONTENT, headers).into_response()
}

fn if_none_match(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
}
