//! HTTP route definitions.

mod health;
mod serve;

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::middleware;
use axum::response::Response;
use axum::routing::get;

use crate::state::AppState;

/// Build the complete router.
///
/// # Route Structure
///
/// - `GET /health` - Health check
/// - `GET|OPTIONS {prefix}/{prototyper_id}/{prototype_id}` - Artifact root
/// - `GET|OPTIONS {prefix}/{prototyper_id}/{prototype_id}/` - Artifact root
/// - `GET|OPTIONS {prefix}/{prototyper_id}/{prototype_id}/{*path}` - Artifact member
///
/// `{prefix}` comes from [`Config::serve_prefix`](crate::Config::serve_prefix).
pub fn router(state: AppState) -> Router {
    let prefix = state.config.serve_prefix.clone();
    let root = format!("{prefix}/{{prototyper_id}}/{{prototype_id}}");

    Router::new()
        .route("/health", get(health::health_check))
        .route(&root, get(serve::serve_root).options(serve::preflight))
        .route(
            &format!("{root}/"),
            get(serve::serve_root).options(serve::preflight),
        )
        .route(
            &format!("{root}/{{*path}}"),
            get(serve::serve_path).options(serve::preflight),
        )
        .layer(middleware::map_response(add_cors_headers))
        .with_state(state)
}

/// Allow any origin on every response.
///
/// Artifacts render inside sandboxed iframes whose origin is `null`, which
/// no allow-list can match.
async fn add_cors_headers(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}
