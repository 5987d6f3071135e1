//! Gateway error types and response formatting.
//!
//! Every failure is converted here into a status code and a JSON body. The
//! iframe embedding the artifact sees the JSON instead of a document; there
//! is no friendly error page.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use protogate_core::metrics::names;
use serde::Serialize;

/// Gateway error type that converts to appropriate HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A prototyper or prototype identifier is malformed.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The requested sub-path is absolute or attempts traversal.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// No artifact record exists for the identifiers.
    #[error("artifact not found: {0}")]
    NotFoundMetadata(String),

    /// The artifact record exists but has no source URL.
    #[error("no file configured for artifact {0}")]
    NoFileConfigured(String),

    /// The requested member (and its fallbacks) is not in the archive.
    #[error("member not found: {0}")]
    MemberNotFound(String),

    /// The artifact source could not be downloaded.
    #[error("upstream fetch failed: {0}")]
    UpstreamFetchFailed(String),

    /// Transpiling, extracting, or rewriting the artifact failed.
    #[error("transform failed: {0}")]
    TransformFailure(String),

    /// Any other unexpected failure (store lookup, task join, etc.).
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Machine-readable error code used in the JSON body and in metrics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::InvalidPath(_) => "invalid_path",
            Self::NotFoundMetadata(_) => "not_found",
            Self::NoFileConfigured(_) => "no_file_configured",
            Self::MemberNotFound(_) => "member_not_found",
            Self::UpstreamFetchFailed(_) => "upstream_fetch_failed",
            Self::TransformFailure(_) => "transform_failed",
            Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidIdentifier(_) | Self::InvalidPath(_) => StatusCode::BAD_REQUEST,
            Self::NotFoundMetadata(_) | Self::NoFileConfigured(_) | Self::MemberNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::UpstreamFetchFailed(_) => StatusCode::BAD_GATEWAY,
            Self::TransformFailure(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<protogate_core::Error> for GatewayError {
    fn from(err: protogate_core::Error) -> Self {
        match err {
            protogate_core::Error::InvalidIdentifier(id) => Self::InvalidIdentifier(id),
            protogate_core::Error::InvalidPath(path) => Self::InvalidPath(path),
            other => Self::TransformFailure(other.to_string()),
        }
    }
}

/// JSON error response body.
#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        metrics::counter!(names::GATEWAY_ERRORS, "error" => code).increment(1);

        let message = match &self {
            Self::InvalidIdentifier(msg) => Some(format!("Invalid identifier: {msg}")),
            Self::InvalidPath(msg) => Some(format!("Invalid path: {msg}")),
            Self::NotFoundMetadata(msg) => Some(format!("Prototype not found: {msg}")),
            Self::NoFileConfigured(msg) => Some(format!("Prototype {msg} has no file configured")),
            Self::MemberNotFound(msg) => Some(format!("File not found in archive: {msg}")),
            Self::UpstreamFetchFailed(err) => {
                tracing::warn!(error = %err, "upstream fetch failed");
                Some("Failed to fetch the prototype file".to_string())
            }
            Self::TransformFailure(err) => {
                tracing::error!(error = %err, "artifact transform failed");
                Some("Failed to prepare the prototype for display".to_string())
            }
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                Some("An internal error occurred".to_string())
            }
        };

        (status, Json(ErrorResponse { error: code, message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_member_not_found() {
        let err = GatewayError::MemberNotFound("about".to_string());
        assert_eq!(err.to_string(), "member not found: about");
    }

    #[test]
    fn error_display_internal() {
        let err = GatewayError::Internal(anyhow::anyhow!("something broke"));
        assert_eq!(err.to_string(), "internal error: something broke");
    }

    #[test]
    fn error_status_mapping() {
        let cases = [
            (GatewayError::InvalidIdentifier("x".into()), StatusCode::BAD_REQUEST),
            (GatewayError::InvalidPath("x".into()), StatusCode::BAD_REQUEST),
            (GatewayError::NotFoundMetadata("x".into()), StatusCode::NOT_FOUND),
            (GatewayError::NoFileConfigured("x".into()), StatusCode::NOT_FOUND),
            (GatewayError::MemberNotFound("x".into()), StatusCode::NOT_FOUND),
            (GatewayError::UpstreamFetchFailed("x".into()), StatusCode::BAD_GATEWAY),
            (
                GatewayError::TransformFailure("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                GatewayError::Internal(anyhow::anyhow!("x")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn error_from_core_keeps_client_class() {
        let err: GatewayError = protogate_core::Error::InvalidPath("../x".to_string()).into();
        assert!(matches!(err, GatewayError::InvalidPath(_)));

        let err: GatewayError = protogate_core::Error::ArchiveTooLarge { limit: 10 }.into();
        assert!(matches!(err, GatewayError::TransformFailure(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn error_body_is_json() {
        let response = GatewayError::NoFileConfigured("alice/p1".to_string()).into_response();
        assert_eq!(
            response.headers()["content-type"],
            "application/json"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "no_file_configured");
        assert!(json["message"].as_str().unwrap().contains("alice/p1"));
    }
}
