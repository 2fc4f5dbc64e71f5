//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are converted to a JSON body
//! `{"error": <kind>, "detail": <message>}` with the matching status code.
//!
//! **Security note:** storage errors are logged with full detail but only a
//! generic message is returned, so server paths never leak to clients.
//! Engine diagnostics are returned as-is; they are what callers need to fix
//! their document.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use docpress_core::ConvertError;
use thiserror::Error;
use tracing::error;

use crate::schemas::convert::ErrorResponse;

/// All errors that can occur in the docpress-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the conversion core.
    #[error(transparent)]
    Convert(#[from] ConvertError),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The upload exceeds the configured size limit.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    fn status_and_body(&self) -> (StatusCode, &'static str, String) {
        match self {
            ServerError::Convert(e) => {
                let kind: &'static str = e.kind().into();
                match e {
                    ConvertError::InvalidInput(m) => (StatusCode::BAD_REQUEST, kind, m.clone()),
                    ConvertError::NotFound(_) => {
                        (StatusCode::NOT_FOUND, kind, "file not found".to_owned())
                    }
                    ConvertError::Io(io) => {
                        error!(error = %io, "artifact storage error");
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            kind,
                            "internal storage error".to_owned(),
                        )
                    }
                    ConvertError::EngineUnavailable(_)
                    | ConvertError::ConversionFailed { .. }
                    | ConvertError::Timeout(_)
                    | ConvertError::OutputMissing(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, kind, format!("{kind}: {e}"))
                    }
                }
            }
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, "BadRequest", m.clone()),
            ServerError::PayloadTooLarge(m) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PayloadTooLarge", m.clone())
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal",
                    "internal server error".to_owned(),
                )
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, kind, detail) = self.status_and_body();
        let body = ErrorResponse {
            error: kind.to_owned(),
            detail,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use http_body_util::BodyExt;
    use std::time::Duration;

    async fn render(err: ServerError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn invalid_input_is_400() {
        let (status, body) =
            render(ConvertError::InvalidInput("file must be a .docx document".into()).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidInput");
    }

    #[tokio::test]
    async fn engine_failures_are_500_with_kind_and_diagnostic() {
        let (status, body) = render(
            ConvertError::ConversionFailed {
                detail: "Error: source file could not be loaded".into(),
            }
            .into(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "ConversionFailed");
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.starts_with("ConversionFailed"));
        assert!(detail.contains("could not be loaded"));

        let (status, body) = render(ConvertError::Timeout(Duration::from_secs(120)).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Timeout");
    }

    #[tokio::test]
    async fn storage_errors_hide_paths() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "/srv/secret/uploads");
        let (status, body) = render(ConvertError::Io(io).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body["detail"].as_str().unwrap().contains("/srv"));
    }

    #[tokio::test]
    async fn not_found_and_too_large() {
        let (status, _) = render(ConvertError::NotFound("x.pdf".into()).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = render(ServerError::PayloadTooLarge("too big".into())).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "PayloadTooLarge");
    }
}
