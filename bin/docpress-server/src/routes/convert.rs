//! `POST /convert`: multipart upload in, PDF (or a download reference) out.

use std::sync::Arc;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use docpress_core::{ConversionService, Delivery, ResponseMode};
use tracing::debug;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::routes::download::pdf_response;
use crate::schemas::convert::{ConvertResponse, ConvertUpload, ErrorResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(convert), components(schemas(ConvertUpload, ConvertResponse)))]
pub struct ConvertApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/convert", post(convert))
}

/// Convert an uploaded `.docx` document to PDF.
///
/// With `return_file=true` (the default) the PDF is the response body and is
/// deleted from the server shortly after. With `return_file=false` the PDF is
/// retained and the response names a URL that serves it once.
///
/// The filename is validated before any upload bytes are read, so a rejected
/// request writes nothing to disk.
#[utoipa::path(
    post,
    path = "/convert",
    tag = "convert",
    request_body(content = ConvertUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "The PDF (application/pdf), or a download reference when return_file=false", body = ConvertResponse),
        (status = 400, description = "Not a .docx upload or malformed form", body = ErrorResponse),
        (status = 413, description = "Upload too large", body = ErrorResponse),
        (status = 500, description = "Conversion failed", body = ErrorResponse),
    )
)]
pub async fn convert(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, ServerError> {
    let limit = state.config.max_upload_bytes();
    let mut upload: Option<(String, Bytes)> = None;
    let mut return_file = true;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or_default().to_owned();
        match field_name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_owned();
                ConversionService::validate(&file_name)?;
                let body = read_limited(field, limit).await?;
                debug!(file = %file_name, size_bytes = body.len(), "received upload");
                upload = Some((file_name, body));
            }
            "return_file" => {
                let value = field.text().await.map_err(multipart_error)?;
                return_file = parse_flag(&value).ok_or_else(|| {
                    ServerError::BadRequest(format!(
                        "return_file must be true or false (got '{}')",
                        value.trim()
                    ))
                })?;
            }
            other => debug!(field = %other, "ignoring unknown form field"),
        }
    }

    let (file_name, body) = upload
        .ok_or_else(|| ServerError::BadRequest("form field 'file' is required".into()))?;

    let outcome = state
        .service
        .convert_upload(&file_name, body, ResponseMode::from(return_file))
        .await?;

    match outcome.delivery {
        Delivery::File { bytes, download_name } => pdf_response(bytes, &download_name),
        Delivery::Reference { output_reference } => {
            Ok(Json(ConvertResponse::for_reference(output_reference)).into_response())
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

async fn read_limited(mut field: Field<'_>, limit: usize) -> Result<Bytes, ServerError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if buf.len() + chunk.len() > limit {
            return Err(ServerError::PayloadTooLarge(format!(
                "upload exceeds the {} byte limit",
                limit
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

fn multipart_error(e: MultipartError) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge(e.body_text())
    } else {
        ServerError::BadRequest(format!("malformed multipart body: {}", e.body_text()))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
