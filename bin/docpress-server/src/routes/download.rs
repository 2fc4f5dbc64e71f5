//! `GET /download/{name}`: single-fetch delivery of retained PDFs.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, header};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use docpress_core::OUTPUT_MEDIA_TYPE;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::convert::ErrorResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(download))]
pub struct DownloadApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/download/{name}", get(download))
}

/// Serve a reference-mode output. The first successful fetch consumes it.
#[utoipa::path(
    get,
    path = "/download/{name}",
    tag = "convert",
    params(("name" = String, Path, description = "output_reference returned by /convert")),
    responses(
        (status = 200, description = "The PDF", content_type = "application/pdf"),
        (status = 404, description = "Unknown or already downloaded", body = ErrorResponse),
    )
)]
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ServerError> {
    let bytes = state.service.fetch(&name).await?;
    pdf_response(bytes, &name)
}

/// 200 response carrying a PDF as an attachment named `filename`.
pub(crate) fn pdf_response(bytes: Bytes, filename: &str) -> Result<Response, ServerError> {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .map_err(|e| ServerError::Internal(format!("invalid download name {filename:?}: {e}")))?;

    Response::builder()
        .header(header::CONTENT_TYPE, OUTPUT_MEDIA_TYPE)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from(bytes))
        .map_err(|e| ServerError::Internal(e.to_string()))
}
