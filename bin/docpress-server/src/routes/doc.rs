use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::routes::{convert, download, health};
use crate::schemas::convert::ErrorResponse;
use crate::state::AppState;

pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "docpress-server",
        description = "DOCX to PDF conversion API"
    ),
    components(schemas(ErrorResponse))
)]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(convert::ConvertApi::openapi());
    root.merge(download::DownloadApi::openapi());
    root
}

/// Serve the generated document as JSON.
pub fn router() -> Router<Arc<AppState>> {
    let doc = Arc::new(get_docs());
    Router::new().route(
        OPENAPI_PATH,
        get(move || {
            let doc = Arc::clone(&doc);
            async move { Json(doc.as_ref().clone()) }
        }),
    )
}
