//! Health and banner endpoints.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::schemas::health::{BannerResponse, HealthResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_health, get_banner), components(schemas(HealthResponse, BannerResponse)))]
pub struct HealthApi;

/// Register health-check routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(get_health))
        .route("/", get(get_banner))
}

/// Heartbeat endpoint.
///
/// Always 200 while the process serves; `engine_available` tells monitors
/// whether conversions can currently succeed.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is running", body = HealthResponse)
    )
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_owned(),
        engine: state.service.engine_name().to_owned(),
        engine_available: state.service.engine_available().await,
        version: env!("CARGO_PKG_VERSION").to_owned(),
    })
}

#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses(
        (status = 200, description = "Service banner", body = BannerResponse)
    )
)]
pub async fn get_banner(State(state): State<Arc<AppState>>) -> Json<BannerResponse> {
    Json(BannerResponse {
        message: "docpress DOCX to PDF conversion service".to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        docs: state
            .config
            .enable_docs
            .then(|| super::doc::OPENAPI_PATH.to_owned()),
    })
}
