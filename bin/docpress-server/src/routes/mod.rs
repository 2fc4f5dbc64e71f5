//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID injection, upload size cap)
//! - Optional OpenAPI document endpoint (disable with `DOCPRESS_ENABLE_DOCS=false`)
//! - Health and banner routes
//! - Conversion and download routes

mod convert;
pub mod doc;
mod download;
mod health;

use axum::{extract::DefaultBodyLimit, middleware, Router};
use crate::middleware::{cors, trace};
use crate::state::AppState;
use std::sync::Arc;
use tower::ServiceBuilder;

/// Room for multipart boundaries and the `return_file` field on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(health::router())
        .merge(convert::router())
        .merge(download::router());

    if state.config.enable_docs {
        app = app.merge(doc::router());
    }

    let body_limit = state
        .config
        .max_upload_bytes()
        .saturating_add(MULTIPART_OVERHEAD);

    app.layer(DefaultBodyLimit::max(body_limit))
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(state.clone())))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}
