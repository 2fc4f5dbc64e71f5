//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use docpress_core::ConversionService;

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Upload lifecycle and conversion engine.
    pub service: Arc<ConversionService>,
}
