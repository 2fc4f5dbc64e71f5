use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"ok"` while the process is serving.
    pub status: String,
    /// Configured conversion engine.
    pub engine: String,
    /// Whether the engine can be invoked right now.
    pub engine_available: bool,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BannerResponse {
    pub message: String,
    pub version: String,
    /// Location of the OpenAPI document, when enabled.
    pub docs: Option<String>,
}
