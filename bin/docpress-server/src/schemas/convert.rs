use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Multipart form accepted by `POST /convert`.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct ConvertUpload {
    /// The `.docx` document to convert.
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// `true` (default) returns the PDF directly; `false` returns a download reference.
    pub return_file: Option<bool>,
}

/// Reference-mode body of `POST /convert`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConvertResponse {
    pub success: bool,
    /// Name of the retained PDF.
    pub output_reference: String,
    /// Relative URL that serves the PDF exactly once.
    pub download_url: String,
}

impl ConvertResponse {
    pub fn for_reference(output_reference: String) -> Self {
        Self {
            success: true,
            download_url: format!("/download/{output_reference}"),
            output_reference,
        }
    }
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error kind, e.g. `InvalidInput` or `ConversionFailed`.
    pub error: String,
    pub detail: String,
}
