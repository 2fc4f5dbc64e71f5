//! Error type shared by every conversion-path component.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// All failures a conversion request or a download can end in.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The upload is not a document this service accepts.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The configured engine cannot be invoked at all.
    #[error("conversion engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The engine ran and reported an error.
    #[error("conversion failed: {detail}")]
    ConversionFailed { detail: String },

    /// The engine did not finish within the wall-clock budget.
    #[error("conversion timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The engine reported success but the expected file is absent.
    #[error("conversion reported success but produced no output ({0})")]
    OutputMissing(String),

    /// A download reference does not resolve to a retained output.
    #[error("artifact not found: {0}")]
    NotFound(String),

    /// Artifact storage failure (disk full, permission denied, ...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable, client-visible classification of a [`ConvertError`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::AsRefStr, strum::IntoStaticStr,
)]
pub enum ErrorKind {
    InvalidInput,
    EngineUnavailable,
    ConversionFailed,
    Timeout,
    OutputMissing,
    NotFound,
    Io,
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::InvalidInput(_) => ErrorKind::InvalidInput,
            ConvertError::EngineUnavailable(_) => ErrorKind::EngineUnavailable,
            ConvertError::ConversionFailed { .. } => ErrorKind::ConversionFailed,
            ConvertError::Timeout(_) => ErrorKind::Timeout,
            ConvertError::OutputMissing(_) => ErrorKind::OutputMissing,
            ConvertError::NotFound(_) => ErrorKind::NotFound,
            ConvertError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn failed(detail: impl Into<String>) -> Self {
        ConvertError::ConversionFailed {
            detail: detail.into(),
        }
    }
}

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;
