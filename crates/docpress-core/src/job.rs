use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Per-request identifier that namespaces every artifact a job owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobToken(Uuid);

impl JobToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Succeeded,
    Failed,
}

/// One accepted conversion request. Lives only as long as the request.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub token: JobToken,
    pub original_name: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub status: JobStatus,
}

impl ConversionJob {
    pub fn new(
        token: JobToken,
        original_name: impl Into<String>,
        input_path: PathBuf,
        output_path: PathBuf,
    ) -> Self {
        Self {
            token,
            original_name: original_name.into(),
            input_path,
            output_path,
            created_at: Utc::now(),
            status: JobStatus::Pending,
        }
    }

    /// Milliseconds since the job was accepted.
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.created_at).num_milliseconds()
    }

    /// File name of the output artifact, used as the download reference.
    pub fn output_reference(&self) -> String {
        self.output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
