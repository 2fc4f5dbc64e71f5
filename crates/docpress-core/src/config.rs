//! Explicit configuration handed to the core components at construction.

use std::path::PathBuf;
use std::time::Duration;

/// Settings for the artifact store, janitor, and conversion service.
///
/// The binary builds this from its environment; tests build it around a
/// temporary directory.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding incoming uploads.
    pub upload_dir: PathBuf,
    /// Directory holding produced PDFs.
    pub output_dir: PathBuf,
    /// Wall-clock budget for a single conversion.
    pub conversion_timeout: Duration,
    /// Delay before a directly-returned output is deleted.
    pub cleanup_delay: Duration,
    /// Delay before a downloaded output is deleted.
    pub download_grace: Duration,
    /// Maximum age of any artifact before the sweeper reclaims it.
    pub output_retention: Duration,
    /// How often the sweeper runs.
    pub sweep_interval: Duration,
}

impl ServiceConfig {
    /// Defaults rooted at `base`: `<base>/uploads` and `<base>/outputs`.
    pub fn rooted_at(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            upload_dir: base.join("uploads"),
            output_dir: base.join("outputs"),
            ..Self::default()
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
            conversion_timeout: Duration::from_secs(120),
            cleanup_delay: Duration::from_secs(5),
            download_grace: Duration::from_secs(5),
            output_retention: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}
