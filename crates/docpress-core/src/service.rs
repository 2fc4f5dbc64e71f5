//! Request lifecycle around one conversion.
//!
//! `Received → Validated → Stored → Converting → Completed | Failed`
//!
//! The input artifact is owned by an [`InputGuard`] for the whole request and
//! is gone by the time [`ConversionService::convert_upload`] returns, whatever
//! the outcome. Outputs either ride back in the response and are deleted
//! shortly after, or are retained for a single download.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapter::ConversionAdapter;
use crate::config::ServiceConfig;
use crate::error::{ConvertError, Result};
use crate::janitor::Janitor;
use crate::job::{ConversionJob, JobStatus};
use crate::store::{
    ArtifactStore, INPUT_EXTENSION, InputGuard, OUTPUT_EXTENSION, extension_of, original_stem,
};

/// How a successful conversion is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// PDF bytes in the response body.
    #[default]
    File,
    /// A reference to fetch later from the delivery endpoint.
    Reference,
}

impl From<bool> for ResponseMode {
    /// `return_file` flag: `true` → [`ResponseMode::File`].
    fn from(return_file: bool) -> Self {
        if return_file { Self::File } else { Self::Reference }
    }
}

#[derive(Debug)]
pub enum Delivery {
    File { bytes: Bytes, download_name: String },
    Reference { output_reference: String },
}

#[derive(Debug)]
pub struct Outcome {
    pub job: ConversionJob,
    pub delivery: Delivery,
}

pub struct ConversionService {
    config: ServiceConfig,
    store: ArtifactStore,
    janitor: Janitor,
    adapter: Arc<dyn ConversionAdapter>,
}

impl std::fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionService")
            .field("engine", &self.adapter.name())
            .field("store", &self.store)
            .finish()
    }
}

impl ConversionService {
    /// Open the artifact directories and wire the components together.
    pub fn new(config: ServiceConfig, adapter: Arc<dyn ConversionAdapter>) -> Result<Self> {
        let store = ArtifactStore::open(&config)?;
        let janitor = Janitor::new(store.clone());
        Ok(Self { config, store, janitor, adapter })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn janitor(&self) -> &Janitor {
        &self.janitor
    }

    pub fn engine_name(&self) -> &str {
        self.adapter.name()
    }

    pub async fn engine_available(&self) -> bool {
        self.adapter.is_available().await
    }

    /// Start the periodic retention sweep.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.janitor
            .spawn_sweeper(self.config.output_retention, self.config.sweep_interval)
    }

    /// Reject names that are not `.docx`. Pure; touches nothing on disk.
    pub fn validate(original_name: &str) -> Result<()> {
        match extension_of(original_name) {
            Some(ext) if ext == INPUT_EXTENSION => Ok(()),
            _ => Err(ConvertError::InvalidInput(format!(
                "file must be a .{INPUT_EXTENSION} document (got '{original_name}')"
            ))),
        }
    }

    /// Run one upload through validation, storage, conversion, and delivery.
    pub async fn convert_upload(
        &self,
        original_name: &str,
        body: Bytes,
        mode: ResponseMode,
    ) -> Result<Outcome> {
        Self::validate(original_name)?;

        let (token, input_path) = self.store.reserve(original_name).await?;
        let stem = original_stem(original_name);
        let mut job = ConversionJob::new(
            token,
            original_name,
            input_path.clone(),
            self.store.output_path_for(token, &stem),
        );
        let input = InputGuard::new(input_path);

        info!(job = %token, file = %original_name, bytes = body.len(), ?mode, "conversion job accepted");
        tokio::fs::write(input.path(), &body).await?;

        match self.complete(&mut job, input.path(), &stem, mode).await {
            Ok(delivery) => {
                job.status = JobStatus::Succeeded;
                info!(job = %token, status = %job.status, elapsed_ms = job.elapsed_ms(), "conversion job finished");
                Ok(Outcome { job, delivery })
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                warn!(
                    job = %token,
                    status = %job.status,
                    kind = %e.kind(),
                    error = %e,
                    elapsed_ms = job.elapsed_ms(),
                    "conversion job failed"
                );
                self.discard(&job.output_path).await;
                Err(e)
            }
        }
    }

    async fn complete(
        &self,
        job: &mut ConversionJob,
        input: &Path,
        stem: &str,
        mode: ResponseMode,
    ) -> Result<Delivery> {
        let output = self
            .adapter
            .convert(input, self.store.output_dir(), self.config.conversion_timeout)
            .await?;
        job.output_path = output;

        if !tokio::fs::try_exists(&job.output_path).await? {
            return Err(ConvertError::OutputMissing(job.output_reference()));
        }

        match mode {
            ResponseMode::File => {
                let bytes = tokio::fs::read(&job.output_path).await?;
                self.janitor
                    .schedule(job.output_path.clone(), self.config.cleanup_delay);
                Ok(Delivery::File {
                    bytes: Bytes::from(bytes),
                    download_name: format!("{stem}.{OUTPUT_EXTENSION}"),
                })
            }
            ResponseMode::Reference => Ok(Delivery::Reference {
                output_reference: job.output_reference(),
            }),
        }
    }

    /// Hand out a retained output exactly once.
    pub async fn fetch(&self, name: &str) -> Result<Bytes> {
        let claimed = self.store.claim_output(name).await?;
        let read = tokio::fs::read(&claimed).await;
        // Delete whether or not the read worked; a claimed file is never served again.
        self.janitor.schedule(claimed, self.config.download_grace);
        let bytes = read?;
        info!(reference = %name, bytes = bytes.len(), "output delivered");
        Ok(Bytes::from(bytes))
    }

    async fn discard(&self, path: &Path) {
        if let Err(e) = self.store.delete(path).await {
            warn!(path = %path.display(), error = %e, "failed to discard output artifact");
        }
    }
}
