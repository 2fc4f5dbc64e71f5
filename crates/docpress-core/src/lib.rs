//! docpress-core – upload lifecycle around an external DOCX → PDF converter.
//!
//! The crate owns everything with an invariant: artifact naming and cleanup
//! ([`store`], [`janitor`]), engine invocation with a hard deadline
//! ([`adapter`]), and the per-request state machine ([`service`]). It knows
//! nothing about HTTP; `docpress-server` maps [`ConvertError`] onto status
//! codes.

pub mod adapter;
pub mod config;
pub mod error;
pub mod janitor;
pub mod job;
pub mod service;
pub mod store;

pub use adapter::{ConversionAdapter, EngineKind, OfficeSettings};
pub use config::ServiceConfig;
pub use error::{ConvertError, ErrorKind};
pub use janitor::Janitor;
pub use job::{ConversionJob, JobStatus, JobToken};
pub use service::{ConversionService, Delivery, Outcome, ResponseMode};
pub use store::{ArtifactStore, OUTPUT_MEDIA_TYPE};
