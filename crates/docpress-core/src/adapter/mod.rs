//! Conversion engines.
//!
//! Both engines sit behind [`ConversionAdapter`], so the request handling is
//! written once and the engine is a configuration choice:
//!
//! | engine   | mechanism                                   |
//! |----------|---------------------------------------------|
//! | `reflow` | in-process docx text re-flow onto PDF pages |
//! | `office` | headless office-suite subprocess            |

mod office;
mod reflow;

pub use office::{OfficeAdapter, OfficeSettings};
pub use reflow::{Paragraph, ReflowAdapter, extract_paragraphs, render_pdf};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Capability to turn one `.docx` file into one `.pdf` file.
#[async_trait]
pub trait ConversionAdapter: Send + Sync {
    /// Short engine name reported by the health endpoint.
    fn name(&self) -> &str;

    /// Cheap check that the engine can be invoked. Never runs a conversion.
    async fn is_available(&self) -> bool;

    /// Convert `input` into `<output_dir>/<input stem>.pdf`.
    ///
    /// Must not block the async runtime, must give up after `timeout`, and
    /// must verify the output file exists before reporting success.
    async fn convert(&self, input: &Path, output_dir: &Path, timeout: Duration) -> Result<PathBuf>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EngineKind {
    #[default]
    Reflow,
    Office,
}

/// Build the adapter selected by `kind`.
pub fn build(kind: EngineKind, office: OfficeSettings) -> Arc<dyn ConversionAdapter> {
    match kind {
        EngineKind::Reflow => Arc::new(ReflowAdapter::new()),
        EngineKind::Office => Arc::new(OfficeAdapter::new(office)),
    }
}

/// Path an engine is expected to write for `input`.
pub(crate) fn expected_output(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_owned());
    output_dir.join(format!("{stem}.{}", crate::store::OUTPUT_EXTENSION))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn engine_kind_parses_case_insensitively() {
        assert_eq!(EngineKind::from_str("office").unwrap(), EngineKind::Office);
        assert_eq!(EngineKind::from_str("Reflow").unwrap(), EngineKind::Reflow);
        assert!(EngineKind::from_str("pandoc").is_err());
        assert_eq!(EngineKind::default().to_string(), "reflow");
    }

    #[test]
    fn expected_output_uses_input_stem() {
        let out = expected_output(Path::new("/up/tok_report.docx"), Path::new("/out"));
        assert_eq!(out, PathBuf::from("/out/tok_report.pdf"));
    }

    #[test]
    fn build_selects_engine() {
        assert_eq!(build(EngineKind::Reflow, OfficeSettings::default()).name(), "reflow");
        assert_eq!(build(EngineKind::Office, OfficeSettings::default()).name(), "office");
    }
}
