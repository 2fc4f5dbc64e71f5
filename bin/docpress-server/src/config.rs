//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use docpress_core::{EngineKind, OfficeSettings, ServiceConfig};

/// Runtime configuration for docpress-server.
///
/// Every field has a default so the server runs without any environment
/// variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8000"`).
    pub bind_address: String,

    /// Directory for incoming uploads.
    pub upload_dir: PathBuf,

    /// Directory for produced PDFs.
    pub output_dir: PathBuf,

    /// Conversion engine: `reflow` (in-process) or `office` (soffice).
    pub engine: EngineKind,

    /// Office-suite binary used by the `office` engine.
    pub soffice_binary: PathBuf,

    /// Hard wall-clock limit per conversion, in seconds.
    pub conversion_timeout_secs: u64,

    /// Delay before a directly returned PDF is deleted.
    pub cleanup_delay_secs: u64,

    /// Delay before a downloaded PDF is deleted.
    pub download_grace_secs: u64,

    /// Age after which unclaimed artifacts are swept.
    pub output_retention_secs: u64,

    /// Interval between retention sweeps.
    pub sweep_interval_secs: u64,

    /// Largest accepted upload.
    pub max_upload_size_mb: usize,

    /// Comma-separated list of allowed CORS origins; `None` allows any.
    pub cors_allowed_origins: Option<String>,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Serve the OpenAPI document at `/api-docs/openapi.json`.
    pub enable_docs: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let env_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());
        let flag = |key: &str, default: bool| {
            lookup(key)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(default)
        };

        let engine = env_or("DOCPRESS_ENGINE", "reflow");
        let engine = EngineKind::from_str(&engine)
            .with_context(|| format!("DOCPRESS_ENGINE='{engine}' is not one of: reflow, office"))?;

        Ok(Self {
            bind_address: env_or("DOCPRESS_BIND", "0.0.0.0:8000"),
            upload_dir: env_or("DOCPRESS_UPLOAD_DIR", "uploads").into(),
            output_dir: env_or("DOCPRESS_OUTPUT_DIR", "outputs").into(),
            engine,
            soffice_binary: env_or("DOCPRESS_SOFFICE_BIN", "soffice").into(),
            conversion_timeout_secs: parse_env(&lookup, "DOCPRESS_TIMEOUT_SECS", 120),
            cleanup_delay_secs: parse_env(&lookup, "DOCPRESS_CLEANUP_DELAY_SECS", 5),
            download_grace_secs: parse_env(&lookup, "DOCPRESS_DOWNLOAD_GRACE_SECS", 5),
            output_retention_secs: parse_env(&lookup, "DOCPRESS_OUTPUT_RETENTION_SECS", 3600),
            sweep_interval_secs: parse_env(&lookup, "DOCPRESS_SWEEP_INTERVAL_SECS", 60),
            max_upload_size_mb: parse_env(&lookup, "DOCPRESS_MAX_UPLOAD_SIZE_MB", 50),
            cors_allowed_origins: lookup("DOCPRESS_CORS_ORIGINS").filter(|s| !s.trim().is_empty()),
            log_level: env_or("DOCPRESS_LOG", "info"),
            log_json: flag("DOCPRESS_LOG_JSON", false),
            enable_docs: flag("DOCPRESS_ENABLE_DOCS", true),
        })
    }

    /// The subset of settings the conversion core consumes.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            upload_dir: self.upload_dir.clone(),
            output_dir: self.output_dir.clone(),
            conversion_timeout: Duration::from_secs(self.conversion_timeout_secs),
            cleanup_delay: Duration::from_secs(self.cleanup_delay_secs),
            download_grace: Duration::from_secs(self.download_grace_secs),
            output_retention: Duration::from_secs(self.output_retention_secs),
            // A zero interval would make tokio's ticker panic.
            sweep_interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
        }
    }

    pub fn office_settings(&self) -> OfficeSettings {
        OfficeSettings {
            binary: self.soffice_binary.clone(),
            ..OfficeSettings::default()
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Command-line overrides; anything left unset keeps its environment value.
#[derive(Debug, Parser)]
#[command(name = "docpress-server", version, about = "DOCX to PDF conversion service")]
pub struct Cli {
    /// Address to bind, e.g. 127.0.0.1:8000.
    #[arg(long)]
    pub bind: Option<String>,

    /// Conversion engine (reflow | office).
    #[arg(long)]
    pub engine: Option<EngineKind>,

    /// Directory for incoming uploads.
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,

    /// Directory for produced PDFs.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Office-suite binary for the office engine.
    #[arg(long)]
    pub soffice: Option<PathBuf>,
}

impl Cli {
    pub fn apply(self, cfg: &mut Config) {
        if let Some(bind) = self.bind {
            cfg.bind_address = bind;
        }
        if let Some(engine) = self.engine {
            cfg.engine = engine;
        }
        if let Some(dir) = self.upload_dir {
            cfg.upload_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            cfg.output_dir = dir;
        }
        if let Some(bin) = self.soffice {
            cfg.soffice_binary = bin;
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn parse_env<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn from(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = from(&[]).unwrap();
        assert_eq!(cfg.bind_address, "0.0.0.0:8000");
        assert_eq!(cfg.engine, EngineKind::Reflow);
        assert_eq!(cfg.upload_dir, PathBuf::from("uploads"));
        assert_eq!(cfg.output_dir, PathBuf::from("outputs"));
        assert_eq!(cfg.service_config().conversion_timeout, Duration::from_secs(120));
        assert_eq!(cfg.max_upload_bytes(), 50 * 1024 * 1024);
        assert!(cfg.cors_allowed_origins.is_none());
        assert!(cfg.enable_docs);
    }

    #[test]
    fn reads_overrides_and_ignores_garbage_numbers() {
        let cfg = from(&[
            ("DOCPRESS_ENGINE", "Office"),
            ("DOCPRESS_TIMEOUT_SECS", "30"),
            ("DOCPRESS_CLEANUP_DELAY_SECS", "soon"),
            ("DOCPRESS_LOG_JSON", "TRUE"),
            ("DOCPRESS_SWEEP_INTERVAL_SECS", "0"),
        ])
        .unwrap();
        assert_eq!(cfg.engine, EngineKind::Office);
        assert_eq!(cfg.conversion_timeout_secs, 30);
        assert_eq!(cfg.cleanup_delay_secs, 5);
        assert!(cfg.log_json);
        assert_eq!(cfg.service_config().sweep_interval, Duration::from_secs(1));
    }

    #[test]
    fn unknown_engine_is_an_error() {
        let err = from(&[("DOCPRESS_ENGINE", "pandoc")]).unwrap_err();
        assert!(err.to_string().contains("pandoc"));
    }

    #[test]
    fn cli_overrides_environment() {
        let mut cfg = from(&[("DOCPRESS_BIND", "0.0.0.0:1")]).unwrap();
        Cli::parse_from(["docpress-server", "--bind", "127.0.0.1:9", "--engine", "office"]).apply(&mut cfg);
        assert_eq!(cfg.bind_address, "127.0.0.1:9");
        assert_eq!(cfg.engine, EngineKind::Office);
    }
}
