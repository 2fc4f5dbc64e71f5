//! docpress-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables and CLI flags.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Select the conversion engine and open the artifact directories.
//! 4. Start the retention sweeper in a background task.
//! 5. Build the Axum router and start the HTTP server with graceful shutdown.

mod config;
mod error;
mod middleware;
mod routes;
mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use docpress_core::{adapter, ConversionAdapter, ConversionService};
use tracing::{info, warn};

use crate::config::{Cli, Config};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let mut cfg = Config::from_env()?;
    Cli::parse().apply(&mut cfg);

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    // Build the log-level filter, warning loudly if the configured value is
    // not a valid tracing filter expression.
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: DOCPRESS_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "docpress-server starting");

    // ── 3. Conversion engine and artifact store ────────────────────────────────
    let engine = adapter::build(cfg.engine, cfg.office_settings());
    if engine.is_available().await {
        info!(engine = %cfg.engine, "conversion engine ready");
    } else {
        warn!(
            engine = %cfg.engine,
            soffice = %cfg.soffice_binary.display(),
            "conversion engine is not available; conversions will fail until it is installed"
        );
    }

    let service = ConversionService::new(cfg.service_config(), engine).with_context(|| {
        format!(
            "failed to prepare artifact directories {} and {}",
            cfg.upload_dir.display(),
            cfg.output_dir.display()
        )
    })?;
    info!(
        upload_dir = %cfg.upload_dir.display(),
        output_dir = %cfg.output_dir.display(),
        "artifact store ready"
    );

    // ── 4. Retention sweeper ───────────────────────────────────────────────────
    let sweeper = service.spawn_sweeper();

    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        service: Arc::new(service),
    });

    // ── 5. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let addr: SocketAddr = cfg
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address '{}'", cfg.bind_address))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    let pending = state.service.janitor().pending();
    if pending > 0 {
        // Leftovers are reclaimed by the startup sweep of the next run.
        info!(pending, "exiting with deferred deletions outstanding");
    }

    info!("docpress-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
