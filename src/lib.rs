//! System Pulse -- per-application process and connection dashboard.
//!
//! This crate samples the OS process and socket tables, rolls them up per
//! application, ranks the result by a relevance score and serves it over a
//! small JSON API with bounded staleness and a hard request deadline.

pub mod api;
pub mod cache;
pub mod config;
pub mod pool;
pub mod sampler;
pub mod scoring;
pub mod snapshot;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::{Config, LogFormat};
use crate::sampler::deviation::DeviationTracker;
use crate::sampler::logo::LogoTable;
use crate::sampler::net::ProcfsConnections;
use crate::sampler::os::SysinfoSource;
use crate::sampler::Sampler;
use crate::snapshot::{DashboardCache, SnapshotService};

/// Resolve configuration with a temporary stderr subscriber installed, so
/// fallback warnings reach the operator before [`init_logging`] runs.
pub fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::with_default(bootstrap, || Config::resolve(explicit))
}

/// Initialize tracing. `RUST_LOG` overrides the configured level.
pub fn init_logging(logging: &config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    // Logs go to stderr so `--json` output on stdout stays parseable.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Wire the sampler, cache and worker pool against the real OS.
pub fn build_service(config: &Config) -> SnapshotService {
    let mut logos = LogoTable::builtin();
    if let Some(path) = &config.logos.mapping_file {
        if let Err(e) = logos.merge_json_file(path) {
            warn!(error = %e, "logo mapping not loaded, using built-in table");
        }
    }
    debug!(entries = logos.len(), "logo table ready");

    let sampler = Sampler::new(
        Arc::new(SysinfoSource::new()),
        Arc::new(ProcfsConnections::default()),
        logos,
        Arc::new(DeviationTracker::new(config.thresholds.deviation)),
    );

    let pool = pool::WorkerPool::new(config.sampling.worker_threads);
    debug!(workers = pool.size(), "worker pool ready");

    SnapshotService::new(
        Arc::new(sampler),
        Arc::new(DashboardCache::new()),
        pool,
        config.service_settings(),
    )
}

/// Periodically drop expired cache entries.
pub async fn run_cache_sweeper(cache: Arc<DashboardCache>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let evicted = cache.cleanup_expired();
        if evicted > 0 {
            debug!(evicted, "swept expired cache entries");
        }
    }
}

/// Start the System Pulse daemon: cache sweeper and API server.
pub async fn serve(config: Config) -> Result<()> {
    let service = Arc::new(build_service(&config));

    let sweep_every = Duration::from_secs(config.sampling.cache_sweep_interval_secs.max(1));
    tokio::spawn(run_cache_sweeper(service.cache().clone(), sweep_every));

    let deadline = api::timeout::RequestDeadline::new(config::seconds_or(
        config.server.request_timeout_secs,
        Duration::from_secs(5),
    ));
    let state = api::state::AppState { service };
    let app = api::router(state, deadline, config.server.static_dir.as_deref());

    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;

    info!(%addr, timeout_secs = deadline.limit().as_secs_f64(), "System Pulse listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("System Pulse stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
