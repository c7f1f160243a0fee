//! TOML configuration for the system-pulse daemon.
//!
//! Layered like the rest of our tooling: an explicit path, then the
//! `SYSTEM_PULSE_CONFIG` environment variable, then the system location, then
//! compiled-in defaults. Every section and field is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::sampler::deviation::DeviationThresholds;
use crate::snapshot::ServiceSettings;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "SYSTEM_PULSE_CONFIG";

/// Default system-wide config location.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/system-pulse/system-pulse.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub logos: LogoConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve configuration.
    ///
    /// An explicitly requested file must load; the environment and system
    /// locations fall through to defaults with a warning.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "{CONFIG_ENV} set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    /// Snapshot service tunables derived from this config.
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            dashboard_ttl: seconds_or(self.sampling.dashboard_ttl_secs, Duration::from_secs(1)),
            page_size: self.sampling.page_size.max(1),
            self_cpu_alert_percent: self.thresholds.self_cpu_alert_percent,
            self_memory_alert_mb: self.thresholds.self_memory_alert_mb,
        }
    }
}

/// Convert fractional seconds, falling back on negative or non-finite input.
pub fn seconds_or(secs: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or_else(|_| {
        warn!(secs, fallback_secs = fallback.as_secs_f64(), "invalid duration in config");
        fallback
    })
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port for the HTTP API.
    pub bind: String,
    /// Hard deadline for any single request.
    pub request_timeout_secs: f64,
    /// Directory served for non-API paths (the web front-end).
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 5.0,
            static_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// How long a dashboard pass is reused.
    pub dashboard_ttl_secs: f64,
    /// Applications per dashboard page.
    pub page_size: usize,
    /// Blocking workers available for OS calls.
    pub worker_threads: usize,
    /// Interval of the expired-entry sweep.
    pub cache_sweep_interval_secs: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            dashboard_ttl_secs: 1.0,
            page_size: 20,
            worker_threads: 2,
            cache_sweep_interval_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Per-process deviation thresholds.
    pub deviation: DeviationThresholds,
    /// CPU percent above which the monitor flags itself.
    pub self_cpu_alert_percent: f64,
    /// Resident memory (MB) above which the monitor flags itself.
    pub self_memory_alert_mb: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            deviation: DeviationThresholds::default(),
            self_cpu_alert_percent: 15.0,
            self_memory_alert_mb: 200.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Logos
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogoConfig {
    /// Optional JSON `{exe_name: logo_path}` merged over the built-in table.
    pub mapping_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
