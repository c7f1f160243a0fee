//! Snapshot service: cached dashboard pages, live filtered snapshots and
//! self-monitoring, built on the sampler, cache and worker pool.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::cache::{CacheStats, TtlCache};
use crate::pool::{PoolError, WorkerPool};
use crate::sampler::deviation::DeviationRecord;
use crate::sampler::logo::KnownApp;
use crate::sampler::{AggregateMap, AppAggregate, ProcessDetails, ProcessListing, Sampler};
use crate::scoring;

/// Cache key for the dashboard aggregate map.
pub const DASHBOARD_KEY: &str = "dashboard";

/// Cache holding whole sampling passes.
pub type DashboardCache = TtlCache<String, Arc<AggregateMap>>;

/// Tunables for the snapshot service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceSettings {
    pub dashboard_ttl: Duration,
    pub page_size: usize,
    pub self_cpu_alert_percent: f64,
    pub self_memory_alert_mb: f64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            dashboard_ttl: Duration::from_secs(1),
            page_size: 20,
            self_cpu_alert_percent: 15.0,
            self_memory_alert_mb: 200.0,
        }
    }
}

/// One page of the ranked dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardPage {
    pub items: Vec<AppAggregate>,
    pub page: usize,
    pub items_per_page: usize,
    pub total_items: usize,
    pub has_more: bool,
}

/// Slice a ranked list into a page. Page numbers start at 1; 0 is read as 1.
pub fn paginate(items: Vec<AppAggregate>, page: usize, per_page: usize) -> DashboardPage {
    let page = page.max(1);
    let per_page = per_page.max(1);
    let total_items = items.len();
    let start = (page - 1).saturating_mul(per_page);
    let end = page.saturating_mul(per_page);

    DashboardPage {
        items: items.into_iter().skip(start).take(per_page).collect(),
        page,
        items_per_page: per_page,
        total_items,
        has_more: end < total_items,
    }
}

/// Conjunctive filter for live snapshots.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SnapshotFilter {
    pub min_cpu: f64,
    pub min_memory: f64,
    pub search: String,
}

impl SnapshotFilter {
    pub fn matches(&self, app: &AppAggregate) -> bool {
        if app.cpu_percent < self.min_cpu || app.memory_mb < self.min_memory {
            return false;
        }
        self.search.is_empty() || app.name.to_lowercase().contains(&self.search.to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotView {
    pub total: usize,
    pub filtered: usize,
    pub processes: Vec<AppAggregate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Healthy,
    Warning,
    Critical,
}

/// Resource usage of the monitor itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelfMonitorReport {
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub cpu_alert: bool,
    pub memory_alert: bool,
    pub status: MonitorStatus,
    pub uptime_seconds: u64,
    pub last_deviation: Option<DeviationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSearch {
    pub processes: Vec<ProcessListing>,
}

/// Result of a detail lookup; a vanished pid is a normal answer, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessLookup {
    pub found: bool,
    #[serde(flatten)]
    pub details: Option<ProcessDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessLookup {
    fn not_found(error: impl Into<String>) -> Self {
        Self {
            found: false,
            details: None,
            error: Some(error.into()),
        }
    }
}

pub struct SnapshotService {
    sampler: Arc<Sampler>,
    cache: Arc<DashboardCache>,
    pool: WorkerPool,
    settings: ServiceSettings,
    started_at: Instant,
}

impl SnapshotService {
    pub fn new(
        sampler: Arc<Sampler>,
        cache: Arc<DashboardCache>,
        pool: WorkerPool,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            sampler,
            cache,
            pool,
            settings,
            started_at: Instant::now(),
        }
    }

    pub fn cache(&self) -> &Arc<DashboardCache> {
        &self.cache
    }

    async fn sample(&self) -> Result<Arc<AggregateMap>, PoolError> {
        let sampler = self.sampler.clone();
        let apps = self.pool.run(move || sampler.collect()).await?;
        Ok(Arc::new(apps))
    }

    fn ranked(apps: &AggregateMap) -> Vec<AppAggregate> {
        scoring::sort_by_relevance(apps.values().cloned().collect())
    }

    /// A page of the ranked dashboard, served from a pass at most one TTL old.
    pub async fn get_dashboard_page(&self, page: usize) -> DashboardPage {
        let apps = self
            .cache
            .try_get_or_compute_async(
                DASHBOARD_KEY.to_string(),
                || self.sample(),
                self.settings.dashboard_ttl,
            )
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "dashboard sampling failed");
                Arc::new(AggregateMap::new())
            });

        paginate(Self::ranked(&apps), page, self.settings.page_size)
    }

    /// A fresh pass, ranked and filtered. Never touches the cache.
    pub async fn get_snapshot(&self, filter: &SnapshotFilter) -> SnapshotView {
        let apps = self.sample().await.unwrap_or_else(|e| {
            error!(error = %e, "snapshot sampling failed");
            Arc::new(AggregateMap::new())
        });

        let total = apps.len();
        let processes: Vec<_> = Self::ranked(&apps)
            .into_iter()
            .filter(|app| filter.matches(app))
            .collect();
        debug!(total, filtered = processes.len(), ?filter, "live snapshot");

        SnapshotView {
            total,
            filtered: processes.len(),
            processes,
        }
    }

    pub async fn self_monitor(&self) -> SelfMonitorReport {
        let processes = self.sampler.processes().clone();
        let usage = match self.pool.run(move || processes.own_usage()).await {
            Ok(usage) => usage,
            Err(e) => {
                warn!(error = %e, "self usage job failed");
                None
            }
        };
        let (cpu_percent, memory_mb) = match usage {
            Some(usage) => (usage.cpu_percent, usage.memory_mb),
            None => {
                warn!("own process usage unavailable, reporting zero usage");
                (0.0, 0.0)
            }
        };

        let cpu_alert = cpu_percent > self.settings.self_cpu_alert_percent;
        let memory_alert = memory_mb > self.settings.self_memory_alert_mb;
        let status = match (cpu_alert, memory_alert) {
            (true, true) => MonitorStatus::Critical,
            (false, false) => MonitorStatus::Healthy,
            _ => MonitorStatus::Warning,
        };

        SelfMonitorReport {
            cpu_percent,
            memory_mb,
            cpu_alert,
            memory_alert,
            status,
            uptime_seconds: self.started_at.elapsed().as_secs(),
            last_deviation: self.sampler.deviations().last(),
        }
    }

    /// Every process, sorted by name.
    pub async fn process_search(&self) -> ProcessSearch {
        let processes = self.sampler.processes().clone();
        let mut listing = match self.pool.run(move || processes.list()).await {
            Ok(Ok(listing)) => listing,
            Ok(Err(e)) => {
                warn!(error = %e, "process listing failed");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "process listing job failed");
                Vec::new()
            }
        };

        listing.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then(a.pid.cmp(&b.pid))
        });
        ProcessSearch { processes: listing }
    }

    pub async fn process_details(&self, pid: u32) -> ProcessLookup {
        let processes = self.sampler.processes().clone();
        match self.pool.run(move || processes.details(pid)).await {
            Ok(Some(details)) => ProcessLookup {
                found: true,
                details: Some(details),
                error: None,
            },
            Ok(None) => ProcessLookup::not_found(format!("process {pid} not found")),
            Err(e) => {
                warn!(pid, error = %e, "process detail job failed");
                ProcessLookup::not_found(e.to_string())
            }
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The `exe -> logo` mapping the dashboard renders with.
    pub fn app_icons(&self) -> BTreeMap<String, String> {
        self.sampler.logos().icons()
    }

    /// Every application with a known logo, ordered by display name.
    pub fn all_apps(&self) -> Vec<KnownApp> {
        self.sampler.logos().known_apps()
    }
}
