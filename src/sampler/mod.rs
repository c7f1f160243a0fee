//! Process and connection sampling, aggregated per application.
//!
//! A sampling pass reads the OS connection table once and the process table
//! once, folds processes sharing a normalized name into one [`AppAggregate`],
//! then attributes connections to aggregates through a pid index built during
//! the same pass. Every pass builds a brand-new map.
//!
//! Known limitation: connections are read before processes, so a pid that is
//! recycled between the two reads can credit connections to an unrelated
//! application.

pub mod deviation;
pub mod logo;
pub mod net;
pub mod os;

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, error, trace, warn};

use self::deviation::DeviationTracker;
use self::logo::LogoTable;
use self::net::ConnectionError;

/// One process as reported by the OS.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessFact {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
}

impl ProcessFact {
    pub fn memory_mb(&self) -> f64 {
        self.memory_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Outcome of reading a single process. Unreadable processes are skipped,
/// never fatal to the pass.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessRead {
    Sampled(ProcessFact),
    Skipped { pid: u32, reason: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Listen,
    Established,
    Other,
}

/// One socket as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionFact {
    pub owning_pid: Option<u32>,
    pub state: ConnState,
    pub has_remote_address: bool,
}

/// Per-application rollup for one sampling pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppAggregate {
    pub name: String,
    #[serde(rename = "pid")]
    pub representative_pid: u32,
    #[serde(rename = "logo")]
    pub logo_ref: String,
    #[serde(rename = "incoming")]
    pub incoming_count: u32,
    #[serde(rename = "outgoing")]
    pub outgoing_count: u32,
    #[serde(rename = "cpu")]
    pub cpu_percent: f64,
    #[serde(rename = "memory")]
    pub memory_mb: f64,
    pub relevance_score: f64,
}

/// Aggregates keyed by normalized application name.
pub type AggregateMap = BTreeMap<String, AppAggregate>;

/// Entry in the process picker list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessListing {
    pub pid: u32,
    pub name: String,
    pub exe: String,
    pub status: String,
}

/// Full detail for a single process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessDetails {
    pub pid: u32,
    pub name: String,
    pub exe: String,
    pub status: String,
    pub parent_pid: Option<u32>,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub virtual_memory_mb: f64,
    /// Seconds since the Unix epoch.
    pub start_time: u64,
    pub run_time_seconds: u64,
    pub cmd: Vec<String>,
    pub cwd: Option<String>,
}

/// Resource usage of a single process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProcessUsage {
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

/// OS process enumeration. Implementations block.
pub trait ProcessSource: Send + Sync {
    /// Read every process once.
    fn sample(&self) -> Result<Vec<ProcessRead>>;

    /// Light listing for search/pickers.
    fn list(&self) -> Result<Vec<ProcessListing>>;

    /// Detail for one pid, `None` if it no longer exists.
    fn details(&self, pid: u32) -> Option<ProcessDetails>;

    /// Usage of the current process.
    fn own_usage(&self) -> Option<ProcessUsage>;
}

/// OS socket enumeration. Implementations block.
pub trait ConnectionSource: Send + Sync {
    fn connections(&self) -> Result<Vec<ConnectionFact>, ConnectionError>;
}

/// Aggregation key for a process name.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

pub struct Sampler {
    processes: Arc<dyn ProcessSource>,
    connections: Arc<dyn ConnectionSource>,
    logos: LogoTable,
    deviations: Arc<DeviationTracker>,
}

impl Sampler {
    pub fn new(
        processes: Arc<dyn ProcessSource>,
        connections: Arc<dyn ConnectionSource>,
        logos: LogoTable,
        deviations: Arc<DeviationTracker>,
    ) -> Self {
        Self {
            processes,
            connections,
            logos,
            deviations,
        }
    }

    pub fn processes(&self) -> &Arc<dyn ProcessSource> {
        &self.processes
    }

    pub fn deviations(&self) -> &Arc<DeviationTracker> {
        &self.deviations
    }

    pub fn logos(&self) -> &LogoTable {
        &self.logos
    }

    /// Run one sampling pass.
    ///
    /// Never fails: a broken connection table yields zero network counts and a
    /// broken process table yields whatever was aggregated so far.
    pub fn collect(&self) -> AggregateMap {
        let started = Instant::now();

        let connections = match self.connections.connections() {
            Ok(connections) => connections,
            Err(e) => {
                warn!(error = %e, "connection enumeration failed, counting no connections");
                Vec::new()
            }
        };

        let reads = match self.processes.sample() {
            Ok(reads) => reads,
            Err(e) => {
                error!(error = %e, "process enumeration failed, returning partial pass");
                Vec::new()
            }
        };

        let mut apps = AggregateMap::new();
        let mut pid_index: HashMap<u32, String> = HashMap::with_capacity(reads.len());
        let mut skipped = 0usize;

        for read in reads {
            let fact = match read {
                ProcessRead::Sampled(fact) => fact,
                ProcessRead::Skipped { pid, reason } => {
                    trace!(pid, reason, "skipping process");
                    skipped += 1;
                    continue;
                }
            };

            self.deviations.observe(&fact);

            let key = normalize_name(&fact.name);
            let memory_mb = fact.memory_mb();
            match apps.entry(key.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(AppAggregate {
                        name: fact.name.trim().to_string(),
                        representative_pid: fact.pid,
                        logo_ref: self.logos.lookup(&key).to_string(),
                        incoming_count: 0,
                        outgoing_count: 0,
                        cpu_percent: fact.cpu_percent,
                        memory_mb,
                        relevance_score: 0.0,
                    });
                }
                Entry::Occupied(mut slot) => {
                    let app = slot.get_mut();
                    app.cpu_percent += fact.cpu_percent;
                    app.memory_mb += memory_mb;
                }
            }
            pid_index.insert(fact.pid, key);
        }

        let mut attributed = 0usize;
        for conn in &connections {
            let Some(app) = conn
                .owning_pid
                .and_then(|pid| pid_index.get(&pid))
                .and_then(|key| apps.get_mut(key))
            else {
                continue;
            };
            match conn.state {
                ConnState::Listen => app.incoming_count += 1,
                ConnState::Established if conn.has_remote_address => app.outgoing_count += 1,
                _ => continue,
            }
            attributed += 1;
        }

        debug!(
            apps = apps.len(),
            processes = pid_index.len(),
            skipped,
            connections = connections.len(),
            attributed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sampling pass complete"
        );
        apps
    }
}
