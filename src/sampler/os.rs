//! Process enumeration backed by `sysinfo`.
//!
//! One `System` is kept across passes: per-process CPU usage is a delta
//! between two refreshes, so the first pass reports 0% for everything.

use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use sysinfo::{Pid, Process, ProcessStatus, ProcessesToUpdate, System};

use super::{ProcessDetails, ProcessListing, ProcessFact, ProcessRead, ProcessSource, ProcessUsage};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub struct SysinfoSource {
    system: Mutex<System>,
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSource {
    pub fn new() -> Self {
        let mut system = System::new();
        // Prime the CPU baseline so the first real pass has a delta.
        system.refresh_processes(ProcessesToUpdate::All, true);
        Self {
            system: Mutex::new(system),
        }
    }

    fn lock(&self) -> MutexGuard<'_, System> {
        self.system.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_process(pid: Pid, process: &Process) -> ProcessRead {
    match process.status() {
        ProcessStatus::Zombie | ProcessStatus::Dead => ProcessRead::Skipped {
            pid: pid.as_u32(),
            reason: "zombie",
        },
        _ => ProcessRead::Sampled(ProcessFact {
            pid: pid.as_u32(),
            name: process.name().to_string_lossy().into_owned(),
            cpu_percent: f64::from(process.cpu_usage()),
            memory_bytes: process.memory(),
        }),
    }
}

fn exe_string(process: &Process) -> String {
    process
        .exe()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

impl ProcessSource for SysinfoSource {
    fn sample(&self) -> Result<Vec<ProcessRead>> {
        let mut system = self.lock();
        system.refresh_processes(ProcessesToUpdate::All, true);
        Ok(system
            .processes()
            .iter()
            .map(|(pid, process)| read_process(*pid, process))
            .collect())
    }

    fn list(&self) -> Result<Vec<ProcessListing>> {
        let mut system = self.lock();
        system.refresh_processes(ProcessesToUpdate::All, true);
        Ok(system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessListing {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().into_owned(),
                exe: exe_string(process),
                status: process.status().to_string(),
            })
            .collect())
    }

    fn details(&self, pid: u32) -> Option<ProcessDetails> {
        let pid = Pid::from_u32(pid);
        let mut system = self.lock();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = system.process(pid)?;

        Some(ProcessDetails {
            pid: pid.as_u32(),
            name: process.name().to_string_lossy().into_owned(),
            exe: exe_string(process),
            status: process.status().to_string(),
            parent_pid: process.parent().map(|p| p.as_u32()),
            cpu_percent: f64::from(process.cpu_usage()),
            memory_mb: process.memory() as f64 / BYTES_PER_MB,
            virtual_memory_mb: process.virtual_memory() as f64 / BYTES_PER_MB,
            start_time: process.start_time(),
            run_time_seconds: process.run_time(),
            cmd: process
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
            cwd: process.cwd().map(|p| p.display().to_string()),
        })
    }

    fn own_usage(&self) -> Option<ProcessUsage> {
        let pid = sysinfo::get_current_pid().ok()?;
        let mut system = self.lock();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = system.process(pid)?;

        Some(ProcessUsage {
            cpu_percent: f64::from(process.cpu_usage()),
            memory_mb: process.memory() as f64 / BYTES_PER_MB,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_sees_current_process() {
        let source = SysinfoSource::new();
        let me = sysinfo::get_current_pid().unwrap().as_u32();
        let reads = source.sample().unwrap();
        assert!(reads
            .iter()
            .any(|r| matches!(r, ProcessRead::Sampled(f) if f.pid == me)));
    }

    #[test]
    fn test_details_for_current_and_missing_pid() {
        let source = SysinfoSource::new();
        let me = sysinfo::get_current_pid().unwrap().as_u32();

        let details = source.details(me).unwrap();
        assert_eq!(details.pid, me);
        assert!(details.memory_mb > 0.0);

        assert!(source.details(u32::MAX - 1).is_none());
    }

    #[test]
    fn test_own_usage() {
        let usage = SysinfoSource::new().own_usage().unwrap();
        assert!(usage.memory_mb > 0.0);
        assert!(usage.cpu_percent >= 0.0);
    }
}
