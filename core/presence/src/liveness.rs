//! Host liveness detection.
//!
//! The state document alone cannot tell a crashed host from an idle one: a
//! crash leaves the last document behind. So liveness comes from the process
//! table first. Where the platform can't enumerate processes we fall back to
//! document freshness: the producer rewrites at least every 5 seconds, so an
//! mtime within [`FRESHNESS_WINDOW`] means something is still writing.
//!
//! There is no hysteresis; one negative check is authoritative.

use fs_err as fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use sysinfo::System;

pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(10);

pub trait LivenessProbe {
    fn is_host_alive(&mut self) -> bool;
}

/// True if `path` was modified less than `window` before `now`.
/// A missing or unreadable file is never fresh.
pub fn file_recently_modified(path: &Path, now: SystemTime, window: Duration) -> bool {
    let modified = match fs::metadata(path).and_then(|meta| meta.modified()) {
        Ok(modified) => modified,
        Err(_) => return false,
    };
    match now.duration_since(modified) {
        Ok(age) => age < window,
        // mtime ahead of our clock: written just now as far as we can tell.
        Err(_) => true,
    }
}

/// Liveness from the state document's mtime alone.
#[derive(Debug, Clone)]
pub struct MtimeLiveness {
    state_file: PathBuf,
    window: Duration,
}

impl MtimeLiveness {
    pub fn new(state_file: impl Into<PathBuf>) -> Self {
        MtimeLiveness {
            state_file: state_file.into(),
            window: FRESHNESS_WINDOW,
        }
    }
}

impl LivenessProbe for MtimeLiveness {
    fn is_host_alive(&mut self) -> bool {
        file_recently_modified(&self.state_file, SystemTime::now(), self.window)
    }
}

/// Source of running process names.
pub trait ProcessTable {
    /// `None` when this platform can't enumerate processes.
    fn process_names(&mut self) -> Option<Vec<String>>;
}

/// The OS process table via sysinfo.
pub struct SysinfoProcesses {
    system: System,
}

impl SysinfoProcesses {
    pub fn new() -> Self {
        SysinfoProcesses {
            system: System::new(),
        }
    }
}

impl Default for SysinfoProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoProcesses {
    fn process_names(&mut self) -> Option<Vec<String>> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return None;
        }
        self.system.refresh_processes();
        Some(
            self.system
                .processes()
                .values()
                .map(|process| process.name().to_string())
                .collect(),
        )
    }
}

/// Process-table scan with the mtime fallback.
pub struct ProcessLiveness<T = SysinfoProcesses> {
    table: T,
    host_name: String,
    fallback: MtimeLiveness,
}

impl ProcessLiveness {
    pub fn new(host_name: &str, state_file: impl Into<PathBuf>) -> Self {
        ProcessLiveness::with_table(SysinfoProcesses::new(), host_name, state_file)
    }
}

impl<T: ProcessTable> ProcessLiveness<T> {
    pub fn with_table(table: T, host_name: &str, state_file: impl Into<PathBuf>) -> Self {
        ProcessLiveness {
            table,
            host_name: host_name.to_lowercase(),
            fallback: MtimeLiveness::new(state_file),
        }
    }

    /// `None` when no process list is available. An empty list counts as
    /// unavailable: the scanning process itself is always running.
    fn scan_processes(&mut self) -> Option<bool> {
        let names = self.table.process_names()?;
        if names.is_empty() {
            return None;
        }
        Some(names.iter().any(|name| name_matches(name, &self.host_name)))
    }
}

impl<T: ProcessTable> LivenessProbe for ProcessLiveness<T> {
    fn is_host_alive(&mut self) -> bool {
        match self.scan_processes() {
            Some(alive) => alive,
            None => {
                tracing::debug!("Process enumeration unavailable; using state file freshness");
                self.fallback.is_host_alive()
            }
        }
    }
}

fn name_matches(process_name: &str, host_name_lower: &str) -> bool {
    process_name.to_lowercase().contains(host_name_lower)
}
