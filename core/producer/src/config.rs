//! Producer tunables and the storage locations tried during path reinitialization.

use flrp_state_protocol::DEFAULT_STATE_FILE_NAME;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(5);
pub const DEFAULT_BPM_DEAD_BAND: f64 = 0.1;
pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_millis(100);

#[cfg(windows)]
const FALLBACK_TEMP_DIR: &str = "C:\\temp";
#[cfg(not(windows))]
const FALLBACK_TEMP_DIR: &str = "/tmp";

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Minimum spacing between syncs; faster ticks are no-ops.
    pub sync_interval: Duration,
    /// Force a write after this long without one, even if nothing changed.
    pub keep_alive: Duration,
    /// Tempo changes at or below this delta do not trigger a write.
    pub bpm_dead_band: f64,
    pub max_write_attempts: u32,
    /// Pause before reinitializing the path after a failed attempt.
    pub retry_pause: Duration,
    /// Initial document location. Relative paths resolve against the working directory.
    pub state_file: PathBuf,
    /// Ordered locations probed when the current one stops working.
    pub candidate_paths: Vec<PathBuf>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        ProducerConfig {
            sync_interval: DEFAULT_SYNC_INTERVAL,
            keep_alive: DEFAULT_KEEP_ALIVE,
            bpm_dead_band: DEFAULT_BPM_DEAD_BAND,
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
            retry_pause: DEFAULT_RETRY_PAUSE,
            state_file: PathBuf::from(DEFAULT_STATE_FILE_NAME),
            candidate_paths: default_candidate_paths(DEFAULT_STATE_FILE_NAME),
        }
    }
}

/// Candidate document locations, most preferred first:
/// system temp dir, hard-coded temp fallback, home dir, working directory.
pub fn default_candidate_paths(file_name: &str) -> Vec<PathBuf> {
    let mut paths = vec![
        env::temp_dir().join(file_name),
        PathBuf::from(FALLBACK_TEMP_DIR).join(file_name),
    ];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(file_name));
    }
    paths.push(PathBuf::from(file_name));
    paths
}
