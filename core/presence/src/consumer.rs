//! The presence consumer loop.
//!
//! ```text
//!                 host alive
//!   ┌──────────────┐ ───────────▶ ┌──────────┐
//!   │WaitingForHost│              │ Tracking │  read doc → key changed? → update
//!   └──────────────┘ ◀─────────── └──────────┘
//!      poll 5 s       host gone       poll 0.5 s
//!                  (clear once, reset key)
//! ```
//!
//! Each [`Consumer::poll`] performs one tick and returns how long to sleep
//! before the next one, so tests drive the machine without real time.

use chrono::Utc;
use flrp_state_protocol::PresenceSnapshot;
use fs_err as fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::PresenceConfig;
use crate::error::SinkError;
use crate::liveness::LivenessProbe;
use crate::presentation::{present, ChangeKey};
use crate::sink::PresenceSink;

/// Longest uninterrupted sleep, so cancellation is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingForHost,
    Tracking,
}

pub struct Consumer<S, L> {
    sink: S,
    liveness: L,
    state_file: PathBuf,
    tracking_interval: Duration,
    waiting_interval: Duration,
    phase: Phase,
    last_key: Option<ChangeKey>,
}

impl<S: PresenceSink, L: LivenessProbe> Consumer<S, L> {
    pub fn new(sink: S, liveness: L, config: &PresenceConfig) -> Self {
        Consumer {
            sink,
            liveness,
            state_file: config.state_file.clone(),
            tracking_interval: config.tracking_interval,
            waiting_interval: config.waiting_interval,
            phase: Phase::WaitingForHost,
            last_key: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The `(state, bpm, plugin)` last delivered to the sink, whether accepted
    /// or rejected. Connection failures leave it untouched.
    pub fn last_key(&self) -> Option<&ChangeKey> {
        self.last_key.as_ref()
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// One tick of the loop. Returns the delay before the next tick.
    pub fn poll(&mut self) -> Duration {
        if !self.liveness.is_host_alive() {
            return self.host_gone();
        }

        if self.phase == Phase::WaitingForHost {
            info!(path = %self.state_file.display(), "Host detected; tracking state file");
            self.phase = Phase::Tracking;
        }

        if let Some(snapshot) = self.read_snapshot() {
            self.apply(&snapshot);
        }
        self.tracking_interval
    }

    /// Polls until `cancelled` is set, then clears and closes the sink.
    pub fn run(&mut self, cancelled: &AtomicBool) {
        while !cancelled.load(Ordering::SeqCst) {
            let wait = self.poll();
            sleep_unless_cancelled(wait, cancelled);
        }
        self.shutdown();
    }

    /// Best-effort: failures are logged and swallowed.
    pub fn shutdown(&mut self) {
        if !self.sink.is_connected() {
            return;
        }
        if let Err(err) = self.sink.clear() {
            debug!(error = %err, "Failed to clear presence during shutdown");
        }
        if let Err(err) = self.sink.close() {
            debug!(error = %err, "Failed to close presence sink");
        }
        info!("Presence consumer stopped");
    }

    fn host_gone(&mut self) -> Duration {
        match self.phase {
            Phase::Tracking => {
                info!("Host no longer running; clearing presence");
                match self.sink.clear() {
                    Ok(()) => {}
                    Err(SinkError::NotConnected) => {
                        debug!("Presence sink not connected; nothing to clear")
                    }
                    Err(err) => warn!(error = %err, "Failed to clear presence"),
                }
                self.last_key = None;
                self.phase = Phase::WaitingForHost;
            }
            Phase::WaitingForHost => debug!("Waiting for host"),
        }
        self.waiting_interval
    }

    fn read_snapshot(&self) -> Option<PresenceSnapshot> {
        let bytes = match fs::read(&self.state_file) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.state_file.display(), "State file not written yet");
                return None;
            }
            Err(err) => {
                warn!(error = %err, "Failed to read state file");
                return None;
            }
        };

        match PresenceSnapshot::parse(&bytes, Utc::now().timestamp()) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(
                    error = %err,
                    path = %self.state_file.display(),
                    "State file is not valid JSON; skipping tick"
                );
                None
            }
        }
    }

    fn apply(&mut self, snapshot: &PresenceSnapshot) {
        let key = ChangeKey::from(snapshot);
        if self.last_key.as_ref() == Some(&key) {
            return;
        }

        if !self.sink.is_connected() {
            if let Err(err) = self.sink.connect() {
                warn!(error = %err, "Presence sink unavailable; will retry on next change");
                return;
            }
        }

        let payload = present(snapshot);
        match self.sink.update(&payload) {
            Ok(()) => {
                info!(
                    state = %snapshot.state,
                    bpm = snapshot.bpm,
                    plugin = %snapshot.plugin,
                    "Presence updated"
                );
                self.last_key = Some(key);
            }
            Err(SinkError::Rejected(reason)) => {
                // The same triple is not resent after a rejection.
                warn!(reason = %reason, "Presence sink rejected update");
                self.last_key = Some(key);
            }
            Err(err) => warn!(error = %err, "Failed to update presence; will retry"),
        }
    }
}

fn sleep_unless_cancelled(total: Duration, cancelled: &AtomicBool) {
    let deadline = Instant::now() + total;
    loop {
        if cancelled.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}
