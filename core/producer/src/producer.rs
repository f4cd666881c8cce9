//! Producer lifecycle: sampling, the durable write protocol and path recovery.
//!
//! ## Lifecycle
//!
//! ```text
//! host init          → Producer::init            (first write)
//! host idle          → Producer::tick            (throttled sync)
//! host project load  → Producer::on_project_load (reinitialize path, write)
//! host deinit        → Producer::shutdown        (delete document)
//! ```
//!
//! ## Durable Write
//!
//! Each attempt serializes the session with a fresh `write_time`, writes it synced,
//! reads it back and compares `write_time`. A failed attempt pauses briefly and
//! reinitializes the path before retrying, since the host may have moved its
//! working directory underneath us. After the last attempt the update is dropped;
//! the next sync will try again.

use chrono::{DateTime, Utc};
use flrp_state_protocol::{ActivityState, SharedStateDocument};
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, error, info, warn};

use crate::config::ProducerConfig;
use crate::error::{StorageError, WriteError};
use crate::sensors::{Clock, HostSensors, SensorReadings, SystemClock};
use crate::session::{interval_passed, SessionState, WriteReason};
use crate::storage::{FsStorage, Storage};

/// The producer context. Construct once per host process and drive it from the
/// host's lifecycle callbacks.
pub struct Producer<H, C = SystemClock, S = FsStorage> {
    sensors: H,
    clock: C,
    storage: S,
    config: ProducerConfig,
    session: SessionState,
    state_file: PathBuf,
    last_sync: DateTime<Utc>,
}

impl<H: HostSensors> Producer<H> {
    pub fn new(sensors: H, config: ProducerConfig) -> Self {
        Producer::with_parts(sensors, SystemClock, FsStorage, config)
    }
}

impl<H, C, S> Producer<H, C, S>
where
    H: HostSensors,
    C: Clock,
    S: Storage,
{
    pub fn with_parts(sensors: H, clock: C, storage: S, config: ProducerConfig) -> Self {
        let now = clock.now();
        let state_file = config.state_file.clone();
        info!(path = %state_file.display(), "State producer created");
        Producer {
            sensors,
            clock,
            storage,
            config,
            session: SessionState::new(now),
            state_file,
            last_sync: now,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Currently configured document location (possibly relative).
    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Host init hook: writes the initial document.
    pub fn init(&mut self) {
        match self.write_state_file() {
            Ok(path) => {
                self.session.mark_written(self.clock.now());
                info!(path = %path.display(), "State producer initialized");
            }
            Err(err) => warn!(error = %err, "Initial state write failed; will retry on sync"),
        }
    }

    /// Host idle hook. Runs a sync at most once per sync interval and returns
    /// whether it did.
    pub fn tick(&mut self) -> bool {
        let now = self.clock.now();
        if !interval_passed(self.last_sync, now, self.config.sync_interval) {
            return false;
        }
        self.last_sync = now;
        self.sync(now);

        if self.session.active_state != ActivityState::Idle
            || !self.session.active_plugin.is_empty()
        {
            debug!(
                state = %self.session.active_state,
                bpm = self.session.bpm,
                plugin = %self.session.active_plugin,
                "Host status"
            );
        }
        true
    }

    /// Samples sensors and writes the document if the change rules call for it.
    pub fn sync(&mut self, now: DateTime<Utc>) -> Option<WriteReason> {
        let readings = SensorReadings::sample(&self.sensors);
        self.session.apply(&readings);

        let reason = self.session.write_reason(
            now,
            self.config.keep_alive,
            self.config.bpm_dead_band,
        )?;

        match self.write_state_file() {
            Ok(_) => {
                self.session.mark_written(now);
                match reason {
                    WriteReason::StateChanged => info!(
                        state = %self.session.active_state,
                        bpm = self.session.bpm,
                        "State changed"
                    ),
                    WriteReason::KeepAlive => debug!(
                        state = %self.session.active_state,
                        bpm = self.session.bpm,
                        "Periodic update"
                    ),
                    _ => debug!(?reason, "State document updated"),
                }
                Some(reason)
            }
            Err(err) => {
                error!(error = %err, "Dropping state update");
                None
            }
        }
    }

    /// Host project-load hook. The working directory may have moved, so the
    /// document location is re-probed before writing.
    pub fn on_project_load(&mut self, status: i32) {
        info!(status, "Project loaded");
        self.reinitialize_path();
        match self.write_state_file() {
            Ok(_) => self.session.mark_written(self.clock.now()),
            Err(err) => warn!(error = %err, "State write after project load failed"),
        }
    }

    /// Host deinit hook: removes the document so the consumer sees a clean exit.
    pub fn shutdown(&mut self) {
        let path = self.resolved_path();
        if !self.storage.exists(&path) {
            return;
        }
        match self.storage.remove(&path) {
            Ok(()) => info!(path = %path.display(), "State file cleaned up"),
            Err(err) => warn!(error = %err, "Failed to remove state file on shutdown"),
        }
    }

    /// Persists the session with bounded retries. Returns the absolute path that
    /// was written and verified.
    pub fn write_state_file(&mut self) -> Result<PathBuf, WriteError> {
        let attempts = self.config.max_write_attempts.max(1);
        let mut attempt = 1;

        loop {
            let path = self.resolved_path();
            match self.write_attempt(&path) {
                Ok(()) => {
                    debug!(
                        state = %self.session.active_state,
                        bpm = self.session.bpm,
                        path = %path.display(),
                        "Verified write"
                    );
                    return Ok(path);
                }
                Err(err) if attempt < attempts => {
                    warn!(attempt, error = %err, path = %path.display(), "Write attempt failed");
                    thread::sleep(self.config.retry_pause);
                    self.reinitialize_path();
                    attempt += 1;
                }
                Err(err) => {
                    warn!(attempt, error = %err, path = %path.display(), "Write attempt failed");
                    return Err(WriteError::Exhausted {
                        attempts,
                        path,
                        last: err,
                    });
                }
            }
        }
    }

    /// Probes the candidate locations in order and adopts the first writable one.
    /// Leaves the current path in place when none work.
    pub fn reinitialize_path(&mut self) -> bool {
        info!("Reinitializing state file path");
        let candidates = self.config.candidate_paths.clone();

        for candidate in candidates {
            match self.probe_location(&candidate) {
                Ok(()) => {
                    if candidate != self.state_file {
                        info!(
                            from = %self.state_file.display(),
                            to = %candidate.display(),
                            "Switched state file path"
                        );
                    }
                    self.state_file = candidate;
                    return true;
                }
                Err(err) => {
                    debug!(path = %candidate.display(), error = %err, "Cannot write here");
                }
            }
        }

        warn!(
            path = %self.state_file.display(),
            "No writable location found; keeping current path"
        );
        false
    }

    fn write_attempt(&self, path: &Path) -> Result<(), StorageError> {
        let write_time = self.clock.now().timestamp();
        let document = self
            .session
            .document(self.sensors.project_title(), write_time);
        let bytes = document.to_json_pretty()?;

        self.storage.write_synced(path, &bytes)?;

        let written = SharedStateDocument::from_slice(&self.storage.read(path)?)?;
        if written.write_time != write_time {
            return Err(StorageError::VerificationMismatch {
                path: path.to_path_buf(),
                expected: write_time,
                found: written.write_time,
            });
        }
        Ok(())
    }

    /// Write, read back and delete a throwaway payload beside `candidate`.
    ///
    /// The probe uses a sibling file so a concurrent reader never sees a
    /// document that doesn't match the schema.
    fn probe_location(&self, candidate: &Path) -> Result<(), StorageError> {
        let path = absolute(candidate);
        if let Some(dir) = path.parent() {
            if !self.storage.exists(dir) {
                if let Err(err) = self.storage.create_dir_all(dir) {
                    debug!(dir = %dir.display(), error = %err, "Could not create directory");
                }
            }
        }

        let probe = probe_path(&path);
        let payload = serde_json::json!({ "test": true });
        let bytes = serde_json::to_vec(&payload).map_err(|source| StorageError::Json {
            context: "serialize probe".to_string(),
            source,
        })?;
        self.storage.write_synced(&probe, &bytes)?;

        let read_back: serde_json::Value = serde_json::from_slice(&self.storage.read(&probe)?)
            .map_err(|source| StorageError::Json {
                context: format!("parse probe {}", probe.display()),
                source,
            })?;

        if let Err(err) = self.storage.remove(&probe) {
            debug!(path = %probe.display(), error = %err, "Probe cleanup failed");
        }

        if read_back != payload {
            return Err(StorageError::ProbeMismatch(probe));
        }
        Ok(())
    }

    fn resolved_path(&self) -> PathBuf {
        absolute(&self.state_file)
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

fn probe_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("state"));
    name.push(".probe");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::time::Duration;
    use tempfile::tempdir;

    #[derive(Clone, Default)]
    struct FakeSensors {
        readings: Rc<RefCell<SensorReadings>>,
    }

    impl FakeSensors {
        fn set(&self, readings: SensorReadings) {
            *self.readings.borrow_mut() = readings;
        }
    }

    impl HostSensors for FakeSensors {
        fn is_recording(&self) -> bool {
            self.readings.borrow().recording
        }
        fn is_playing(&self) -> bool {
            self.readings.borrow().playing
        }
        fn is_piano_roll_focused(&self) -> bool {
            self.readings.borrow().piano_roll_focused
        }
        fn current_tempo(&self) -> f64 {
            self.readings.borrow().bpm
        }
        fn focused_plugin_name(&self) -> String {
            self.readings.borrow().focused_plugin.clone()
        }
        fn project_title(&self) -> String {
            "demo".to_string()
        }
    }

    #[derive(Clone)]
    struct ManualClock(Rc<Cell<DateTime<Utc>>>);

    impl ManualClock {
        fn new() -> Self {
            ManualClock(Rc::new(Cell::new(
                Utc.timestamp_opt(1_760_600_000, 0).unwrap(),
            )))
        }
        fn advance_ms(&self, ms: i64) {
            self.0.set(self.0.get() + ChronoDuration::milliseconds(ms));
        }
        fn rewind_secs(&self, secs: i64) {
            self.0.set(self.0.get() - ChronoDuration::seconds(secs));
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.0.get()
        }
    }

    #[derive(Clone, Default)]
    struct CountingStorage {
        writes: Rc<Cell<usize>>,
    }

    impl Storage for CountingStorage {
        fn write_synced(&self, path: &Path, contents: &[u8]) -> Result<(), StorageError> {
            self.writes.set(self.writes.get() + 1);
            FsStorage.write_synced(path, contents)
        }
        fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
            FsStorage.read(path)
        }
        fn remove(&self, path: &Path) -> Result<(), StorageError> {
            FsStorage.remove(path)
        }
        fn exists(&self, path: &Path) -> bool {
            FsStorage.exists(path)
        }
        fn create_dir_all(&self, dir: &Path) -> Result<(), StorageError> {
            FsStorage.create_dir_all(dir)
        }
    }

    fn config_for(dir: &Path) -> ProducerConfig {
        ProducerConfig {
            state_file: dir.join("state.json"),
            candidate_paths: vec![dir.join("state.json")],
            retry_pause: Duration::from_millis(1),
            ..ProducerConfig::default()
        }
    }

    fn listening() -> SensorReadings {
        SensorReadings {
            playing: true,
            bpm: 128.0,
            ..SensorReadings::default()
        }
    }

    #[test]
    fn test_tick_faster_than_interval_is_noop() {
        let temp = tempdir().unwrap();
        let clock = ManualClock::new();
        let storage = CountingStorage::default();
        let mut producer = Producer::with_parts(
            FakeSensors::default(),
            clock.clone(),
            storage.clone(),
            config_for(temp.path()),
        );

        clock.advance_ms(300);
        assert!(!producer.tick());
        clock.advance_ms(200);
        assert!(!producer.tick(), "exactly one interval is not enough");
        clock.advance_ms(1);
        assert!(producer.tick());
        assert_eq!(storage.writes.get(), 1);
    }

    #[test]
    fn test_unchanged_sensors_write_only_at_keep_alive_cadence() {
        let temp = tempdir().unwrap();
        let clock = ManualClock::new();
        let storage = CountingStorage::default();
        let sensors = FakeSensors::default();
        sensors.set(listening());
        let mut producer = Producer::with_parts(
            sensors,
            clock.clone(),
            storage.clone(),
            config_for(temp.path()),
        );

        // Syncs at 0.6s, 1.2s, ... 20.4s. Writes land at 0.6, 6.0, 11.4, 16.8.
        for _ in 0..34 {
            clock.advance_ms(600);
            assert!(producer.tick());
        }
        assert_eq!(storage.writes.get(), 4);
    }

    #[test]
    fn test_clock_set_back_keeps_syncing_and_keep_alive() {
        let temp = tempdir().unwrap();
        let clock = ManualClock::new();
        let storage = CountingStorage::default();
        let sensors = FakeSensors::default();
        sensors.set(listening());
        let mut producer = Producer::with_parts(
            sensors,
            clock.clone(),
            storage.clone(),
            config_for(temp.path()),
        );

        clock.advance_ms(600);
        assert!(producer.tick());
        assert_eq!(storage.writes.get(), 1);

        // The wall clock jumps an hour into the past.
        clock.rewind_secs(3600);
        assert!(producer.tick());
        assert_eq!(storage.writes.get(), 2, "keep-alive re-anchors on the new clock");

        // Cadence resumes from the corrected time.
        clock.advance_ms(300);
        assert!(!producer.tick());
        for _ in 0..9 {
            clock.advance_ms(600);
            assert!(producer.tick());
        }
        assert_eq!(storage.writes.get(), 3);
    }

    #[test]
    fn test_small_tempo_jitter_does_not_write() {
        let temp = tempdir().unwrap();
        let clock = ManualClock::new();
        let storage = CountingStorage::default();
        let sensors = FakeSensors::default();
        sensors.set(listening());
        let mut producer = Producer::with_parts(
            sensors.clone(),
            clock.clone(),
            storage.clone(),
            config_for(temp.path()),
        );

        clock.advance_ms(600);
        producer.tick();
        assert_eq!(storage.writes.get(), 1);

        sensors.set(SensorReadings {
            bpm: 128.05,
            ..listening()
        });
        clock.advance_ms(600);
        producer.tick();
        assert_eq!(storage.writes.get(), 1);

        sensors.set(SensorReadings {
            bpm: 128.2,
            ..listening()
        });
        clock.advance_ms(600);
        producer.tick();
        assert_eq!(storage.writes.get(), 2);
        assert_eq!(producer.session().last_written_bpm, 128.2);
    }

    #[test]
    fn test_recording_scenario_writes_recording_document() {
        let temp = tempdir().unwrap();
        let clock = ManualClock::new();
        let sensors = FakeSensors::default();
        sensors.set(SensorReadings {
            recording: true,
            bpm: 140.3,
            focused_plugin: "X".to_string(),
            ..SensorReadings::default()
        });
        let mut producer = Producer::with_parts(
            sensors,
            clock.clone(),
            FsStorage,
            config_for(temp.path()),
        );

        clock.advance_ms(600);
        producer.tick();

        let doc =
            SharedStateDocument::from_slice(&std::fs::read(temp.path().join("state.json")).unwrap())
                .unwrap();
        assert_eq!(doc.state, ActivityState::Recording);
        assert_eq!(doc.bpm, 140.3);
        // Plugin focus is ignored while recording.
        assert_eq!(doc.plugin, "");
        assert_eq!(doc.project_name, "demo");
        assert_eq!(doc.timestamp, 1_760_600_000);
    }

    #[test]
    fn test_init_writes_and_shutdown_deletes() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("state.json");
        let mut producer = Producer::with_parts(
            FakeSensors::default(),
            ManualClock::new(),
            FsStorage,
            config_for(temp.path()),
        );

        producer.init();
        assert!(file.exists());

        producer.shutdown();
        assert!(!file.exists());

        // Second shutdown with nothing to delete is harmless.
        producer.shutdown();
    }

    #[test]
    fn test_reinitialize_skips_unwritable_candidates() {
        let temp = tempdir().unwrap();
        // A regular file where a directory is expected can never hold the document.
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let good = temp.path().join("good").join("state.json");
        let config = ProducerConfig {
            state_file: blocker.join("state.json"),
            candidate_paths: vec![blocker.join("state.json"), good.clone()],
            retry_pause: Duration::from_millis(1),
            ..ProducerConfig::default()
        };
        let mut producer = Producer::with_parts(
            FakeSensors::default(),
            ManualClock::new(),
            FsStorage,
            config,
        );

        assert!(producer.reinitialize_path());
        assert_eq!(producer.state_file(), good.as_path());
        // The probe cleaned up after itself and never touched the document name.
        assert!(!good.exists());
        assert_eq!(std::fs::read_dir(good.parent().unwrap()).unwrap().count(), 0);
    }

    #[test]
    fn test_reinitialize_keeps_path_when_nothing_is_writable() {
        let temp = tempdir().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let original = blocker.join("state.json");
        let config = ProducerConfig {
            state_file: original.clone(),
            candidate_paths: vec![blocker.join("other.json")],
            retry_pause: Duration::from_millis(1),
            ..ProducerConfig::default()
        };
        let mut producer = Producer::with_parts(
            FakeSensors::default(),
            ManualClock::new(),
            FsStorage,
            config,
        );

        assert!(!producer.reinitialize_path());
        assert_eq!(producer.state_file(), original.as_path());
        assert!(producer.write_state_file().is_err());
    }

    #[test]
    fn test_project_load_moves_to_first_candidate() {
        let temp = tempdir().unwrap();
        let first = temp.path().join("a").join("state.json");
        let config = ProducerConfig {
            state_file: temp.path().join("state.json"),
            candidate_paths: vec![first.clone()],
            retry_pause: Duration::from_millis(1),
            ..ProducerConfig::default()
        };
        let mut producer = Producer::with_parts(
            FakeSensors::default(),
            ManualClock::new(),
            FsStorage,
            config,
        );

        producer.on_project_load(0);
        assert_eq!(producer.state_file(), first.as_path());
        assert!(first.exists());
    }

    #[test]
    fn test_probe_path_is_sibling() {
        let probe = probe_path(Path::new("/tmp/fl_studio_state.json"));
        assert_eq!(probe, PathBuf::from("/tmp/fl_studio_state.json.probe"));
    }
}
