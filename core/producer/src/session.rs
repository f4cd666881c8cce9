//! In-memory session state and the write decision.
//!
//! The session is never persisted directly; [`SessionState::document`] derives the
//! on-disk record from it.

use chrono::{DateTime, Utc};
use flrp_state_protocol::{ActivityState, SharedStateDocument};
use std::time::Duration;

use crate::sensors::SensorReadings;

/// Why a sync decided to write. Checked in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteReason {
    StateChanged,
    PluginChanged,
    TempoChanged,
    KeepAlive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub active_state: ActivityState,
    pub bpm: f64,
    pub active_plugin: String,
    /// Epoch seconds, fixed when the producer is created.
    pub session_start_time: i64,
    pub last_written_state: Option<ActivityState>,
    pub last_written_plugin: Option<String>,
    pub last_written_bpm: f64,
    pub last_file_write_time: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        SessionState {
            active_state: ActivityState::Idle,
            bpm: 0.0,
            active_plugin: String::new(),
            session_start_time: started_at.timestamp(),
            last_written_state: None,
            last_written_plugin: None,
            last_written_bpm: 0.0,
            last_file_write_time: None,
        }
    }

    /// Folds one sensor sample into the session.
    ///
    /// The focused plugin is only adopted while idle; in any other state the
    /// previously tracked plugin is kept.
    pub fn apply(&mut self, readings: &SensorReadings) {
        self.bpm = readings.bpm;
        self.active_state = ActivityState::resolve(
            readings.recording,
            readings.playing,
            readings.piano_roll_focused,
        );
        if self.active_state == ActivityState::Idle && !readings.focused_plugin.is_empty() {
            self.active_plugin = readings.focused_plugin.clone();
        }
    }

    /// Compares the session against what was last written successfully.
    pub fn write_reason(
        &self,
        now: DateTime<Utc>,
        keep_alive: Duration,
        bpm_dead_band: f64,
    ) -> Option<WriteReason> {
        if self.last_written_state != Some(self.active_state) {
            return Some(WriteReason::StateChanged);
        }
        if self.last_written_plugin.as_deref() != Some(self.active_plugin.as_str()) {
            return Some(WriteReason::PluginChanged);
        }
        if (self.bpm - self.last_written_bpm).abs() > bpm_dead_band {
            return Some(WriteReason::TempoChanged);
        }
        let keep_alive_due = match self.last_file_write_time {
            Some(last) => interval_passed(last, now, keep_alive),
            None => true,
        };
        keep_alive_due.then_some(WriteReason::KeepAlive)
    }

    pub fn mark_written(&mut self, at: DateTime<Utc>) {
        self.last_written_state = Some(self.active_state);
        self.last_written_plugin = Some(self.active_plugin.clone());
        self.last_written_bpm = self.bpm;
        self.last_file_write_time = Some(at);
    }

    pub fn document(&self, project_name: String, write_time: i64) -> SharedStateDocument {
        SharedStateDocument {
            state: self.active_state,
            bpm: self.bpm,
            plugin: self.active_plugin.clone(),
            timestamp: self.session_start_time,
            project_name,
            write_time,
        }
    }
}

/// True once strictly more than `interval` separates `earlier` from `later`.
///
/// A wall clock stepped backwards (`later` before `earlier`) also counts as
/// passed, so a clock correction re-anchors the cadence instead of stalling it
/// until the clock catches up.
pub(crate) fn interval_passed(
    earlier: DateTime<Utc>,
    later: DateTime<Utc>,
    interval: Duration,
) -> bool {
    match later.signed_duration_since(earlier).to_std() {
        Ok(elapsed) => elapsed > interval,
        Err(_) => true,
    }
}
