//! Shared state document schema for the FLRP bridge.
//!
//! This crate is shared by the in-host producer and the presence consumer so the
//! two sides cannot drift. The producer is the only writer; the consumer reads
//! leniently and never fails on a partially-formed document.
//!
//! # File Format
//!
//! ```json
//! {
//!   "state": "Listening",
//!   "bpm": 128.0,
//!   "plugin": "",
//!   "timestamp": 1760600000,
//!   "project_name": "demo",
//!   "write_time": 1760600042
//! }
//! ```
//!
//! Pretty-printed and compact encodings both parse.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// File name the producer writes inside whichever directory it settles on.
pub const DEFAULT_STATE_FILE_NAME: &str = "fl_studio_state.json";

/// Tempo reported to the consumer when the document carries none.
pub const DEFAULT_BPM: f64 = 120.0;

/// State name reported to the consumer when the document carries none.
pub const UNKNOWN_STATE: &str = "Unknown";

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("state document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown activity state: {0}")]
    UnknownState(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Activity State
// ═══════════════════════════════════════════════════════════════════════════════

/// What the host is doing, derived from its transport and UI flags.
///
/// Precedence when several flags are set at once:
/// `Recording > Composing > Listening > Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActivityState {
    #[default]
    Idle,
    Recording,
    Listening,
    Composing,
}

impl ActivityState {
    /// Resolves the activity from raw sensor flags.
    ///
    /// Recording wins over everything; a focused piano roll wins over playback.
    pub fn resolve(recording: bool, playing: bool, piano_roll_focused: bool) -> Self {
        if recording {
            ActivityState::Recording
        } else if piano_roll_focused {
            ActivityState::Composing
        } else if playing {
            ActivityState::Listening
        } else {
            ActivityState::Idle
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityState::Idle => "Idle",
            ActivityState::Recording => "Recording",
            ActivityState::Listening => "Listening",
            ActivityState::Composing => "Composing",
        }
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityState {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Idle" => Ok(ActivityState::Idle),
            "Recording" => Ok(ActivityState::Recording),
            "Listening" => Ok(ActivityState::Listening),
            "Composing" => Ok(ActivityState::Composing),
            other => Err(DocumentError::UnknownState(other.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Shared State Document
// ═══════════════════════════════════════════════════════════════════════════════

/// The on-disk record exchanged between producer and consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedStateDocument {
    pub state: ActivityState,
    pub bpm: f64,
    pub plugin: String,
    /// Session start (epoch seconds). Immutable for the producer's lifetime.
    pub timestamp: i64,
    pub project_name: String,
    /// Epoch seconds of this write. Only used to verify the write landed.
    pub write_time: i64,
}

impl SharedStateDocument {
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, DocumentError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Strict decode used by the producer when verifying its own write.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DocumentError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Presence Snapshot (consumer view)
// ═══════════════════════════════════════════════════════════════════════════════

/// The subset of the document the consumer cares about, with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceSnapshot {
    /// Kept as a raw string: unknown names fall through to the idle presentation.
    pub state: String,
    pub bpm: f64,
    pub plugin: String,
    pub timestamp: i64,
}

impl PresenceSnapshot {
    /// Parses a document leniently.
    ///
    /// Only undecodable JSON is an error. Any missing or mistyped field falls back
    /// to its default; `now` supplies the default `timestamp`.
    pub fn parse(bytes: &[u8], now: i64) -> Result<Self, DocumentError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Ok(Self::from_value(&value, now))
    }

    pub fn from_value(value: &Value, now: i64) -> Self {
        let state = value
            .get("state")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_STATE)
            .to_string();
        let bpm = value
            .get("bpm")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_BPM);
        let plugin = value
            .get("plugin")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let timestamp = value
            .get("timestamp")
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .unwrap_or(now);

        PresenceSnapshot {
            state,
            bpm,
            plugin,
            timestamp,
        }
    }
}
