//! Host-facing seams: transport sensors and the time source.

use chrono::{DateTime, Utc};

/// Read-only view of the host's transport, mixer and UI state.
///
/// Implementations must be cheap: they are queried from the host's idle callback.
pub trait HostSensors {
    fn is_recording(&self) -> bool;
    fn is_playing(&self) -> bool;
    fn is_piano_roll_focused(&self) -> bool;
    fn current_tempo(&self) -> f64;
    /// Name of the focused plugin window, empty when none is focused.
    fn focused_plugin_name(&self) -> String;
    fn project_title(&self) -> String;
}

/// One sample of every sensor the sync step consumes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SensorReadings {
    pub recording: bool,
    pub playing: bool,
    pub piano_roll_focused: bool,
    pub bpm: f64,
    pub focused_plugin: String,
}

impl SensorReadings {
    pub fn sample<H: HostSensors + ?Sized>(sensors: &H) -> Self {
        SensorReadings {
            recording: sensors.is_recording(),
            playing: sensors.is_playing(),
            piano_roll_focused: sensors.is_piano_roll_focused(),
            bpm: sensors.current_tempo(),
            focused_plugin: sensors.focused_plugin_name(),
        }
    }
}

/// Wall-clock time source. Throttling and keep-alive are measured on it; a
/// step backwards is treated as the interval having passed.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
