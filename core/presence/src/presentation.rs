//! Maps a [`PresenceSnapshot`] onto what the presence sink displays.

use flrp_state_protocol::PresenceSnapshot;

pub const LARGE_IMAGE: &str = "fl_studio_logo";
pub const LARGE_TEXT: &str = "FL Studio";

#[derive(Debug, Clone, PartialEq)]
pub struct SinkPayload {
    /// Top line, e.g. "Listening to Track • Serum".
    pub details: String,
    /// Status line, e.g. "128 BPM".
    pub state: String,
    pub large_image: String,
    pub large_text: String,
    pub small_image: String,
    pub small_text: String,
    /// Epoch seconds the sink counts elapsed time from (session start).
    pub start: i64,
}

/// Total mapping: unknown state names fall into the idle presentation.
pub fn present(snapshot: &PresenceSnapshot) -> SinkPayload {
    let (caption, small_image, small_text) = match snapshot.state.as_str() {
        "Recording" => ("Recording", "recording", "Recording"),
        "Listening" => ("Listening to Track", "listening", "Playing"),
        "Composing" => ("Composing", "composing", "Composing"),
        _ => ("Idle", "idle", "Idle"),
    };

    let details = if snapshot.plugin.is_empty() {
        caption.to_string()
    } else {
        format!("{} • {}", caption, snapshot.plugin)
    };

    SinkPayload {
        details,
        state: format!("{} BPM", snapshot.bpm),
        large_image: LARGE_IMAGE.to_string(),
        large_text: LARGE_TEXT.to_string(),
        small_image: small_image.to_string(),
        small_text: small_text.to_string(),
        start: snapshot.timestamp,
    }
}

/// The fields whose change warrants a sink update. `write_time` is deliberately
/// absent: it changes on every keep-alive write.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeKey {
    state: String,
    bpm: f64,
    plugin: String,
}

impl From<&PresenceSnapshot> for ChangeKey {
    fn from(snapshot: &PresenceSnapshot) -> Self {
        ChangeKey {
            state: snapshot.state.clone(),
            bpm: snapshot.bpm,
            plugin: snapshot.plugin.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(state: &str, bpm: f64, plugin: &str) -> PresenceSnapshot {
        PresenceSnapshot {
            state: state.to_string(),
            bpm,
            plugin: plugin.to_string(),
            timestamp: 1_760_600_000,
        }
    }

    #[test]
    fn test_listening_at_whole_tempo() {
        let payload = present(&snapshot("Listening", 128.0, ""));
        assert_eq!(payload.details, "Listening to Track");
        assert_eq!(payload.state, "128 BPM");
        assert_eq!(payload.small_image, "listening");
        assert_eq!(payload.small_text, "Playing");
        assert_eq!(payload.large_image, LARGE_IMAGE);
        assert_eq!(payload.large_text, LARGE_TEXT);
        assert_eq!(payload.start, 1_760_600_000);
    }

    #[test]
    fn test_recording_without_plugin() {
        let payload = present(&snapshot("Recording", 140.3, ""));
        assert_eq!(payload.details, "Recording");
        assert_eq!(payload.state, "140.3 BPM");
        assert_eq!(payload.small_image, "recording");
    }

    #[test]
    fn test_plugin_appended_regardless_of_state() {
        assert_eq!(
            present(&snapshot("Recording", 140.3, "X")).details,
            "Recording • X"
        );
        assert_eq!(present(&snapshot("Idle", 90.0, "Serum")).details, "Idle • Serum");
    }

    #[test]
    fn test_composing_mapping() {
        let payload = present(&snapshot("Composing", 100.0, ""));
        assert_eq!(
            (payload.details.as_str(), payload.small_image.as_str(), payload.small_text.as_str()),
            ("Composing", "composing", "Composing")
        );
    }

    #[test]
    fn test_unknown_state_falls_back_to_idle() {
        for state in ["Unknown", "", "recording"] {
            let payload = present(&snapshot(state, 120.0, ""));
            assert_eq!(payload.details, "Idle");
            assert_eq!(payload.small_image, "idle");
            assert_eq!(payload.small_text, "Idle");
        }
    }

    #[test]
    fn test_change_key_ignores_timestamp() {
        let a = snapshot("Idle", 120.0, "");
        let mut b = a.clone();
        b.timestamp += 30;
        assert_eq!(ChangeKey::from(&a), ChangeKey::from(&b));

        b.bpm = 121.0;
        assert_ne!(ChangeKey::from(&a), ChangeKey::from(&b));
    }
}
