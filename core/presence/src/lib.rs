//! # flrp-presence
//!
//! Standalone consumer for the FLRP bridge: polls the shared state document
//! written by the in-host producer and mirrors it into a presence sink.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flrp_presence::{Consumer, DiscordIpc, ProcessLiveness, PresenceSink};
//!
//! let mut sink = DiscordIpc::new(&config.application_id);
//! sink.connect()?;
//! let liveness = ProcessLiveness::new(&config.host_process_name, &config.state_file);
//! Consumer::new(sink, liveness, &config).run(&cancelled);
//! ```

pub mod config;
pub mod consumer;
pub mod discord;
pub mod error;
pub mod liveness;
pub mod presentation;
pub mod sink;

pub use config::{ConfigOverrides, PresenceConfig};
pub use consumer::{Consumer, Phase};
pub use discord::DiscordIpc;
pub use error::{ConfigError, SinkError};
pub use flrp_state_protocol::PresenceSnapshot;
pub use liveness::{LivenessProbe, MtimeLiveness, ProcessLiveness, ProcessTable, SysinfoProcesses};
pub use presentation::{present, ChangeKey, SinkPayload};
pub use sink::PresenceSink;
