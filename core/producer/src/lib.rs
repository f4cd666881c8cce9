//! # flrp-producer
//!
//! The in-host half of the FLRP bridge. The host calls into a [`Producer`] from its
//! lifecycle callbacks; the producer samples transport state and persists the
//! shared state document that the presence consumer polls.
//!
//! ```text
//! Host sensors → Producer → State Document → Presence consumer → Presence sink
//!   (read-only)   (writer)     (storage)          (reader)
//! ```
//!
//! ## Design Principles
//!
//! - **Never crash the host**: every failure is logged and swallowed; a dropped
//!   write is retried on the next sync.
//! - **Self-throttling**: the host's idle callback fires at an unspecified cadence,
//!   so [`Producer::tick`] is a no-op until the sync interval has elapsed.
//! - **Verified writes**: each write is synced to disk and read back before it counts.
//! - **Injected seams**: sensors, clock and storage are traits so the protocol can
//!   be driven without a host.
//!
//! ## Module Structure
//!
//! - [`config`]: tunables and candidate storage locations
//! - [`sensors`]: host sensor and clock traits
//! - [`session`]: in-memory session state and change detection
//! - [`storage`]: synced file I/O behind a trait
//! - [`producer`]: lifecycle hooks, durable write protocol, path reinitialization

pub mod config;
pub mod error;
pub mod producer;
pub mod sensors;
pub mod session;
pub mod storage;

pub use config::{default_candidate_paths, ProducerConfig};
pub use error::{StorageError, WriteError};
pub use flrp_state_protocol::{ActivityState, SharedStateDocument};
pub use producer::Producer;
pub use sensors::{Clock, HostSensors, SensorReadings, SystemClock};
pub use session::{SessionState, WriteReason};
pub use storage::{FsStorage, Storage};
