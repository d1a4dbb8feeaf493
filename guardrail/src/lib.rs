//! # guardrail
//!
//! Bounded config registry and guardrail statistics for a metrics daemon.
//!
//! guardrail tracks which monitoring configs are active for which owner,
//! persists exactly one blob per config, and keeps a capped, evictable record
//! of what happened to every config (and to the daemon itself) so that an
//! operator can dump it as a compact binary report.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Every collection is bounded: per-uid config ceilings, capped timestamp
//!   histories, a fixed-size icebox of removed configs
//! - Registry and stats mutators never return errors to untrusted callers;
//!   rejections are logged and dropped
//! - Listener callbacks run outside the registry lock
//! - Time comes from an injected [`Clock`](clock::Clock), so tests are deterministic
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use guardrail::{
//!     ConfigKey, ConfigRegistry, GuardrailStats, Limits, MemoryStorage, MonitoringConfig,
//!     StatsListener, SystemClock,
//! };
//!
//! let clock = Arc::new(SystemClock);
//! let stats = Arc::new(GuardrailStats::new(clock.clone(), Limits::default()));
//! let registry = ConfigRegistry::new(Arc::new(MemoryStorage::new()), clock, Limits::default());
//! registry.add_listener(Arc::new(StatsListener::new(stats.clone())));
//!
//! let key = ConfigKey::new(1000, 7);
//! registry.update_config(key, &MonitoringConfig::default());
//! stats.note_broadcast_sent(&key);
//!
//! let mut report = Vec::new();
//! stats.dump_report(&mut report, true);
//! let decoded = guardrail::report::decode_report(&report).unwrap();
//! assert_eq!(decoded.config_stats.len(), 1);
//! ```
//!
//! ## Architecture
//!
//! - [`ConfigRegistry`]: Active configs per uid, persistence, listener fan-out
//! - [`GuardrailStats`]: Per-config and daemon-wide statistics, icebox, report
//! - [`StatsListener`]: Feeds registry events into the stats engine
//! - [`Limits`]: Every guardrail ceiling, loadable from JSON
//!
//! ## Modules
//!
//! - [`registry`]: Config lifecycle and listener traits
//! - [`stats`]: Statistics engine
//! - [`report`]: Wire report types, decoding and text rendering
//! - [`storage`]: Blob persistence (directory and in-memory)
//! - [`config`]: Monitoring config payload and validation
//! - [`ring`]: Fixed-capacity FIFO used for every capped history
//! - [`error`]: Error types

pub mod clock;
pub mod config;
pub mod error;
pub mod key;
pub mod limits;
pub mod listener;
pub mod registry;
pub mod report;
pub mod ring;
pub mod stats;
pub mod storage;

// Re-export primary API types at crate root for convenience.
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Annotation, ConfigShape, MonitoringConfig};
pub use error::{GuardrailError, Result};
pub use key::ConfigKey;
pub use limits::{DimensionGuardrail, Limits};
pub use listener::StatsListener;
pub use registry::{ConfigListener, ConfigReceiver, ConfigRegistry, UpdateOutcome};
pub use ring::RingBuffer;
pub use stats::{ConfigStats, GuardrailStats};
pub use storage::{ConfigStorage, DirStorage, MemoryStorage};
