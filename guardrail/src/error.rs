//! Error types for the guardrail registry and statistics engine.
//!
//! Note that the registry and stats mutators themselves never return these:
//! guardrail rejections, unknown identities and capacity evictions are handled
//! locally (no-op or truncation) and logged. Errors surface only from
//! storage collaborators, config validation, limit loading and report decoding.

use thiserror::Error;

/// The main error type for all guardrail operations.
#[derive(Error, Debug)]
pub enum GuardrailError {
    /// Error reading or writing persisted config blobs.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Error validating or loading guardrail limits.
    #[error("limits error: {0}")]
    Limits(#[from] LimitsError),

    /// Error validating or decoding a monitoring config.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Error decoding a stats report.
    #[error("report error: {0}")]
    Report(#[from] ReportError),
}

/// Errors raised by a [`ConfigStorage`](crate::storage::ConfigStorage) implementation.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The storage directory could not be created or listed.
    #[error("failed to access storage directory '{path}': {source}")]
    DirectoryAccess {
        /// The directory that could not be accessed.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A blob could not be read.
    #[error("failed to read config blob '{path}': {source}")]
    ReadFailed {
        /// The blob file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A blob could not be written.
    #[error("failed to write config blob '{path}': {source}")]
    WriteFailed {
        /// The blob file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A blob could not be removed.
    #[error("failed to delete config blob '{path}': {source}")]
    DeleteFailed {
        /// The blob file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while validating or loading [`Limits`](crate::limits::Limits).
#[derive(Error, Debug)]
pub enum LimitsError {
    /// A capacity that must be non-zero was zero.
    #[error("limit '{name}' must be greater than zero")]
    ZeroCapacity {
        /// Name of the offending limit.
        name: &'static str,
    },

    /// A capacity exceeds the accepted ceiling.
    #[error("limit '{name}' is {value}, above the ceiling of {max}")]
    AboveCeiling {
        /// Name of the offending limit.
        name: &'static str,
        /// The configured value.
        value: usize,
        /// The largest accepted value.
        max: usize,
    },

    /// The soft dimension limit is above the hard one.
    #[error("dimension soft limit {soft} exceeds hard limit {hard}")]
    SoftAboveHard {
        /// The configured soft limit.
        soft: usize,
        /// The configured hard limit.
        hard: usize,
    },

    /// The limits file could not be read.
    #[error("failed to read limits file '{path}': {source}")]
    Load {
        /// The limits file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The limits file is not valid JSON for [`Limits`](crate::limits::Limits).
    #[error("failed to parse limits file '{path}': {source}")]
    Parse {
        /// The limits file path.
        path: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while validating or decoding a
/// [`MonitoringConfig`](crate::config::MonitoringConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config declares more entities of one kind than allowed.
    #[error("config declares {count} {kind}s (max {max})")]
    TooMany {
        /// The entity kind ("metric", "condition", ...).
        kind: &'static str,
        /// The declared count.
        count: usize,
        /// The configured ceiling.
        max: usize,
    },

    /// Two entities of the same kind share an id.
    #[error("duplicate {kind} id {id}")]
    DuplicateId {
        /// The entity kind.
        kind: &'static str,
        /// The repeated id.
        id: i64,
    },

    /// An entity references an id that is not declared.
    #[error("{kind} {id} references unknown {target} {target_id}")]
    UnknownReference {
        /// The referencing entity kind.
        kind: &'static str,
        /// The referencing entity id.
        id: i64,
        /// The referenced entity kind.
        target: &'static str,
        /// The missing id.
        target_id: i64,
    },

    /// The canonical bytes could not be produced.
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A persisted blob could not be decoded.
    #[error("failed to decode config: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Errors raised while decoding a stats report.
#[derive(Error, Debug)]
pub enum ReportError {
    /// The bytes are not a valid report.
    #[error("failed to decode report: {source}")]
    Decode {
        /// The protobuf decoding error.
        #[source]
        source: prost::DecodeError,
    },
}

/// Type alias for `Result<T, GuardrailError>`.
pub type Result<T> = std::result::Result<T, GuardrailError>;
