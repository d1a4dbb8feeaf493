//! Guardrail constants.
//!
//! Every ceiling the registry and stats engine enforce lives here as data
//! rather than being baked into logic, so tests can shrink them and operators
//! can tune them from a JSON file. Some limits (dimension sizes, per-config
//! bytes) are advisory: upstream producers consult them to decide when to call
//! the `note_*_dimension_size` family, they are not enforced in this crate.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LimitsError, Result};

/// Guardrail limits for one daemon instance.
///
/// Fields missing from a limits file take their default value.
///
/// # Example
///
/// ```rust
/// use guardrail::limits::Limits;
///
/// let limits = Limits {
///     max_icebox_size: 5,
///     ..Limits::default()
/// };
/// assert!(limits.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum number of active configs a single uid may hold.
    pub max_configs_per_uid: usize,
    /// Capacity of the icebox of removed config stats.
    pub max_icebox_size: usize,
    /// Capacity of the logger-error ring.
    pub max_logger_errors: usize,
    /// Capacity of the system-server restart ring.
    pub max_system_server_restarts: usize,
    /// Capacity of each per-config timestamp history.
    pub max_timestamp_count: usize,
    /// Capacity of the log-loss timestamp ring.
    pub max_log_loss_count: usize,
    /// Highest pushed atom id tracked by the atom histogram.
    pub max_pushed_atom_id: usize,
    /// Dimension count past which producers should start reporting sizes.
    pub dimension_key_size_soft_limit: usize,
    /// Dimension count past which producers should drop new dimensions.
    pub dimension_key_size_hard_limit: usize,
    /// Bytes of buffered report data a single config may hold.
    pub max_metrics_bytes_per_config: usize,
    /// Buffered bytes at which a config's owner should be asked to fetch data.
    pub bytes_per_config_trigger_get_data: usize,
    /// Maximum metrics declared by one config.
    pub max_metric_count_per_config: usize,
    /// Maximum conditions declared by one config.
    pub max_condition_count_per_config: usize,
    /// Maximum matchers declared by one config.
    pub max_matcher_count_per_config: usize,
    /// Maximum alerts declared by one config.
    pub max_alert_count_per_config: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_configs_per_uid: 10,
            max_icebox_size: 20,
            max_logger_errors: 20,
            max_system_server_restarts: 20,
            max_timestamp_count: 20,
            max_log_loss_count: 20,
            max_pushed_atom_id: 200,
            dimension_key_size_soft_limit: 300,
            dimension_key_size_hard_limit: 500,
            max_metrics_bytes_per_config: 128 * 1024,
            bytes_per_config_trigger_get_data: 64 * 1024,
            max_metric_count_per_config: 1000,
            max_condition_count_per_config: 300,
            max_matcher_count_per_config: 500,
            max_alert_count_per_config: 100,
        }
    }
}

/// Where a dimension count sits relative to the soft and hard limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionGuardrail {
    /// At or below the soft limit.
    Ok,
    /// Above the soft limit; the producer should report the size.
    SoftLimitExceeded,
    /// Above the hard limit; the producer should drop new dimensions.
    HardLimitExceeded,
}

/// Upper bound accepted for any count or ring capacity in [`Limits`].
pub const MAX_CAPACITY: usize = 100_000;

impl Limits {
    /// Loads limits from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`LimitsError`] if the file cannot be read or parsed, or if the
    /// loaded limits fail [`Limits::validate`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| LimitsError::Load {
            path: path.display().to_string(),
            source: e,
        })?;
        let limits: Self = serde_json::from_str(&data).map_err(|e| LimitsError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        limits.validate()?;
        Ok(limits)
    }

    /// Validates the limits.
    ///
    /// Ring capacities may be zero (retain nothing); the per-uid ceiling and
    /// the atom histogram may not. No capacity may exceed [`MAX_CAPACITY`].
    ///
    /// # Errors
    ///
    /// Returns [`LimitsError::ZeroCapacity`], [`LimitsError::AboveCeiling`] or
    /// [`LimitsError::SoftAboveHard`].
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("max_configs_per_uid", self.max_configs_per_uid),
            ("max_icebox_size", self.max_icebox_size),
            ("max_logger_errors", self.max_logger_errors),
            ("max_system_server_restarts", self.max_system_server_restarts),
            ("max_timestamp_count", self.max_timestamp_count),
            ("max_log_loss_count", self.max_log_loss_count),
            ("max_pushed_atom_id", self.max_pushed_atom_id),
        ] {
            if value > MAX_CAPACITY {
                return Err(LimitsError::AboveCeiling {
                    name,
                    value,
                    max: MAX_CAPACITY,
                }
                .into());
            }
        }
        if self.max_configs_per_uid == 0 {
            return Err(LimitsError::ZeroCapacity {
                name: "max_configs_per_uid",
            }
            .into());
        }
        if self.max_pushed_atom_id == 0 {
            return Err(LimitsError::ZeroCapacity {
                name: "max_pushed_atom_id",
            }
            .into());
        }
        if self.dimension_key_size_soft_limit > self.dimension_key_size_hard_limit {
            return Err(LimitsError::SoftAboveHard {
                soft: self.dimension_key_size_soft_limit,
                hard: self.dimension_key_size_hard_limit,
            }
            .into());
        }
        Ok(())
    }

    /// Classifies a dimension count against the soft and hard limits.
    pub fn dimension_guardrail(&self, size: usize) -> DimensionGuardrail {
        if size > self.dimension_key_size_hard_limit {
            DimensionGuardrail::HardLimitExceeded
        } else if size > self.dimension_key_size_soft_limit {
            DimensionGuardrail::SoftLimitExceeded
        } else {
            DimensionGuardrail::Ok
        }
    }

    /// Whether a config holding `bytes` of report data should be drained.
    pub fn should_trigger_get_data(&self, bytes: usize) -> bool {
        bytes > self.bytes_per_config_trigger_get_data
    }

    /// Whether a config holding `bytes` of report data must drop data.
    pub fn exceeds_byte_ceiling(&self, bytes: usize) -> bool {
        bytes > self.max_metrics_bytes_per_config
    }
}
