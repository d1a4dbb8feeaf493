//! Monitoring config payload.
//!
//! A [`MonitoringConfig`] is what an external owner submits to the
//! [`ConfigRegistry`](crate::registry::ConfigRegistry). The registry treats it
//! as opaque apart from its canonical bytes, which drive deduplication and
//! persistence. The stats bridge reads its shape and validates it against
//! [`Limits`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::limits::Limits;

/// A metric: what it counts and, optionally, the condition gating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Metric id.
    pub id: i64,
    /// Matcher selecting the events this metric aggregates.
    pub what: i64,
    /// Condition gating the metric, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<i64>,
}

/// A condition, driven by a start and a stop matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionSpec {
    /// Condition id.
    pub id: i64,
    /// Matcher that turns the condition on.
    pub start: i64,
    /// Matcher that turns the condition off.
    pub stop: i64,
}

/// An event matcher on a single atom id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatcherSpec {
    /// Matcher id.
    pub id: i64,
    /// Atom id matched.
    pub atom_id: i32,
}

/// An alert on a metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSpec {
    /// Alert id.
    pub id: i64,
    /// Metric watched by this alert.
    pub metric: i64,
    /// Threshold above which the alert is declared.
    pub threshold: i64,
}

/// Opaque sub-identifier attached to a config, preserved verbatim in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// 64-bit part.
    pub field_int64: i64,
    /// 32-bit part.
    pub field_int32: i32,
}

/// Structural counts of a config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigShape {
    /// Number of metrics.
    pub metric_count: usize,
    /// Number of conditions.
    pub condition_count: usize,
    /// Number of matchers.
    pub matcher_count: usize,
    /// Number of alerts.
    pub alert_count: usize,
}

/// A monitoring config as delivered by its owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Metrics.
    pub metrics: Vec<MetricSpec>,
    /// Conditions.
    pub conditions: Vec<ConditionSpec>,
    /// Matchers.
    pub matchers: Vec<MatcherSpec>,
    /// Alerts.
    pub alerts: Vec<AlertSpec>,
    /// Annotations, in submission order.
    pub annotations: Vec<Annotation>,
}

impl MonitoringConfig {
    /// Canonical serialized form.
    ///
    /// Field order is fixed by the struct, so two equal configs always
    /// produce byte-identical output.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if serialization fails.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ConfigError::Serialize(e).into())
    }

    /// Decodes a config from its canonical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] if `bytes` are not a config.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| ConfigError::Decode(e).into())
    }

    /// Structural counts.
    pub fn shape(&self) -> ConfigShape {
        ConfigShape {
            metric_count: self.metrics.len(),
            condition_count: self.conditions.len(),
            matcher_count: self.matchers.len(),
            alert_count: self.alerts.len(),
        }
    }

    /// Checks per-config ceilings, id uniqueness and references.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self, limits: &Limits) -> Result<()> {
        check_count("metric", self.metrics.len(), limits.max_metric_count_per_config)?;
        check_count(
            "condition",
            self.conditions.len(),
            limits.max_condition_count_per_config,
        )?;
        check_count("matcher", self.matchers.len(), limits.max_matcher_count_per_config)?;
        check_count("alert", self.alerts.len(), limits.max_alert_count_per_config)?;

        let matchers = unique_ids("matcher", self.matchers.iter().map(|m| m.id))?;
        let conditions = unique_ids("condition", self.conditions.iter().map(|c| c.id))?;
        let metrics = unique_ids("metric", self.metrics.iter().map(|m| m.id))?;
        unique_ids("alert", self.alerts.iter().map(|a| a.id))?;

        for condition in &self.conditions {
            for matcher in [condition.start, condition.stop] {
                check_ref("condition", condition.id, "matcher", matcher, &matchers)?;
            }
        }
        for metric in &self.metrics {
            check_ref("metric", metric.id, "matcher", metric.what, &matchers)?;
            if let Some(condition) = metric.condition {
                check_ref("metric", metric.id, "condition", condition, &conditions)?;
            }
        }
        for alert in &self.alerts {
            check_ref("alert", alert.id, "metric", alert.metric, &metrics)?;
        }
        Ok(())
    }
}

fn check_count(kind: &'static str, count: usize, max: usize) -> Result<()> {
    if count > max {
        return Err(ConfigError::TooMany { kind, count, max }.into());
    }
    Ok(())
}

fn unique_ids(kind: &'static str, ids: impl Iterator<Item = i64>) -> Result<HashSet<i64>> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ConfigError::DuplicateId { kind, id }.into());
        }
    }
    Ok(seen)
}

fn check_ref(
    kind: &'static str,
    id: i64,
    target: &'static str,
    target_id: i64,
    known: &HashSet<i64>,
) -> Result<()> {
    if !known.contains(&target_id) {
        return Err(ConfigError::UnknownReference {
            kind,
            id,
            target,
            target_id,
        }
        .into());
    }
    Ok(())
}
