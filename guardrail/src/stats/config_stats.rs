//! Per-config statistics entry.

use std::collections::BTreeMap;

use crate::config::{Annotation, ConfigShape};
use crate::key::ConfigKey;
use crate::limits::Limits;
use crate::report::proto;
use crate::ring::RingBuffer;

/// Statistics tracked for one config, from creation until it is evicted from
/// the icebox.
///
/// `deletion_time_sec != 0` holds exactly when the entry lives in the icebox.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigStats {
    /// Identity.
    pub key: ConfigKey,
    /// When the config was received, epoch seconds.
    pub creation_time_sec: i64,
    /// When the config was removed or superseded; 0 while active.
    pub deletion_time_sec: i64,
    /// When the config was last reset; 0 if never.
    pub reset_time_sec: i64,
    /// Structural counts.
    pub shape: ConfigShape,
    /// Whether the config passed validation.
    pub is_valid: bool,
    /// Annotations, verbatim.
    pub annotations: Vec<Annotation>,
    /// Times a fetch request was sent to the owner.
    pub broadcast_sent_time_sec: RingBuffer<i64>,
    /// Times data was dropped for this config.
    pub data_drop_time_sec: RingBuffer<i64>,
    /// `(time, bytes)` of each report dump.
    pub dump_report_stats: RingBuffer<(i64, usize)>,
    /// Match count per matcher id.
    pub matcher_stats: BTreeMap<i64, u64>,
    /// Largest output tuple count per condition id.
    pub condition_stats: BTreeMap<i64, usize>,
    /// Largest output tuple count per metric id.
    pub metric_stats: BTreeMap<i64, usize>,
    /// Largest dimension-in-condition count per metric id.
    pub metric_dimension_in_condition_stats: BTreeMap<i64, usize>,
    /// Declaration count per alert id.
    pub alert_stats: BTreeMap<i64, u64>,
}

impl ConfigStats {
    /// Creates a fresh, active entry.
    pub fn new(
        key: ConfigKey,
        creation_time_sec: i64,
        shape: ConfigShape,
        annotations: &[Annotation],
        is_valid: bool,
        limits: &Limits,
    ) -> Self {
        Self {
            key,
            creation_time_sec,
            deletion_time_sec: 0,
            reset_time_sec: 0,
            shape,
            is_valid,
            annotations: annotations.to_vec(),
            broadcast_sent_time_sec: RingBuffer::new(limits.max_timestamp_count),
            data_drop_time_sec: RingBuffer::new(limits.max_timestamp_count),
            dump_report_stats: RingBuffer::new(limits.max_timestamp_count),
            matcher_stats: BTreeMap::new(),
            condition_stats: BTreeMap::new(),
            metric_stats: BTreeMap::new(),
            metric_dimension_in_condition_stats: BTreeMap::new(),
            alert_stats: BTreeMap::new(),
        }
    }

    /// Whether the entry has been moved to the icebox.
    pub fn is_deleted(&self) -> bool {
        self.deletion_time_sec != 0
    }

    /// Stamps the deletion time. The stamp is at least 1 so that a clock
    /// reading of zero still marks the entry as deleted.
    pub(crate) fn mark_deleted(&mut self, now_sec: i64) {
        self.deletion_time_sec = now_sec.max(1);
    }

    /// Drops all histories and per-id maps; identity, shape and lifecycle
    /// timestamps are kept.
    pub fn clear_history(&mut self) {
        self.broadcast_sent_time_sec.clear();
        self.data_drop_time_sec.clear();
        self.dump_report_stats.clear();
        self.matcher_stats.clear();
        self.condition_stats.clear();
        self.metric_stats.clear();
        self.metric_dimension_in_condition_stats.clear();
        self.alert_stats.clear();
    }

    pub(crate) fn to_proto(&self) -> proto::ConfigStatsReport {
        proto::ConfigStatsReport {
            uid: self.key.uid,
            id: self.key.id,
            creation_time_sec: self.creation_time_sec,
            deletion_time_sec: nonzero(self.deletion_time_sec),
            reset_time_sec: nonzero(self.reset_time_sec),
            metric_count: saturating_i32(self.shape.metric_count),
            condition_count: saturating_i32(self.shape.condition_count),
            matcher_count: saturating_i32(self.shape.matcher_count),
            alert_count: saturating_i32(self.shape.alert_count),
            is_valid: self.is_valid,
            broadcast_sent_time_sec: self.broadcast_sent_time_sec.iter().copied().collect(),
            data_drop_time_sec: self.data_drop_time_sec.iter().copied().collect(),
            dump_report_stats: self
                .dump_report_stats
                .iter()
                .map(|&(time_sec, bytes)| proto::DumpReportStats {
                    dump_report_sec: time_sec,
                    dump_report_size: saturating_i64(bytes),
                })
                .collect(),
            annotation: self
                .annotations
                .iter()
                .map(|a| proto::Annotation {
                    field_int64: a.field_int64,
                    field_int32: a.field_int32,
                })
                .collect(),
            matcher_stats: self
                .matcher_stats
                .iter()
                .map(|(&id, &count)| proto::MatcherStats {
                    id,
                    matched_times: saturating_i64(count),
                })
                .collect(),
            condition_stats: self
                .condition_stats
                .iter()
                .map(|(&id, &max)| proto::ConditionStats {
                    id,
                    max_tuple_counts: saturating_i64(max),
                })
                .collect(),
            metric_stats: metric_stats(&self.metric_stats),
            metric_dimension_in_condition_stats: metric_stats(
                &self.metric_dimension_in_condition_stats,
            ),
            alert_stats: self
                .alert_stats
                .iter()
                .map(|(&id, &count)| proto::AlertStats {
                    id,
                    alerted_times: saturating_i64(count),
                })
                .collect(),
        }
    }
}

/// Raises `map[id]` to `size` if larger, inserting it if absent.
/// Returns whether the entry was created.
pub(crate) fn record_max(map: &mut BTreeMap<i64, usize>, id: i64, size: usize) -> bool {
    match map.get_mut(&id) {
        Some(max) => {
            *max = (*max).max(size);
            false
        }
        None => {
            map.insert(id, size);
            true
        }
    }
}

/// Increments `map[id]`, starting it at 1 if absent. Returns whether the entry
/// was created.
pub(crate) fn increment(map: &mut BTreeMap<i64, u64>, id: i64) -> bool {
    match map.get_mut(&id) {
        Some(count) => {
            *count = count.saturating_add(1);
            false
        }
        None => {
            map.insert(id, 1);
            true
        }
    }
}

fn metric_stats(map: &BTreeMap<i64, usize>) -> Vec<proto::MetricStats> {
    map.iter()
        .map(|(&id, &max)| proto::MetricStats {
            id,
            max_tuple_counts: saturating_i64(max),
        })
        .collect()
}

fn nonzero(value: i64) -> Option<i64> {
    (value != 0).then_some(value)
}

fn saturating_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

pub(crate) fn saturating_i64<T: TryInto<i64>>(value: T) -> i64 {
    value.try_into().unwrap_or(i64::MAX)
}
