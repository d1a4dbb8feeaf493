//! Guardrail statistics.
//!
//! [`GuardrailStats`] records bounded, evictable statistics about configs and
//! about the daemon itself, independently of whether the registry still
//! considers a config active, and renders everything to a report.
//!
//! # Design
//!
//! - One mutex guards all state; every mutator is O(log n) in the number of
//!   tracked configs
//! - Active entries live in a map keyed by [`ConfigKey`]; removed or superseded
//!   entries move to the icebox, a [`RingBuffer`] of `max_icebox_size` entries.
//!   An entry is never in both
//! - Keyed `note_*` mutators return whether an active entry was found. An
//!   unknown key is a caller contract error: it is ignored (and logged for the
//!   broadcast/drop/dump family), never surfaced as an error
//! - Every history is capped and drops its oldest element on overflow

mod config_stats;

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use prost::Message;
use tracing::{debug, error, warn};

pub use config_stats::ConfigStats;
use config_stats::{increment, record_max, saturating_i64};

use crate::clock::Clock;
use crate::config::{Annotation, ConfigShape};
use crate::key::ConfigKey;
use crate::limits::{Limits, MAX_CAPACITY};
use crate::report::{self, proto};
use crate::ring::RingBuffer;

/// Pull statistics for one pulled atom id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PulledAtomStats {
    /// Total pulls.
    pub total_pull: u64,
    /// Pulls served from cache.
    pub total_pull_from_cache: u64,
    /// Minimum pull interval in seconds; last write wins.
    pub min_pull_interval_sec: i64,
}

/// UID map counters. Not historied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UidMapStats {
    /// Pending changes.
    pub changes: u64,
    /// Bytes used by the map.
    pub bytes_used: u64,
    /// Changes dropped for memory.
    pub dropped_changes: u64,
    /// App deletions dropped for memory.
    pub deleted_apps: u64,
}

struct StatsState {
    start_time_sec: i64,
    active: BTreeMap<ConfigKey, ConfigStats>,
    icebox: RingBuffer<ConfigStats>,
    pushed_atom_counts: Vec<u64>,
    pulled_atom_stats: BTreeMap<i32, PulledAtomStats>,
    logger_errors: RingBuffer<(i64, i32)>,
    log_loss_ns: RingBuffer<i64>,
    system_server_restarts: RingBuffer<i64>,
    anomaly_alarms_registered: u64,
    periodic_alarms_registered: u64,
    uid_map: UidMapStats,
}

impl StatsState {
    fn new(limits: &Limits, now_sec: i64) -> Self {
        Self {
            start_time_sec: now_sec,
            active: BTreeMap::new(),
            icebox: RingBuffer::new(limits.max_icebox_size),
            pushed_atom_counts: vec![0; atom_slots(limits)],
            pulled_atom_stats: BTreeMap::new(),
            logger_errors: RingBuffer::new(limits.max_logger_errors),
            log_loss_ns: RingBuffer::new(limits.max_log_loss_count),
            system_server_restarts: RingBuffer::new(limits.max_system_server_restarts),
            anomaly_alarms_registered: 0,
            periodic_alarms_registered: 0,
            uid_map: UidMapStats::default(),
        }
    }

    fn add_to_icebox(&mut self, stats: ConfigStats) {
        if let Some(evicted) = self.icebox.push(stats) {
            debug!(
                uid = evicted.key.uid,
                config_id = evicted.key.id,
                "evicted config stats from icebox"
            );
        }
    }

    /// Moves the active entry for `key` (if any) to the icebox.
    fn retire(&mut self, key: &ConfigKey, now_sec: i64) -> bool {
        match self.active.remove(key) {
            Some(mut stats) => {
                stats.mark_deleted(now_sec);
                self.add_to_icebox(stats);
                true
            }
            None => false,
        }
    }

    fn reset(&mut self, now_sec: i64) {
        self.start_time_sec = now_sec;
        self.icebox.clear();
        for stats in self.active.values_mut() {
            stats.clear_history();
        }
        self.pushed_atom_counts.fill(0);
        self.pulled_atom_stats.clear();
        self.logger_errors.clear();
        self.log_loss_ns.clear();
        self.system_server_restarts.clear();
        self.anomaly_alarms_registered = 0;
        self.periodic_alarms_registered = 0;
        self.uid_map = UidMapStats::default();
    }

    fn to_report(&self, end_time_sec: i64) -> proto::StatsReport {
        let config_stats = self
            .icebox
            .iter()
            .chain(self.active.values())
            .map(ConfigStats::to_proto)
            .collect();

        let atom_stats = self
            .pushed_atom_counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(atom_id, &count)| proto::AtomStats {
                tag: i32::try_from(atom_id).unwrap_or(i32::MAX),
                count: saturating_i64(count),
            })
            .collect();

        let pulled_atom_stats = self
            .pulled_atom_stats
            .iter()
            .map(|(&atom_id, pulled)| proto::PulledAtomStats {
                atom_id,
                total_pull: saturating_i64(pulled.total_pull),
                total_pull_from_cache: saturating_i64(pulled.total_pull_from_cache),
                min_pull_interval_sec: pulled.min_pull_interval_sec,
            })
            .collect();

        proto::StatsReport {
            stats_begin_time_sec: self.start_time_sec,
            stats_end_time_sec: end_time_sec,
            config_stats,
            atom_stats,
            pulled_atom_stats,
            anomaly_alarm_stats: alarm_stats(self.anomaly_alarms_registered),
            periodic_alarm_stats: alarm_stats(self.periodic_alarms_registered),
            uidmap_stats: Some(proto::UidMapStats {
                changes: saturating_i64(self.uid_map.changes),
                bytes_used: saturating_i64(self.uid_map.bytes_used),
                dropped_changes: saturating_i64(self.uid_map.dropped_changes),
                deleted_apps: saturating_i64(self.uid_map.deleted_apps),
            }),
            logger_error_stats: self
                .logger_errors
                .iter()
                .map(|&(time_sec, code)| proto::LoggerErrorStats {
                    logger_disconnection_sec: time_sec,
                    error_code: code,
                })
                .collect(),
            log_loss_time_ns: self.log_loss_ns.iter().copied().collect(),
            system_restart_sec: self.system_server_restarts.iter().copied().collect(),
        }
    }
}

/// Histogram slots for atom ids `0..=max_pushed_atom_id`, capped at
/// [`MAX_CAPACITY`] + 1 even if the limits were never validated.
fn atom_slots(limits: &Limits) -> usize {
    limits
        .max_pushed_atom_id
        .min(MAX_CAPACITY)
        .checked_add(1)
        .unwrap_or(MAX_CAPACITY)
}

fn alarm_stats(registered: u64) -> Option<proto::AlarmStats> {
    (registered > 0).then(|| proto::AlarmStats {
        alarms_registered: saturating_i64(registered),
    })
}

/// Thread-safe guardrail statistics.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use guardrail::{ConfigKey, GuardrailStats, Limits, SystemClock};
/// use guardrail::config::ConfigShape;
///
/// let stats = GuardrailStats::new(Arc::new(SystemClock), Limits::default());
/// let key = ConfigKey::new(1, 100);
/// stats.note_config_received(key, ConfigShape::default(), &[], true);
/// assert!(stats.note_matcher_matched(&key, 55));
///
/// let mut report = Vec::new();
/// stats.dump_report(&mut report, false);
/// assert!(!report.is_empty());
/// ```
pub struct GuardrailStats {
    state: Mutex<StatsState>,
    clock: Arc<dyn Clock>,
    limits: Limits,
}

impl GuardrailStats {
    /// Creates an empty stats engine. The collection window starts now.
    pub fn new(clock: Arc<dyn Clock>, limits: Limits) -> Self {
        let state = StatsState::new(&limits, clock.now_sec());
        Self {
            state: Mutex::new(state),
            clock,
            limits,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The limits this engine was built with.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Starts tracking a config.
    ///
    /// An existing active entry for `key` is first moved to the icebox. An
    /// invalid config is recorded with a zero lifetime: it goes straight to
    /// the icebox and never becomes active.
    pub fn note_config_received(
        &self,
        key: ConfigKey,
        shape: ConfigShape,
        annotations: &[Annotation],
        is_valid: bool,
    ) {
        let now_sec = self.clock.now_sec();
        let mut state = self.lock();
        state.retire(&key, now_sec);

        let mut stats = ConfigStats::new(key, now_sec, shape, annotations, is_valid, &self.limits);
        if is_valid {
            state.active.insert(key, stats);
        } else {
            stats.mark_deleted(now_sec);
            state.add_to_icebox(stats);
        }
    }

    /// Moves the active entry for `key` to the icebox. Returns whether there was one.
    pub fn note_config_removed(&self, key: &ConfigKey) -> bool {
        let now_sec = self.clock.now_sec();
        self.lock().retire(key, now_sec)
    }

    /// Stamps the reset time on the active entry for `key`.
    pub fn note_config_reset(&self, key: &ConfigKey) -> bool {
        let now_sec = self.clock.now_sec();
        match self.lock().active.get_mut(key) {
            Some(stats) => {
                stats.reset_time_sec = now_sec;
                true
            }
            None => false,
        }
    }

    /// Records that a fetch request was sent to the owner of `key`.
    pub fn note_broadcast_sent(&self, key: &ConfigKey) -> bool {
        let now_sec = self.clock.now_sec();
        self.with_active_logged(key, "broadcast sent", |stats| {
            stats.broadcast_sent_time_sec.push(now_sec);
        })
    }

    /// Records that data was dropped for `key`.
    pub fn note_data_dropped(&self, key: &ConfigKey) -> bool {
        let now_sec = self.clock.now_sec();
        self.with_active_logged(key, "data dropped", |stats| {
            stats.data_drop_time_sec.push(now_sec);
        })
    }

    /// Records that a report of `num_bytes` was dumped for `key`.
    pub fn note_metrics_report_sent(&self, key: &ConfigKey, num_bytes: usize) -> bool {
        let now_sec = self.clock.now_sec();
        self.with_active_logged(key, "metrics report sent", |stats| {
            stats.dump_report_stats.push((now_sec, num_bytes));
        })
    }

    /// Raises the recorded output tuple count of condition `id`.
    pub fn note_condition_dimension_size(&self, key: &ConfigKey, id: i64, size: usize) -> bool {
        self.with_active(key, |stats| {
            record_max(&mut stats.condition_stats, id, size);
        })
    }

    /// Raises the recorded output tuple count of metric `id`.
    pub fn note_metric_dimension_size(&self, key: &ConfigKey, id: i64, size: usize) -> bool {
        self.with_active(key, |stats| {
            record_max(&mut stats.metric_stats, id, size);
        })
    }

    /// Raises the recorded dimension-in-condition count of metric `id`.
    pub fn note_metric_dimension_in_condition_size(
        &self,
        key: &ConfigKey,
        id: i64,
        size: usize,
    ) -> bool {
        self.with_active(key, |stats| {
            record_max(&mut stats.metric_dimension_in_condition_stats, id, size);
        })
    }

    /// Counts one match of matcher `id`.
    pub fn note_matcher_matched(&self, key: &ConfigKey, id: i64) -> bool {
        self.with_active(key, |stats| {
            increment(&mut stats.matcher_stats, id);
        })
    }

    /// Counts one declaration of alert `id`.
    pub fn note_anomaly_declared(&self, key: &ConfigKey, id: i64) -> bool {
        self.with_active(key, |stats| {
            increment(&mut stats.alert_stats, id);
        })
    }

    /// Counts a pushed atom. Ids outside `0..=max_pushed_atom_id` are dropped.
    pub fn note_atom_logged(&self, atom_id: i32, time_sec: i64) {
        let mut state = self.lock();
        let index = usize::try_from(atom_id).unwrap_or(usize::MAX);
        match state.pushed_atom_counts.get_mut(index) {
            Some(count) => *count = count.saturating_add(1),
            None => warn!(atom_id, time_sec, "atom id out of tracked range"),
        }
    }

    /// Counts a pull of atom `atom_id`.
    pub fn note_pull(&self, atom_id: i32) {
        let mut state = self.lock();
        let pulled = state.pulled_atom_stats.entry(atom_id).or_default();
        pulled.total_pull = pulled.total_pull.saturating_add(1);
    }

    /// Counts a pull of atom `atom_id` served from cache.
    pub fn note_pull_from_cache(&self, atom_id: i32) {
        let mut state = self.lock();
        let pulled = state.pulled_atom_stats.entry(atom_id).or_default();
        pulled.total_pull_from_cache = pulled.total_pull_from_cache.saturating_add(1);
    }

    /// Sets the minimum pull interval of atom `atom_id`.
    pub fn update_min_pull_interval_sec(&self, atom_id: i32, interval_sec: i64) {
        self.lock()
            .pulled_atom_stats
            .entry(atom_id)
            .or_default()
            .min_pull_interval_sec = interval_sec;
    }

    /// Records a logger error with the current time.
    pub fn note_logger_error(&self, error_code: i32) {
        let now_sec = self.clock.now_sec();
        self.lock().logger_errors.push((now_sec, error_code));
    }

    /// Records a system server restart observed at `time_sec`.
    pub fn note_system_server_restart(&self, time_sec: i64) {
        self.lock().system_server_restarts.push(time_sec);
    }

    /// Records a log-loss event at `timestamp_ns`.
    pub fn note_log_lost(&self, timestamp_ns: i64) {
        self.lock().log_loss_ns.push(timestamp_ns);
    }

    /// Counts a change to the registered anomaly alarm.
    pub fn note_registered_anomaly_alarm_changed(&self) {
        let mut state = self.lock();
        state.anomaly_alarms_registered = state.anomaly_alarms_registered.saturating_add(1);
    }

    /// Counts a change to the registered periodic alarm.
    pub fn note_registered_periodic_alarm_changed(&self) {
        let mut state = self.lock();
        state.periodic_alarms_registered = state.periodic_alarms_registered.saturating_add(1);
    }

    /// Counts `dropped` UID map changes lost for memory.
    pub fn note_uid_map_dropped(&self, dropped: u64) {
        let mut state = self.lock();
        state.uid_map.dropped_changes = state.uid_map.dropped_changes.saturating_add(dropped);
    }

    /// Counts one app deletion dropped from the UID map.
    pub fn note_uid_map_app_deletion_dropped(&self) {
        let mut state = self.lock();
        state.uid_map.deleted_apps = state.uid_map.deleted_apps.saturating_add(1);
    }

    /// Sets the number of pending UID map changes.
    pub fn set_uid_map_changes(&self, changes: u64) {
        self.lock().uid_map.changes = changes;
    }

    /// Sets the UID map memory usage.
    pub fn set_current_uid_map_memory(&self, bytes: u64) {
        self.lock().uid_map.bytes_used = bytes;
    }

    /// Clears all collected data and restarts the collection window.
    ///
    /// Active configs keep their identity, shape and lifecycle timestamps;
    /// their histories and per-id maps are emptied. The icebox is emptied.
    pub fn reset(&self) {
        let now_sec = self.clock.now_sec();
        self.lock().reset(now_sec);
    }

    /// Builds the report for the icebox and active configs, optionally
    /// resetting in the same critical section.
    pub fn build_report(&self, reset_after: bool) -> proto::StatsReport {
        let now_sec = self.clock.now_sec();
        let mut state = self.lock();
        let report = state.to_report(now_sec);
        if reset_after {
            state.reset(now_sec);
        }
        report
    }

    /// Appends the encoded report to `out`. See [`build_report`](Self::build_report).
    pub fn dump_report(&self, out: &mut Vec<u8>, reset_after: bool) {
        out.extend_from_slice(&self.build_report(reset_after).encode_to_vec());
    }

    /// Renders the current state as text without resetting.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from `out`.
    pub fn dump_human_readable<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        report::render_text(&self.build_report(false), out)
    }

    /// Clone of the active entry for `key`.
    pub fn snapshot_config(&self, key: &ConfigKey) -> Option<ConfigStats> {
        self.lock().active.get(key).cloned()
    }

    /// Clone of the icebox, oldest first.
    pub fn icebox_snapshot(&self) -> Vec<ConfigStats> {
        self.lock().icebox.iter().cloned().collect()
    }

    /// Whether `key` has an active entry.
    pub fn is_active(&self, key: &ConfigKey) -> bool {
        self.lock().active.contains_key(key)
    }

    /// Start of the current collection window, epoch seconds.
    pub fn start_time_sec(&self) -> i64 {
        self.lock().start_time_sec
    }

    fn with_active(&self, key: &ConfigKey, update: impl FnOnce(&mut ConfigStats)) -> bool {
        match self.lock().active.get_mut(key) {
            Some(stats) => {
                update(stats);
                true
            }
            None => false,
        }
    }

    fn with_active_logged(
        &self,
        key: &ConfigKey,
        event: &'static str,
        update: impl FnOnce(&mut ConfigStats),
    ) -> bool {
        let found = self.with_active(key, update);
        if !found {
            error!(uid = key.uid, config_id = key.id, event, "no active stats for config");
        }
        found
    }
}

impl fmt::Debug for GuardrailStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("GuardrailStats")
            .field("start_time_sec", &state.start_time_sec)
            .field("active", &state.active.len())
            .field("icebox", &state.icebox.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn shape() -> ConfigShape {
        ConfigShape {
            metric_count: 3,
            condition_count: 2,
            matcher_count: 1,
            alert_count: 0,
        }
    }

    fn stats_with(limits: Limits) -> (GuardrailStats, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_sec(1_000));
        (GuardrailStats::new(clock.clone(), limits), clock)
    }

    fn decode(stats: &GuardrailStats, reset_after: bool) -> proto::StatsReport {
        let mut buf = Vec::new();
        stats.dump_report(&mut buf, reset_after);
        proto::StatsReport::decode(buf.as_slice()).unwrap()
    }

    #[test]
    fn test_matcher_counts_in_report() {
        let (stats, _) = stats_with(Limits::default());
        let key = ConfigKey::new(1, 100);
        stats.note_config_received(key, shape(), &[], true);
        for _ in 0..3 {
            assert!(stats.note_matcher_matched(&key, 55));
        }

        let report = decode(&stats, false);
        assert_eq!(report.config_stats.len(), 1);
        let config = &report.config_stats[0];
        assert_eq!((config.uid, config.id), (1, 100));
        assert_eq!(
            config.matcher_stats,
            vec![proto::MatcherStats {
                id: 55,
                matched_times: 3
            }]
        );
    }

    #[test]
    fn test_receive_twice_ices_first_entry() {
        let (stats, clock) = stats_with(Limits::default());
        let key = ConfigKey::new(1, 100);
        stats.note_config_received(key, shape(), &[], true);
        clock.advance_sec(10);
        stats.note_config_received(key, shape(), &[], true);

        let icebox = stats.icebox_snapshot();
        assert_eq!(icebox.len(), 1);
        assert_eq!(icebox[0].key, key);
        assert_eq!(icebox[0].creation_time_sec, 1_000);
        assert_eq!(icebox[0].deletion_time_sec, 1_010);

        let active = stats.snapshot_config(&key).unwrap();
        assert_eq!(active.creation_time_sec, 1_010);
        assert!(!active.is_deleted());
    }

    #[test]
    fn test_invalid_config_goes_straight_to_icebox() {
        let (stats, _) = stats_with(Limits::default());
        let key = ConfigKey::new(1, 100);
        stats.note_config_received(key, shape(), &[], false);

        assert!(!stats.is_active(&key));
        let icebox = stats.icebox_snapshot();
        assert_eq!(icebox.len(), 1);
        assert!(!icebox[0].is_valid);
        assert_eq!(icebox[0].creation_time_sec, icebox[0].deletion_time_sec);
    }

    #[test]
    fn test_removal_at_clock_zero_is_still_deleted() {
        let clock = Arc::new(ManualClock::at_sec(0));
        let stats = GuardrailStats::new(clock, Limits::default());
        let removed = ConfigKey::new(1, 1);
        let invalid = ConfigKey::new(1, 2);
        stats.note_config_received(removed, shape(), &[], true);
        stats.note_config_removed(&removed);
        stats.note_config_received(invalid, shape(), &[], false);

        let icebox = stats.icebox_snapshot();
        assert_eq!(icebox.len(), 2);
        assert!(icebox.iter().all(ConfigStats::is_deleted));
        assert!(!stats.is_active(&removed));

        let report = decode(&stats, false);
        assert!(report.config_stats.iter().all(|c| c.deletion_time_sec.is_some()));
    }

    #[test]
    fn test_unknown_key_is_ignored() {
        let (stats, _) = stats_with(Limits::default());
        let key = ConfigKey::new(9, 9);

        assert!(!stats.note_broadcast_sent(&key));
        assert!(!stats.note_data_dropped(&key));
        assert!(!stats.note_metrics_report_sent(&key, 10));
        assert!(!stats.note_metric_dimension_size(&key, 1, 1));
        assert!(!stats.note_anomaly_declared(&key, 1));
        assert!(!stats.note_config_removed(&key));
        assert!(!stats.note_config_reset(&key));

        assert!(!stats.is_active(&key));
        assert!(decode(&stats, false).config_stats.is_empty());
    }

    #[test]
    fn test_removed_config_ignores_further_notes() {
        let (stats, _) = stats_with(Limits::default());
        let key = ConfigKey::new(1, 1);
        stats.note_config_received(key, shape(), &[], true);
        assert!(stats.note_config_removed(&key));

        assert!(!stats.note_matcher_matched(&key, 1));
        assert!(stats.icebox_snapshot()[0].matcher_stats.is_empty());
    }

    #[test]
    fn test_dimension_sizes_keep_maximum() {
        let (stats, _) = stats_with(Limits::default());
        let key = ConfigKey::new(1, 1);
        stats.note_config_received(key, shape(), &[], true);

        for size in [50, 40, 30, 20] {
            stats.note_metric_dimension_size(&key, 7, size);
            stats.note_condition_dimension_size(&key, 8, size);
            stats.note_metric_dimension_in_condition_size(&key, 7, size);
        }

        let snapshot = stats.snapshot_config(&key).unwrap();
        assert_eq!(snapshot.metric_stats[&7], 50);
        assert_eq!(snapshot.condition_stats[&8], 50);
        assert_eq!(snapshot.metric_dimension_in_condition_stats[&7], 50);
    }

    #[test]
    fn test_timestamp_histories_are_capped() {
        let limits = Limits {
            max_timestamp_count: 3,
            ..Limits::default()
        };
        let (stats, clock) = stats_with(limits);
        let key = ConfigKey::new(1, 1);
        stats.note_config_received(key, shape(), &[], true);

        for (i, bytes) in (0..5).zip(100..) {
            clock.set_sec(2_000 + i);
            stats.note_broadcast_sent(&key);
            stats.note_metrics_report_sent(&key, bytes);
        }

        let snapshot = stats.snapshot_config(&key).unwrap();
        assert_eq!(
            snapshot.broadcast_sent_time_sec.iter().copied().collect::<Vec<_>>(),
            vec![2_002, 2_003, 2_004]
        );
        assert_eq!(
            snapshot.dump_report_stats.iter().copied().collect::<Vec<_>>(),
            vec![(2_002, 102), (2_003, 103), (2_004, 104)]
        );
    }

    #[test]
    fn test_icebox_keeps_most_recent_removals() {
        let limits = Limits {
            max_icebox_size: 20,
            ..Limits::default()
        };
        let (stats, _) = stats_with(limits);

        for id in 0..25 {
            let key = ConfigKey::new(1, id);
            stats.note_config_received(key, shape(), &[], true);
            stats.note_config_removed(&key);
        }

        let ids: Vec<i64> = stats.icebox_snapshot().iter().map(|s| s.key.id).collect();
        assert_eq!(ids, (5..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_reset_config_stamps_in_place() {
        let (stats, clock) = stats_with(Limits::default());
        let key = ConfigKey::new(1, 1);
        stats.note_config_received(key, shape(), &[], true);
        clock.advance_sec(30);

        assert!(stats.note_config_reset(&key));
        assert_eq!(stats.snapshot_config(&key).unwrap().reset_time_sec, 1_030);
        assert!(stats.icebox_snapshot().is_empty());
    }

    #[test]
    fn test_reset_preserves_identity() {
        let (stats, clock) = stats_with(Limits::default());
        let key = ConfigKey::new(1, 1);
        let gone = ConfigKey::new(1, 2);
        let annotations = [Annotation {
            field_int64: 1,
            field_int32: 2,
        }];
        stats.note_config_received(key, shape(), &annotations, true);
        stats.note_config_received(gone, shape(), &[], true);
        stats.note_config_removed(&gone);
        stats.note_config_reset(&key);
        stats.note_matcher_matched(&key, 3);
        stats.note_data_dropped(&key);
        stats.note_logger_error(-1);
        stats.note_atom_logged(10, 1_000);
        stats.note_registered_anomaly_alarm_changed();

        clock.advance_sec(100);
        stats.reset();

        assert_eq!(stats.start_time_sec(), 1_100);
        assert!(stats.icebox_snapshot().is_empty());
        let snapshot = stats.snapshot_config(&key).unwrap();
        assert_eq!(snapshot.creation_time_sec, 1_000);
        assert_eq!(snapshot.reset_time_sec, 1_000);
        assert_eq!(snapshot.shape, shape());
        assert_eq!(snapshot.annotations, annotations);
        assert!(snapshot.matcher_stats.is_empty());
        assert!(snapshot.data_drop_time_sec.is_empty());

        let report = decode(&stats, false);
        assert!(report.atom_stats.is_empty());
        assert!(report.logger_error_stats.is_empty());
        assert!(report.anomaly_alarm_stats.is_none());
    }

    #[test]
    fn test_dump_report_with_reset() {
        let (stats, clock) = stats_with(Limits::default());
        let key = ConfigKey::new(1, 1);
        stats.note_config_received(key, shape(), &[], true);
        stats.note_matcher_matched(&key, 1);
        clock.advance_sec(5);

        let first = decode(&stats, true);
        assert_eq!(first.stats_begin_time_sec, 1_000);
        assert_eq!(first.stats_end_time_sec, 1_005);
        assert_eq!(first.config_stats[0].matcher_stats.len(), 1);

        let second = decode(&stats, false);
        assert_eq!(second.stats_begin_time_sec, 1_005);
        assert_eq!(second.config_stats.len(), 1);
        assert!(second.config_stats[0].matcher_stats.is_empty());
    }

    #[test]
    fn test_atom_histogram_bounds() {
        let limits = Limits {
            max_pushed_atom_id: 10,
            ..Limits::default()
        };
        let (stats, _) = stats_with(limits);

        stats.note_atom_logged(10, 1);
        stats.note_atom_logged(10, 2);
        stats.note_atom_logged(0, 3);
        stats.note_atom_logged(11, 4);
        stats.note_atom_logged(-1, 5);

        let report = decode(&stats, false);
        assert_eq!(
            report.atom_stats,
            vec![
                proto::AtomStats { tag: 0, count: 1 },
                proto::AtomStats { tag: 10, count: 2 },
            ]
        );
    }

    #[test]
    fn test_unvalidated_huge_limits_do_not_preallocate() {
        let limits = Limits {
            max_icebox_size: usize::MAX,
            max_timestamp_count: usize::MAX,
            max_logger_errors: usize::MAX,
            max_pushed_atom_id: usize::MAX,
            ..Limits::default()
        };
        let (stats, _) = stats_with(limits);
        let key = ConfigKey::new(1, 1);
        stats.note_config_received(key, shape(), &[], true);
        stats.note_broadcast_sent(&key);
        stats.note_logger_error(1);
        stats.note_atom_logged(i32::MAX, 1);
        stats.note_config_removed(&key);

        assert_eq!(stats.icebox_snapshot().len(), 1);
        assert!(decode(&stats, false).atom_stats.is_empty());
    }

    #[test]
    fn test_pulled_atom_stats() {
        let (stats, _) = stats_with(Limits::default());
        stats.note_pull(10_000);
        stats.note_pull(10_000);
        stats.note_pull_from_cache(10_000);
        stats.update_min_pull_interval_sec(10_000, 30);
        stats.update_min_pull_interval_sec(10_000, 60);

        let report = decode(&stats, false);
        assert_eq!(
            report.pulled_atom_stats,
            vec![proto::PulledAtomStats {
                atom_id: 10_000,
                total_pull: 2,
                total_pull_from_cache: 1,
                min_pull_interval_sec: 60,
            }]
        );
    }

    #[test]
    fn test_global_rings_and_counters() {
        let limits = Limits {
            max_logger_errors: 2,
            max_system_server_restarts: 2,
            max_log_loss_count: 2,
            ..Limits::default()
        };
        let (stats, clock) = stats_with(limits);

        for code in 1..=3 {
            clock.set_sec(3_000 + i64::from(code));
            stats.note_logger_error(code);
            stats.note_system_server_restart(500 + i64::from(code));
            stats.note_log_lost(9_000 + i64::from(code));
        }
        stats.note_registered_periodic_alarm_changed();
        stats.note_uid_map_dropped(4);
        stats.note_uid_map_dropped(1);
        stats.note_uid_map_app_deletion_dropped();
        stats.set_uid_map_changes(12);
        stats.set_current_uid_map_memory(4096);

        let report = decode(&stats, false);
        assert_eq!(
            report.logger_error_stats,
            vec![
                proto::LoggerErrorStats {
                    logger_disconnection_sec: 3_002,
                    error_code: 2
                },
                proto::LoggerErrorStats {
                    logger_disconnection_sec: 3_003,
                    error_code: 3
                },
            ]
        );
        assert_eq!(report.system_restart_sec, vec![502, 503]);
        assert_eq!(report.log_loss_time_ns, vec![9_002, 9_003]);
        assert!(report.anomaly_alarm_stats.is_none());
        assert_eq!(
            report.periodic_alarm_stats,
            Some(proto::AlarmStats {
                alarms_registered: 1
            })
        );
        assert_eq!(
            report.uidmap_stats,
            Some(proto::UidMapStats {
                changes: 12,
                bytes_used: 4096,
                dropped_changes: 5,
                deleted_apps: 1,
            })
        );
    }

    #[test]
    fn test_report_lists_icebox_before_active() {
        let (stats, _) = stats_with(Limits::default());
        let removed = ConfigKey::new(2, 2);
        let active = ConfigKey::new(1, 1);
        stats.note_config_received(active, shape(), &[], true);
        stats.note_config_received(removed, shape(), &[], true);
        stats.note_config_removed(&removed);

        let report = decode(&stats, false);
        let ids: Vec<_> = report.config_stats.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(report.config_stats[0].deletion_time_sec.is_some());
        assert!(report.config_stats[1].deletion_time_sec.is_none());
    }

    #[test]
    fn test_dump_human_readable() {
        let (stats, _) = stats_with(Limits::default());
        let key = ConfigKey::new(1, 100);
        stats.note_config_received(key, shape(), &[], true);
        stats.note_anomaly_declared(&key, 4);

        let mut out = Vec::new();
        stats.dump_human_readable(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("config uid=1 id=100"));
        assert!(text.contains("alert 4 declared 1 times"));

        // Rendering does not reset.
        assert_eq!(stats.snapshot_config(&key).unwrap().alert_stats[&4], 1);
    }
}
