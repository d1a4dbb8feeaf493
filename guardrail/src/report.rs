//! Stats report wire format and text rendering.
//!
//! [`GuardrailStats::dump_report`](crate::stats::GuardrailStats::dump_report)
//! produces a protobuf-encoded [`proto::StatsReport`]. External tooling decodes
//! it; field tags are part of that contract and must not be renumbered.
//!
//! Presence carries meaning: reset and deletion times are proto3 `optional`
//! and omitted when the event never happened, alarm sections are omitted when
//! no alarm was registered, and pushed atoms with a zero count are not listed.

use std::io::Write;

use prost::Message;

use crate::error::{ReportError, Result};

/// Stats report protobuf types.
///
/// Hand-written prost derives, no protoc or `.proto` files involved.
pub mod proto {
    /// Top-level report.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct StatsReport {
        /// Start of the collection window, epoch seconds.
        #[prost(int64, tag = "1")]
        pub stats_begin_time_sec: i64,
        /// End of the collection window, epoch seconds.
        #[prost(int64, tag = "2")]
        pub stats_end_time_sec: i64,
        /// Iceboxed configs (oldest first), then active configs.
        #[prost(message, repeated, tag = "3")]
        pub config_stats: Vec<ConfigStatsReport>,
        /// Pushed atoms with a nonzero count.
        #[prost(message, repeated, tag = "4")]
        pub atom_stats: Vec<AtomStats>,
        /// Pulled atom statistics.
        #[prost(message, repeated, tag = "5")]
        pub pulled_atom_stats: Vec<PulledAtomStats>,
        /// Anomaly alarm registrations; absent if none.
        #[prost(message, optional, tag = "6")]
        pub anomaly_alarm_stats: Option<AlarmStats>,
        /// Periodic alarm registrations; absent if none.
        #[prost(message, optional, tag = "7")]
        pub periodic_alarm_stats: Option<AlarmStats>,
        /// UID map snapshot.
        #[prost(message, optional, tag = "8")]
        pub uidmap_stats: Option<UidMapStats>,
        /// Logger errors, oldest first.
        #[prost(message, repeated, tag = "9")]
        pub logger_error_stats: Vec<LoggerErrorStats>,
        /// Log-loss events, nanoseconds, oldest first.
        #[prost(int64, repeated, tag = "10")]
        pub log_loss_time_ns: Vec<i64>,
        /// System server restarts, epoch seconds, oldest first.
        #[prost(int64, repeated, tag = "11")]
        pub system_restart_sec: Vec<i64>,
    }

    /// Statistics for one config.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ConfigStatsReport {
        /// Owning uid.
        #[prost(int32, tag = "1")]
        pub uid: i32,
        /// Config id.
        #[prost(int64, tag = "2")]
        pub id: i64,
        /// Creation time, epoch seconds.
        #[prost(int64, tag = "3")]
        pub creation_time_sec: i64,
        /// Deletion time, epoch seconds; absent while active.
        #[prost(int64, optional, tag = "4")]
        pub deletion_time_sec: Option<i64>,
        /// Last reset time, epoch seconds; absent if never reset.
        #[prost(int64, optional, tag = "5")]
        pub reset_time_sec: Option<i64>,
        /// Number of metrics.
        #[prost(int32, tag = "6")]
        pub metric_count: i32,
        /// Number of conditions.
        #[prost(int32, tag = "7")]
        pub condition_count: i32,
        /// Number of matchers.
        #[prost(int32, tag = "8")]
        pub matcher_count: i32,
        /// Number of alerts.
        #[prost(int32, tag = "9")]
        pub alert_count: i32,
        /// Whether the config passed validation.
        #[prost(bool, tag = "10")]
        pub is_valid: bool,
        /// Broadcast times, epoch seconds.
        #[prost(int64, repeated, tag = "11")]
        pub broadcast_sent_time_sec: Vec<i64>,
        /// Data drop times, epoch seconds.
        #[prost(int64, repeated, tag = "12")]
        pub data_drop_time_sec: Vec<i64>,
        /// Report dumps.
        #[prost(message, repeated, tag = "13")]
        pub dump_report_stats: Vec<DumpReportStats>,
        /// Annotations, in submission order.
        #[prost(message, repeated, tag = "14")]
        pub annotation: Vec<Annotation>,
        /// Matcher match counts.
        #[prost(message, repeated, tag = "15")]
        pub matcher_stats: Vec<MatcherStats>,
        /// Condition output tuple maxima.
        #[prost(message, repeated, tag = "16")]
        pub condition_stats: Vec<ConditionStats>,
        /// Metric output tuple maxima.
        #[prost(message, repeated, tag = "17")]
        pub metric_stats: Vec<MetricStats>,
        /// Metric dimension-in-condition maxima.
        #[prost(message, repeated, tag = "18")]
        pub metric_dimension_in_condition_stats: Vec<MetricStats>,
        /// Alert declaration counts.
        #[prost(message, repeated, tag = "19")]
        pub alert_stats: Vec<AlertStats>,
    }

    /// One report dump.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct DumpReportStats {
        /// Dump time, epoch seconds.
        #[prost(int64, tag = "1")]
        pub dump_report_sec: i64,
        /// Size of the dumped report in bytes.
        #[prost(int64, tag = "2")]
        pub dump_report_size: i64,
    }

    /// Config annotation.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Annotation {
        /// 64-bit part.
        #[prost(int64, tag = "1")]
        pub field_int64: i64,
        /// 32-bit part.
        #[prost(int32, tag = "2")]
        pub field_int32: i32,
    }

    /// Matcher match count.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct MatcherStats {
        /// Matcher id.
        #[prost(int64, tag = "1")]
        pub id: i64,
        /// Times matched.
        #[prost(int64, tag = "2")]
        pub matched_times: i64,
    }

    /// Condition dimension maximum.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ConditionStats {
        /// Condition id.
        #[prost(int64, tag = "1")]
        pub id: i64,
        /// Largest output tuple count observed.
        #[prost(int64, tag = "2")]
        pub max_tuple_counts: i64,
    }

    /// Metric dimension maximum.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct MetricStats {
        /// Metric id.
        #[prost(int64, tag = "1")]
        pub id: i64,
        /// Largest output tuple count observed.
        #[prost(int64, tag = "2")]
        pub max_tuple_counts: i64,
    }

    /// Alert declaration count.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct AlertStats {
        /// Alert id.
        #[prost(int64, tag = "1")]
        pub id: i64,
        /// Times declared.
        #[prost(int64, tag = "2")]
        pub alerted_times: i64,
    }

    /// Pushed atom count.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct AtomStats {
        /// Atom id.
        #[prost(int32, tag = "1")]
        pub tag: i32,
        /// Times logged.
        #[prost(int64, tag = "2")]
        pub count: i64,
    }

    /// Pulled atom statistics.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct PulledAtomStats {
        /// Atom id.
        #[prost(int32, tag = "1")]
        pub atom_id: i32,
        /// Total pulls.
        #[prost(int64, tag = "2")]
        pub total_pull: i64,
        /// Pulls served from cache.
        #[prost(int64, tag = "3")]
        pub total_pull_from_cache: i64,
        /// Minimum pull interval, seconds.
        #[prost(int64, tag = "4")]
        pub min_pull_interval_sec: i64,
    }

    /// Alarm registration count.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct AlarmStats {
        /// Times the registered alarm changed.
        #[prost(int64, tag = "1")]
        pub alarms_registered: i64,
    }

    /// UID map snapshot.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct UidMapStats {
        /// Pending changes.
        #[prost(int64, tag = "1")]
        pub changes: i64,
        /// Bytes used by the map.
        #[prost(int64, tag = "2")]
        pub bytes_used: i64,
        /// Changes dropped for memory.
        #[prost(int64, tag = "3")]
        pub dropped_changes: i64,
        /// App deletions dropped for memory.
        #[prost(int64, tag = "4")]
        pub deleted_apps: i64,
    }

    /// Logger error occurrence.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct LoggerErrorStats {
        /// Time of the error, epoch seconds.
        #[prost(int64, tag = "1")]
        pub logger_disconnection_sec: i64,
        /// Error code.
        #[prost(int32, tag = "2")]
        pub error_code: i32,
    }
}

/// Decodes a binary stats report.
///
/// # Errors
///
/// Returns [`ReportError::Decode`] if `bytes` are not a valid report.
pub fn decode_report(bytes: &[u8]) -> Result<proto::StatsReport> {
    proto::StatsReport::decode(bytes).map_err(|e| ReportError::Decode { source: e }.into())
}

/// Renders a report as operator-facing text. Not a stable format.
///
/// # Errors
///
/// Returns any I/O error from `out`.
pub fn render_text<W: Write>(report: &proto::StatsReport, out: &mut W) -> std::io::Result<()> {
    writeln!(
        out,
        "Stats collection window: {} - {}",
        report.stats_begin_time_sec, report.stats_end_time_sec
    )?;

    writeln!(out, "Configs ({}):", report.config_stats.len())?;
    for config in &report.config_stats {
        render_config(config, out)?;
    }

    writeln!(out, "Pushed atoms:")?;
    for atom in &report.atom_stats {
        writeln!(out, "  atom {} -> {}", atom.tag, atom.count)?;
    }

    writeln!(out, "Pulled atoms:")?;
    for pulled in &report.pulled_atom_stats {
        writeln!(
            out,
            "  atom {}: pulls={} from_cache={} min_interval={}s",
            pulled.atom_id,
            pulled.total_pull,
            pulled.total_pull_from_cache,
            pulled.min_pull_interval_sec
        )?;
    }

    if let Some(alarms) = &report.anomaly_alarm_stats {
        writeln!(out, "Anomaly alarms registered: {}", alarms.alarms_registered)?;
    }
    if let Some(alarms) = &report.periodic_alarm_stats {
        writeln!(out, "Periodic alarms registered: {}", alarms.alarms_registered)?;
    }

    if let Some(uid_map) = &report.uidmap_stats {
        writeln!(
            out,
            "UID map: changes={} bytes={} dropped_changes={} deleted_apps={}",
            uid_map.changes, uid_map.bytes_used, uid_map.dropped_changes, uid_map.deleted_apps
        )?;
    }

    for error in &report.logger_error_stats {
        writeln!(
            out,
            "Logger error {} at {}",
            error.error_code, error.logger_disconnection_sec
        )?;
    }
    for lost in &report.log_loss_time_ns {
        writeln!(out, "Log loss at {lost}ns")?;
    }
    for restart in &report.system_restart_sec {
        writeln!(out, "System server restarted at {restart}")?;
    }
    Ok(())
}

fn render_config<W: Write>(config: &proto::ConfigStatsReport, out: &mut W) -> std::io::Result<()> {
    write!(
        out,
        "  config uid={} id={} created={}",
        config.uid, config.id, config.creation_time_sec
    )?;
    if let Some(reset) = config.reset_time_sec {
        write!(out, " reset={reset}")?;
    }
    if let Some(deleted) = config.deletion_time_sec {
        write!(out, " deleted={deleted}")?;
    }
    writeln!(
        out,
        " metrics={} conditions={} matchers={} alerts={} valid={}",
        config.metric_count,
        config.condition_count,
        config.matcher_count,
        config.alert_count,
        config.is_valid
    )?;

    for annotation in &config.annotation {
        writeln!(
            out,
            "    annotation {} {}",
            annotation.field_int64, annotation.field_int32
        )?;
    }
    for sent in &config.broadcast_sent_time_sec {
        writeln!(out, "    broadcast sent at {sent}")?;
    }
    for dropped in &config.data_drop_time_sec {
        writeln!(out, "    data dropped at {dropped}")?;
    }
    for dump in &config.dump_report_stats {
        writeln!(
            out,
            "    report dumped at {} ({} bytes)",
            dump.dump_report_sec, dump.dump_report_size
        )?;
    }
    for matcher in &config.matcher_stats {
        writeln!(out, "    matcher {} matched {} times", matcher.id, matcher.matched_times)?;
    }
    for condition in &config.condition_stats {
        writeln!(
            out,
            "    condition {} max output tuples {}",
            condition.id, condition.max_tuple_counts
        )?;
    }
    for metric in &config.metric_stats {
        writeln!(
            out,
            "    metric {} max output tuples {}",
            metric.id, metric.max_tuple_counts
        )?;
    }
    for metric in &config.metric_dimension_in_condition_stats {
        writeln!(
            out,
            "    metric {} max dimensions in condition {}",
            metric.id, metric.max_tuple_counts
        )?;
    }
    for alert in &config.alert_stats {
        writeln!(out, "    alert {} declared {} times", alert.id, alert.alerted_times)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> proto::StatsReport {
        proto::StatsReport {
            stats_begin_time_sec: 100,
            stats_end_time_sec: 200,
            config_stats: vec![proto::ConfigStatsReport {
                uid: 1,
                id: 100,
                creation_time_sec: 110,
                deletion_time_sec: Some(150),
                metric_count: 3,
                is_valid: true,
                matcher_stats: vec![proto::MatcherStats {
                    id: 55,
                    matched_times: 3,
                }],
                ..Default::default()
            }],
            periodic_alarm_stats: Some(proto::AlarmStats {
                alarms_registered: 2,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_encoded_report() {
        let report = sample_report();
        let bytes = report.encode_to_vec();
        assert_eq!(decode_report(&bytes).unwrap(), report);
    }

    #[test]
    fn test_absent_optional_scalars_stay_absent() {
        let bytes = sample_report().encode_to_vec();
        let decoded = decode_report(&bytes).unwrap();

        let config = &decoded.config_stats[0];
        assert_eq!(config.reset_time_sec, None);
        assert_eq!(config.deletion_time_sec, Some(150));
        assert!(decoded.anomaly_alarm_stats.is_none());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_report(&[0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_render_text() {
        let mut out = Vec::new();
        render_text(&sample_report(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("config uid=1 id=100 created=110 deleted=150"));
        assert!(text.contains("matcher 55 matched 3 times"));
        assert!(text.contains("Periodic alarms registered: 2"));
        assert!(!text.contains("Anomaly alarms"));
    }
}
