//! Bridge from registry events to guardrail statistics.

use std::sync::Arc;

use tracing::warn;

use crate::config::MonitoringConfig;
use crate::key::ConfigKey;
use crate::limits::Limits;
use crate::registry::ConfigListener;
use crate::stats::GuardrailStats;

/// A [`ConfigListener`] that records every config the registry accepts.
///
/// Each update is validated against the listener's [`Limits`]; a config that
/// fails validation is still recorded, but as invalid, so it lands directly in
/// the icebox.
#[derive(Debug)]
pub struct StatsListener {
    stats: Arc<GuardrailStats>,
    limits: Limits,
}

impl StatsListener {
    /// Creates a listener feeding `stats`, validating with the same limits.
    pub fn new(stats: Arc<GuardrailStats>) -> Self {
        let limits = stats.limits().clone();
        Self { stats, limits }
    }
}

impl ConfigListener for StatsListener {
    fn on_config_updated(&self, _timestamp_ns: i64, key: &ConfigKey, config: &MonitoringConfig) {
        let is_valid = match config.validate(&self.limits) {
            Ok(()) => true,
            Err(e) => {
                warn!(uid = key.uid, config_id = key.id, error = %e, "config failed validation");
                false
            }
        };
        self.stats
            .note_config_received(*key, config.shape(), &config.annotations, is_valid);
    }

    fn on_config_removed(&self, key: &ConfigKey) {
        self.stats.note_config_removed(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::tests::sample_config;
    use crate::config::MetricSpec;
    use crate::registry::ConfigRegistry;
    use crate::storage::MemoryStorage;

    fn wired(limits: Limits) -> (ConfigRegistry, Arc<GuardrailStats>) {
        let clock = Arc::new(ManualClock::at_sec(500));
        let stats = Arc::new(GuardrailStats::new(clock.clone(), limits.clone()));
        let registry = ConfigRegistry::new(Arc::new(MemoryStorage::new()), clock, limits);
        registry.add_listener(Arc::new(StatsListener::new(stats.clone())));
        (registry, stats)
    }

    #[test]
    fn test_update_records_shape_and_annotations() {
        let (registry, stats) = wired(Limits::default());
        let key = ConfigKey::new(1, 100);
        let config = sample_config();
        registry.update_config(key, &config);

        let snapshot = stats.snapshot_config(&key).unwrap();
        assert!(snapshot.is_valid);
        assert_eq!(snapshot.shape, config.shape());
        assert_eq!(snapshot.annotations, config.annotations);
        assert_eq!(snapshot.creation_time_sec, 500);
    }

    #[test]
    fn test_invalid_config_is_iced() {
        let (registry, stats) = wired(Limits::default());
        let key = ConfigKey::new(1, 100);
        let mut config = sample_config();
        config.metrics.push(MetricSpec {
            id: 31,
            what: 999,
            condition: None,
        });
        registry.update_config(key, &config);

        // The registry still accepts it; only the stats mark it invalid.
        assert!(registry.is_active(&key));
        assert!(!stats.is_active(&key));
        let icebox = stats.icebox_snapshot();
        assert_eq!(icebox.len(), 1);
        assert!(!icebox[0].is_valid);
    }

    #[test]
    fn test_remove_moves_stats_to_icebox() {
        let (registry, stats) = wired(Limits::default());
        let key = ConfigKey::new(1, 100);
        registry.update_config(key, &sample_config());
        registry.remove_config(&key);

        assert!(!stats.is_active(&key));
        assert_eq!(stats.icebox_snapshot()[0].key, key);
    }
}
