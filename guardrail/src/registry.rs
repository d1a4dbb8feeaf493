//! Registry of active monitoring configs.
//!
//! The [`ConfigRegistry`] owns the authoritative set of active config keys per
//! uid, keeps exactly one persisted blob per key, and fans add/remove events
//! out to registered [`ConfigListener`]s.
//!
//! # Design
//!
//! - One mutex guards all registry state; there is no per-key locking
//! - Storage writes happen while the lock is held, so at most one writer
//!   touches a key's blob at a time (disk I/O is on the critical path)
//! - Listener callbacks run after the lock is released, on the calling thread,
//!   in registration order. A listener may call back into the registry without
//!   deadlocking, but may then observe state newer than the event it handles
//! - Guardrail rejections and storage failures are logged and swallowed; the
//!   caller is an untrusted external source and never sees an error
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use guardrail::{ConfigKey, ConfigRegistry, Limits, MemoryStorage, MonitoringConfig, SystemClock};
//! use guardrail::registry::UpdateOutcome;
//!
//! let registry = ConfigRegistry::new(
//!     Arc::new(MemoryStorage::new()),
//!     Arc::new(SystemClock),
//!     Limits::default(),
//! );
//!
//! let key = ConfigKey::new(1000, 1);
//! assert_eq!(registry.update_config(key, &MonitoringConfig::default()), UpdateOutcome::Added);
//! assert_eq!(registry.update_config(key, &MonitoringConfig::default()), UpdateOutcome::Unchanged);
//! assert_eq!(registry.get_all_config_keys(), vec![key]);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::MonitoringConfig;
use crate::key::ConfigKey;
use crate::limits::Limits;
use crate::storage::ConfigStorage;

/// Receives config lifecycle events from the registry.
///
/// Callbacks run synchronously on whichever thread mutated the registry. A
/// slow listener blocks that producer for its duration.
pub trait ConfigListener: Send + Sync {
    /// A config was added or replaced with different content.
    fn on_config_updated(&self, timestamp_ns: i64, key: &ConfigKey, config: &MonitoringConfig);

    /// An active config was removed.
    fn on_config_removed(&self, key: &ConfigKey);
}

/// Out-of-band delivery target for a config's data.
pub trait ConfigReceiver: Send + Sync + fmt::Debug {
    /// Asks the owner of `key` to come and fetch its data. Returns whether the
    /// request was delivered.
    fn deliver(&self, key: &ConfigKey) -> bool;
}

/// What [`ConfigRegistry::update_config`] did with a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A new key was accepted and listeners were notified.
    Added,
    /// An existing key got new content and listeners were notified.
    Replaced,
    /// The content matched what is persisted; only the blob timestamp moved.
    Unchanged,
    /// The uid is at its config ceiling, or the config could not be serialized.
    Rejected,
}

#[derive(Default)]
struct RegistryState {
    configs: BTreeMap<i32, BTreeSet<ConfigKey>>,
    receivers: BTreeMap<ConfigKey, Arc<dyn ConfigReceiver>>,
    listeners: Vec<Arc<dyn ConfigListener>>,
}

impl RegistryState {
    fn contains(&self, key: &ConfigKey) -> bool {
        self.configs.get(&key.uid).is_some_and(|keys| keys.contains(key))
    }

    fn count_for(&self, uid: i32) -> usize {
        self.configs.get(&uid).map_or(0, BTreeSet::len)
    }

    /// Removes `key` and its receiver. Returns whether the key was active.
    fn remove(&mut self, key: &ConfigKey) -> bool {
        self.receivers.remove(key);
        let Some(keys) = self.configs.get_mut(&key.uid) else {
            return false;
        };
        let removed = keys.remove(key);
        if keys.is_empty() {
            self.configs.remove(&key.uid);
        }
        removed
    }
}

/// Thread-safe registry of active configs.
pub struct ConfigRegistry {
    state: Mutex<RegistryState>,
    storage: Arc<dyn ConfigStorage>,
    clock: Arc<dyn Clock>,
    limits: Limits,
}

impl ConfigRegistry {
    /// Creates an empty registry over `storage`.
    ///
    /// Nothing is read from storage until [`startup`](Self::startup) is called.
    pub fn new(storage: Arc<dyn ConfigStorage>, clock: Arc<dyn Clock>, limits: Limits) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            storage,
            clock,
            limits,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replays every persisted config through [`update_config`](Self::update_config).
    ///
    /// Blobs that no longer decode are deleted. Returns the number of configs
    /// that became active.
    pub fn startup(&self) -> usize {
        let persisted = match self.storage.read_all() {
            Ok(persisted) => persisted,
            Err(e) => {
                error!(error = %e, "failed to read persisted configs");
                return 0;
            }
        };

        let mut restored = 0;
        for (key, bytes) in persisted {
            match MonitoringConfig::from_bytes(&bytes) {
                Ok(config) => {
                    if matches!(
                        self.update_config(key, &config),
                        UpdateOutcome::Added | UpdateOutcome::Replaced
                    ) {
                        restored += 1;
                    }
                }
                Err(e) => {
                    warn!(uid = key.uid, config_id = key.id, error = %e, "dropping undecodable config blob");
                    self.delete_blobs(&key);
                }
            }
        }
        info!(restored, "restored persisted configs");
        restored
    }

    /// Registers a listener. Duplicate registrations are not collapsed.
    pub fn add_listener(&self, listener: Arc<dyn ConfigListener>) {
        self.lock().listeners.push(listener);
    }

    /// Adds or replaces the config for `key`.
    ///
    /// - A new key for a uid already at `max_configs_per_uid` is rejected with
    ///   no state change and no notification.
    /// - An existing key whose canonical bytes match the persisted blob only
    ///   has its blob re-stamped; listeners are not notified.
    /// - Otherwise the old blob is replaced, the key becomes active, and every
    ///   listener's `on_config_updated` runs after the lock is released.
    pub fn update_config(&self, key: ConfigKey, config: &MonitoringConfig) -> UpdateOutcome {
        let serialized = match config.to_canonical_bytes() {
            Ok(serialized) => serialized,
            Err(e) => {
                error!(uid = key.uid, config_id = key.id, error = %e, "failed to serialize config");
                return UpdateOutcome::Rejected;
            }
        };

        let (existed, listeners) = {
            let mut state = self.lock();
            let existed = state.contains(&key);

            if !existed && state.count_for(key.uid) >= self.limits.max_configs_per_uid {
                error!(
                    uid = key.uid,
                    config_id = key.id,
                    max = self.limits.max_configs_per_uid,
                    "uid has too many configs, dropping update"
                );
                return UpdateOutcome::Rejected;
            }

            let now_sec = self.clock.now_sec();
            if existed && self.persisted_matches(&key, &serialized) {
                // Re-stamp so the blob is not aged out.
                self.persist(&key, now_sec, &serialized);
                debug!(uid = key.uid, config_id = key.id, "config unchanged");
                return UpdateOutcome::Unchanged;
            }

            self.persist(&key, now_sec, &serialized);
            state.configs.entry(key.uid).or_default().insert(key);
            (existed, state.listeners.clone())
        };

        info!(uid = key.uid, config_id = key.id, replaced = existed, "config updated");
        let timestamp_ns = self.clock.now_ns();
        for listener in &listeners {
            listener.on_config_updated(timestamp_ns, &key, config);
        }

        if existed {
            UpdateOutcome::Replaced
        } else {
            UpdateOutcome::Added
        }
    }

    /// Sets the delivery target for `key`.
    pub fn set_config_receiver(&self, key: ConfigKey, receiver: Arc<dyn ConfigReceiver>) {
        self.lock().receivers.insert(key, receiver);
    }

    /// Clears the delivery target for `key`.
    pub fn remove_config_receiver(&self, key: &ConfigKey) {
        self.lock().receivers.remove(key);
    }

    /// Returns the delivery target for `key`, if one is set.
    pub fn get_config_receiver(&self, key: &ConfigKey) -> Option<Arc<dyn ConfigReceiver>> {
        self.lock().receivers.get(key).cloned()
    }

    /// Removes `key`.
    ///
    /// Persisted blobs for the key are deleted even if it was not active.
    /// Listeners are notified only if it was. Returns whether it was active.
    pub fn remove_config(&self, key: &ConfigKey) -> bool {
        let (was_active, listeners) = {
            let mut state = self.lock();
            let was_active = state.remove(key);
            self.delete_blobs(key);
            (was_active, state.listeners.clone())
        };

        if was_active {
            info!(uid = key.uid, config_id = key.id, "config removed");
            for listener in &listeners {
                listener.on_config_removed(key);
            }
        }
        was_active
    }

    /// Removes every config owned by `uid`. Returns the removed keys.
    ///
    /// Notifications are sent only after all of the uid's configs are gone.
    pub fn remove_configs(&self, uid: i32) -> Vec<ConfigKey> {
        let (removed, listeners) = {
            let mut state = self.lock();
            let keys: Vec<ConfigKey> = state
                .configs
                .get(&uid)
                .map(|keys| keys.iter().copied().collect())
                .unwrap_or_default();
            for key in &keys {
                state.remove(key);
                self.delete_blobs(key);
            }
            (keys, state.listeners.clone())
        };

        self.notify_removed(&removed, &listeners);
        removed
    }

    /// Removes every config. Returns the removed keys.
    pub fn remove_all_configs(&self) -> Vec<ConfigKey> {
        let (removed, listeners) = {
            let mut state = self.lock();
            let keys: Vec<ConfigKey> = state.configs.values().flatten().copied().collect();
            for key in &keys {
                state.remove(key);
                self.delete_blobs(key);
            }
            (keys, state.listeners.clone())
        };

        self.notify_removed(&removed, &listeners);
        removed
    }

    /// Snapshot of every active key, ordered by uid then id.
    pub fn get_all_config_keys(&self) -> Vec<ConfigKey> {
        self.lock().configs.values().flatten().copied().collect()
    }

    /// Whether `key` is active.
    pub fn is_active(&self, key: &ConfigKey) -> bool {
        self.lock().contains(key)
    }

    /// Number of active configs owned by `uid`.
    pub fn config_count(&self, uid: i32) -> usize {
        self.lock().count_for(uid)
    }

    /// Writes one line per active config.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from `out`.
    pub fn dump_human_readable<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        let state = self.lock();
        writeln!(out, "CONFIGURATIONS")?;
        writeln!(out, "     uid        name")?;
        for key in state.configs.values().flatten() {
            let receiver = if state.receivers.contains_key(key) {
                "(has receiver)"
            } else {
                "(no receiver)"
            };
            writeln!(out, "  {:6} {:12} {receiver}", key.uid, key.id)?;
        }
        Ok(())
    }

    fn notify_removed(&self, keys: &[ConfigKey], listeners: &[Arc<dyn ConfigListener>]) {
        for key in keys {
            info!(uid = key.uid, config_id = key.id, "config removed");
            for listener in listeners {
                listener.on_config_removed(key);
            }
        }
    }

    fn persisted_matches(&self, key: &ConfigKey, serialized: &[u8]) -> bool {
        match self.storage.read(key) {
            Ok(Some(persisted)) => persisted == serialized,
            Ok(None) => false,
            Err(e) => {
                error!(uid = key.uid, config_id = key.id, error = %e, "failed to read persisted config");
                false
            }
        }
    }

    /// Replaces every blob for `key` with a single one stamped `now_sec`.
    fn persist(&self, key: &ConfigKey, now_sec: i64, serialized: &[u8]) {
        self.delete_blobs(key);
        if let Err(e) = self.storage.write(key, now_sec, serialized) {
            error!(uid = key.uid, config_id = key.id, error = %e, "failed to persist config");
        }
    }

    fn delete_blobs(&self, key: &ConfigKey) {
        if let Err(e) = self.storage.delete_matching(key) {
            error!(uid = key.uid, config_id = key.id, error = %e, "failed to delete persisted config");
        }
    }
}

impl fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigRegistry")
            .field("configs", &self.get_all_config_keys())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}
