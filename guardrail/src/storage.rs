//! Persisted config blobs.
//!
//! The registry keeps at most one blob per [`ConfigKey`] on durable storage so
//! that configs survive a daemon restart. Storage is a collaborator behind the
//! [`ConfigStorage`] trait; [`DirStorage`] is the filesystem implementation and
//! [`MemoryStorage`] keeps blobs in memory.
//!
//! # File Layout
//!
//! ```text
//! config_dir/
//! ├── 1700000000_1000_42      <- {unixTimeSec}_{uid}_{configId}, raw config bytes
//! ├── 1700000123_1000_43
//! └── 1700000456_2000_-7
//! ```
//!
//! Deletion matches on the `_{uid}_{configId}` suffix, so every generation of
//! a key's blob is removed at once.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use crate::error::{Result, StorageError};
use crate::key::ConfigKey;

/// Durable storage for serialized configs.
///
/// Implementations need not be internally synchronized against concurrent
/// writers of the same key: the registry only calls them while holding its
/// own lock.
pub trait ConfigStorage: Send + Sync {
    /// Reads the newest blob of every persisted key.
    ///
    /// A blob that cannot be read is skipped; the remaining keys are still
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be listed.
    fn read_all(&self) -> Result<Vec<(ConfigKey, Vec<u8>)>>;

    /// Reads the newest blob for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be read.
    fn read(&self, key: &ConfigKey) -> Result<Option<Vec<u8>>>;

    /// Writes a blob for `key` stamped with `timestamp_sec`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the blob cannot be written.
    fn write(&self, key: &ConfigKey, timestamp_sec: i64, bytes: &[u8]) -> Result<()>;

    /// Deletes every blob for `key`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if a matching blob cannot be removed.
    fn delete_matching(&self, key: &ConfigKey) -> Result<usize>;
}

/// A persisted blob's parsed file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobName {
    /// Write time in seconds since the epoch.
    pub timestamp_sec: i64,
    /// The config the blob belongs to.
    pub key: ConfigKey,
}

impl BlobName {
    /// Formats the file name for this blob.
    pub fn file_name(&self) -> String {
        format!("{}_{}", self.timestamp_sec, self.key.storage_suffix())
    }

    /// Parses `{unixTimeSec}_{uid}_{configId}`. Config ids may be negative.
    pub fn parse(name: &str) -> Option<Self> {
        let mut parts = name.splitn(3, '_');
        let timestamp_sec = parts.next()?.parse().ok()?;
        let uid = parts.next()?.parse().ok()?;
        let id = parts.next()?.parse().ok()?;
        Some(Self {
            timestamp_sec,
            key: ConfigKey::new(uid, id),
        })
    }
}

/// Filesystem-backed storage: one file per blob in a single directory.
#[derive(Debug)]
pub struct DirStorage {
    dir: PathBuf,
}

impl DirStorage {
    /// Opens (creating if needed) the config directory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DirectoryAccess`] if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StorageError::DirectoryAccess {
            path: dir.display().to_string(),
            source: e,
        })?;
        Ok(Self { dir })
    }

    /// Lists every well-formed blob, oldest first. Unparsable names are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DirectoryAccess`] if the directory cannot be listed.
    pub fn list(&self) -> Result<Vec<(BlobName, PathBuf)>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| StorageError::DirectoryAccess {
            path: self.dir.display().to_string(),
            source: e,
        })?;

        let mut blobs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::DirectoryAccess {
                path: self.dir.display().to_string(),
                source: e,
            })?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            match BlobName::parse(name) {
                Some(blob) => blobs.push((blob, entry.path())),
                None => warn!(file = name, "skipping unrecognized file in config directory"),
            }
        }
        blobs.sort_by_key(|(blob, _)| (blob.timestamp_sec, blob.key));
        Ok(blobs)
    }

    fn read_file(path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| {
            StorageError::ReadFailed {
                path: path.display().to_string(),
                source: e,
            }
            .into()
        })
    }
}

impl ConfigStorage for DirStorage {
    fn read_all(&self) -> Result<Vec<(ConfigKey, Vec<u8>)>> {
        // Oldest first, so later generations overwrite earlier ones.
        let mut newest: BTreeMap<ConfigKey, PathBuf> = BTreeMap::new();
        for (blob, path) in self.list()? {
            newest.insert(blob.key, path);
        }

        let mut blobs = Vec::with_capacity(newest.len());
        for (key, path) in newest {
            match Self::read_file(&path) {
                Ok(bytes) => blobs.push((key, bytes)),
                Err(e) => warn!(
                    uid = key.uid,
                    config_id = key.id,
                    error = %e,
                    "skipping unreadable config blob"
                ),
            }
        }
        Ok(blobs)
    }

    fn read(&self, key: &ConfigKey) -> Result<Option<Vec<u8>>> {
        let newest = self
            .list()?
            .into_iter()
            .rev()
            .find(|(blob, _)| blob.key == *key);
        match newest {
            Some((_, path)) => Ok(Some(Self::read_file(&path)?)),
            None => Ok(None),
        }
    }

    fn write(&self, key: &ConfigKey, timestamp_sec: i64, bytes: &[u8]) -> Result<()> {
        let name = BlobName {
            timestamp_sec,
            key: *key,
        };
        let path = self.dir.join(name.file_name());
        fs::write(&path, bytes).map_err(|e| StorageError::WriteFailed {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }

    fn delete_matching(&self, key: &ConfigKey) -> Result<usize> {
        let mut removed = 0;
        for (blob, path) in self.list()? {
            if blob.key != *key {
                continue;
            }
            fs::remove_file(&path).map_err(|e| StorageError::DeleteFailed {
                path: path.display().to_string(),
                source: e,
            })?;
            removed += 1;
        }
        Ok(removed)
    }
}

/// In-memory storage. Keeps every generation so tests can count blobs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: Mutex<Vec<(BlobName, Vec<u8>)>>,
}

impl MemoryStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently held for `key`.
    pub fn blob_count(&self, key: &ConfigKey) -> usize {
        self.lock().iter().filter(|(blob, _)| blob.key == *key).count()
    }

    /// Names of all blobs currently held, in write order.
    pub fn blob_names(&self) -> Vec<BlobName> {
        self.lock().iter().map(|(blob, _)| blob.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(BlobName, Vec<u8>)>> {
        self.blobs.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ConfigStorage for MemoryStorage {
    fn read_all(&self) -> Result<Vec<(ConfigKey, Vec<u8>)>> {
        let mut newest: BTreeMap<ConfigKey, Vec<u8>> = BTreeMap::new();
        for (blob, bytes) in self.lock().iter() {
            newest.insert(blob.key, bytes.clone());
        }
        Ok(newest.into_iter().collect())
    }

    fn read(&self, key: &ConfigKey) -> Result<Option<Vec<u8>>> {
        Ok(self
            .lock()
            .iter()
            .rev()
            .find(|(blob, _)| blob.key == *key)
            .map(|(_, bytes)| bytes.clone()))
    }

    fn write(&self, key: &ConfigKey, timestamp_sec: i64, bytes: &[u8]) -> Result<()> {
        let name = BlobName {
            timestamp_sec,
            key: *key,
        };
        self.lock().push((name, bytes.to_vec()));
        Ok(())
    }

    fn delete_matching(&self, key: &ConfigKey) -> Result<usize> {
        let mut blobs = self.lock();
        let before = blobs.len();
        blobs.retain(|(blob, _)| blob.key != *key);
        Ok(before - blobs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_blob_name_round_trip() {
        let name = BlobName {
            timestamp_sec: 1_700_000_000,
            key: ConfigKey::new(1000, -42),
        };
        assert_eq!(name.file_name(), "1700000000_1000_-42");
        assert_eq!(BlobName::parse(&name.file_name()), Some(name));
    }

    #[test]
    fn test_blob_name_rejects_malformed() {
        assert_eq!(BlobName::parse("notes.txt"), None);
        assert_eq!(BlobName::parse("12_34"), None);
        assert_eq!(BlobName::parse("12_x_34"), None);
    }

    #[test]
    fn test_dir_storage_write_read_delete() {
        let dir = tempdir().unwrap();
        let storage = DirStorage::open(dir.path().join("configs")).unwrap();
        let key = ConfigKey::new(1, 100);
        let other = ConfigKey::new(1, 1000);

        storage.write(&key, 10, b"old").unwrap();
        storage.write(&key, 20, b"new").unwrap();
        storage.write(&other, 15, b"other").unwrap();

        assert_eq!(storage.read(&key).unwrap(), Some(b"new".to_vec()));
        assert_eq!(
            storage.read_all().unwrap(),
            vec![(key, b"new".to_vec()), (other, b"other".to_vec())]
        );

        // Suffix "1_100" must not match "1_1000".
        assert_eq!(storage.delete_matching(&key).unwrap(), 2);
        assert_eq!(storage.read(&key).unwrap(), None);
        assert_eq!(storage.read(&other).unwrap(), Some(b"other".to_vec()));
    }

    #[test]
    fn test_dir_storage_skips_foreign_files() {
        let dir = tempdir().unwrap();
        let storage = DirStorage::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("README"), b"hello").unwrap();
        storage.write(&ConfigKey::new(3, 4), 5, b"blob").unwrap();

        let listed = storage.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0.key, ConfigKey::new(3, 4));
    }

    #[test]
    fn test_read_all_skips_unreadable_blob() {
        let dir = tempdir().unwrap();
        let storage = DirStorage::open(dir.path()).unwrap();
        storage.write(&ConfigKey::new(1000, 1), 5, b"good").unwrap();
        std::fs::create_dir(dir.path().join("1700000000_2000_9")).unwrap();

        let blobs = storage.read_all().unwrap();
        assert_eq!(blobs, vec![(ConfigKey::new(1000, 1), b"good".to_vec())]);
    }

    #[test]
    fn test_memory_storage_counts_generations() {
        let storage = MemoryStorage::new();
        let key = ConfigKey::new(1, 2);
        storage.write(&key, 1, b"a").unwrap();
        storage.write(&key, 2, b"b").unwrap();

        assert_eq!(storage.blob_count(&key), 2);
        assert_eq!(storage.read(&key).unwrap(), Some(b"b".to_vec()));
        assert_eq!(storage.delete_matching(&key).unwrap(), 2);
        assert_eq!(storage.blob_count(&key), 0);
    }
}
