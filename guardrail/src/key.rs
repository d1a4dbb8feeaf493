//! Config identity.

use std::fmt;

/// Identity of a monitoring config: the owning uid plus the config id.
///
/// Pure value type, `Copy`, totally ordered and hashable. Ordering is by uid
/// first, then id, so a `BTreeMap<ConfigKey, _>` groups configs by owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigKey {
    /// The owning principal.
    pub uid: i32,
    /// The config id, unique within the owner.
    pub id: i64,
}

impl ConfigKey {
    /// Creates a new key.
    pub const fn new(uid: i32, id: i64) -> Self {
        Self { uid, id }
    }

    /// The `{uid}_{id}` suffix used to name persisted blobs.
    pub fn storage_suffix(&self) -> String {
        format!("{}_{}", self.uid, self.id)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {})", self.uid, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_ordering_groups_by_uid() {
        let keys: BTreeSet<_> = [
            ConfigKey::new(2, 1),
            ConfigKey::new(1, 500),
            ConfigKey::new(1, -3),
        ]
        .into_iter()
        .collect();

        let ordered: Vec<_> = keys.into_iter().collect();
        assert_eq!(
            ordered,
            vec![ConfigKey::new(1, -3), ConfigKey::new(1, 500), ConfigKey::new(2, 1)]
        );
    }

    #[test]
    fn test_storage_suffix_and_display() {
        let key = ConfigKey::new(1000, 12345);
        assert_eq!(key.storage_suffix(), "1000_12345");
        assert_eq!(key.to_string(), "(1000 12345)");
    }
}
