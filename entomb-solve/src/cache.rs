//! The resolver's cache: decisions keyed by `(atom, slot, branches)` plus the ordered
//! snapshot checksums they were computed against (`spec.md` §4.4 step 5, §5).
//!
//! Grounded on the same bounded, generation-keyed shape as `entomb_mask::MaskCache`: a
//! single map doubles as both the in-process and "persistent" layer the spec
//! describes, since embedding the snapshot checksums in the key already makes stale
//! entries unreachable once a repository is replaced; the map is cleared outright
//! (rather than swept entry-by-entry) once it exceeds the ceiling.

use std::collections::HashMap;

use entomb_types::{PackageId, RepositoryId};

/// The default cache-size ceiling before a clear-on-overflow (`spec.md` §5).
pub const DEFAULT_CACHE_CEILING: usize = 4096;

/// One resolution's cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolveKey {
    atom_text: String,
    slot: Option<String>,
    branches: Vec<String>,
    checksums: Vec<String>,
}

impl ResolveKey {
    pub fn new(atom_text: &str, slot: Option<&str>, branches: &[String], checksums: &[String]) -> Self {
        let mut branches = branches.to_vec();
        branches.sort();
        ResolveKey {
            atom_text: atom_text.to_string(),
            slot: slot.map(str::to_string),
            branches,
            checksums: checksums.to_vec(),
        }
    }
}

/// The resolver's decision cache.
#[derive(Debug, Default)]
pub struct ResolverCache {
    entries: HashMap<ResolveKey, (PackageId, RepositoryId)>,
}

impl ResolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ResolveKey) -> Option<(PackageId, RepositoryId)> {
        self.entries.get(key).copied()
    }

    pub fn insert(&mut self, key: ResolveKey, value: (PackageId, RepositoryId)) {
        if self.entries.len() >= DEFAULT_CACHE_CEILING {
            self.entries.clear();
        }
        self.entries.insert(key, value);
    }

    /// Drops every entry computed against a checksum set that is no longer current;
    /// called whenever a repository snapshot is replaced.
    pub fn invalidate_stale(&mut self, current_checksums: &[String]) {
        self.entries.retain(|key, _| key.checksums == current_checksums);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_round_trip() {
        let mut cache = ResolverCache::new();
        let key = ResolveKey::new("app/vim", None, &["stable".to_string()], &["abc".to_string()]);
        cache.insert(key.clone(), (PackageId(1), RepositoryId(0)));
        assert_eq!(cache.get(&key), Some((PackageId(1), RepositoryId(0))));
    }

    #[test]
    fn invalidate_stale_drops_entries_from_old_snapshots() {
        let mut cache = ResolverCache::new();
        let key = ResolveKey::new("app/vim", None, &[], &["old".to_string()]);
        cache.insert(key.clone(), (PackageId(1), RepositoryId(0)));
        cache.invalidate_stale(&["new".to_string()]);
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }
}
