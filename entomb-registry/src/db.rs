//! The installed registry: schema, back-indices and invariants (`spec.md` §3).
//!
//! Grounded on `alpm-db/src/db/database.rs` (directory-rooted store, lock discipline)
//! and `alpm-db/src/db/entry.rs` (one record per installed package). Persistence uses
//! `bincode` and a write-to-temp-then-rename, matching the cache-manager discipline of
//! `spec.md` §5 ("readers never see a torn blob").

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use entomb_types::{InstalledRecord, Key, PackageId, Slot};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::lock::RegistryLock;

const REGISTRY_FILE_NAME: &str = "registry.bin";

/// The serializable on-disk body of the registry: everything except the lock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryData {
    records: HashMap<PackageId, InstalledRecord>,
    key_slot_index: HashMap<(Key, Slot), PackageId>,
    content_index: HashMap<String, HashSet<PackageId>>,
    needed_index: HashMap<String, HashSet<PackageId>>,
    needed_index_inverse: HashMap<PackageId, HashSet<String>>,
    reverse_dep_index: HashMap<PackageId, HashSet<PackageId>>,
    branch_migration_log: BTreeMap<(String, String), (String, String)>,
    next_id: u64,
    /// Incremented exactly once per committed transaction (`spec.md` §5); in-process
    /// caches keyed on this generation invalidate implicitly when it changes.
    generation: u64,
}

/// A read/write handle over the local installed-packages metadata store.
#[derive(Debug)]
pub struct Registry {
    base_path: PathBuf,
    data: RegistryData,
    _lock: Option<RegistryLock>,
}

/// A report of issues found while checking the registry against `spec.md` §8's
/// quantified invariants; see `SPEC_FULL.md` §2 ("deptest").
#[derive(Debug, Default, Clone)]
pub struct ConsistencyReport {
    pub records_checked: usize,
    pub errors: Vec<String>,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Registry {
    /// Opens (creating if absent) the registry at `base_path` for mutation, acquiring
    /// the exclusive lock described in `spec.md` §5.
    pub fn open_for_write(base_path: &Path) -> Result<Self, Error> {
        let lock = RegistryLock::acquire(base_path)?;
        let data = Self::load_or_default(base_path)?;
        Ok(Registry {
            base_path: base_path.to_path_buf(),
            data,
            _lock: Some(lock),
        })
    }

    /// Opens the registry read-only, without taking the exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Missing`] if the registry has never been created.
    pub fn open_read_only(base_path: &Path) -> Result<Self, Error> {
        let path = base_path.join(REGISTRY_FILE_NAME);
        if !path.exists() {
            return Err(Error::Missing(base_path.to_path_buf()));
        }
        let data = Self::load_or_default(base_path)?;
        Ok(Registry {
            base_path: base_path.to_path_buf(),
            data,
            _lock: None,
        })
    }

    fn load_or_default(base_path: &Path) -> Result<RegistryData, Error> {
        let path = base_path.join(REGISTRY_FILE_NAME);
        if !path.exists() {
            return Ok(RegistryData::default());
        }
        let bytes = fs::read(&path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        bincode::deserialize(&bytes).map_err(|source| Error::Malformed { path, source })
    }

    /// Persists the registry atomically: serialize, write to a temp file, rename over
    /// the live file (`spec.md` §5).
    pub fn persist(&self) -> Result<(), Error> {
        fs::create_dir_all(&self.base_path).map_err(|source| Error::Io {
            path: self.base_path.clone(),
            source,
        })?;
        let bytes = bincode::serialize(&self.data).expect("in-memory registry always serializes");
        let tmp = self.base_path.join(format!("{REGISTRY_FILE_NAME}.tmp"));
        fs::write(&tmp, &bytes).map_err(|source| Error::Io {
            path: tmp.clone(),
            source,
        })?;
        let dest = self.base_path.join(REGISTRY_FILE_NAME);
        fs::rename(&tmp, &dest).map_err(|source| Error::Io { path: dest, source })?;
        Ok(())
    }

    /// The registry's generation counter (`spec.md` §5).
    pub fn generation(&self) -> u64 {
        self.data.generation
    }

    /// Allocates the next installed-record id.
    fn next_id(&mut self) -> PackageId {
        let id = PackageId(self.data.next_id);
        self.data.next_id += 1;
        id
    }

    /// Inserts or replaces a record, applying the `(key, slot)` supersession rule
    /// (`spec.md` §3 invariants): installing a different version with the same
    /// `(key, slot)` supersedes the old record, unless the new record is `injected`.
    ///
    /// Returns the new record's id and the superseded record, if any.
    pub fn insert_or_replace(
        &mut self,
        record: InstalledRecord,
    ) -> Result<(PackageId, Option<(PackageId, InstalledRecord)>), Error> {
        let key_slot = (record.record.scope.key.clone(), record.record.scope.slot.clone());

        let superseded = if record.injected {
            None
        } else if let Some(&old_id) = self.data.key_slot_index.get(&key_slot) {
            Some((old_id, self.remove_internal(old_id)))
        } else {
            None
        };

        let id = self.next_id();
        if !record.injected {
            self.data.key_slot_index.insert(key_slot, id);
        }

        for entry in &record.record.content {
            self.data
                .content_index
                .entry(entry.path.clone())
                .or_default()
                .insert(id);
        }
        for needed in &record.record.needed {
            self.data
                .needed_index
                .entry(needed.soname.clone())
                .or_default()
                .insert(id);
            self.data
                .needed_index_inverse
                .entry(id)
                .or_default()
                .insert(needed.soname.clone());
        }
        // Forward-dependency information lives on the record itself; the reverse index
        // is built by resolving each relation's key against installed records, which is
        // performed by `entomb-solve` at solve time via `record_dependency_edge`. Here
        // we only ensure the id has an (initially empty) reverse-dep entry so
        // `reverse_dep_index` stays total over all installed ids.
        self.data.reverse_dep_index.entry(id).or_default();

        self.data.records.insert(id, record);
        self.data.generation += 1;

        Ok((id, superseded))
    }

    fn remove_internal(&mut self, id: PackageId) -> InstalledRecord {
        let record = self.data.records.remove(&id).expect("id existed");
        let key_slot = (record.record.scope.key.clone(), record.record.scope.slot.clone());
        if self.data.key_slot_index.get(&key_slot) == Some(&id) {
            self.data.key_slot_index.remove(&key_slot);
        }
        for entry in &record.record.content {
            if let Some(owners) = self.data.content_index.get_mut(&entry.path) {
                owners.remove(&id);
                if owners.is_empty() {
                    self.data.content_index.remove(&entry.path);
                }
            }
        }
        for needed in &record.record.needed {
            if let Some(owners) = self.data.needed_index.get_mut(&needed.soname) {
                owners.remove(&id);
                if owners.is_empty() {
                    self.data.needed_index.remove(&needed.soname);
                }
            }
        }
        self.data.needed_index_inverse.remove(&id);
        self.data.reverse_dep_index.remove(&id);
        for deps in self.data.reverse_dep_index.values_mut() {
            deps.remove(&id);
        }
        record
    }

    /// Removes a record entirely (successful removal transaction completion).
    pub fn remove(&mut self, id: PackageId) -> Option<InstalledRecord> {
        if !self.data.records.contains_key(&id) {
            return None;
        }
        let record = self.remove_internal(id);
        self.data.generation += 1;
        Some(record)
    }

    pub fn record(&self, id: PackageId) -> Option<&InstalledRecord> {
        self.data.records.get(&id)
    }

    pub fn by_key_slot(&self, key: &Key, slot: &Slot) -> Option<PackageId> {
        self.data.key_slot_index.get(&(key.clone(), slot.clone())).copied()
    }

    pub fn all_ids(&self) -> Vec<PackageId> {
        self.data.records.keys().copied().collect()
    }

    pub fn content_owners(&self, path: &str) -> HashSet<PackageId> {
        self.data.content_index.get(path).cloned().unwrap_or_default()
    }

    pub fn needed_owners(&self, soname: &str) -> HashSet<PackageId> {
        self.data.needed_index.get(soname).cloned().unwrap_or_default()
    }

    pub fn needed_of(&self, id: PackageId) -> HashSet<String> {
        self.data.needed_index_inverse.get(&id).cloned().unwrap_or_default()
    }

    pub fn reverse_deps(&self, id: PackageId) -> HashSet<PackageId> {
        self.data.reverse_dep_index.get(&id).cloned().unwrap_or_default()
    }

    /// Records that `from` depends on `to`, maintaining `reverse_dep_index[to] ∋ from`.
    /// Called by the forward solver once it has resolved a dependency against the
    /// installed registry.
    pub fn record_dependency_edge(&mut self, from: PackageId, to: PackageId) {
        self.data.reverse_dep_index.entry(to).or_default().insert(from);
    }

    pub fn branch_migration(
        &self,
        from_branch: &str,
        to_branch: &str,
    ) -> Option<&(String, String)> {
        self.data
            .branch_migration_log
            .get(&(from_branch.to_string(), to_branch.to_string()))
    }

    pub fn record_branch_migration(
        &mut self,
        from_branch: String,
        to_branch: String,
        post_migration_hash: String,
        post_upgrade_hash: String,
    ) {
        self.data
            .branch_migration_log
            .insert((from_branch, to_branch), (post_migration_hash, post_upgrade_hash));
    }

    /// Recomputes `content_index`, `needed_index` and `reverse_dep_index` from the
    /// stored per-record content/dependency lists (`spec.md` §3: "may be lazily
    /// recomputed"; supplemented entry point per `SPEC_FULL.md` §2, "registry rescue").
    pub fn rebuild_indices(&mut self) {
        self.data.content_index.clear();
        self.data.needed_index.clear();
        self.data.needed_index_inverse.clear();
        let existing_reverse_deps = std::mem::take(&mut self.data.reverse_dep_index);

        let ids: Vec<PackageId> = self.data.records.keys().copied().collect();
        for id in &ids {
            let record = &self.data.records[id];
            for entry in &record.record.content {
                self.data.content_index.entry(entry.path.clone()).or_default().insert(*id);
            }
            for needed in &record.record.needed {
                self.data.needed_index.entry(needed.soname.clone()).or_default().insert(*id);
                self.data
                    .needed_index_inverse
                    .entry(*id)
                    .or_default()
                    .insert(needed.soname.clone());
            }
        }
        // Reverse-dependency edges cannot be derived from content alone (they require
        // re-resolving each relation string); preserve whatever was already known for
        // ids that still exist, dropping edges that point at now-absent ids.
        for id in &ids {
            let kept: HashSet<PackageId> = existing_reverse_deps
                .get(id)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|dep| self.data.records.contains_key(dep))
                .collect();
            self.data.reverse_dep_index.insert(*id, kept);
        }
    }

    /// Re-validates the `spec.md` §8 quantified invariants against the current
    /// in-memory registry state.
    pub fn check_consistency(&self) -> ConsistencyReport {
        let mut report = ConsistencyReport {
            records_checked: self.data.records.len(),
            ..Default::default()
        };

        // (key, slot) uniqueness.
        let mut seen: HashMap<(Key, Slot), PackageId> = HashMap::new();
        for (id, record) in &self.data.records {
            if record.injected {
                continue;
            }
            let key_slot = (record.record.scope.key.clone(), record.record.scope.slot.clone());
            if let Some(existing) = seen.insert(key_slot.clone(), *id) {
                if existing != *id {
                    report.errors.push(format!(
                        "duplicate (key, slot) {}/{} owned by both {:?} and {:?}",
                        key_slot.0, key_slot.1, existing, id
                    ));
                }
            }
        }

        // content_index owner-count <= 1 per path unless shared ownership is recorded
        // out of band (this core always enforces the strict form).
        for (path, owners) in &self.data.content_index {
            if owners.len() > 1 {
                report
                    .errors
                    .push(format!("path {path} has {} owners, expected at most 1", owners.len()));
            }
            for owner in owners {
                if !self.data.records.contains_key(owner) {
                    report.errors.push(format!("path {path} owned by unknown id {owner:?}"));
                }
            }
        }

        // reverse_dep_index must only reference existing ids.
        for (id, deps) in &self.data.reverse_dep_index {
            if !self.data.records.contains_key(id) {
                report
                    .errors
                    .push(format!("reverse_dep_index has stale key {id:?}"));
            }
            for dep in deps {
                if !self.data.records.contains_key(dep) {
                    report
                        .errors
                        .push(format!("reverse_dep_index[{id:?}] references unknown id {dep:?}"));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entomb_types::*;
    use std::collections::BTreeSet;

    fn make_record(name: &str, slot: &str, version: &str) -> InstalledRecord {
        InstalledRecord {
            record: PackageRecord {
                repository_id: RepositoryId(1),
                package_id: PackageId(0),
                scope: Scope {
                    key: Key::parse(&format!("app/{name}")).unwrap(),
                    version: Version::parse(version).unwrap(),
                    tag: Tag::empty(),
                    slot: Slot(slot.to_string()),
                    revision: Revision::zero(),
                    branch: Branch("stable".to_string()),
                    api: 1,
                },
                artifact: Artifact {
                    download_path: String::new(),
                    size: 0,
                    on_disk_size: 0,
                    digest_md5: String::new(),
                    sig_sha1: None,
                    sig_sha256: None,
                    sig_sha512: None,
                    optional_gpg: None,
                },
                metadata: BuildMetadata::default(),
                relations: vec![],
                conflicts: vec![],
                provides: vec![],
                needed: vec![],
                provided_sonames: Default::default(),
                mirrors: vec![],
                content: vec![ContentEntry {
                    path: format!("/usr/bin/{name}"),
                    kind: ContentKind::File,
                }],
                hooks: Hooks::default(),
            },
            installed_from_repository_id: RepositoryId(1),
            install_source: InstallSource::User,
            automerge_map: BTreeMap::new(),
            injected: false,
            system: false,
            replay: false,
        }
    }

    #[test]
    fn insert_supersedes_same_key_slot() -> testresult::TestResult {
        let dir = tempfile::tempdir()?;
        let mut reg = Registry::open_for_write(dir.path())?;

        let (_id1, superseded1) = reg.insert_or_replace(make_record("b", "0", "1"))?;
        assert!(superseded1.is_none());

        let (id2, superseded2) = reg.insert_or_replace(make_record("b", "0", "2"))?;
        let (_old_id, old_record) = superseded2.expect("supersession expected");
        assert_eq!(old_record.record.scope.version.as_str(), "1");

        let key = Key::parse("app/b")?;
        let slot = Slot("0".to_string());
        assert_eq!(reg.by_key_slot(&key, &slot), Some(id2));
        assert_eq!(reg.all_ids().len(), 1);
        Ok(())
    }

    #[test]
    fn persist_and_reload_round_trips() -> testresult::TestResult {
        let dir = tempfile::tempdir()?;
        {
            let mut reg = Registry::open_for_write(dir.path())?;
            reg.insert_or_replace(make_record("c", "0", "1"))?;
            reg.persist()?;
        }
        let reg = Registry::open_read_only(dir.path())?;
        assert_eq!(reg.all_ids().len(), 1);
        Ok(())
    }

    #[test]
    fn remove_clears_content_index_ownership() -> testresult::TestResult {
        let dir = tempfile::tempdir()?;
        let mut reg = Registry::open_for_write(dir.path())?;
        let (id, _) = reg.insert_or_replace(make_record("d", "0", "1"))?;
        assert!(!reg.content_owners("/usr/bin/d").is_empty());
        reg.remove(id);
        assert!(reg.content_owners("/usr/bin/d").is_empty());
        Ok(())
    }

    #[test]
    fn check_consistency_is_clean_on_a_healthy_registry() -> testresult::TestResult {
        let dir = tempfile::tempdir()?;
        let mut reg = Registry::open_for_write(dir.path())?;
        reg.insert_or_replace(make_record("e", "0", "1"))?;
        let report = reg.check_consistency();
        assert!(report.is_clean(), "{:?}", report.errors);
        Ok(())
    }
}
