//! Read-only repository index reader (`spec.md` §4.2).
//!
//! Pure functional over a loaded snapshot; grounded on `alpm-repo-db`'s read-only
//! database handle and `alpm-db`'s lock-on-open idiom (here omitted, since §4.2 declares
//! the reader read-only and safely shared between concurrent opens).

use std::collections::HashMap;

use entomb_types::{Key, PackageId, PackageRecord, Slot};

/// One repository's loaded metadata snapshot plus the secondary indices the reader's
/// queries need.
#[derive(Debug, Clone, Default)]
pub struct RepositoryIndex {
    /// Monotonic revision number of the snapshot.
    revision: u64,
    /// Opaque checksum of the snapshot, used to key caches.
    checksum: String,
    records: HashMap<PackageId, PackageRecord>,
    by_key: HashMap<Key, Vec<PackageId>>,
    by_key_slot: HashMap<(Key, Slot), PackageId>,
    by_soname: HashMap<String, Vec<PackageId>>,
    by_content_path: HashMap<String, Vec<PackageId>>,
    by_provide: HashMap<String, Vec<PackageId>>,
    by_set: HashMap<String, Vec<PackageId>>,
}

impl RepositoryIndex {
    /// Builds a [`RepositoryIndex`] from a flat list of records plus named package sets
    /// (e.g. `@world`, `@system`), indexing every query surface up front.
    pub fn build(
        revision: u64,
        checksum: String,
        records: Vec<PackageRecord>,
        sets: HashMap<String, Vec<PackageId>>,
    ) -> Self {
        let mut idx = RepositoryIndex {
            revision,
            checksum,
            by_set: sets,
            ..Default::default()
        };

        for record in records {
            let id = record.package_id;
            idx.by_key.entry(record.scope.key.clone()).or_default().push(id);
            idx.by_key_slot
                .insert((record.scope.key.clone(), record.scope.slot.clone()), id);

            for needed in &record.needed {
                idx.by_soname.entry(needed.soname.clone()).or_default().push(id);
            }
            for provided in &record.provided_sonames {
                idx.by_soname.entry(provided.clone()).or_default().push(id);
            }
            for entry in &record.content {
                idx.by_content_path
                    .entry(entry.path.clone())
                    .or_default()
                    .push(id);
            }
            for provide in &record.provides {
                idx.by_provide.entry(provide.name.clone()).or_default().push(id);
            }

            idx.records.insert(id, record);
        }

        idx
    }

    /// The snapshot's monotonic revision.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The snapshot's opaque content checksum, used to key persistent caches.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Retrieves any field on a package record by id.
    pub fn record(&self, id: PackageId) -> Option<&PackageRecord> {
        self.records.get(&id)
    }

    /// All ids for a given `category/name`.
    pub fn by_key(&self, key: &Key) -> &[PackageId] {
        self.by_key.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The single id for a given `(key, slot)`, if present.
    pub fn by_key_slot(&self, key: &Key, slot: &Slot) -> Option<PackageId> {
        self.by_key_slot.get(&(key.clone(), slot.clone())).copied()
    }

    /// Ids of packages listing or providing `soname`, optionally with `LIKE`-style
    /// substring matching.
    pub fn by_soname(&self, soname: &str, like: bool) -> Vec<PackageId> {
        if like {
            self.by_soname
                .iter()
                .filter(|(k, _)| k.contains(soname))
                .flat_map(|(_, v)| v.iter().copied())
                .collect()
        } else {
            self.by_soname.get(soname).cloned().unwrap_or_default()
        }
    }

    /// Owners of a content path.
    pub fn by_content_path(&self, path: &str) -> &[PackageId] {
        self.by_content_path
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Dependency-substring search: ids of packages whose relation strings contain
    /// `needle` ("who needs X").
    pub fn by_dependency_substring(&self, needle: &str) -> Vec<PackageId> {
        self.records
            .values()
            .filter(|record| record.relations.iter().any(|r| r.atom.contains(needle)))
            .map(|record| record.package_id)
            .collect()
    }

    /// Members providing `name` under a `PROVIDE` alias; `default_only` restricts to
    /// members flagged as the default provider of a legacy virtual.
    pub fn by_provide(&self, name: &str, default_only: bool) -> Vec<PackageId> {
        let Some(ids) = self.by_provide.get(name) else {
            return Vec::new();
        };
        if !default_only {
            return ids.clone();
        }
        ids.iter()
            .copied()
            .filter(|id| {
                self.records
                    .get(id)
                    .is_some_and(|r| r.provides.iter().any(|p| p.name == name && p.is_default))
            })
            .collect()
    }

    /// Members of a named set (e.g. `@world`).
    pub fn by_set(&self, name: &str) -> &[PackageId] {
        self.by_set.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterates every record in the snapshot.
    pub fn iter(&self) -> impl Iterator<Item = &PackageRecord> {
        self.records.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entomb_types::*;
    use std::collections::HashSet;

    fn record(id: u64, name: &str, soname: &str) -> PackageRecord {
        PackageRecord {
            repository_id: RepositoryId(1),
            package_id: PackageId(id),
            scope: Scope {
                key: Key::parse(&format!("app/{name}")).unwrap(),
                version: Version::parse("1.0").unwrap(),
                tag: Tag::empty(),
                slot: Slot::default_slot(),
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
            needed: vec![Needed {
                soname: soname.to_string(),
                class: ElfClass::Elf64,
            }],
            provided_sonames: HashSet::new(),
            mirrors: vec![],
            content: vec![ContentEntry {
                path: format!("/usr/bin/{name}"),
                kind: ContentKind::File,
            }],
            hooks: Hooks::default(),
        }
    }

    #[test]
    fn queries_by_key_and_soname_and_content() {
        let idx = RepositoryIndex::build(
            1,
            "deadbeef".to_string(),
            vec![record(1, "vim", "libz.so.1"), record(2, "nano", "libz.so.1")],
            HashMap::new(),
        );

        assert_eq!(idx.by_key(&Key::parse("app/vim").unwrap()), &[PackageId(1)]);
        let mut sonames = idx.by_soname("libz.so.1", false);
        sonames.sort();
        assert_eq!(sonames, vec![PackageId(1), PackageId(2)]);
        assert_eq!(idx.by_content_path("/usr/bin/vim"), &[PackageId(1)]);
        assert_eq!(idx.checksum(), "deadbeef");
    }

    #[test]
    fn unknown_key_yields_empty_slice() {
        let idx = RepositoryIndex::build(1, "x".to_string(), vec![], HashMap::new());
        assert!(idx.by_key(&Key::parse("app/missing").unwrap()).is_empty());
    }
}
