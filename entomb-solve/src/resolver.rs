//! The atom resolver (`spec.md` §4.4): picks the single best visible candidate for an
//! atom across every configured repository.
//!
//! Grounded on `alpm-solve/src/types.rs`'s candidate-selection shape, generalized from
//! ALPM's single-database "newest wins" rule to the spec's four-step tie-break lattice
//! over repository-ordered candidate sets.

use entomb_mask::MaskEngine;
use entomb_repo::RepositoryIndex;
use entomb_types::{Atom, AtomExpr, PackageId, PackageRecord, RepositoryId, Slot};

use crate::cache::{ResolveKey, ResolverCache};
use crate::error::ResolveError;

/// One configured repository in resolution (configuration) order: earlier entries have
/// higher tie-break priority (`spec.md` §4.4 step 4d).
pub struct AtomResolver<'r> {
    repositories: Vec<(RepositoryId, &'r RepositoryIndex)>,
}

impl<'r> AtomResolver<'r> {
    pub fn new(repositories: Vec<(RepositoryId, &'r RepositoryIndex)>) -> Self {
        AtomResolver { repositories }
    }

    fn checksums(&self) -> Vec<String> {
        self.repositories.iter().map(|(_, idx)| idx.checksum().to_string()).collect()
    }

    fn priority_of(&self, repository_id: RepositoryId) -> usize {
        self.repositories
            .iter()
            .position(|(id, _)| *id == repository_id)
            .unwrap_or(usize::MAX)
    }

    /// Resolves `atom_text` (possibly an `"or"`-group) under the current mask policy,
    /// consulting and updating `cache`.
    pub fn resolve(
        &self,
        atom_text: &str,
        mask: &mut MaskEngine,
        cache: &mut ResolverCache,
        slot_override: Option<&str>,
        branches: &[String],
    ) -> Result<(PackageId, RepositoryId), ResolveError> {
        let expr = entomb_types::atom::parse(atom_text)
            .map_err(|_| ResolveError::InvalidAtom(atom_text.to_string()))?;

        match expr {
            AtomExpr::Single(atom) => {
                self.resolve_one(&atom, atom_text, mask, cache, slot_override, branches)
            }
            AtomExpr::Or(atoms) => {
                // "Or"-groups resolve to the first sub-atom whose resolution succeeds.
                for (index, atom) in atoms.iter().enumerate() {
                    let sub_text = format!("{atom_text}#or{index}");
                    if let Ok(resolved) =
                        self.resolve_one(atom, &sub_text, mask, cache, slot_override, branches)
                    {
                        return Ok(resolved);
                    }
                }
                Err(ResolveError::NotFound(atom_text.to_string()))
            }
        }
    }

    fn resolve_one(
        &self,
        atom: &Atom,
        cache_text: &str,
        mask: &mut MaskEngine,
        cache: &mut ResolverCache,
        slot_override: Option<&str>,
        branches: &[String],
    ) -> Result<(PackageId, RepositoryId), ResolveError> {
        let checksums = self.checksums();
        let key = ResolveKey::new(cache_text, slot_override, branches, &checksums);
        if let Some(cached) = cache.get(&key) {
            return Ok(cached);
        }

        let mut atom = atom.clone();
        if let Some(slot) = slot_override {
            atom.slot = Some(Slot(slot.to_string()));
        }

        let mut per_repository_best: Vec<(RepositoryId, &PackageRecord)> = Vec::new();
        for (repository_id, index) in &self.repositories {
            let mut matches: Vec<&PackageRecord> = Vec::new();
            for id in index.by_key(&atom.key) {
                let Some(record) = index.record(*id) else {
                    continue;
                };
                if !branches.is_empty() && !branches.contains(&record.scope.branch.0) {
                    continue;
                }
                if !atom.matches(record) {
                    continue;
                }
                let (visible, _reason) = mask.evaluate(record);
                if visible.is_none() {
                    continue;
                }
                matches.push(record);
            }
            if let Some(record) = Self::select_best(matches) {
                per_repository_best.push((*repository_id, record));
            }
        }

        let winner = self
            .break_tie(per_repository_best)
            .ok_or_else(|| ResolveError::NotFound(cache_text.to_string()))?;

        let result = (winner.1.package_id, winner.0);
        cache.insert(key, result);
        Ok(result)
    }

    /// Applies `spec.md` §4.4 step 4's a..c criteria (version, tag, revision) to pick the
    /// single best candidate within one repository. Shared with `break_tie` below so a
    /// repository's own local winner and the cross-repository tie-break agree on what
    /// "best" means.
    fn select_best(mut candidates: Vec<&PackageRecord>) -> Option<&PackageRecord> {
        if candidates.len() <= 1 {
            return candidates.pop();
        }

        // a. maximum version.
        let max_version = candidates.iter().map(|r| r.scope.version.clone()).max()?;
        candidates.retain(|r| r.scope.version == max_version);

        // b. maximum tag: the untagged build is the default/official one and wins
        // outright when present (`entomb_types::Tag`'s empty-sorts-lowest `Ord` is for
        // generic comparison, not this step); only among exclusively tagged candidates
        // does the lexicographically greatest tag win.
        if candidates.len() > 1 {
            if candidates.iter().any(|r| r.scope.tag.is_empty()) {
                candidates.retain(|r| r.scope.tag.is_empty());
            } else {
                let max_tag = candidates.iter().map(|r| r.scope.tag.clone()).max()?;
                candidates.retain(|r| r.scope.tag == max_tag);
            }
        }

        // c. maximum revision.
        if candidates.len() > 1 {
            let max_revision = candidates.iter().map(|r| r.scope.revision).max()?;
            candidates.retain(|r| r.scope.revision == max_revision);
        }

        candidates.into_iter().next()
    }

    /// Applies `spec.md` §4.4 step 4's a..d tie-break lattice across repositories;
    /// `None` iff there were no candidates to begin with.
    fn break_tie<'a>(
        &self,
        candidates: Vec<(RepositoryId, &'a PackageRecord)>,
    ) -> Option<(RepositoryId, &'a PackageRecord)> {
        if candidates.len() <= 1 {
            return candidates.into_iter().next();
        }

        let records: Vec<&PackageRecord> = candidates.iter().map(|(_, r)| *r).collect();
        let best = Self::select_best(records)?;

        // d. among repositories whose local winner tied on a..c, highest configured
        // repository priority wins (first listed wins).
        candidates
            .into_iter()
            .filter(|(_, r)| r.package_id == best.package_id && r.scope == best.scope)
            .min_by_key(|(repository_id, _)| self.priority_of(*repository_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entomb_mask::MaskPolicy;
    use entomb_types::*;
    use std::collections::{BTreeSet, HashMap, HashSet};

    fn record(id: u64, repo: u32, version: &str) -> PackageRecord {
        PackageRecord {
            repository_id: RepositoryId(repo),
            package_id: PackageId(id),
            scope: Scope {
                key: Key::parse("app-editors/vim").unwrap(),
                version: Version::parse(version).unwrap(),
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
            metadata: BuildMetadata {
                keywords: BTreeSet::from(["stable".to_string()]),
                ..Default::default()
            },
            relations: vec![],
            conflicts: vec![],
            provides: vec![],
            needed: vec![],
            provided_sonames: HashSet::new(),
            mirrors: vec![],
            content: vec![],
            hooks: Hooks::default(),
        }
    }

    fn mask_engine_with_stable_accepted() -> MaskEngine {
        MaskEngine::new(MaskPolicy {
            accepted_keywords: HashSet::from(["stable".to_string()]),
            ..Default::default()
        })
    }

    #[test]
    fn resolves_the_single_contributing_repository() {
        let idx = RepositoryIndex::build(1, "a".to_string(), vec![record(1, 0, "8.2")], HashMap::new());
        let resolver = AtomResolver::new(vec![(RepositoryId(0), &idx)]);
        let mut mask = mask_engine_with_stable_accepted();
        let mut cache = ResolverCache::new();

        let (id, repo) = resolver
            .resolve("app-editors/vim", &mut mask, &mut cache, None, &[])
            .unwrap();
        assert_eq!(id, PackageId(1));
        assert_eq!(repo, RepositoryId(0));
    }

    #[test]
    fn tie_break_prefers_maximum_version_then_repository_order() {
        let idx_a = RepositoryIndex::build(1, "a".to_string(), vec![record(1, 0, "8.2")], HashMap::new());
        let idx_b = RepositoryIndex::build(1, "b".to_string(), vec![record(2, 1, "8.2")], HashMap::new());
        let resolver = AtomResolver::new(vec![(RepositoryId(0), &idx_a), (RepositoryId(1), &idx_b)]);
        let mut mask = mask_engine_with_stable_accepted();
        let mut cache = ResolverCache::new();

        let (id, repo) = resolver
            .resolve("app-editors/vim", &mut mask, &mut cache, None, &[])
            .unwrap();
        // Equal versions; repository 0 was listed first and wins the priority tie-break.
        assert_eq!(id, PackageId(1));
        assert_eq!(repo, RepositoryId(0));
    }

    #[test]
    fn higher_version_in_lower_priority_repository_still_wins() {
        let idx_a = RepositoryIndex::build(1, "a".to_string(), vec![record(1, 0, "8.0")], HashMap::new());
        let idx_b = RepositoryIndex::build(1, "b".to_string(), vec![record(2, 1, "8.2")], HashMap::new());
        let resolver = AtomResolver::new(vec![(RepositoryId(0), &idx_a), (RepositoryId(1), &idx_b)]);
        let mut mask = mask_engine_with_stable_accepted();
        let mut cache = ResolverCache::new();

        let (id, _repo) = resolver
            .resolve("app-editors/vim", &mut mask, &mut cache, None, &[])
            .unwrap();
        assert_eq!(id, PackageId(2));
    }

    #[test]
    fn untagged_candidate_wins_over_a_tagged_one_in_the_same_repository() {
        let mut tagged = record(2, 0, "1.2");
        tagged.scope.tag = Tag("k".to_string());
        let idx = RepositoryIndex::build(1, "a".to_string(), vec![record(1, 0, "1.2"), tagged], HashMap::new());
        let resolver = AtomResolver::new(vec![(RepositoryId(0), &idx)]);
        let mut mask = mask_engine_with_stable_accepted();
        let mut cache = ResolverCache::new();

        let (id, _repo) = resolver
            .resolve("app-editors/vim", &mut mask, &mut cache, None, &[])
            .unwrap();
        assert_eq!(id, PackageId(1));
    }

    #[test]
    fn masked_out_candidate_is_not_found() {
        let idx = RepositoryIndex::build(1, "a".to_string(), vec![record(1, 0, "8.2")], HashMap::new());
        let resolver = AtomResolver::new(vec![(RepositoryId(0), &idx)]);
        let mut mask = MaskEngine::new(MaskPolicy::default());
        let mut cache = ResolverCache::new();

        let result = resolver.resolve("app-editors/vim", &mut mask, &mut cache, None, &[]);
        assert!(result.is_err());
    }
}
