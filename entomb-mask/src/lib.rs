//! The mask engine: layered visibility policy over candidates (`spec.md` §4.3).
//!
//! No direct teacher module grounds this (ALPM has no license/keyword masking); the
//! shape — a small result enum plus a bounded, generation-keyed cache cleared on
//! overflow — follows the cache-size-ceiling rule of `spec.md` §5 and the small
//! result-enum idiom used throughout `alpm-solve`'s `types.rs`.

use std::collections::{HashMap, HashSet};

use entomb_types::{Atom, PackageId, PackageRecord, RepositoryId};

/// The layer that decided a candidate's visibility, or the reason it is completely
/// masked (`spec.md` §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskReason {
    LiveUnmask,
    LiveMask,
    UserMask,
    UserUnmask,
    RepositoryMask,
    LicenseMask,
    SystemKeyword,
    RepositoryKeywordWildcard,
    RepositoryKeywordSpecific,
    UserKeywordFile,
    RepositoryUniversalKeyword,
    RepositoryPerPackageSetting,
    CompletelyMasked,
}

impl MaskReason {
    /// Whether this reason makes the candidate visible.
    pub fn is_visible(self) -> bool {
        !matches!(
            self,
            MaskReason::LiveMask
                | MaskReason::UserMask
                | MaskReason::RepositoryMask
                | MaskReason::LicenseMask
                | MaskReason::CompletelyMasked
        )
    }
}

/// A `(atom, keyword-grant)` override: either a wildcard `*` grant or a specific
/// keyword token.
#[derive(Debug, Clone)]
pub enum KeywordGrant {
    Wildcard,
    Specific(String),
}

/// The full layered masking policy (`spec.md` §4.3), owned by the session.
#[derive(Debug, Default)]
pub struct MaskPolicy {
    pub live_masks: HashSet<PackageId>,
    pub live_unmasks: HashSet<PackageId>,
    pub user_mask_atoms: Vec<Atom>,
    pub user_unmask_atoms: Vec<Atom>,
    pub repository_mask_atoms: HashMap<RepositoryId, Vec<Atom>>,
    pub license_mask: HashSet<String>,
    pub accepted_keywords: HashSet<String>,
    pub repository_keyword_overrides: HashMap<RepositoryId, Vec<(Atom, KeywordGrant)>>,
    pub user_keyword_file_overrides: Vec<(Atom, KeywordGrant)>,
    pub repository_universal_keywords: HashMap<RepositoryId, HashSet<String>>,
    pub repository_per_package_settings: HashMap<RepositoryId, Vec<(Atom, KeywordGrant)>>,
}

/// A bounded, generation-keyed cache of mask verdicts.
#[derive(Debug)]
struct MaskCache {
    generation: u64,
    entries: HashMap<(PackageId, RepositoryId), MaskReason>,
    max_entries: usize,
}

impl MaskCache {
    fn new(max_entries: usize) -> Self {
        MaskCache {
            generation: 0,
            entries: HashMap::new(),
            max_entries,
        }
    }

    fn get(&self, key: &(PackageId, RepositoryId)) -> Option<MaskReason> {
        self.entries.get(key).copied()
    }

    fn insert(&mut self, key: (PackageId, RepositoryId), reason: MaskReason) {
        if self.entries.len() >= self.max_entries {
            self.entries.clear();
        }
        self.entries.insert(key, reason);
    }

    /// Cleared when its size exceeds the threshold, or when a repository snapshot is
    /// replaced (bumping `generation`).
    fn invalidate_for_new_generation(&mut self, generation: u64) {
        if generation != self.generation {
            self.generation = generation;
            self.entries.clear();
        }
    }
}

/// The default cache-size ceiling before a clear-on-overflow (`spec.md` §4.3, §5).
pub const DEFAULT_CACHE_CEILING: usize = 4096;

/// Evaluates candidate visibility under a [`MaskPolicy`], caching verdicts.
#[derive(Debug)]
pub struct MaskEngine {
    policy: MaskPolicy,
    cache: MaskCache,
}

impl MaskEngine {
    pub fn new(policy: MaskPolicy) -> Self {
        MaskEngine {
            policy,
            cache: MaskCache::new(DEFAULT_CACHE_CEILING),
        }
    }

    pub fn policy(&self) -> &MaskPolicy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut MaskPolicy {
        &mut self.policy
    }

    /// Must be called whenever a repository snapshot is replaced; invalidates the
    /// cache for the new `repository_generation`.
    pub fn on_repository_generation(&mut self, repository_generation: u64) {
        self.cache.invalidate_for_new_generation(repository_generation);
    }

    /// Evaluates `(package_id, repository_id)`'s visibility, returning the candidate id
    /// if visible (`spec.md` §4.3: `(visible_id | -1, reason)`).
    pub fn evaluate(&mut self, record: &PackageRecord) -> (Option<PackageId>, MaskReason) {
        let key = (record.package_id, record.repository_id);
        if let Some(reason) = self.cache.get(&key) {
            let id = if reason.is_visible() { Some(record.package_id) } else { None };
            return (id, reason);
        }

        let reason = self.evaluate_uncached(record);
        self.cache.insert(key, reason);
        let id = if reason.is_visible() { Some(record.package_id) } else { None };
        (id, reason)
    }

    fn evaluate_uncached(&self, record: &PackageRecord) -> MaskReason {
        // 1. Live masks/unmasks.
        if self.policy.live_unmasks.contains(&record.package_id) {
            return MaskReason::LiveUnmask;
        }
        if self.policy.live_masks.contains(&record.package_id) {
            return MaskReason::LiveMask;
        }

        // 2. User package.mask.
        if self.policy.user_mask_atoms.iter().any(|a| a.matches(record)) {
            return MaskReason::UserMask;
        }

        // 3. User package.unmask.
        if self.policy.user_unmask_atoms.iter().any(|a| a.matches(record)) {
            return MaskReason::UserUnmask;
        }

        // 4. Repository-side mask.
        if self
            .policy
            .repository_mask_atoms
            .get(&record.repository_id)
            .is_some_and(|atoms| atoms.iter().any(|a| a.matches(record)))
        {
            return MaskReason::RepositoryMask;
        }

        // 5. License mask.
        if record
            .metadata
            .license
            .iter()
            .any(|license| self.policy.license_mask.contains(license))
        {
            return MaskReason::LicenseMask;
        }

        // 6. Keyword policy, in sub-order a..f.
        if record
            .metadata
            .keywords
            .iter()
            .any(|k| self.policy.accepted_keywords.contains(k))
        {
            return MaskReason::SystemKeyword;
        }

        if let Some(overrides) = self.policy.repository_keyword_overrides.get(&record.repository_id) {
            for (atom, grant) in overrides {
                if !atom.matches(record) {
                    continue;
                }
                match grant {
                    KeywordGrant::Wildcard => return MaskReason::RepositoryKeywordWildcard,
                    KeywordGrant::Specific(k) if record.metadata.keywords.contains(k) => {
                        return MaskReason::RepositoryKeywordSpecific;
                    }
                    KeywordGrant::Specific(_) => {}
                }
            }
        }

        if self
            .policy
            .user_keyword_file_overrides
            .iter()
            .any(|(atom, _)| atom.matches(record))
        {
            return MaskReason::UserKeywordFile;
        }

        if self
            .policy
            .repository_universal_keywords
            .get(&record.repository_id)
            .is_some_and(|keywords| record.metadata.keywords.iter().any(|k| keywords.contains(k)))
        {
            return MaskReason::RepositoryUniversalKeyword;
        }

        if let Some(settings) = self.policy.repository_per_package_settings.get(&record.repository_id) {
            if settings.iter().any(|(atom, _)| atom.matches(record)) {
                return MaskReason::RepositoryPerPackageSetting;
            }
        }

        MaskReason::CompletelyMasked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entomb_types::*;
    use std::collections::{BTreeSet, HashSet as StdHashSet};

    fn record(id: u64, keywords: &[&str], license: &[&str]) -> PackageRecord {
        PackageRecord {
            repository_id: RepositoryId(1),
            package_id: PackageId(id),
            scope: Scope {
                key: Key::parse("app/vim").unwrap(),
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
            metadata: BuildMetadata {
                keywords: keywords.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
                license: license.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
                ..Default::default()
            },
            relations: vec![],
            conflicts: vec![],
            provides: vec![],
            needed: vec![],
            provided_sonames: StdHashSet::new(),
            mirrors: vec![],
            content: vec![],
            hooks: Hooks::default(),
        }
    }

    #[test]
    fn system_keyword_makes_candidate_visible() {
        let mut engine = MaskEngine::new(MaskPolicy {
            accepted_keywords: HashSet::from(["stable".to_string()]),
            ..Default::default()
        });
        let (id, reason) = engine.evaluate(&record(1, &["stable"], &[]));
        assert_eq!(id, Some(PackageId(1)));
        assert_eq!(reason, MaskReason::SystemKeyword);
    }

    #[test]
    fn unknown_keyword_is_completely_masked() {
        let mut engine = MaskEngine::new(MaskPolicy::default());
        let (id, reason) = engine.evaluate(&record(1, &["unstable"], &[]));
        assert_eq!(id, None);
        assert_eq!(reason, MaskReason::CompletelyMasked);
    }

    #[test]
    fn license_mask_wins_over_keyword_acceptance() {
        let mut engine = MaskEngine::new(MaskPolicy {
            accepted_keywords: HashSet::from(["stable".to_string()]),
            license_mask: HashSet::from(["GPL".to_string()]),
            ..Default::default()
        });
        let (id, reason) = engine.evaluate(&record(1, &["stable"], &["GPL"]));
        assert_eq!(id, None);
        assert_eq!(reason, MaskReason::LicenseMask);
    }

    #[test]
    fn user_mask_wins_over_repository_unmask_ordering() {
        let atom = match entomb_types::atom::parse("app/vim").unwrap() {
            entomb_types::AtomExpr::Single(a) => a,
            _ => unreachable!(),
        };
        let mut engine = MaskEngine::new(MaskPolicy {
            accepted_keywords: HashSet::from(["stable".to_string()]),
            user_mask_atoms: vec![atom],
            ..Default::default()
        });
        let (id, reason) = engine.evaluate(&record(1, &["stable"], &[]));
        assert_eq!(id, None);
        assert_eq!(reason, MaskReason::UserMask);
    }

    #[test]
    fn live_unmask_wins_over_everything() {
        let atom = match entomb_types::atom::parse("app/vim").unwrap() {
            entomb_types::AtomExpr::Single(a) => a,
            _ => unreachable!(),
        };
        let mut engine = MaskEngine::new(MaskPolicy {
            user_mask_atoms: vec![atom],
            live_unmasks: HashSet::from([PackageId(1)]),
            ..Default::default()
        });
        let (id, reason) = engine.evaluate(&record(1, &["unstable"], &[]));
        assert_eq!(id, Some(PackageId(1)));
        assert_eq!(reason, MaskReason::LiveUnmask);
    }
}
