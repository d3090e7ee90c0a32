//! The forward dependency solver (`spec.md` §4.5): expands a set of resolved roots into
//! a depth-ordered install plan plus a conflicts accumulator.
//!
//! Grounded on `alpm-solve`'s worklist-based transaction builder, replacing its
//! delegation to the external `resolvo` SAT solver (see `DESIGN.md`) with the spec's
//! explicit LIFO worklist and library-breakage escalation.

use std::collections::{BTreeMap, HashSet};

use entomb_mask::MaskEngine;
use entomb_registry::Registry;
use entomb_repo::RepositoryIndex;
use entomb_types::{Atom, AtomExpr, DependencyKind, InstalledRecord, Key, PackageId, PackageRecord, RepositoryId};

use crate::cache::ResolverCache;
use crate::resolver::AtomResolver;

/// Forward-solve options (`spec.md` §4.5).
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardOptions {
    /// Treat every dependency as unsatisfied, ignoring what is already installed.
    pub empty_deps: bool,
    /// Re-visit an already-installed dependency when its installed version disagrees
    /// with the repository's current best candidate.
    pub deep_deps: bool,
    /// Shares the `tree_cache` visited-atom set across every root of this invocation
    /// instead of resetting it per root, so a dependency already visited under an
    /// earlier root is skipped under a later one too. `tree_cache` itself always
    /// dedupes within a single root regardless of this flag; `match_cache` (the
    /// resolved-atom memo) is always shared, since its result never depends on root.
    pub use_filter: bool,
}

/// The depth-ordered result of a successful forward solve; higher depth installs
/// first. Conflicts are the installed ids slated for removal.
#[derive(Debug, Default, Clone)]
pub struct ForwardPlan {
    pub depths: BTreeMap<u32, Vec<(PackageId, RepositoryId)>>,
    pub conflicts: Vec<PackageId>,
}

/// One node of a [`DependencyGraph`]: a planned package plus the other planned
/// packages its runtime relations point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub package_id: PackageId,
    pub repository_id: RepositoryId,
    pub depends_on: Vec<PackageId>,
}

/// A [`ForwardPlan`] rendered as a plain adjacency list, depth by depth, for display or
/// export (`spec.md` §2 supplemented feature, grounded on `eit/commands/graph.py`).
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub depths: BTreeMap<u32, Vec<GraphNode>>,
}

/// The forward solver's outcome: either a depth-ordered plan, or — per `spec.md`
/// §4.5 — a flat list plus the atoms that could not be resolved at all.
#[derive(Debug, Clone)]
pub enum ForwardOutcome {
    Resolved(ForwardPlan),
    MissingDependencies {
        flat_list: Vec<(PackageId, RepositoryId)>,
        not_found: Vec<String>,
    },
}

pub struct ForwardSolver<'a, 'r> {
    resolver: &'a AtomResolver<'r>,
    repositories: &'a [(RepositoryId, &'r RepositoryIndex)],
    registry: &'a Registry,
    mask: &'a mut MaskEngine,
    resolver_cache: &'a mut ResolverCache,
}

impl<'a, 'r> ForwardSolver<'a, 'r> {
    pub fn new(
        resolver: &'a AtomResolver<'r>,
        repositories: &'a [(RepositoryId, &'r RepositoryIndex)],
        registry: &'a Registry,
        mask: &'a mut MaskEngine,
        resolver_cache: &'a mut ResolverCache,
    ) -> Self {
        ForwardSolver {
            resolver,
            repositories,
            registry,
            mask,
            resolver_cache,
        }
    }

    fn find_record(&self, resolved: (PackageId, RepositoryId)) -> Option<&'r PackageRecord> {
        self.repositories
            .iter()
            .find(|(id, _)| *id == resolved.1)
            .map(|(_, idx)| *idx)
            .and_then(|idx: &'r RepositoryIndex| idx.record(resolved.0))
    }

    fn installed_matches(&self, atom: &Atom) -> Option<PackageId> {
        self.registry
            .all_ids()
            .into_iter()
            .find(|id| self.registry.record(*id).is_some_and(|r| atom.matches(&r.record)))
    }

    /// Runs the solver over every root, concatenating each root's depths after the
    /// previous root's maximum depth and unioning conflicts at the shared accumulator.
    pub fn solve(&mut self, roots: Vec<(PackageId, RepositoryId)>, options: ForwardOptions) -> ForwardOutcome {
        let mut depths: BTreeMap<u32, Vec<(PackageId, RepositoryId)>> = BTreeMap::new();
        let mut conflicts: Vec<PackageId> = Vec::new();
        let mut not_found: Vec<String> = Vec::new();
        let mut tree_cache: HashSet<String> = HashSet::new();
        let mut match_cache: std::collections::HashMap<String, (PackageId, RepositoryId)> =
            std::collections::HashMap::new();

        let mut depth_offset = 0u32;
        for root in roots {
            // `tree_cache` dedup is the per-invocation termination guard (`spec.md`
            // §4.5, unconditional); `use_filter` only controls whether it is shared
            // across roots or reset per root.
            if !options.use_filter {
                tree_cache.clear();
            }

            let root_depth = depth_offset + 1;
            depths.entry(root_depth).or_default().push(root);
            let mut max_depth = root_depth;

            let mut worklist: Vec<(u32, String)> = Vec::new();
            self.escalate_if_root_upgrade(root, root_depth, &mut worklist);
            self.enqueue_dependencies(root, root_depth, &options, &mut worklist);

            while let Some((depth, atom_text)) = worklist.pop() {
                if !tree_cache.insert(atom_text.clone()) {
                    continue;
                }

                let Ok(expr) = entomb_types::atom::parse(&atom_text) else {
                    not_found.push(atom_text);
                    continue;
                };

                if let AtomExpr::Single(atom) = &expr {
                    if atom.conflict {
                        if let Some(installed_id) = self.installed_matches(atom) {
                            conflicts.push(installed_id);
                        }
                        continue;
                    }
                }

                let resolved = match match_cache.get(&atom_text) {
                    Some(r) => Some(*r),
                    None => {
                        match self
                            .resolver
                            .resolve(&atom_text, self.mask, self.resolver_cache, None, &[])
                        {
                            Ok(r) => {
                                match_cache.insert(atom_text.clone(), r);
                                Some(r)
                            }
                            Err(_) => None,
                        }
                    }
                };

                let Some(resolved) = resolved else {
                    not_found.push(atom_text);
                    continue;
                };

                depths.entry(depth).or_default().push(resolved);
                max_depth = max_depth.max(depth);
                self.enqueue_dependencies(resolved, depth + 1, &options, &mut worklist);
            }

            depth_offset = max_depth;
        }

        if !not_found.is_empty() {
            let flat_list: Vec<(PackageId, RepositoryId)> = depths.into_values().flatten().collect();
            return ForwardOutcome::MissingDependencies { flat_list, not_found };
        }

        ForwardOutcome::Resolved(ForwardPlan { depths, conflicts })
    }

    fn enqueue_dependencies(
        &mut self,
        resolved: (PackageId, RepositoryId),
        depth: u32,
        options: &ForwardOptions,
        worklist: &mut Vec<(u32, String)>,
    ) {
        let Some(record) = self.find_record(resolved) else {
            return;
        };

        let runtime_atoms: Vec<String> = record
            .relations
            .iter()
            .filter(|r| matches!(r.kind, DependencyKind::Runtime | DependencyKind::Manual))
            .map(|r| r.atom.clone())
            .collect();
        let conflict_atoms: Vec<String> = record.conflicts.iter().map(|c| format!("!{c}")).collect();

        // Conflict members are always pushed; detection happens when popped.
        for atom_text in conflict_atoms {
            worklist.push((depth, atom_text));
        }

        for atom_text in runtime_atoms {
            if self.dependency_needs_visit(&atom_text, options, depth, worklist) {
                worklist.push((depth, atom_text));
            }
        }
    }

    /// The installed-vs-repository filter: `true` if the dependency is unsatisfied (or
    /// `empty_deps` forces every dependency to be treated as such).
    fn dependency_needs_visit(
        &mut self,
        atom_text: &str,
        options: &ForwardOptions,
        depth: u32,
        worklist: &mut Vec<(u32, String)>,
    ) -> bool {
        if options.empty_deps {
            return true;
        }

        let Ok(expr) = entomb_types::atom::parse(atom_text) else {
            return true;
        };
        let atom = match &expr {
            AtomExpr::Single(atom) => atom,
            AtomExpr::Or(atoms) => match atoms.first() {
                Some(atom) => atom,
                None => return true,
            },
        };

        let Some(installed_id) = self.installed_matches(atom) else {
            return true;
        };

        if !options.deep_deps {
            return false;
        }

        let Ok(candidate) = self
            .resolver
            .resolve(atom_text, self.mask, self.resolver_cache, None, &[])
        else {
            return false;
        };
        let Some(installed_record) = self.registry.record(installed_id).cloned() else {
            return false;
        };
        let Some(candidate_record) = self.find_record(candidate) else {
            return false;
        };

        let changed = installed_record.record.compare_tuple() != candidate_record.compare_tuple();
        if changed {
            self.escalate_library_breakage(&installed_record, candidate_record, depth, worklist);
        }
        changed
    }

    /// Runs the same library-breakage comparator a dependency visit would, but for a
    /// root itself: an explicitly requested root (e.g. "install lib/z") bypasses the
    /// installed-vs-repository filter since it is always pulled in regardless, but a
    /// root that upgrades an already-installed package can still break that package's
    /// consumers and must escalate them exactly as a dependency visit would.
    fn escalate_if_root_upgrade(&mut self, root: (PackageId, RepositoryId), depth: u32, worklist: &mut Vec<(u32, String)>) {
        let Some(candidate_record) = self.find_record(root) else {
            return;
        };
        let key = candidate_record.scope.key.clone();
        let slot = candidate_record.scope.slot.clone();
        let atom_text = format!("{key}:{slot}");
        let Some(installed_id) = self.installed_matches(&match entomb_types::atom::parse(&atom_text) {
            Ok(AtomExpr::Single(atom)) => atom,
            _ => return,
        }) else {
            return;
        };
        let Some(installed_record) = self.registry.record(installed_id).cloned() else {
            return;
        };

        if installed_record.record.compare_tuple() != candidate_record.compare_tuple() {
            self.escalate_library_breakage(&installed_record, candidate_record, depth, worklist);
        }
    }

    /// "Library-breakage" escalation (`spec.md` §4.5): when the repository candidate
    /// no longer provides a SONAME the installed version did (a soname bump), re-enqueue
    /// whichever installed packages still need that SONAME so they get rebuilt.
    fn escalate_library_breakage(
        &self,
        installed: &InstalledRecord,
        candidate: &PackageRecord,
        depth: u32,
        worklist: &mut Vec<(u32, String)>,
    ) {
        let candidate_sonames: HashSet<&str> =
            candidate.provided_sonames.iter().map(|s| s.as_str()).collect();

        for soname in &installed.record.provided_sonames {
            if candidate_sonames.contains(soname.as_str()) {
                continue;
            }
            for owner_id in self.registry.needed_owners(soname) {
                let Some(owner) = self.registry.record(owner_id) else {
                    continue;
                };
                let atom_text = format!("{}:{}", owner.record.scope.key, owner.record.scope.slot);
                worklist.push((depth, atom_text));
            }
        }
    }

    /// Renders an already-resolved [`ForwardPlan`] as a plain adjacency list: for each
    /// planned package, which other planned packages its runtime relations point at.
    /// Read-only introspection over the plan's own depth map, not a new solve.
    pub fn plan_to_graph(&self, plan: &ForwardPlan) -> DependencyGraph {
        let by_key: std::collections::HashMap<&Key, PackageId> = plan
            .depths
            .values()
            .flatten()
            .filter_map(|&resolved| self.find_record(resolved).map(|r| (&r.scope.key, resolved.0)))
            .collect();

        let mut depths: BTreeMap<u32, Vec<GraphNode>> = BTreeMap::new();
        for (&depth, entries) in &plan.depths {
            let mut nodes = Vec::with_capacity(entries.len());
            for &(package_id, repository_id) in entries {
                let depends_on = self
                    .find_record((package_id, repository_id))
                    .map(|record| {
                        record
                            .relations
                            .iter()
                            .filter(|r| matches!(r.kind, DependencyKind::Runtime | DependencyKind::Manual))
                            .filter_map(|r| {
                                let expr = entomb_types::atom::parse(&r.atom).ok()?;
                                let atom = match expr {
                                    AtomExpr::Single(atom) => atom,
                                    AtomExpr::Or(atoms) => atoms.into_iter().next()?,
                                };
                                by_key.get(&atom.key).copied()
                            })
                            .filter(|&dep| dep != package_id)
                            .collect()
                    })
                    .unwrap_or_default();
                nodes.push(GraphNode { package_id, repository_id, depends_on });
            }
            depths.insert(depth, nodes);
        }

        DependencyGraph { depths }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entomb_mask::MaskPolicy;
    use entomb_types::*;
    use std::collections::{BTreeSet, HashMap, HashSet as StdHashSet};

    fn record(id: u64, key: &str, version: &str, relations: Vec<Relation>) -> PackageRecord {
        PackageRecord {
            repository_id: RepositoryId(0),
            package_id: PackageId(id),
            scope: Scope {
                key: Key::parse(key).unwrap(),
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
            relations,
            conflicts: vec![],
            provides: vec![],
            needed: vec![],
            provided_sonames: StdHashSet::new(),
            mirrors: vec![],
            content: vec![],
            hooks: Hooks::default(),
        }
    }

    fn empty_registry(dir: &std::path::Path) -> Registry {
        Registry::open_for_write(dir).unwrap()
    }

    #[test]
    fn solves_a_linear_dependency_chain() {
        let dir = tempfile::tempdir().unwrap();
        let registry = empty_registry(dir.path());

        let leaf = record(2, "app/leaf", "1.0", vec![]);
        let root = record(
            1,
            "app/root",
            "1.0",
            vec![Relation {
                atom: "app/leaf".to_string(),
                kind: DependencyKind::Runtime,
            }],
        );
        let idx = RepositoryIndex::build(1, "a".to_string(), vec![root, leaf], HashMap::new());
        let repos: Vec<(RepositoryId, &RepositoryIndex)> = vec![(RepositoryId(0), &idx)];
        let resolver = AtomResolver::new(repos.clone());
        let mut mask = MaskEngine::new(MaskPolicy {
            accepted_keywords: StdHashSet::from(["stable".to_string()]),
            ..Default::default()
        });
        let mut cache = ResolverCache::new();
        let mut solver = ForwardSolver::new(&resolver, &repos, &registry, &mut mask, &mut cache);

        let outcome = solver.solve(vec![(PackageId(1), RepositoryId(0))], ForwardOptions::default());
        let ForwardOutcome::Resolved(plan) = outcome else {
            panic!("expected a resolved plan")
        };
        assert!(plan.depths.get(&1).unwrap().contains(&(PackageId(1), RepositoryId(0))));
        assert!(plan.depths.get(&2).unwrap().contains(&(PackageId(2), RepositoryId(0))));
    }

    #[test]
    fn reports_missing_dependencies_as_a_flat_list() {
        let dir = tempfile::tempdir().unwrap();
        let registry = empty_registry(dir.path());

        let root = record(
            1,
            "app/root",
            "1.0",
            vec![Relation {
                atom: "app/missing".to_string(),
                kind: DependencyKind::Runtime,
            }],
        );
        let idx = RepositoryIndex::build(1, "a".to_string(), vec![root], HashMap::new());
        let repos: Vec<(RepositoryId, &RepositoryIndex)> = vec![(RepositoryId(0), &idx)];
        let resolver = AtomResolver::new(repos.clone());
        let mut mask = MaskEngine::new(MaskPolicy {
            accepted_keywords: StdHashSet::from(["stable".to_string()]),
            ..Default::default()
        });
        let mut cache = ResolverCache::new();
        let mut solver = ForwardSolver::new(&resolver, &repos, &registry, &mut mask, &mut cache);

        let outcome = solver.solve(vec![(PackageId(1), RepositoryId(0))], ForwardOptions::default());
        let ForwardOutcome::MissingDependencies { not_found, .. } = outcome else {
            panic!("expected missing dependencies")
        };
        assert_eq!(not_found, vec!["app/missing".to_string()]);
    }

    #[test]
    fn empty_deps_skips_the_installed_filter() {
        // With no repositories behind it, the forced "app/installed" atom will fail to
        // resolve regardless of whether it's already installed, confirming the flag was
        // honored (the atom was visited rather than silently filtered).
        let dir = tempfile::tempdir().unwrap();
        let registry = empty_registry(dir.path());
        let root = record(
            1,
            "app/root",
            "1.0",
            vec![Relation {
                atom: "app/installed".to_string(),
                kind: DependencyKind::Runtime,
            }],
        );
        let idx = RepositoryIndex::build(1, "a".to_string(), vec![root], HashMap::new());
        let repos: Vec<(RepositoryId, &RepositoryIndex)> = vec![(RepositoryId(0), &idx)];
        let resolver = AtomResolver::new(repos.clone());
        let mut mask = MaskEngine::new(MaskPolicy {
            accepted_keywords: StdHashSet::from(["stable".to_string()]),
            ..Default::default()
        });
        let mut cache = ResolverCache::new();
        let mut solver = ForwardSolver::new(&resolver, &repos, &registry, &mut mask, &mut cache);

        let outcome = solver.solve(
            vec![(PackageId(1), RepositoryId(0))],
            ForwardOptions {
                empty_deps: true,
                ..Default::default()
            },
        );
        assert!(matches!(outcome, ForwardOutcome::MissingDependencies { .. }));
    }

    #[test]
    fn plan_to_graph_links_each_node_to_its_runtime_relations() {
        let dir = tempfile::tempdir().unwrap();
        let registry = empty_registry(dir.path());

        let leaf = record(2, "app/leaf", "1.0", vec![]);
        let root = record(
            1,
            "app/root",
            "1.0",
            vec![Relation {
                atom: "app/leaf".to_string(),
                kind: DependencyKind::Runtime,
            }],
        );
        let idx = RepositoryIndex::build(1, "a".to_string(), vec![root, leaf], HashMap::new());
        let repos: Vec<(RepositoryId, &RepositoryIndex)> = vec![(RepositoryId(0), &idx)];
        let resolver = AtomResolver::new(repos.clone());
        let mut mask = MaskEngine::new(MaskPolicy {
            accepted_keywords: StdHashSet::from(["stable".to_string()]),
            ..Default::default()
        });
        let mut cache = ResolverCache::new();
        let mut solver = ForwardSolver::new(&resolver, &repos, &registry, &mut mask, &mut cache);

        let outcome = solver.solve(vec![(PackageId(1), RepositoryId(0))], ForwardOptions::default());
        let ForwardOutcome::Resolved(plan) = outcome else {
            panic!("expected a resolved plan")
        };

        let graph = solver.plan_to_graph(&plan);
        let root_node = graph.depths[&1].iter().find(|n| n.package_id == PackageId(1)).unwrap();
        assert_eq!(root_node.depends_on, vec![PackageId(2)]);
        let leaf_node = graph.depths[&2].iter().find(|n| n.package_id == PackageId(2)).unwrap();
        assert!(leaf_node.depends_on.is_empty());
    }
}
