//! The reverse dependency solver (`spec.md` §4.6): expands a removal request into the
//! full set of installed ids that must be removed alongside it, ordered deepest first.
//!
//! Grounded on the same worklist shape as [`crate::forward::ForwardSolver`], walking
//! `reverse_dep_index` instead of repository relations.
//!
//! `deep` is implemented strictly as the orphan-detection pass `spec.md` §4.6
//! describes (closing over an id's own dependencies and keeping only those whose
//! remaining reverse-dependents are already slated for removal) — it is not a
//! transitive "rebuild everything downstream" selector. This is a deliberate reading of
//! an underspecified flag, not an oversight; see `DESIGN.md`.

use std::collections::{HashMap, HashSet};

use entomb_registry::Registry;
use entomb_types::{Atom, AtomExpr, PackageId};

/// Reverse-solve options (`spec.md` §4.6).
#[derive(Debug, Clone, Default)]
pub struct ReverseOptions {
    pub deep: bool,
    pub protected: HashSet<PackageId>,
}

/// The reverse solver's result: the level-by-level tree plus the deduped removal order
/// (deepest level first).
#[derive(Debug, Clone, Default)]
pub struct ReversePlan {
    pub levels: Vec<Vec<PackageId>>,
    pub removal_order: Vec<PackageId>,
}

pub struct ReverseSolver<'a> {
    registry: &'a Registry,
}

impl<'a> ReverseSolver<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        ReverseSolver { registry }
    }

    pub fn solve(&self, ids: Vec<PackageId>, options: &ReverseOptions) -> ReversePlan {
        let mut already_in_tree: HashSet<PackageId> = ids.iter().copied().collect();
        let mut levels: Vec<Vec<PackageId>> = vec![ids.clone()];
        let mut current_level = ids;

        loop {
            let mut next_level: HashSet<PackageId> = HashSet::new();
            for id in &current_level {
                for dep in self.registry.reverse_deps(*id) {
                    if already_in_tree.contains(&dep) {
                        continue;
                    }
                    if self.is_system(dep) {
                        continue;
                    }
                    if options.protected.contains(&dep) {
                        continue;
                    }
                    next_level.insert(dep);
                }
            }

            if next_level.is_empty() && options.deep {
                for id in &current_level {
                    for dependency in self.installed_dependency_closure(*id) {
                        if already_in_tree.contains(&dependency) {
                            continue;
                        }
                        let reverse_deps = self.registry.reverse_deps(dependency);
                        if reverse_deps.is_subset(&already_in_tree) {
                            next_level.insert(dependency);
                        }
                    }
                }
            }

            if next_level.is_empty() {
                break;
            }

            let next_level: Vec<PackageId> = next_level.into_iter().collect();
            already_in_tree.extend(next_level.iter().copied());
            levels.push(next_level.clone());
            current_level = next_level;
        }

        ReversePlan {
            removal_order: dedupe_upward(&levels),
            levels,
        }
    }

    fn is_system(&self, id: PackageId) -> bool {
        self.registry.record(id).is_some_and(|r| r.system)
    }

    /// The transitive closure of `id`'s own dependencies, resolved against the
    /// installed registry (not repositories), for the orphan-detection pass.
    fn installed_dependency_closure(&self, id: PackageId) -> HashSet<PackageId> {
        let mut closure = HashSet::new();
        let Some(record) = self.registry.record(id) else {
            return closure;
        };

        let mut stack: Vec<PackageId> = Vec::new();
        for relation in &record.record.relations {
            if let Some(dependency_id) = self.resolve_relation_installed(&relation.atom) {
                if closure.insert(dependency_id) {
                    stack.push(dependency_id);
                }
            }
        }

        while let Some(current) = stack.pop() {
            let Some(current_record) = self.registry.record(current) else {
                continue;
            };
            for relation in &current_record.record.relations {
                if let Some(dependency_id) = self.resolve_relation_installed(&relation.atom) {
                    if closure.insert(dependency_id) {
                        stack.push(dependency_id);
                    }
                }
            }
        }

        closure
    }

    fn resolve_relation_installed(&self, atom_text: &str) -> Option<PackageId> {
        let atom: Atom = match entomb_types::atom::parse(atom_text).ok()? {
            AtomExpr::Single(atom) => atom,
            AtomExpr::Or(atoms) => atoms.into_iter().next()?,
        };
        self.installed_matching(&atom)
    }

    fn installed_matching(&self, atom: &Atom) -> Option<PackageId> {
        self.registry
            .all_ids()
            .into_iter()
            .find(|id| self.registry.record(*id).is_some_and(|r| atom.matches(&r.record)))
    }
}

/// For each level from deepest to shallowest, drop any id that also appears at a
/// shallower level; the surviving order is the removal order (`spec.md` §4.6).
fn dedupe_upward(levels: &[Vec<PackageId>]) -> Vec<PackageId> {
    let mut first_level_of: HashMap<PackageId, usize> = HashMap::new();
    for (level_index, level) in levels.iter().enumerate() {
        for id in level {
            first_level_of.entry(*id).or_insert(level_index);
        }
    }

    let mut removal_order = Vec::new();
    for (level_index, level) in levels.iter().enumerate().rev() {
        for id in level {
            if first_level_of.get(id) == Some(&level_index) {
                removal_order.push(*id);
            }
        }
    }
    removal_order
}
