//! The world-update planner (`spec.md` §4.9): decides, per installed id, whether a
//! repository re-resolution leaves it unchanged, schedules it for update, or finds it
//! orphaned upstream.

use entomb_mask::MaskEngine;
use entomb_registry::Registry;
use entomb_repo::RepositoryIndex;
use entomb_types::{PackageId, RepositoryId};

use crate::cache::ResolverCache;
use crate::resolver::AtomResolver;

/// One installed id slated for update: its resolved repository replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedUpdate {
    pub installed_id: PackageId,
    pub candidate_id: PackageId,
    pub candidate_repository: RepositoryId,
}

/// The planner's full verdict over the installed set.
#[derive(Debug, Clone, Default)]
pub struct WorldUpdatePlan {
    pub updates: Vec<PlannedUpdate>,
    pub removed_upstream: Vec<PackageId>,
    /// `Some((from, to))` when the target branch differs from the currently active
    /// one; the caller persists this atomically after accepting the plan and before
    /// the executor runs (`spec.md` §4.9).
    pub branch_change: Option<(String, String)>,
}

pub struct WorldUpdatePlanner<'a, 'r> {
    resolver: &'a AtomResolver<'r>,
    repositories: &'a [(RepositoryId, &'r RepositoryIndex)],
    registry: &'a Registry,
    mask: &'a mut MaskEngine,
    resolver_cache: &'a mut ResolverCache,
}

impl<'a, 'r> WorldUpdatePlanner<'a, 'r> {
    pub fn new(
        resolver: &'a AtomResolver<'r>,
        repositories: &'a [(RepositoryId, &'r RepositoryIndex)],
        registry: &'a Registry,
        mask: &'a mut MaskEngine,
        resolver_cache: &'a mut ResolverCache,
    ) -> Self {
        WorldUpdatePlanner {
            resolver,
            repositories,
            registry,
            mask,
            resolver_cache,
        }
    }

    pub fn plan(&mut self, active_branch: &str, target_branches: &[String]) -> WorldUpdatePlan {
        let mut updates = Vec::new();
        let mut removed_upstream = Vec::new();

        for id in self.registry.all_ids() {
            let Some(installed) = self.registry.record(id) else {
                continue;
            };
            let key = installed.record.scope.key.clone();
            let slot = installed.record.scope.slot.clone();
            let installed_revision = installed.record.scope.revision;
            let replay = installed.replay;

            let atom_text = format!("{key}:{slot}");
            match self.resolver.resolve(&atom_text, self.mask, self.resolver_cache, Some(&slot.0), target_branches) {
                Err(_) => removed_upstream.push(id),
                Ok((candidate_id, candidate_repository)) => {
                    let candidate_revision = self
                        .repositories
                        .iter()
                        .find(|(repo_id, _)| *repo_id == candidate_repository)
                        .and_then(|(_, idx)| idx.record(candidate_id))
                        .map(|record| record.scope.revision);

                    let revision_changed = candidate_revision.is_some_and(|rev| rev != installed_revision);
                    if revision_changed || replay {
                        updates.push(PlannedUpdate {
                            installed_id: id,
                            candidate_id,
                            candidate_repository,
                        });
                    }
                }
            }
        }

        let branch_change = target_branches
            .first()
            .filter(|branch| branch.as_str() != active_branch)
            .map(|branch| (active_branch.to_string(), branch.clone()));

        WorldUpdatePlan {
            updates,
            removed_upstream,
            branch_change,
        }
    }
}
