//! The session facade (`spec.md` §9 Design Note 1): one object owning the config, the
//! repository set, the mask policy and the installed registry, replacing what the
//! original tool kept as ambient process-global state.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use entomb_archive::{Downloader, FetchOutcome, Fetcher};
use entomb_exec::{
    CacheManager, ConfigProtect, HookRunner, InstallOptions, InstallRequest, RemoveOptions, TransactionPlan,
    TransactionReport,
};
use entomb_mask::{MaskEngine, MaskPolicy};
use entomb_registry::Registry;
use entomb_repo::RepositoryIndex;
use entomb_solve::{
    AtomResolver, ForwardOptions, ForwardOutcome, ForwardPlan, ForwardSolver, ResolverCache, ReverseOptions,
    ReversePlan, ReverseSolver, WorldUpdatePlan, WorldUpdatePlanner,
};
use entomb_types::{InstallSource, PackageId, PackageRecord, RepositoryId};

use crate::config::SessionConfig;
use crate::error::Error;
use crate::sink::TransactionSink;

/// The session: the live registry, the loaded repository snapshots, the mask policy
/// and resolver cache, and the config that built them.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    registry: Registry,
    repositories: Vec<(RepositoryId, RepositoryIndex)>,
    mask: MaskEngine,
    resolver_cache: ResolverCache,
    cache: CacheManager,
}

fn build_mask_policy(config: &SessionConfig, repositories: &[(RepositoryId, RepositoryIndex)]) -> MaskPolicy {
    let name_to_id: HashMap<&str, RepositoryId> = config
        .repositories
        .iter()
        .zip(repositories.iter())
        .map(|(cfg, (id, _))| (cfg.name.as_str(), *id))
        .collect();

    let repository_universal_keywords = config
        .repository_universal_keywords
        .iter()
        .filter_map(|(name, keywords)| {
            name_to_id
                .get(name.as_str())
                .map(|id| (*id, keywords.iter().cloned().collect::<HashSet<_>>()))
        })
        .collect();

    MaskPolicy {
        accepted_keywords: config.accepted_keywords.iter().cloned().collect(),
        license_mask: config.license_mask.iter().cloned().collect(),
        repository_universal_keywords,
        ..Default::default()
    }
}

impl Session {
    /// Opens the installed registry under `config.state_dir` and builds the mask
    /// policy from `config` over the given, already-loaded repository snapshots.
    pub fn open(config: SessionConfig, repositories: Vec<(RepositoryId, RepositoryIndex)>) -> Result<Self, Error> {
        let registry = Registry::open_for_write(&config.state_dir)?;
        let mask = MaskEngine::new(build_mask_policy(&config, &repositories));
        let cache = CacheManager::new(config.cache_dir.join("blobs"), config.cache_size_ceiling_bytes);

        Ok(Session {
            config,
            registry,
            repositories,
            mask,
            resolver_cache: ResolverCache::new(),
            cache,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Must be called whenever a repository's snapshot is replaced in place; keeps the
    /// mask and resolver caches from serving stale verdicts (`spec.md` §4.3, §4.4).
    pub fn refresh_repository(&mut self, repository_id: RepositoryId, index: RepositoryIndex) {
        if let Some(slot) = self.repositories.iter_mut().find(|(id, _)| *id == repository_id) {
            slot.1 = index;
        } else {
            self.repositories.push((repository_id, index));
        }
        let checksums: Vec<String> = self.repositories.iter().map(|(_, idx)| idx.checksum().to_string()).collect();
        self.resolver_cache.invalidate_stale(&checksums);
        self.mask.on_repository_generation(self.repositories.iter().map(|(_, idx)| idx.revision()).sum());
    }

    fn repo_refs(&self) -> Vec<(RepositoryId, &RepositoryIndex)> {
        self.repositories.iter().map(|(id, idx)| (*id, idx)).collect()
    }

    /// Resolves a single atom to its best visible candidate (`spec.md` §4.4).
    pub fn resolve(&mut self, atom_text: &str) -> Result<(PackageId, RepositoryId), Error> {
        let repos = self.repo_refs();
        let resolver = AtomResolver::new(repos);
        resolver
            .resolve(atom_text, &mut self.mask, &mut self.resolver_cache, None, &self.config.target_branches)
            .map_err(Error::from)
    }

    /// Expands `roots` into a depth-ordered install plan (`spec.md` §4.5).
    pub fn plan_install(
        &mut self,
        roots: Vec<(PackageId, RepositoryId)>,
        options: ForwardOptions,
    ) -> Result<ForwardPlan, Error> {
        let repos = self.repo_refs();
        let resolver = AtomResolver::new(repos.clone());
        let mut solver = ForwardSolver::new(&resolver, &repos, &self.registry, &mut self.mask, &mut self.resolver_cache);
        match solver.solve(roots, options) {
            ForwardOutcome::Resolved(plan) => Ok(plan),
            ForwardOutcome::MissingDependencies { not_found, .. } => Err(Error::UnresolvedDependency {
                count: not_found.len(),
                first: not_found.into_iter().next().unwrap_or_default(),
            }),
        }
    }

    /// Expands a removal request into the full dependent set, deepest first
    /// (`spec.md` §4.6).
    pub fn plan_removal(&self, ids: Vec<PackageId>, options: &ReverseOptions) -> ReversePlan {
        ReverseSolver::new(&self.registry).solve(ids, options)
    }

    /// Renders an install plan as a plain dependency adjacency list, for display or
    /// export (`SPEC_FULL.md` §2, grounded on `eit/commands/graph.py`).
    pub fn plan_to_graph(&mut self, plan: &ForwardPlan) -> entomb_solve::DependencyGraph {
        let repos = self.repo_refs();
        let resolver = AtomResolver::new(repos.clone());
        let solver = ForwardSolver::new(&resolver, &repos, &self.registry, &mut self.mask, &mut self.resolver_cache);
        solver.plan_to_graph(plan)
    }

    /// Re-resolves every installed id against the target branches (`spec.md` §4.9).
    pub fn plan_world_update(&mut self) -> WorldUpdatePlan {
        let repos = self.repo_refs();
        let resolver = AtomResolver::new(repos.clone());
        let mut planner =
            WorldUpdatePlanner::new(&resolver, &repos, &self.registry, &mut self.mask, &mut self.resolver_cache);
        planner.plan(&self.config.active_branch, &self.config.target_branches)
    }

    fn find_record(&self, id: PackageId, repository_id: RepositoryId) -> Option<&PackageRecord> {
        self.repositories
            .iter()
            .find(|(rid, _)| *rid == repository_id)
            .and_then(|(_, idx)| idx.record(id))
    }

    /// Where an archive for `record` lives under the cache directory, partitioned by
    /// branch (`spec.md` §6 persisted state layout).
    fn archive_path_for(&self, record: &PackageRecord) -> PathBuf {
        self.config
            .cache_dir
            .join("packages")
            .join(&record.scope.branch.0)
            .join(&record.artifact.download_path)
    }

    /// Turns a [`ForwardPlan`]'s `(id, repository)` depths into install requests,
    /// highest depth first; entries at depth one are the caller's explicit roots and
    /// get [`InstallSource::User`], everything deeper is [`InstallSource::Dependency`].
    pub fn build_install_requests(&self, plan: &ForwardPlan) -> Vec<Vec<InstallRequest>> {
        let mut out = Vec::with_capacity(plan.depths.len());
        for (&depth, entries) in plan.depths.iter().rev() {
            let source = if depth == 1 { InstallSource::User } else { InstallSource::Dependency };
            let requests = entries
                .iter()
                .filter_map(|&(id, repo_id)| {
                    let record = self.find_record(id, repo_id)?.clone();
                    let archive_path = self.archive_path_for(&record);
                    Some(InstallRequest {
                        new_record: record,
                        archive_path,
                        install_source: source,
                    })
                })
                .collect();
            out.push(requests);
        }
        out
    }

    /// Turns a world-update plan's scheduled updates into a single install depth group
    /// (they are independent replacements of already-installed slots, not a dependency
    /// tree, so there is no depth ordering between them).
    pub fn build_world_update_requests(&self, plan: &WorldUpdatePlan) -> Vec<InstallRequest> {
        plan.updates
            .iter()
            .filter_map(|update| {
                let record = self.find_record(update.candidate_id, update.candidate_repository)?.clone();
                let archive_path = self.archive_path_for(&record);
                Some(InstallRequest {
                    new_record: record,
                    archive_path,
                    install_source: InstallSource::Dependency,
                })
            })
            .collect()
    }

    /// Fetches every install request's archive into place before the transaction runs,
    /// so a mid-transaction mirror failure aborts nothing already committed
    /// (`spec.md` §4.7, §4.8).
    pub fn fetch_archives(
        &self,
        downloader: &dyn Downloader,
        requests: &[InstallRequest],
        cancel: &AtomicBool,
    ) -> Result<(), Error> {
        let fetcher = Fetcher::with_max_attempts(downloader, self.config.max_fetch_attempts);
        for request in requests {
            let repository = self
                .config
                .repositories
                .iter()
                .find(|r| r.name == self.repository_name_for(request.new_record.repository_id))
                .ok_or_else(|| Error::NotMatched {
                    atom: request.new_record.scope.key.to_string(),
                })?;

            if let Some(parent) = request.archive_path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| Error::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }

            let outcome = fetcher.fetch(
                &repository.package_mirrors,
                &request.new_record.artifact.download_path,
                &request.archive_path,
                Some(&request.new_record.artifact.digest_md5),
                cancel,
            )?;
            log::debug!(
                "fetched {}: {:?}",
                request.new_record.scope.key,
                matches!(outcome, FetchOutcome::OkCached)
            );
        }
        Ok(())
    }

    fn repository_name_for(&self, repository_id: RepositoryId) -> String {
        self.repositories
            .iter()
            .position(|(id, _)| *id == repository_id)
            .and_then(|index| self.config.repositories.get(index))
            .map(|r| r.name.clone())
            .unwrap_or_default()
    }

    /// Runs a pre-built [`TransactionPlan`], notifying `sink` of each install/removal
    /// and persisting the registry once on success (`spec.md` §4.8, §9 Design Note 5).
    pub fn execute(
        &mut self,
        hook_runner: &dyn HookRunner,
        sink: &mut dyn TransactionSink,
        plan: TransactionPlan,
    ) -> Result<TransactionReport, Error> {
        let install_options = InstallOptions {
            collision_protect_level: self.config.collision_protect_level,
            config_protect: ConfigProtect {
                protect: self.config.config_protect.clone(),
                protect_mask: self.config.config_protect_mask.clone(),
            },
            staging_root: self.config.staging_dir.clone(),
            install_root: self.config.install_root.clone(),
        };
        let remove_options = RemoveOptions {
            install_root: self.config.install_root.clone(),
            config_protect: ConfigProtect {
                protect: self.config.config_protect.clone(),
                protect_mask: self.config.config_protect_mask.clone(),
            },
        };

        let notify_requests: Vec<InstallRequest> = plan.install_depths.iter().flatten().cloned().collect();
        let report = entomb_exec::run_transaction(&mut self.registry, hook_runner, &install_options, &remove_options, plan)?;

        for request in &notify_requests {
            sink.on_installed(request);
        }
        for id in &report.removed {
            sink.on_removed(*id);
        }
        sink.on_finished(&report);

        Ok(report)
    }
}
