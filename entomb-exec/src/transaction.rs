//! The transaction facade (`spec.md` §4.8): runs a removal plan (already deepest-first,
//! per `entomb_solve::ReverseSolver`) followed by an install plan (high depth first) as
//! one unit, aborting and reporting the exact failing step on the first error. Removals
//! go first so a conflicting installed id is gone before its replacement installs
//! (`spec.md` §8 seed scenario 4).

use entomb_registry::Registry;
use entomb_types::PackageId;

use crate::error::TransactionError;
use crate::hooks::HookRunner;
use crate::install::{install_one, InstallOptions, InstallRequest};
use crate::remove::{remove_one, RemoveOptions};

/// An install plan grouped by depth, highest depth first; the order within a depth
/// group is not significant to the executor.
#[derive(Debug, Clone, Default)]
pub struct TransactionPlan {
    pub install_depths: Vec<Vec<InstallRequest>>,
    pub removal_order: Vec<PackageId>,
}

/// What actually happened, for the caller to surface to the user and fold into a
/// world-update's persisted branch change.
#[derive(Debug, Clone, Default)]
pub struct TransactionReport {
    pub installed: Vec<PackageId>,
    pub removed: Vec<PackageId>,
}

pub fn run_transaction(
    registry: &mut Registry,
    hook_runner: &dyn HookRunner,
    install_options: &InstallOptions,
    remove_options: &RemoveOptions,
    plan: TransactionPlan,
) -> Result<TransactionReport, TransactionError> {
    let mut report = TransactionReport::default();

    // Removals run first: a conflicting installed id must be gone before the package
    // that conflicts with it is installed (`spec.md` §8 seed scenario 4).
    for id in plan.removal_order {
        remove_one(registry, hook_runner, id, remove_options)?;
        report.removed.push(id);
    }

    for depth_group in plan.install_depths {
        for request in depth_group {
            let id = install_one(registry, hook_runner, request, install_options)?;
            report.installed.push(id);
        }
    }

    registry.persist()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configprotect::ConfigProtect;
    use crate::hooks::HookKind;
    use entomb_archive::format::{write_archive, ArchiveTrailer, StagedFile};
    use entomb_types::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use testresult::TestResult;

    struct NoopRunner;
    impl HookRunner for NoopRunner {
        fn run(&self, _kind: HookKind, _script: &[u8]) -> Result<(), String> {
            Ok(())
        }
    }

    fn sample_record(name: &str) -> PackageRecord {
        PackageRecord {
            repository_id: RepositoryId(1),
            package_id: PackageId(1),
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
            needed: vec![],
            provided_sonames: HashMap::new().into_iter().collect(),
            mirrors: vec![],
            content: vec![],
            hooks: Hooks::default(),
        }
    }

    #[test]
    fn runs_installs_then_removals_and_persists() -> TestResult {
        let dir = tempfile::tempdir()?;
        let archive_path = dir.path().join("pkg.tar.gz");
        write_archive(
            &archive_path,
            &[StagedFile {
                relative_path: PathBuf::from("usr/bin/tool"),
                content: b"binary".to_vec(),
                mode: 0o755,
            }],
            &ArchiveTrailer::default(),
        )?;

        let registry_dir = dir.path().join("registry");
        let mut registry = Registry::open_for_write(&registry_dir)?;
        let install_options = InstallOptions {
            collision_protect_level: 2,
            config_protect: ConfigProtect::default(),
            staging_root: dir.path().join("staging"),
            install_root: dir.path().join("root"),
        };
        let remove_options = RemoveOptions {
            install_root: dir.path().join("root"),
            config_protect: ConfigProtect::default(),
        };

        let plan = TransactionPlan {
            install_depths: vec![vec![InstallRequest {
                new_record: sample_record("tool"),
                archive_path,
                install_source: InstallSource::User,
            }]],
            removal_order: vec![],
        };

        let runner = NoopRunner;
        let report = run_transaction(&mut registry, &runner, &install_options, &remove_options, plan)?;
        assert_eq!(report.installed.len(), 1);
        assert!(registry_dir.join("registry.bin").exists());
        Ok(())
    }
}
