//! The install step pipeline (`spec.md` §4.8, steps 3–8; steps 1–2 are
//! [`crate::fetch::fetch_archive`]).

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use entomb_archive::format::{unpack_to, UnpackedKind};
use entomb_registry::Registry;
use entomb_types::{ContentEntry, ContentKind, InstallSource, InstalledRecord, PackageId, PackageRecord};
use md5::{Digest, Md5};

use crate::configprotect::{self, ConfigProtect};
use crate::error::{ExecError, InstallStep, InstallStepError};
use crate::hooks::{dispatch, HookKind, HookRunner};

/// What is being installed and under what provenance.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub new_record: PackageRecord,
    pub archive_path: PathBuf,
    pub install_source: InstallSource,
}

/// Filesystem locations and collision/config-protect policy for one transaction.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// `1`: warn and overwrite on collision. `>= 2`: refuse and report.
    pub collision_protect_level: u8,
    pub config_protect: ConfigProtect,
    pub staging_root: PathBuf,
    pub install_root: PathBuf,
}

/// Runs the install pipeline for one package, returning its newly-installed id.
pub fn install_one(
    registry: &mut Registry,
    hook_runner: &dyn HookRunner,
    request: InstallRequest,
    options: &InstallOptions,
) -> Result<PackageId, InstallStepError> {
    let new_record = request.new_record;
    let key_slot_text = format!("{}:{}", new_record.scope.key, new_record.scope.slot);

    let step_error = |step: InstallStep, source: ExecError| InstallStepError {
        step,
        key_slot: key_slot_text.clone(),
        source,
    };

    let existing_id = registry.by_key_slot(&new_record.scope.key, &new_record.scope.slot);
    let existing_record = existing_id.and_then(|id| registry.record(id).cloned());

    if let Some(old) = &existing_record {
        dispatch(hook_runner, HookKind::PreRemove, &old.record.hooks).map_err(|e| step_error(InstallStep::PreRemove, e))?;
    }

    dispatch(hook_runner, HookKind::PreInstall, &new_record.hooks).map_err(|e| step_error(InstallStep::PreInstall, e))?;

    let staging_dir = options
        .staging_root
        .join(format!("{}-{}", new_record.scope.key.name, new_record.scope.slot));
    let unpacked = unpack_to(&request.archive_path, &staging_dir)
        .map_err(|e| step_error(InstallStep::Install, ExecError::Archive(e)))?;

    let mut content = Vec::with_capacity(unpacked.len());
    let mut automerge_map = existing_record
        .as_ref()
        .map(|old| old.automerge_map.clone())
        .unwrap_or_default();
    for entry in &unpacked {
        let target = options.install_root.join(&entry.relative_path);
        let path_text = entry.relative_path.to_string_lossy().to_string();
        let staged_path = staging_dir.join(&entry.relative_path);

        match entry.kind {
            UnpackedKind::Directory => {
                fs::create_dir_all(&target).map_err(|source| step_error(InstallStep::Install, io_error(&target, source)))?;
                content.push(ContentEntry { path: path_text, kind: ContentKind::Dir });
            }
            UnpackedKind::Symlink => {
                place_file(&staged_path, &target).map_err(|source| step_error(InstallStep::Install, io_error(&target, source)))?;
                content.push(ContentEntry { path: path_text, kind: ContentKind::Symlink });
            }
            UnpackedKind::File => {
                let owners = registry.content_owners(&path_text);
                let owned_by_other = owners.iter().any(|owner| Some(*owner) != existing_id);
                if owned_by_other {
                    if options.collision_protect_level >= 2 {
                        return Err(step_error(InstallStep::Install, ExecError::CollisionRefused { path: path_text }));
                    }
                    log::warn!("collision on {path_text}, proceeding at collision-protect level 1");
                }

                let staged_bytes = fs::read(&staged_path).map_err(|source| step_error(InstallStep::Install, io_error(&staged_path, source)))?;
                let protected = options.config_protect.is_protected_path(&path_text);
                let diverted = if protected {
                    options
                        .config_protect
                        .should_divert(&target, &staged_bytes)
                        .map_err(|source| step_error(InstallStep::Install, io_error(&target, source)))?
                } else {
                    false
                };
                let final_target = if diverted {
                    configprotect::allocate_sibling(&target)
                } else {
                    target.clone()
                };

                place_file(&staged_path, &final_target).map_err(|source| step_error(InstallStep::Install, io_error(&final_target, source)))?;
                if protected && !diverted {
                    automerge_map.insert(path_text.clone(), hex_md5(&staged_bytes));
                } else if diverted {
                    automerge_map.remove(&path_text);
                }
                content.push(ContentEntry { path: path_text, kind: ContentKind::File });
            }
        }
    }

    if let Some(old) = &existing_record {
        dispatch(hook_runner, HookKind::PostRemove, &old.record.hooks).map_err(|e| step_error(InstallStep::PostRemove, e))?;
        let new_paths: HashSet<&str> = content.iter().map(|c| c.path.as_str()).collect();
        for old_entry in &old.record.content {
            if !new_paths.contains(old_entry.path.as_str()) {
                let _ = fs::remove_file(options.install_root.join(&old_entry.path));
            }
        }
    }

    dispatch(hook_runner, HookKind::PostInstall, &new_record.hooks).map_err(|e| step_error(InstallStep::PostInstall, e))?;

    let live_paths: HashSet<&str> = content.iter().map(|c| c.path.as_str()).collect();
    automerge_map.retain(|path, _| live_paths.contains(path.as_str()));

    let mut record_to_insert = new_record.clone();
    record_to_insert.content = content;
    let installed = InstalledRecord {
        record: record_to_insert,
        installed_from_repository_id: new_record.repository_id,
        install_source: request.install_source,
        automerge_map,
        injected: false,
        system: false,
        replay: false,
    };
    let (id, _superseded) = registry
        .insert_or_replace(installed)
        .map_err(|source| step_error(InstallStep::PostInstall, ExecError::Registry(source)))?;

    for message in &new_record.hooks.messages {
        log::info!("{message}");
    }

    let _ = fs::remove_dir_all(&staging_dir);
    Ok(id)
}

/// Moves a staged path to its final target, renaming when possible (same filesystem)
/// and falling back to copy+unlink otherwise (`spec.md` §4.8).
fn place_file(staged_path: &Path, target: &Path) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(staged_path, target) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(staged_path, target)?;
            fs::remove_file(staged_path)
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ExecError {
    ExecError::Io { path: path.to_path_buf(), source }
}

fn hex_md5(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use entomb_archive::format::{write_archive, ArchiveTrailer, StagedFile};
    use entomb_types::*;
    use std::collections::HashMap;
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
    fn installs_a_fresh_package_and_places_content() -> TestResult {
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

        let mut registry = Registry::open_for_write(&dir.path().join("registry"))?;
        let options = InstallOptions {
            collision_protect_level: 2,
            config_protect: ConfigProtect::default(),
            staging_root: dir.path().join("staging"),
            install_root: dir.path().join("root"),
        };
        let request = InstallRequest {
            new_record: sample_record("tool"),
            archive_path,
            install_source: InstallSource::User,
        };

        let runner = NoopRunner;
        let id = install_one(&mut registry, &runner, request, &options)?;
        assert!(registry.record(id).is_some());
        assert!(dir.path().join("root/usr/bin/tool").exists());
        Ok(())
    }

    #[test]
    fn collision_at_level_two_is_refused() -> TestResult {
        let dir = tempfile::tempdir()?;
        let install_root = dir.path().join("root");
        fs::create_dir_all(install_root.join("usr/bin"))?;
        fs::write(install_root.join("usr/bin/tool"), b"other-owner-content")?;

        let mut registry = Registry::open_for_write(&dir.path().join("registry"))?;
        let mut owner_record = sample_record("owner");
        owner_record.content = vec![ContentEntry {
            path: "usr/bin/tool".to_string(),
            kind: ContentKind::File,
        }];
        registry.insert_or_replace(InstalledRecord {
            record: owner_record,
            installed_from_repository_id: RepositoryId(1),
            install_source: InstallSource::User,
            automerge_map: BTreeMap::new(),
            injected: false,
            system: false,
            replay: false,
        })?;

        let archive_path = dir.path().join("pkg.tar.gz");
        write_archive(
            &archive_path,
            &[StagedFile {
                relative_path: PathBuf::from("usr/bin/tool"),
                content: b"new-content".to_vec(),
                mode: 0o755,
            }],
            &ArchiveTrailer::default(),
        )?;

        let options = InstallOptions {
            collision_protect_level: 2,
            config_protect: ConfigProtect::default(),
            staging_root: dir.path().join("staging"),
            install_root,
        };
        let request = InstallRequest {
            new_record: sample_record("tool"),
            archive_path,
            install_source: InstallSource::User,
        };

        let runner = NoopRunner;
        let result = install_one(&mut registry, &runner, request, &options);
        assert!(matches!(
            result,
            Err(InstallStepError {
                source: ExecError::CollisionRefused { .. },
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn config_protected_file_is_diverted_to_a_sibling() -> TestResult {
        let dir = tempfile::tempdir()?;
        let install_root = dir.path().join("root");
        fs::create_dir_all(install_root.join("etc"))?;
        fs::write(install_root.join("etc/app.conf"), b"user-edited")?;

        let mut registry = Registry::open_for_write(&dir.path().join("registry"))?;
        let archive_path = dir.path().join("pkg.tar.gz");
        write_archive(
            &archive_path,
            &[StagedFile {
                relative_path: PathBuf::from("etc/app.conf"),
                content: b"packaged-default".to_vec(),
                mode: 0o644,
            }],
            &ArchiveTrailer::default(),
        )?;

        let options = InstallOptions {
            collision_protect_level: 2,
            config_protect: ConfigProtect {
                protect: vec!["etc".to_string()],
                protect_mask: vec![],
            },
            staging_root: dir.path().join("staging"),
            install_root,
        };
        let request = InstallRequest {
            new_record: sample_record("tool"),
            archive_path,
            install_source: InstallSource::User,
        };

        let runner = NoopRunner;
        install_one(&mut registry, &runner, request, &options)?;
        assert_eq!(fs::read(dir.path().join("root/etc/app.conf"))?, b"user-edited");
        assert_eq!(fs::read(dir.path().join("root/etc/._cfg0000_app.conf"))?, b"packaged-default");
        Ok(())
    }
}
