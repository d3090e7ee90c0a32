//! The removal step pipeline (`spec.md` §4.8): preremove → remove → postremove for one
//! installed id.

use std::fs;
use std::path::PathBuf;

use entomb_registry::Registry;
use entomb_types::PackageId;

use crate::configprotect::ConfigProtect;
use crate::error::{ExecError, RemoveStep, RemoveStepError};
use crate::hooks::{dispatch, HookKind, HookRunner};

#[derive(Debug, Clone)]
pub struct RemoveOptions {
    pub install_root: PathBuf,
    pub config_protect: ConfigProtect,
}

/// Removes one installed id, deleting only paths it still exclusively owns and honoring
/// config-protect (`spec.md` §4.8: "the remove step deletes every path ... that is still
/// owned exclusively by this id, with the same config-protect rules").
pub fn remove_one(registry: &mut Registry, hook_runner: &dyn HookRunner, id: PackageId, options: &RemoveOptions) -> Result<(), RemoveStepError> {
    let step_error = |step: RemoveStep, source: ExecError| RemoveStepError { step, id, source };

    let record = registry
        .record(id)
        .cloned()
        .ok_or_else(|| step_error(RemoveStep::PreRemove, ExecError::UnknownInstalledId(id)))?;

    dispatch(hook_runner, HookKind::PreRemove, &record.record.hooks).map_err(|e| step_error(RemoveStep::PreRemove, e))?;

    let mut directories = Vec::new();
    for entry in &record.record.content {
        let owners = registry.content_owners(&entry.path);
        if owners.len() > 1 {
            continue;
        }
        let target = options.install_root.join(&entry.path);
        match entry.kind {
            entomb_types::ContentKind::Dir => directories.push(target),
            _ => {
                if options.config_protect.is_protected_path(&entry.path) {
                    continue;
                }
                let _ = fs::remove_file(&target);
            }
        }
    }

    // Bottom-up so a parent directory is only removed once its children are gone.
    directories.sort_by_key(|path| std::cmp::Reverse(path.components().count()));
    for dir in directories {
        let _ = fs::remove_dir(&dir);
    }

    dispatch(hook_runner, HookKind::PostRemove, &record.record.hooks).map_err(|e| step_error(RemoveStep::PostRemove, e))?;
    registry.remove(id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use entomb_types::*;
    use std::collections::BTreeMap;
    use testresult::TestResult;

    struct NoopRunner;
    impl HookRunner for NoopRunner {
        fn run(&self, _kind: HookKind, _script: &[u8]) -> Result<(), String> {
            Ok(())
        }
    }

    fn record_with_content(name: &str, content: Vec<ContentEntry>) -> InstalledRecord {
        InstalledRecord {
            record: PackageRecord {
                repository_id: RepositoryId(1),
                package_id: PackageId(0),
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
                provided_sonames: Default::default(),
                mirrors: vec![],
                content,
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
    fn removes_exclusively_owned_files_and_the_record() -> TestResult {
        let dir = tempfile::tempdir()?;
        let install_root = dir.path().join("root");
        fs::create_dir_all(install_root.join("usr/bin"))?;
        fs::write(install_root.join("usr/bin/tool"), b"content")?;

        let mut registry = Registry::open_for_write(&dir.path().join("registry"))?;
        let (id, _) = registry.insert_or_replace(record_with_content(
            "tool",
            vec![
                ContentEntry { path: "usr/bin/tool".to_string(), kind: ContentKind::File },
                ContentEntry { path: "usr/bin".to_string(), kind: ContentKind::Dir },
            ],
        ))?;

        let options = RemoveOptions {
            install_root,
            config_protect: ConfigProtect::default(),
        };
        let runner = NoopRunner;
        remove_one(&mut registry, &runner, id, &options)?;

        assert!(registry.record(id).is_none());
        assert!(!dir.path().join("root/usr/bin/tool").exists());
        Ok(())
    }

    #[test]
    fn config_protected_files_are_left_in_place() -> TestResult {
        let dir = tempfile::tempdir()?;
        let install_root = dir.path().join("root");
        fs::create_dir_all(install_root.join("etc"))?;
        fs::write(install_root.join("etc/app.conf"), b"user-edited")?;

        let mut registry = Registry::open_for_write(&dir.path().join("registry"))?;
        let (id, _) = registry.insert_or_replace(record_with_content(
            "tool",
            vec![ContentEntry { path: "etc/app.conf".to_string(), kind: ContentKind::File }],
        ))?;

        let options = RemoveOptions {
            install_root,
            config_protect: ConfigProtect {
                protect: vec!["etc".to_string()],
                protect_mask: vec![],
            },
        };
        let runner = NoopRunner;
        remove_one(&mut registry, &runner, id, &options)?;

        assert!(dir.path().join("root/etc/app.conf").exists());
        Ok(())
    }
}
