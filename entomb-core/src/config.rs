//! Session configuration, loaded from a TOML file (`spec.md` §9 Design Note 1: the
//! session collapses what used to be ambient globals into one owned object).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One configured repository's connection details, in configuration (priority) order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,
    pub snapshot_base_url: String,
    pub package_mirrors: Vec<String>,
}

/// Everything a [`crate::Session`] needs that used to live as scattered ambient state:
/// on-disk layout, repository list, masking policy inputs and executor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Where the installed registry's database and lock file live.
    pub state_dir: PathBuf,
    /// Where downloaded archives and their cache blobs are kept.
    pub cache_dir: PathBuf,
    /// Root all install/remove content paths are resolved against.
    pub install_root: PathBuf,
    /// Scratch directory archives are unpacked into before their content is placed.
    pub staging_dir: PathBuf,

    /// Repositories in priority order; earlier entries win resolver ties.
    pub repositories: Vec<RepositoryConfig>,

    /// The branch currently installed against.
    pub active_branch: String,
    /// The branch(es) a world update should resolve candidates against.
    pub target_branches: Vec<String>,

    /// `KEYWORDS` this system accepts unconditionally.
    pub accepted_keywords: Vec<String>,
    /// Licenses that mask a candidate outright.
    pub license_mask: Vec<String>,

    /// `CONFIG_PROTECT` prefixes.
    pub config_protect: Vec<String>,
    /// `CONFIG_PROTECT_MASK` prefixes.
    pub config_protect_mask: Vec<String>,
    /// 1 warns and overwrites a file collision, 2 or higher refuses it (`spec.md` §4.8).
    pub collision_protect_level: u8,

    /// Bound on mirrors tried per archive before giving up (`spec.md` §4.7).
    pub max_fetch_attempts: u32,
    /// Cache directory size ceiling, enforced after each write (`spec.md` §5).
    pub cache_size_ceiling_bytes: u64,

    /// Per-repository universal keyword grants, keyed by repository name.
    #[serde(default)]
    pub repository_universal_keywords: HashMap<String, Vec<String>>,
}

impl SessionConfig {
    /// Loads and parses a config file; does not touch the state, cache or install
    /// directories, which are created lazily on first use.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[test]
    fn round_trips_through_toml() -> TestResult {
        let config = SessionConfig {
            state_dir: PathBuf::from("/var/lib/entomb"),
            cache_dir: PathBuf::from("/var/cache/entomb"),
            install_root: PathBuf::from("/"),
            staging_dir: PathBuf::from("/var/tmp/entomb"),
            repositories: vec![RepositoryConfig {
                name: "main".to_string(),
                snapshot_base_url: "https://repo.example.org/main".to_string(),
                package_mirrors: vec!["https://mirror.example.org".to_string()],
            }],
            active_branch: "stable".to_string(),
            target_branches: vec!["stable".to_string()],
            accepted_keywords: vec!["stable".to_string()],
            license_mask: vec![],
            config_protect: vec!["/etc".to_string()],
            config_protect_mask: vec!["/etc/env.d".to_string()],
            collision_protect_level: 2,
            max_fetch_attempts: 3,
            cache_size_ceiling_bytes: 1 << 30,
            repository_universal_keywords: HashMap::new(),
        };

        let text = toml::to_string(&config)?;
        let parsed: SessionConfig = toml::from_str(&text)?;
        assert_eq!(parsed.repositories.len(), 1);
        assert_eq!(parsed.active_branch, "stable");
        Ok(())
    }
}
