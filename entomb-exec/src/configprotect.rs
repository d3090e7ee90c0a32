//! Config-file protection (`spec.md` §4.8, §6): diverting writes to files the user may
//! have edited locally instead of silently overwriting them.

use std::fs;
use std::path::{Path, PathBuf};

/// `CONFIG_PROTECT`/`CONFIG_PROTECT_MASK` prefix lists.
#[derive(Debug, Clone, Default)]
pub struct ConfigProtect {
    pub protect: Vec<String>,
    pub protect_mask: Vec<String>,
}

impl ConfigProtect {
    /// Whether `target` falls under a protected prefix and not under a mask prefix.
    pub fn is_protected_path(&self, target: &str) -> bool {
        self.protect.iter().any(|prefix| target.starts_with(prefix.as_str()))
            && !self.protect_mask.iter().any(|prefix| target.starts_with(prefix.as_str()))
    }

    /// Whether a write of `staged_content` to `target` should be diverted to a sibling
    /// path rather than written through: `target` must be under a protected prefix, the
    /// existing on-disk file must be a regular text file, and its content must differ
    /// from what is staged.
    pub fn should_divert(&self, target: &Path, staged_content: &[u8]) -> std::io::Result<bool> {
        let target_text = target.to_string_lossy();
        if !self.is_protected_path(&target_text) {
            return Ok(false);
        }
        if !target.is_file() {
            return Ok(false);
        }
        let existing = fs::read(target)?;
        if !looks_like_text(&existing) {
            return Ok(false);
        }
        Ok(existing != staged_content)
    }
}

fn looks_like_text(bytes: &[u8]) -> bool {
    !bytes.contains(&0)
}

/// Allocates the sibling path for a diverted write: `<dir>/._cfg<NNNN>_<basename>`, where
/// `NNNN` is the smallest four-digit integer for which the file does not already exist
/// (`spec.md` §6, bit-exact naming).
pub fn allocate_sibling(target: &Path) -> PathBuf {
    let dir = target.parent().unwrap_or_else(|| Path::new(""));
    let basename = target.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    for n in 0..10000u32 {
        let candidate = dir.join(format!("._cfg{n:04}_{basename}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    dir.join(format!("._cfg9999_{basename}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_prefix_without_mask_is_protected() {
        let cp = ConfigProtect {
            protect: vec!["/etc".to_string()],
            protect_mask: vec![],
        };
        assert!(cp.is_protected_path("/etc/app.conf"));
        assert!(!cp.is_protected_path("/usr/bin/tool"));
    }

    #[test]
    fn mask_prefix_overrides_protect_prefix() {
        let cp = ConfigProtect {
            protect: vec!["/etc".to_string()],
            protect_mask: vec!["/etc/app.d".to_string()],
        };
        assert!(!cp.is_protected_path("/etc/app.d/generated.conf"));
        assert!(cp.is_protected_path("/etc/app.conf"));
    }

    #[test]
    fn sibling_naming_picks_the_smallest_free_number() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("app.conf");
        let first = allocate_sibling(&target);
        assert_eq!(first.file_name().unwrap().to_str().unwrap(), "._cfg0000_app.conf");
        fs::write(&first, b"x").unwrap();
        let second = allocate_sibling(&target);
        assert_eq!(second.file_name().unwrap().to_str().unwrap(), "._cfg0001_app.conf");
    }

    #[test]
    fn unchanged_existing_file_is_not_diverted() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("app.conf");
        fs::write(&target, b"same").unwrap();
        let cp = ConfigProtect {
            protect: vec![dir.path().to_string_lossy().to_string()],
            protect_mask: vec![],
        };
        assert!(!cp.should_divert(&target, b"same").unwrap());
        assert!(cp.should_divert(&target, b"different").unwrap());
    }
}
