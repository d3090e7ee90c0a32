//! The on-disk cache manager (`spec.md` §9 Design Note 4, §5): one blob per named entry,
//! written via write-to-temp-then-rename so readers never see a torn blob, with a size
//! ceiling enforced after each write by truncating the oldest entries to empty
//! (`spec.md` §5: "the cache is a hint, not authoritative").

use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::error::ExecError;

#[derive(Debug, Clone)]
pub struct CacheManager {
    dir: PathBuf,
    size_ceiling_bytes: u64,
}

impl CacheManager {
    pub fn new(dir: PathBuf, size_ceiling_bytes: u64) -> Self {
        CacheManager { dir, size_ceiling_bytes }
    }

    /// Writes `bytes` under `name`, atomically, then enforces the size ceiling.
    pub fn put(&self, name: &str, bytes: &[u8]) -> Result<(), ExecError> {
        fs::create_dir_all(&self.dir).map_err(|source| ExecError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let tmp = self.dir.join(format!("{name}.tmp"));
        fs::write(&tmp, bytes).map_err(|source| ExecError::Io {
            path: tmp.clone(),
            source,
        })?;
        let dest = self.dir.join(name);
        fs::rename(&tmp, &dest).map_err(|source| ExecError::Io { path: dest, source })?;
        self.enforce_ceiling()
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        fs::read(self.dir.join(name)).ok()
    }

    fn enforce_ceiling(&self) -> Result<(), ExecError> {
        let Ok(dir_entries) = fs::read_dir(&self.dir) else {
            return Ok(());
        };

        let mut entries: Vec<(PathBuf, u64, SystemTime)> = Vec::new();
        let mut total: u64 = 0;
        for entry in dir_entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "tmp") {
                continue;
            }
            let Ok(metadata) = entry.metadata() else { continue };
            let size = metadata.len();
            let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            total += size;
            entries.push((path, size, mtime));
        }

        if total <= self.size_ceiling_bytes {
            return Ok(());
        }

        entries.sort_by_key(|(_, _, mtime)| *mtime);
        for (path, size, _) in entries {
            if total <= self.size_ceiling_bytes {
                break;
            }
            fs::write(&path, []).map_err(|source| ExecError::Io { path: path.clone(), source })?;
            total = total.saturating_sub(size);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[test]
    fn put_then_get_round_trips() -> TestResult {
        let dir = tempfile::tempdir()?;
        let cache = CacheManager::new(dir.path().to_path_buf(), 1_000_000);
        cache.put("blob-a", b"hello")?;
        assert_eq!(cache.get("blob-a"), Some(b"hello".to_vec()));
        Ok(())
    }

    #[test]
    fn ceiling_truncates_oldest_entries() -> TestResult {
        let dir = tempfile::tempdir()?;
        let cache = CacheManager::new(dir.path().to_path_buf(), 10);
        cache.put("first", b"0123456789")?;
        std::thread::sleep(std::time::Duration::from_millis(10));
        cache.put("second", b"0123456789")?;

        // "first" is older, so it should have been truncated to make room.
        assert_eq!(cache.get("first"), Some(Vec::new()));
        assert_eq!(cache.get("second"), Some(b"0123456789".to_vec()));
        Ok(())
    }
}
