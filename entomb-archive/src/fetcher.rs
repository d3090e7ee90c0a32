//! The archive fetcher (`spec.md` §4.7): given a mirror list and a relative path, download
//! a single archive to a fixed on-disk destination, verifying against an optional expected
//! digest and retrying across mirrors up to a small bounded ceiling.
//!
//! The concrete transport is an external collaborator, grounded on
//! `entomb_repo::snapshot::SnapshotTransport`'s shape: this crate only consumes the
//! [`Downloader`] contract.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use md5::{Digest, Md5};

use crate::error::FetchError;

/// Default bound on the number of mirrors tried for one archive (`spec.md` §4.7: "retry up
/// to a small bounded number of times").
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// The external download transport. Implemented outside this crate (HTTP, a local mirror,
/// or a test double).
pub trait Downloader {
    /// Downloads `url` to `dest`, overwriting it. Must leave no partial file on failure.
    fn download(&self, url: &str, dest: &Path) -> Result<(), String>;
}

/// The outcome of a successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The destination already existed and passed the digest check (or no digest was
    /// required); nothing was downloaded.
    OkCached,
    /// A mirror was downloaded and, if a digest was expected, it matched.
    OkDownloaded,
}

pub struct Fetcher<'d> {
    downloader: &'d dyn Downloader,
    max_attempts: u32,
}

impl std::fmt::Debug for Fetcher<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher").field("max_attempts", &self.max_attempts).finish()
    }
}

impl<'d> Fetcher<'d> {
    pub fn new(downloader: &'d dyn Downloader) -> Self {
        Fetcher {
            downloader,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(downloader: &'d dyn Downloader, max_attempts: u32) -> Self {
        Fetcher {
            downloader,
            max_attempts,
        }
    }

    /// Fetches a single archive, trying mirrors most-recent-first per `spec.md` §4.7.
    ///
    /// `cancel` is polled before each mirror attempt; when set, any partial destination
    /// file is removed and `FetchError::Cancelled` is returned.
    pub fn fetch(
        &self,
        mirrors: &[String],
        relative_path: &str,
        dest: &Path,
        expected_md5: Option<&str>,
        cancel: &AtomicBool,
    ) -> Result<FetchOutcome, FetchError> {
        if dest.exists() && digest_matches(dest, expected_md5)? {
            return Ok(FetchOutcome::OkCached);
        }

        for mirror in mirrors.iter().take(self.max_attempts as usize) {
            if cancel.load(Ordering::SeqCst) {
                let _ = fs::remove_file(dest);
                return Err(FetchError::Cancelled);
            }

            let url = format!("{}/{relative_path}", mirror.trim_end_matches('/'));
            if self.downloader.download(&url, dest).is_err() {
                continue;
            }

            if digest_matches(dest, expected_md5)? {
                return Ok(FetchOutcome::OkDownloaded);
            }
            let _ = fs::remove_file(dest);
        }

        Err(FetchError::AllMirrorsFailed {
            relative_path: relative_path.to_string(),
        })
    }
}

fn digest_matches(path: &Path, expected_md5: Option<&str>) -> Result<bool, FetchError> {
    let Some(expected) = expected_md5 else {
        return Ok(true);
    };
    let bytes = fs::read(path).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Md5::new();
    hasher.update(&bytes);
    let actual: String = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect();
    Ok(actual.eq_ignore_ascii_case(expected))
}
