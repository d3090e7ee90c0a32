//! The repository snapshot sync contract (`spec.md` §6).
//!
//! A repository snapshot is a directory with at minimum a binary metadata index file, a
//! monotonic revision file and an opaque checksum file. `sync` replaces all three
//! atomically: download the index under a transient name, verify against the checksum
//! file, rename into place, then re-download the revision file last.
//!
//! The concrete transport (HTTP/SSH) is an external collaborator (`spec.md` §1); this
//! module only consumes the [`SnapshotTransport`] contract, grounded on
//! `alpm-db/src/db/database.rs`'s lock-file-via-`create_new` idiom for the
//! write-to-temp-then-rename discipline mandated by §5.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::Error;

const INDEX_FILE_NAME: &str = "index.bin";
const REVISION_FILE_NAME: &str = "revision";
const CHECKSUM_FILE_NAME: &str = "checksum";

/// The external transport used to fetch the three snapshot files. Implemented outside
/// this crate (HTTP, SSH, or a test double); see `spec.md` §1.
pub trait SnapshotTransport {
    /// Fetches the raw metadata index bytes.
    fn fetch_index(&self) -> Result<Vec<u8>, String>;
    /// Fetches the opaque checksum file's contents.
    fn fetch_checksum(&self) -> Result<String, String>;
    /// Fetches the monotonic revision file's contents.
    fn fetch_revision(&self) -> Result<u64, String>;
}

/// Replaces the on-disk snapshot at `base_path` atomically, per `spec.md` §6.
///
/// Returns the new `(revision, checksum)` on success. Leaves the existing snapshot
/// completely untouched on any failure (the transient download file is never renamed
/// into place unless its checksum matches).
pub fn sync(base_path: &Path, transport: &dyn SnapshotTransport) -> Result<(u64, String), Error> {
    fs::create_dir_all(base_path).map_err(|source| Error::Io {
        path: base_path.to_path_buf(),
        source,
    })?;

    let checksum = transport
        .fetch_checksum()
        .map_err(Error::Transport)?;

    let bytes = transport.fetch_index().map_err(Error::Transport)?;
    let actual = hex_sha256(&bytes);
    if actual != checksum {
        return Err(Error::ChecksumMismatch {
            expected: checksum,
            actual,
        });
    }

    let transient = base_path.join(format!("{INDEX_FILE_NAME}.tmp"));
    fs::write(&transient, &bytes).map_err(|source| Error::Io {
        path: transient.clone(),
        source,
    })?;
    let index_path = base_path.join(INDEX_FILE_NAME);
    fs::rename(&transient, &index_path).map_err(|source| Error::Io {
        path: index_path.clone(),
        source,
    })?;

    let checksum_path = base_path.join(CHECKSUM_FILE_NAME);
    fs::write(&checksum_path, &checksum).map_err(|source| Error::Io {
        path: checksum_path,
        source,
    })?;

    // Revision is re-downloaded last: a crash between the index/checksum write and this
    // point leaves the old revision number pointing at the new (already verified) index,
    // which is safe to re-sync, never a torn read.
    let revision = transport.fetch_revision().map_err(Error::Transport)?;
    let revision_path = base_path.join(REVISION_FILE_NAME);
    fs::write(&revision_path, revision.to_string()).map_err(|source| Error::Io {
        path: revision_path,
        source,
    })?;

    Ok((revision, checksum))
}

/// Reads the currently-synced revision and checksum from `base_path`, without touching
/// the network.
pub fn read_local(base_path: &Path) -> Result<(u64, String), Error> {
    let revision_path = base_path.join(REVISION_FILE_NAME);
    let revision = fs::read_to_string(&revision_path)
        .map_err(|source| Error::Io {
            path: revision_path.clone(),
            source,
        })?
        .trim()
        .parse::<u64>()
        .unwrap_or(0);

    let checksum_path = base_path.join(CHECKSUM_FILE_NAME);
    let checksum = fs::read_to_string(&checksum_path).map_err(|source| Error::Io {
        path: checksum_path,
        source,
    })?;

    Ok((revision, checksum.trim().to_string()))
}

/// The on-disk path of the index file within a snapshot directory.
pub fn index_path(base_path: &Path) -> PathBuf {
    base_path.join(INDEX_FILE_NAME)
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
