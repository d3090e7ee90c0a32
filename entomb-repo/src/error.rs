//! Errors surfaced by [`crate::index`] and [`crate::snapshot`].

use std::path::PathBuf;

/// Errors raised while reading or syncing a repository snapshot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reading or writing a snapshot file on disk failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot file's contents were not valid JSON / did not match the schema.
    #[error("malformed snapshot at {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A freshly downloaded snapshot's checksum did not match the checksum file.
    #[error("checksum mismatch for repository snapshot: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The underlying [`crate::snapshot::SnapshotTransport`] failed.
    #[error("transport error while syncing repository: {0}")]
    Transport(String),
}
