//! Errors raised by the installed registry.

use std::path::PathBuf;

/// Errors raised while opening, locking or reading/writing the installed registry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Another transaction already holds the exclusive registry lock (`spec.md` §5, §7
    /// `registry_locked`).
    #[error("registry at {0} is locked by another transaction")]
    Locked(PathBuf),

    /// The installed registry file does not exist and cannot be opened
    /// (`spec.md` §7 `registry_missing`).
    #[error("registry at {0} does not exist")]
    Missing(PathBuf),

    /// Reading or writing the registry file on disk failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The on-disk registry file was not a valid serialized registry.
    #[error("malformed registry at {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    /// An insert would create a second record for an already-occupied `(key, slot)` that
    /// is not exempt via `injected`.
    #[error("(key, slot) already occupied: {0}/{1}")]
    KeySlotOccupied(String, String),
}
