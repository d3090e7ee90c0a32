//! The session's aggregated error type (`spec.md` §7): one enum naming every error kind
//! a caller of [`crate::Session`] can observe, wrapping whichever lower crate raised it.

use std::path::PathBuf;

use entomb_types::PackageId;

/// Every error a session operation can raise, named per `spec.md` §7.
///
/// Resolver errors propagate to the planner; planner errors reach the caller without
/// the executor ever running; executor errors abort the current package and the
/// transaction, but packages already committed earlier in the same transaction stay
/// installed (`spec.md` §7).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An atom matched no visible candidate in any configured repository.
    #[error("no candidate matched {atom}")]
    NotMatched { atom: String },

    /// An `"or"`-group (or a slot-qualified atom) left more than one candidate tied
    /// after the full tie-break lattice ran out of criteria.
    #[error("{atom} remained ambiguous after every tie-break criterion")]
    AmbiguousNoResolution { atom: String },

    /// The only candidates for an atom were masked; carries the reason the top
    /// candidate was rejected.
    #[error("{atom} is masked ({reason:?})")]
    Masked { atom: String, reason: entomb_mask::MaskReason },

    /// A forward solve could not resolve every dependency atom it visited.
    #[error("{count} unresolved dependency atoms, including {first}")]
    UnresolvedDependency { count: usize, first: String },

    /// A `!atom` conflict member matched an installed package the plan has no removal
    /// entry for.
    #[error("conflicting installed package {0:?} has no removal scheduled")]
    Conflict(PackageId),

    /// A fetched or installed archive's digest did not match the repository record.
    #[error(transparent)]
    IntegrityFailed(#[from] entomb_exec::ExecError),

    /// Every configured mirror failed for one archive.
    #[error("no mirror could provide {relative_path}")]
    MirrorExhausted { relative_path: String },

    /// A file collision was refused at the configured collision-protect level.
    #[error("collision on {path}: refused by the configured collision-protect level")]
    CollisionRefused { path: String },

    /// Another process already holds the registry lock.
    #[error("registry at {0} is locked by another process")]
    RegistryLocked(PathBuf),

    /// The registry's state directory does not exist or has no database file yet.
    #[error("registry at {0} has not been initialized")]
    RegistryMissing(PathBuf),

    /// A caller-supplied cancellation flag fired mid-fetch.
    #[error("operation cancelled")]
    Cancelled,

    /// An install or remove step failed; the step and affected package are named in
    /// the wrapped error's `Display`.
    #[error(transparent)]
    FatalStep(#[from] entomb_exec::TransactionError),

    /// A session config file or other ambient on-disk input could not be read.
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A session config file failed to parse as TOML.
    #[error("failed to parse config at {path}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl From<entomb_solve::ResolveError> for Error {
    fn from(source: entomb_solve::ResolveError) -> Self {
        match source {
            entomb_solve::ResolveError::NotFound(atom) => Error::NotMatched { atom },
            entomb_solve::ResolveError::InvalidAtom(atom) => Error::NotMatched { atom },
        }
    }
}

impl From<entomb_solve::SolveError> for Error {
    fn from(source: entomb_solve::SolveError) -> Self {
        match source {
            entomb_solve::SolveError::MissingDependencies(count) => Error::UnresolvedDependency {
                count,
                first: String::new(),
            },
            entomb_solve::SolveError::UnknownInstalledId(id) => Error::Conflict(id),
        }
    }
}

impl From<entomb_registry::Error> for Error {
    fn from(source: entomb_registry::Error) -> Self {
        match source {
            entomb_registry::Error::Locked(path) => Error::RegistryLocked(path),
            entomb_registry::Error::Missing(path) => Error::RegistryMissing(path),
            other => Error::FatalStep(entomb_exec::TransactionError::Registry(other)),
        }
    }
}

impl From<entomb_archive::FetchError> for Error {
    fn from(source: entomb_archive::FetchError) -> Self {
        match source {
            entomb_archive::FetchError::AllMirrorsFailed { relative_path } => {
                Error::MirrorExhausted { relative_path }
            }
            entomb_archive::FetchError::Cancelled => Error::Cancelled,
            other => Error::IntegrityFailed(entomb_exec::ExecError::Fetch(other)),
        }
    }
}
