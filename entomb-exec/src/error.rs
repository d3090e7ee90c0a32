use std::path::PathBuf;

use entomb_types::PackageId;

use crate::hooks::HookKind;

/// The install pipeline's named steps (`spec.md` §4.8), in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStep {
    Fetch,
    Checksum,
    PreRemove,
    PreInstall,
    Install,
    PostRemove,
    PostInstall,
    ShowMessages,
}

/// The removal pipeline's named steps (`spec.md` §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveStep {
    PreRemove,
    Remove,
    PostRemove,
}

/// The leaf errors any single step can raise.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error(transparent)]
    Fetch(#[from] entomb_archive::FetchError),
    #[error(transparent)]
    Archive(#[from] entomb_archive::Error),
    #[error("digest mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("hook {kind:?} failed: {message}")]
    HookFailed { kind: HookKind, message: String },
    #[error("collision on {path}: already owned by another installed package")]
    CollisionRefused { path: String },
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Registry(#[from] entomb_registry::Error),
    #[error("unknown installed id {0:?}")]
    UnknownInstalledId(PackageId),
}

/// A step failure surfaced by the install pipeline: the exact failing step, the
/// `(key, slot)` of the package being installed, and the underlying cause
/// (`spec.md` §4.8: "the executor must report the exact failing step and affected id").
#[derive(Debug, thiserror::Error)]
#[error("install step {step:?} failed for {key_slot}: {source}")]
pub struct InstallStepError {
    pub step: InstallStep,
    pub key_slot: String,
    #[source]
    pub source: ExecError,
}

/// A step failure surfaced by the removal pipeline.
#[derive(Debug, thiserror::Error)]
#[error("remove step {step:?} failed for {id:?}: {source}")]
pub struct RemoveStepError {
    pub step: RemoveStep,
    pub id: PackageId,
    #[source]
    pub source: ExecError,
}

/// The aggregate error a whole transaction (install depths plus a removal order) can
/// raise; aborts at the first failing step (`spec.md` §4.8).
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error(transparent)]
    Install(#[from] InstallStepError),
    #[error(transparent)]
    Remove(#[from] RemoveStepError),
    #[error(transparent)]
    Registry(#[from] entomb_registry::Error),
}
