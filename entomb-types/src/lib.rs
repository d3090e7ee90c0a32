//! Atom grammar, version ordering and package record types (`spec.md` §3, §4.1).
//!
//! This crate has no I/O: it is the pure value-type layer shared by every other
//! `entomb-*` crate, grounded on `alpm-types` in the teacher workspace.

pub mod atom;
pub mod error;
pub mod record;
pub mod version;

pub use atom::{Atom, AtomExpr, Operator, UseFlagDep};
pub use error::{AtomSyntaxError, Error};
pub use record::{
    Artifact, Branch, BuildMetadata, ContentEntry, ContentKind, DependencyKind, ElfClass, Hooks,
    InstallSource, InstalledRecord, Key, Needed, PackageId, PackageRecord, Provide, RepositoryId,
    Scope, Slot,
};
pub use version::{Revision, Tag, Version};
