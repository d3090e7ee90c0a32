//! Errors surfaced by the resolver and both dependency solvers.

use entomb_types::PackageId;
use thiserror::Error;

/// Why an atom resolution attempt failed.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ResolveError {
    #[error("no repository carries a visible candidate for {0}")]
    NotFound(String),
    #[error("atom {0} failed to parse")]
    InvalidAtom(String),
}

/// Why a forward or reverse solve could not produce a usable plan.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SolveError {
    #[error("{0} unresolved dependency atoms")]
    MissingDependencies(usize),
    #[error("installed id {0:?} has no entry in the installed registry")]
    UnknownInstalledId(PackageId),
}
