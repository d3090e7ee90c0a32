//! Errors produced while parsing atoms, versions and keys.

use std::fmt;

/// Errors raised by [`crate::atom`], [`crate::version`] and [`crate::record`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The category/name key did not contain exactly one `/`.
    #[error("invalid key `{0}`: expected `category/name`")]
    InvalidKey(String),

    /// A version string did not contain at least one numeric run.
    #[error("invalid version `{0}`")]
    InvalidVersion(String),

    /// A `-r<n>` revision suffix did not parse as a non-negative integer.
    #[error("invalid revision `{0}`")]
    InvalidRevision(String),

    /// A `:slot` fragment was empty.
    #[error("invalid slot `{0}`")]
    InvalidSlot(String),

    /// An atom string could not be parsed at all.
    #[error("invalid atom `{0}`: {1}")]
    InvalidAtom(String, AtomSyntaxError),

    /// A use-flag token was neither `+flag` nor `-flag`.
    #[error("invalid use-flag dependency `{0}`")]
    InvalidUseFlag(String),
}

/// The specific reason an atom string failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AtomSyntaxError {
    /// The key portion was empty.
    EmptyKey,
    /// An operator was given with no version following it.
    MissingVersionAfterOperator,
    /// The atom ended with a dangling `:`, `#`, `~` or `[`.
    DanglingModifier,
    /// A `[use,flags]` group was never closed.
    UnterminatedUseFlags,
    /// An `or`-group (`a;b;c?`) was malformed.
    MalformedOrGroup,
}

impl fmt::Display for AtomSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AtomSyntaxError::EmptyKey => "empty key",
            AtomSyntaxError::MissingVersionAfterOperator => "operator with no version",
            AtomSyntaxError::DanglingModifier => "dangling modifier",
            AtomSyntaxError::UnterminatedUseFlags => "unterminated use-flag group",
            AtomSyntaxError::MalformedOrGroup => "malformed or-group",
        };
        f.write_str(msg)
    }
}
