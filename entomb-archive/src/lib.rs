//! The archive fetcher, tar+trailer archive format and unpack primitives (`spec.md` §4.7,
//! §6).

pub mod error;
pub mod fetcher;
pub mod format;

pub use error::{Error, FetchError};
pub use fetcher::{Downloader, FetchOutcome, Fetcher, DEFAULT_MAX_ATTEMPTS};
pub use format::{ArchiveTrailer, StagedFile, UnpackedEntry, UnpackedKind};
