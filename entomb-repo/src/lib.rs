//! Read-only repository index reader and snapshot sync contract (`spec.md` §4.2, §6).

pub mod error;
pub mod index;
pub mod snapshot;

pub use error::Error;
pub use index::RepositoryIndex;
pub use snapshot::SnapshotTransport;
