use std::path::PathBuf;

/// Errors raised by the fetcher (`spec.md` §4.7).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("all mirrors failed for {relative_path}")]
    AllMirrorsFailed { relative_path: String },
    #[error("fetch cancelled")]
    Cancelled,
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the archive format reader/writer and unpack primitives (`spec.md` §6).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed archive trailer in {path}")]
    MalformedTrailer { path: PathBuf },
    #[error("failed to decode archive trailer")]
    TrailerDecode(#[source] serde_json::Error),
    #[error("failed to encode archive trailer")]
    TrailerEncode(#[source] serde_json::Error),
    #[error("failed to read tar entry")]
    TarRead(#[source] std::io::Error),
}
