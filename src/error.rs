//! Error types for metadata fetching and PDF downloads.

use std::path::PathBuf;

use reqwest::StatusCode;

/// Errors from a metadata source (search API or anthology dump).
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// Connection, timeout or body decoding failure.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The source answered with a non-2xx status.
    #[error("{url} returned {status}")]
    Status { status: StatusCode, url: String },
}

/// Errors from a single PDF download attempt.
#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    /// Connection, timeout or body streaming failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The PDF host answered with a non-2xx status.
    #[error("{url} returned {status}")]
    Status { status: StatusCode, url: String },

    /// Writing the PDF to disk failed.
    #[error("could not write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Transport-level failures are worth another attempt; local disk errors are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { .. })
    }
}

/// A download that gave up, along with how many attempts were made.
#[derive(thiserror::Error, Debug)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct DownloadFailure {
    pub attempts: u32,
    #[source]
    pub error: DownloadError,
}
