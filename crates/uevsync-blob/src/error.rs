//! Error types for blob access.

use thiserror::Error;

/// Errors that can occur when listing or fetching blobs.
#[derive(Debug, Error)]
pub enum BlobError {
    /// HTTP client could not be constructed or a request could not be built.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The listing URL could not be parsed.
    #[error("invalid listing URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    /// No blob in the listing carries the requested name.
    #[error("no blob named {name} in the container listing")]
    NotFound { name: String },
}
