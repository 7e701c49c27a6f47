//! Blob listing types.

use chrono::{DateTime, Utc};

/// One entry of a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRecord {
    /// Blob name, unique within the container.
    pub name: String,
    /// Absolute URL the blob can be downloaded from anonymously.
    pub url: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time reported by the service.
    pub last_modified: DateTime<Utc>,
}
