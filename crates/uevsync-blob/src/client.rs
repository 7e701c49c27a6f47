//! HTTP client for anonymous container access.

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, Url};
use tracing::{debug, error, info, warn};

use crate::{BlobError, BlobRecord, parse_listing};

/// Storage service version header sent with downloads.
pub const X_MS_VERSION_HEADER: &str = "x-ms-version";

/// Storage service version pinned for downloads.
pub const X_MS_VERSION: &str = "2017-11-09";

/// Client for listing and downloading blobs from a public container.
pub struct BlobClient {
    http: Client,
}

impl BlobClient {
    /// Create a client that relies on the platform's default timeouts.
    pub fn new() -> Result<Self, BlobError> {
        let http = Client::builder()
            .user_agent(concat!("uevsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    /// Create a client with an overall per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, BlobError> {
        let http = Client::builder()
            .user_agent(concat!("uevsync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    /// List the blobs of a container.
    ///
    /// Network failures (unreachable host, timeout, non-success status,
    /// truncated body) are logged and produce an empty listing. An invalid
    /// listing URL is returned as an error.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, listing_url: &str) -> Result<Vec<BlobRecord>, BlobError> {
        let url = Url::parse(listing_url).map_err(|e| {
            error!(error = %e, "listing URL is not valid");
            BlobError::InvalidUrl {
                url: listing_url.to_string(),
                message: e.to_string(),
            }
        })?;
        let container_url = container_url(&url);

        let body = match self.fetch_listing(url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "failed to list container, continuing without blobs");
                return Ok(Vec::new());
            }
        };

        let records = parse_listing(&body, &container_url);
        info!(count = records.len(), "listed container");
        Ok(records)
    }

    async fn fetch_listing(&self, url: Url) -> Result<String, reqwest::Error> {
        self.http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }

    /// Download a blob's content verbatim to `dest`.
    ///
    /// On failure nothing is left at `dest`.
    #[tracing::instrument(skip(self, record), fields(name = %record.name))]
    pub async fn download(&self, record: &BlobRecord, dest: &Path) -> Result<(), BlobError> {
        let bytes = self
            .http
            .get(&record.url)
            .header(X_MS_VERSION_HEADER, X_MS_VERSION)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        if let Err(e) = tokio::fs::write(dest, &bytes).await {
            // A partial write would be mistaken for the script on the next step
            let _ = tokio::fs::remove_file(dest).await;
            return Err(e.into());
        }

        debug!(path = %dest.display(), bytes = bytes.len(), "downloaded blob");
        Ok(())
    }
}

/// The container URL is the listing URL without its query string.
fn container_url(listing_url: &Url) -> String {
    let mut url = listing_url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.to_string().trim_end_matches('/').to_string()
}
