//! Script selection and download.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::{BlobClient, BlobError, BlobRecord};

/// Result of fetching a script into the target directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedScript {
    /// The listing entry that was selected.
    pub record: BlobRecord,
    /// Where the script lives (or would live) on disk.
    pub path: PathBuf,
    /// Whether the download succeeded.
    pub downloaded: bool,
}

/// Pick the first record whose name matches exactly.
pub fn select_record<'a>(records: &'a [BlobRecord], name: &str) -> Option<&'a BlobRecord> {
    records.iter().find(|r| r.name == name)
}

/// Select `name` from `records` and download it into `target_dir`.
///
/// The directory is created if needed. A missing record is an error; a
/// failed download is logged and reported through [`FetchedScript::downloaded`]
/// so the caller can still proceed with the expected path.
#[tracing::instrument(skip(client, records, target_dir), fields(target_dir = %target_dir.display()))]
pub async fn fetch_script(
    client: &BlobClient,
    records: &[BlobRecord],
    name: &str,
    target_dir: &Path,
) -> Result<FetchedScript, BlobError> {
    let record = select_record(records, name).ok_or_else(|| BlobError::NotFound {
        name: name.to_string(),
    })?;

    tokio::fs::create_dir_all(target_dir).await?;
    let path = target_dir.join(&record.name);

    let downloaded = match client.download(record, &path).await {
        Ok(()) => {
            info!(path = %path.display(), size = record.size, "downloaded script");
            true
        }
        Err(e) => {
            warn!(url = %record.url, error = %e, "failed to download script, continuing");
            false
        }
    };

    Ok(FetchedScript {
        record: record.clone(),
        path,
        downloaded,
    })
}
