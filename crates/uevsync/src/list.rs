//! Print a container listing.

use std::io::{self, Write};

use miette::Result;
use tracing::info;

use uevsync_blob::{BlobClient, BlobRecord};

use crate::transcript::TRANSCRIPT_ONLY;

/// One tab-separated line per blob: name, size, last modified, URL.
pub fn format_record(record: &BlobRecord) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        record.name,
        record.size,
        record.last_modified.to_rfc3339(),
        record.url
    )
}

/// List the container and print its blobs in document order.
pub async fn run(client: &BlobClient, listing_url: &str) -> Result<()> {
    let records = client
        .list(listing_url)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    print_records(&records, &mut io::stdout().lock())
        .map_err(|e| miette::miette!("failed to write listing: {}", e))
}

/// Write `records` to `out` and copy each line into the transcript.
pub fn print_records<W: Write>(records: &[BlobRecord], out: &mut W) -> io::Result<()> {
    for record in records {
        let line = format_record(record);
        writeln!(out, "{line}")?;
        info!(target: TRANSCRIPT_ONLY, "{line}");
    }
    out.flush()
}
