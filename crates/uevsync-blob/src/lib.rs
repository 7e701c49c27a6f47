//! Anonymous blob container access for uevsync.
//!
//! This crate covers the two HTTP calls the deployment run makes:
//! - Listing a public container and projecting its entries into [`BlobRecord`]s
//! - Downloading one named script into a local directory
//!
//! Listing failures of the network kind are logged and produce an empty
//! listing. Download failures are logged and never abort the caller.

mod client;
mod error;
mod fetch;
mod listing;
mod types;

pub use client::{BlobClient, X_MS_VERSION, X_MS_VERSION_HEADER};
pub use error::BlobError;
pub use fetch::{FetchedScript, fetch_script, select_record};
pub use listing::{parse_listing, strip_preamble};
pub use types::BlobRecord;
