//! SEC EDGAR filing acquisition pipeline.
//!
//! Three stages, each independently re-runnable and idempotent against the
//! same disk state:
//!
//! 1. [`index::sync_master_index`]: materialize the quarterly master index
//!    tree locally.
//! 2. [`filings::build_filings_list`]: parse local index files into the
//!    filings list CSV.
//! 3. [`corpus::download_filings`]: download every listed filing document
//!    that is not already present.
//!
//! The filesystem is the only durable state; re-running after an interruption
//! only acts on records not yet satisfied.

pub mod corpus;
pub mod fetcher;
pub mod filings;
pub mod index;

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;

/// Run the full acquisition pipeline with a single fetcher instance.
pub async fn download_data(config: &Config) -> Result<()> {
    let fetcher = fetcher::HttpFetcher::new(config)?;

    let stats = index::sync_master_index(config, &fetcher).await?;
    info!("Index sync: {}", stats);

    let records = filings::build_filings_list(config)?;
    filings::write_filings_csv(&records, &config.filings_list_path)?;

    let stats = corpus::download_filings(config, &fetcher, &records).await?;
    info!("Filing download: {}", stats);

    Ok(())
}

/// Write `bytes` to `path` through a temp file in the same directory,
/// renaming into place on success. An interrupted write can therefore never
/// leave a truncated file at the final path.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = part_path(path);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}
