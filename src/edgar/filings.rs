//! Filing list builder: local master index files in, filings list CSV out.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::config::Config;
use crate::edgar::index;
use crate::models::FilingRecord;
use crate::progress;

/// The master index format opens with a fixed 11-line header block before the
/// pipe-delimited rows (`CIK|Company Name|Form Type|Date Filed|Filename`).
const PREAMBLE_LINES: usize = 11;

/// Parse every locally-present quarterly index file in the configured year
/// range into filing records for the target form type.
///
/// Quarters whose index file is absent are silently skipped. Duplicate
/// filings appearing in more than one quarterly index are preserved.
pub fn build_filings_list(config: &Config) -> Result<Vec<FilingRecord>> {
    let mut present = Vec::new();
    for year in config.start_year..=config.end_year {
        for qtr in index::QUARTERS {
            let path = index::master_index_path(&config.index_dir, year, qtr);
            if path.exists() {
                present.push((year, qtr, path));
            }
        }
    }

    info!("Parsing {} master index files", present.len());
    let pb = progress::bar(present.len() as u64)?;

    let mut records = Vec::new();
    for (year, qtr, path) in present {
        pb.set_message(format!("Parsing {}/{}", year, qtr));
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read index file {}", path.display()))?;
        let text = decode_latin1(&bytes);
        records.extend(parse_master_index(
            &text,
            &config.edgar.base_url,
            &config.form_type,
        ));
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Built filings list with {} records", records.len());
    Ok(records)
}

/// Decode index bytes as Latin-1. Legacy index files carry single-byte
/// company names that are not valid UTF-8, and the parse must not fail on
/// them.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn parse_master_index(text: &str, base_url: &str, form_type: &str) -> Vec<FilingRecord> {
    let base = base_url.trim_end_matches('/');
    text.lines()
        .skip(PREAMBLE_LINES)
        .filter_map(|line| {
            let parts: Vec<&str> = line.trim().split('|').collect();
            if parts.len() < 5 || parts[2] != form_type {
                return None;
            }
            Some(FilingRecord {
                cik: format!("{:0>10}", parts[0]),
                company: parts[1].to_string(),
                form: parts[2].to_string(),
                date: parts[3].to_string(),
                url: format!("{}/{}", base, parts[4].trim_start_matches('/')),
            })
        })
        .collect()
}

/// Persist the filings list so the corpus download stage can run on its own.
pub fn write_filings_csv(records: &[FilingRecord], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    info!("Wrote {} filing records to {}", records.len(), path.display());
    Ok(())
}

pub fn read_filings_csv(path: &Path) -> Result<Vec<FilingRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open filings list {}", path.display()))?;
    let mut records = Vec::new();
    for result in reader.deserialize() {
        records.push(result?);
    }
    Ok(records)
}
