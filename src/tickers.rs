//! CIK-to-ticker mapping for the downloaded filing corpus.
//!
//! The SEC publishes two listing files: a structured JSON listing with
//! exchange information and a flat tab-separated fallback. The mapping is
//! built for every CIK present in the corpus directory, preferring the
//! structured listing and falling back to the flat one for CIKs it misses.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::Config;
use crate::edgar::fetcher::Fetch;
use crate::edgar::write_atomic;
use crate::models::StockListRow;

const TICKER_EXCHANGE_URL: &str = "https://www.sec.gov/files/company_tickers_exchange.json";
const TICKER_FALLBACK_URL: &str = "https://www.sec.gov/include/ticker.txt";

/// Structured listing: `fields` names the row columns, `data` holds
/// positional rows (cik, ticker, name, exchange).
#[derive(Debug, Deserialize)]
struct TickerExchangeListing {
    #[allow(dead_code)]
    fields: Vec<String>,
    data: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ListingEntry {
    ticker: String,
    name: Option<String>,
    exchange: Option<String>,
}

/// Build the consolidated stock list CSV for every CIK with downloaded
/// filings. Returns the number of rows written.
pub async fn generate_cik_ticker_mapping(config: &Config, fetcher: &dyn Fetch) -> Result<usize> {
    let json_path = ensure_listing(
        config,
        fetcher,
        "company_tickers_exchange.json",
        TICKER_EXCHANGE_URL,
    )
    .await?;
    let txt_path = ensure_listing(config, fetcher, "ticker.txt", TICKER_FALLBACK_URL).await?;

    let ciks = corpus_ciks(&config.filings_dir)?;
    info!("Mapping {} corpus CIKs to tickers", ciks.len());

    let json_text = std::fs::read_to_string(&json_path)
        .with_context(|| format!("Failed to read {}", json_path.display()))?;
    let primary = parse_ticker_exchange_listing(&json_text)?;

    let txt_text = std::fs::read_to_string(&txt_path)
        .with_context(|| format!("Failed to read {}", txt_path.display()))?;
    let fallback = parse_fallback_listing(&txt_text);

    let rows = merge_mappings(&ciks, &primary, &fallback);
    write_stock_list(&rows, &config.stock_list_path)?;

    info!(
        "Saved mapping for {} rows to {}",
        rows.len(),
        config.stock_list_path.display()
    );
    Ok(rows.len())
}

/// Download a listing file into the data directory unless already present.
async fn ensure_listing(
    config: &Config,
    fetcher: &dyn Fetch,
    name: &str,
    url: &str,
) -> Result<PathBuf> {
    let path = config.data_dir.join(name);
    if path.exists() {
        return Ok(path);
    }
    info!("Fetching {} from {}", name, url);
    let bytes = fetcher
        .fetch(url)
        .await
        .with_context(|| format!("Failed to fetch listing {}", url))?;
    write_atomic(&path, &bytes)?;
    tokio::time::sleep(config.rate_limit_delay()).await;
    Ok(path)
}

/// The corpus directory's top-level folders are the CIKs with downloaded
/// filings, zero-padded here to the canonical 10 digits.
fn corpus_ciks(filings_dir: &Path) -> Result<Vec<String>> {
    let mut ciks = Vec::new();
    let entries = std::fs::read_dir(filings_dir)
        .with_context(|| format!("Failed to list corpus directory {}", filings_dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        match entry.file_name().to_str() {
            Some(name) => ciks.push(format!("{:0>10}", name)),
            None => warn!("Skipping non-UTF-8 corpus directory name"),
        }
    }
    ciks.sort();
    Ok(ciks)
}

fn parse_ticker_exchange_listing(text: &str) -> Result<HashMap<String, ListingEntry>> {
    let listing: TickerExchangeListing =
        serde_json::from_str(text).context("Failed to parse ticker/exchange listing")?;
    if listing.data.is_empty() {
        anyhow::bail!("Ticker/exchange listing contains no data rows");
    }

    let mut map = HashMap::new();
    for row in &listing.data {
        let Some(cik) = row.first().and_then(cik_value) else {
            continue;
        };
        let Some(ticker) = row.get(1).and_then(|v| v.as_str()) else {
            continue;
        };
        map.entry(cik).or_insert(ListingEntry {
            ticker: ticker.to_string(),
            name: row.get(2).and_then(|v| v.as_str()).map(str::to_string),
            exchange: row.get(3).and_then(|v| v.as_str()).map(str::to_string),
        });
    }
    Ok(map)
}

/// CIK values appear both as JSON numbers and as strings across listing
/// vintages.
fn cik_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().map(|n| format!("{:010}", n)),
        serde_json::Value::String(s) => Some(format!("{:0>10}", s.trim())),
        _ => None,
    }
}

/// Flat fallback listing: one `ticker<TAB>cik` pair per line.
fn parse_fallback_listing(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let mut parts = line.trim().split('\t');
        let (Some(ticker), Some(cik)) = (parts.next(), parts.next()) else {
            continue;
        };
        if ticker.is_empty() || cik.is_empty() {
            continue;
        }
        map.entry(format!("{:0>10}", cik.trim()))
            .or_insert_with(|| ticker.trim().to_string());
    }
    map
}

fn merge_mappings(
    ciks: &[String],
    primary: &HashMap<String, ListingEntry>,
    fallback: &HashMap<String, String>,
) -> Vec<StockListRow> {
    ciks.iter()
        .map(|cik| match primary.get(cik) {
            Some(entry) => StockListRow {
                cik: cik.clone(),
                name: entry.name.clone(),
                ticker: entry.ticker.clone(),
                exchange: entry.exchange.clone(),
                ipo_date: None,
            },
            None => StockListRow {
                cik: cik.clone(),
                name: None,
                ticker: fallback
                    .get(cik)
                    .cloned()
                    .unwrap_or_else(|| StockListRow::TICKER_NOT_FOUND.to_string()),
                exchange: None,
                ipo_date: None,
            },
        })
        .collect()
}

pub fn write_stock_list(rows: &[StockListRow], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_stock_list(path: &Path) -> Result<Vec<StockListRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open stock list {}", path.display()))?;
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        rows.push(result?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LISTING_JSON: &str = r#"{
        "fields": ["cik", "ticker", "name", "exchange"],
        "data": [
            [320193, "AAPL", "Apple Inc.", "Nasdaq"],
            ["789019", "MSFT", "Microsoft Corp", "Nasdaq"],
            [1018724, "AMZN", "Amazon.com Inc", null]
        ]
    }"#;

    #[test]
    fn parses_numeric_and_string_ciks() {
        let map = parse_ticker_exchange_listing(LISTING_JSON).unwrap();
        assert_eq!(map["0000320193"].ticker, "AAPL");
        assert_eq!(map["0000789019"].ticker, "MSFT");
        assert_eq!(map["0001018724"].exchange, None);
        assert_eq!(map["0000320193"].name.as_deref(), Some("Apple Inc."));
    }

    #[test]
    fn empty_listing_is_an_error() {
        assert!(parse_ticker_exchange_listing(r#"{"fields": [], "data": []}"#).is_err());
    }

    #[test]
    fn parses_fallback_pairs() {
        let map = parse_fallback_listing("aapl\t320193\nmsft\t789019\nbroken-line\n");
        assert_eq!(map.len(), 2);
        assert_eq!(map["0000320193"], "aapl");
    }

    #[test]
    fn merge_prefers_structured_listing_over_fallback() {
        let primary = parse_ticker_exchange_listing(LISTING_JSON).unwrap();
        let fallback = parse_fallback_listing("aapl-old\t320193\nibm\t51143\n");
        let ciks = vec![
            "0000320193".to_string(), // in both listings
            "0000051143".to_string(), // fallback only
            "0000000042".to_string(), // in neither
        ];

        let rows = merge_mappings(&ciks, &primary, &fallback);
        assert_eq!(rows[0].ticker, "AAPL");
        assert_eq!(rows[1].ticker, "ibm");
        assert_eq!(rows[1].name, None);
        assert_eq!(rows[2].ticker, StockListRow::TICKER_NOT_FOUND);
        assert!(!rows[2].has_ticker());
    }

    #[test]
    fn corpus_ciks_are_padded_and_sorted() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("320193")).unwrap();
        std::fs::create_dir_all(tmp.path().join("51143")).unwrap();
        std::fs::write(tmp.path().join("stray_file.txt"), b"x").unwrap();

        let ciks = corpus_ciks(tmp.path()).unwrap();
        assert_eq!(ciks, vec!["0000051143".to_string(), "0000320193".to_string()]);
    }

    #[test]
    fn stock_list_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stock_list.csv");
        let rows = vec![
            StockListRow {
                cik: "0000320193".to_string(),
                name: Some("Apple Inc.".to_string()),
                ticker: "AAPL".to_string(),
                exchange: Some("Nasdaq".to_string()),
                ipo_date: Some("1980-12-12".to_string()),
            },
            StockListRow {
                cik: "0000000042".to_string(),
                name: None,
                ticker: StockListRow::TICKER_NOT_FOUND.to_string(),
                exchange: None,
                ipo_date: None,
            },
        ];

        write_stock_list(&rows, &path).unwrap();
        assert_eq!(read_stock_list(&path).unwrap(), rows);
    }
}
