//! Financial metric extraction over the downloaded filing corpus.
//!
//! Two extraction passes per filing: structured XBRL facts when the document
//! embeds them, and an LLM call for what XBRL did not yield. Results are
//! cached on disk by (CIK, year) so re-runs only touch new filings.

pub mod cache;
pub mod llm;
pub mod xbrl;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::progress;
use cache::MetricsCache;
use llm::LlmExtractor;

/// Named financial metrics mapped to numeric values.
pub type MetricMap = HashMap<String, f64>;

pub struct FinancialExtractor {
    cache: MetricsCache,
    llm: LlmExtractor,
}

impl FinancialExtractor {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            cache: MetricsCache::new(config.llm.cache_dir.clone()),
            llm: LlmExtractor::new(config)?,
        })
    }

    /// Extract metrics for one filing, consulting the cache first.
    pub async fn extract_filing(&self, cik: &str, year: i32, path: &Path) -> Result<MetricMap> {
        if let Some(cached) = self.cache.load(cik, year) {
            debug!("Loaded cached metrics for {}_{}", cik, year);
            return Ok(cached);
        }

        info!("Extracting financial metrics for {}_{}", cik, year);
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read filing {}", path.display()))?;
        // legacy filings are not guaranteed to be valid UTF-8
        let content = String::from_utf8_lossy(&bytes);

        let xbrl_metrics = xbrl::extract_metrics(&content, year);
        let llm_metrics = self.llm.extract(&content).await;
        let combined = combine_metrics(xbrl_metrics, llm_metrics);

        self.cache.save(cik, year, &combined);
        Ok(combined)
    }
}

/// XBRL values are preferred as the structured source; the LLM pass only
/// fills concepts XBRL did not yield.
pub fn combine_metrics(xbrl_metrics: MetricMap, llm_metrics: MetricMap) -> MetricMap {
    let mut combined = xbrl_metrics;
    for (key, value) in llm_metrics {
        combined.entry(key).or_insert(value);
    }
    combined
}

/// Walk the filing corpus and extract metrics for every document. Returns
/// the number of filings that yielded at least one metric.
pub async fn extract_corpus(config: &Config) -> Result<usize> {
    let extractor = FinancialExtractor::new(config)?;
    let filings = corpus_filings(&config.filings_dir)?;
    info!("Extracting metrics from {} filings", filings.len());

    let pb = progress::bar(filings.len() as u64)?;
    let mut with_metrics = 0;

    for (cik, year, path) in filings {
        pb.set_message(format!("Extracting {}_{}", cik, year));
        match extractor.extract_filing(&cik, year, &path).await {
            Ok(metrics) => {
                if !metrics.is_empty() {
                    with_metrics += 1;
                }
            }
            Err(e) => warn!("Failed to extract {}: {}", path.display(), e),
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Extraction complete; {} filings yielded metrics", with_metrics);
    Ok(with_metrics)
}

/// Every filing document under the corpus tree as (cik, year, path), derived
/// from the `{cik}/{year}/{form}_{date}.txt` layout.
fn corpus_filings(filings_dir: &Path) -> Result<Vec<(String, i32, PathBuf)>> {
    let mut filings = Vec::new();
    for entry in walkdir::WalkDir::new(filings_dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        match path_components(filings_dir, path) {
            Some((cik, year)) => filings.push((cik, year, path.to_path_buf())),
            None => warn!("Skipping unrecognized corpus path: {}", path.display()),
        }
    }
    filings.sort();
    Ok(filings)
}

fn path_components(root: &Path, path: &Path) -> Option<(String, i32)> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = relative.components();
    let cik = parts.next()?.as_os_str().to_str()?.to_string();
    let year: i32 = parts.next()?.as_os_str().to_str()?.parse().ok()?;
    // the third component must be the file itself
    parts.next()?;
    Some((cik, year))
}
