//! Quarterly master index synchronizer.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::edgar::fetcher::Fetch;
use crate::edgar::write_atomic;
use crate::models::DownloadStats;
use crate::progress;

pub const QUARTERS: [&str; 4] = ["QTR1", "QTR2", "QTR3", "QTR4"];

/// The (year, quarter) tasks for a sync pass over `[start_year, end_year]`.
///
/// Every year contributes all four quarters except the final year, which
/// contributes only QTR1, since its later quarters do not exist yet at run
/// time.
/// The degenerate `start_year == end_year` range yields exactly one task.
pub fn quarter_grid(start_year: i32, end_year: i32) -> Vec<(i32, &'static str)> {
    let mut grid = Vec::new();
    for year in start_year..=end_year {
        let quarters: &[&str] = if year == end_year {
            &QUARTERS[..1]
        } else {
            &QUARTERS
        };
        for &qtr in quarters {
            grid.push((year, qtr));
        }
    }
    grid
}

pub fn master_index_url(base_url: &str, year: i32, quarter: &str) -> String {
    format!(
        "{}/edgar/full-index/{}/{}/master.idx",
        base_url.trim_end_matches('/'),
        year,
        quarter
    )
}

pub fn master_index_path(index_dir: &Path, year: i32, quarter: &str) -> PathBuf {
    index_dir
        .join(year.to_string())
        .join(quarter)
        .join("master.idx")
}

/// Ensure local presence of every quarterly master index file in the
/// configured year range.
///
/// A file that already exists is never re-fetched and charges no rate-limit
/// delay. Any single quarter's failure is logged and does not block
/// subsequent quarters.
pub async fn sync_master_index(config: &Config, fetcher: &dyn Fetch) -> Result<DownloadStats> {
    let grid = quarter_grid(config.start_year, config.end_year);
    info!(
        "Syncing {} quarterly index files into {}",
        grid.len(),
        config.index_dir.display()
    );

    let pb = progress::bar(grid.len() as u64)?;
    let mut stats = DownloadStats::default();

    for (year, quarter) in grid {
        pb.set_message(format!("Processing {}/{}", year, quarter));
        let local = master_index_path(&config.index_dir, year, quarter);

        if local.exists() {
            stats.skipped += 1;
            pb.inc(1);
            continue;
        }

        if let Some(parent) = local.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                error!("Failed to create {}: {}", parent.display(), e);
                stats.failed += 1;
                pb.inc(1);
                continue;
            }
        }

        let url = master_index_url(&config.edgar.base_url, year, quarter);
        match fetcher.fetch(&url).await {
            Ok(bytes) => match write_atomic(&local, &bytes) {
                Ok(()) => {
                    debug!("Downloaded {}/{}/master.idx", year, quarter);
                    stats.downloaded += 1;
                }
                Err(e) => {
                    error!("Failed to write {}: {}", local.display(), e);
                    stats.failed += 1;
                }
            },
            Err(e) => {
                error!("Failed to download {}/{}/master.idx: {}", year, quarter, e);
                stats.failed += 1;
            }
        }

        // Delay only charged when a network call was actually made.
        tokio::time::sleep(config.rate_limit_delay()).await;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Index sync complete. Files stored in {}",
        config.index_dir.display()
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edgar::fetcher::FetchError;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct StubFetcher {
        calls: Mutex<Vec<String>>,
        not_found: HashSet<String>,
    }

    #[async_trait]
    impl Fetch for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.not_found.contains(url) {
                return Err(FetchError::Remote {
                    url: url.to_string(),
                    status: StatusCode::NOT_FOUND,
                });
            }
            Ok(b"CIK|Company Name|Form Type|Date Filed|Filename".to_vec())
        }
    }

    fn test_config(tmp: &TempDir, start_year: i32, end_year: i32) -> Config {
        let mut config = Config {
            start_year,
            end_year,
            index_dir: tmp.path().join("edgar"),
            ..Config::default()
        };
        config.edgar.rate_limit_delay_ms = 0;
        config
    }

    #[test]
    fn grid_limits_final_year_to_first_quarter() {
        let grid = quarter_grid(2020, 2022);
        assert_eq!(grid.len(), 9);
        assert_eq!(grid[0], (2020, "QTR1"));
        assert_eq!(grid[3], (2020, "QTR4"));
        assert_eq!(grid[8], (2022, "QTR1"));
    }

    #[test]
    fn grid_degenerate_single_year() {
        assert_eq!(quarter_grid(2020, 2020), vec![(2020, "QTR1")]);
    }

    #[test]
    fn index_url_layout() {
        assert_eq!(
            master_index_url("https://www.sec.gov/Archives/", 2021, "QTR3"),
            "https://www.sec.gov/Archives/edgar/full-index/2021/QTR3/master.idx"
        );
    }

    #[tokio::test]
    async fn second_run_performs_no_network_calls() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp, 2020, 2020);
        let fetcher = StubFetcher::default();

        let stats = sync_master_index(&config, &fetcher).await.unwrap();
        assert_eq!(stats.downloaded, 1);
        assert_eq!(fetcher.calls.lock().unwrap().len(), 1);

        let stats = sync_master_index(&config, &fetcher).await.unwrap();
        assert_eq!(stats.downloaded, 0);
        assert_eq!(stats.skipped, 1);
        assert_eq!(fetcher.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_quarter_does_not_block_the_rest() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp, 2020, 2021);

        let mut fetcher = StubFetcher::default();
        fetcher.not_found.insert(master_index_url(
            &config.edgar.base_url,
            2020,
            "QTR2",
        ));

        let stats = sync_master_index(&config, &fetcher).await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.downloaded, 4);
        assert_eq!(fetcher.calls.lock().unwrap().len(), 5);
        assert!(!master_index_path(&config.index_dir, 2020, "QTR2").exists());
        assert!(master_index_path(&config.index_dir, 2021, "QTR1").exists());
    }
}
