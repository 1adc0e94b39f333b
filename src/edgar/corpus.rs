//! Filing corpus downloader: ensure every listed filing document exists
//! locally.

use anyhow::Result;
use std::path::Path;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::edgar::fetcher::Fetch;
use crate::edgar::write_atomic;
use crate::models::{DownloadStats, FilingRecord};
use crate::progress;

/// Download every filing in `records` that is not already satisfied on disk.
///
/// A record whose target path exists with non-zero size is counted as
/// skipped without a network call or rate-limit delay. Every failure is
/// terminal for this run only; since failure leaves no file behind, the next
/// run's existence check re-attempts it.
pub async fn download_filings(
    config: &Config,
    fetcher: &dyn Fetch,
    records: &[FilingRecord],
) -> Result<DownloadStats> {
    info!(
        "Downloading {} filings into {}",
        records.len(),
        config.filings_dir.display()
    );

    let pb = progress::bar(records.len() as u64)?;
    let mut stats = DownloadStats::default();

    for record in records {
        let Some(relative) = record.relative_path() else {
            error!(
                "Malformed filing date '{}' for CIK {}, counting as failed",
                record.date, record.cik
            );
            stats.failed += 1;
            pb.inc(1);
            continue;
        };
        let path = config.filings_dir.join(relative);

        if is_satisfied(&path) {
            stats.skipped += 1;
            if stats.skipped % 1000 == 0 {
                debug!("Skipped {} files so far (e.g., {})", stats.skipped, path.display());
            }
            pb.inc(1);
            continue;
        }

        match download_one(fetcher, record, &path).await {
            Ok(()) => stats.downloaded += 1,
            Err(e) => {
                stats.failed += 1;
                error!("Failed to download {}: {}", record.url, e);
            }
        }

        // Rate-limit delay after every attempted network call, never after a
        // skip.
        tokio::time::sleep(config.rate_limit_delay()).await;
        pb.set_message(stats.to_string());
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Download complete. Summary: {}", stats);
    Ok(stats)
}

/// Existence with non-zero size is the sole completeness marker; an empty
/// file is treated as absent and re-downloaded.
fn is_satisfied(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

async fn download_one(
    fetcher: &dyn Fetch,
    record: &FilingRecord,
    path: &Path,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = fetcher.fetch(&record.url).await?;
    write_atomic(path, &bytes)?;
    Ok(())
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
            Ok(format!("filing body for {}", url).into_bytes())
        }
    }

    fn record(cik: &str, date: &str) -> FilingRecord {
        FilingRecord {
            cik: cik.to_string(),
            company: "Test Co".to_string(),
            form: "10-K".to_string(),
            date: date.to_string(),
            url: format!("https://www.sec.gov/Archives/edgar/data/{}/{}.txt", cik, date),
        }
    }

    fn test_config(tmp: &TempDir) -> Config {
        let mut config = Config {
            filings_dir: tmp.path().join("filings"),
            ..Config::default()
        };
        config.edgar.rate_limit_delay_ms = 0;
        config
    }

    #[tokio::test]
    async fn existing_nonempty_file_is_skipped_without_fetching() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let rec = record("0000320193", "2021-10-29");

        let path = config.filings_dir.join(rec.relative_path().unwrap());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"already here").unwrap();

        let fetcher = StubFetcher::default();
        let stats = download_filings(&config, &fetcher, &[rec]).await.unwrap();

        assert_eq!(stats, DownloadStats { downloaded: 0, skipped: 1, failed: 0 });
        assert!(fetcher.calls.lock().unwrap().is_empty());
        assert_eq!(std::fs::read(&path).unwrap(), b"already here");
    }

    #[tokio::test]
    async fn empty_file_is_downloaded_again() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let rec = record("0000320193", "2021-10-29");

        let path = config.filings_dir.join(rec.relative_path().unwrap());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"").unwrap();

        let fetcher = StubFetcher::default();
        let stats = download_filings(&config, &fetcher, &[rec]).await.unwrap();

        assert_eq!(stats.downloaded, 1);
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[tokio::test]
    async fn one_failure_does_not_block_later_records() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let records = vec![
            record("0000000001", "2020-01-01"),
            record("0000000002", "2020-02-02"),
            record("0000000003", "2020-03-03"),
        ];

        let mut fetcher = StubFetcher::default();
        fetcher.not_found.insert(records[1].url.clone());

        let stats = download_filings(&config, &fetcher, &records).await.unwrap();

        assert_eq!(stats, DownloadStats { downloaded: 2, skipped: 0, failed: 1 });
        // all three were attempted, in order
        let calls = fetcher.calls.lock().unwrap();
        assert_eq!(*calls, records.iter().map(|r| r.url.clone()).collect::<Vec<_>>());
        assert!(!config
            .filings_dir
            .join(records[1].relative_path().unwrap())
            .exists());
    }

    #[tokio::test]
    async fn rerun_after_partial_failure_converges() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let records = vec![
            record("0000000001", "2020-01-01"),
            record("0000000002", "2020-02-02"),
            record("0000000003", "2020-03-03"),
        ];

        // first run: the middle record fails
        let mut failing = StubFetcher::default();
        failing.not_found.insert(records[1].url.clone());
        let stats = download_filings(&config, &failing, &records).await.unwrap();
        assert_eq!(stats, DownloadStats { downloaded: 2, skipped: 0, failed: 1 });

        // second run: only the unsatisfied record is fetched
        let fetcher = StubFetcher::default();
        let stats = download_filings(&config, &fetcher, &records).await.unwrap();
        assert_eq!(stats, DownloadStats { downloaded: 1, skipped: 2, failed: 0 });
        assert_eq!(*fetcher.calls.lock().unwrap(), vec![records[1].url.clone()]);

        for rec in &records {
            let path = config.filings_dir.join(rec.relative_path().unwrap());
            assert!(std::fs::metadata(&path).unwrap().len() > 0);
        }

        // third run: nothing left to do
        let idle = StubFetcher::default();
        let stats = download_filings(&config, &idle, &records).await.unwrap();
        assert_eq!(stats, DownloadStats { downloaded: 0, skipped: 3, failed: 0 });
        assert!(idle.calls.lock().unwrap().is_empty());
    }
}
