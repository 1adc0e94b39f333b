//! Ticker price history: IPO-date discovery and daily price backfill.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{DailyBar, DownloadStats, StockListRow};
use crate::progress;
use crate::tickers::{read_stock_list, write_stock_list};

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Market-data lookup seam. Tests substitute a stub; production uses
/// [`YahooFinanceProvider`].
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Daily price history for `ticker` from `start` (or the full listed
    /// range when `None`) to the present, oldest bar first.
    async fn daily_history(&self, ticker: &str, start: Option<NaiveDate>)
        -> Result<Vec<DailyBar>>;
}

/// Price provider backed by the Yahoo Finance v8 chart endpoint.
pub struct YahooFinanceProvider {
    client: Client,
}

impl YahooFinanceProvider {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.edgar.user_agent.as_str())
            .timeout(config.http_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PriceProvider for YahooFinanceProvider {
    async fn daily_history(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
    ) -> Result<Vec<DailyBar>> {
        let url = match start {
            Some(date) => {
                let period1 = date.and_time(NaiveTime::MIN).and_utc().timestamp();
                let period2 = chrono::Utc::now().timestamp();
                format!(
                    "{}/{}?interval=1d&period1={}&period2={}",
                    YAHOO_CHART_URL, ticker, period1, period2
                )
            }
            None => format!("{}/{}?interval=1d&range=max", YAHOO_CHART_URL, ticker),
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Chart request failed for {}", ticker))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Chart request for {} returned HTTP {}", ticker, status);
        }

        let body: ChartResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse chart response for {}", ticker))?;
        let result = body
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .with_context(|| format!("No chart data for {}", ticker))?;

        Ok(to_bars(result))
    }
}

// de
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

/// Quote arrays carry `null` entries for non-trading sessions.
#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn to_bars(result: ChartResult) -> Vec<DailyBar> {
    let quote = match result.indicators.quote.first() {
        Some(quote) => quote,
        None => return Vec::new(),
    };
    let adjclose = result.indicators.adjclose.first();

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let Some(date) = chrono::DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive()) else {
            continue;
        };
        let (Some(open), Some(high), Some(low), Some(close)) = (
            value_at(&quote.open, i),
            value_at(&quote.high, i),
            value_at(&quote.low, i),
            value_at(&quote.close, i),
        ) else {
            continue;
        };
        bars.push(DailyBar {
            date,
            open,
            high,
            low,
            close,
            adj_close: adjclose
                .and_then(|a| value_at(&a.adjclose, i))
                .unwrap_or(close),
            volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
        });
    }
    bars
}

fn value_at(values: &[Option<f64>], i: usize) -> Option<f64> {
    values.get(i).copied().flatten()
}

// stages
// ----------------------------------------------------------------------------

/// Fill in the IPO date for every stock-list row that still needs one,
/// rewriting the stock list CSV in place. The IPO date is the first bar of
/// the maximum-range history; tickers with no data are marked `Not Found`
/// and not retried within the run. Returns the number of dates resolved.
pub async fn update_ipo_dates(config: &Config, provider: &dyn PriceProvider) -> Result<usize> {
    let mut rows = read_stock_list(&config.stock_list_path)?;
    let pending: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.has_ticker() && row.needs_ipo_date())
        .map(|(i, _)| i)
        .collect();

    info!("Fetching IPO dates for {} tickers", pending.len());
    let pb = progress::bar(pending.len() as u64)?;
    let mut resolved = 0;

    for i in pending {
        let ticker = rows[i].ticker.clone();
        pb.set_message(format!("Fetching IPO date for {}", ticker));

        let ipo_date = match provider.daily_history(&ticker, None).await {
            Ok(bars) => match bars.first() {
                Some(bar) => bar.date.format("%Y-%m-%d").to_string(),
                None => StockListRow::TICKER_NOT_FOUND.to_string(),
            },
            Err(e) => {
                warn!("Failed to fetch history for {}: {}", ticker, e);
                StockListRow::TICKER_NOT_FOUND.to_string()
            }
        };
        if ipo_date != StockListRow::TICKER_NOT_FOUND {
            resolved += 1;
        }
        rows[i].ipo_date = Some(ipo_date);
        pb.inc(1);
    }

    pb.finish_and_clear();
    write_stock_list(&rows, &config.stock_list_path)?;
    info!(
        "Updated {} with IPO dates ({} resolved)",
        config.stock_list_path.display(),
        resolved
    );
    Ok(resolved)
}

/// Download daily price history since IPO for every stock-list row with a
/// valid IPO date, one CSV per ticker. Tickers whose CSV already exists are
/// skipped, making the pass resumable.
pub async fn download_daily_prices(
    config: &Config,
    provider: &dyn PriceProvider,
) -> Result<DownloadStats> {
    std::fs::create_dir_all(&config.prices_dir)?;
    let rows = read_stock_list(&config.stock_list_path)?;

    let candidates: Vec<(&StockListRow, NaiveDate)> = rows
        .iter()
        .filter(|row| row.has_ticker())
        .filter_map(|row| {
            let ipo = row.ipo_date.as_deref()?;
            let start = NaiveDate::parse_from_str(ipo, "%Y-%m-%d").ok()?;
            Some((row, start))
        })
        .collect();

    info!("Downloading daily prices for {} tickers", candidates.len());
    let pb = progress::bar(candidates.len() as u64)?;
    let mut stats = DownloadStats::default();

    for (row, start) in candidates {
        let out_path = config.prices_dir.join(format!("{}.csv", row.ticker));
        if out_path.exists() {
            stats.skipped += 1;
            pb.inc(1);
            continue;
        }
        pb.set_message(format!("Downloading {}", row.ticker));

        match provider.daily_history(&row.ticker, Some(start)).await {
            Ok(bars) if bars.is_empty() => {
                warn!("No data for {}", row.ticker);
                stats.failed += 1;
            }
            Ok(bars) => match write_price_csv(&out_path, &bars) {
                Ok(()) => stats.downloaded += 1,
                Err(e) => {
                    warn!("Failed to write prices for {}: {}", row.ticker, e);
                    stats.failed += 1;
                }
            },
            Err(e) => {
                warn!("Error downloading {}: {}", row.ticker, e);
                stats.failed += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Daily stock prices saved to {}. {}",
        config.prices_dir.display(),
        stats
    );
    Ok(stats)
}

fn write_price_csv(path: &std::path::Path, bars: &[DailyBar]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for bar in bars {
        writer.serialize(bar)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const SAMPLE_CHART: &str = r#"{
        "chart": {
            "result": [{
                "timestamp": [345427800, 345514200, 345600600],
                "indicators": {
                    "quote": [{
                        "open": [0.51, null, 0.53],
                        "high": [0.52, null, 0.54],
                        "low": [0.50, null, 0.52],
                        "close": [0.51, null, 0.53],
                        "volume": [117258400, null, 43971200]
                    }],
                    "adjclose": [{"adjclose": [0.40, null, 0.41]}]
                }
            }],
            "error": null
        }
    }"#;

    struct StubProvider {
        bars: Vec<DailyBar>,
        calls: Mutex<Vec<(String, Option<NaiveDate>)>>,
    }

    impl StubProvider {
        fn new(bars: Vec<DailyBar>) -> Self {
            Self {
                bars,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PriceProvider for StubProvider {
        async fn daily_history(
            &self,
            ticker: &str,
            start: Option<NaiveDate>,
        ) -> Result<Vec<DailyBar>> {
            self.calls.lock().unwrap().push((ticker.to_string(), start));
            Ok(self.bars.clone())
        }
    }

    fn bar_on(date: &str) -> DailyBar {
        DailyBar {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            adj_close: 1.4,
            volume: 1000,
        }
    }

    fn row(ticker: &str, ipo_date: Option<&str>) -> StockListRow {
        StockListRow {
            cik: "0000000001".to_string(),
            name: None,
            ticker: ticker.to_string(),
            exchange: None,
            ipo_date: ipo_date.map(str::to_string),
        }
    }

    #[test]
    fn chart_response_deserialization_drops_null_sessions() {
        let response: ChartResponse = serde_json::from_str(SAMPLE_CHART).unwrap();
        let result = response.chart.result.unwrap().into_iter().next().unwrap();
        let bars = to_bars(result);

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(1980, 12, 12).unwrap());
        assert_eq!(bars[0].close, 0.51);
        assert_eq!(bars[0].adj_close, 0.40);
        assert_eq!(bars[1].volume, 43971200);
    }

    #[tokio::test]
    async fn ipo_dates_filled_from_first_bar() {
        let tmp = TempDir::new().unwrap();
        let config = Config {
            stock_list_path: tmp.path().join("stock_list.csv"),
            ..Config::default()
        };
        let rows = vec![
            row("AAPL", None),
            row("MSFT", Some("1986-03-13")),
            row(StockListRow::TICKER_NOT_FOUND, None),
        ];
        write_stock_list(&rows, &config.stock_list_path).unwrap();

        let provider = StubProvider::new(vec![bar_on("1980-12-12"), bar_on("1980-12-15")]);
        let resolved = update_ipo_dates(&config, &provider).await.unwrap();

        assert_eq!(resolved, 1);
        // only AAPL was looked up: MSFT already had a date, "Not Found" has no ticker
        assert_eq!(
            *provider.calls.lock().unwrap(),
            vec![("AAPL".to_string(), None)]
        );
        let rows = read_stock_list(&config.stock_list_path).unwrap();
        assert_eq!(rows[0].ipo_date.as_deref(), Some("1980-12-12"));
        assert_eq!(rows[1].ipo_date.as_deref(), Some("1986-03-13"));
    }

    #[tokio::test]
    async fn empty_history_marks_ticker_not_found() {
        let tmp = TempDir::new().unwrap();
        let config = Config {
            stock_list_path: tmp.path().join("stock_list.csv"),
            ..Config::default()
        };
        write_stock_list(&[row("GONE", None)], &config.stock_list_path).unwrap();

        let provider = StubProvider::new(Vec::new());
        let resolved = update_ipo_dates(&config, &provider).await.unwrap();

        assert_eq!(resolved, 0);
        let rows = read_stock_list(&config.stock_list_path).unwrap();
        assert_eq!(rows[0].ipo_date.as_deref(), Some(StockListRow::TICKER_NOT_FOUND));
    }

    #[tokio::test]
    async fn existing_price_files_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let config = Config {
            stock_list_path: tmp.path().join("stock_list.csv"),
            prices_dir: tmp.path().join("prices"),
            ..Config::default()
        };
        let rows = vec![
            row("AAPL", Some("1980-12-12")),
            row("MSFT", Some("1986-03-13")),
            row("PEND", Some(StockListRow::TICKER_NOT_FOUND)),
        ];
        write_stock_list(&rows, &config.stock_list_path).unwrap();

        std::fs::create_dir_all(&config.prices_dir).unwrap();
        std::fs::write(config.prices_dir.join("AAPL.csv"), b"date,open\n").unwrap();

        let provider = StubProvider::new(vec![bar_on("1986-03-13")]);
        let stats = download_daily_prices(&config, &provider).await.unwrap();

        assert_eq!(stats, DownloadStats { downloaded: 1, skipped: 1, failed: 0 });
        // the unparseable IPO date row never became a candidate
        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "MSFT");
        assert_eq!(
            calls[0].1,
            Some(NaiveDate::from_ymd_opt(1986, 3, 13).unwrap())
        );
        assert!(config.prices_dir.join("MSFT.csv").exists());
    }
}
