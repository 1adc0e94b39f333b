use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One row of the filings list built from the quarterly master index files.
///
/// Field names mirror the columns of the persisted CSV
/// (`CIK,Company,Form,Date,URL`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingRecord {
    #[serde(rename = "CIK")]
    pub cik: String,
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Form")]
    pub form: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "URL")]
    pub url: String,
}

impl FilingRecord {
    /// Filing year, taken as the first four characters of the filing date.
    /// Returns `None` for malformed dates so callers can count the record as
    /// failed instead of panicking.
    pub fn filing_year(&self) -> Option<&str> {
        self.date.get(0..4)
    }

    /// Relative storage path for the filing document:
    /// `{cik}/{year}/{form}_{date}.txt`.
    pub fn relative_path(&self) -> Option<PathBuf> {
        let year = self.filing_year()?;
        let form = self.form.replace('/', "-");
        Some(
            PathBuf::from(&self.cik)
                .join(year)
                .join(format!("{}_{}.txt", form, self.date)),
        )
    }
}

/// One row of the consolidated stock list
/// (`cik,name,ticker,exchange,ipo_date`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockListRow {
    pub cik: String,
    pub name: Option<String>,
    pub ticker: String,
    pub exchange: Option<String>,
    #[serde(default)]
    pub ipo_date: Option<String>,
}

impl StockListRow {
    /// Ticker value recorded when no listing contains the CIK.
    pub const TICKER_NOT_FOUND: &'static str = "Not Found";

    pub fn has_ticker(&self) -> bool {
        self.ticker != Self::TICKER_NOT_FOUND
    }

    /// True when the row still needs an IPO date lookup.
    pub fn needs_ipo_date(&self) -> bool {
        match self.ipo_date.as_deref() {
            None | Some("") | Some(Self::TICKER_NOT_FOUND) => true,
            Some(_) => false,
        }
    }
}

/// One day of price history for a ticker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: u64,
}

/// Running counters for a download pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl std::fmt::Display for DownloadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Downloaded: {}, Skipped: {}, Failed: {}",
            self.downloaded, self.skipped, self.failed
        )
    }
}
