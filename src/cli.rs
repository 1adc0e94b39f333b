use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "secscreen")]
#[command(
    about = "Fast CLI tool for syncing SEC EDGAR filing indexes, downloading 10-K filings, and building screening data"
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full acquisition pipeline: sync indexes, build the filings list, download filings
    DownloadData {
        /// First year of the index grid (overrides SECSCREEN_START_YEAR)
        #[arg(long)]
        start_year: Option<i32>,

        /// Last year of the index grid; only its first quarter is fetched (overrides SECSCREEN_END_YEAR)
        #[arg(long)]
        end_year: Option<i32>,
    },

    /// Download missing quarterly master index files
    SyncIndex {
        /// First year of the index grid (overrides SECSCREEN_START_YEAR)
        #[arg(long)]
        start_year: Option<i32>,

        /// Last year of the index grid; only its first quarter is fetched (overrides SECSCREEN_END_YEAR)
        #[arg(long)]
        end_year: Option<i32>,
    },

    /// Parse local master index files into the filings list CSV
    BuildList,

    /// Download the filing documents named by the filings list CSV
    DownloadFilings,

    /// Build the CIK-to-ticker stock list for the downloaded corpus
    MapTickers,

    /// Fill in IPO dates and download daily price history for mapped tickers
    Prices,

    /// Extract financial metrics from downloaded filings
    Extract,

    /// Run the full processing pipeline: map tickers, prices, metric extraction
    ProcessData,
}
