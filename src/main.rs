use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

mod cli;
mod config;
mod edgar;
mod extract;
mod models;
mod prices;
mod progress;
mod tickers;

use cli::{Cli, Commands};
use config::Config;
use edgar::fetcher::HttpFetcher;
use prices::YahooFinanceProvider;

#[tokio::main]
async fn main() -> Result<()> {
    // Set default log level to INFO if not specified
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "secscreen=info");
    }

    // Initialize logging to both console and file
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let file_appender = tracing_appender::rolling::never(".", "secscreen.log");

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::from_default_env()),
        )
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_filter(EnvFilter::from_default_env()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match &cli.command {
        Commands::DownloadData {
            start_year,
            end_year,
        } => {
            apply_year_overrides(&mut config, *start_year, *end_year);
            config.validate()?;
            info!(
                "Starting data download for {}-{}",
                config.start_year, config.end_year
            );
            match edgar::download_data(&config).await {
                Ok(()) => info!("Data download complete"),
                Err(e) => error!("Data download failed: {}", e),
            }
        }

        Commands::SyncIndex {
            start_year,
            end_year,
        } => {
            apply_year_overrides(&mut config, *start_year, *end_year);
            config.validate()?;
            let fetcher = HttpFetcher::new(&config)?;
            match edgar::index::sync_master_index(&config, &fetcher).await {
                Ok(stats) => info!("Index sync complete: {}", stats),
                Err(e) => error!("Index sync failed: {}", e),
            }
        }

        Commands::BuildList => {
            config.validate()?;
            match edgar::filings::build_filings_list(&config).and_then(|records| {
                edgar::filings::write_filings_csv(&records, &config.filings_list_path)
            }) {
                Ok(()) => info!("Filings list written to {}", config.filings_list_path.display()),
                Err(e) => error!("Building filings list failed: {}", e),
            }
        }

        Commands::DownloadFilings => {
            config.validate()?;
            let fetcher = HttpFetcher::new(&config)?;
            let result = match edgar::filings::read_filings_csv(&config.filings_list_path) {
                Ok(records) => edgar::corpus::download_filings(&config, &fetcher, &records).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(stats) => info!("Filing download complete: {}", stats),
                Err(e) => error!("Filing download failed: {}", e),
            }
        }

        Commands::MapTickers => {
            config.validate()?;
            let fetcher = HttpFetcher::new(&config)?;
            match tickers::generate_cik_ticker_mapping(&config, &fetcher).await {
                Ok(rows) => info!("Mapped {} CIKs", rows),
                Err(e) => error!("Ticker mapping failed: {}", e),
            }
        }

        Commands::Prices => {
            config.validate()?;
            let provider = YahooFinanceProvider::new(&config)?;
            match run_price_stage(&config, &provider).await {
                Ok(()) => info!("Price download complete"),
                Err(e) => error!("Price download failed: {}", e),
            }
        }

        Commands::Extract => {
            config.validate()?;
            match extract::extract_corpus(&config).await {
                Ok(count) => info!("Extracted metrics from {} filings", count),
                Err(e) => error!("Metric extraction failed: {}", e),
            }
        }

        Commands::ProcessData => {
            config.validate()?;
            info!("Starting data processing");
            match process_data(&config).await {
                Ok(()) => info!("Data processing complete"),
                Err(e) => error!("Data processing failed: {}", e),
            }
        }
    }

    Ok(())
}

fn apply_year_overrides(config: &mut Config, start_year: Option<i32>, end_year: Option<i32>) {
    if let Some(year) = start_year {
        config.start_year = year;
    }
    if let Some(year) = end_year {
        config.end_year = year;
    }
}

async fn run_price_stage(config: &Config, provider: &YahooFinanceProvider) -> Result<()> {
    let resolved = prices::update_ipo_dates(config, provider).await?;
    info!("Resolved {} IPO dates", resolved);
    let stats = prices::download_daily_prices(config, provider).await?;
    info!("Daily prices: {}", stats);
    Ok(())
}

async fn process_data(config: &Config) -> Result<()> {
    let fetcher = HttpFetcher::new(config)?;
    tickers::generate_cik_ticker_mapping(config, &fetcher).await?;

    let provider = YahooFinanceProvider::new(config)?;
    run_price_stage(config, &provider).await?;

    let extracted = extract::extract_corpus(config).await?;
    info!("Extracted metrics from {} filings", extracted);
    Ok(())
}
