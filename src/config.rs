//! Centralized configuration management for secscreen

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration.
///
/// Built once at startup and passed by reference into each pipeline stage;
/// no global state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for all data artifacts
    pub data_dir: PathBuf,
    /// Directory holding the quarterly master index tree ({year}/{qtr}/master.idx)
    pub index_dir: PathBuf,
    /// Directory holding downloaded filing documents ({cik}/{year}/{form}_{date}.txt)
    pub filings_dir: PathBuf,
    /// Path of the filings list CSV produced between stages
    pub filings_list_path: PathBuf,
    /// Path of the consolidated stock list CSV (CIK/ticker/IPO date)
    pub stock_list_path: PathBuf,
    /// Directory for per-ticker daily price CSVs
    pub prices_dir: PathBuf,
    /// First year of the index grid
    pub start_year: i32,
    /// Last year of the index grid (only QTR1 is fetched for this year)
    pub end_year: i32,
    /// Form type collected into the filings list
    pub form_type: String,
    /// EDGAR endpoint configuration
    pub edgar: EdgarConfig,
    /// HTTP client configuration
    pub http: HttpConfig,
    /// LLM extraction configuration
    pub llm: LlmConfig,
}

/// SEC EDGAR endpoint configuration.
#[derive(Debug, Clone)]
pub struct EdgarConfig {
    /// Base URL of the EDGAR archive
    pub base_url: String,
    /// Identifying User-Agent; SEC policy requires a contact method
    pub user_agent: String,
    /// Delay applied after every request that reached the network (milliseconds)
    pub rate_limit_delay_ms: u64,
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Attempts per request for transport errors and HTTP 429
    pub max_retries: u32,
    /// Base backoff between retry attempts (milliseconds, scaled linearly)
    pub retry_backoff_ms: u64,
}

/// LLM metric-extraction configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API key; extraction degrades to XBRL-only when unset
    pub api_key: Option<String>,
    /// Chat model identifier
    pub model: String,
    /// Base URL of the OpenAI-compatible API
    pub api_base: String,
    /// Directory for the (cik, year) metrics cache
    pub cache_dir: PathBuf,
}

impl Default for EdgarConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.sec.gov/Archives".to_string(),
            user_agent: "secscreen/0.1.0 (your.email@example.com)".to_string(),
            rate_limit_delay_ms: 100,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_retries: 3,
            retry_backoff_ms: 1000,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            cache_dir: PathBuf::from("./data/llm_cache"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            index_dir: PathBuf::from("./data/edgar"),
            filings_dir: PathBuf::from("./data/edgar/filings"),
            filings_list_path: PathBuf::from("./data/filings_list.csv"),
            stock_list_path: PathBuf::from("./data/stock_list.csv"),
            prices_dir: PathBuf::from("./data/daily_stock_prices"),
            start_year: 2010,
            end_year: 2025,
            form_type: "10-K".to_string(),
            edgar: EdgarConfig::default(),
            http: HttpConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let data_dir: PathBuf = std::env::var("SECSCREEN_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let edgar = EdgarConfig {
            base_url: std::env::var("SECSCREEN_EDGAR_BASE_URL")
                .unwrap_or(defaults.edgar.base_url),
            user_agent: std::env::var("SECSCREEN_USER_AGENT")
                .unwrap_or(defaults.edgar.user_agent),
            rate_limit_delay_ms: parse_env_var("SECSCREEN_RATE_LIMIT_DELAY_MS")?
                .unwrap_or(defaults.edgar.rate_limit_delay_ms),
        };

        let http = HttpConfig {
            timeout_seconds: parse_env_var("SECSCREEN_HTTP_TIMEOUT_SECONDS")?
                .unwrap_or(defaults.http.timeout_seconds),
            max_retries: parse_env_var("SECSCREEN_HTTP_MAX_RETRIES")?
                .unwrap_or(defaults.http.max_retries),
            retry_backoff_ms: parse_env_var("SECSCREEN_HTTP_RETRY_BACKOFF_MS")?
                .unwrap_or(defaults.http.retry_backoff_ms),
        };

        let llm = LlmConfig {
            api_key: std::env::var("SECSCREEN_LLM_API_KEY").ok(),
            model: std::env::var("SECSCREEN_LLM_MODEL").unwrap_or(defaults.llm.model),
            api_base: std::env::var("SECSCREEN_LLM_API_BASE").unwrap_or(defaults.llm.api_base),
            cache_dir: data_dir.join("llm_cache"),
        };

        Ok(Config {
            index_dir: data_dir.join("edgar"),
            filings_dir: data_dir.join("edgar").join("filings"),
            filings_list_path: data_dir.join("filings_list.csv"),
            stock_list_path: data_dir.join("stock_list.csv"),
            prices_dir: data_dir.join("daily_stock_prices"),
            start_year: parse_env_var("SECSCREEN_START_YEAR")?.unwrap_or(defaults.start_year),
            end_year: parse_env_var("SECSCREEN_END_YEAR")?.unwrap_or(defaults.end_year),
            form_type: std::env::var("SECSCREEN_FORM_TYPE").unwrap_or(defaults.form_type),
            data_dir,
            edgar,
            http,
            llm,
        })
    }

    /// Delay applied after each network request.
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.edgar.rate_limit_delay_ms)
    }

    /// HTTP request timeout.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_seconds)
    }

    /// Base backoff between retry attempts.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.http.retry_backoff_ms)
    }

    /// Validate configuration and create the data directories.
    ///
    /// Called once at startup, before any network activity; failures here
    /// abort the run.
    pub fn validate(&self) -> Result<()> {
        if self.edgar.user_agent.trim().is_empty() {
            anyhow::bail!(
                "User-Agent must not be empty: SEC requires an identifying string with contact info"
            );
        }
        if self.start_year > self.end_year {
            anyhow::bail!(
                "start_year {} is after end_year {}",
                self.start_year,
                self.end_year
            );
        }

        for dir in [
            &self.data_dir,
            &self.index_dir,
            &self.filings_dir,
            &self.prices_dir,
            &self.llm.cache_dir,
        ] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create data directory: {}", dir.display()))?;
        }

        Ok(())
    }
}

/// Helper function to parse an environment variable as a specific type.
fn parse_env_var<T>(var_name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display + Send + Sync + std::error::Error + 'static,
{
    match std::env::var(var_name) {
        Ok(val) => val.parse().map(Some).with_context(|| {
            format!("Failed to parse environment variable {} = '{}'", var_name, val)
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.index_dir, PathBuf::from("./data/edgar"));
        assert_eq!(config.form_type, "10-K");
        assert_eq!(config.edgar.rate_limit_delay_ms, 100);
        assert_eq!(config.http.timeout_seconds, 30);
        assert_eq!(config.rate_limit_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_config_validation_rejects_inverted_years() {
        let config = Config {
            start_year: 2025,
            end_year: 2010,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.edgar.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
