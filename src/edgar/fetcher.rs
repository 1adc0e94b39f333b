//! Rate-limited HTTP fetcher, the sole point of contact with the SEC.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

/// Fetch failure taxonomy. Callers decide skip policy; a failed item is
/// terminal for the current run and naturally re-attempted on the next one.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The remote answered with a non-2xx status.
    #[error("HTTP {status} for {url}")]
    Remote { url: String, status: StatusCode },

    /// The request never produced a usable response (timeout, DNS,
    /// connection reset).
    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Seam for the pipeline stages. Tests substitute a stub; production uses
/// [`HttpFetcher`].
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// `reqwest`-backed fetcher carrying the SEC-mandated identifying User-Agent.
///
/// Transport errors and HTTP 429 are retried up to `max_retries` times with
/// linear backoff; any other non-2xx status is returned to the caller
/// immediately. The fixed inter-request delay is applied by callers after
/// every call that reached the network, so one `HttpFetcher` keeps the whole
/// run under the SEC request-rate ceiling.
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
    backoff: Duration,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.edgar.user_agent.as_str())
            .timeout(config.http_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            max_retries: config.http.max_retries.max(1),
            backoff: config.retry_backoff(),
        })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!("GET {} (attempt {})", url, attempt);

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.bytes().await.map(|b| b.to_vec()).map_err(|source| {
                            FetchError::Transport {
                                url: url.to_string(),
                                source,
                            }
                        });
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.max_retries {
                        warn!("Rate limited on {}, backing off before retry", url);
                        tokio::time::sleep(self.backoff * attempt).await;
                        continue;
                    }
                    return Err(FetchError::Remote {
                        url: url.to_string(),
                        status,
                    });
                }
                Err(source) => {
                    if attempt < self.max_retries {
                        warn!("Request failed for {} (attempt {}): {}", url, attempt, source);
                        tokio::time::sleep(self.backoff * attempt).await;
                        continue;
                    }
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        source,
                    });
                }
            }
        }
    }
}
