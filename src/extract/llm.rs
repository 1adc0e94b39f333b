//! LLM-based metric extraction: filing text in, metric map out.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::config::Config;
use crate::extract::MetricMap;

/// Metrics requested from the model, by XBRL concept name.
pub const REQUIRED_METRICS: [&str; 12] = [
    "NetIncomeLoss",
    "EarningsPerShareBasic",
    "DebtCurrent",
    "LongTermDebt",
    "CashAndCashEquivalentsAtCarryingValue",
    "OperatingIncomeLoss",
    "StockholdersEquity",
    "Revenues",
    "IncomeTaxExpenseBenefit",
    "IncomeLossFromContinuingOperationsBeforeIncomeTaxesExtraordinaryItemsNoncontrollingInterest",
    "DepreciationDepletionAndAmortization",
    "EarningsBeforeInterestTaxesDepreciationAmortizationEBITDA",
];

/// Characters of filing text included in the prompt, to stay under the
/// model's token limit.
const PROMPT_TEXT_LIMIT: usize = 4000;

const SYSTEM_PROMPT: &str =
    "You are a financial analyst expert at extracting financial metrics from SEC filings.";

/// Thin client over an OpenAI-compatible chat-completions API.
///
/// Without an API key the extractor degrades to an empty metric map so the
/// XBRL pass can still run alone.
pub struct LlmExtractor {
    client: Client,
    api_key: Option<String>,
    model: String,
    api_base: String,
}

impl LlmExtractor {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key: config.llm.api_key.clone(),
            model: config.llm.model.clone(),
            api_base: config.llm.api_base.clone(),
        })
    }

    /// Extract the required metrics from `filing_text`. Extraction errors
    /// are logged and yield an empty map; the caller treats missing metrics
    /// as not-found rather than fatal.
    pub async fn extract(&self, filing_text: &str) -> MetricMap {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("No LLM API key configured. Returning empty metrics.");
            return MetricMap::new();
        };

        match self.request(api_key, &build_prompt(filing_text)).await {
            Ok(metrics) => metrics,
            Err(e) => {
                error!("Error extracting financial metrics with LLM: {}", e);
                MetricMap::new()
            }
        }
    }

    async fn request(&self, api_key: &str, prompt: &str) -> Result<MetricMap> {
        let url = format!(
            "{}/chat/completions",
            self.api_base.trim_end_matches('/')
        );
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            // low temperature for consistent extraction
            temperature: 0.0,
            max_tokens: 1000,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Chat completion returned HTTP {}", status);
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();
        parse_metrics_json(content)
            .context("Could not extract JSON from LLM response")
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

fn build_prompt(filing_text: &str) -> String {
    let truncated: String = filing_text.chars().take(PROMPT_TEXT_LIMIT).collect();
    let metric_list = REQUIRED_METRICS
        .iter()
        .enumerate()
        .map(|(i, metric)| format!("{}. {}", i + 1, metric))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Extract the following financial metrics from the 10-K filing text below:\n\n\
         Required metrics:\n{}\n\n\
         Filing text:\n{}\n\n\
         Please return the results in JSON format with metric names as keys and numeric values as values.\n\
         If a metric cannot be found, omit it from the response.",
        metric_list, truncated
    )
}

/// Pull the first JSON object out of a reply that may wrap it in prose.
fn parse_metrics_json(content: &str) -> Option<MetricMap> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&content[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_wrapped_in_prose() {
        let content = r#"Here are the metrics I found:
            {"NetIncomeLoss": 94680000000.0, "Revenues": 365817000000}
            Let me know if you need anything else."#;
        let metrics = parse_metrics_json(content).unwrap();
        assert_eq!(metrics["NetIncomeLoss"], 94_680_000_000.0);
        assert_eq!(metrics["Revenues"], 365_817_000_000.0);
    }

    #[test]
    fn reply_without_json_is_rejected() {
        assert!(parse_metrics_json("I could not find any metrics.").is_none());
        assert!(parse_metrics_json("} backwards {").is_none());
    }

    #[test]
    fn prompt_lists_metrics_and_truncates_text() {
        let long_text = "x".repeat(PROMPT_TEXT_LIMIT * 2);
        let prompt = build_prompt(&long_text);
        assert!(prompt.contains("1. NetIncomeLoss"));
        assert!(prompt.contains("12. EarningsBeforeInterestTaxesDepreciationAmortizationEBITDA"));
        assert!(prompt.len() < long_text.len());
    }

    #[tokio::test]
    async fn missing_api_key_returns_empty_metrics() {
        let extractor = LlmExtractor::new(&Config::default()).unwrap();
        assert!(extractor.extract("filing text").await.is_empty());
    }
}
