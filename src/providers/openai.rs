//! OpenAI GPT provider adapter.
//!
//! Targets the Responses API with the web-search tool enabled. The wire
//! types and output walking live here and are shared with the xAI adapter,
//! whose API is OpenAI-compatible.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ModelProvider, ProviderReply};
use crate::parser;
use crate::types::{PredictError, Provider};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const OPENAI_API_URL: &str = "https://api.openai.com/v1/responses";
const DEFAULT_MODEL: &str = "gpt-5.2";
const REASONING_EFFORT: &str = "medium";

/// Transport-level ceiling only; the logical deadline is enforced by the
/// orchestrator's policy wrapper.
pub(crate) const HTTP_TIMEOUT_SECS: u64 = 120;

// ---------------------------------------------------------------------------
// API types (shared with the xAI adapter)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct ResponsesRequest {
    pub model: String,
    pub instructions: String,
    pub input: String,
    pub reasoning: ReasoningConfig,
    pub tools: Vec<ResponseTool>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReasoningConfig {
    pub effort: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResponseTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponsesResponse {
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub usage: Option<ResponsesUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OutputItem {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub content: Option<Vec<ContentPart>>,
    /// Older shape: the query sits directly on the web_search_call item.
    #[serde(default)]
    pub query: Option<String>,
    /// Newer shape: the query is nested under an action object.
    #[serde(default)]
    pub action: Option<SearchAction>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchAction {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentPart {
    #[serde(rename = "type")]
    pub part_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponsesUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

/// Concatenate `output_text` parts of message items and collect search
/// queries from `web_search_call` items.
pub(crate) fn collect_output(body: &ResponsesResponse) -> (String, Vec<String>) {
    let mut text = String::new();
    let mut queries = Vec::new();

    for item in &body.output {
        match item.item_type.as_str() {
            "web_search_call" => {
                let query = item
                    .query
                    .clone()
                    .or_else(|| item.action.as_ref().and_then(|a| a.query.clone()));
                if let Some(q) = query {
                    queries.push(q);
                }
            }
            "message" => {
                if let Some(parts) = &item.content {
                    for part in parts {
                        if part.part_type == "output_text" {
                            if let Some(t) = &part.text {
                                text.push_str(t);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    (text, queries)
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct OpenAiProvider {
    http: Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: Option<String>) -> Result<Self, PredictError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                PredictError::provider(Provider::OpenAi, format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    async fn call(
        &self,
        system: &str,
        user: &str,
        team_a: &str,
        team_b: &str,
    ) -> Result<ProviderReply, PredictError> {
        let request = ResponsesRequest {
            model: self.model.clone(),
            instructions: system.to_string(),
            input: user.to_string(),
            reasoning: ReasoningConfig {
                effort: REASONING_EFFORT,
            },
            tools: vec![ResponseTool {
                kind: "web_search_preview",
            }],
        };

        let started = Instant::now();

        let response = self
            .http
            .post(OPENAI_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| PredictError::provider(Provider::OpenAi, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PredictError::provider(
                Provider::OpenAi,
                format!("HTTP {status}: {body}"),
            ));
        }

        let body: ResponsesResponse = response.json().await.map_err(|e| {
            PredictError::provider(Provider::OpenAi, format!("malformed response body: {e}"))
        })?;

        let latency_ms = started.elapsed().as_millis() as u64;
        let (text, search_queries) = collect_output(&body);

        if text.is_empty() {
            return Err(PredictError::provider(Provider::OpenAi, "empty text response"));
        }

        let prediction = parser::parse_prediction(&text, team_a, team_b)?;
        let usage = body.usage.unwrap_or(ResponsesUsage {
            input_tokens: 0,
            output_tokens: 0,
        });

        debug!(
            model = %self.model,
            tokens = usage.input_tokens + usage.output_tokens,
            searches = search_queries.len(),
            latency_ms,
            "OpenAI call complete"
        );

        Ok(ProviderReply {
            prediction,
            search_queries,
            raw_response: text,
            tokens_used: usage.input_tokens + usage.output_tokens,
            latency_ms,
        })
    }

    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
