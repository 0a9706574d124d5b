//! xAI Grok provider adapter.
//!
//! Grok's API is OpenAI-compatible, so this adapter reuses the Responses
//! wire types and output walking from the OpenAI adapter and only swaps
//! the endpoint, default model, and tool name.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::openai::{
    collect_output, ReasoningConfig, ResponseTool, ResponsesRequest, ResponsesResponse,
    ResponsesUsage, HTTP_TIMEOUT_SECS,
};
use super::{ModelProvider, ProviderReply};
use crate::parser;
use crate::types::{PredictError, Provider};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const XAI_API_URL: &str = "https://api.x.ai/v1/responses";
const DEFAULT_MODEL: &str = "grok-4";
const REASONING_EFFORT: &str = "medium";

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct XaiProvider {
    http: Client,
    api_key: String,
    model: String,
}

impl XaiProvider {
    pub fn new(api_key: String, model: Option<String>) -> Result<Self, PredictError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                PredictError::provider(Provider::Xai, format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl ModelProvider for XaiProvider {
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
            tools: vec![ResponseTool { kind: "web_search" }],
        };

        let started = Instant::now();

        let response = self
            .http
            .post(XAI_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| PredictError::provider(Provider::Xai, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PredictError::provider(
                Provider::Xai,
                format!("HTTP {status}: {body}"),
            ));
        }

        let body: ResponsesResponse = response.json().await.map_err(|e| {
            PredictError::provider(Provider::Xai, format!("malformed response body: {e}"))
        })?;

        let latency_ms = started.elapsed().as_millis() as u64;
        let (text, search_queries) = collect_output(&body);

        if text.is_empty() {
            return Err(PredictError::provider(Provider::Xai, "empty text response"));
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
            "xAI call complete"
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
        Provider::Xai
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
