//! Anthropic Claude provider adapter.
//!
//! Calls the Messages API with extended thinking and the web-search server
//! tool enabled, concatenates the text blocks, and pulls the search queries
//! out of the `server_tool_use` blocks.

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

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-opus-4-6";
const DEFAULT_MAX_TOKENS: u32 = 16_000;
const THINKING_BUDGET_TOKENS: u32 = 5_000;
const WEB_SEARCH_MAX_USES: u32 = 5;

/// Transport-level ceiling only; the logical deadline is enforced by the
/// orchestrator's policy wrapper.
const HTTP_TIMEOUT_SECS: u64 = 120;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    thinking: ThinkingConfig,
    tools: Vec<WebSearchTool>,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct ThinkingConfig {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WebSearchTool {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
    max_uses: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct AnthropicProvider {
    http: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(
        api_key: String,
        model: Option<String>,
        max_tokens: Option<u32>,
    ) -> Result<Self, PredictError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                PredictError::provider(Provider::Anthropic, format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    /// Concatenate text blocks and collect web-search queries from
    /// `server_tool_use` blocks.
    fn collect_output(body: &MessagesResponse) -> (String, Vec<String>) {
        let mut text = String::new();
        let mut queries = Vec::new();

        for block in &body.content {
            match block.block_type.as_str() {
                "text" => {
                    if let Some(t) = &block.text {
                        text.push_str(t);
                    }
                }
                "server_tool_use" => {
                    if block.name.as_deref() == Some("web_search") {
                        if let Some(q) = block
                            .input
                            .as_ref()
                            .and_then(|i| i.get("query"))
                            .and_then(|q| q.as_str())
                        {
                            queries.push(q.to_string());
                        }
                    }
                }
                _ => {}
            }
        }

        (text, queries)
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    async fn call(
        &self,
        system: &str,
        user: &str,
        team_a: &str,
        team_b: &str,
    ) -> Result<ProviderReply, PredictError> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            thinking: ThinkingConfig {
                kind: "enabled",
                budget_tokens: THINKING_BUDGET_TOKENS,
            },
            tools: vec![WebSearchTool {
                kind: "web_search_20250305",
                name: "web_search",
                max_uses: WEB_SEARCH_MAX_USES,
            }],
            system: system.to_string(),
            messages: vec![Message {
                role: "user",
                content: user.to_string(),
            }],
        };

        let started = Instant::now();

        let response = self
            .http
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| PredictError::provider(Provider::Anthropic, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PredictError::provider(
                Provider::Anthropic,
                format!("HTTP {status}: {body}"),
            ));
        }

        let body: MessagesResponse = response.json().await.map_err(|e| {
            PredictError::provider(Provider::Anthropic, format!("malformed response body: {e}"))
        })?;

        let latency_ms = started.elapsed().as_millis() as u64;
        let (text, search_queries) = Self::collect_output(&body);

        if text.is_empty() {
            return Err(PredictError::provider(
                Provider::Anthropic,
                "empty text response",
            ));
        }

        let prediction = parser::parse_prediction(&text, team_a, team_b)?;
        let usage = body.usage.unwrap_or(Usage {
            input_tokens: 0,
            output_tokens: 0,
        });

        debug!(
            model = %self.model,
            tokens = usage.input_tokens + usage.output_tokens,
            searches = search_queries.len(),
            latency_ms,
            "Anthropic call complete"
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
        Provider::Anthropic
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_construction() {
        let p = AnthropicProvider::new("test-key".into(), None, None).unwrap();
        assert_eq!(p.model_name(), DEFAULT_MODEL);
        assert_eq!(p.provider(), Provider::Anthropic);
    }

    #[test]
    fn test_client_custom_model() {
        let p = AnthropicProvider::new("key".into(), Some("claude-sonnet-4-5".into()), Some(2048))
            .unwrap();
        assert_eq!(p.model_name(), "claude-sonnet-4-5");
        assert_eq!(p.max_tokens, 2048);
    }

    #[test]
    fn test_request_serialization() {
        let request = MessagesRequest {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            thinking: ThinkingConfig {
                kind: "enabled",
                budget_tokens: THINKING_BUDGET_TOKENS,
            },
            tools: vec![WebSearchTool {
                kind: "web_search_20250305",
                name: "web_search",
                max_uses: WEB_SEARCH_MAX_USES,
            }],
            system: "sys".into(),
            messages: vec![Message {
                role: "user",
                content: "pick a winner".into(),
            }],
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"web_search_20250305\""));
        assert!(json.contains("\"budget_tokens\":5000"));
        assert!(json.contains("\"role\":\"user\""));
    }

    #[test]
    fn test_collect_output_text_and_queries() {
        let body: MessagesResponse = serde_json::from_str(
            r#"{
                "content": [
                    {"type": "thinking", "thinking": "hmm"},
                    {"type": "server_tool_use", "name": "web_search", "input": {"query": "india pakistan pitch report"}},
                    {"type": "web_search_tool_result", "content": []},
                    {"type": "text", "text": "{\"winner\": \"India\","},
                    {"type": "text", "text": " \"confidence\": 0.7}"}
                ],
                "usage": {"input_tokens": 900, "output_tokens": 150}
            }"#,
        )
        .unwrap();

        let (text, queries) = AnthropicProvider::collect_output(&body);
        assert_eq!(text, "{\"winner\": \"India\", \"confidence\": 0.7}");
        assert_eq!(queries, vec!["india pakistan pitch report".to_string()]);
    }

    #[test]
    fn test_collect_output_ignores_other_tools() {
        let body: MessagesResponse = serde_json::from_str(
            r#"{"content": [{"type": "server_tool_use", "name": "code_execution", "input": {"query": "x"}}]}"#,
        )
        .unwrap();
        let (text, queries) = AnthropicProvider::collect_output(&body);
        assert!(text.is_empty());
        assert!(queries.is_empty());
    }
}
