//! Google Gemini provider adapter.
//!
//! Calls the generateContent endpoint with Google Search grounding enabled.
//! Text comes from the candidate parts; search queries come from the
//! grounding metadata.

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

const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-3.0-pro";
const THINKING_BUDGET_TOKENS: u32 = 5_000;

/// Transport-level ceiling only; the logical deadline is enforced by the
/// orchestrator's policy wrapper.
const HTTP_TIMEOUT_SECS: u64 = 120;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: ContentPayload,
    contents: Vec<ContentPayload>,
    tools: Vec<GoogleTool>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct ContentPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GoogleTool {
    google_search: EmptyConfig,
}

#[derive(Debug, Serialize)]
struct EmptyConfig {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    web_search_queries: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct GoogleProvider {
    http: Client,
    api_key: String,
    model: String,
}

impl GoogleProvider {
    pub fn new(api_key: String, model: Option<String>) -> Result<Self, PredictError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                PredictError::provider(Provider::Google, format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    fn endpoint(&self) -> String {
        format!("{GOOGLE_API_BASE}/{}:generateContent", self.model)
    }

    /// Concatenate the first candidate's text parts and collect its
    /// grounding search queries.
    fn collect_output(body: &GenerateResponse) -> (String, Vec<String>) {
        let mut text = String::new();
        let mut queries = Vec::new();

        if let Some(candidate) = body.candidates.first() {
            if let Some(content) = &candidate.content {
                for part in &content.parts {
                    if let Some(t) = &part.text {
                        text.push_str(t);
                    }
                }
            }
            if let Some(grounding) = &candidate.grounding_metadata {
                queries.extend(grounding.web_search_queries.iter().cloned());
            }
        }

        (text, queries)
    }
}

#[async_trait]
impl ModelProvider for GoogleProvider {
    async fn call(
        &self,
        system: &str,
        user: &str,
        team_a: &str,
        team_b: &str,
    ) -> Result<ProviderReply, PredictError> {
        let request = GenerateRequest {
            system_instruction: ContentPayload {
                role: None,
                parts: vec![RequestPart {
                    text: system.to_string(),
                }],
            },
            contents: vec![ContentPayload {
                role: Some("user"),
                parts: vec![RequestPart {
                    text: user.to_string(),
                }],
            }],
            tools: vec![GoogleTool {
                google_search: EmptyConfig {},
            }],
            generation_config: GenerationConfig {
                thinking_config: ThinkingConfig {
                    thinking_budget: THINKING_BUDGET_TOKENS,
                },
            },
        };

        let started = Instant::now();

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| PredictError::provider(Provider::Google, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PredictError::provider(
                Provider::Google,
                format!("HTTP {status}: {body}"),
            ));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            PredictError::provider(Provider::Google, format!("malformed response body: {e}"))
        })?;

        let latency_ms = started.elapsed().as_millis() as u64;
        let (text, search_queries) = Self::collect_output(&body);

        if text.is_empty() {
            return Err(PredictError::provider(Provider::Google, "empty text response"));
        }

        let prediction = parser::parse_prediction(&text, team_a, team_b)?;
        let usage = body.usage_metadata.unwrap_or(UsageMetadata {
            prompt_token_count: 0,
            candidates_token_count: 0,
        });

        debug!(
            model = %self.model,
            tokens = usage.prompt_token_count + usage.candidates_token_count,
            searches = search_queries.len(),
            latency_ms,
            "Google call complete"
        );

        Ok(ProviderReply {
            prediction,
            search_queries,
            raw_response: text,
            tokens_used: usage.prompt_token_count + usage.candidates_token_count,
            latency_ms,
        })
    }

    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
