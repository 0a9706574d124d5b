//! Provider adapters for match predictions.
//!
//! Defines the `ModelProvider` trait and provides implementations for
//! Claude (Anthropic), GPT (OpenAI), Gemini (Google), and Grok (xAI).
//! Adapters are interchangeable behind the trait: each one sends the shared
//! prompt pair with web search enabled, concatenates the textual output,
//! extracts any reported search queries, and delegates to the response
//! parser. The orchestrator depends only on this contract.

pub mod anthropic;
pub mod google;
pub mod openai;
pub mod xai;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::parser::ParsedPrediction;
use crate::types::{PredictError, Provider};

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// What a successful provider call yields: the validated prediction plus
/// telemetry for the audit log.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub prediction: ParsedPrediction,
    /// Web searches the provider reported performing, in call order.
    pub search_queries: Vec<String>,
    /// The concatenated textual output, verbatim.
    pub raw_response: String,
    /// Input + output tokens as reported by the provider.
    pub tokens_used: u32,
    pub latency_ms: u64,
}

/// Abstraction over AI text-generation providers.
///
/// Implementors make exactly one attempt per call: the deadline and the
/// single retry live in the orchestrator's policy wrapper, so an adapter
/// with its own retry loop would silently multiply the budget.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Ask the provider to predict the match winner.
    /// Errors on transport failure, non-success status, empty textual
    /// output, or an unparseable answer.
    async fn call(
        &self,
        system: &str,
        user: &str,
        team_a: &str,
        team_b: &str,
    ) -> Result<ProviderReply, PredictError>;

    /// Which provider this adapter fronts.
    fn provider(&self) -> Provider;

    /// Model identifier string.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The closed set of provider adapters available to the orchestrator.
///
/// Built once at startup by the composition root and injected; client
/// lifetime and credentials are owned there, never by module-import side
/// effects.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn ModelProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own provider tag. A second adapter
    /// for the same provider replaces the first.
    pub fn register(&mut self, adapter: Arc<dyn ModelProvider>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ModelProvider>> {
        self.adapters.get(&provider).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// The providers currently registered.
    pub fn providers(&self) -> Vec<Provider> {
        self.adapters.keys().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
