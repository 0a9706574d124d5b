//! Prediction orchestrator.
//!
//! Resolves the prediction window for a match, fans calls out across the
//! agent set fully in parallel, imposes a per-call deadline with a single
//! delayed retry, and persists every outcome: a prediction row plus an
//! audit log on success, an audit log alone on terminal failure.
//!
//! Fault isolation is mandatory: one agent's failure never aborts its
//! siblings or the batch.

use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::prompt::{build_prediction_prompt, PromptPair};
use crate::providers::{ModelProvider, ProviderRegistry, ProviderReply};
use crate::storage::PredictionStore;
use crate::types::{Agent, Match, NewLog, NewPrediction, PredictError, PredictionWindow};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Deadline and retry policy applied to every provider call.
///
/// The deadline is enforced with `tokio::time::timeout`, which drops the
/// in-flight future on expiry, so the underlying request is aborted rather
/// than left running behind an ignored race.
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    pub deadline: Duration,
    pub retry_delay: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Per-agent result of an orchestration batch.
#[derive(Debug, Clone, Serialize)]
pub struct AgentOutcome {
    pub agent_id: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success { prediction_id: String },
    Error { message: String },
}

impl AgentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success { .. })
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    registry: ProviderRegistry,
    store: PredictionStore,
    policy: CallPolicy,
}

impl Orchestrator {
    pub fn new(registry: ProviderRegistry, store: PredictionStore) -> Self {
        Self::with_policy(registry, store, CallPolicy::default())
    }

    pub fn with_policy(
        registry: ProviderRegistry,
        store: PredictionStore,
        policy: CallPolicy,
    ) -> Self {
        Self {
            registry,
            store,
            policy,
        }
    }

    /// Run predictions for one match across a set of agents, in parallel.
    /// Returns one outcome per agent, in input order.
    pub async fn orchestrate(&self, m: &Match, agents: &[Agent]) -> Vec<AgentOutcome> {
        let window = m.prediction_window();
        let prompt = build_prediction_prompt(m);

        info!(
            match_id = %m.id,
            window = %window,
            agents = agents.len(),
            "Orchestrating predictions"
        );

        join_all(
            agents
                .iter()
                .map(|agent| self.run_agent(m, agent, &prompt, window)),
        )
        .await
    }

    /// Call a single agent for a single match, with the same window
    /// resolution and supersede behavior as the batch path. Used by
    /// on-demand triggers and scheduled sweeps.
    pub async fn call_agent(&self, m: &Match, agent: &Agent) -> AgentOutcome {
        let window = m.prediction_window();
        let prompt = build_prediction_prompt(m);
        self.run_agent(m, agent, &prompt, window).await
    }

    /// One agent's full path: call → optional retry → persist. Never
    /// returns an error; failures become error outcomes.
    async fn run_agent(
        &self,
        m: &Match,
        agent: &Agent,
        prompt: &PromptPair,
        window: PredictionWindow,
    ) -> AgentOutcome {
        let Some(provider) = self.registry.get(agent.provider) else {
            let message = format!("no adapter registered for provider {}", agent.provider);
            error!(agent_id = %agent.id, match_id = %m.id, error = %message, "Agent skipped");
            return self.record_failure(agent, prompt, message).await;
        };

        let result = match self.attempt(provider.as_ref(), prompt, m).await {
            Ok(reply) => Ok(reply),
            Err(first_error) => {
                warn!(
                    agent_id = %agent.id,
                    match_id = %m.id,
                    error = %first_error,
                    delay_secs = self.policy.retry_delay.as_secs(),
                    "First attempt failed, retrying"
                );
                tokio::time::sleep(self.policy.retry_delay).await;
                self.attempt(provider.as_ref(), prompt, m).await
            }
        };

        match result {
            Ok(reply) => self.record_success(m, agent, window, prompt, reply).await,
            Err(e) => {
                error!(
                    agent_id = %agent.id,
                    match_id = %m.id,
                    error = %e,
                    "Agent failed terminally"
                );
                self.record_failure(agent, prompt, e.to_string()).await
            }
        }
    }

    /// One provider attempt under the policy deadline.
    async fn attempt(
        &self,
        provider: &dyn ModelProvider,
        prompt: &PromptPair,
        m: &Match,
    ) -> Result<ProviderReply, PredictError> {
        match tokio::time::timeout(
            self.policy.deadline,
            provider.call(&prompt.system, &prompt.user, &m.team_a, &m.team_b),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PredictError::Timeout {
                seconds: self.policy.deadline.as_secs(),
            }),
        }
    }

    async fn record_success(
        &self,
        m: &Match,
        agent: &Agent,
        window: PredictionWindow,
        prompt: &PromptPair,
        reply: ProviderReply,
    ) -> AgentOutcome {
        let Some(predicted_winner) = m.side_of(&reply.prediction.winner) else {
            // The parser pins winners to the match's team names, so this
            // only fires on a contract violation between the two.
            let message = format!(
                "parsed winner \"{}\" is not a team of match {}",
                reply.prediction.winner, m.id
            );
            return self.record_failure(agent, prompt, message).await;
        };

        let new = NewPrediction {
            match_id: m.id.clone(),
            agent_id: agent.id.clone(),
            predicted_winner,
            predicted_team_name: reply.prediction.winner.clone(),
            confidence: reply.prediction.confidence,
            reasoning: reply.prediction.reasoning.clone(),
            prediction_window: window,
            search_queries: reply.search_queries.clone(),
        };

        let prediction_id = match self.store.record_prediction(&new).await {
            Ok(id) => id,
            Err(e) => {
                error!(agent_id = %agent.id, match_id = %m.id, error = %e, "Failed to store prediction");
                return self
                    .record_failure(agent, prompt, format!("storage error: {e}"))
                    .await;
            }
        };

        // The audit row must never fail the call it documents.
        let log = NewLog {
            prediction_id: Some(prediction_id.clone()),
            raw_prompt: prompt.rendered(),
            raw_response: Some(reply.raw_response),
            tokens_used: Some(i64::from(reply.tokens_used)),
            latency_ms: Some(reply.latency_ms as i64),
        };
        if let Err(e) = self.store.record_log(&log).await {
            warn!(agent_id = %agent.id, error = %e, "Failed to write audit log");
        }

        info!(
            agent_id = %agent.id,
            match_id = %m.id,
            winner = %reply.prediction.winner,
            confidence = reply.prediction.confidence,
            latency_ms = reply.latency_ms,
            "Prediction stored"
        );

        AgentOutcome {
            agent_id: agent.id.clone(),
            status: OutcomeStatus::Success { prediction_id },
        }
    }

    async fn record_failure(
        &self,
        agent: &Agent,
        prompt: &PromptPair,
        message: String,
    ) -> AgentOutcome {
        let log = NewLog {
            prediction_id: None,
            raw_prompt: prompt.rendered(),
            raw_response: None,
            tokens_used: None,
            latency_ms: None,
        };
        if let Err(e) = self.store.record_log(&log).await {
            warn!(agent_id = %agent.id, error = %e, "Failed to write failure log");
        }

        AgentOutcome {
            agent_id: agent.id.clone(),
            status: OutcomeStatus::Error { message },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
