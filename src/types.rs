//! Shared types for the PAVILION arena.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that provider, orchestration,
//! settlement, and leaderboard modules can depend on them without
//! circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which side of a fixture a prediction (or result) refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamSide {
    TeamA,
    TeamB,
}

impl TeamSide {
    /// Stable string form used in persistence and wire payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamSide::TeamA => "team_a",
            TeamSide::TeamB => "team_b",
        }
    }

    /// The opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            TeamSide::TeamA => TeamSide::TeamB,
            TeamSide::TeamB => TeamSide::TeamA,
        }
    }
}

impl fmt::Display for TeamSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TeamSide {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "team_a" => Ok(TeamSide::TeamA),
            "team_b" => Ok(TeamSide::TeamB),
            _ => Err(anyhow::anyhow!("Unknown team side: {s}")),
        }
    }
}

/// Lifecycle status of a match. Mutated by external collaborators
/// (lineup/result ingestion); this crate only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Upcoming,
    Live,
    Completed,
    Abandoned,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Upcoming => "upcoming",
            MatchStatus::Live => "live",
            MatchStatus::Completed => "completed",
            MatchStatus::Abandoned => "abandoned",
        }
    }

    /// Whether the match can still change outcome.
    pub fn is_open(&self) -> bool {
        matches!(self, MatchStatus::Upcoming | MatchStatus::Live)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upcoming" => Ok(MatchStatus::Upcoming),
            "live" => Ok(MatchStatus::Live),
            "completed" => Ok(MatchStatus::Completed),
            "abandoned" => Ok(MatchStatus::Abandoned),
            _ => Err(anyhow::anyhow!("Unknown match status: {s}")),
        }
    }
}

/// The scoring checkpoint a prediction was made in. Only the latest
/// prediction across both windows counts for settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionWindow {
    PreMatch,
    PostXi,
}

impl PredictionWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionWindow::PreMatch => "pre_match",
            PredictionWindow::PostXi => "post_xi",
        }
    }
}

impl fmt::Display for PredictionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PredictionWindow {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre_match" => Ok(PredictionWindow::PreMatch),
            "post_xi" => Ok(PredictionWindow::PostXi),
            _ => Err(anyhow::anyhow!("Unknown prediction window: {s}")),
        }
    }
}

/// Which model provider an agent routes through. A closed enumeration:
/// adding a provider means adding a variant and an adapter, never a
/// stringly-typed lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenAi,
    Google,
    Xai,
}

impl Provider {
    /// All known providers (useful for iteration).
    pub const ALL: &'static [Provider] = &[
        Provider::Anthropic,
        Provider::OpenAi,
        Provider::Google,
        Provider::Xai,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::Google => "google",
            Provider::Xai => "xai",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "openai" | "gpt" => Ok(Provider::OpenAi),
            "google" | "gemini" => Ok(Provider::Google),
            "xai" | "x-ai" | "grok" => Ok(Provider::Xai),
            _ => Err(anyhow::anyhow!("Unknown provider: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

/// A scheduled fixture between two teams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub match_number: i64,
    /// Tournament stage: "group" | "super8" | "semi" | "final"
    pub stage: String,
    pub group_name: Option<String>,
    pub team_a: String,
    pub team_b: String,
    pub venue: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: MatchStatus,
    /// Final outcome, set by result ingestion once the match completes.
    pub winner: Option<TeamSide>,
    pub winner_team_name: Option<String>,
    pub result_summary: Option<String>,
    /// Announced playing XI for each side, once known.
    pub playing_xi_a: Option<Vec<String>>,
    pub playing_xi_b: Option<Vec<String>>,
    pub xi_announced_at: Option<DateTime<Utc>>,
    pub toss_winner: Option<String>,
    pub toss_decision: Option<String>,
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} vs {} @ {} ({} | {})",
            self.match_number,
            self.team_a,
            self.team_b,
            self.venue,
            self.scheduled_at.format("%Y-%m-%d %H:%M UTC"),
            self.status,
        )
    }
}

impl Match {
    /// Display name of the given side.
    pub fn team_name(&self, side: TeamSide) -> &str {
        match side {
            TeamSide::TeamA => &self.team_a,
            TeamSide::TeamB => &self.team_b,
        }
    }

    /// Whether both sides have announced a playing XI.
    pub fn has_full_lineups(&self) -> bool {
        let announced = |xi: &Option<Vec<String>>| xi.as_ref().is_some_and(|v| !v.is_empty());
        announced(&self.playing_xi_a) && announced(&self.playing_xi_b)
    }

    /// Resolve the prediction window for this match: `post_xi` once both
    /// lineups are announced, `pre_match` before that.
    pub fn prediction_window(&self) -> PredictionWindow {
        if self.has_full_lineups() {
            PredictionWindow::PostXi
        } else {
            PredictionWindow::PreMatch
        }
    }

    /// Map a canonical team name back to its side.
    /// The name must be one of the two team names verbatim.
    pub fn side_of(&self, team_name: &str) -> Option<TeamSide> {
        if team_name == self.team_a {
            Some(TeamSide::TeamA)
        } else if team_name == self.team_b {
            Some(TeamSide::TeamB)
        } else {
            None
        }
    }

    /// Helper to build a test fixture with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        Match {
            id: "m-001".to_string(),
            match_number: 1,
            stage: "group".to_string(),
            group_name: Some("Group A".to_string()),
            team_a: "India".to_string(),
            team_b: "Pakistan".to_string(),
            venue: "Colombo".to_string(),
            scheduled_at: Utc::now() + chrono::Duration::days(1),
            status: MatchStatus::Upcoming,
            winner: None,
            winner_team_name: None,
            result_summary: None,
            playing_xi_a: None,
            playing_xi_b: None,
            xi_announced_at: None,
            toss_winner: None,
            toss_decision: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// A competing AI agent. Read-only from this crate's perspective;
/// the roster is owned by whoever seeds the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub display_name: String,
    pub provider: Provider,
    pub model_id: String,
    pub slug: String,
    /// Hex color used by read-side consumers.
    pub color: String,
    pub is_active: bool,
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}/{}]", self.display_name, self.provider, self.model_id)
    }
}

// ---------------------------------------------------------------------------
// Prediction
// ---------------------------------------------------------------------------

/// A structured, validated prediction: the primary output of the arena.
///
/// For a given (match, agent) pair at most one row has `is_latest = true`;
/// a newer prediction supersedes all prior ones for that pair. Settlement
/// fields start `None` and are populated exactly once by the settlement
/// engine (or forced back to the void state when a match is abandoned).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub match_id: String,
    pub agent_id: String,
    pub predicted_winner: TeamSide,
    pub predicted_team_name: String,
    /// Stated confidence, clamped into [0.5, 1.0] at parse time.
    pub confidence: f64,
    pub reasoning: String,
    pub prediction_window: PredictionWindow,
    pub is_latest: bool,
    /// Web searches the provider reported performing.
    pub search_queries: Vec<String>,
    pub is_correct: Option<bool>,
    pub points_awarded: Option<i64>,
    pub pnl: Option<f64>,
    pub brier_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Prediction {
    /// Whether settlement has populated this row.
    pub fn is_settled(&self) -> bool {
        self.is_correct.is_some()
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} @ {:.0}% ({}{})",
            self.agent_id,
            self.predicted_team_name,
            self.confidence * 100.0,
            self.prediction_window,
            if self.is_latest { ", latest" } else { "" },
        )
    }
}

/// Insert payload for a new prediction. The store mints the row id and
/// timestamp, and performs the supersede-then-insert atomically.
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub match_id: String,
    pub agent_id: String,
    pub predicted_winner: TeamSide,
    pub predicted_team_name: String,
    pub confidence: f64,
    pub reasoning: String,
    pub prediction_window: PredictionWindow,
    pub search_queries: Vec<String>,
}

// ---------------------------------------------------------------------------
// Prediction log
// ---------------------------------------------------------------------------

/// One audit row per orchestration attempt, success or terminal failure.
/// Never mutated after creation; useful for debugging provider behavior,
/// not for scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionLog {
    pub id: String,
    /// Absent for terminal failures (no prediction was stored).
    pub prediction_id: Option<String>,
    pub raw_prompt: String,
    pub raw_response: Option<String>,
    pub tokens_used: Option<i64>,
    pub latency_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for an audit log row.
#[derive(Debug, Clone)]
pub struct NewLog {
    pub prediction_id: Option<String>,
    pub raw_prompt: String,
    pub raw_response: Option<String>,
    pub tokens_used: Option<i64>,
    pub latency_ms: Option<i64>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for PAVILION.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl PredictError {
    /// Shorthand for a provider-scoped error.
    pub fn provider(provider: Provider, message: impl Into<String>) -> Self {
        PredictError::Provider {
            provider: provider.as_str().to_string(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
