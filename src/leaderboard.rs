//! Leaderboard and analytics aggregation.
//!
//! Pure read/compute over settled, latest predictions: per-agent totals,
//! win/loss streaks, head-to-head agreement, ranking, and heuristic
//! personality insights. Nothing here writes to the store.

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;

use crate::settlement::{round_brier, round_cents, STARTING_BANKROLL};
use crate::storage::{PredictionStore, SeasonTotals};
use crate::types::{Agent, Prediction, Provider, TeamSide};

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Sort orders for the leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeaderboardSort {
    /// Points descending, total P&L as the tie-break.
    #[default]
    Points,
    /// Total P&L descending.
    Pnl,
    /// Mean Brier ascending (best calibrated first); agents with no
    /// settled predictions rank last.
    Brier,
}

impl std::str::FromStr for LeaderboardSort {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "points" => Ok(LeaderboardSort::Points),
            "pnl" => Ok(LeaderboardSort::Pnl),
            "brier" => Ok(LeaderboardSort::Brier),
            _ => Err(anyhow::anyhow!("Unknown leaderboard sort: {s}")),
        }
    }
}

/// One agent's aggregate record.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub agent_id: String,
    pub display_name: String,
    pub slug: String,
    pub provider: Provider,
    pub color: String,
    pub points: i64,
    pub total_predictions: usize,
    pub correct_predictions: usize,
    pub accuracy: f64,
    pub total_pnl: f64,
    pub bankroll: f64,
    pub avg_brier: f64,
    pub current_streak: i64,
    pub best_streak: i64,
}

/// Agreement with one other agent over shared settled matches.
#[derive(Debug, Clone, Serialize)]
pub struct HeadToHead {
    pub agent_id: String,
    pub display_name: String,
    pub agreed: usize,
    pub shared: usize,
    pub agreement_pct: f64,
}

/// Everything the read side shows for a single agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentProfile {
    pub agent: Agent,
    pub stats: LeaderboardEntry,
    pub head_to_head: Vec<HeadToHead>,
    pub insights: Vec<String>,
}

// ---------------------------------------------------------------------------
// Streaks
// ---------------------------------------------------------------------------

/// Compute (current, best) streaks over chronological settled results.
///
/// `best` is the longest run of consecutive correct predictions. `current`
/// counts the trailing run: positive for correct, negative for incorrect
/// (a single miss after a winning run yields -1, not 0).
pub fn compute_streaks(results: &[bool]) -> (i64, i64) {
    let mut best = 0i64;
    let mut run = 0i64;
    for &correct in results {
        if correct {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }

    let mut current = 0i64;
    for &correct in results.iter().rev() {
        if current == 0 {
            current = if correct { 1 } else { -1 };
        } else if current > 0 && correct {
            current += 1;
        } else if current < 0 && !correct {
            current -= 1;
        } else {
            break;
        }
    }

    (current, best)
}

// ---------------------------------------------------------------------------
// Pure aggregation
// ---------------------------------------------------------------------------

fn entry_for(agent: &Agent, settled: &[Prediction]) -> LeaderboardEntry {
    let total = settled.len();
    let correct = settled
        .iter()
        .filter(|p| p.is_correct == Some(true))
        .count();
    let points: i64 = settled.iter().filter_map(|p| p.points_awarded).sum();
    let total_pnl = round_cents(settled.iter().filter_map(|p| p.pnl).sum());
    let accuracy = if total > 0 {
        correct as f64 / total as f64
    } else {
        0.0
    };
    let avg_brier = if total > 0 {
        round_brier(settled.iter().filter_map(|p| p.brier_score).sum::<f64>() / total as f64)
    } else {
        0.0
    };

    let marks: Vec<bool> = settled
        .iter()
        .map(|p| p.is_correct == Some(true))
        .collect();
    let (current_streak, best_streak) = compute_streaks(&marks);

    LeaderboardEntry {
        agent_id: agent.id.clone(),
        display_name: agent.display_name.clone(),
        slug: agent.slug.clone(),
        provider: agent.provider,
        color: agent.color.clone(),
        points,
        total_predictions: total,
        correct_predictions: correct,
        accuracy,
        total_pnl,
        bankroll: round_cents(STARTING_BANKROLL + total_pnl),
        avg_brier,
        current_streak,
        best_streak,
    }
}

fn sort_entries(entries: &mut [LeaderboardEntry], sort: LeaderboardSort) {
    match sort {
        LeaderboardSort::Points => entries.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then(b.total_pnl.partial_cmp(&a.total_pnl).unwrap_or(std::cmp::Ordering::Equal))
        }),
        LeaderboardSort::Pnl => entries.sort_by(|a, b| {
            b.total_pnl
                .partial_cmp(&a.total_pnl)
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
        LeaderboardSort::Brier => entries.sort_by(|a, b| {
            let key = |e: &LeaderboardEntry| {
                if e.total_predictions == 0 {
                    f64::INFINITY
                } else {
                    e.avg_brier
                }
            };
            key(a)
                .partial_cmp(&key(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
    }
}

/// Per-agent (match → pick) lookup built from settled latest predictions.
fn picks_by_agent(settled: &[Prediction]) -> HashMap<String, HashMap<String, TeamSide>> {
    let mut map: HashMap<String, HashMap<String, TeamSide>> = HashMap::new();
    for p in settled {
        map.entry(p.agent_id.clone())
            .or_default()
            .insert(p.match_id.clone(), p.predicted_winner);
    }
    map
}

fn head_to_head_for(
    agent_id: &str,
    agents: &[Agent],
    picks: &HashMap<String, HashMap<String, TeamSide>>,
) -> Vec<HeadToHead> {
    let empty = HashMap::new();
    let own = picks.get(agent_id).unwrap_or(&empty);

    agents
        .iter()
        .filter(|other| other.id != agent_id)
        .map(|other| {
            let other_picks = picks.get(&other.id).unwrap_or(&empty);
            let mut agreed = 0usize;
            let mut shared = 0usize;
            for (match_id, side) in other_picks {
                if let Some(own_side) = own.get(match_id) {
                    shared += 1;
                    if own_side == side {
                        agreed += 1;
                    }
                }
            }
            HeadToHead {
                agent_id: other.id.clone(),
                display_name: other.display_name.clone(),
                agreed,
                shared,
                agreement_pct: if shared > 0 {
                    agreed as f64 / shared as f64
                } else {
                    0.0
                },
            }
        })
        .collect()
}

/// Minimum shared settled matches before an agreement insight is offered.
const MIN_SHARED_FOR_INSIGHT: usize = 3;
/// Minimum high-confidence predictions before a calibration insight.
const MIN_CONFIDENT_FOR_INSIGHT: usize = 3;

fn compute_insights(history: &[Prediction], head_to_head: &[HeadToHead]) -> Vec<String> {
    let mut insights = Vec::new();
    if history.is_empty() {
        return insights;
    }

    let total = history.len() as f64;

    let avg_conf = history.iter().map(|p| p.confidence).sum::<f64>() / total;
    if avg_conf > 0.8 {
        insights.push("Most confident predictor - averages above 80% confidence".to_string());
    } else if avg_conf < 0.65 {
        insights.push("Cautious predictor - tends to hedge with lower confidence".to_string());
    }

    let team_a_rate = history
        .iter()
        .filter(|p| p.predicted_winner == TeamSide::TeamA)
        .count() as f64
        / total;
    if team_a_rate > 0.65 {
        insights.push("Tends to favor the first-listed team".to_string());
    } else if team_a_rate < 0.35 {
        insights.push("Tends to favor the second-listed team (underdog lean)".to_string());
    }

    let confident: Vec<&Prediction> = history.iter().filter(|p| p.confidence >= 0.8).collect();
    if confident.len() >= MIN_CONFIDENT_FOR_INSIGHT {
        let hit_rate = confident
            .iter()
            .filter(|p| p.is_correct == Some(true))
            .count() as f64
            / confident.len() as f64;
        if hit_rate > 0.7 {
            insights.push("Highly accurate when confident (80%+ confidence bets)".to_string());
        } else if hit_rate < 0.4 {
            insights.push("Overconfident - high confidence picks often miss".to_string());
        }
    }

    let qualified: Vec<&HeadToHead> = head_to_head
        .iter()
        .filter(|h| h.shared >= MIN_SHARED_FOR_INSIGHT)
        .collect();
    if let Some(closest) = qualified.iter().max_by(|a, b| {
        a.agreement_pct
            .partial_cmp(&b.agreement_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
    }) {
        if closest.agreement_pct > 0.7 {
            insights.push(format!("Often agrees with {}", closest.display_name));
        }
    }
    if let Some(furthest) = qualified.iter().min_by(|a, b| {
        a.agreement_pct
            .partial_cmp(&b.agreement_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
    }) {
        if furthest.agreement_pct < 0.3 {
            insights.push(format!("Frequently disagrees with {}", furthest.display_name));
        }
    }

    insights
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

pub struct Aggregator {
    store: PredictionStore,
}

impl Aggregator {
    pub fn new(store: PredictionStore) -> Self {
        Self { store }
    }

    /// The ranked per-agent summary across all active agents.
    pub async fn leaderboard(&self, sort: LeaderboardSort) -> Result<Vec<LeaderboardEntry>> {
        let agents = self.store.fetch_active_agents(None).await?;

        let mut entries = Vec::with_capacity(agents.len());
        for agent in &agents {
            let settled = self.store.fetch_settled_latest_for_agent(&agent.id).await?;
            entries.push(entry_for(agent, &settled));
        }

        sort_entries(&mut entries, sort);
        Ok(entries)
    }

    /// Agreement percentages between one agent and every other active
    /// agent, restricted to matches with a settled outcome.
    pub async fn head_to_head(&self, agent_id: &str) -> Result<Vec<HeadToHead>> {
        let agents = self.store.fetch_active_agents(None).await?;
        let settled = self.store.fetch_latest_settled().await?;
        let picks = picks_by_agent(&settled);
        Ok(head_to_head_for(agent_id, &agents, &picks))
    }

    /// Stats, head-to-head, and insights for one agent, by slug.
    pub async fn agent_profile(&self, slug: &str) -> Result<Option<AgentProfile>> {
        let Some(agent) = self.store.fetch_agent_by_slug(slug).await? else {
            return Ok(None);
        };

        let history = self.store.fetch_settled_latest_for_agent(&agent.id).await?;
        let stats = entry_for(&agent, &history);
        let head_to_head = self.head_to_head(&agent.id).await?;
        let insights = compute_insights(&history, &head_to_head);

        Ok(Some(AgentProfile {
            agent,
            stats,
            head_to_head,
            insights,
        }))
    }

    /// Cross-arena season counters.
    pub async fn season(&self) -> Result<SeasonTotals> {
        self.store.season_totals().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
