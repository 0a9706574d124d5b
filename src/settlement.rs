//! Settlement engine.
//!
//! Deterministic scoring of latest predictions against finalized match
//! outcomes: correctness, points, implied-odds profit/loss, and Brier
//! calibration. Each row is settled at most once (SQL null guard), so a
//! repeated settlement call is a safe no-op. An abandoned match voids its
//! predictions entirely, even ones that were previously settled.

use anyhow::Result;
use tracing::{info, warn};

use crate::storage::PredictionStore;
use crate::types::TeamSide;

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Fixed stake per prediction.
pub const STAKE: f64 = 100.0;

/// Starting bankroll each agent is imagined to hold.
pub const STARTING_BANKROLL: f64 = 10_000.0;

/// Round a money value to the nearest cent.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round a Brier-scale value to four decimals.
pub fn round_brier(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Implied-odds P&L for a settled prediction.
///
/// A correct call at confidence `c` pays `STAKE * (1/c - 1)`, the payout
/// implied by treating stated confidence as fair betting odds. A 50%
/// correct call doubles the stake; a 95% one earns only a small bonus.
/// Any incorrect call loses the full stake regardless of confidence.
pub fn calculate_pnl(confidence: f64, is_correct: bool) -> f64 {
    if !is_correct {
        return -STAKE;
    }
    round_cents(STAKE * (1.0 / confidence - 1.0))
}

/// Brier score: squared error between stated probability and the binary
/// outcome. 0 is perfect calibration, higher is worse.
pub fn calculate_brier(confidence: f64, is_correct: bool) -> f64 {
    let actual = if is_correct { 1.0 } else { 0.0 };
    round_brier((confidence - actual).powi(2))
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Finalized outcome of a match, as supplied by the result-ingestion
/// collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Won(TeamSide),
    Abandoned,
}

pub struct SettlementEngine {
    store: PredictionStore,
}

impl SettlementEngine {
    pub fn new(store: PredictionStore) -> Self {
        Self { store }
    }

    /// Settle every latest prediction on a match against its outcome.
    /// Returns the number of rows updated.
    pub async fn settle(&self, match_id: &str, outcome: MatchOutcome) -> Result<usize> {
        match outcome {
            MatchOutcome::Won(winner) => self.settle_completed(match_id, winner).await,
            MatchOutcome::Abandoned => self.settle_abandoned(match_id).await,
        }
    }

    async fn settle_completed(&self, match_id: &str, winner: TeamSide) -> Result<usize> {
        let pending = self.store.fetch_unsettled_latest(match_id).await?;

        let mut settled = 0usize;
        for prediction in &pending {
            let is_correct = prediction.predicted_winner == winner;
            let pnl = calculate_pnl(prediction.confidence, is_correct);
            let brier = calculate_brier(prediction.confidence, is_correct);
            let points = if is_correct { 1 } else { 0 };

            let applied = self
                .store
                .apply_settlement(&prediction.id, is_correct, points, pnl, brier)
                .await?;

            if applied {
                settled += 1;
            } else {
                // Lost the race to another settlement pass; the guard held.
                warn!(
                    prediction_id = %prediction.id,
                    match_id,
                    "Prediction was already settled"
                );
            }
        }

        info!(
            match_id,
            winner = %winner,
            settled,
            "Match settled"
        );

        Ok(settled)
    }

    async fn settle_abandoned(&self, match_id: &str) -> Result<usize> {
        let voided = self.store.void_latest(match_id).await?;
        info!(match_id, voided, "Match abandoned, predictions voided");
        Ok(voided)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Agent, Match, NewPrediction, PredictionWindow, Provider};

    // -- Pure scoring ------------------------------------------------------

    #[test]
    fn test_pnl_correct_at_even_confidence() {
        // 100 * (1/0.6 - 1) = 66.666... -> 66.67
        assert!((calculate_pnl(0.6, true) - 66.67).abs() < 1e-10);
    }

    #[test]
    fn test_pnl_correct_at_coin_flip_pays_full_stake() {
        assert!((calculate_pnl(0.5, true) - 100.0).abs() < 1e-10);
    }

    #[test]
    fn test_pnl_correct_at_high_confidence_pays_little() {
        // 100 * (1/0.95 - 1) = 5.263... -> 5.26
        assert!((calculate_pnl(0.95, true) - 5.26).abs() < 1e-10);
    }

    #[test]
    fn test_pnl_incorrect_always_loses_stake() {
        assert!((calculate_pnl(0.95, false) + 100.0).abs() < 1e-10);
        assert!((calculate_pnl(0.5, false) + 100.0).abs() < 1e-10);
    }

    #[test]
    fn test_brier_values() {
        assert!((calculate_brier(0.95, true) - 0.0025).abs() < 1e-10);
        assert!((calculate_brier(0.6, false) - 0.36).abs() < 1e-10);
        assert!((calculate_brier(1.0, true) - 0.0).abs() < 1e-10);
        assert!((calculate_brier(0.5, false) - 0.25).abs() < 1e-10);
    }

    #[test]
    fn test_round_cents() {
        assert!((round_cents(66.66666) - 66.67).abs() < 1e-10);
        assert!((round_cents(-5.005) + 5.0).abs() < 1e-2);
        assert!((round_cents(10.0) - 10.0).abs() < 1e-10);
    }

    // -- Engine over the store ---------------------------------------------

    fn agent(id: &str) -> Agent {
        Agent {
            id: id.to_string(),
            display_name: id.to_string(),
            provider: Provider::Anthropic,
            model_id: "model".to_string(),
            slug: id.to_string(),
            color: String::new(),
            is_active: true,
        }
    }

    async fn seed_predictions(store: &PredictionStore, picks: &[(&str, TeamSide, f64)]) {
        store.insert_match(&Match::sample()).await.unwrap();
        for (agent_id, side, confidence) in picks {
            store.insert_agent(&agent(agent_id)).await.unwrap();
            store
                .record_prediction(&NewPrediction {
                    match_id: "m-001".to_string(),
                    agent_id: agent_id.to_string(),
                    predicted_winner: *side,
                    predicted_team_name: if *side == TeamSide::TeamA {
                        "India".to_string()
                    } else {
                        "Pakistan".to_string()
                    },
                    confidence: *confidence,
                    reasoning: String::new(),
                    prediction_window: PredictionWindow::PreMatch,
                    search_queries: Vec::new(),
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_settle_completed_scores_each_row() {
        let store = PredictionStore::in_memory().await.unwrap();
        seed_predictions(
            &store,
            &[
                ("a1", TeamSide::TeamA, 0.6),
                ("a2", TeamSide::TeamB, 0.8),
            ],
        )
        .await;

        let engine = SettlementEngine::new(store.clone());
        let settled = engine
            .settle("m-001", MatchOutcome::Won(TeamSide::TeamA))
            .await
            .unwrap();
        assert_eq!(settled, 2);

        let predictions = store.fetch_predictions_for_match("m-001").await.unwrap();
        let winner = predictions.iter().find(|p| p.agent_id == "a1").unwrap();
        assert_eq!(winner.is_correct, Some(true));
        assert_eq!(winner.points_awarded, Some(1));
        assert!((winner.pnl.unwrap() - 66.67).abs() < 1e-10);
        assert!((winner.brier_score.unwrap() - 0.16).abs() < 1e-10);

        let loser = predictions.iter().find(|p| p.agent_id == "a2").unwrap();
        assert_eq!(loser.is_correct, Some(false));
        assert_eq!(loser.points_awarded, Some(0));
        assert!((loser.pnl.unwrap() + 100.0).abs() < 1e-10);
        assert!((loser.brier_score.unwrap() - 0.64).abs() < 1e-10);
    }

    #[tokio::test]
    async fn test_settlement_is_idempotent() {
        let store = PredictionStore::in_memory().await.unwrap();
        seed_predictions(&store, &[("a1", TeamSide::TeamA, 0.7)]).await;

        let engine = SettlementEngine::new(store.clone());
        let first = engine
            .settle("m-001", MatchOutcome::Won(TeamSide::TeamA))
            .await
            .unwrap();
        assert_eq!(first, 1);

        let before = store.fetch_predictions_for_match("m-001").await.unwrap();

        // A second pass, even with the opposite winner, touches nothing.
        let second = engine
            .settle("m-001", MatchOutcome::Won(TeamSide::TeamB))
            .await
            .unwrap();
        assert_eq!(second, 0);

        let after = store.fetch_predictions_for_match("m-001").await.unwrap();
        assert_eq!(before[0].is_correct, after[0].is_correct);
        assert_eq!(before[0].pnl, after[0].pnl);
        assert_eq!(before[0].brier_score, after[0].brier_score);
    }

    #[tokio::test]
    async fn test_settle_only_touches_latest_rows() {
        let store = PredictionStore::in_memory().await.unwrap();
        seed_predictions(&store, &[("a1", TeamSide::TeamA, 0.6)]).await;

        // A second prediction supersedes the first.
        store
            .record_prediction(&NewPrediction {
                match_id: "m-001".to_string(),
                agent_id: "a1".to_string(),
                predicted_winner: TeamSide::TeamB,
                predicted_team_name: "Pakistan".to_string(),
                confidence: 0.55,
                reasoning: String::new(),
                prediction_window: PredictionWindow::PostXi,
                search_queries: Vec::new(),
            })
            .await
            .unwrap();

        let engine = SettlementEngine::new(store.clone());
        let settled = engine
            .settle("m-001", MatchOutcome::Won(TeamSide::TeamA))
            .await
            .unwrap();
        assert_eq!(settled, 1);

        let predictions = store.fetch_predictions_for_match("m-001").await.unwrap();
        let superseded = predictions.iter().find(|p| !p.is_latest).unwrap();
        assert!(superseded.is_correct.is_none());

        let latest = predictions.iter().find(|p| p.is_latest).unwrap();
        assert_eq!(latest.is_correct, Some(false));
    }

    #[tokio::test]
    async fn test_abandoned_voids_settled_predictions() {
        let store = PredictionStore::in_memory().await.unwrap();
        seed_predictions(
            &store,
            &[
                ("a1", TeamSide::TeamA, 0.6),
                ("a2", TeamSide::TeamA, 0.9),
                ("a3", TeamSide::TeamB, 0.7),
                ("a4", TeamSide::TeamB, 0.55),
            ],
        )
        .await;

        let engine = SettlementEngine::new(store.clone());
        engine
            .settle("m-001", MatchOutcome::Won(TeamSide::TeamA))
            .await
            .unwrap();

        // The match is later ruled abandoned: every row is voided, even
        // though all four were already settled with nonzero pnl.
        let voided = engine.settle("m-001", MatchOutcome::Abandoned).await.unwrap();
        assert_eq!(voided, 4);

        for p in store.fetch_predictions_for_match("m-001").await.unwrap() {
            assert!(p.is_correct.is_none());
            assert_eq!(p.points_awarded, Some(0));
            assert_eq!(p.pnl, Some(0.0));
            assert!(p.brier_score.is_none());
        }
    }
}
