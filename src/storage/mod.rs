//! Persistence layer.
//!
//! SQLite-backed store for matches, agents, predictions, and audit logs.
//! All writes are scoped to a single (match, agent) key tuple; the
//! supersede-then-insert sequence runs inside one transaction so that
//! concurrent writers for the same pair can never leave two rows marked
//! latest. Settlement updates carry their idempotency guard in SQL.

use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{
    Agent, Match, MatchStatus, NewLog, NewPrediction, Prediction, PredictionWindow, TeamSide,
};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS agents (
        id TEXT PRIMARY KEY,
        display_name TEXT NOT NULL,
        provider TEXT NOT NULL,
        model_id TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        color TEXT NOT NULL DEFAULT '',
        is_active INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS matches (
        id TEXT PRIMARY KEY,
        match_number INTEGER NOT NULL,
        stage TEXT NOT NULL,
        group_name TEXT,
        team_a TEXT NOT NULL,
        team_b TEXT NOT NULL,
        venue TEXT NOT NULL,
        scheduled_at TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'upcoming',
        winner TEXT,
        winner_team_name TEXT,
        result_summary TEXT,
        playing_xi_a TEXT,
        playing_xi_b TEXT,
        xi_announced_at TEXT,
        toss_winner TEXT,
        toss_decision TEXT
    )",
    "CREATE TABLE IF NOT EXISTS predictions (
        id TEXT PRIMARY KEY,
        match_id TEXT NOT NULL REFERENCES matches(id),
        agent_id TEXT NOT NULL REFERENCES agents(id),
        predicted_winner TEXT NOT NULL,
        predicted_team_name TEXT NOT NULL,
        confidence REAL NOT NULL,
        reasoning TEXT NOT NULL DEFAULT '',
        prediction_window TEXT NOT NULL,
        is_latest INTEGER NOT NULL DEFAULT 1,
        search_queries TEXT NOT NULL DEFAULT '[]',
        is_correct INTEGER,
        points_awarded INTEGER,
        pnl REAL,
        brier_score REAL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_predictions_match ON predictions(match_id, is_latest)",
    "CREATE INDEX IF NOT EXISTS idx_predictions_agent ON predictions(agent_id, is_latest)",
    "CREATE TABLE IF NOT EXISTS prediction_logs (
        id TEXT PRIMARY KEY,
        prediction_id TEXT REFERENCES predictions(id),
        raw_prompt TEXT NOT NULL,
        raw_response TEXT,
        tokens_used INTEGER,
        latency_ms INTEGER,
        created_at TEXT NOT NULL
    )",
];

// ---------------------------------------------------------------------------
// Timestamp helpers
// ---------------------------------------------------------------------------

/// Timestamps are stored as RFC 3339 TEXT in a single canonical format so
/// that lexicographic SQL comparisons order correctly.
fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid timestamp in database: {s}"))?
        .with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Season totals
// ---------------------------------------------------------------------------

/// Cross-arena counters surfaced on the read side.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SeasonTotals {
    pub total_matches: i64,
    pub completed_matches: i64,
    pub total_predictions: i64,
    pub best_single_pnl: f64,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// The shared persistence handle. Cheap to clone (wraps a pool).
#[derive(Clone)]
pub struct PredictionStore {
    pool: SqlitePool,
}

impl PredictionStore {
    /// Connect to the configured database and ensure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .with_context(|| format!("failed to connect to {database_url}"))?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(database_url, "Store connected");
        Ok(store)
    }

    /// An isolated in-memory database. A single connection keeps every
    /// query on the same memory instance.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            // Skip the per-acquire liveness ping: with a single shared
            // in-memory connection it adds nothing, and the ping's await on
            // the sqlite worker thread races tokio's auto-advancing paused
            // clock in time-controlled tests.
            .test_before_acquire(false)
            .connect("sqlite::memory:")
            .await
            .context("failed to open in-memory database")?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("failed to apply schema")?;
        }
        Ok(())
    }

    // -- Agents ------------------------------------------------------------

    pub async fn insert_agent(&self, agent: &Agent) -> Result<()> {
        sqlx::query(
            "INSERT INTO agents (id, display_name, provider, model_id, slug, color, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&agent.id)
        .bind(&agent.display_name)
        .bind(agent.provider.as_str())
        .bind(&agent.model_id)
        .bind(&agent.slug)
        .bind(&agent.color)
        .bind(agent.is_active)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert agent {}", agent.id))?;
        Ok(())
    }

    /// Fetch active agents, optionally restricted to an id set.
    pub async fn fetch_active_agents(&self, ids: Option<&[String]>) -> Result<Vec<Agent>> {
        let rows = sqlx::query("SELECT * FROM agents WHERE is_active = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch agents")?;

        let mut agents = rows
            .iter()
            .map(row_to_agent)
            .collect::<Result<Vec<_>>>()?;

        if let Some(ids) = ids {
            let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
            agents.retain(|a| wanted.contains(a.id.as_str()));
        }

        Ok(agents)
    }

    pub async fn fetch_agent_by_slug(&self, slug: &str) -> Result<Option<Agent>> {
        let row = sqlx::query("SELECT * FROM agents WHERE slug = ?1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch agent by slug")?;
        row.as_ref().map(row_to_agent).transpose()
    }

    // -- Matches -----------------------------------------------------------

    pub async fn insert_match(&self, m: &Match) -> Result<()> {
        sqlx::query(
            "INSERT INTO matches (id, match_number, stage, group_name, team_a, team_b, venue,
                                  scheduled_at, status, winner, winner_team_name, result_summary,
                                  playing_xi_a, playing_xi_b, xi_announced_at, toss_winner, toss_decision)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        )
        .bind(&m.id)
        .bind(m.match_number)
        .bind(&m.stage)
        .bind(&m.group_name)
        .bind(&m.team_a)
        .bind(&m.team_b)
        .bind(&m.venue)
        .bind(fmt_ts(m.scheduled_at))
        .bind(m.status.as_str())
        .bind(m.winner.map(|w| w.as_str()))
        .bind(&m.winner_team_name)
        .bind(&m.result_summary)
        .bind(xi_to_json(&m.playing_xi_a)?)
        .bind(xi_to_json(&m.playing_xi_b)?)
        .bind(m.xi_announced_at.map(fmt_ts))
        .bind(&m.toss_winner)
        .bind(&m.toss_decision)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert match {}", m.id))?;
        Ok(())
    }

    pub async fn fetch_match(&self, id: &str) -> Result<Option<Match>> {
        let row = sqlx::query("SELECT * FROM matches WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to fetch match {id}"))?;
        row.as_ref().map(row_to_match).transpose()
    }

    pub async fn fetch_matches_by_status(&self, status: MatchStatus) -> Result<Vec<Match>> {
        let rows = sqlx::query("SELECT * FROM matches WHERE status = ?1 ORDER BY scheduled_at")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch matches by status")?;
        rows.iter().map(row_to_match).collect()
    }

    /// Upcoming matches scheduled within the next `hours` hours.
    pub async fn fetch_upcoming_within(&self, hours: i64) -> Result<Vec<Match>> {
        let now = Utc::now();
        let horizon = now + chrono::Duration::hours(hours);
        let rows = sqlx::query(
            "SELECT * FROM matches
             WHERE status = 'upcoming' AND scheduled_at >= ?1 AND scheduled_at <= ?2
             ORDER BY scheduled_at",
        )
        .bind(fmt_ts(now))
        .bind(fmt_ts(horizon))
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch upcoming matches")?;
        rows.iter().map(row_to_match).collect()
    }

    /// Record lineup/toss announcements (collaborator write path).
    pub async fn update_match_lineups(
        &self,
        match_id: &str,
        xi_a: Option<Vec<String>>,
        xi_b: Option<Vec<String>>,
        toss_winner: Option<String>,
        toss_decision: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE matches SET playing_xi_a = ?2, playing_xi_b = ?3, xi_announced_at = ?4,
                                toss_winner = ?5, toss_decision = ?6
             WHERE id = ?1",
        )
        .bind(match_id)
        .bind(xi_to_json(&xi_a)?)
        .bind(xi_to_json(&xi_b)?)
        .bind(fmt_ts(Utc::now()))
        .bind(toss_winner)
        .bind(toss_decision)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update lineups for match {match_id}"))?;
        Ok(())
    }

    /// Record a finalized result (collaborator write path).
    pub async fn update_match_result(
        &self,
        match_id: &str,
        status: MatchStatus,
        winner: Option<TeamSide>,
        winner_team_name: Option<String>,
        result_summary: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE matches SET status = ?2, winner = ?3, winner_team_name = ?4, result_summary = ?5
             WHERE id = ?1",
        )
        .bind(match_id)
        .bind(status.as_str())
        .bind(winner.map(|w| w.as_str()))
        .bind(winner_team_name)
        .bind(result_summary)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update result for match {match_id}"))?;
        Ok(())
    }

    // -- Predictions -------------------------------------------------------

    /// Store a new prediction, superseding every prior row for the same
    /// (match, agent) pair. Both writes run in one transaction; the write
    /// path is the sole invalidation point for `is_latest`.
    pub async fn record_prediction(&self, new: &NewPrediction) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let queries_json =
            serde_json::to_string(&new.search_queries).context("failed to encode search queries")?;

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin supersede transaction")?;

        sqlx::query("UPDATE predictions SET is_latest = 0 WHERE match_id = ?1 AND agent_id = ?2")
            .bind(&new.match_id)
            .bind(&new.agent_id)
            .execute(&mut *tx)
            .await
            .context("failed to supersede prior predictions")?;

        sqlx::query(
            "INSERT INTO predictions (id, match_id, agent_id, predicted_winner, predicted_team_name,
                                      confidence, reasoning, prediction_window, is_latest,
                                      search_queries, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10)",
        )
        .bind(&id)
        .bind(&new.match_id)
        .bind(&new.agent_id)
        .bind(new.predicted_winner.as_str())
        .bind(&new.predicted_team_name)
        .bind(new.confidence)
        .bind(&new.reasoning)
        .bind(new.prediction_window.as_str())
        .bind(&queries_json)
        .bind(fmt_ts(Utc::now()))
        .execute(&mut *tx)
        .await
        .context("failed to insert prediction")?;

        tx.commit().await.context("failed to commit prediction")?;

        debug!(
            prediction_id = %id,
            match_id = %new.match_id,
            agent_id = %new.agent_id,
            window = %new.prediction_window,
            "Prediction stored"
        );

        Ok(id)
    }

    pub async fn fetch_predictions_for_match(&self, match_id: &str) -> Result<Vec<Prediction>> {
        let rows = sqlx::query(
            "SELECT * FROM predictions WHERE match_id = ?1 ORDER BY created_at, rowid",
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch predictions for match")?;
        rows.iter().map(row_to_prediction).collect()
    }

    /// Agents that already hold a prediction for (match, window): the
    /// sweep's idempotency check.
    pub async fn agents_with_prediction(
        &self,
        match_id: &str,
        window: PredictionWindow,
    ) -> Result<HashSet<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT agent_id FROM predictions
             WHERE match_id = ?1 AND prediction_window = ?2",
        )
        .bind(match_id)
        .bind(window.as_str())
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch existing prediction owners")?;

        Ok(rows
            .iter()
            .map(|row| row.get::<String, _>("agent_id"))
            .collect())
    }

    // -- Logs --------------------------------------------------------------

    pub async fn record_log(&self, log: &NewLog) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO prediction_logs (id, prediction_id, raw_prompt, raw_response,
                                          tokens_used, latency_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&id)
        .bind(&log.prediction_id)
        .bind(&log.raw_prompt)
        .bind(&log.raw_response)
        .bind(log.tokens_used)
        .bind(log.latency_ms)
        .bind(fmt_ts(Utc::now()))
        .execute(&self.pool)
        .await
        .context("failed to insert prediction log")?;
        Ok(id)
    }

    pub async fn count_logs(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM prediction_logs")
            .fetch_one(&self.pool)
            .await
            .context("failed to count logs")?;
        Ok(row.get("cnt"))
    }

    // -- Settlement --------------------------------------------------------

    /// Latest predictions for a match that have not been settled yet.
    pub async fn fetch_unsettled_latest(&self, match_id: &str) -> Result<Vec<Prediction>> {
        let rows = sqlx::query(
            "SELECT * FROM predictions
             WHERE match_id = ?1 AND is_latest = 1 AND is_correct IS NULL",
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch unsettled predictions")?;
        rows.iter().map(row_to_prediction).collect()
    }

    /// Write settlement fields onto one prediction. The `is_correct IS
    /// NULL` guard makes a repeat call a no-op; returns whether a row was
    /// actually written.
    pub async fn apply_settlement(
        &self,
        prediction_id: &str,
        is_correct: bool,
        points_awarded: i64,
        pnl: f64,
        brier_score: f64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE predictions
             SET is_correct = ?2, points_awarded = ?3, pnl = ?4, brier_score = ?5
             WHERE id = ?1 AND is_correct IS NULL",
        )
        .bind(prediction_id)
        .bind(is_correct)
        .bind(points_awarded)
        .bind(pnl)
        .bind(brier_score)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to settle prediction {prediction_id}"))?;
        Ok(result.rows_affected() > 0)
    }

    /// Void every latest prediction on an abandoned match, including rows
    /// that were previously settled. Returns the number of rows touched.
    pub async fn void_latest(&self, match_id: &str) -> Result<usize> {
        let result = sqlx::query(
            "UPDATE predictions
             SET is_correct = NULL, points_awarded = 0, pnl = 0.0, brier_score = NULL
             WHERE match_id = ?1 AND is_latest = 1",
        )
        .bind(match_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to void predictions for match {match_id}"))?;
        Ok(result.rows_affected() as usize)
    }

    // -- Leaderboard reads -------------------------------------------------

    /// An agent's settled latest predictions, oldest first (streak order).
    pub async fn fetch_settled_latest_for_agent(&self, agent_id: &str) -> Result<Vec<Prediction>> {
        let rows = sqlx::query(
            "SELECT * FROM predictions
             WHERE agent_id = ?1 AND is_latest = 1 AND is_correct IS NOT NULL
             ORDER BY created_at, rowid",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch settled predictions for agent")?;
        rows.iter().map(row_to_prediction).collect()
    }

    /// Every settled latest prediction across all agents (head-to-head
    /// input).
    pub async fn fetch_latest_settled(&self) -> Result<Vec<Prediction>> {
        let rows = sqlx::query(
            "SELECT * FROM predictions
             WHERE is_latest = 1 AND is_correct IS NOT NULL
             ORDER BY created_at, rowid",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch settled predictions")?;
        rows.iter().map(row_to_prediction).collect()
    }

    /// Cross-arena counters for the season view.
    pub async fn season_totals(&self) -> Result<SeasonTotals> {
        let total_matches: i64 = sqlx::query("SELECT COUNT(*) AS cnt FROM matches")
            .fetch_one(&self.pool)
            .await
            .context("failed to count matches")?
            .get("cnt");

        let completed_matches: i64 =
            sqlx::query("SELECT COUNT(*) AS cnt FROM matches WHERE status = 'completed'")
                .fetch_one(&self.pool)
                .await
                .context("failed to count completed matches")?
                .get("cnt");

        let total_predictions: i64 =
            sqlx::query("SELECT COUNT(*) AS cnt FROM predictions WHERE is_latest = 1")
                .fetch_one(&self.pool)
                .await
                .context("failed to count predictions")?
                .get("cnt");

        let best_single_pnl: Option<f64> =
            sqlx::query("SELECT MAX(pnl) AS best FROM predictions WHERE is_latest = 1")
                .fetch_one(&self.pool)
                .await
                .context("failed to compute best pnl")?
                .get("best");

        Ok(SeasonTotals {
            total_matches,
            completed_matches,
            total_predictions,
            best_single_pnl: best_single_pnl.unwrap_or(0.0),
        })
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn xi_to_json(xi: &Option<Vec<String>>) -> Result<Option<String>> {
    xi.as_ref()
        .map(|v| serde_json::to_string(v).context("failed to encode playing XI"))
        .transpose()
}

fn xi_from_json(raw: Option<String>) -> Result<Option<Vec<String>>> {
    raw.map(|s| serde_json::from_str(&s).context("invalid playing XI in database"))
        .transpose()
}

fn row_to_agent(row: &SqliteRow) -> Result<Agent> {
    Ok(Agent {
        id: row.get("id"),
        display_name: row.get("display_name"),
        provider: row.get::<String, _>("provider").parse()?,
        model_id: row.get("model_id"),
        slug: row.get("slug"),
        color: row.get("color"),
        is_active: row.get("is_active"),
    })
}

fn row_to_match(row: &SqliteRow) -> Result<Match> {
    Ok(Match {
        id: row.get("id"),
        match_number: row.get("match_number"),
        stage: row.get("stage"),
        group_name: row.get("group_name"),
        team_a: row.get("team_a"),
        team_b: row.get("team_b"),
        venue: row.get("venue"),
        scheduled_at: parse_ts(&row.get::<String, _>("scheduled_at"))?,
        status: row.get::<String, _>("status").parse()?,
        winner: row
            .get::<Option<String>, _>("winner")
            .map(|w| w.parse())
            .transpose()?,
        winner_team_name: row.get("winner_team_name"),
        result_summary: row.get("result_summary"),
        playing_xi_a: xi_from_json(row.get("playing_xi_a"))?,
        playing_xi_b: xi_from_json(row.get("playing_xi_b"))?,
        xi_announced_at: row
            .get::<Option<String>, _>("xi_announced_at")
            .map(|s| parse_ts(&s))
            .transpose()?,
        toss_winner: row.get("toss_winner"),
        toss_decision: row.get("toss_decision"),
    })
}

fn row_to_prediction(row: &SqliteRow) -> Result<Prediction> {
    Ok(Prediction {
        id: row.get("id"),
        match_id: row.get("match_id"),
        agent_id: row.get("agent_id"),
        predicted_winner: row.get::<String, _>("predicted_winner").parse()?,
        predicted_team_name: row.get("predicted_team_name"),
        confidence: row.get("confidence"),
        reasoning: row.get("reasoning"),
        prediction_window: row.get::<String, _>("prediction_window").parse()?,
        is_latest: row.get("is_latest"),
        search_queries: serde_json::from_str(&row.get::<String, _>("search_queries"))
            .context("invalid search queries in database")?,
        is_correct: row.get("is_correct"),
        points_awarded: row.get("points_awarded"),
        pnl: row.get("pnl"),
        brier_score: row.get("brier_score"),
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Provider;

    fn sample_agent(id: &str, provider: Provider) -> Agent {
        Agent {
            id: id.to_string(),
            display_name: format!("Agent {id}"),
            provider,
            model_id: "model-x".to_string(),
            slug: id.to_string(),
            color: "#888888".to_string(),
            is_active: true,
        }
    }

    fn new_prediction(match_id: &str, agent_id: &str, window: PredictionWindow) -> NewPrediction {
        NewPrediction {
            match_id: match_id.to_string(),
            agent_id: agent_id.to_string(),
            predicted_winner: TeamSide::TeamA,
            predicted_team_name: "India".to_string(),
            confidence: 0.7,
            reasoning: "form".to_string(),
            prediction_window: window,
            search_queries: vec!["pitch report".to_string()],
        }
    }

    #[tokio::test]
    async fn test_match_roundtrip() {
        let store = PredictionStore::in_memory().await.unwrap();
        let mut m = Match::sample();
        m.playing_xi_a = Some(vec!["Rohit Sharma".into(), "Virat Kohli".into()]);
        m.toss_winner = Some("India".into());

        store.insert_match(&m).await.unwrap();
        let fetched = store.fetch_match(&m.id).await.unwrap().unwrap();

        assert_eq!(fetched.team_a, "India");
        assert_eq!(fetched.status, MatchStatus::Upcoming);
        assert_eq!(fetched.playing_xi_a.as_ref().unwrap().len(), 2);
        assert!(fetched.playing_xi_b.is_none());
        assert_eq!(fetched.toss_winner.as_deref(), Some("India"));
        // Timestamps survive the TEXT roundtrip to the millisecond.
        assert_eq!(
            fetched.scheduled_at.timestamp_millis(),
            m.scheduled_at.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_fetch_missing_match() {
        let store = PredictionStore::in_memory().await.unwrap();
        assert!(store.fetch_match("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_agent_roundtrip_and_filter() {
        let store = PredictionStore::in_memory().await.unwrap();
        store
            .insert_agent(&sample_agent("claude", Provider::Anthropic))
            .await
            .unwrap();
        store
            .insert_agent(&sample_agent("gpt", Provider::OpenAi))
            .await
            .unwrap();
        let mut inactive = sample_agent("grok", Provider::Xai);
        inactive.is_active = false;
        store.insert_agent(&inactive).await.unwrap();

        let all = store.fetch_active_agents(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].provider, Provider::Anthropic);

        let filtered = store
            .fetch_active_agents(Some(&["gpt".to_string()]))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "gpt");

        let by_slug = store.fetch_agent_by_slug("claude").await.unwrap().unwrap();
        assert_eq!(by_slug.id, "claude");
    }

    #[tokio::test]
    async fn test_record_prediction_supersedes_prior() {
        let store = PredictionStore::in_memory().await.unwrap();
        store.insert_match(&Match::sample()).await.unwrap();
        store
            .insert_agent(&sample_agent("claude", Provider::Anthropic))
            .await
            .unwrap();

        let first = store
            .record_prediction(&new_prediction("m-001", "claude", PredictionWindow::PreMatch))
            .await
            .unwrap();
        let second = store
            .record_prediction(&new_prediction("m-001", "claude", PredictionWindow::PostXi))
            .await
            .unwrap();

        let all = store.fetch_predictions_for_match("m-001").await.unwrap();
        assert_eq!(all.len(), 2);

        let latest: Vec<_> = all.iter().filter(|p| p.is_latest).collect();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, second);
        assert_eq!(latest[0].prediction_window, PredictionWindow::PostXi);

        let superseded = all.iter().find(|p| p.id == first).unwrap();
        assert!(!superseded.is_latest);
    }

    #[tokio::test]
    async fn test_supersede_is_scoped_to_the_pair() {
        let store = PredictionStore::in_memory().await.unwrap();
        store.insert_match(&Match::sample()).await.unwrap();
        store
            .insert_agent(&sample_agent("claude", Provider::Anthropic))
            .await
            .unwrap();
        store
            .insert_agent(&sample_agent("gpt", Provider::OpenAi))
            .await
            .unwrap();

        store
            .record_prediction(&new_prediction("m-001", "claude", PredictionWindow::PreMatch))
            .await
            .unwrap();
        store
            .record_prediction(&new_prediction("m-001", "gpt", PredictionWindow::PreMatch))
            .await
            .unwrap();

        let all = store.fetch_predictions_for_match("m-001").await.unwrap();
        assert!(all.iter().all(|p| p.is_latest));
    }

    #[tokio::test]
    async fn test_agents_with_prediction_by_window() {
        let store = PredictionStore::in_memory().await.unwrap();
        store.insert_match(&Match::sample()).await.unwrap();
        store
            .insert_agent(&sample_agent("claude", Provider::Anthropic))
            .await
            .unwrap();

        store
            .record_prediction(&new_prediction("m-001", "claude", PredictionWindow::PreMatch))
            .await
            .unwrap();

        let pre = store
            .agents_with_prediction("m-001", PredictionWindow::PreMatch)
            .await
            .unwrap();
        assert!(pre.contains("claude"));

        let post = store
            .agents_with_prediction("m-001", PredictionWindow::PostXi)
            .await
            .unwrap();
        assert!(post.is_empty());
    }

    #[tokio::test]
    async fn test_apply_settlement_guard() {
        let store = PredictionStore::in_memory().await.unwrap();
        store.insert_match(&Match::sample()).await.unwrap();
        store
            .insert_agent(&sample_agent("claude", Provider::Anthropic))
            .await
            .unwrap();
        let id = store
            .record_prediction(&new_prediction("m-001", "claude", PredictionWindow::PreMatch))
            .await
            .unwrap();

        assert!(store
            .apply_settlement(&id, true, 1, 42.86, 0.09)
            .await
            .unwrap());
        // Second write is rejected by the null guard.
        assert!(!store
            .apply_settlement(&id, false, 0, -100.0, 0.49)
            .await
            .unwrap());

        let p = &store.fetch_predictions_for_match("m-001").await.unwrap()[0];
        assert_eq!(p.is_correct, Some(true));
        assert_eq!(p.points_awarded, Some(1));
    }

    #[tokio::test]
    async fn test_void_latest_resets_settled_rows() {
        let store = PredictionStore::in_memory().await.unwrap();
        store.insert_match(&Match::sample()).await.unwrap();
        store
            .insert_agent(&sample_agent("claude", Provider::Anthropic))
            .await
            .unwrap();
        let id = store
            .record_prediction(&new_prediction("m-001", "claude", PredictionWindow::PreMatch))
            .await
            .unwrap();
        store
            .apply_settlement(&id, true, 1, 42.86, 0.09)
            .await
            .unwrap();

        let voided = store.void_latest("m-001").await.unwrap();
        assert_eq!(voided, 1);

        let p = &store.fetch_predictions_for_match("m-001").await.unwrap()[0];
        assert!(p.is_correct.is_none());
        assert_eq!(p.points_awarded, Some(0));
        assert_eq!(p.pnl, Some(0.0));
        assert!(p.brier_score.is_none());
    }

    #[tokio::test]
    async fn test_fetch_upcoming_within_window() {
        let store = PredictionStore::in_memory().await.unwrap();

        let mut soon = Match::sample();
        soon.id = "m-soon".into();
        soon.scheduled_at = Utc::now() + chrono::Duration::hours(6);
        store.insert_match(&soon).await.unwrap();

        let mut far = Match::sample();
        far.id = "m-far".into();
        far.match_number = 2;
        far.scheduled_at = Utc::now() + chrono::Duration::hours(100);
        store.insert_match(&far).await.unwrap();

        let within = store.fetch_upcoming_within(48).await.unwrap();
        assert_eq!(within.len(), 1);
        assert_eq!(within[0].id, "m-soon");
    }

    #[tokio::test]
    async fn test_season_totals() {
        let store = PredictionStore::in_memory().await.unwrap();
        store.insert_match(&Match::sample()).await.unwrap();
        store
            .insert_agent(&sample_agent("claude", Provider::Anthropic))
            .await
            .unwrap();
        let id = store
            .record_prediction(&new_prediction("m-001", "claude", PredictionWindow::PreMatch))
            .await
            .unwrap();
        store
            .apply_settlement(&id, true, 1, 42.86, 0.09)
            .await
            .unwrap();
        store
            .update_match_result("m-001", MatchStatus::Completed, Some(TeamSide::TeamA), None, None)
            .await
            .unwrap();

        let totals = store.season_totals().await.unwrap();
        assert_eq!(totals.total_matches, 1);
        assert_eq!(totals.completed_matches, 1);
        assert_eq!(totals.total_predictions, 1);
        assert!((totals.best_single_pnl - 42.86).abs() < 1e-10);
    }

    #[tokio::test]
    async fn test_log_roundtrip() {
        let store = PredictionStore::in_memory().await.unwrap();
        store
            .record_log(&NewLog {
                prediction_id: None,
                raw_prompt: "prompt".into(),
                raw_response: None,
                tokens_used: None,
                latency_ms: None,
            })
            .await
            .unwrap();
        assert_eq!(store.count_logs().await.unwrap(), 1);
    }
}
