//! PAVILION — Multi-Model Cricket Match Prediction Arena
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the provider registry from configured credentials, and runs
//! the periodic predict/settle sweep with graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use pavilion::config::{AppConfig, ProvidersConfig};
use pavilion::dashboard;
use pavilion::leaderboard::Aggregator;
use pavilion::orchestrator::{CallPolicy, Orchestrator};
use pavilion::providers::anthropic::AnthropicProvider;
use pavilion::providers::google::GoogleProvider;
use pavilion::providers::openai::OpenAiProvider;
use pavilion::providers::xai::XaiProvider;
use pavilion::providers::ProviderRegistry;
use pavilion::settlement::{MatchOutcome, SettlementEngine};
use pavilion::storage::PredictionStore;
use pavilion::types::MatchStatus;

const BANNER: &str = r#"
  ____   _ __     _____ _     ___ ___  _   _
 |  _ \ / \\ \   / /_ _| |   |_ _/ _ \| \ | |
 | |_) / _ \\ \ / / | || |    | | | | |  \| |
 |  __/ ___ \\ V /  | || |___ | | |_| | |\  |
 |_| /_/   \_\\_/  |___|_____|___\___/|_| \_|

  Multi-Model Cricket Match Prediction Arena
  v0.1.0 — Four models. Every match. One leaderboard.
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        service = %cfg.service.name,
        sweep_interval_secs = cfg.service.sweep_interval_secs,
        lead_window_hours = cfg.service.lead_window_hours,
        "PAVILION starting up"
    );

    // -- Initialise components -------------------------------------------

    let store = PredictionStore::connect(&cfg.storage.database_url).await?;

    let registry = build_registry(&cfg.providers)?;
    if registry.is_empty() {
        warn!("No provider API keys configured; sweeps will record failures only");
    } else {
        info!(providers = ?registry.providers(), "Provider registry ready");
    }

    let policy = CallPolicy {
        deadline: Duration::from_secs(cfg.prediction.timeout_secs),
        retry_delay: Duration::from_secs(cfg.prediction.retry_delay_secs),
    };
    let orchestrator = Orchestrator::with_policy(registry, store.clone(), policy);
    let engine = SettlementEngine::new(store.clone());

    if cfg.dashboard.enabled {
        let state = Arc::new(Aggregator::new(store.clone()));
        dashboard::spawn_dashboard(state, cfg.dashboard.port)?;
    }

    // -- Main loop ---------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.service.sweep_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.service.sweep_interval_secs,
        "Entering sweep loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match run_sweep(&store, &orchestrator, &engine, cfg.service.lead_window_hours).await {
                    Ok(report) => log_sweep_report(&report),
                    Err(e) => error!(error = %e, "Sweep failed, continuing to next"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("PAVILION shut down cleanly.");
    Ok(())
}

/// Build the provider registry from configured credentials. A provider
/// with no key in the environment is skipped with a warning.
fn build_registry(cfg: &ProvidersConfig) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();

    if let Some(pc) = &cfg.anthropic {
        match AppConfig::resolve_env(&pc.api_key_env) {
            Ok(key) => registry.register(Arc::new(AnthropicProvider::new(
                key,
                Some(pc.model.clone()),
                pc.max_tokens,
            )?)),
            Err(_) => warn!(env = %pc.api_key_env, "Anthropic key not set, provider disabled"),
        }
    }

    if let Some(pc) = &cfg.openai {
        match AppConfig::resolve_env(&pc.api_key_env) {
            Ok(key) => registry.register(Arc::new(OpenAiProvider::new(key, Some(pc.model.clone()))?)),
            Err(_) => warn!(env = %pc.api_key_env, "OpenAI key not set, provider disabled"),
        }
    }

    if let Some(pc) = &cfg.google {
        match AppConfig::resolve_env(&pc.api_key_env) {
            Ok(key) => registry.register(Arc::new(GoogleProvider::new(key, Some(pc.model.clone()))?)),
            Err(_) => warn!(env = %pc.api_key_env, "Google key not set, provider disabled"),
        }
    }

    if let Some(pc) = &cfg.xai {
        match AppConfig::resolve_env(&pc.api_key_env) {
            Ok(key) => registry.register(Arc::new(XaiProvider::new(key, Some(pc.model.clone()))?)),
            Err(_) => warn!(env = %pc.api_key_env, "xAI key not set, provider disabled"),
        }
    }

    Ok(registry)
}

/// Summary of one predict/settle sweep.
#[derive(Debug, Default)]
struct SweepReport {
    matches_considered: usize,
    predictions_created: usize,
    agents_skipped: usize,
    failures: usize,
    matches_settled: usize,
    predictions_settled: usize,
    predictions_voided: usize,
}

/// One sweep: call agents for upcoming matches inside the lead window
/// (skipping agents that already hold a prediction for the match's
/// current window), then settle matches whose results have landed.
async fn run_sweep(
    store: &PredictionStore,
    orchestrator: &Orchestrator,
    engine: &SettlementEngine,
    lead_window_hours: i64,
) -> Result<SweepReport> {
    let mut report = SweepReport::default();

    // -- Predict -----------------------------------------------------------

    let upcoming = store.fetch_upcoming_within(lead_window_hours).await?;
    let agents = store.fetch_active_agents(None).await?;
    report.matches_considered = upcoming.len();

    for m in &upcoming {
        let window = m.prediction_window();
        let existing = store.agents_with_prediction(&m.id, window).await?;

        let pending: Vec<_> = agents
            .iter()
            .filter(|a| !existing.contains(&a.id))
            .cloned()
            .collect();
        report.agents_skipped += agents.len() - pending.len();

        if pending.is_empty() {
            continue;
        }

        let outcomes = orchestrator.orchestrate(m, &pending).await;
        for outcome in &outcomes {
            if outcome.is_success() {
                report.predictions_created += 1;
            } else {
                report.failures += 1;
            }
        }
    }

    // -- Settle ------------------------------------------------------------

    for m in store.fetch_matches_by_status(MatchStatus::Completed).await? {
        match m.winner {
            Some(winner) => {
                let settled = engine.settle(&m.id, MatchOutcome::Won(winner)).await?;
                if settled > 0 {
                    report.matches_settled += 1;
                    report.predictions_settled += settled;
                }
            }
            None => warn!(match_id = %m.id, "Completed match has no winner recorded"),
        }
    }

    for m in store.fetch_matches_by_status(MatchStatus::Abandoned).await? {
        report.predictions_voided += engine.settle(&m.id, MatchOutcome::Abandoned).await?;
    }

    Ok(report)
}

fn log_sweep_report(report: &SweepReport) {
    info!(
        matches = report.matches_considered,
        created = report.predictions_created,
        skipped = report.agents_skipped,
        failures = report.failures,
        settled_matches = report.matches_settled,
        settled_predictions = report.predictions_settled,
        voided = report.predictions_voided,
        "Sweep complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pavilion=info"));

    let json_logging = std::env::var("PAVILION_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
