//! `rfp-scan`: batch scoring, prior rebuilds, alert delivery and the HTTP API.
//!
//! Reads `rfp.toml` (or the path given with `--config`) and opens the SQLite
//! store named there.
//!
//! ```text
//! rfp-scan score requests.json        # score a batch of entities
//! rfp-scan priors --episodes hist.json # import history, rebuild priors
//! rfp-scan alerts                      # flush due alerts as JSON lines
//! rfp-scan serve                       # JSON API
//! ```

mod config;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rfp_core::{
  Pipeline,
  pipeline::EvaluationRequest,
  store::{AlertOutbox, EpisodeStore},
  temporal::{Episode, PriorBuilder},
};
use rfp_store_sqlite::SqliteStore;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::{net::TcpListener, sync::Semaphore, task::JoinSet};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(author, version, about = "RFP signal scoring pipeline")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "rfp.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Score a JSON array of evaluation requests.
  Score {
    file:    PathBuf,
    /// Print results without persisting opportunities or alerts.
    #[arg(long)]
    dry_run: bool,
  },
  /// Rebuild the temporal prior table from recorded episodes.
  Priors {
    /// JSON array of episodes to import before rebuilding.
    #[arg(long)]
    episodes: Option<PathBuf>,
  },
  /// Print due alerts as JSON lines and mark them delivered.
  Alerts {
    #[arg(long)]
    dry_run: bool,
  },
  /// Serve the JSON API.
  Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let cfg = AppConfig::load(&cli.config)?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;

  match cli.command {
    Command::Score { file, dry_run } => score(&cfg, store, &file, dry_run).await,
    Command::Priors { episodes } => priors(&cfg, &store, episodes.as_deref()).await,
    Command::Alerts { dry_run } => alerts(&store, dry_run).await,
    Command::Serve => serve(&cfg, store).await,
  }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
  let bytes = std::fs::read(path).with_context(|| format!("failed to read {path:?}"))?;
  serde_json::from_slice(&bytes).with_context(|| format!("failed to parse {path:?}"))
}

// ─── score ───────────────────────────────────────────────────────────────────

async fn score(
  cfg: &AppConfig,
  store: SqliteStore,
  file: &Path,
  dry_run: bool,
) -> anyhow::Result<()> {
  let requests: Vec<EvaluationRequest> = read_json(file)?;
  let pipeline = Pipeline::new(&cfg.pipeline_config(), store.clone())
    .context("invalid pipeline configuration")?;
  let pipeline = Arc::new(pipeline);
  let permits = Arc::new(Semaphore::new(cfg.max_parallel.max(1)));
  let as_of = Utc::now();

  tracing::info!(requests = requests.len(), max_parallel = cfg.max_parallel, "scoring batch");

  let mut join_set = JoinSet::new();
  for request in requests {
    let pipeline = pipeline.clone();
    let permits = permits.clone();
    let store = store.clone();
    join_set.spawn(async move {
      let entity_id = request.entity_id.clone();
      let outcome = async {
        let _permit = permits.acquire_owned().await?;
        let evaluation = pipeline.evaluate(&request, as_of).await;
        let recorded = if dry_run { false } else { evaluation.record(&store).await? };
        anyhow::Ok((evaluation, recorded))
      }
      .await;
      (entity_id, outcome)
    });
  }

  let mut opportunities = 0usize;
  let failed = drain(&mut join_set, |(evaluation, recorded)| {
    if evaluation.opportunity.is_some() {
      opportunities += 1;
    }
    let line = json!({
      "entity_id":        evaluation.entity_id,
      "category":         evaluation.category,
      "final_confidence": evaluation.outcome.final_confidence,
      "decision":         evaluation.outcome.decision,
      "actionable":       evaluation.outcome.actionable,
      "priority_tier":    evaluation.priority_tier,
      "fit_score":        evaluation.fit.fit_score,
      "backoff_level":    evaluation.prior.backoff_level,
      "opportunity_id":   evaluation.opportunity.as_ref().map(|o| o.opportunity_id),
      "recorded":         recorded,
    });
    println!("{line}");
  })
  .await;

  tracing::info!(opportunities, failed, dry_run, "batch complete");
  if failed > 0 {
    anyhow::bail!("{failed} entities failed to score");
  }
  Ok(())
}

/// Await every task in `set`, passing each success to `on_done`. A failed
/// entity is logged and counted; it never cancels the tasks still in flight.
async fn drain<T: 'static>(
  set: &mut JoinSet<(String, anyhow::Result<T>)>,
  mut on_done: impl FnMut(T),
) -> usize {
  let mut failed = 0;
  while let Some(joined) = set.join_next().await {
    match joined {
      Ok((_, Ok(done))) => on_done(done),
      Ok((entity_id, Err(e))) => {
        tracing::error!(entity_id = %entity_id, error = ?e, "failed to score entity");
        failed += 1;
      }
      Err(e) => {
        tracing::error!(error = %e, "scoring task aborted");
        failed += 1;
      }
    }
  }
  failed
}

// ─── priors ──────────────────────────────────────────────────────────────────

async fn priors(
  cfg: &AppConfig,
  store: &SqliteStore,
  import: Option<&Path>,
) -> anyhow::Result<()> {
  if let Some(path) = import {
    let episodes: Vec<Episode> = read_json(path)?;
    let offered = episodes.len();
    let inserted = store.record_episodes(episodes).await?;
    tracing::info!(offered, inserted, "imported episodes");
  }

  let history = store.list_episodes().await?;
  let records =
    PriorBuilder::new(cfg.scoring.min_prior_samples).build(&history, Utc::now());
  tracing::info!(episodes = history.len(), records = records.len(), "rebuilt priors");
  store.replace_priors(records).await?;
  Ok(())
}

// ─── alerts ──────────────────────────────────────────────────────────────────

async fn alerts(store: &SqliteStore, dry_run: bool) -> anyhow::Result<()> {
  let now = Utc::now();
  let due = store.due_alerts(now).await?;
  tracing::info!(due = due.len(), dry_run, "flushing alert outbox");

  for alert in due {
    println!("{}", serde_json::to_string(&alert)?);
    if !dry_run && !store.mark_delivered(alert.alert_id, now).await? {
      tracing::warn!(alert_id = %alert.alert_id, "alert already delivered");
    }
  }
  Ok(())
}

// ─── serve ───────────────────────────────────────────────────────────────────

async fn serve(cfg: &AppConfig, store: SqliteStore) -> anyhow::Result<()> {
  let state = rfp_api::AppState::new(Arc::new(store), &cfg.pipeline_config())
    .context("invalid pipeline configuration")?;
  let app = axum::Router::new().nest("/api", rfp_api::api_router(state));
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;
  Ok(())
}
