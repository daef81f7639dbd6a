use anyhow::Result;
use clap::{Parser, Subcommand};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use stormline_common::observability::{LogConfig, init_logging};
use stormline_config::{StormlineConfig, StormlineConfigLoader};
use stormline_core::classify::Classifier;
use stormline_core::pipeline::{Orchestrator, PipelineOptions};
use stormline_core::scheduler::Scheduler;
use stormline_core::source::RedditConnector;
use stormline_core::store::Store;
use tokio_util::sync::CancellationToken;

const USER_AGENT: &str = "stormline/0.1 (disaster post monitor)";

#[derive(Parser)]
#[command(name = "stormline", about = "Disaster post ingestion and classification pipeline")]
struct Cli {
    /// Path to the YAML configuration file; defaults apply if it is absent.
    #[arg(long, default_value = "stormline.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run scheduled ingestion cycles until interrupted.
    Run,
    /// Run a single ingestion cycle and exit.
    Once,
    /// Classify one text and print the result with the active mode.
    Classify {
        #[arg(long)]
        text: String,
    },
    /// Print the per-label stats snapshot over the trailing window.
    Stats {
        #[arg(long, default_value_t = 24)]
        window_hours: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = StormlineConfigLoader::new();
    let cfg = if cli.config.exists() {
        loader.with_file(&cli.config)
    } else {
        loader
    }
    .load()?;

    init_logging(LogConfig::default())?;

    match cli.command {
        Command::Classify { text } => {
            let classifier = build_classifier(&cfg);
            let result = classifier.classify(&text);
            let status = classifier.status();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "label": result.label,
                    "confidence": result.confidence,
                    "mode": status.mode,
                    "model_version": status.model_version,
                }))?
            );
        }
        Command::Stats { window_hours } => {
            let store = connect_store(&cfg).await?;
            let snapshot = store.stats(window_hours).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Once => {
            let orchestrator = build_orchestrator(&cfg).await?;
            let outcome = orchestrator.trigger().await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Run => {
            let orchestrator = Arc::new(build_orchestrator(&cfg).await?);
            let scheduler = Scheduler::new(
                orchestrator,
                Duration::from_secs(cfg.scheduler.interval_secs),
            );

            let cancel = CancellationToken::new();
            let loop_handle = tokio::spawn(scheduler.run(cancel.clone()));

            tokio::signal::ctrl_c().await?;
            tracing::info!("app.shutdown.signal");
            cancel.cancel();

            // An in-flight cycle may finish; past the grace window we stop
            // waiting and let the runtime tear the task down.
            let grace = Duration::from_secs(cfg.scheduler.shutdown_grace_secs);
            if tokio::time::timeout(grace, loop_handle).await.is_err() {
                tracing::warn!(grace_secs = grace.as_secs(), "app.shutdown.grace_elapsed");
            }
        }
    }

    Ok(())
}

fn build_classifier(cfg: &StormlineConfig) -> Classifier {
    Classifier::load(
        Path::new(&cfg.classifier.model_path),
        Path::new(&cfg.classifier.vectorizer_path),
    )
}

async fn connect_store(cfg: &StormlineConfig) -> Result<Store> {
    let options = SqliteConnectOptions::from_str(&cfg.database.url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    let store = Store::new(pool);
    store.ensure_schema().await?;
    Ok(store)
}

async fn build_orchestrator(cfg: &StormlineConfig) -> Result<Orchestrator> {
    let store = connect_store(cfg).await?;
    let classifier = build_classifier(cfg);
    let connector = Arc::new(RedditConnector::new(USER_AGENT)?);

    Ok(Orchestrator::new(
        connector,
        classifier,
        store,
        PipelineOptions {
            channels: cfg.ingest.channels.clone(),
            page_size: cfg.ingest.page_size,
            fetch_concurrency: cfg.ingest.fetch_concurrency,
        },
    ))
}
