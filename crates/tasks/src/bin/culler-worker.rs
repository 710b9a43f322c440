//! culler-worker: runs the rule and collection handlers on their cron
//! schedules, plus operator commands against the record store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use culler_core::providers::Providers;
use culler_core::{Config, SystemClock};
use culler_notify::{Dispatcher, EventBus};
use culler_rules::loader::LoadStatus;
use culler_rules::{validate_yaml, RuleLoader};
use culler_storage::{MemoryStore, SharedStore};
use culler_tasks::{Engine, JsonLibrary, RunOutcome, COLLECTION_HANDLER, RULE_HANDLER};

// ── CLI ─────────────────────────────────────────────────────────────

/// Rule-driven media lifecycle worker.
#[derive(Parser, Debug)]
#[command(name = "culler-worker", version, about)]
struct Cli {
    /// Config profile (reads `{PROFILE}_{KEY}` before `{KEY}`).
    #[arg(long, env = "CULLER_PROFILE", default_value = "")]
    profile: String,

    /// JSON export of the media library served as the media server.
    #[arg(long, env = "CULLER_LIBRARY_FILE")]
    library: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the scheduler and run until interrupted.
    Run {
        /// Run both handlers once and exit instead of scheduling them.
        #[arg(long)]
        once: bool,
    },
    /// Validate a rule-group YAML file.
    Validate { file: PathBuf },
    /// Import a rule-group YAML file, or every group under a directory.
    Import {
        file: PathBuf,
        /// Also create and link a collection named after the group.
        #[arg(long)]
        collection: bool,
    },
    /// Print a stored rule group as YAML.
    Export { group_id: i64 },
    /// Show the task ledger.
    Status,
    /// Clear a stuck task ledger row.
    ResetTask { name: String },
    /// Print upcoming fire times of both handlers.
    NextRuns {
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
}

// ── Setup ───────────────────────────────────────────────────────────

fn load_config(profile: &str) -> Config {
    culler_core::config::load_dotenv();
    if profile.is_empty() {
        Config::from_env()
    } else {
        Config::for_profile(profile)
    }
}

fn build_engine(config: &Config, library: Option<&Path>) -> Result<Engine> {
    let library = match library {
        Some(path) => JsonLibrary::load(path).context("failed to load media library")?,
        None => JsonLibrary::empty(),
    };
    let store: SharedStore = Arc::new(
        MemoryStore::from_config(&config.storage).context("failed to open record store")?,
    );
    if config.storage.snapshot_path.is_none() {
        warn!("no snapshot path configured, state is lost on exit");
    }
    let clock = SystemClock::shared();
    let bus = EventBus::new(Arc::clone(&clock));
    Ok(Engine::new(
        config.clone(),
        Providers::new(Arc::new(library)),
        store,
        bus,
        clock,
    ))
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.profile);

    match cli.command {
        Command::Validate { file } => {
            let yaml = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let result = validate_yaml(&yaml);
            for warning in &result.warnings {
                println!("warning: {}: {}", warning.path, warning.message);
            }
            if !result.valid {
                bail!("{} is invalid: {}", file.display(), result.summary());
            }
            println!("{} is valid", file.display());
        }
        Command::Import { file, collection } if file.is_dir() => {
            let engine = build_engine(&config, cli.library.as_deref())?;
            let loader = RuleLoader::new(file.clone());
            let mut failed = 0usize;
            for result in loader.load_all().context("failed to scan rule directory")? {
                match result.status {
                    LoadStatus::Loaded { .. } | LoadStatus::Skipped { .. } => {}
                    LoadStatus::Failed { error } => {
                        failed += 1;
                        println!("failed: {}: {}", result.path.display(), error);
                    }
                }
            }
            for group in loader.groups() {
                let group = engine.save_group(group, collection).await?;
                println!("imported rule group {} ({})", group.id, group.name);
            }
            if failed > 0 {
                bail!("{} file(s) in {} could not be imported", failed, file.display());
            }
        }
        Command::Import { file, collection } => {
            let engine = build_engine(&config, cli.library.as_deref())?;
            let yaml = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let group = engine
                .import_group(&yaml, collection)
                .await
                .with_context(|| format!("failed to import {}", file.display()))?;
            println!("imported rule group {} ({})", group.id, group.name);
        }
        Command::Export { group_id } => {
            let engine = build_engine(&config, cli.library.as_deref())?;
            print!("{}", engine.export_group(group_id).await?);
        }
        Command::Status => {
            let engine = build_engine(&config, cli.library.as_deref())?;
            for status in engine.task_statuses().await? {
                match (status.running, status.running_since) {
                    (true, Some(since)) => println!("{:<20} running since {}", status.name, since),
                    (true, None) => println!("{:<20} running", status.name),
                    (false, _) => println!("{:<20} idle", status.name),
                }
            }
        }
        Command::ResetTask { name } => {
            let engine = build_engine(&config, cli.library.as_deref())?;
            let before = engine.reset_task(&name).await?;
            if before.running {
                println!("{} reset", name);
            } else {
                println!("{} was not running", name);
            }
        }
        Command::NextRuns { count } => {
            let engine = build_engine(&config, cli.library.as_deref())?;
            for task in [RULE_HANDLER, COLLECTION_HANDLER] {
                println!("{} ({})", task, engine.cron_for(task));
                for at in engine.next_runs(task, count)? {
                    println!("  {}", at);
                }
            }
        }
        Command::Run { once } => {
            config.log_summary();
            let engine = build_engine(&config, cli.library.as_deref())?;
            let dispatcher = Dispatcher::from_config(
                &config.notifications,
                engine.bus().clone(),
                SystemClock::shared(),
            )
            .context("invalid notification config")?
            .map(Dispatcher::spawn);

            if once {
                report(RULE_HANDLER, engine.execute_rules().await?);
                report(COLLECTION_HANDLER, engine.handle_collections().await?);
            } else {
                engine.start().await;
                info!("culler-worker running, press ctrl-c to stop");
                tokio::signal::ctrl_c()
                    .await
                    .context("failed to listen for ctrl-c")?;
                info!("shutdown signal received");
                engine.shutdown().await;
            }

            if let Some(handle) = dispatcher {
                handle.abort();
            }
            info!("culler-worker exited cleanly");
        }
    }
    Ok(())
}

fn report(task: &str, outcome: RunOutcome) {
    match outcome {
        RunOutcome::Completed => info!(task, "completed"),
        RunOutcome::Aborted => info!(task, "aborted"),
        RunOutcome::Skipped { since } => warn!(task, ?since, "skipped, ledger shows it running"),
        RunOutcome::Failed(e) => warn!(task, error = %e, "failed"),
        RunOutcome::Panicked(e) => warn!(task, panic = %e, "panicked"),
    }
}
