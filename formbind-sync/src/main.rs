//! formbind - apply questionnaire submissions and report answer freshness
//!
//! `submit` writes a submission onto the entity graph; `status` prints the
//! hydrated form with per-answer freshness as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use formbind_common::config::TomlConfig;
use formbind_common::db::init_database;
use formbind_sync::{
    hydrate, resolve_bindings, Answers, ApplyOptions, EntitySynchronizer, Questionnaire, RowVersionSnapshot,
    SyncError,
};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Exit status when a submission lost an optimistic-concurrency race
const EXIT_LOCK_CONFLICT: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "formbind")]
#[command(about = "Binding-aware questionnaire synchronization")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "FORMBIND_CONFIG")]
    config: Option<PathBuf>,

    /// Database file; overrides the configured path
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a submission to the entity graph
    Submit {
        /// Questionnaire definition (JSON)
        questionnaire: PathBuf,

        /// Answers keyed by question key (JSON object)
        answers: PathBuf,

        /// Actor recorded on the writes
        #[arg(long)]
        actor: Option<String>,

        /// Expected technology row version
        #[arg(long)]
        technology_version: Option<i64>,

        /// Expected triage stage row version
        #[arg(long)]
        triage_version: Option<i64>,

        /// Expected viability stage row version
        #[arg(long)]
        viability_version: Option<i64>,

        /// Draft save: skip technology creation instead of failing when
        /// required fields are missing
        #[arg(long)]
        draft: bool,
    },

    /// Print stored answers with freshness for a technology
    Status {
        /// Questionnaire definition (JSON)
        questionnaire: PathBuf,

        /// External technology identifier
        tech_id: String,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::resolve(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting formbind v{}", env!("CARGO_PKG_VERSION"));

    let db_path = config.database_path(args.database.as_deref());
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    match args.command {
        Command::Submit {
            questionnaire,
            answers,
            actor,
            technology_version,
            triage_version,
            viability_version,
            draft,
        } => {
            let questionnaire: Questionnaire = read_json(&questionnaire)?;
            let answers: Answers = read_json(&answers)?;
            let bindings = resolve_bindings(&questionnaire);

            let expected = RowVersionSnapshot {
                technology: technology_version,
                triage_stage: triage_version,
                viability_stage: viability_version,
            };
            let options = ApplyOptions {
                actor_id: actor,
                allow_create_when_incomplete: !draft,
                expected_versions: Some(expected),
            };

            let synchronizer = EntitySynchronizer::new(config.sync.clone());
            match synchronizer.submit(&pool, &bindings, &answers, &options).await {
                Ok(outcome) => {
                    if outcome.is_empty() {
                        info!("Nothing written");
                    }
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                }
                Err(e @ SyncError::LockConflict { .. }) => {
                    error!("{} - reload and resubmit", e);
                    pool.close().await;
                    std::process::exit(EXIT_LOCK_CONFLICT);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Command::Status { questionnaire, tech_id } => {
            let questionnaire: Questionnaire = read_json(&questionnaire)?;
            let bindings = resolve_bindings(&questionnaire);

            let form = hydrate(&pool, &bindings, &tech_id)
                .await?
                .with_context(|| format!("Technology {} not found", tech_id))?;
            println!("{}", serde_json::to_string_pretty(&form)?);
        }
    }

    pool.close().await;
    Ok(())
}
