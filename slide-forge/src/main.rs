//! slide-forge CLI: inspect and maintain the checkpoint store

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use slide_forge::storage::SqliteCheckpointer;
use slide_forge::EngineSettings;
use slide_forge_sdk::{log_found, log_removed, log_review_summary, log_warning};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "slide-forge", version, about = "Slide deck workflow engine")]
struct Cli {
    /// Checkpoint database (default: ~/.slide-forge/checkpoints.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List sessions, most recent first
    Sessions {
        #[arg(long, default_value = "20")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Print a session's latest checkpoint
    Show {
        session: String,
        #[arg(long, value_enum, default_value = "yaml")]
        format: OutputFormat,
    },
    /// List a session's artifacts, or print one
    Artifacts {
        session: String,
        #[arg(long)]
        key: Option<String>,
    },
    /// Transition log of a session
    History {
        session: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete a session and its history
    Delete { session: String },
    /// Delete sessions with no activity in the last N days
    Prune {
        #[arg(long)]
        older_than_days: i64,
    },
    /// Print the effective engine settings (.env and environment applied)
    Settings,
    /// Run a scripted offline turn end to end against the store
    #[cfg(feature = "testing")]
    Demo {
        /// Directory for generated images
        #[arg(long, default_value = "slide-forge-demo")]
        images_dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

fn default_db_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    Ok(home.join(".slide-forge").join("checkpoints.db"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    let store = SqliteCheckpointer::open(&db_path)
        .with_context(|| format!("failed to open checkpoint store at {}", db_path.display()))?;

    match cli.command {
        Command::Sessions { limit, offset } => {
            let sessions = store.list_sessions(limit, offset)?;
            log_found!(sessions.len(), "sessions");
            for s in sessions {
                let status = s
                    .outcome
                    .as_ref()
                    .map(|o| o.label().to_string())
                    .unwrap_or_else(|| format!("next: {}", s.next));
                println!(
                    "{}  {}  step {}/{}  {}",
                    s.session_id,
                    s.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    (s.step_index + 1).min(s.plan_len.max(1)),
                    s.plan_len,
                    status
                );
            }
        }
        Command::Show { session, format } => {
            let checkpoint = store
                .load_blocking(&session)?
                .with_context(|| format!("no checkpoint for session {}", session))?;
            let rendered = match format {
                OutputFormat::Yaml => serde_yaml::to_string(&checkpoint)
                    .context("failed to render checkpoint as YAML")?,
                OutputFormat::Json => serde_json::to_string_pretty(&checkpoint)
                    .context("failed to render checkpoint as JSON")?,
            };
            println!("{}", rendered);

            let (approved, rejected, failed) = checkpoint.state.review_tally();
            log_review_summary!(approved, rejected, failed);
        }
        Command::Artifacts { session, key } => {
            let checkpoint = store
                .load_blocking(&session)?
                .with_context(|| format!("no checkpoint for session {}", session))?;
            let artifacts = &checkpoint.state.artifacts;
            match key {
                Some(key) => match artifacts.get(&key) {
                    Some(value) => println!("{}", value),
                    None => bail!("session {} has no artifact {}", session, key),
                },
                None => {
                    log_found!(artifacts.len(), "artifacts");
                    for (key, value) in artifacts {
                        println!("{}  ({} bytes)", key, value.len());
                    }
                }
            }
        }
        Command::History { session, limit } => {
            let records = store.history(&session, limit)?;
            if records.is_empty() {
                log_warning!("no history for session {}", session);
            }
            for r in records {
                println!(
                    "#{:<4} {}  -> {:<13} step {}  review {:<8} retries {}  replans {}",
                    r.sequence,
                    r.recorded_at.format("%H:%M:%S%.3f"),
                    r.next.to_string(),
                    r.step_index + 1,
                    r.review_status,
                    r.retry_count,
                    r.replanning_count
                );
            }
        }
        Command::Delete { session } => {
            if store.delete_session(&session)? {
                log_removed!(format!("session {}", session));
            } else {
                log_warning!("session {} not found", session);
            }
        }
        Command::Prune { older_than_days } => {
            if older_than_days < 0 {
                bail!("--older-than-days must be non-negative");
            }
            let cutoff = Utc::now() - Duration::days(older_than_days);
            let deleted = store.delete_sessions_before(cutoff)?;
            log_removed!(format!("{} sessions older than {} days", deleted, older_than_days));
        }
        Command::Settings => {
            let settings = EngineSettings::from_env().context("invalid engine settings")?;
            println!("{}", serde_yaml::to_string(&settings)?);
        }
        #[cfg(feature = "testing")]
        Command::Demo { images_dir } => run_demo(store, images_dir).await?,
    }

    Ok(())
}

/// One scripted turn: plan a storywriter and a visualizer step, approve both
#[cfg(feature = "testing")]
async fn run_demo(store: SqliteCheckpointer, images_dir: PathBuf) -> Result<()> {
    use std::sync::Arc;

    use serde_json::json;
    use slide_forge::state::Verdict;
    use slide_forge::testing::{engine_with, CannedSearch, RecordingImageGenerator, ScriptedModel};
    use slide_forge::{FsObjectStore, TurnRequest, WorkflowService};
    use slide_forge_sdk::{log_info, AgentRole, EventSink};
    use tokio_util::sync::CancellationToken;

    let settings = EngineSettings::from_env().context("invalid engine settings")?;
    let objects = FsObjectStore::open(&images_dir)
        .await
        .with_context(|| format!("failed to open image directory {}", images_dir.display()))?;

    let model = ScriptedModel::new()
        .reply(
            AgentRole::Coordinator,
            json!({"handoff_to_planner": true, "response": ""}),
        )
        .reply(
            AgentRole::Planner,
            json!({"steps": [
                {"id": 1, "role": "storywriter", "instruction": "Write a two-slide pitch", "description": "Story"},
                {"id": 2, "role": "visualizer", "instruction": "Illustrate the story", "description": "Visuals",
                 "design_direction": "Minimal, dark background"}
            ]}),
        )
        .reply(
            AgentRole::Storywriter,
            json!({"slides": [
                {"slide_number": 1, "title": "The problem", "bullet_points": ["Decks take days"]},
                {"slide_number": 2, "title": "The fix", "bullet_points": ["Agents draft them in minutes"]}
            ]}),
        )
        .reply(
            AgentRole::Visualizer,
            json!({
                "anchor_image_prompt": "Dark minimal style reference",
                "prompts": [
                    {"slide_number": 1, "image_generation_prompt": "Clock and stacked papers", "rationale": "problem"},
                    {"slide_number": 2, "image_generation_prompt": "Robot arranging slides", "rationale": "solution"}
                ]
            }),
        )
        .fallback(
            AgentRole::Reviewer,
            json!({"approved": true, "score": 0.9, "feedback": "Looks good"}),
        );

    let engine = engine_with(
        Arc::new(model),
        Arc::new(RecordingImageGenerator::new()),
        Arc::new(objects),
        Arc::new(CannedSearch::new()),
        settings,
    );
    let service = WorkflowService::new(engine, Arc::new(store));

    log_info!("Running scripted demo turn...");
    let report = service
        .run_turn(
            None,
            TurnRequest::user("Make a short pitch deck"),
            EventSink::disabled().with_stderr_echo(),
            CancellationToken::new(),
        )
        .await
        .context("demo run failed")?;

    log_info!(
        "Session {} finished: {}",
        report.session_id,
        report.outcome.label()
    );
    let failed = report
        .state
        .feedback_history
        .values()
        .flatten()
        .filter(|entry| Verdict::of_entry(entry) == Some(Verdict::Failed))
        .count();
    if failed > 0 {
        log_warning!("{} steps exhausted their retries", failed);
    }
    log_found!(report.state.artifacts.len(), "artifacts");
    Ok(())
}
