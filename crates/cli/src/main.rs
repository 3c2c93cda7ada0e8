//! QueueCTL - Persistent background job queue
//! Composition root: argument parsing, logging, wiring, exit codes

mod commands;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use colored::Colorize;
use queuectl_core::AppError;
use settings::Settings;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_DB_PATH: &str = "~/.queuectl/jobs.db";

#[derive(Parser)]
#[command(name = "queuectl")]
#[command(about = "Persistent background job queue with retries and a dead letter queue", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database file
    #[arg(long, global = true, env = "QUEUECTL_DB_PATH", default_value = DEFAULT_DB_PATH)]
    db_path: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a job from a JSON document, e.g. '{"id":"job1","command":"sleep 2"}'
    Enqueue {
        /// Job as JSON: command (required), id, max_retries
        job: String,
    },

    /// Run or stop workers
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },

    /// Show job counts and active workers
    Status,

    /// List jobs
    List {
        /// Only jobs in this state (pending, processing, completed, failed, dead)
        #[arg(short, long)]
        state: Option<String>,
    },

    /// Inspect or retry the dead letter queue
    Dlq {
        #[command(subcommand)]
        action: DlqAction,
    },

    /// Read or write queue configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum WorkerAction {
    /// Start workers in the foreground (Ctrl-C or SIGTERM stops them gracefully)
    Start {
        /// Number of concurrent workers
        #[arg(short, long, default_value = "1")]
        count: usize,

        /// Sleep between polls when no job is eligible
        #[arg(long, default_value = "1000")]
        poll_interval_ms: u64,

        /// Requeue jobs stuck in processing for longer than this before starting
        #[arg(long)]
        recover_after_secs: Option<u64>,
    },

    /// Ask the running `worker start` process to stop gracefully
    Stop,
}

#[derive(Subcommand)]
enum DlqAction {
    /// List dead jobs
    List,

    /// Move a dead job back to pending with a fresh retry budget
    Retry {
        /// Job ID
        job_id: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set a key (VALUE is parsed as JSON, otherwise stored as a string)
    Set { key: String, value: String },

    /// Print a key's value
    Get { key: String },
}

fn init_logging() {
    let log_format = std::env::var("QUEUECTL_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("queuectl=info"));

    // stderr keeps stdout for tables
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Process exit code for a failed command
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.chain().find_map(|e| e.downcast_ref::<AppError>()) {
        Some(AppError::InvalidSpec(_)) => 2,
        Some(AppError::DuplicateId(_)) => 3,
        Some(AppError::NotFound(_)) => 4,
        _ => 1,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::from_raw_path(&cli.db_path);
    let app = commands::App::open(&settings).await?;

    match cli.command {
        Commands::Enqueue { job } => app.enqueue(&job).await,
        Commands::Worker { action } => match action {
            WorkerAction::Start {
                count,
                poll_interval_ms,
                recover_after_secs,
            } => {
                app.worker_start(commands::WorkerOptions {
                    count,
                    poll_interval_ms,
                    recover_after_secs,
                })
                .await
            }
            WorkerAction::Stop => app.worker_stop().await,
        },
        Commands::Status => app.status().await,
        Commands::List { state } => app.list(state.as_deref()).await,
        Commands::Dlq { action } => match action {
            DlqAction::List => app.dlq_list().await,
            DlqAction::Retry { job_id } => app.dlq_retry(&job_id).await,
        },
        Commands::Config { action } => match action {
            ConfigAction::Set { key, value } => app.config_set(&key, &value).await,
            ConfigAction::Get { key } => app.config_get(&key).await,
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}
