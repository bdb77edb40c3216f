//! `impact-eval` command line.
//!
//! ## Commands
//!
//! - `evaluate`: evaluate one job directory and write its result
//! - `batch`: evaluate several job directories concurrently
//! - `score`: draw a deterministic confidence for an initiative id
//! - `methods`: list registered method reviewers
//! - `backends`: list review backends compiled into this binary

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use impact_eval_core::{score, MethodReviewerRegistry};
use impact_eval_runtime::{
    Dispatcher, EvaluateConfig, EvaluateOptions, ProviderRegistry, RetryPolicy,
};

#[derive(Parser)]
#[command(name = "impact-eval")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Confidence evaluation for causal-effect estimates", long_about = None)]
struct Cli {
    /// Evaluation config (YAML)
    #[arg(short, long, global = true, env = "IMPACT_EVAL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a job directory and print the result as JSON
    Evaluate {
        /// Job directory containing manifest.json
        job_dir: PathBuf,

        /// Replace the cost read from the job's impact results
        #[arg(long)]
        cost_to_scale: Option<f64>,

        /// Compute the result without writing it to the job directory
        #[arg(long)]
        dry_run: bool,

        /// Retry transient backend failures this many times
        #[arg(long, default_value_t = 0)]
        retries: usize,
    },

    /// Evaluate several job directories
    Batch {
        /// Job directories
        #[arg(required = true)]
        job_dirs: Vec<PathBuf>,

        /// Jobs evaluated at once
        #[arg(long, default_value_t = 4)]
        concurrency: usize,

        /// Retry transient backend failures this many times
        #[arg(long, default_value_t = 0)]
        retries: usize,
    },

    /// Draw a deterministic confidence for an initiative
    Score {
        initiative_id: String,

        #[arg(long, default_value_t = 0.0)]
        low: f64,

        #[arg(long, default_value_t = 1.0)]
        high: f64,
    },

    /// List registered method reviewers
    Methods,

    /// List available review backends
    Backends,
}

fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    // Logs go to stderr; stdout carries results.
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
            .ok();
    }
}

fn build_dispatcher(cli_config: Option<&PathBuf>, retries: usize) -> Result<Dispatcher> {
    let config = EvaluateConfig::resolve(cli_config.map(PathBuf::as_path))
        .context("Failed to load evaluation config")?;

    let mut builder = Dispatcher::builder().config(config);
    if retries > 0 {
        builder = builder.retry(RetryPolicy {
            max_retries: retries,
            ..RetryPolicy::default()
        });
    }
    builder.build().context("Failed to initialize dispatcher")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json, if cli.verbose { Level::DEBUG } else { Level::INFO });

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("impact-eval error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Evaluate {
            job_dir,
            cost_to_scale,
            dry_run,
            retries,
        } => {
            let dispatcher = build_dispatcher(cli.config.as_ref(), retries)?;
            let options = EvaluateOptions { cost_to_scale };

            let result = if dry_run {
                dispatcher.compute_with(&job_dir, options).await
            } else {
                dispatcher.evaluate_with(&job_dir, options).await
            }
            .with_context(|| format!("Failed to evaluate {}", job_dir.display()))?;

            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Batch {
            job_dirs,
            concurrency,
            retries,
        } => {
            let dispatcher = build_dispatcher(cli.config.as_ref(), retries)?;
            let results = dispatcher.evaluate_many(job_dirs, concurrency).await;

            let mut failed = 0usize;
            for (dir, result) in &results {
                match result {
                    Ok(r) => println!(
                        "{}\t{}\t{}\t{:.4}",
                        dir.display(),
                        r.initiative_id,
                        r.strategy,
                        r.confidence
                    ),
                    Err(e) => {
                        failed += 1;
                        println!("{}\tERROR\t{}", dir.display(), e);
                    }
                }
            }

            tracing::info!(total = results.len(), failed, "Batch finished");
            Ok(if failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Score {
            initiative_id,
            low,
            high,
        } => {
            let confidence = score(&initiative_id, low, high)?;
            println!("{confidence}");
            Ok(ExitCode::SUCCESS)
        }

        Commands::Methods => {
            let registry = MethodReviewerRegistry::with_builtins()?;
            for reviewer in registry.iter() {
                println!(
                    "{:<20} {}  {} v{}  {}",
                    reviewer.name,
                    reviewer.confidence_range,
                    reviewer.prompt.name,
                    reviewer.prompt.version,
                    reviewer.description
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Backends => {
            for (name, description) in ProviderRegistry::with_defaults().describe() {
                println!("{:<12} {}", name, description);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
