//! docsync CLI - resumable bulk copy between hierarchical document stores.

use clap::{Parser, Subcommand};
use docsync::{Config, Orchestrator, SyncError, TransferOutcome};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docsync")]
#[command(about = "Resumable bulk copy between hierarchical document stores")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "docsync.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a transfer run
    Run {
        /// Walk and count everything without committing writes
        #[arg(long)]
        dry_run: bool,

        /// Resume from the checkpoint file
        #[arg(long)]
        resume: bool,

        /// Override the number of concurrent collection transfers
        #[arg(long)]
        parallel: Option<usize>,

        /// Override the configured collection list (comma separated)
        #[arg(long, value_delimiter = ',')]
        collections: Vec<String>,
    },

    /// Count the documents each collection would transfer
    Count,

    /// Compare per-collection counts between source and destination
    Verify,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, SyncError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)?;

    let mut config = Config::load(&cli.config)?;
    info!("loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            dry_run,
            resume,
            parallel,
            collections,
        } => {
            // Apply overrides
            if dry_run {
                config.transfer.dry_run = true;
            }
            if resume {
                config.transfer.resume = true;
            }
            if let Some(parallel) = parallel {
                config.transfer.parallel = parallel;
            }
            if !collections.is_empty() {
                config.transfer.collections = collections;
            }
            config.validate()?;

            let outcome = Orchestrator::new(config).await?.run().await;

            if cli.output_json {
                println!("{}", outcome.to_json()?);
            } else {
                print_outcome(&outcome);
            }

            Ok(if outcome.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }

        Commands::Count => {
            let orchestrator = Orchestrator::new(config).await?;
            let counts = orchestrator.count().await?;

            if cli.output_json {
                let map: serde_json::Map<String, serde_json::Value> = counts
                    .iter()
                    .map(|(name, n)| (name.clone(), serde_json::json!(n)))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                let total: u64 = counts.iter().map(|(_, n)| n).sum();
                for (name, n) in &counts {
                    println!("  {}: {} documents", name, n);
                }
                println!("  total: {} documents", total);
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Verify => {
            let orchestrator = Orchestrator::new(config).await?;
            let report = orchestrator.verify().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for c in &report.collections {
                    let marker = if c.matched { "match" } else { "MISMATCH" };
                    println!(
                        "  {} -> {}: source={} destination={} ({})",
                        c.collection, c.destination, c.source_count, c.destination_count, marker
                    );
                }
            }
            Ok(if report.passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(5)
            })
        }
    }
}

fn print_outcome(outcome: &TransferOutcome) {
    let status = match (outcome.success, outcome.dry_run) {
        (true, true) => "Dry run completed!",
        (true, false) => "Transfer completed!",
        (false, _) => "Transfer failed!",
    };
    println!("\n{}", status);
    println!("  Run ID: {}", outcome.run_id);
    println!("  Duration: {:.2}s", outcome.duration_seconds);
    println!("  Collections: {}", outcome.stats.collections_processed);
    println!("  Documents: {}", outcome.stats.documents_transferred);
    println!("  Deleted: {}", outcome.stats.documents_deleted);
    println!("  Errors: {}", outcome.stats.errors);
    println!("  Conflicts: {}", outcome.stats.conflicts);
    if let Some(error) = &outcome.error {
        println!("  Error: {}", error);
    }
    if !outcome.failed_collections.is_empty() {
        println!("  Failed collections: {:?}", outcome.failed_collections);
    }
    if let Some(verify) = &outcome.verify {
        println!(
            "  Verification: {}",
            if verify.passed { "passed" } else { "FAILED" }
        );
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), SyncError> {
    let filter = EnvFilter::try_new(verbosity)
        .map_err(|e| SyncError::Config(format!("invalid verbosity '{}': {}", verbosity, e)))?;

    match format {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        "text" => tracing_subscriber::fmt().with_env_filter(filter).init(),
        other => {
            return Err(SyncError::Config(format!(
                "log format must be 'text' or 'json', got '{}'",
                other
            )))
        }
    }
    Ok(())
}
