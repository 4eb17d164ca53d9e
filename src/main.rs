use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use keyspan::utils::{format_bytes, format_duration, setup_logging};
use keyspan::{IndexConfig, IndexPreparer, QueryEngine, QueryResult};

#[derive(Parser)]
#[command(name = "keyspan")]
#[command(about = "Keyspan - Disk-backed zip code and email index over large CSV files")]
struct Args {
    #[arg(short, long, global = true, help = "Configuration file path (created with defaults if missing)")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Verbose output")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the zip and email indexes for a CSV file
    Prepare {
        #[arg(help = "CSV file to index")]
        input: PathBuf,

        #[arg(short, long, help = "Directory for index artifacts (defaults to the input's directory)")]
        work_dir: Option<PathBuf>,
    },
    /// Print every record with the given zip code
    Zip {
        #[arg(help = "Manifest written by the prepare command")]
        manifest: PathBuf,

        zip: String,
    },
    /// Print the record with the given email
    Email {
        #[arg(help = "Manifest written by the prepare command")]
        manifest: PathBuf,

        email: String,
    },
}

async fn load_config(path: Option<&Path>) -> Result<IndexConfig> {
    let path = match path {
        Some(path) => path,
        None => return Ok(IndexConfig::default()),
    };

    if !path.exists() {
        let config = IndexConfig::default();
        fs::write(path, serde_json::to_string_pretty(&config)?).await?;
        info!("Wrote default configuration to {}", path.display());
        return Ok(config);
    }

    let content = fs::read_to_string(path).await?;
    let config: IndexConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

fn print_result(result: &QueryResult) {
    println!("{}", result.result);
    println!("Time: {}", format_duration(result.elapsed));
    println!("Records: {}", result.record_count);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let verbosity = match (&args.command, args.verbose) {
        (_, true) => "verbose",
        (Command::Prepare { .. }, false) => "normal",
        _ => "silent",
    };
    setup_logging(verbosity)?;

    let mut config = load_config(args.config.as_deref()).await?;

    match args.command {
        Command::Prepare { input, work_dir } => {
            if work_dir.is_some() {
                config.work_directory = work_dir;
            }

            info!("Starting Keyspan preparation");
            info!("Input file: {}", input.display());

            let preparer = IndexPreparer::new(&input, config)?;
            let manifest_path = preparer.manifest_path().to_path_buf();
            let prepared = tokio::task::spawn_blocking(move || preparer.run()).await??;
            let stats = &prepared.manifest.stats;

            info!("Preparation completed successfully!");
            info!("Lines read: {}", stats.lines_read);
            info!("Records indexed: {}", stats.records_indexed);
            info!("Malformed lines skipped: {}", stats.lines_skipped);
            info!("Distinct zip codes: {}", stats.distinct_zip_codes);
            info!("Email shards: {} raw, {} final", stats.raw_email_shards, stats.final_email_shards);
            info!("Duplicate emails dropped: {}", stats.duplicate_emails_dropped);
            info!("Reordered file: {}", format_bytes(stats.reordered_bytes));
            info!(
                "Timings: extract {} ms, zip {} ms, email {} ms, total {} ms",
                stats.extract_time_ms, stats.zip_time_ms, stats.email_time_ms, stats.total_time_ms
            );

            println!("{}", manifest_path.display());
        }
        Command::Zip { manifest, zip } => {
            let engine = QueryEngine::open(&manifest, &config)?;
            print_result(&engine.lookup_by_zip(&zip)?);
        }
        Command::Email { manifest, email } => {
            let engine = QueryEngine::open(&manifest, &config)?;
            print_result(&engine.lookup_by_email(&email)?);
        }
    }

    Ok(())
}
