use std::time::Instant;

use anyhow::Context;
use card_importer::checkpoint::CheckpointManager;
use card_importer::db::Store;
use card_importer::pipeline::RunEnd;
use card_importer::{ImportService, RunOptions, Settings};
use clap::{Parser, Subcommand};
use tracing::warn;

#[derive(Parser)]
#[command(name = "card_importer", about = "Import Scryfall cards with generated effects")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import cards (resumes from the last checkpoint by default)
    Run {
        /// Only these set codes (e.g. neo mid)
        #[arg(long, num_args = 1..)]
        sets: Vec<String>,
        /// Stop after this many source records
        #[arg(short = 'n', long)]
        max_cards: Option<usize>,
        /// Records per batch
        #[arg(long, default_value = "50")]
        batch_size: usize,
        /// Ignore any saved checkpoint and start at page 1
        #[arg(long)]
        no_resume: bool,
        /// Store cards without generated effects
        #[arg(long)]
        skip_ai: bool,
    },
    /// Estimate cost, time and storage for a full import
    Estimate {
        #[arg(long, num_args = 1..)]
        sets: Vec<String>,
    },
    /// Show the last run's status and the saved checkpoint
    Status,
    /// Show card statistics
    Stats,
    /// Delete the saved checkpoint
    ResetCheckpoint,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    let result = match cli.command {
        Commands::Run {
            sets,
            max_cards,
            batch_size,
            no_resume,
            skip_ai,
        } => {
            if settings.openai_api_key.is_none() && !skip_ai {
                warn!("CARDS_OPENAI_API_KEY not set; effects will come from the rule fallback");
            }
            let service = ImportService::from_settings(&settings, true)?;
            let options = RunOptions {
                resume_from_checkpoint: !no_resume,
                enrich_with_ai: !skip_ai,
                max_records: max_cards,
                batch_size,
                set_codes: sets.iter().map(|s| s.to_lowercase()).collect(),
            };

            let handle = service.start_import(options)?;
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!("\nInterrupted, finishing the current batch...");
                    service.cancel();
                }
                _ = wait_until_idle(&service) => {}
            }
            let summary = handle.wait().await?;

            println!(
                "Pages: {} | persisted: {} | skipped: {} | failed: {} | processed: {}",
                summary.pages, summary.persisted, summary.skipped, summary.failed, summary.processed
            );
            if summary.end == RunEnd::Cancelled {
                println!("Cancelled. Run again to resume from the checkpoint.");
            }
            Ok(())
        }
        Commands::Estimate { sets } => {
            let service = ImportService::from_settings(&settings, false)?;
            let sets: Vec<String> = sets.iter().map(|s| s.to_lowercase()).collect();
            let e = service.estimate(&sets).await?;
            println!("Cards:    {}", e.total_cards);
            println!("Cost:     ${:.2} (generation)", e.cost_usd);
            println!("Time:     {:.1} hours ({:.1} days)", e.hours, e.days());
            println!("Storage:  {:.1} MB", e.storage_bytes as f64 / (1024.0 * 1024.0));
            Ok(())
        }
        Commands::Status => {
            let store = Store::open(&settings.db_path)?;
            let p = store.load_progress()?;
            println!("Status:    {}", p.status);
            println!("Processed: {} / {}", p.processed, p.total);
            println!("Failed:    {}", p.failed);
            if let Some(card) = &p.last_processed_card {
                println!("Last card: {}", card);
            }
            if let Some(t) = p.started_at {
                println!("Started:   {}", t.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            if let Some(t) = p.completed_at {
                println!("Finished:  {}", t.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            if let Some(err) = &p.error_message {
                println!("Error:     {}", err);
            }
            match CheckpointManager::new(settings.checkpoint_path.clone()).load() {
                Some(cp) => println!(
                    "Checkpoint: page {}, {} processed, last '{}' at {}",
                    cp.page,
                    cp.total_processed,
                    cp.last_card,
                    cp.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                ),
                None => println!("Checkpoint: none"),
            }
            Ok(())
        }
        Commands::Stats => {
            let store = Store::open(&settings.db_path)?;
            let s = store.stats()?;
            println!("Total:        {}", s.total);
            println!("With effects: {}", s.with_effects);
            println!("\n--- Rarity ---");
            for (rarity, n) in &s.by_rarity {
                println!("  {:<12} {:>6}", rarity, n);
            }
            println!("\n--- Enrichment ---");
            for (tier, n) in &s.by_tier {
                println!("  {:<12} {:>6}", tier, n);
            }
            Ok(())
        }
        Commands::ResetCheckpoint => {
            CheckpointManager::new(settings.checkpoint_path.clone())
                .clear()
                .context("Failed to reset checkpoint")?;
            println!("Checkpoint removed.");
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn wait_until_idle(service: &ImportService) {
    while service.is_running() {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
