mod block;
mod config;
mod event;
mod providers;
mod reconcile;
mod store;
mod sync;

use anyhow::Result;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use providers::gcal::GcalStore;

#[derive(Parser)]
#[command(name = "calbuffer")]
#[command(about = "Mirror busy Google Calendar events as padded buffer blocks on a block calendar")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate with Google Calendar
    Auth,
    /// Reconcile buffer blocks for a calendar
    Run {
        /// Calendar to read busy events from
        calendar_id: String,

        /// Calendar to write block events to (default: calendar_id)
        #[arg(long)]
        block_calendar_id: Option<String>,

        /// Buffer minutes before and after each event
        #[arg(long, default_value_t = 30)]
        buffer_min: i64,

        /// Title used to mark block events
        #[arg(long, default_value = block::DEFAULT_BLOCK_TITLE)]
        block_title: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Auth => cmd_auth().await,
        Commands::Run {
            calendar_id,
            block_calendar_id,
            buffer_min,
            block_title,
        } => cmd_run(calendar_id, block_calendar_id, buffer_min, block_title).await,
    }
}

async fn cmd_auth() -> Result<()> {
    let cfg = config::load_gcal_config()?;

    println!("Authenticating with Google Calendar...");

    let tokens = providers::gcal::authenticate(&cfg).await?;
    config::save_tokens(&tokens)?;

    println!("\nTokens saved to {}", config::tokens_path()?.display());
    println!("Now run `calbuffer run <calendar-id>` to reconcile blocks.");

    Ok(())
}

async fn cmd_run(
    calendar_id: String,
    block_calendar_id: Option<String>,
    buffer_min: i64,
    block_title: String,
) -> Result<()> {
    let store = GcalStore::load().await?;

    let opts = sync::RunOptions {
        block_calendar: block_calendar_id.unwrap_or_else(|| calendar_id.clone()),
        source_calendar: calendar_id,
        buffer: Duration::minutes(buffer_min),
        block_title,
    };

    println!(
        "Reconciling blocks: {} → {}",
        opts.source_calendar, opts.block_calendar
    );

    // Sampled once; every pass sees the same instant
    let stats = sync::reconcile(&store, &opts, Utc::now()).await?;

    println!("\n{} inserted, {} deleted", stats.inserted, stats.deleted);

    Ok(())
}
