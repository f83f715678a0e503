//! REWIND CLI
//!
//! Replays, steps through and diffs JSON document streams stored as
//! JSON-lines log files.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod commands;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use rewind_core::CancellationToken;
use rewind_replay::PathPattern;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rewind")]
#[command(about = "REWIND - time-travel replay for event-sourced views", long_about = None)]
struct Cli {
    /// Replay configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

/// Exactly one replay target
#[derive(Args, Debug, Clone, Copy)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    /// Replay through the last event at or before this log offset
    #[arg(long)]
    offset: Option<u64>,
    /// Replay through the last event at or before this instant (RFC 3339)
    #[arg(long)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a target against a stream's index
    Index {
        /// Log file (JSON lines)
        #[arg(short, long)]
        log: PathBuf,
        /// Stream id; may be omitted when the log holds one stream
        #[arg(short, long)]
        stream: Option<String>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Reconstruct document state at a target
    Replay {
        /// Log file (JSON lines)
        #[arg(short, long)]
        log: PathBuf,
        /// Checkpoint file (JSON array)
        #[arg(short, long)]
        checkpoints: Option<PathBuf>,
        /// Stream id; may be omitted when the log holds one stream
        #[arg(short, long)]
        stream: Option<String>,
        #[command(flatten)]
        target: TargetArgs,
        /// Folds between cancellation checks
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Step through a stream one event at a time
    Step {
        /// Log file (JSON lines)
        #[arg(short, long)]
        log: PathBuf,
        /// Stream id; may be omitted when the log holds one stream
        #[arg(short, long)]
        stream: Option<String>,
        /// Stop after this many steps
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Diff two JSON documents
    Diff {
        /// Before document
        #[arg(long)]
        left: PathBuf,
        /// After document
        #[arg(long)]
        right: PathBuf,
        /// Path pattern to skip; repeatable
        #[arg(long = "ignore")]
        ignore: Vec<PathPattern>,
        /// Depth past which subtrees are compared whole
        #[arg(long)]
        max_depth: Option<usize>,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rewind=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = commands::load_config(cli.config.as_deref()).await?;
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let output = match cli.command {
        Commands::Index { log, stream, target } => {
            commands::index(&log, stream.as_deref(), target.into_bounds()).await?
        }
        Commands::Replay {
            log,
            checkpoints,
            stream,
            target,
            batch_size,
        } => {
            let request = commands::ReplayRequest {
                log,
                checkpoints,
                stream,
                target: target.into_bounds(),
                batch_size,
            };
            commands::replay(&request, config, &cancel).await?
        }
        Commands::Step { log, stream, limit } => {
            commands::step(&log, stream.as_deref(), limit, config, cancel).await?
        }
        Commands::Diff {
            left,
            right,
            ignore,
            max_depth,
            json,
        } => {
            let options = rewind_replay::DiffOptions {
                ignore_paths: ignore,
                max_depth,
            };
            commands::diff(&left, &right, &options, json).await?
        }
    };

    print!("{output}");
    Ok(())
}

impl TargetArgs {
    fn into_bounds(self) -> rewind_log::TargetBounds {
        rewind_log::TargetBounds {
            offset: self.offset.map(rewind_core::LogOffset::from_raw),
            timestamp: self.timestamp,
        }
    }
}
