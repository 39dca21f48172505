// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! # capgrid node CLI
//!
//! The `capgrid` binary creates, runs and stops capgrid nodes.
//!
//! ## Commands
//!
//! - `capgrid create-node|create-client|create-introducer` - Initialize a node directory
//! - `capgrid run DIR` - Run a node in the foreground until SIGINT/SIGTERM
//! - `capgrid stop DIR` - Stop a running node
//! - `capgrid add-account DIR` - Provision a gateway account

use anyhow::{Context, Result};
use capgrid_cli::commands::{self, AddAccountArgs, CreateArgs, IntroducerArgs, RunArgs, StopArgs};
use capgrid_core::domain::node_config::NodeKind;
use clap::{Parser, Subcommand};

/// capgrid - capability-secured storage grid node
#[derive(Parser)]
#[command(name = "capgrid")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Suppress informational output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error); defaults to the node config
    #[arg(long, global = true, env = "CAPGRID_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a storage node (storage enabled)
    #[command(name = "create-node")]
    CreateNode(CreateArgs),

    /// Create a client node (storage disabled)
    #[command(name = "create-client")]
    CreateClient(CreateArgs),

    /// Create an introducer node
    #[command(name = "create-introducer")]
    CreateIntroducer(IntroducerArgs),

    /// Run a node in the foreground
    #[command(name = "run")]
    Run(RunArgs),

    /// Stop a running node
    #[command(name = "stop")]
    Stop(StopArgs),

    /// Add a gateway account to a node
    #[command(name = "add-account")]
    AddAccount(AddAccountArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match (&cli.log_level, &cli.command) {
        (Some(level), _) => level.clone(),
        (None, Commands::Run(args)) => commands::node::configured_log_level(&args.basedir),
        (None, _) if cli.quiet => "warn".to_string(),
        (None, _) => "info".to_string(),
    };
    init_logging(&level)?;

    match cli.command {
        Commands::CreateNode(args) => {
            commands::create::create(NodeKind::Node, args, cli.quiet).map(|_| ())
        }
        Commands::CreateClient(args) => {
            commands::create::create(NodeKind::Client, args, cli.quiet).map(|_| ())
        }
        Commands::CreateIntroducer(args) => {
            commands::create::create(NodeKind::Introducer, args.into(), cli.quiet).map(|_| ())
        }
        Commands::Run(args) => commands::node::run(args).await,
        Commands::Stop(args) => commands::node::stop(args, cli.quiet).await,
        Commands::AddAccount(args) => commands::account::add_account(args, cli.quiet).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
