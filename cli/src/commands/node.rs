// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Node lifecycle commands
//!
//! Commands: run, stop

use anyhow::Result;
use capgrid_core::application::node::NodeDirectory;
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

use crate::daemon::{run_node, stop_node};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Node directory
    #[arg(value_name = "DIR")]
    pub basedir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct StopArgs {
    /// Node directory
    #[arg(value_name = "DIR")]
    pub basedir: PathBuf,

    /// Seconds to wait for a graceful exit
    #[arg(short, long, default_value = "30")]
    pub timeout: u64,
}

pub async fn run(args: RunArgs) -> Result<()> {
    run_node(args.basedir).await
}

pub async fn stop(args: StopArgs, quiet: bool) -> Result<()> {
    let directory = NodeDirectory::new(&args.basedir);
    directory.validate()?;
    stop_node(&directory.pid_path(), args.timeout).await?;
    if !quiet {
        println!("{}", "Node stopped".green());
    }
    Ok(())
}

/// Log level from the node config, `info` when it cannot be read
pub fn configured_log_level(basedir: &Path) -> String {
    NodeDirectory::new(basedir)
        .load_config()
        .map(|config| config.spec.observability.log_level)
        .unwrap_or_else(|_| "info".to_string())
}
