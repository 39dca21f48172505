// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Node directory creation
//!
//! Commands: create-node, create-client, create-introducer

use anyhow::{bail, Context, Result};
use capgrid_core::application::node::NodeDirectory;
use capgrid_core::domain::node_config::{NodeConfigManifest, NodeKind};
use capgrid_core::infrastructure::furl_file;
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DEFAULT_BASEDIR: &str = ".capgrid";

#[derive(Args, Debug, Clone, Default)]
pub struct CreateArgs {
    /// Node directory (default: ~/.capgrid)
    #[arg(value_name = "DIR", conflicts_with = "basedir")]
    pub dir: Option<PathBuf>,

    /// Node directory, as an option
    #[arg(short = 'C', long, value_name = "DIR")]
    pub basedir: Option<PathBuf>,

    /// Name announced to other nodes (default: host name)
    #[arg(long)]
    pub nickname: Option<String>,

    /// Host name other nodes use to reach this one
    #[arg(long)]
    pub hostname: Option<String>,

    /// Tub listener port (default: a free port picked now)
    #[arg(long)]
    pub port: Option<u16>,

    /// Address the tub listener binds to
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable the file-transfer gateway
    #[arg(long)]
    pub gateway: bool,

    /// Gateway port
    #[arg(long, requires = "gateway")]
    pub gateway_port: Option<u16>,
}

/// Same options, but an introducer has no default directory
#[derive(Args, Debug, Clone)]
pub struct IntroducerArgs {
    /// Node directory
    #[arg(value_name = "DIR", required_unless_present = "basedir", conflicts_with = "basedir")]
    pub dir: Option<PathBuf>,

    #[arg(short = 'C', long, value_name = "DIR")]
    pub basedir: Option<PathBuf>,

    #[arg(long)]
    pub nickname: Option<String>,

    #[arg(long)]
    pub hostname: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub listen: Option<String>,
}

impl From<IntroducerArgs> for CreateArgs {
    fn from(args: IntroducerArgs) -> Self {
        Self {
            dir: args.dir,
            basedir: args.basedir,
            nickname: args.nickname,
            hostname: args.hostname,
            port: args.port,
            listen: args.listen,
            gateway: false,
            gateway_port: None,
        }
    }
}

impl CreateArgs {
    fn resolve_basedir(&self, kind: NodeKind) -> Result<PathBuf> {
        if let Some(dir) = self.dir.as_ref().or(self.basedir.as_ref()) {
            return Ok(dir.clone());
        }
        if kind == NodeKind::Introducer {
            bail!("create-introducer requires a node directory");
        }
        let home = dirs::home_dir().context("Cannot determine home directory; pass --basedir")?;
        Ok(home.join(DEFAULT_BASEDIR))
    }
}

/// Create a node directory of `kind`; returns its path
pub fn create(kind: NodeKind, args: CreateArgs, quiet: bool) -> Result<PathBuf> {
    let basedir = args.resolve_basedir(kind)?;
    check_empty_or_missing(&basedir)?;

    std::fs::create_dir_all(&basedir)
        .with_context(|| format!("Failed to create {}", basedir.display()))?;
    let directory = NodeDirectory::new(&basedir);
    furl_file::ensure_private_dir(&directory.private_dir())?;

    let nickname = args
        .nickname
        .clone()
        .unwrap_or_else(|| NodeConfigManifest::default().spec.node.nickname);
    let mut config = NodeConfigManifest::for_kind(kind, nickname);
    if let Some(hostname) = &args.hostname {
        config.spec.node.hostname = hostname.clone();
    }
    if let Some(listen) = &args.listen {
        config.spec.node.listen_address = listen.clone();
    }

    // Pinned now so furl location hints survive restarts
    config.spec.node.tub_port = match args.port {
        Some(port) if port != 0 => port,
        _ => allocate_port(&config.spec.node.listen_address)?,
    };

    if args.gateway {
        config.spec.gateway.enabled = true;
        if let Some(port) = args.gateway_port {
            config.spec.gateway.port = port;
        }
    }

    config.validate()?;
    config
        .to_yaml_file(directory.config_path())
        .context("Failed to write node configuration")?;
    info!(
        kind = ?kind,
        tub_port = config.spec.node.tub_port,
        "Wrote {}",
        directory.config_path().display()
    );

    if !quiet {
        let label = match kind {
            NodeKind::Node => "Storage node",
            NodeKind::Client => "Client",
            NodeKind::Introducer => "Introducer",
        };
        println!("{} created in {}", label, basedir.display().to_string().green());
        if args.hostname.is_none() {
            println!(
                "{}",
                " Set spec.node.hostname in capgrid.yaml if other hosts must reach this node.".dimmed()
            );
        }
    }

    Ok(basedir)
}

fn check_empty_or_missing(basedir: &Path) -> Result<()> {
    if !basedir.exists() {
        return Ok(());
    }
    if !basedir.is_dir() {
        bail!("'{}' exists and is not a directory", basedir.display());
    }
    let mut entries = std::fs::read_dir(basedir)
        .with_context(|| format!("Failed to read {}", basedir.display()))?;
    if entries.next().is_some() {
        bail!(
            "The base directory '{}' is not empty. To avoid clobbering anything, nothing was created.",
            basedir.display()
        );
    }
    Ok(())
}

/// Ask the OS for a free port on `listen_address`
fn allocate_port(listen_address: &str) -> Result<u16> {
    let listener = std::net::TcpListener::bind((listen_address, 0))
        .with_context(|| format!("Failed to allocate a port on {}", listen_address))?;
    let port = listener.local_addr()?.port();
    debug!(port, "Allocated tub port");
    Ok(port)
}
