// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Foreground node process management
//!
//! Handles:
//! - PID file (`running.process`) management
//! - Stopping a running node with SIGTERM
//! - Graceful shutdown on SIGINT/SIGTERM

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

pub mod server;

pub use server::run_node;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    Running { pid: u32 },
    Stopped,
    /// PID file names a process that is gone
    Stale { pid: u32 },
}

/// Status of the node whose PID file is `pid_file`
pub fn node_status(pid_file: &Path) -> Result<NodeStatus> {
    match read_pid_file(pid_file)? {
        None => Ok(NodeStatus::Stopped),
        Some(pid) if process_exists(pid) => Ok(NodeStatus::Running { pid }),
        Some(pid) => Ok(NodeStatus::Stale { pid }),
    }
}

/// Stop the node gracefully, waiting up to `timeout_secs`
pub async fn stop_node(pid_file: &Path, timeout_secs: u64) -> Result<()> {
    let pid = match node_status(pid_file)? {
        NodeStatus::Running { pid } => pid,
        NodeStatus::Stale { pid } => {
            warn!("Removing stale PID file for process {}", pid);
            let _ = std::fs::remove_file(pid_file);
            bail!("Node is not running (stale PID file removed)");
        }
        NodeStatus::Stopped => bail!("Node is not running ({} not found)", pid_file.display()),
    };

    info!("Sending SIGTERM to process {}", pid);

    #[cfg(unix)]
    {
        send_signal(pid, libc::SIGTERM)?;
    }
    #[cfg(not(unix))]
    {
        bail!("Stopping a node is only supported on unix");
    }

    // Poll in 100ms steps
    for _ in 0..timeout_secs.saturating_mul(10) {
        if !process_exists(pid) {
            info!("Node stopped gracefully");
            let _ = std::fs::remove_file(pid_file);
            return Ok(());
        }
        sleep(Duration::from_millis(100)).await;
    }

    bail!("Node did not stop within {} seconds", timeout_secs)
}

pub fn read_pid_file(pid_file: &Path) -> Result<Option<u32>> {
    match std::fs::read_to_string(pid_file) {
        Ok(content) => {
            let pid = content
                .trim()
                .parse::<u32>()
                .with_context(|| format!("Invalid PID in {}", pid_file.display()))?;
            Ok(Some(pid))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read PID file {}", pid_file.display())),
    }
}

/// Write PID file
pub fn write_pid_file(pid_file: &Path, pid: u32) -> Result<()> {
    std::fs::write(pid_file, format!("{}\n", pid))
        .with_context(|| format!("Failed to write PID file: {:?}", pid_file))?;
    info!("Wrote PID file: {:?}", pid_file);
    Ok(())
}

/// Remove PID file
pub fn remove_pid_file(pid_file: &Path) -> Result<()> {
    if pid_file.exists() {
        std::fs::remove_file(pid_file)
            .with_context(|| format!("Failed to remove PID file: {:?}", pid_file))?;
        info!("Removed PID file: {:?}", pid_file);
    }
    Ok(())
}

/// Removes the PID file when dropped
pub struct PidFileGuard(PathBuf);

impl PidFileGuard {
    pub fn new(pid_file: PathBuf) -> Self {
        Self(pid_file)
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        let _ = remove_pid_file(&self.0);
    }
}

fn process_exists(_pid: u32) -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::kill(_pid as i32, 0) == 0 }
    }

    #[cfg(not(unix))]
    {
        false
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: i32) -> Result<()> {
    unsafe {
        if libc::kill(pid as i32, signal) != 0 {
            bail!("Failed to send signal {} to process {}", signal, pid);
        }
    }
    Ok(())
}
