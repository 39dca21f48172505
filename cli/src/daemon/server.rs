// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Foreground node runner

use anyhow::{bail, Context, Result};
use capgrid_core::application::node::{Node, NodeDirectory};
use capgrid_core::domain::events::GatewayEvent;
use capgrid_core::infrastructure::event_bus::{EventBusError, EventReceiver};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};

use super::{node_status, write_pid_file, NodeStatus, PidFileGuard};

/// Run the node in `basedir` until SIGINT or SIGTERM
pub async fn run_node(basedir: PathBuf) -> Result<()> {
    let directory = NodeDirectory::new(&basedir);
    let config = directory.load_config()?;

    let pid_file = directory.pid_path();
    match node_status(&pid_file)? {
        NodeStatus::Running { pid } => bail!("Node is already running (PID: {})", pid),
        NodeStatus::Stale { pid } => warn!("Replacing stale PID file for process {}", pid),
        NodeStatus::Stopped => {}
    }

    let pid = std::process::id();
    write_pid_file(&pid_file, pid)?;
    // Ensure PID file cleanup on exit
    let _guard = PidFileGuard::new(pid_file);

    if config.spec.observability.metrics.enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.spec.observability.metrics.port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Prometheus metrics exporter listening on {}", addr);
    }

    let node = Node::start(basedir).await?;
    let audit = tokio::spawn(log_audit_events(node.events().subscribe()));

    shutdown_signal().await;

    audit.abort();
    node.shutdown().await?;
    info!("Node process exiting");
    Ok(())
}

async fn log_audit_events(mut events: EventReceiver) {
    loop {
        match events.recv().await {
            Ok(GatewayEvent::FileCommitted { username, path, size, .. }) => {
                info!(username = %username, path = %path, size, "File committed");
            }
            Ok(GatewayEvent::AuthenticationRejected { claimed_username, .. }) => {
                warn!(claimed_username = %claimed_username, "Gateway login rejected");
            }
            Ok(_) => {}
            Err(EventBusError::Lagged(_)) | Err(EventBusError::Empty) => continue,
            Err(EventBusError::Closed) => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
