// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Tub Listener
//!
//! The single furl-addressed TCP listener of a node. A client that dials a
//! furl's location hint sends the swiss number as one line; the listener
//! answers `ok <service>` when the number is registered and closes the
//! connection either way.

use crate::domain::furl::{Service, SwissNumber};
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, error, info, warn};

/// Swiss numbers are 64 hex characters; anything longer is not a lookup
const MAX_LOOKUP_LINE: usize = 256;

#[derive(Debug, Error)]
pub enum TubError {
    #[error("Failed to bind tub listener to {address}: {error}")]
    BindFailed { address: String, error: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

type Registry = Arc<RwLock<HashMap<SwissNumber, Service>>>;

pub struct TubListener {
    registry: Registry,
    server_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TubListener {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(HashMap::new())),
            server_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Make `service` reachable through `swiss`
    pub fn register(&self, swiss: SwissNumber, service: Service) {
        debug!(service = %service, "Registered service on tub");
        self.registry.write().insert(swiss, service);
    }

    pub fn registered(&self) -> usize {
        self.registry.read().len()
    }

    /// Bind the listener; returns the bound address
    pub async fn start(&self, bind_address: &str) -> Result<SocketAddr, TubError> {
        let listener = TcpListener::bind(bind_address)
            .await
            .map_err(|e| TubError::BindFailed {
                address: bind_address.to_string(),
                error: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;
        let registry = self.registry.clone();

        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let registry = registry.clone();
                        tokio::spawn(async move {
                            handle_lookup(stream, peer, registry).await;
                        });
                    }
                    Err(e) => {
                        error!("Tub accept error: {}", e);
                    }
                }
            }
        });

        *self.server_handle.lock() = Some(handle);
        info!(address = %local_addr, "Tub listener started");
        Ok(local_addr)
    }

    /// Abort the accept loop and wait until its socket is closed
    pub async fn stop(&self) {
        let handle = self.server_handle.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
            info!("Tub listener stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.server_handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TubListener {
    fn drop(&mut self) {
        if let Some(handle) = self.server_handle.lock().take() {
            handle.abort();
        }
    }
}

impl Default for TubListener {
    fn default() -> Self {
        Self::new()
    }
}

async fn handle_lookup(stream: TcpStream, peer: SocketAddr, registry: Registry) {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LOOKUP_LINE));

    let Some(Ok(line)) = framed.next().await else {
        return;
    };

    let service = SwissNumber::from_hex(line.trim())
        .ok()
        .and_then(|swiss| registry.read().get(&swiss).copied());

    match service {
        Some(service) => {
            debug!(peer = %peer, service = %service, "Furl lookup resolved");
            let _ = framed.send(format!("ok {}", service)).await;
        }
        None => {
            warn!(peer = %peer, "Furl lookup for unknown swiss number");
        }
    }
}
