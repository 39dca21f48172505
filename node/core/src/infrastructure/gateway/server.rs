// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Gateway Server
//!
//! TCP listener for file-transfer clients. Each accepted connection gets
//! its own task and its own `Session`; frames are decoded with
//! `LinesCodec` and dispatched to the session one at a time.
//!
//! ## Connection lifecycle
//! - Server sends `hello` with the session's auth challenge
//! - Client authenticates; after `max_auth_attempts` failures the
//!   connection is dropped
//! - Malformed frames get a `bad_request` error and the connection stays up
//! - EOF, `bye` or a transport error end the session; uncommitted writes
//!   are discarded

use crate::application::auth::Credential;
use crate::application::session::{GatewayContext, Session};
use crate::domain::account::PublicKey;
use crate::infrastructure::gateway::protocol::{Reply, Request, Response, MAX_FRAME_LEN};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::AbortHandle;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, warn};

/// Gateway server errors
#[derive(Debug, Error)]
pub enum GatewayServerError {
    #[error("Failed to bind to {address}: {error}")]
    BindFailed { address: String, error: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct GatewayServer {
    context: Arc<GatewayContext>,
    bind_address: String,
    advertised_furl: Option<String>,
    max_auth_attempts: u32,
    server_handle: Arc<Mutex<Option<AbortHandle>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl GatewayServer {
    /// Create a new gateway server
    ///
    /// # Arguments
    /// * `context` - Shared collaborators for every session
    /// * `bind_address` - `host:port`; port 0 picks an ephemeral port
    /// * `max_auth_attempts` - Failed logins tolerated per connection
    pub fn new(context: Arc<GatewayContext>, bind_address: impl Into<String>, max_auth_attempts: u32) -> Self {
        Self {
            context,
            bind_address: bind_address.into(),
            advertised_furl: None,
            max_auth_attempts: max_auth_attempts.max(1),
            server_handle: Arc::new(Mutex::new(None)),
            local_addr: Mutex::new(None),
        }
    }

    /// Furl announced in every `hello`
    pub fn with_advertised_furl(mut self, furl: impl Into<String>) -> Self {
        self.advertised_furl = Some(furl.into());
        self
    }

    /// Bind the listener and spawn the accept loop
    pub async fn start(&self) -> Result<SocketAddr, GatewayServerError> {
        info!("Starting gateway server on {}", self.bind_address);

        let listener = TcpListener::bind(&self.bind_address)
            .await
            .map_err(|e| GatewayServerError::BindFailed {
                address: self.bind_address.clone(),
                error: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;

        let context = self.context.clone();
        let furl = self.advertised_furl.clone();
        let max_auth_attempts = self.max_auth_attempts;

        let handle = tokio::spawn(async move {
            info!("Gateway server task started");
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let context = context.clone();
                        let furl = furl.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, peer, context, furl, max_auth_attempts).await;
                        });
                    }
                    Err(e) => {
                        error!("Gateway accept error: {}", e);
                    }
                }
            }
        });

        *self.server_handle.lock() = Some(handle.abort_handle());
        *self.local_addr.lock() = Some(local_addr);
        info!(address = %local_addr, "Gateway server started successfully");

        Ok(local_addr)
    }

    /// Stop accepting connections
    ///
    /// Connections already accepted run until their client leaves.
    pub async fn stop(&self) -> Result<(), GatewayServerError> {
        info!("Stopping gateway server");

        if let Some(handle) = self.server_handle.lock().take() {
            handle.abort();
            info!("Gateway server stopped");
        } else {
            warn!("Gateway server was not running");
        }

        Ok(())
    }

    /// Check if server is running
    pub fn is_running(&self) -> bool {
        self.server_handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    context: Arc<GatewayContext>,
    furl: Option<String>,
    max_auth_attempts: u32,
) {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_LEN));
    let mut session = Session::new(context);
    debug!(session_id = %session.id(), peer = %peer, "Connection accepted");

    let hello = Response::Hello {
        challenge: session.challenge().to_base64(),
        furl,
    };

    if send(&mut framed, &hello).await {
        while let Some(frame) = framed.next().await {
            let line = match frame {
                Ok(line) => line,
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    if !send(&mut framed, &Response::bad_request("frame too long")).await {
                        break;
                    }
                    continue;
                }
                Err(LinesCodecError::Io(e)) => {
                    debug!(peer = %peer, error = %e, "Connection error");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let request: Request = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    if !send(&mut framed, &Response::bad_request(e.to_string())).await {
                        break;
                    }
                    continue;
                }
            };

            if matches!(request, Request::Bye) {
                send(&mut framed, &Response::ok()).await;
                break;
            }

            let response = dispatch(&mut session, request).await;
            if !send(&mut framed, &response).await {
                break;
            }

            if session.failed_attempts() >= max_auth_attempts {
                warn!(
                    session_id = %session.id(),
                    peer = %peer,
                    "Too many failed authentication attempts, disconnecting"
                );
                break;
            }
        }
    }

    session.close_session().await;
    debug!(peer = %peer, "Connection closed");
}

/// Write one response frame; false if the peer is gone
async fn send(framed: &mut Framed<TcpStream, LinesCodec>, response: &Response) -> bool {
    let line = match serde_json::to_string(response) {
        Ok(line) => line,
        Err(e) => {
            error!("Failed to encode response: {}", e);
            return false;
        }
    };
    framed.send(line).await.is_ok()
}

async fn dispatch(session: &mut Session, request: Request) -> Response {
    match request {
        Request::AuthPassword { username, password } => {
            let result = session
                .authenticate(Credential::Password { username, password })
                .await;
            respond(result.map(|_| Reply {
                username: session.username().map(str::to_string),
                ..Reply::default()
            }))
        }
        Request::AuthPublicKey {
            username,
            public_key,
            signature,
        } => {
            let credential = Credential::PublicKey {
                username,
                public_key: parse_public_key(&public_key),
                signature: STANDARD.decode(signature.trim()).unwrap_or_default(),
            };
            let result = session.authenticate(credential).await;
            respond(result.map(|_| Reply {
                username: session.username().map(str::to_string),
                ..Reply::default()
            }))
        }
        Request::Open { path, mode, truncate } => {
            let result = session.open(&path, Request::open_mode(mode, truncate)).await;
            respond(result.map(|handle| Reply {
                handle: Some(handle),
                ..Reply::default()
            }))
        }
        Request::Read { handle, offset, length } => {
            let result = session.read(handle, offset, length.min(MAX_FRAME_LEN / 2)).await;
            respond(result.map(|data| Reply {
                data: Some(STANDARD.encode(&data)),
                ..Reply::default()
            }))
        }
        Request::Write { handle, offset, data } => {
            let data = match STANDARD.decode(data.as_bytes()) {
                Ok(data) => data,
                Err(e) => return Response::bad_request(format!("invalid base64 payload: {}", e)),
            };
            let result = session.write(handle, offset, &data).await;
            respond(result.map(|written| Reply {
                written: Some(written),
                ..Reply::default()
            }))
        }
        Request::Close { handle } => respond(session.close(handle).await.map(|_| Reply::default())),
        Request::Mkdir { path } => respond(session.mkdir(&path).await.map(|_| Reply::default())),
        Request::Rmdir { path } => respond(session.rmdir(&path).await.map(|_| Reply::default())),
        Request::Remove { path } => respond(session.remove(&path).await.map(|_| Reply::default())),
        Request::Rename { from, to } => {
            respond(session.rename(&from, &to).await.map(|_| Reply::default()))
        }
        Request::Listdir { path } => {
            let result = session.listdir(path.as_deref()).await;
            respond(result.map(|names| Reply {
                names: Some(names),
                ..Reply::default()
            }))
        }
        Request::Stat { path } => {
            let result = session.stat(&path).await;
            respond(result.map(|stat| Reply {
                stat: Some(stat),
                ..Reply::default()
            }))
        }
        Request::Chdir { path } => {
            let result = session.chdir(path.as_deref()).await;
            respond(result.map(|cwd| Reply {
                cwd: Some(cwd),
                ..Reply::default()
            }))
        }
        Request::Bye => Response::ok(),
    }
}

fn respond(result: Result<Reply, crate::domain::vfs::FsError>) -> Response {
    match result {
        Ok(reply) => Response::Ok(reply),
        Err(e) => e.into(),
    }
}

/// Unparseable keys become a key no account holds, so the attempt fails
/// like any other bad credential
fn parse_public_key(text: &str) -> PublicKey {
    let text = text.trim();
    let parsed = if text.contains(char::is_whitespace) {
        text.parse()
    } else {
        PublicKey::from_base64(text)
    };
    parsed.unwrap_or(PublicKey([0u8; 32]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_public_key_forms() {
        let key = PublicKey([7u8; 32]);
        assert_eq!(parse_public_key(&key.to_string()), key);
        assert_eq!(parse_public_key(&key.to_base64()), key);
        assert_eq!(parse_public_key("garbage"), PublicKey([0u8; 32]));
    }
}
