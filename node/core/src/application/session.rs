// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Session Orchestrator
//!
//! One `Session` per client connection:
//!
//! ```text
//! Unauthenticated --authenticate--> Authenticated --close_session--> Closed
//! ```
//!
//! An authenticated session owns its account binding, its working
//! directory and its handle table. Operations run one at a time in the
//! connection's task; sessions share nothing but the store.

use crate::application::auth::{AuthChallenge, AuthenticationGateway, Credential};
use crate::application::file_handles::{FileHandleManager, HandleTable, OpenHandle};
use crate::application::mutation::DirectoryMutationEngine;
use crate::application::resolver::PathResolver;
use crate::domain::account::{Account, AccountTable};
use crate::domain::directory::Entry;
use crate::domain::events::{EventPublisher, GatewayEvent};
use crate::domain::path_sanitizer::{PathSanitizer, VirtualPath};
use crate::domain::storage::CapabilityStore;
use crate::domain::vfs::{FileStat, FsError, HandleId, Location, OpenMode};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shared collaborators handed to every session
pub struct GatewayContext {
    pub auth: AuthenticationGateway,
    pub files: FileHandleManager,
    pub mutations: DirectoryMutationEngine,
    pub sanitizer: PathSanitizer,
    pub events: Arc<dyn EventPublisher>,
}

impl GatewayContext {
    pub fn new(
        store: Arc<dyn CapabilityStore>,
        accounts: Arc<AccountTable>,
        events: Arc<dyn EventPublisher>,
        commit_retries: u32,
    ) -> Self {
        let mutations = DirectoryMutationEngine::new(PathResolver::new(store), commit_retries);
        Self {
            auth: AuthenticationGateway::new(accounts),
            files: FileHandleManager::new(mutations.clone()),
            mutations,
            sanitizer: PathSanitizer::new(),
            events,
        }
    }
}

pub struct AuthenticatedSession {
    account: Arc<Account>,
    /// Working directory, relative to the account root
    cwd: VirtualPath,
    handles: HandleTable,
}

impl AuthenticatedSession {
    pub fn account(&self) -> &Arc<Account> {
        &self.account
    }

    pub fn cwd(&self) -> &VirtualPath {
        &self.cwd
    }

    /// Every path, relative or not, is resolved by name from the account root
    ///
    /// The working directory is only a path prefix, so a session whose
    /// working directory was renamed elsewhere sees `NotFound` uniformly.
    fn locate(&self, sanitizer: &PathSanitizer, path: &str) -> Result<Location, FsError> {
        let normalized = sanitizer.normalize(path, &self.cwd)?;
        Ok(Location::from_root(self.account.root, normalized.absolute))
    }
}

pub enum SessionState {
    Unauthenticated { failed_attempts: u32 },
    Authenticated(AuthenticatedSession),
    Closed,
}

pub struct Session {
    id: Uuid,
    context: Arc<GatewayContext>,
    challenge: AuthChallenge,
    state: SessionState,
}

impl Session {
    pub fn new(context: Arc<GatewayContext>) -> Self {
        metrics::gauge!("capgrid_sessions_active").increment(1.0);
        Self {
            id: Uuid::new_v4(),
            context,
            challenge: AuthChallenge::generate(),
            state: SessionState::Unauthenticated { failed_attempts: 0 },
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn challenge(&self) -> &AuthChallenge {
        &self.challenge
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn failed_attempts(&self) -> u32 {
        match self.state {
            SessionState::Unauthenticated { failed_attempts } => failed_attempts,
            _ => 0,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match &self.state {
            SessionState::Authenticated(s) => Some(s.account.username.as_str()),
            _ => None,
        }
    }

    /// Bind the session to an account. The working directory starts at its root.
    pub async fn authenticate(&mut self, credential: Credential) -> Result<(), FsError> {
        let failed_attempts = match self.state {
            SessionState::Unauthenticated { failed_attempts } => failed_attempts,
            SessionState::Authenticated(_) => {
                return Err(FsError::InvalidArgument("session is already authenticated".to_string()))
            }
            SessionState::Closed => return Err(FsError::NotAuthenticated),
        };

        let outcome = self.context.auth.authenticate(&credential, &self.challenge);
        match outcome {
            Ok(account) => {
                info!(
                    session_id = %self.id,
                    username = %account.username,
                    method = credential.method(),
                    "Session authenticated"
                );
                self.context
                    .events
                    .publish_gateway_event(GatewayEvent::SessionAuthenticated {
                        session_id: self.id,
                        username: account.username.clone(),
                        method: credential.method().to_string(),
                        authenticated_at: Utc::now(),
                    })
                    .await;
                self.state = SessionState::Authenticated(AuthenticatedSession {
                    cwd: VirtualPath::root(),
                    account,
                    handles: HandleTable::new(),
                });
                Ok(())
            }
            Err(e) => {
                warn!(
                    session_id = %self.id,
                    claimed_username = %credential.username(),
                    attempt = failed_attempts + 1,
                    "Authentication rejected"
                );
                metrics::counter!("capgrid_auth_failures_total").increment(1);
                self.state = SessionState::Unauthenticated {
                    failed_attempts: failed_attempts + 1,
                };
                self.context
                    .events
                    .publish_gateway_event(GatewayEvent::AuthenticationRejected {
                        session_id: self.id,
                        claimed_username: credential.username().to_string(),
                        rejected_at: Utc::now(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    fn authenticated(&mut self) -> Result<&mut AuthenticatedSession, FsError> {
        match &mut self.state {
            SessionState::Authenticated(session) => Ok(session),
            _ => Err(FsError::NotAuthenticated),
        }
    }

    pub async fn open(&mut self, path: &str, mode: OpenMode) -> Result<HandleId, FsError> {
        let context = Arc::clone(&self.context);
        let session = self.authenticated()?;
        let location = session.locate(&context.sanitizer, path)?;

        let handle = match mode {
            OpenMode::Read => context.files.open_read(&location).await?,
            OpenMode::Write { truncate } => context.files.open_write(&location, truncate).await?,
        };
        let id = session.handles.insert(handle);
        debug!(session_id = %self.id, path = %location, handle = %id, ?mode, "Opened file");
        Ok(id)
    }

    pub async fn read(&mut self, handle: HandleId, offset: Option<u64>, length: usize) -> Result<Bytes, FsError> {
        let context = Arc::clone(&self.context);
        let session = self.authenticated()?;
        let open = session.handles.get_mut(handle)?;
        context.files.read(open, offset, length).await
    }

    pub async fn write(&mut self, handle: HandleId, offset: Option<u64>, data: &[u8]) -> Result<usize, FsError> {
        let context = Arc::clone(&self.context);
        let session = self.authenticated()?;
        let open = session.handles.get_mut(handle)?;
        context.files.write(open, offset, data)
    }

    /// Close a handle, committing it if it was opened for writing
    ///
    /// A commit that fails with `StoreUnavailable` or `Conflict` leaves the
    /// handle open so the close can be retried.
    pub async fn close(&mut self, handle: HandleId) -> Result<(), FsError> {
        let context = Arc::clone(&self.context);
        let session_id = self.id;
        let session = self.authenticated()?;

        let writer = match session.handles.remove(handle)? {
            OpenHandle::Read(_) => return Ok(()),
            OpenHandle::Write(writer) => writer,
        };

        match context.files.commit(&writer).await {
            Ok(file) => {
                let event = GatewayEvent::FileCommitted {
                    session_id,
                    username: session.account.username.clone(),
                    path: writer.location().to_string(),
                    size: file.size(),
                    committed_at: Utc::now(),
                };
                context.events.publish_gateway_event(event).await;
                Ok(())
            }
            Err(e) => {
                if e.is_retryable_commit() {
                    warn!(session_id = %session_id, path = %writer.location(), error = %e, "Commit failed, handle kept open");
                    session.handles.restore(handle, OpenHandle::Write(writer));
                }
                Err(e)
            }
        }
    }

    pub async fn mkdir(&mut self, path: &str) -> Result<(), FsError> {
        let context = Arc::clone(&self.context);
        let session_id = self.id;
        let session = self.authenticated()?;
        let location = session.locate(&context.sanitizer, path)?;
        context.mutations.mkdir(&location).await?;

        let event = GatewayEvent::DirectoryCreated {
            session_id,
            username: session.account.username.clone(),
            path: location.to_string(),
            created_at: Utc::now(),
        };
        context.events.publish_gateway_event(event).await;
        Ok(())
    }

    pub async fn rmdir(&mut self, path: &str) -> Result<(), FsError> {
        let context = Arc::clone(&self.context);
        let session = self.authenticated()?;
        let location = session.locate(&context.sanitizer, path)?;
        context.mutations.rmdir(&location).await?;
        self.publish_removed(&location).await;
        Ok(())
    }

    pub async fn remove(&mut self, path: &str) -> Result<(), FsError> {
        let context = Arc::clone(&self.context);
        let session = self.authenticated()?;
        let location = session.locate(&context.sanitizer, path)?;
        context.mutations.remove(&location).await?;
        self.publish_removed(&location).await;
        Ok(())
    }

    async fn publish_removed(&mut self, location: &Location) {
        let username = self.username().unwrap_or_default().to_string();
        let event = GatewayEvent::EntryRemoved {
            session_id: self.id,
            username,
            path: location.to_string(),
            removed_at: Utc::now(),
        };
        self.context.events.publish_gateway_event(event).await;
    }

    pub async fn rename(&mut self, from: &str, to: &str) -> Result<(), FsError> {
        let context = Arc::clone(&self.context);
        let session_id = self.id;
        let session = self.authenticated()?;
        let from = session.locate(&context.sanitizer, from)?;
        let to = session.locate(&context.sanitizer, to)?;
        context.mutations.rename(&from, &to).await?;

        let event = GatewayEvent::EntryRenamed {
            session_id,
            username: session.account.username.clone(),
            from: from.to_string(),
            to: to.to_string(),
            renamed_at: Utc::now(),
        };
        context.events.publish_gateway_event(event).await;
        Ok(())
    }

    /// Names in a directory; the working directory when `path` is `None`
    pub async fn listdir(&mut self, path: Option<&str>) -> Result<Vec<String>, FsError> {
        let context = Arc::clone(&self.context);
        let session = self.authenticated()?;
        let location = session.locate(&context.sanitizer, path.unwrap_or(""))?;
        context.mutations.list(&location).await
    }

    pub async fn stat(&mut self, path: &str) -> Result<FileStat, FsError> {
        let context = Arc::clone(&self.context);
        let session = self.authenticated()?;
        let location = session.locate(&context.sanitizer, path)?;
        context.mutations.stat(&location).await
    }

    /// Change the working directory; `None` returns to the account root
    pub async fn chdir(&mut self, path: Option<&str>) -> Result<String, FsError> {
        let context = Arc::clone(&self.context);
        let session = self.authenticated()?;

        let Some(path) = path else {
            session.cwd = VirtualPath::root();
            return Ok(session.cwd.to_string());
        };

        let location = session.locate(&context.sanitizer, path)?;
        match context.mutations.resolver().resolve(&location).await? {
            Entry::Dir { .. } => {
                session.cwd = location.absolute;
                Ok(session.cwd.to_string())
            }
            Entry::File(_) => Err(FsError::NotADirectory(location.to_string())),
        }
    }

    /// End the session, discarding uncommitted writes
    pub async fn close_session(&mut self) -> usize {
        let previous = std::mem::replace(&mut self.state, SessionState::Closed);
        let (username, discarded) = match previous {
            SessionState::Authenticated(mut session) => {
                (Some(session.account.username.clone()), session.handles.clear())
            }
            SessionState::Unauthenticated { .. } => (None, 0),
            SessionState::Closed => return 0,
        };

        if discarded > 0 {
            info!(session_id = %self.id, discarded, "Discarded uncommitted writes");
        }
        debug!(session_id = %self.id, "Session closed");
        self.context
            .events
            .publish_gateway_event(GatewayEvent::SessionClosed {
                session_id: self.id,
                username,
                discarded_writes: discarded,
                closed_at: Utc::now(),
            })
            .await;
        discarded
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        metrics::gauge!("capgrid_sessions_active").decrement(1.0);
    }
}
