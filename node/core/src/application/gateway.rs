// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

// Gateway service: wires the account table, the store and the event
// publisher into a GatewayServer configured from `spec.gateway`.

use crate::application::session::GatewayContext;
use crate::domain::account::{AccountError, AccountTable};
use crate::domain::events::EventPublisher;
use crate::domain::node_config::GatewayConfig;
use crate::domain::storage::CapabilityStore;
use crate::infrastructure::gateway::{GatewayServer, GatewayServerError};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Load the accounts file; a missing file means no accounts yet
pub fn load_accounts(path: &Path) -> Result<AccountTable, AccountError> {
    if !path.exists() {
        warn!(path = %path.display(), "Accounts file not found, gateway will reject every login");
        return Ok(AccountTable::new());
    }
    let table = AccountTable::load(path)?;
    info!(path = %path.display(), accounts = table.len(), "Loaded accounts");
    Ok(table)
}

pub struct GatewayService {
    server: GatewayServer,
    accounts: Arc<AccountTable>,
}

impl GatewayService {
    pub fn new(
        config: &GatewayConfig,
        accounts: Arc<AccountTable>,
        store: Arc<dyn CapabilityStore>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        let context = Arc::new(GatewayContext::new(
            store,
            accounts.clone(),
            events,
            config.commit_retries,
        ));
        let bind_address = format!("{}:{}", config.bind_address, config.port);
        Self {
            server: GatewayServer::new(context, bind_address, config.max_auth_attempts),
            accounts,
        }
    }

    pub fn with_advertised_furl(mut self, furl: impl Into<String>) -> Self {
        self.server = self.server.with_advertised_furl(furl);
        self
    }

    pub async fn start(&self) -> Result<SocketAddr, GatewayServerError> {
        let addr = self.server.start().await?;
        info!(address = %addr, accounts = self.accounts.len(), "Gateway accepting connections");
        Ok(addr)
    }

    pub async fn stop(&self) -> Result<(), GatewayServerError> {
        self.server.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.server.is_running()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::password_line;
    use crate::domain::capability::DirCap;
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::storage::InMemoryCapabilityStore;

    #[test]
    fn test_missing_accounts_file_is_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let table = load_accounts(&dir.path().join("accounts")).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_load_accounts_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts");
        std::fs::write(&path, password_line("alice", "password", &DirCap::generate())).unwrap();
        assert_eq!(load_accounts(&path).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let config = GatewayConfig {
            port: 0,
            ..GatewayConfig::default()
        };
        let service = GatewayService::new(
            &config,
            Arc::new(AccountTable::new()),
            Arc::new(InMemoryCapabilityStore::new()),
            Arc::new(EventBus::new(16)),
        );

        let addr = service.start().await.unwrap();
        assert_eq!(service.local_addr(), Some(addr));
        assert!(service.is_running());

        service.stop().await.unwrap();
        assert!(!service.is_running());
    }
}
