// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Node Lifecycle
//!
//! Startup order for a node directory:
//!
//! 1. Validate the directory and load `capgrid.yaml`
//! 2. Load or generate the node identity
//! 3. Bind the tub listener (its port is part of every furl); a port of 0
//!    is resolved once and recorded in `private/tub.port`
//! 4. Load or generate and persist each advertised furl, then register it
//! 5. Open and health-check the local store, then start the
//!    file-transfer gateway when enabled
//! 6. Write `node.url` and log `"<kind> running"`
//!
//! Nothing is advertised before step 4 has persisted its furl, and a
//! persistence failure aborts startup.

use crate::application::gateway::{load_accounts, GatewayService};
use crate::application::node_identity::NodeIdentityService;
use crate::domain::account::AccountError;
use crate::domain::furl::{Furl, FurlError, Service};
use crate::domain::node_config::{NodeConfigManifest, NodeKind};
use crate::domain::storage::{CapabilityStore, StoreError};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::gateway::GatewayServerError;
use crate::infrastructure::storage::{create_capability_store, StorageBackend};
use crate::infrastructure::tub::{TubError, TubListener};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub const CONFIG_FILE: &str = "capgrid.yaml";
pub const PRIVATE_DIR: &str = "private";
pub const GRID_DIR: &str = "grid";
pub const NODE_URL_FILE: &str = "node.url";
pub const PID_FILE: &str = "running.process";

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("'{0}' does not look like a directory at all")]
    NotADirectory(String),

    #[error("'{0}' is not a recognizable node directory")]
    NotANodeDirectory(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Node identity error: {0}")]
    Identity(#[from] FurlError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Accounts error: {0}")]
    Accounts(#[from] AccountError),

    #[error("Tub error: {0}")]
    Tub(#[from] TubError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayServerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Well-known paths inside a node directory
#[derive(Debug, Clone)]
pub struct NodeDirectory {
    basedir: PathBuf,
}

impl NodeDirectory {
    pub fn new(basedir: impl Into<PathBuf>) -> Self {
        Self {
            basedir: basedir.into(),
        }
    }

    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    pub fn config_path(&self) -> PathBuf {
        self.basedir.join(CONFIG_FILE)
    }

    pub fn private_dir(&self) -> PathBuf {
        self.basedir.join(PRIVATE_DIR)
    }

    pub fn grid_dir(&self) -> PathBuf {
        self.basedir.join(GRID_DIR)
    }

    pub fn node_url_path(&self) -> PathBuf {
        self.basedir.join(NODE_URL_FILE)
    }

    pub fn pid_path(&self) -> PathBuf {
        self.basedir.join(PID_FILE)
    }

    pub fn furl_path(&self, service: Service) -> PathBuf {
        self.private_dir().join(service.furl_file_name())
    }

    /// Resolve a configured path against the node directory
    pub fn resolve(&self, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.basedir.join(path)
        }
    }

    /// Fail unless this is a directory holding a node config
    pub fn validate(&self) -> Result<(), NodeError> {
        let display = self.basedir.display().to_string();
        if !self.basedir.is_dir() {
            return Err(NodeError::NotADirectory(display));
        }
        if !self.config_path().is_file() {
            return Err(NodeError::NotANodeDirectory(display));
        }
        Ok(())
    }

    pub fn load_config(&self) -> Result<NodeConfigManifest, NodeError> {
        self.validate()?;
        let mut config = NodeConfigManifest::from_yaml_file(self.config_path())
            .map_err(|e| NodeError::Config(format!("{:#}", e)))?;
        config.apply_env_overrides();
        config
            .validate()
            .map_err(|e| NodeError::Config(format!("{:#}", e)))?;
        Ok(config)
    }
}

pub struct Node;

impl Node {
    /// Start the node in `basedir` and return once it is ready
    pub async fn start(basedir: impl Into<PathBuf>) -> Result<RunningNode, NodeError> {
        let directory = NodeDirectory::new(basedir);
        let config = directory.load_config()?;
        let settings = &config.spec.node;
        info!(
            nickname = %settings.nickname,
            basedir = %directory.basedir().display(),
            "Starting {:?} node",
            settings.kind
        );

        let identities = NodeIdentityService::new(directory.private_dir());
        let identity = identities.load_or_create_identity()?;

        // Dropping the listener on an early return aborts its accept loop
        let tub = TubListener::new();
        let recorded_port = match settings.tub_port {
            0 => identities.recorded_tub_port()?,
            port => Some(port),
        };
        let tub_addr = tub
            .start(&format!("{}:{}", settings.listen_address, recorded_port.unwrap_or(0)))
            .await?;
        if recorded_port.is_none() {
            identities.record_tub_port(tub_addr.port())?;
        }
        let location_hints = vec![format!("{}:{}", settings.hostname, tub_addr.port())];

        let mut services = Vec::new();
        if settings.kind == NodeKind::Introducer {
            services.push(Service::Introducer);
        }
        if config.spec.storage.enabled {
            services.push(Service::Storage);
        }

        let mut furls = BTreeMap::new();
        for service in services {
            let furl = identities.load_or_create_furl(&identity, service, &location_hints)?;
            tub.register(furl.swiss.clone(), service);
            furls.insert(service, furl);
        }

        let store = if config.spec.storage.enabled || config.spec.gateway.enabled {
            let reserved = config.spec.storage.reserved_bytes().unwrap_or(0);
            info!(reserved_bytes = reserved, "Opening local capability store");
            let store = create_capability_store(StorageBackend::Local {
                base_path: directory.grid_dir(),
            })?;
            store.health_check().await?;
            Some(store)
        } else {
            None
        };

        let events = EventBus::with_default_capacity();
        let gateway = match (&store, config.spec.gateway.enabled) {
            (Some(store), true) => {
                let accounts = load_accounts(&directory.resolve(&config.spec.gateway.accounts_file))?;
                let mut service = GatewayService::new(
                    &config.spec.gateway,
                    Arc::new(accounts),
                    store.clone(),
                    Arc::new(events.clone()),
                );
                if let Some(furl) = furls.values().next() {
                    service = service.with_advertised_furl(furl.to_string());
                }
                service.start().await?;
                Some(service)
            }
            _ => None,
        };

        let node_url = match gateway.as_ref().and_then(GatewayService::local_addr) {
            Some(addr) => format!("tcp://{}:{}/\n", config.spec.gateway.bind_address, addr.port()),
            None => format!("tcp://{}/\n", location_hints[0]),
        };
        std::fs::write(directory.node_url_path(), node_url)?;

        info!("{} running", settings.kind.readiness_label());

        Ok(RunningNode {
            directory,
            config,
            tub,
            tub_addr,
            furls,
            store,
            gateway,
            events,
        })
    }
}

/// Handle on a started node
pub struct RunningNode {
    directory: NodeDirectory,
    config: NodeConfigManifest,
    tub: TubListener,
    tub_addr: SocketAddr,
    furls: BTreeMap<Service, Furl>,
    store: Option<Arc<dyn CapabilityStore>>,
    gateway: Option<GatewayService>,
    events: EventBus,
}

impl RunningNode {
    pub fn directory(&self) -> &NodeDirectory {
        &self.directory
    }

    pub fn config(&self) -> &NodeConfigManifest {
        &self.config
    }

    pub fn furl(&self, service: Service) -> Option<&Furl> {
        self.furls.get(&service)
    }

    pub fn furls(&self) -> &BTreeMap<Service, Furl> {
        &self.furls
    }

    pub fn tub_addr(&self) -> SocketAddr {
        self.tub_addr
    }

    pub fn gateway_addr(&self) -> Option<SocketAddr> {
        self.gateway.as_ref().and_then(GatewayService::local_addr)
    }

    pub fn store(&self) -> Option<&Arc<dyn CapabilityStore>> {
        self.store.as_ref()
    }

    /// Audit events from every gateway session
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Stop listeners and remove the readiness marker
    pub async fn shutdown(self) -> Result<(), NodeError> {
        info!("Shutting down node");
        if let Some(gateway) = &self.gateway {
            gateway.stop().await?;
        }
        self.tub.stop().await;

        if let Err(e) = std::fs::remove_file(self.directory.node_url_path()) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", NODE_URL_FILE, e);
            }
        }
        info!("Node stopped");
        Ok(())
    }
}
