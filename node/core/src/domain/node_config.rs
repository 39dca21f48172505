// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

// Node Configuration Types
//
// Defines the `capgrid.yaml` schema written by `create-*` and read by `run`:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Node kind and advertised location
// - Storage service settings
// - File-transfer gateway settings
// - Observability settings

use serde::{Deserialize, Serialize};
use std::path::Path;

pub const API_VERSION: &str = "capgrid.io/v1";
pub const KIND: &str = "NodeConfig";

/// Top-level Kubernetes-style node configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigManifest {
    /// API version (must be "capgrid.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "NodeConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: NodeConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable node name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Node configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfigSpec {
    pub node: NodeSettings,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Storage disabled
    Client,
    /// Storage enabled
    Node,
    Introducer,
}

impl NodeKind {
    /// Word used in the readiness log line
    pub fn readiness_label(&self) -> &'static str {
        match self {
            NodeKind::Introducer => "introducer",
            NodeKind::Client | NodeKind::Node => "client",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    pub kind: NodeKind,

    #[serde(default = "default_nickname")]
    pub nickname: String,

    /// Host advertised in furl location hints
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Address the tub listener binds to
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Tub port, fixed at create time so furl locations stay stable
    #[serde(default)]
    pub tub_port: u16,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            kind: NodeKind::Client,
            nickname: default_nickname(),
            hostname: default_hostname(),
            listen_address: default_listen_address(),
            tub_port: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Space to leave free on the storage volume (e.g. "1G")
    #[serde(default = "default_reserved_space")]
    pub reserved_space: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            reserved_space: default_reserved_space(),
        }
    }
}

impl StorageConfig {
    pub fn reserved_bytes(&self) -> anyhow::Result<u64> {
        parse_size(&self.reserved_space)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// 0 picks an ephemeral port, reported in `node.url`
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Relative paths are resolved against the node directory
    #[serde(default = "default_accounts_file")]
    pub accounts_file: String,

    #[serde(default = "default_max_auth_attempts")]
    pub max_auth_attempts: u32,

    /// Bounded retries for directory updates that lose a version race
    #[serde(default = "default_commit_retries")]
    pub commit_retries: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_bind_address(),
            port: default_gateway_port(),
            accounts_file: default_accounts_file(),
            max_auth_attempts: default_max_auth_attempts(),
            commit_retries: default_commit_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics: MetricsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Prometheus scrape port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

// Default value functions

fn default_nickname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "capgrid-node".to_string())
}

fn default_hostname() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_reserved_space() -> String {
    "1G".to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8022
}

fn default_accounts_file() -> String {
    "private/accounts".to_string()
}

fn default_max_auth_attempts() -> u32 {
    3
}

fn default_commit_retries() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9464
}

impl Default for NodeConfigManifest {
    fn default() -> Self {
        Self::for_kind(NodeKind::Client, default_nickname())
    }
}

impl NodeConfigManifest {
    /// Fresh manifest for a node of `kind`, with the per-kind storage default
    pub fn for_kind(kind: NodeKind, nickname: String) -> Self {
        let node = NodeSettings {
            kind,
            nickname: nickname.clone(),
            ..NodeSettings::default()
        };
        let storage = StorageConfig {
            enabled: kind == NodeKind::Node,
            ..StorageConfig::default()
        };

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: nickname,
                version: Some("1".to_string()),
            },
            spec: NodeConfigSpec {
                node,
                storage,
                gateway: GatewayConfig::default(),
                observability: ObservabilityConfig::default(),
            },
        }
    }

    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CAPGRID_LOG_LEVEL") {
            tracing::info!("Environment override: CAPGRID_LOG_LEVEL={}", val);
            self.spec.observability.log_level = val;
        }

        if let Ok(val) = std::env::var("CAPGRID_GATEWAY_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: CAPGRID_GATEWAY_PORT={}", port);
                    self.spec.gateway.port = port;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for CAPGRID_GATEWAY_PORT: '{}'. Expected a port number. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.node.hostname.is_empty() {
            anyhow::bail!("spec.node.hostname cannot be empty");
        }

        if self.spec.gateway.commit_retries == 0 {
            anyhow::bail!("spec.gateway.commit_retries must be at least 1");
        }

        if self.spec.gateway.max_auth_attempts == 0 {
            anyhow::bail!("spec.gateway.max_auth_attempts must be at least 1");
        }

        self.spec
            .storage
            .reserved_bytes()
            .map_err(|e| anyhow::anyhow!("spec.storage.reserved_space: {}", e))?;

        Ok(())
    }
}

/// Parse a human size such as `1G`, `500M`, `10kB` or `1GiB` into bytes
pub fn parse_size(text: &str) -> anyhow::Result<u64> {
    let trimmed = text.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);
    if digits.is_empty() {
        anyhow::bail!("invalid size '{}'", text);
    }
    let value: u64 = digits.parse()?;

    let suffix = suffix.trim().to_ascii_lowercase();
    let (unit, binary) = match suffix.strip_suffix("ib") {
        Some(unit) => (unit.to_string(), true),
        None => (suffix.trim_end_matches('b').to_string(), false),
    };
    let base: u64 = if binary { 1024 } else { 1000 };
    let exponent = match unit.as_str() {
        "" => 0,
        "k" => 1,
        "m" => 2,
        "g" => 3,
        "t" => 4,
        _ => anyhow::bail!("invalid size suffix in '{}'", text),
    };

    value
        .checked_mul(base.pow(exponent))
        .ok_or_else(|| anyhow::anyhow!("size '{}' is too large", text))
}
