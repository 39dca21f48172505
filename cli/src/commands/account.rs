// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Gateway account provisioning

use anyhow::{bail, Context, Result};
use capgrid_core::application::node::NodeDirectory;
use capgrid_core::domain::account::{password_line, public_key_line, AccountTable, PublicKey};
use capgrid_core::domain::capability::DirCap;
use capgrid_core::domain::directory::DirectoryEntries;
use capgrid_core::infrastructure::storage::{create_capability_store, StorageBackend};
use clap::Args;
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub struct AddAccountArgs {
    /// Node directory
    #[arg(value_name = "DIR")]
    pub basedir: PathBuf,

    #[arg(long)]
    pub username: String,

    /// Password credential
    #[arg(long, conflicts_with = "public_key", required_unless_present = "public_key")]
    pub password: Option<String>,

    /// File holding an `ssh-ed25519 <base64>` public key
    #[arg(long, value_name = "FILE")]
    pub public_key: Option<PathBuf>,

    /// Bind to an existing root directory instead of creating one
    #[arg(long, value_name = "URI:DIR2:...")]
    pub root_cap: Option<String>,
}

pub async fn add_account(args: AddAccountArgs, quiet: bool) -> Result<()> {
    let directory = NodeDirectory::new(&args.basedir);
    let config = directory.load_config()?;

    if args.username.is_empty() || args.username.contains(char::is_whitespace) {
        bail!("Username must be non-empty and contain no whitespace");
    }

    let root = match &args.root_cap {
        Some(text) => text
            .parse::<DirCap>()
            .map_err(|e| anyhow::anyhow!("Invalid --root-cap: {}", e))?,
        None => {
            let store = create_capability_store(StorageBackend::Local {
                base_path: directory.grid_dir(),
            })?;
            let dir = store
                .put_mutable(DirectoryEntries::new())
                .await
                .context("Failed to create root directory")?;
            info!(root = %dir.cap, "Created empty root directory");
            dir.cap
        }
    };

    let line = match (&args.password, &args.public_key) {
        (Some(password), _) => password_line(&args.username, password, &root),
        (None, Some(path)) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read public key {}", path.display()))?;
            let key: PublicKey = text
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
            public_key_line(&args.username, &key, &root)
        }
        (None, None) => bail!("Either --password or --public-key is required"),
    };

    let accounts_path = directory.resolve(&config.spec.gateway.accounts_file);
    let existing = match std::fs::read_to_string(&accounts_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", accounts_path.display())),
    };

    // Reject lines that would make the file unloadable
    let mut combined = existing.clone();
    if !combined.is_empty() && !combined.ends_with('\n') {
        combined.push('\n');
    }
    combined.push_str(&line);
    AccountTable::parse(&combined)?;

    if let Some(parent) = accounts_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&accounts_path)
        .with_context(|| format!("Failed to open {}", accounts_path.display()))?;
    if !existing.is_empty() && !existing.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    file.write_all(line.as_bytes())?;
    file.sync_all()?;

    if !config.spec.gateway.enabled {
        warn!("Gateway is disabled in capgrid.yaml; the account is unusable until it is enabled");
    }
    if !quiet {
        println!("Account '{}' added with root {}", args.username.green(), root);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::create::{create, CreateArgs};
    use capgrid_core::domain::node_config::NodeKind;
    use std::path::Path;

    fn node_dir(tmp: &tempfile::TempDir) -> PathBuf {
        let basedir = tmp.path().join("node");
        let args = CreateArgs {
            dir: Some(basedir.clone()),
            listen: Some("127.0.0.1".to_string()),
            gateway: true,
            ..CreateArgs::default()
        };
        create(NodeKind::Node, args, true).unwrap()
    }

    fn password_args(basedir: &Path, username: &str) -> AddAccountArgs {
        AddAccountArgs {
            basedir: basedir.to_path_buf(),
            username: username.to_string(),
            password: Some("password".to_string()),
            public_key: None,
            root_cap: None,
        }
    }

    #[tokio::test]
    async fn test_add_password_account() {
        let tmp = tempfile::tempdir().unwrap();
        let basedir = node_dir(&tmp);

        add_account(password_args(&basedir, "alice"), true).await.unwrap();
        add_account(password_args(&basedir, "bob"), true).await.unwrap();

        let table = AccountTable::load(basedir.join("private/accounts")).unwrap();
        assert_eq!(table.len(), 2);
        let alice = table.get("alice").unwrap();
        let bob = table.get("bob").unwrap();
        assert_ne!(alice.root, bob.root);
    }

    #[tokio::test]
    async fn test_add_public_key_to_existing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let basedir = node_dir(&tmp);
        add_account(password_args(&basedir, "alice"), true).await.unwrap();
        let root = AccountTable::load(basedir.join("private/accounts"))
            .unwrap()
            .get("alice")
            .unwrap()
            .root;

        let key_path = tmp.path().join("alice.pub");
        std::fs::write(&key_path, format!("{}\n", PublicKey([3u8; 32]))).unwrap();
        let args = AddAccountArgs {
            password: None,
            public_key: Some(key_path),
            root_cap: Some(root.to_string()),
            ..password_args(&basedir, "alice")
        };
        add_account(args, true).await.unwrap();

        let table = AccountTable::load(basedir.join("private/accounts")).unwrap();
        let alice = table.get("alice").unwrap();
        assert!(alice.credentials.password.is_some());
        assert!(alice.credentials.public_keys.contains(&PublicKey([3u8; 32])));
    }

    #[tokio::test]
    async fn test_conflicting_root_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let basedir = node_dir(&tmp);
        add_account(password_args(&basedir, "alice"), true).await.unwrap();

        let args = AddAccountArgs {
            root_cap: Some(DirCap::generate().to_string()),
            ..password_args(&basedir, "alice")
        };
        assert!(add_account(args, true).await.is_err());

        let table = AccountTable::load(basedir.join("private/accounts")).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_requires_node_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let err = add_account(password_args(tmp.path(), "alice"), true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("is not a recognizable node directory"));
    }
}
