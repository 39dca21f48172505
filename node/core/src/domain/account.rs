// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Account Table
//!
//! Accounts are provisioned outside the node and loaded once at startup
//! from the accounts file. Each line grants one credential to a username
//! and names the root directory capability the account is bound to:
//!
//! ```text
//! # username  credential                      root capability
//! alice       password                        URI:DIR2:...
//! alice2      ssh-ed25519 <base64 public key> URI:DIR2:...
//! ```
//!
//! Lines for the same username merge, as long as they agree on the root.

use crate::domain::capability::{CapabilityParseError, DirCap};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;

const ED25519_KEY_TYPE: &str = "ssh-ed25519";

/// Account table errors
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Failed to read accounts file {path}: {error}")]
    Io { path: String, error: String },

    #[error("Accounts file line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("Account {username} is bound to more than one root capability")]
    ConflictingRoot { username: String },

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
}

/// Ed25519 public key registered for an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_base64(encoded: &str) -> Result<Self, AccountError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| AccountError::InvalidPublicKey(e.to_string()))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AccountError::InvalidPublicKey("expected 32 key bytes".to_string()))?;
        Ok(Self(key))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", ED25519_KEY_TYPE, self.to_base64())
    }
}

impl FromStr for PublicKey {
    type Err = AccountError;

    /// Parse `ssh-ed25519 <base64> [comment]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(ED25519_KEY_TYPE), Some(encoded)) => Self::from_base64(encoded),
            (Some(other), _) => Err(AccountError::InvalidPublicKey(format!(
                "unsupported key type {}",
                other
            ))),
            _ => Err(AccountError::InvalidPublicKey("empty key".to_string())),
        }
    }
}

/// SHA-256 of a password, compared in constant time
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordDigest([u8; 32]);

impl PasswordDigest {
    pub fn from_plaintext(password: &str) -> Self {
        Self(Sha256::digest(password.as_bytes()).into())
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let candidate = Self::from_plaintext(candidate);
        self.0.ct_eq(&candidate.0).into()
    }
}

impl fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordDigest(..)")
    }
}

/// Credentials accepted for an account
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub password: Option<PasswordDigest>,
    pub public_keys: BTreeSet<PublicKey>,
}

/// Provisioned account
#[derive(Debug, Clone)]
pub struct Account {
    pub username: String,
    /// Root directory capability granted to this account
    pub root: DirCap,
    pub credentials: Credentials,
}

/// Username -> account table, immutable once loaded
#[derive(Debug, Clone, Default)]
pub struct AccountTable {
    accounts: HashMap<String, Arc<Account>>,
}

impl AccountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the accounts file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AccountError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| AccountError::Io {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse accounts file content
    pub fn parse(content: &str) -> Result<Self, AccountError> {
        let mut table = Self::new();
        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line_no = index + 1;
            let parse_err = |reason: &str| AccountError::Parse {
                line: line_no,
                reason: reason.to_string(),
            };

            let fields: Vec<&str> = line.split_whitespace().collect();
            let (username, credentials, root) = match fields.as_slice() {
                [username, ED25519_KEY_TYPE, key, root] => {
                    let key = PublicKey::from_base64(key).map_err(|e| parse_err(&e.to_string()))?;
                    let mut credentials = Credentials::default();
                    credentials.public_keys.insert(key);
                    (*username, credentials, *root)
                }
                [username, password, root] => (
                    *username,
                    Credentials {
                        password: Some(PasswordDigest::from_plaintext(password)),
                        public_keys: BTreeSet::new(),
                    },
                    *root,
                ),
                _ => return Err(parse_err("expected `<username> <password|ssh-ed25519 KEY> <root capability>`")),
            };

            let root: DirCap = root
                .parse()
                .map_err(|e: CapabilityParseError| parse_err(&e.to_string()))?;
            table.grant(username, root, credentials)?;
        }
        Ok(table)
    }

    fn grant(&mut self, username: &str, root: DirCap, credentials: Credentials) -> Result<(), AccountError> {
        match self.accounts.get_mut(username) {
            Some(existing) => {
                if existing.root != root {
                    return Err(AccountError::ConflictingRoot {
                        username: username.to_string(),
                    });
                }
                let account = Arc::make_mut(existing);
                if credentials.password.is_some() {
                    account.credentials.password = credentials.password;
                }
                account.credentials.public_keys.extend(credentials.public_keys);
            }
            None => {
                self.accounts.insert(
                    username.to_string(),
                    Arc::new(Account {
                        username: username.to_string(),
                        root,
                        credentials,
                    }),
                );
            }
        }
        Ok(())
    }

    pub fn get(&self, username: &str) -> Option<Arc<Account>> {
        self.accounts.get(username).cloned()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Accounts file line granting a password
pub fn password_line(username: &str, password: &str, root: &DirCap) -> String {
    format!("{} {} {}\n", username, password, root)
}

/// Accounts file line granting a public key
pub fn public_key_line(username: &str, key: &PublicKey, root: &DirCap) -> String {
    format!("{} {} {}\n", username, key, root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(root_a: &DirCap, root_b: &DirCap, key: &PublicKey) -> String {
        format!(
            "# provisioned accounts\n\n{}{}",
            password_line("alice", "password", root_a),
            public_key_line("alice2", key, root_b),
        )
    }

    #[test]
    fn test_parse_accounts() {
        let root_a = DirCap::generate();
        let root_b = DirCap::generate();
        let key = PublicKey([9u8; 32]);
        let table = AccountTable::parse(&sample(&root_a, &root_b, &key)).unwrap();

        assert_eq!(table.len(), 2);
        let alice = table.get("alice").unwrap();
        assert_eq!(alice.root, root_a);
        assert!(alice.credentials.password.as_ref().unwrap().matches("password"));
        assert!(!alice.credentials.password.as_ref().unwrap().matches("wrong"));

        let alice2 = table.get("alice2").unwrap();
        assert!(alice2.credentials.password.is_none());
        assert!(alice2.credentials.public_keys.contains(&key));
        assert!(table.get("someuser").is_none());
    }

    #[test]
    fn test_lines_merge_for_same_user() {
        let root = DirCap::generate();
        let key = PublicKey([1u8; 32]);
        let content = format!(
            "{}{}",
            password_line("bob", "secret", &root),
            public_key_line("bob", &key, &root)
        );
        let table = AccountTable::parse(&content).unwrap();
        let bob = table.get("bob").unwrap();
        assert!(bob.credentials.password.is_some());
        assert_eq!(bob.credentials.public_keys.len(), 1);
    }

    #[test]
    fn test_conflicting_roots_rejected() {
        let content = format!(
            "{}{}",
            password_line("bob", "secret", &DirCap::generate()),
            password_line("bob", "secret", &DirCap::generate())
        );
        assert!(matches!(
            AccountTable::parse(&content),
            Err(AccountError::ConflictingRoot { .. })
        ));
    }

    #[test]
    fn test_malformed_lines() {
        assert!(matches!(
            AccountTable::parse("alice password"),
            Err(AccountError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            AccountTable::parse("\nalice password URI:LIT:xyz"),
            Err(AccountError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_public_key_text_form() {
        let key = PublicKey([3u8; 32]);
        let parsed: PublicKey = format!("{} alice@laptop", key).parse().unwrap();
        assert_eq!(parsed, key);
        assert!("ssh-rsa AAAA".parse::<PublicKey>().is_err());
    }
}
