// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Furls - self-describing capability connection strings
//!
//! A furl tells a remote party where this node listens and proves that it
//! is allowed to talk to one particular service:
//!
//! ```text
//! pb://<tub id>@<host:port>[,<host:port>...]/<swiss number>
//! ```
//!
//! The tub id is derived from the node's persisted signing key. The swiss
//! number is an unguessable random token, generated once per service and
//! then reloaded from disk on every start.

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const FURL_SCHEME: &str = "pb://";

/// Furl and node identity errors
#[derive(Debug, Error)]
pub enum FurlError {
    #[error("Malformed furl: {0}")]
    Malformed(String),

    #[error("Failed to persist {path}: {error}")]
    Persist { path: String, error: String },

    #[error("Failed to read {path}: {error}")]
    Read { path: String, error: String },

    #[error("Invalid node key in {path}: {reason}")]
    InvalidKey { path: String, reason: String },
}

/// Services a node advertises through furls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Introducer,
    Storage,
}

impl Service {
    pub fn name(&self) -> &'static str {
        match self {
            Service::Introducer => "introducer",
            Service::Storage => "storage",
        }
    }

    /// Well-known furl file name under the node's private directory
    pub fn furl_file_name(&self) -> String {
        format!("{}.furl", self.name())
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Node identifier embedded in every furl
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TubId(String);

impl TubId {
    pub fn from_hex(s: &str) -> Result<Self, FurlError> {
        if s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            Ok(Self(s.to_string()))
        } else {
            Err(FurlError::Malformed(format!("bad tub id {}", s)))
        }
    }

    /// Tub id for a verifying key: first 16 bytes of its SHA-256
    pub fn for_key(verifying_key: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(verifying_key);
        Self(hex::encode(&digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unguessable per-service token
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SwissNumber(String);

impl SwissNumber {
    /// 32 bytes from the OS RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, FurlError> {
        if s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            Ok(Self(s.to_string()))
        } else {
            Err(FurlError::Malformed("bad swiss number".to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SwissNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SwissNumber(..)")
    }
}

/// Capability-bearing connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Furl {
    pub tub_id: TubId,
    /// Transport hints, `host:port`
    pub location_hints: Vec<String>,
    pub swiss: SwissNumber,
}

impl Furl {
    pub fn new(tub_id: TubId, location_hints: Vec<String>, swiss: SwissNumber) -> Self {
        Self {
            tub_id,
            location_hints,
            swiss,
        }
    }
}

impl fmt::Display for Furl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}@{}/{}",
            FURL_SCHEME,
            self.tub_id,
            self.location_hints.join(","),
            self.swiss.as_str()
        )
    }
}

impl FromStr for Furl {
    type Err = FurlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || FurlError::Malformed(s.chars().take(48).collect());
        let body = s.trim().strip_prefix(FURL_SCHEME).ok_or_else(malformed)?;
        let (tub_id, rest) = body.split_once('@').ok_or_else(malformed)?;
        let (hints, swiss) = rest.rsplit_once('/').ok_or_else(malformed)?;

        let location_hints: Vec<String> = hints
            .split(',')
            .filter(|hint| !hint.is_empty())
            .map(str::to_string)
            .collect();
        if location_hints.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            tub_id: TubId::from_hex(tub_id)?,
            location_hints,
            swiss: SwissNumber::from_hex(swiss)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_furl_text_form() {
        let furl = Furl::new(
            TubId::for_key(b"node key"),
            vec!["127.0.0.1:41234".to_string()],
            SwissNumber::generate(),
        );
        let text = furl.to_string();
        assert!(text.starts_with("pb://"));
        assert!(text.contains("@127.0.0.1:41234/"));
        assert_eq!(text.parse::<Furl>().unwrap(), furl);
    }

    #[test]
    fn test_multiple_hints() {
        let text = format!(
            "pb://{}@a.example:1,b.example:2/{}",
            TubId::for_key(b"k"),
            SwissNumber::generate().as_str()
        );
        let furl: Furl = text.parse().unwrap();
        assert_eq!(furl.location_hints, vec!["a.example:1", "b.example:2"]);
        assert_eq!(furl.to_string(), text);
    }

    #[test]
    fn test_swiss_numbers_are_unique() {
        assert_ne!(SwissNumber::generate(), SwissNumber::generate());
    }

    #[test]
    fn test_reject_malformed() {
        assert!("http://example.com".parse::<Furl>().is_err());
        assert!("pb://abc@host:1/def".parse::<Furl>().is_err());
        let no_hints = format!("pb://{}@/{}", TubId::for_key(b"k"), SwissNumber::generate().as_str());
        assert!(no_hints.parse::<Furl>().is_err());
    }

    #[test]
    fn test_furl_file_names() {
        assert_eq!(Service::Introducer.furl_file_name(), "introducer.furl");
        assert_eq!(Service::Storage.furl_file_name(), "storage.furl");
    }
}
