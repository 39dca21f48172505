// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Node Identity & Furl Persistence
//!
//! A node has one Ed25519 key, generated on first start and kept in
//! `private/node.privkey`. Its tub id derives from the verifying key. Each
//! advertised service gets a furl whose swiss number is generated once and
//! persisted to `private/<service>.furl` before anything is advertised;
//! later starts reload the file verbatim.
//!
//! Location hints embed the tub port, so a node configured with port 0
//! records the port it bound on first start in `private/tub.port` and
//! binds that port again afterwards.

use crate::domain::furl::{Furl, FurlError, Service, SwissNumber, TubId};
use crate::infrastructure::furl_file;
use ed25519_dalek::SigningKey;
use rand_core::OsRng;
use std::path::{Path, PathBuf};
use tracing::info;

pub const NODE_KEY_FILE: &str = "node.privkey";
pub const TUB_PORT_FILE: &str = "tub.port";

/// Signing key and derived tub id
pub struct NodeIdentity {
    signing_key: SigningKey,
    tub_id: TubId,
}

impl NodeIdentity {
    pub fn tub_id(&self) -> &TubId {
        &self.tub_id
    }

    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let tub_id = TubId::for_key(signing_key.verifying_key().as_bytes());
        Self { signing_key, tub_id }
    }
}

impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("tub_id", &self.tub_id)
            .finish_non_exhaustive()
    }
}

pub struct NodeIdentityService {
    private_dir: PathBuf,
}

impl NodeIdentityService {
    pub fn new(private_dir: impl Into<PathBuf>) -> Self {
        Self {
            private_dir: private_dir.into(),
        }
    }

    pub fn private_dir(&self) -> &Path {
        &self.private_dir
    }

    /// Load `node.privkey`, generating and persisting it on first start
    pub fn load_or_create_identity(&self) -> Result<NodeIdentity, FurlError> {
        furl_file::ensure_private_dir(&self.private_dir)?;
        let path = self.private_dir.join(NODE_KEY_FILE);

        if let Some(content) = furl_file::read_optional(&path)? {
            let invalid = |reason: String| FurlError::InvalidKey {
                path: path.display().to_string(),
                reason,
            };
            let bytes = hex::decode(content.trim()).map_err(|e| invalid(e.to_string()))?;
            let secret: [u8; 32] = bytes
                .try_into()
                .map_err(|_| invalid("expected 32 bytes".to_string()))?;
            let identity = NodeIdentity::from_signing_key(SigningKey::from_bytes(&secret));
            info!(tub_id = %identity.tub_id, "Loaded node identity");
            return Ok(identity);
        }

        let signing_key = SigningKey::generate(&mut OsRng);
        let content = format!("{}\n", hex::encode(signing_key.to_bytes()));
        furl_file::write_durably(&path, content.as_bytes())?;

        let identity = NodeIdentity::from_signing_key(signing_key);
        info!(tub_id = %identity.tub_id, "Generated node identity");
        Ok(identity)
    }

    /// Furl for `service`, reusing the persisted one when present
    ///
    /// A persisted furl wins over `identity` and `location_hints`: once
    /// written, the file is the source of truth for the data directory.
    pub fn load_or_create_furl(
        &self,
        identity: &NodeIdentity,
        service: Service,
        location_hints: &[String],
    ) -> Result<Furl, FurlError> {
        let path = self.furl_path(service);

        if let Some(content) = furl_file::read_optional(&path)? {
            let furl: Furl = content.trim().parse()?;
            info!(service = %service, "Reusing persisted furl");
            return Ok(furl);
        }

        let furl = Furl::new(
            identity.tub_id.clone(),
            location_hints.to_vec(),
            SwissNumber::generate(),
        );
        furl_file::write_durably(&path, format!("{}\n", furl).as_bytes())?;
        info!(service = %service, path = %path.display(), "Persisted new furl");
        Ok(furl)
    }

    /// Port recorded by an earlier start, if any
    pub fn recorded_tub_port(&self) -> Result<Option<u16>, FurlError> {
        let path = self.private_dir.join(TUB_PORT_FILE);
        let Some(content) = furl_file::read_optional(&path)? else {
            return Ok(None);
        };
        match content.trim().parse::<u16>() {
            Ok(port) if port != 0 => Ok(Some(port)),
            _ => Err(FurlError::Read {
                path: path.display().to_string(),
                error: format!("invalid port '{}'", content.trim()),
            }),
        }
    }

    /// Persist the bound tub port before any furl names it
    pub fn record_tub_port(&self, port: u16) -> Result<(), FurlError> {
        furl_file::ensure_private_dir(&self.private_dir)?;
        let path = self.private_dir.join(TUB_PORT_FILE);
        furl_file::write_durably(&path, format!("{}\n", port).as_bytes())?;
        info!(port, "Recorded tub port");
        Ok(())
    }

    pub fn furl_path(&self, service: Service) -> PathBuf {
        self.private_dir.join(service.furl_file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints() -> Vec<String> {
        vec!["127.0.0.1:40100".to_string()]
    }

    #[test]
    fn test_identity_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let service = NodeIdentityService::new(dir.path().join("private"));

        let first = service.load_or_create_identity().unwrap();
        let second = service.load_or_create_identity().unwrap();
        assert_eq!(first.tub_id(), second.tub_id());
        assert_eq!(first.verifying_key_bytes(), second.verifying_key_bytes());
    }

    #[test]
    fn test_furl_reloaded_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let service = NodeIdentityService::new(dir.path().join("private"));
        let identity = service.load_or_create_identity().unwrap();

        let first = service
            .load_or_create_furl(&identity, Service::Storage, &hints())
            .unwrap();
        let on_disk = std::fs::read_to_string(service.furl_path(Service::Storage)).unwrap();
        assert_eq!(on_disk.trim(), first.to_string());

        let other_hints = vec!["10.0.0.1:1".to_string()];
        let second = service
            .load_or_create_furl(&identity, Service::Storage, &other_hints)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_services_get_distinct_swiss_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let service = NodeIdentityService::new(dir.path().join("private"));
        let identity = service.load_or_create_identity().unwrap();

        let storage = service
            .load_or_create_furl(&identity, Service::Storage, &hints())
            .unwrap();
        let introducer = service
            .load_or_create_furl(&identity, Service::Introducer, &hints())
            .unwrap();
        assert_eq!(storage.tub_id, introducer.tub_id);
        assert_ne!(storage.swiss, introducer.swiss);
    }

    #[test]
    fn test_tub_port_recorded_once() {
        let dir = tempfile::tempdir().unwrap();
        let service = NodeIdentityService::new(dir.path().join("private"));
        assert_eq!(service.recorded_tub_port().unwrap(), None);

        service.record_tub_port(40100).unwrap();
        assert_eq!(service.recorded_tub_port().unwrap(), Some(40100));

        std::fs::write(dir.path().join("private").join(TUB_PORT_FILE), "0\n").unwrap();
        assert!(service.recorded_tub_port().is_err());
    }

    #[test]
    fn test_corrupt_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("private");
        std::fs::create_dir_all(&private).unwrap();
        std::fs::write(private.join(NODE_KEY_FILE), "zz\n").unwrap();

        let err = NodeIdentityService::new(&private)
            .load_or_create_identity()
            .unwrap_err();
        assert!(matches!(err, FurlError::InvalidKey { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_unusable_furl_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = NodeIdentityService::new(dir.path().join("private"));
        let identity = service.load_or_create_identity().unwrap();

        // A directory where the furl file belongs
        std::fs::create_dir(service.furl_path(Service::Introducer)).unwrap();
        std::fs::write(service.furl_path(Service::Introducer).join("x"), "x").unwrap();
        let result = service.load_or_create_furl(&identity, Service::Introducer, &hints());
        assert!(result.is_err());
    }
}
