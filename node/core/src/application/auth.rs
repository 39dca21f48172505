// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Authentication Gateway
//!
//! Checks a password or a public-key signature against the account table.
//! Every failure, whether unknown user, bad password, unregistered key or
//! bad signature, comes back as the same `FsError::AuthenticationFailed`.
//!
//! Public-key clients sign `"capgrid-auth-v1\0" || challenge || username`
//! with Ed25519, where the challenge is the 32 random bytes sent in the
//! connection greeting.

use crate::domain::account::{Account, AccountTable, PasswordDigest, PublicKey};
use crate::domain::vfs::FsError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, VerifyingKey};
use rand_core::{OsRng, RngCore};
use std::sync::Arc;
use tracing::debug;

const AUTH_CONTEXT: &[u8] = b"capgrid-auth-v1\0";

/// Per-connection random challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthChallenge([u8; 32]);

impl AuthChallenge {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_base64(encoded: &str) -> Option<Self> {
        let bytes = STANDARD.decode(encoded).ok()?;
        Some(Self(bytes.try_into().ok()?))
    }

    /// Message a client signs to prove possession of its key
    pub fn signing_message(&self, username: &str) -> Vec<u8> {
        let mut message = Vec::with_capacity(AUTH_CONTEXT.len() + 32 + username.len());
        message.extend_from_slice(AUTH_CONTEXT);
        message.extend_from_slice(&self.0);
        message.extend_from_slice(username.as_bytes());
        message
    }
}

/// Credentials presented by a client
pub enum Credential {
    Password {
        username: String,
        password: String,
    },
    PublicKey {
        username: String,
        public_key: PublicKey,
        signature: Vec<u8>,
    },
}

impl Credential {
    pub fn username(&self) -> &str {
        match self {
            Credential::Password { username, .. } | Credential::PublicKey { username, .. } => username,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Credential::Password { .. } => "password",
            Credential::PublicKey { .. } => "public_key",
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("method", &self.method())
            .field("username", &self.username())
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct AuthenticationGateway {
    accounts: Arc<AccountTable>,
}

impl AuthenticationGateway {
    pub fn new(accounts: Arc<AccountTable>) -> Self {
        Self { accounts }
    }

    pub fn accounts(&self) -> &Arc<AccountTable> {
        &self.accounts
    }

    /// Authenticate `credential` against the challenge issued to this connection
    pub fn authenticate(&self, credential: &Credential, challenge: &AuthChallenge) -> Result<Arc<Account>, FsError> {
        let account = self.accounts.get(credential.username());

        let accepted = match (credential, &account) {
            (Credential::Password { password, .. }, Some(account)) => account
                .credentials
                .password
                .as_ref()
                .map(|digest| digest.matches(password))
                .unwrap_or(false),
            (Credential::Password { password, .. }, None) => {
                // Same hashing work as a known user
                let _ = PasswordDigest::from_plaintext("").matches(password);
                false
            }
            (
                Credential::PublicKey {
                    username,
                    public_key,
                    signature,
                },
                Some(account),
            ) => {
                account.credentials.public_keys.contains(public_key)
                    && verify_signature(public_key, signature, &challenge.signing_message(username))
            }
            (Credential::PublicKey { .. }, None) => false,
        };

        match account {
            Some(account) if accepted => {
                debug!(username = %account.username, method = credential.method(), "Credential accepted");
                Ok(account)
            }
            _ => Err(FsError::AuthenticationFailed),
        }
    }
}

fn verify_signature(public_key: &PublicKey, signature: &[u8], message: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(public_key.as_bytes()) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify_strict(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{password_line, public_key_line};
    use crate::domain::capability::DirCap;
    use ed25519_dalek::{Signer, SigningKey};

    struct Fixture {
        gateway: AuthenticationGateway,
        root: DirCap,
        key: SigningKey,
    }

    fn fixture() -> Fixture {
        let root = DirCap::generate();
        let key = SigningKey::generate(&mut OsRng);
        let content = format!(
            "{}{}",
            password_line("alice", "password", &root),
            public_key_line("alice2", &PublicKey(key.verifying_key().to_bytes()), &root),
        );
        Fixture {
            gateway: AuthenticationGateway::new(Arc::new(AccountTable::parse(&content).unwrap())),
            root,
            key,
        }
    }

    fn password(username: &str, password: &str) -> Credential {
        Credential::Password {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    fn signed(username: &str, key: &SigningKey, challenge: &AuthChallenge) -> Credential {
        Credential::PublicKey {
            username: username.to_string(),
            public_key: PublicKey(key.verifying_key().to_bytes()),
            signature: key.sign(&challenge.signing_message(username)).to_bytes().to_vec(),
        }
    }

    #[test]
    fn test_password_login_binds_root() {
        let f = fixture();
        let challenge = AuthChallenge::generate();
        let account = f.gateway.authenticate(&password("alice", "password"), &challenge).unwrap();
        assert_eq!(account.root, f.root);
    }

    #[test]
    fn test_failures_are_uniform() {
        let f = fixture();
        let challenge = AuthChallenge::generate();
        let stranger = SigningKey::generate(&mut OsRng);

        let failures = [
            f.gateway.authenticate(&password("someuser", "password"), &challenge),
            f.gateway.authenticate(&password("alice", "wrongpassword"), &challenge),
            f.gateway.authenticate(&signed("alice2", &stranger, &challenge), &challenge),
            f.gateway.authenticate(&password("alice2", ""), &challenge),
        ];
        for failure in failures {
            let err = failure.unwrap_err();
            assert!(matches!(err, FsError::AuthenticationFailed));
            assert_eq!(err.to_string(), "Authentication failed");
        }
    }

    #[test]
    fn test_public_key_login() {
        let f = fixture();
        let challenge = AuthChallenge::generate();
        let account = f
            .gateway
            .authenticate(&signed("alice2", &f.key, &challenge), &challenge)
            .unwrap();
        assert_eq!(account.root, f.root);
    }

    #[test]
    fn test_signature_bound_to_challenge() {
        let f = fixture();
        let issued = AuthChallenge::generate();
        let replayed = signed("alice2", &f.key, &AuthChallenge::generate());
        assert!(f.gateway.authenticate(&replayed, &issued).is_err());
    }

    #[test]
    fn test_challenge_base64() {
        let challenge = AuthChallenge::from_bytes([5u8; 32]);
        assert_eq!(AuthChallenge::from_base64(&challenge.to_base64()), Some(challenge));
        assert!(AuthChallenge::from_base64("AAAA").is_none());
    }
}
