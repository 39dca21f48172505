// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures for gateway integration tests

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine as _};
use capgrid_core::application::auth::AuthChallenge;
use capgrid_core::application::session::GatewayContext;
use capgrid_core::domain::account::{password_line, public_key_line, AccountTable, PublicKey};
use capgrid_core::domain::capability::DirCap;
use capgrid_core::domain::directory::DirectoryEntries;
use capgrid_core::domain::storage::CapabilityStore;
use capgrid_core::domain::vfs::HandleId;
use capgrid_core::infrastructure::event_bus::EventBus;
use capgrid_core::infrastructure::gateway::{GatewayServer, Reply, Request, Response, WireOpenMode};
use capgrid_core::infrastructure::storage::InMemoryCapabilityStore;
use ed25519_dalek::{Signer, SigningKey};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

pub const PASSWORD: &str = "password";

/// A running gateway with two accounts: `alice` (password) and
/// `alice2` (public key `key`), each with its own empty root
pub struct Harness {
    pub server: GatewayServer,
    pub addr: SocketAddr,
    pub store: Arc<dyn CapabilityStore>,
    pub events: EventBus,
    pub alice_root: DirCap,
    pub alice2_root: DirCap,
    pub key: SigningKey,
}

impl Harness {
    pub async fn start() -> Self {
        let store: Arc<dyn CapabilityStore> = Arc::new(InMemoryCapabilityStore::new());
        let alice_root = store.put_mutable(DirectoryEntries::new()).await.unwrap().cap;
        let alice2_root = store.put_mutable(DirectoryEntries::new()).await.unwrap().cap;

        let mut seed = [0u8; 32];
        seed[0] = 42;
        let key = SigningKey::from_bytes(&seed);

        let accounts = format!(
            "# test accounts\n{}{}",
            password_line("alice", PASSWORD, &alice_root),
            public_key_line("alice2", &PublicKey(key.verifying_key().to_bytes()), &alice2_root),
        );
        let accounts = Arc::new(AccountTable::parse(&accounts).unwrap());

        let events = EventBus::new(256);
        let context = Arc::new(GatewayContext::new(
            store.clone(),
            accounts,
            Arc::new(events.clone()),
            5,
        ));
        let server = GatewayServer::new(context, "127.0.0.1:0", 3);
        let addr = server.start().await.unwrap();

        Self {
            server,
            addr,
            store,
            events,
            alice_root,
            alice2_root,
            key,
        }
    }

    pub async fn connect(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }

    /// Connected and logged in as `alice`
    pub async fn alice(&self) -> TestClient {
        let mut client = self.connect().await;
        client.login("alice", PASSWORD).await.expect_ok();
        client
    }
}

pub struct TestClient {
    framed: Framed<TcpStream, LinesCodec>,
    pub challenge: AuthChallenge,
    pub furl: Option<String>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut framed = Framed::new(stream, LinesCodec::new());
        let hello = framed.next().await.unwrap().unwrap();
        match serde_json::from_str::<Response>(&hello).unwrap() {
            Response::Hello { challenge, furl } => Self {
                framed,
                challenge: AuthChallenge::from_base64(&challenge).unwrap(),
                furl,
            },
            other => panic!("expected hello, got {:?}", other),
        }
    }

    /// Send a raw line and read one response; `None` once the server hung up
    pub async fn send_raw(&mut self, line: &str) -> Option<Response> {
        self.framed.send(line.to_string()).await.ok()?;
        let reply = self.framed.next().await?.ok()?;
        Some(serde_json::from_str(&reply).unwrap())
    }

    pub async fn request(&mut self, request: Request) -> Response {
        let line = serde_json::to_string(&request).unwrap();
        self.send_raw(&line).await.expect("connection closed")
    }

    /// True once the server has closed the connection
    pub async fn is_closed(&mut self) -> bool {
        matches!(self.framed.next().await, None | Some(Err(_)))
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Response {
        self.request(Request::AuthPassword {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await
    }

    pub async fn login_with_key(&mut self, username: &str, key: &SigningKey) -> Response {
        let signature = key.sign(&self.challenge.signing_message(username));
        self.request(Request::AuthPublicKey {
            username: username.to_string(),
            public_key: PublicKey(key.verifying_key().to_bytes()).to_string(),
            signature: STANDARD.encode(signature.to_bytes()),
        })
        .await
    }

    pub async fn open(&mut self, path: &str, mode: WireOpenMode) -> Response {
        self.request(Request::Open {
            path: path.to_string(),
            mode,
            truncate: mode == WireOpenMode::Write,
        })
        .await
    }

    pub async fn open_handle(&mut self, path: &str, mode: WireOpenMode) -> HandleId {
        self.open(path, mode).await.expect_ok().handle.unwrap()
    }

    pub async fn write(&mut self, handle: HandleId, data: &[u8]) -> Response {
        self.request(Request::Write {
            handle,
            offset: None,
            data: STANDARD.encode(data),
        })
        .await
    }

    pub async fn read(&mut self, handle: HandleId, length: usize) -> Vec<u8> {
        let reply = self
            .request(Request::Read {
                handle,
                offset: None,
                length,
            })
            .await
            .expect_ok();
        STANDARD.decode(reply.data.unwrap()).unwrap()
    }

    pub async fn close(&mut self, handle: HandleId) -> Response {
        self.request(Request::Close { handle }).await
    }

    pub async fn put_file(&mut self, path: &str, data: &[u8]) {
        let handle = self.open_handle(path, WireOpenMode::Write).await;
        self.write(handle, data).await.expect_ok();
        self.close(handle).await.expect_ok();
    }

    pub async fn get_file(&mut self, path: &str) -> Vec<u8> {
        let handle = self.open_handle(path, WireOpenMode::Read).await;
        let data = self.read(handle, 1 << 20).await;
        self.close(handle).await.expect_ok();
        data
    }

    pub async fn mkdir(&mut self, path: &str) -> Response {
        self.request(Request::Mkdir { path: path.to_string() }).await
    }

    pub async fn listdir(&mut self, path: Option<&str>) -> Vec<String> {
        self.request(Request::Listdir {
            path: path.map(str::to_string),
        })
        .await
        .expect_ok()
        .names
        .unwrap()
    }

    pub async fn chdir(&mut self, path: Option<&str>) -> Response {
        self.request(Request::Chdir {
            path: path.map(str::to_string),
        })
        .await
    }
}

pub trait ResponseExt {
    fn expect_ok(self) -> Reply;
    fn expect_error(self, code: &str) -> String;
}

impl ResponseExt for Response {
    fn expect_ok(self) -> Reply {
        match self {
            Response::Ok(reply) => reply,
            other => panic!("expected ok, got {:?}", other),
        }
    }

    fn expect_error(self, code: &str) -> String {
        match self {
            Response::Error { code: actual, message } => {
                assert_eq!(actual, code, "unexpected error: {}", message);
                message
            }
            other => panic!("expected {} error, got {:?}", code, other),
        }
    }
}
