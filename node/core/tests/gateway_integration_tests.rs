// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the file-transfer gateway over real TCP
//!
//! These tests verify:
//! 1. Buffered writes and sequential reads through handles
//! 2. Directory listing, creation, scoping and rename
//! 3. Uniform authentication failures and root binding
//! 4. Error codes for invalid namespace operations
//! 5. Connection handling (bad frames, auth attempt limit, disconnect)

mod common;

use capgrid_core::domain::events::GatewayEvent;
use capgrid_core::infrastructure::gateway::{Request, Response, WireOpenMode};
use common::{Harness, ResponseExt, PASSWORD};
use ed25519_dalek::SigningKey;

#[tokio::test]
async fn test_write_then_sequential_reads() {
    let harness = Harness::start().await;
    let mut client = harness.alice().await;

    let handle = client.open_handle("myfile", WireOpenMode::Write).await;
    assert_eq!(client.write(handle, b"abc").await.expect_ok().written, Some(3));
    assert_eq!(client.write(handle, b"def").await.expect_ok().written, Some(3));
    client.close(handle).await.expect_ok();

    let handle = client.open_handle("myfile", WireOpenMode::Read).await;
    assert_eq!(client.read(handle, 4).await, b"abcd");
    assert_eq!(client.read(handle, 2).await, b"ef");
    assert_eq!(client.read(handle, 1).await, b"");
    client.close(handle).await.expect_ok();
}

#[tokio::test]
async fn test_fresh_account_root_is_empty() {
    let harness = Harness::start().await;
    let mut client = harness.alice().await;
    assert!(client.listdir(None).await.is_empty());
}

#[tokio::test]
async fn test_mkdir_and_file_listing() {
    let harness = Harness::start().await;
    let mut client = harness.alice().await;

    client.mkdir("childdir").await.expect_ok();
    assert_eq!(client.listdir(None).await, vec!["childdir"]);

    client.put_file("myfile", b"contents").await;
    assert_eq!(client.listdir(None).await, vec!["childdir", "myfile"]);

    let stat = client
        .request(Request::Stat {
            path: "myfile".to_string(),
        })
        .await
        .expect_ok()
        .stat
        .unwrap();
    assert!(!stat.is_directory());
    assert_eq!(stat.size, 8);
}

#[tokio::test]
async fn test_chdir_scopes_operations() {
    let harness = Harness::start().await;
    let mut client = harness.alice().await;

    client.mkdir("childdir").await.expect_ok();
    assert_eq!(client.chdir(Some("childdir")).await.expect_ok().cwd.as_deref(), Some("/childdir"));
    client.put_file("myfile2", b"scoped").await;
    assert_eq!(client.listdir(None).await, vec!["myfile2"]);

    assert_eq!(client.chdir(None).await.expect_ok().cwd.as_deref(), Some("/"));
    assert_eq!(client.listdir(None).await, vec!["childdir"]);
    assert_eq!(client.get_file("childdir/myfile2").await, b"scoped");
}

#[tokio::test]
async fn test_rename_file_then_directory() {
    let harness = Harness::start().await;
    let mut client = harness.alice().await;

    client.mkdir("dir").await.expect_ok();
    client.put_file("dir/file", b"original").await;

    client
        .request(Request::Rename {
            from: "dir/file".to_string(),
            to: "dir/file2".to_string(),
        })
        .await
        .expect_ok();
    client
        .request(Request::Rename {
            from: "dir".to_string(),
            to: "dir2".to_string(),
        })
        .await
        .expect_ok();

    assert_eq!(client.listdir(None).await, vec!["dir2"]);
    assert_eq!(client.listdir(Some("dir2")).await, vec!["file2"]);
    assert_eq!(client.get_file("dir2/file2").await, b"original");
}

#[tokio::test]
async fn test_authentication_failures_are_uniform() {
    let harness = Harness::start().await;
    let stranger = SigningKey::from_bytes(&[9u8; 32]);

    let mut messages = Vec::new();
    for attempt in 0..3 {
        let mut client = harness.connect().await;
        let response = match attempt {
            0 => client.login("someuser", PASSWORD).await,
            1 => client.login("alice", "wrongpassword").await,
            _ => client.login_with_key("alice2", &stranger).await,
        };
        messages.push(response.expect_error("authentication_failed"));
    }
    assert!(messages.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn test_valid_credentials_bind_account_root() {
    let harness = Harness::start().await;

    let mut alice = harness.connect().await;
    let reply = alice.login("alice", PASSWORD).await.expect_ok();
    assert_eq!(reply.username.as_deref(), Some("alice"));
    alice.put_file("alice-only", b"a").await;

    let mut alice2 = harness.connect().await;
    let reply = alice2.login_with_key("alice2", &harness.key).await.expect_ok();
    assert_eq!(reply.username.as_deref(), Some("alice2"));
    assert!(alice2.listdir(None).await.is_empty());

    let root = harness.store.get_mutable(&harness.alice_root).await.unwrap();
    assert_eq!(root.names(), vec!["alice-only"]);
}

#[tokio::test]
async fn test_namespace_error_codes() {
    let harness = Harness::start().await;
    let mut client = harness.alice().await;

    client.mkdir("dir").await.expect_ok();
    client.put_file("dir/file", b"x").await;

    client
        .request(Request::Rmdir { path: "dir".to_string() })
        .await
        .expect_error("not_empty");
    client
        .request(Request::Remove { path: "dir".to_string() })
        .await
        .expect_error("is_a_directory");
    client.mkdir("dir").await.expect_error("already_exists");
    client
        .request(Request::Rmdir { path: "nope".to_string() })
        .await
        .expect_error("not_found");
    client
        .request(Request::Listdir {
            path: Some("../..".to_string()),
        })
        .await
        .expect_error("permission_denied");

    client
        .request(Request::Remove {
            path: "dir/file".to_string(),
        })
        .await
        .expect_ok();
    client
        .request(Request::Rmdir { path: "dir".to_string() })
        .await
        .expect_ok();
    assert!(client.listdir(None).await.is_empty());
}

#[tokio::test]
async fn test_operations_before_login_are_rejected() {
    let harness = Harness::start().await;
    let mut client = harness.connect().await;

    client
        .request(Request::Listdir { path: None })
        .await
        .expect_error("not_authenticated");
}

#[tokio::test]
async fn test_bad_frames_keep_connection_open() {
    let harness = Harness::start().await;
    let mut client = harness.alice().await;

    let response = client.send_raw("this is not json").await.unwrap();
    assert_eq!(response.error_code(), Some("bad_request"));
    let response = client.send_raw(r#"{"op":"format_disk"}"#).await.unwrap();
    assert_eq!(response.error_code(), Some("bad_request"));

    assert!(client.listdir(None).await.is_empty());
}

#[tokio::test]
async fn test_disconnect_after_max_auth_attempts() {
    let harness = Harness::start().await;
    let mut client = harness.connect().await;

    for _ in 0..3 {
        client
            .login("alice", "wrongpassword")
            .await
            .expect_error("authentication_failed");
    }
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn test_disconnect_discards_uncommitted_writes() {
    let harness = Harness::start().await;
    let mut events = harness.events.subscribe();

    {
        let mut client = harness.alice().await;
        let handle = client.open_handle("partial", WireOpenMode::Write).await;
        client.write(handle, b"never committed").await.expect_ok();
    }

    loop {
        match events.recv().await.unwrap() {
            GatewayEvent::SessionClosed { discarded_writes, .. } => {
                assert_eq!(discarded_writes, 1);
                break;
            }
            _ => continue,
        }
    }

    let mut client = harness.alice().await;
    assert!(client.listdir(None).await.is_empty());
}

#[tokio::test]
async fn test_bye_ends_session() {
    let harness = Harness::start().await;
    let mut client = harness.alice().await;

    assert_eq!(client.request(Request::Bye).await, Response::ok());
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn test_server_stop() {
    let harness = Harness::start().await;
    assert!(harness.server.is_running());
    assert_eq!(harness.server.local_addr(), Some(harness.addr));

    harness.server.stop().await.unwrap();
    assert!(!harness.server.is_running());
}
