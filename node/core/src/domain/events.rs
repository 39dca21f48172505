// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Gateway audit events
//!
//! Published by the session orchestrator after an operation has taken
//! effect. Failed operations are not published, except authentication
//! rejections.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GatewayEvent {
    SessionAuthenticated {
        session_id: Uuid,
        username: String,
        method: String, // "password", "public_key"
        authenticated_at: DateTime<Utc>,
    },
    AuthenticationRejected {
        session_id: Uuid,
        claimed_username: String,
        rejected_at: DateTime<Utc>,
    },
    FileCommitted {
        session_id: Uuid,
        username: String,
        path: String,
        size: u64,
        committed_at: DateTime<Utc>,
    },
    DirectoryCreated {
        session_id: Uuid,
        username: String,
        path: String,
        created_at: DateTime<Utc>,
    },
    EntryRemoved {
        session_id: Uuid,
        username: String,
        path: String,
        removed_at: DateTime<Utc>,
    },
    EntryRenamed {
        session_id: Uuid,
        username: String,
        from: String,
        to: String,
        renamed_at: DateTime<Utc>,
    },
    SessionClosed {
        session_id: Uuid,
        username: Option<String>,
        discarded_writes: usize,
        closed_at: DateTime<Utc>,
    },
}

/// Event publisher trait (abstraction for event bus)
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_gateway_event(&self, event: GatewayEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_event_serialization() {
        let event = GatewayEvent::EntryRenamed {
            session_id: Uuid::new_v4(),
            username: "alice".to_string(),
            from: "/dir/file".to_string(),
            to: "/dir/file2".to_string(),
            renamed_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("EntryRenamed"));
        let decoded: GatewayEvent = serde_json::from_str(&json).unwrap();
        if let GatewayEvent::EntryRenamed { to, .. } = decoded {
            assert_eq!(to, "/dir/file2");
        } else {
            panic!("unexpected variant");
        }
    }
}
