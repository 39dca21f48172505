// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for gateway audit events
//
// In-memory event streaming over tokio broadcast channels. Events are lost
// on restart and dropped for receivers that fall too far behind.

use crate::domain::events::{EventPublisher, GatewayEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Event bus for publishing and subscribing to gateway events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<GatewayEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: GatewayEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is subscribed
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all gateway events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the events of one session
    pub fn subscribe_session(&self, session_id: Uuid) -> SessionEventReceiver {
        SessionEventReceiver {
            receiver: self.subscribe(),
            session_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish_gateway_event(&self, event: GatewayEvent) {
        self.publish(event);
    }
}

/// Receiver for all gateway events
pub struct EventReceiver {
    receiver: broadcast::Receiver<GatewayEvent>,
}

impl EventReceiver {
    /// Receive the next event
    pub async fn recv(&mut self) -> Result<GatewayEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<GatewayEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to a single session
pub struct SessionEventReceiver {
    receiver: EventReceiver,
    session_id: Uuid,
}

impl SessionEventReceiver {
    pub async fn recv(&mut self) -> Result<GatewayEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await?;
            if session_of(&event) == self.session_id {
                return Ok(event);
            }
        }
    }
}

fn session_of(event: &GatewayEvent) -> Uuid {
    match event {
        GatewayEvent::SessionAuthenticated { session_id, .. }
        | GatewayEvent::AuthenticationRejected { session_id, .. }
        | GatewayEvent::FileCommitted { session_id, .. }
        | GatewayEvent::DirectoryCreated { session_id, .. }
        | GatewayEvent::EntryRemoved { session_id, .. }
        | GatewayEvent::EntryRenamed { session_id, .. }
        | GatewayEvent::SessionClosed { session_id, .. } => *session_id,
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn created(session_id: Uuid, path: &str) -> GatewayEvent {
        GatewayEvent::DirectoryCreated {
            session_id,
            username: "alice".to_string(),
            path: path.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish_gateway_event(created(Uuid::new_v4(), "/d")).await;

        assert!(matches!(receiver1.recv().await.unwrap(), GatewayEvent::DirectoryCreated { .. }));
        assert!(matches!(receiver2.recv().await.unwrap(), GatewayEvent::DirectoryCreated { .. }));
        assert!(matches!(receiver1.try_recv(), Err(EventBusError::Empty)));
    }

    #[tokio::test]
    async fn test_session_filtering() {
        let event_bus = EventBus::new(10);
        let session_id = Uuid::new_v4();
        let mut receiver = event_bus.subscribe_session(session_id);

        event_bus.publish(created(Uuid::new_v4(), "/other"));
        event_bus.publish(created(session_id, "/mine"));

        match receiver.recv().await.unwrap() {
            GatewayEvent::DirectoryCreated { path, .. } => assert_eq!(path, "/mine"),
            other => panic!("Wrong event received: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        EventBus::default().publish(created(Uuid::new_v4(), "/d"));
    }
}
