//! Event types and event bus
//!
//! Events are broadcast after the durable store commits, so a subscriber
//! never observes a record the store cannot serve.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// partid event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PartidEvent {
    /// A record was durably appended under an owner
    RecordAppended {
        owner_id: String,
        record_id: Uuid,
        created_at: DateTime<Utc>,
    },
}

impl PartidEvent {
    /// Owner partition the event belongs to
    pub fn owner_id(&self) -> &str {
        match self {
            PartidEvent::RecordAppended { owner_id, .. } => owner_id,
        }
    }
}

/// Central event distribution bus
///
/// Uses `tokio::sync::broadcast` internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use partid_common::events::{EventBus, PartidEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(PartidEvent::RecordAppended {
///     owner_id: "user-1".to_string(),
///     record_id: uuid::Uuid::new_v4(),
///     created_at: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PartidEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before slow receivers lag
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PartidEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PartidEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appended(owner: &str) -> PartidEvent {
        PartidEvent::RecordAppended {
            owner_id: owner.to_string(),
            record_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(10);
        bus.emit_lossy(appended("a"));
        // Later subscribers do not see earlier events
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        let event = appended("owner-1");
        bus.emit_lossy(event.clone());

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
        assert_eq!(received.owner_id(), "owner-1");
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let json = serde_json::to_value(appended("x")).unwrap();
        assert_eq!(json["type"], "RecordAppended");
        assert_eq!(json["owner_id"], "x");
    }

    #[test]
    fn test_slow_subscriber_lags_past_capacity() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..3 {
            bus.emit_lossy(appended("a"));
        }
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(1))
        ));
    }
}
