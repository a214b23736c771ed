//! Real-time notification fan-out.
//!
//! Engines publish through [`EventPublisher`] and never depend on the
//! transport. Emission is fire-and-forget: [`emit_best_effort`] logs a
//! failure and carries on, so a dead channel never fails a command.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use workplanner_core::{PlannerError, Result};

pub const EVENT_NEW_POLL: &str = "new-poll";
pub const EVENT_POLL_UPDATED: &str = "poll-updated";

/// An event as delivered to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub event: String,
    pub data: serde_json::Value,
}

/// Narrow interface the engines use to announce state changes.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn emit(&self, event: &str, payload: serde_json::Value) -> Result<()>;
}

/// In-process broadcast to every subscribed client.
pub struct BroadcastPublisher {
    tx: broadcast::Sender<RealtimeEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn emit(&self, event: &str, payload: serde_json::Value) -> Result<()> {
        // No subscribers is not a failure, there is simply nobody to tell.
        if self.tx.receiver_count() == 0 {
            tracing::debug!(event, "no realtime subscribers");
            return Ok(());
        }
        self.tx
            .send(RealtimeEvent {
                event: event.to_string(),
                data: payload,
            })
            .map(|_| ())
            .map_err(|e| PlannerError::Storage(format!("broadcast {event}: {e}")))
    }
}

/// Publisher used when the realtime channel is disabled.
pub struct NullPublisher;

#[async_trait]
impl EventPublisher for NullPublisher {
    async fn emit(&self, _event: &str, _payload: serde_json::Value) -> Result<()> {
        Ok(())
    }
}

/// Serialize and emit, swallowing every failure.
pub async fn emit_best_effort<T: Serialize>(publisher: &dyn EventPublisher, event: &str, payload: &T) {
    let value = match serde_json::to_value(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(event, "failed to encode realtime payload: {e}");
            return;
        }
    };
    if let Err(e) = publisher.emit(event, value).await {
        tracing::warn!(event, "realtime emit failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn emit(&self, _event: &str, _payload: serde_json::Value) -> Result<()> {
            Err(PlannerError::Storage("socket closed".into()))
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let publisher = BroadcastPublisher::new(8);
        let mut rx1 = publisher.subscribe();
        let mut rx2 = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 2);

        publisher
            .emit(EVENT_NEW_POLL, serde_json::json!({"id": "p1"}))
            .await
            .unwrap();

        for rx in [&mut rx1, &mut rx2] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.event, "new-poll");
            assert_eq!(event.data["id"], "p1");
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_ok() {
        let publisher = BroadcastPublisher::new(8);
        assert!(publisher.emit(EVENT_POLL_UPDATED, serde_json::json!({})).await.is_ok());
        assert!(NullPublisher.emit(EVENT_POLL_UPDATED, serde_json::json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        emit_best_effort(&FailingPublisher, EVENT_POLL_UPDATED, &serde_json::json!({"id": "p1"})).await;
    }
}
