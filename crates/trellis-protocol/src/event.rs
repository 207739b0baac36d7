//! Graph change events and the pluggable publisher interface.
//!
//! Events are emitted by the orchestrator after a write commits. Publication
//! is fire-and-forget: a failing publisher never affects the already
//! committed transaction; failures are logged and dropped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// Kind of graph change an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A node was created.
    Create,
    /// A node's properties were updated.
    Update,
    /// A node was deleted.
    Delete,
    /// A relationship was created.
    Connect,
    /// A relationship was deleted.
    Disconnect,
}

/// Before/after property snapshots carried by an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventProperties {
    /// Property map before the write (absent for creates).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Map<String, serde_json::Value>>,
    /// Property map after the write (absent for deletes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A structured change event published after a successful write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEvent {
    /// Operation kind.
    pub event: EventKind,
    /// Schema type name of the affected entity.
    pub typename: String,
    /// Before/after property snapshots.
    pub properties: EventProperties,
    /// Identifier of the affected entity.
    pub id: serde_json::Value,
    /// Milliseconds since the Unix epoch, assigned at emission.
    pub timestamp: i64,
}

/// Publisher-side errors. Opaque to the mutation path, which only logs them.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Transport rejected or dropped the event.
    #[error("publish failed: {0}")]
    Transport(String),
    /// Publisher was used before `init` or after `close`.
    #[error("publisher not running")]
    NotRunning,
}

/// Pluggable event transport.
///
/// Implementations exist for in-memory fan-out (below) and external brokers;
/// the engine only depends on this trait.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Prepare the transport (open channels, declare exchanges, ...).
    async fn init(&self) -> Result<(), PublishError>;
    /// Publish one event. Must not block the caller indefinitely.
    async fn publish(&self, event: GraphEvent) -> Result<(), PublishError>;
    /// Tear down the transport.
    async fn close(&self) -> Result<(), PublishError>;
}

/// In-process publisher backed by a `tokio::sync::broadcast` channel.
///
/// Subscribers that lag simply miss events; delivery is best-effort by
/// design.
pub struct InMemoryPublisher {
    tx: broadcast::Sender<GraphEvent>,
}

impl InMemoryPublisher {
    /// Create a publisher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.tx.subscribe()
    }
}

impl Default for InMemoryPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn init(&self) -> Result<(), PublishError> {
        Ok(())
    }

    async fn publish(&self, event: GraphEvent) -> Result<(), PublishError> {
        // Zero receivers is not an error; events are droppable.
        let _ = self.tx.send(event);
        Ok(())
    }

    async fn close(&self) -> Result<(), PublishError> {
        Ok(())
    }
}
