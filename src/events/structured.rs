//! Structured events emitted over the connection lifecycle.
//!
//! The orchestrator publishes through an injected [`EventBus`]; the memory
//! bus backs assertions in tests and the broadcast bus fans events out to
//! live subscribers such as the CLI.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Connection lifecycle notifications visible to observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionEvent {
    StateChanged { name: String, running: bool },
    StartFailed { name: String },
    #[serde(rename_all = "camelCase")]
    LatencyAvailable { name: String, latency_ms: i32 },
}

/// Top-level event envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    Connection(ConnectionEvent),
}

/// Sink for lifecycle events; implementations must not block.
pub trait EventBus: Send + Sync + 'static {
    fn publish(&self, event: Event);
}

/// Vec-backed bus for tests and development.
#[derive(Clone, Default)]
pub struct MemoryEventBus {
    inner: Arc<Mutex<Vec<Event>>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded events and clears the buffer.
    pub fn take_all(&self) -> Vec<Event> {
        let mut guard = self.inner.lock().unwrap();
        let out = guard.clone();
        guard.clear();
        out
    }

    /// Returns a copy of the recorded events without clearing.
    pub fn snapshot(&self) -> Vec<Event> {
        self.inner.lock().unwrap().clone()
    }
}

impl EventBus for MemoryEventBus {
    fn publish(&self, event: Event) {
        self.inner.lock().unwrap().push(event);
    }
}

/// Fan-out bus over a tokio broadcast channel. Publishing never blocks; an
/// event sent while no receiver is subscribed is dropped.
#[derive(Clone)]
pub struct BroadcastEventBus {
    tx: broadcast::Sender<Event>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}
