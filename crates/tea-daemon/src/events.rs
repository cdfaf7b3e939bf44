//! Event emission.
//!
//! Ledger events are stamped with the wall-clock time and a sequence number
//! and broadcast to every subscriber. Lagging subscribers lose the oldest
//! events once the buffer is full.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tea_types::events::LedgerEvent;
use tokio::sync::broadcast;

/// An event emitted by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type name (e.g. "Staked", "DaemonStarted").
    pub event_type: String,
    /// Unix timestamp.
    pub timestamp: u64,
    /// Position in the bus's emission order, starting at 1.
    pub sequence: u64,
    /// Type-specific payload.
    pub payload: serde_json::Value,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event_type: &str, timestamp: u64, payload: serde_json::Value) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        // No subscribers is not an error.
        let _ = self.sender.send(Event {
            event_type: event_type.to_string(),
            timestamp,
            sequence,
            payload,
        });
    }

    /// Emit a batch of ledger events in order.
    pub fn publish(&self, events: Vec<LedgerEvent>, timestamp: u64) {
        for event in events {
            let payload = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
            self.emit(event.name(), timestamp, payload);
        }
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}
