//! Domain event system — decoupled observation of the engine.
//!
//! Events are published when a session is created, a model is invoked, or a
//! lookup completes. Subscribers (logging, dashboards, tests) react without
//! the dispatch loop knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A session was created for a previously unseen id
    SessionCreated {
        session_id: String,
        agent_name: String,
        timestamp: DateTime<Utc>,
    },

    /// One model invocation finished
    ModelInvoked {
        session_id: String,
        phase: String, // "initial", "follow_up"
        input_tokens: u64,
        output_tokens: u64,
        estimated: bool,
        timestamp: DateTime<Utc>,
    },

    /// The fetch gateway answered a FETCH marker
    FetchCompleted {
        session_id: String,
        query: String,
        bytes: usize,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Components can subscribe to receive all events and filter for what they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
