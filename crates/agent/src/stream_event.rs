//! Streaming events.
//!
//! `StreamEvent` is what a streaming dispatch round yields to its consumer;
//! the gateway forwards each one as an SSE event named by
//! [`StreamEvent::event_type`].

use leadline_core::provider::UsageAccuracy;
use serde::{Deserialize, Serialize};

use crate::dispatch::Phase;

/// Events emitted during a streaming dispatch round.
///
/// - `chunk`    — partial model output, tagged with its phase
/// - `fetching` — the model asked for data; the lookup is running
/// - `done`     — the round is complete, with per-request usage
/// - `error`    — the round failed; nothing follows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Partial text from the model.
    #[serde(rename = "chunk")]
    Fragment { phase: Phase, content: String },

    /// A fetch round is starting for this query.
    Fetching { query: String },

    /// The stream is complete — final metadata.
    Done {
        input_tokens: u64,
        output_tokens: u64,
        total_tokens: u64,
        accuracy: UsageAccuracy,
        invocations: u32,
    },

    /// An error occurred mid-stream.
    Error { message: String },
}

impl StreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Fragment { .. } => "chunk",
            Self::Fetching { .. } => "fetching",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
