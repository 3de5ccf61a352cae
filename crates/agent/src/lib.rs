//! The chat orchestration engine — the heart of Leadline.
//!
//! Every inbound message runs one dispatch round:
//!
//! 1. **Compose** the prompt (instructions + agent profile + conversation so far)
//! 2. **Invoke** the session's model
//! 3. **If the reply starts with `FETCH`**: look the query up, process the
//!    data, and invoke the model once more with the results
//! 4. **Return** the final text and the round's token usage
//!
//! A round makes at most two model invocations. Streaming rounds run the
//! same protocol and yield fragments as they arrive.

pub mod dispatch;
pub mod engine;
pub mod marker;
pub mod prompt;
pub mod session;
pub mod stream;
pub mod stream_event;
pub mod token;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dispatch::{DispatchLoop, DispatchResult, Phase};
pub use engine::ChatEngine;
pub use marker::{Classification, FetchMarker, MarkerRule};
pub use session::{Session, SessionStore};
pub use stream::{DispatchStream, StreamMultiplexer};
pub use stream_event::StreamEvent;
