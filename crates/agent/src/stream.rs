//! Streaming dispatch.
//!
//! The [`StreamMultiplexer`] runs the same protocol as
//! [`DispatchLoop::run`](crate::dispatch::DispatchLoop::run) in a spawned
//! producer task and hands the caller a [`DispatchStream`] of
//! [`StreamEvent`]s. Each invocation reads its own provider stream to the
//! end before the next step starts, so every first-phase fragment precedes
//! the fetch, and every follow-up fragment follows it.
//!
//! Dropping the `DispatchStream` stops the producer at its next send. The
//! provider receiver is dropped with it and no further invocation starts.

use futures::{Stream, StreamExt};
use leadline_core::error::Result;
use leadline_core::provider::Usage;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::dispatch::{DispatchLoop, Phase, RequestUsage};
use crate::marker::Classification;
use crate::session::Session;
use crate::stream_event::StreamEvent;
use crate::token::{estimate_messages_tokens, estimate_tokens};

/// Default capacity of the event channel.
pub const DEFAULT_BUFFER: usize = 128;

/// The consumer half of a streaming round. Finite and not restartable: it
/// ends after a `done` or `error` event.
pub struct DispatchStream {
    inner: ReceiverStream<StreamEvent>,
}

impl DispatchStream {
    /// Receive the next event, or `None` once the round is over.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.inner.next().await
    }
}

impl Stream for DispatchStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// The producer side: spawns one task per streaming round.
pub struct StreamMultiplexer {
    dispatch: Arc<DispatchLoop>,
    buffer: usize,
}

impl StreamMultiplexer {
    pub fn new(dispatch: Arc<DispatchLoop>) -> Self {
        Self {
            dispatch,
            buffer: DEFAULT_BUFFER,
        }
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Start a streaming round for `message` on `session`.
    pub fn stream(&self, session: Arc<Session>, message: String) -> DispatchStream {
        let (tx, rx) = mpsc::channel(self.buffer);
        let dispatch = self.dispatch.clone();

        tokio::spawn(async move {
            let _turn = session.begin_turn().await;
            match produce(&dispatch, &session, &message, &tx).await {
                Ok(Some(done)) => {
                    let _ = tx.send(done).await;
                }
                Ok(None) => {
                    debug!(session_id = %session.id(), "Stream consumer went away; stopping");
                }
                Err(e) => {
                    let _ = tx
                        .send(StreamEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                }
            }
        });

        DispatchStream {
            inner: ReceiverStream::new(rx),
        }
    }
}

/// Drive one round. `Ok(None)` means the consumer is gone.
async fn produce(
    dispatch: &DispatchLoop,
    session: &Session,
    message: &str,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<Option<StreamEvent>> {
    let mut usage = RequestUsage::default();

    let Some((reply, first)) = invoke(dispatch, session, Phase::Initial, message, tx).await? else {
        return Ok(None);
    };
    usage.add(&first);

    if let Classification::Fetch { query } = dispatch.classify(&reply) {
        if tx
            .send(StreamEvent::Fetching {
                query: query.clone(),
            })
            .await
            .is_err()
        {
            return Ok(None);
        }

        let follow_up = dispatch.fetch_round(session.id(), &query).await;
        if tx.is_closed() {
            return Ok(None);
        }

        let Some((_, second)) = invoke(dispatch, session, Phase::FollowUp, &follow_up, tx).await?
        else {
            return Ok(None);
        };
        usage.add(&second);
    }

    Ok(Some(StreamEvent::Done {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        total_tokens: usage.input_tokens + usage.output_tokens,
        accuracy: usage.accuracy,
        invocations: usage.invocations,
    }))
}

/// One streamed invocation. Fragments are forwarded in arrival order; the
/// exchange is committed only once the provider stream finishes.
async fn invoke(
    dispatch: &DispatchLoop,
    session: &Session,
    phase: Phase,
    prompt: &str,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<Option<(String, Usage)>> {
    let messages = session.compose(prompt);
    let prompt_estimate = estimate_messages_tokens(&messages);
    let binding = session.binding();

    let mut chunks = match binding.provider.stream(binding.request(messages, true)).await {
        Ok(rx) => rx,
        Err(e) => {
            dispatch.report_error(session.id(), phase, &e);
            return Err(e.into());
        }
    };

    let mut reply = String::new();
    let mut reported = None;
    while let Some(chunk) = chunks.recv().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                dispatch.report_error(session.id(), phase, &e);
                return Err(e.into());
            }
        };

        if let Some(content) = chunk.content.filter(|c| !c.is_empty()) {
            reply.push_str(&content);
            if tx.send(StreamEvent::Fragment { phase, content }).await.is_err() {
                return Ok(None);
            }
        }
        if chunk.usage.is_some() {
            reported = chunk.usage;
        }
        if chunk.done {
            break;
        }
    }

    let usage = reported
        .unwrap_or_else(|| Usage::estimated(prompt_estimate, estimate_tokens(&reply)));
    dispatch.commit(session, phase, prompt, &reply, usage);
    Ok(Some((reply, usage)))
}
