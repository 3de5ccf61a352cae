//! The chat engine: session lookup plus dispatch, behind two entry points.

use chrono::Utc;
use leadline_core::error::Result;
use leadline_core::event::{DomainEvent, EventBus};
use leadline_core::profile::AgentProfile;
use leadline_core::provider::ModelFactory;
use std::sync::Arc;

use crate::dispatch::{DispatchLoop, DispatchResult};
use crate::session::{Session, SessionStore};
use crate::stream::{DispatchStream, StreamMultiplexer};

/// Entry point for inbound messages.
pub struct ChatEngine {
    store: Arc<SessionStore>,
    model_factory: ModelFactory,
    dispatch: Arc<DispatchLoop>,
    multiplexer: StreamMultiplexer,
    events: Arc<EventBus>,
}

impl ChatEngine {
    /// Build an engine. Dispatch events are published on `events`.
    pub fn new(
        store: Arc<SessionStore>,
        model_factory: ModelFactory,
        dispatch: DispatchLoop,
        events: Arc<EventBus>,
    ) -> Self {
        let dispatch = Arc::new(dispatch.with_event_bus(events.clone()));
        Self {
            store,
            model_factory,
            multiplexer: StreamMultiplexer::new(dispatch.clone()),
            dispatch,
            events,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    fn session(&self, session_id: &str, profile: AgentProfile) -> Arc<Session> {
        let agent_name = profile.agent_name.clone();
        let (session, created) =
            self.store
                .get_or_create_tracked(session_id, profile, &self.model_factory);
        if created {
            self.events.publish(DomainEvent::SessionCreated {
                session_id: session_id.to_string(),
                agent_name,
                timestamp: Utc::now(),
            });
        }
        session
    }

    /// Handle one message and return the final answer.
    pub async fn process_message(
        &self,
        session_id: &str,
        profile: AgentProfile,
        message: &str,
    ) -> Result<DispatchResult> {
        let session = self.session(session_id, profile);
        self.dispatch.run(&session, message).await
    }

    /// Handle one message as a stream of events.
    pub fn stream_message(
        &self,
        session_id: &str,
        profile: AgentProfile,
        message: impl Into<String>,
    ) -> DispatchStream {
        let session = self.session(session_id, profile);
        self.multiplexer.stream(session, message.into())
    }
}
