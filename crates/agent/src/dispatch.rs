//! The dispatch loop: one inbound message, one or two model invocations.
//!
//! ```text
//! compose prompt ─▶ invoke (initial) ─▶ classify
//!                                        ├─ final  ─▶ done
//!                                        └─ FETCH  ─▶ fetch ─▶ process ─▶ invoke (follow-up) ─▶ done
//! ```
//!
//! Every successful invocation is appended to memory and recorded in the
//! ledger before the next step starts. A failed invocation touches neither.

use chrono::Utc;
use leadline_core::error::Result;
use leadline_core::event::{DomainEvent, EventBus};
use leadline_core::lookup::{FetchGateway, ResultProcessor};
use leadline_core::provider::{Usage, UsageAccuracy, UsageReporting};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::marker::{Classification, FetchMarker, MarkerRule};
use crate::prompt;
use crate::session::Session;

/// Which invocation of a dispatch round produced something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// The first invocation, on the user's message.
    Initial,
    /// The second invocation, on the fetched data.
    FollowUp,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::FollowUp => "follow_up",
        }
    }
}

/// Outcome of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    /// The trimmed answer returned to the caller.
    pub final_text: String,
    pub request_input_tokens: u64,
    pub request_output_tokens: u64,
    /// 1 without a fetch round, 2 with one.
    pub invocations: u32,
    /// The extracted query when a fetch round ran.
    pub fetch_query: Option<String>,
    pub accuracy: UsageAccuracy,
}

impl DispatchResult {
    pub fn total_tokens(&self) -> u64 {
        self.request_input_tokens + self.request_output_tokens
    }
}

/// Per-request usage accumulator.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RequestUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub invocations: u32,
    pub accuracy: UsageAccuracy,
}

impl RequestUsage {
    pub fn add(&mut self, usage: &Usage) {
        self.input_tokens = self.input_tokens.saturating_add(usage.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(usage.output_tokens);
        self.invocations += 1;
        self.accuracy = self.accuracy.merge(usage.accuracy);
    }

    pub fn into_result(self, final_text: String, fetch_query: Option<String>) -> DispatchResult {
        DispatchResult {
            final_text,
            request_input_tokens: self.input_tokens,
            request_output_tokens: self.output_tokens,
            invocations: self.invocations,
            fetch_query,
            accuracy: self.accuracy,
        }
    }
}

/// The query, fetch, analysis protocol engine.
pub struct DispatchLoop {
    fetcher: Arc<dyn FetchGateway>,
    processor: Arc<dyn ResultProcessor>,
    marker: Arc<dyn MarkerRule>,
    events: Option<Arc<EventBus>>,
}

impl DispatchLoop {
    pub fn new(fetcher: Arc<dyn FetchGateway>, processor: Arc<dyn ResultProcessor>) -> Self {
        Self {
            fetcher,
            processor,
            marker: Arc::new(FetchMarker),
            events: None,
        }
    }

    /// Replace the default `FETCH` prefix rule.
    pub fn with_marker(mut self, marker: Arc<dyn MarkerRule>) -> Self {
        self.marker = marker;
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run one dispatch round for `user_message`.
    ///
    /// Holds the session's turn for the whole round, so rounds on one
    /// session never interleave.
    pub async fn run(&self, session: &Session, user_message: &str) -> Result<DispatchResult> {
        let _turn = session.begin_turn().await;
        let mut usage = RequestUsage::default();

        let (reply, first) = self.invoke(session, Phase::Initial, user_message).await?;
        usage.add(&first);

        match self.classify(&reply) {
            Classification::Final { text } => Ok(usage.into_result(text, None)),
            Classification::Fetch { query } => {
                let follow_up = self.fetch_round(session.id(), &query).await;
                let (reply, second) = self.invoke(session, Phase::FollowUp, &follow_up).await?;
                usage.add(&second);
                Ok(usage.into_result(reply.trim().to_string(), Some(query)))
            }
        }
    }

    async fn invoke(&self, session: &Session, phase: Phase, prompt: &str) -> Result<(String, Usage)> {
        let binding = session.binding();
        let request = binding.request(session.compose(prompt), false);

        let response = match binding.provider.complete(request).await {
            Ok(r) => r,
            Err(e) => {
                self.report_error(session.id(), phase, &e);
                return Err(e.into());
            }
        };

        let usage = response.usage();
        let reply = response.message.content;
        self.commit(session, phase, prompt, &reply, usage);
        Ok((reply, usage))
    }

    pub(crate) fn classify(&self, reply: &str) -> Classification {
        self.marker.classify(reply)
    }

    /// Record a finished invocation in the session and announce it.
    pub(crate) fn commit(&self, session: &Session, phase: Phase, prompt: &str, reply: &str, usage: Usage) {
        session.record_exchange(prompt, reply, &usage);

        info!(
            session_id = %session.id(),
            phase = phase.as_str(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            estimated = usage.accuracy == UsageAccuracy::Estimated,
            "Model invocation complete"
        );

        self.publish(DomainEvent::ModelInvoked {
            session_id: session.id().to_string(),
            phase: phase.as_str().to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            estimated: usage.accuracy == UsageAccuracy::Estimated,
            timestamp: Utc::now(),
        });
    }

    /// Fetch and process data for `query`, returning the follow-up prompt.
    /// Never fails: a fetch error becomes the data text.
    pub(crate) async fn fetch_round(&self, session_id: &str, query: &str) -> String {
        let started = Instant::now();
        info!(session_id = %session_id, query = %query, gateway = self.fetcher.name(), "Fetching data");

        let (raw, success) = match self.fetcher.fetch(query).await {
            Ok(raw) => (raw, true),
            Err(e) => {
                warn!(session_id = %session_id, query = %query, error = %e, "Fetch failed; passing the error to the model");
                (prompt::fetch_error_text(&e), false)
            }
        };

        let data = self.processor.process(&raw, query).await;
        self.publish(DomainEvent::FetchCompleted {
            session_id: session_id.to_string(),
            query: query.to_string(),
            bytes: raw.len(),
            success,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });

        prompt::follow_up(query, &data)
    }

    pub(crate) fn report_error(&self, session_id: &str, phase: Phase, error: &impl std::fmt::Display) {
        warn!(session_id = %session_id, phase = phase.as_str(), error = %error, "Model invocation failed");
        self.publish(DomainEvent::ErrorOccurred {
            context: format!("session {session_id}, {} invocation", phase.as_str()),
            error_message: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use crate::test_helpers::{CountingFetchGateway, ScriptedProvider, Scripted, factory, reply};
    use leadline_core::error::{Error, FetchError, ProviderError};
    use leadline_core::lookup::IdentityProcessor;
    use leadline_core::message::Role;
    use leadline_core::profile::AgentProfile;

    fn profile() -> AgentProfile {
        AgentProfile::new("agent-7", "Jane Smith", "Bondi", vec!["1 Beach Rd".into()])
    }

    fn setup(
        script: Vec<Scripted>,
        fetcher: Arc<CountingFetchGateway>,
    ) -> (DispatchLoop, Arc<Session>, Arc<ScriptedProvider>) {
        let provider = ScriptedProvider::new(script);
        let store = SessionStore::default();
        let session = store.get_or_create("s1", profile(), &factory(provider.clone()));
        let dispatch = DispatchLoop::new(fetcher, Arc::new(IdentityProcessor));
        (dispatch, session, provider)
    }

    #[tokio::test]
    async fn marker_reply_triggers_one_fetch_and_one_follow_up() {
        let fetcher = CountingFetchGateway::ok(r#"[{"full_name":"Jane Doe"}]"#);
        let (dispatch, session, provider) = setup(
            vec![reply("  fetch:  Bondi \n", 100, 10), reply("## Summary\n| Name |", 250, 40)],
            fetcher.clone(),
        );

        let result = dispatch.run(&session, "What properties are in Bondi?").await.unwrap();

        assert_eq!(fetcher.queries(), vec!["Bondi"]);
        assert_eq!(provider.call_count(), 2);
        assert_eq!(result.final_text, "## Summary\n| Name |");
        assert_eq!(result.request_input_tokens, 350);
        assert_eq!(result.request_output_tokens, 50);
        assert_eq!(result.total_tokens(), 400);
        assert_eq!(result.invocations, 2);
        assert_eq!(result.fetch_query.as_deref(), Some("Bondi"));
        assert_eq!(result.accuracy, UsageAccuracy::Exact);
    }

    #[tokio::test]
    async fn follow_up_prompt_carries_fetched_data() {
        let fetcher = CountingFetchGateway::ok("[1,2]");
        let (dispatch, session, provider) =
            setup(vec![reply("FETCH: 2026", 1, 1), reply("done", 1, 1)], fetcher);

        dispatch.run(&session, "Who lives in 2026?").await.unwrap();

        let second = &provider.requests()[1];
        let last = second.messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(
            last.content,
            "Here are the search results for '2026': [1,2]\nPlease summarise the key opportunities for the agent."
        );
        // the first exchange is already in the second prompt
        assert!(second.messages.iter().any(|m| m.content == "FETCH: 2026"));
    }

    #[tokio::test]
    async fn plain_reply_is_final_after_one_invocation() {
        let fetcher = CountingFetchGateway::ok("unused");
        let (dispatch, session, provider) = setup(
            vec![reply("Thanks for your question, here is some advice...", 80, 12)],
            fetcher.clone(),
        );

        let result = dispatch.run(&session, "Any tips?").await.unwrap();

        assert_eq!(result.final_text, "Thanks for your question, here is some advice...");
        assert_eq!(result.invocations, 1);
        assert_eq!(result.total_tokens(), 92);
        assert_eq!(result.fetch_query, None);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_still_produces_an_answer() {
        let fetcher = CountingFetchGateway::failing(FetchError::Network("timeout".into()));
        let (dispatch, session, provider) = setup(
            vec![reply("FETCH: Bondi", 10, 2), reply("No data, sorry.", 20, 4)],
            fetcher,
        );

        let result = dispatch.run(&session, "Bondi leads?").await.unwrap();

        assert_eq!(result.final_text, "No data, sorry.");
        let follow_up = provider.requests()[1].messages.last().unwrap().content.clone();
        assert!(follow_up.contains("Error fetching data: timeout"));
    }

    #[tokio::test]
    async fn second_marker_reply_is_final() {
        let fetcher = CountingFetchGateway::ok("[]");
        let (dispatch, session, provider) = setup(
            vec![reply("FETCH: Bondi", 1, 1), reply("FETCH: Coogee", 1, 1)],
            fetcher.clone(),
        );

        let result = dispatch.run(&session, "q").await.unwrap();

        assert_eq!(result.final_text, "FETCH: Coogee");
        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn ledger_accumulates_across_runs() {
        let fetcher = CountingFetchGateway::ok("[]");
        let (dispatch, session, _) = setup(
            vec![
                reply("FETCH: Bondi", 100, 10),
                reply("summary", 200, 20),
                reply("plain", 30, 3),
            ],
            fetcher,
        );

        dispatch.run(&session, "first").await.unwrap();
        dispatch.run(&session, "second").await.unwrap();

        let ledger = session.ledger();
        assert_eq!(ledger.input_tokens, 330);
        assert_eq!(ledger.output_tokens, 33);
        assert_eq!(ledger.total_tokens, ledger.input_tokens + ledger.output_tokens);
        assert_eq!(ledger.invocations, 3);
    }

    #[tokio::test]
    async fn second_message_sees_first_exchange() {
        let fetcher = CountingFetchGateway::ok("[]");
        let (dispatch, session, provider) = setup(
            vec![reply("Hello Jane", 1, 1), reply("Sure", 1, 1)],
            fetcher,
        );

        dispatch.run(&session, "Hi there").await.unwrap();
        dispatch.run(&session, "Follow-up question").await.unwrap();

        let contents: Vec<String> = provider.requests()[1]
            .messages
            .iter()
            .skip(1)
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(contents, vec!["Hi there", "Hello Jane", "Follow-up question"]);
    }

    #[tokio::test]
    async fn missing_usage_counts_as_zero() {
        let fetcher = CountingFetchGateway::ok("[]");
        let (dispatch, session, _) = setup(
            vec![crate::test_helpers::reply_without_usage("ok")],
            fetcher,
        );

        let result = dispatch.run(&session, "q").await.unwrap();
        assert_eq!(result.total_tokens(), 0);
        assert_eq!(result.accuracy, UsageAccuracy::Exact);
        assert_eq!(session.ledger().invocations, 1);
    }

    #[tokio::test]
    async fn model_failure_propagates_without_recording() {
        let fetcher = CountingFetchGateway::ok("[]");
        let (dispatch, session, _) = setup(
            vec![
                reply("FETCH: Bondi", 10, 1),
                Scripted::Fail(ProviderError::Timeout("30s".into())),
            ],
            fetcher,
        );

        let err = dispatch.run(&session, "q").await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Timeout(_))));

        // only the successful first invocation was committed
        assert_eq!(session.memory().len(), 2);
        assert_eq!(session.ledger().total_tokens, 11);
    }

    #[tokio::test]
    async fn events_are_published() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let fetcher = CountingFetchGateway::ok("[]");
        let (dispatch, session, _) = setup(
            vec![reply("FETCH: Bondi", 1, 1), reply("done", 1, 1)],
            fetcher,
        );
        let dispatch = dispatch.with_event_bus(bus);

        dispatch.run(&session, "q").await.unwrap();

        let kinds: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| match e.as_ref() {
                DomainEvent::ModelInvoked { phase, .. } => format!("model:{phase}"),
                DomainEvent::FetchCompleted { .. } => "fetch".into(),
                _ => "other".into(),
            })
            .collect();
        assert_eq!(kinds, vec!["model:initial", "fetch", "model:follow_up"]);
    }

    struct AskMarker;

    impl MarkerRule for AskMarker {
        fn classify(&self, reply: &str) -> Classification {
            match reply.trim().strip_prefix("ASK ") {
                Some(q) => Classification::Fetch { query: q.into() },
                None => Classification::Final { text: reply.trim().into() },
            }
        }
    }

    #[tokio::test]
    async fn marker_rule_is_pluggable() {
        let fetcher = CountingFetchGateway::ok("[]");
        let (dispatch, session, _) = setup(
            vec![reply("ASK Manly", 1, 1), reply("done", 1, 1)],
            fetcher.clone(),
        );
        let dispatch = dispatch.with_marker(Arc::new(AskMarker));

        dispatch.run(&session, "q").await.unwrap();
        assert_eq!(fetcher.queries(), vec!["Manly"]);
    }
}
