//! Sessions and the session registry.
//!
//! A [`Session`] owns everything that persists between messages of one
//! conversation: the model binding, the [`ConversationMemory`], the
//! [`TokenLedger`] and the latest [`AgentProfile`]. The [`SessionStore`]
//! guarantees at most one session per id and enforces the idle and capacity
//! eviction policy.

use leadline_config::SessionsConfig;
use leadline_core::ledger::{LedgerSnapshot, TokenLedger};
use leadline_core::message::{ConversationMemory, Message};
use leadline_core::profile::AgentProfile;
use leadline_core::provider::{ModelBinding, ModelFactory, Usage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::prompt;

/// Mutable per-session state. Guarded by a std mutex that is never held
/// across an await.
#[derive(Debug)]
struct SessionState {
    memory: ConversationMemory,
    ledger: TokenLedger,
    profile: AgentProfile,
    last_active: Instant,
}

/// One conversation.
#[derive(Debug)]
pub struct Session {
    id: String,
    binding: ModelBinding,
    state: Mutex<SessionState>,
    /// Serializes dispatch runs for this session.
    turn: Arc<tokio::sync::Mutex<()>>,
}

impl Session {
    pub fn new(id: impl Into<String>, profile: AgentProfile, binding: ModelBinding) -> Self {
        Self {
            id: id.into(),
            binding,
            state: Mutex::new(SessionState {
                memory: ConversationMemory::new(),
                ledger: TokenLedger::new(),
                profile,
                last_active: Instant::now(),
            }),
            turn: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn binding(&self) -> &ModelBinding {
        &self.binding
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn profile(&self) -> AgentProfile {
        self.state().profile.clone()
    }

    pub fn set_profile(&self, profile: AgentProfile) {
        self.state().profile = profile;
    }

    /// A copy of the conversation so far.
    pub fn memory(&self) -> ConversationMemory {
        self.state().memory.clone()
    }

    pub fn ledger(&self) -> LedgerSnapshot {
        self.state().ledger.snapshot()
    }

    pub fn reset_ledger(&self) {
        self.state().ledger.reset();
    }

    pub fn touch(&self) {
        self.state().last_active = Instant::now();
    }

    pub fn last_active(&self) -> Instant {
        self.state().last_active
    }

    /// Wait for exclusive use of this session. Held for a whole dispatch run.
    pub async fn begin_turn(&self) -> OwnedMutexGuard<()> {
        self.turn.clone().lock_owned().await
    }

    /// Whether a dispatch run currently holds the turn.
    pub fn is_busy(&self) -> bool {
        self.turn.try_lock().is_err()
    }

    /// Build the prompt for `user_text` from the current profile and memory.
    pub fn compose(&self, user_text: &str) -> Vec<Message> {
        let state = self.state();
        prompt::compose_messages(&state.profile, &state.memory, user_text)
    }

    /// Commit one successful invocation: the exchange goes into memory and
    /// the usage into the ledger under the same lock.
    pub fn record_exchange(&self, prompt: &str, reply: &str, usage: &Usage) {
        let mut state = self.state();
        state.memory.push_exchange(prompt, reply);
        state.ledger.record(usage);
        state.last_active = Instant::now();
    }
}

/// Registry of live sessions keyed by caller-supplied id.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    idle_ttl: Duration,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(idle_ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    pub fn from_config(config: &SessionsConfig) -> Self {
        Self::new(
            Duration::from_secs(config.idle_ttl_secs),
            config.max_sessions,
        )
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the session for `id`, creating it on first use.
    ///
    /// An existing session keeps its binding, memory and ledger; only the
    /// profile is replaced.
    pub fn get_or_create(
        &self,
        id: &str,
        profile: AgentProfile,
        model_factory: &ModelFactory,
    ) -> Arc<Session> {
        self.get_or_create_tracked(id, profile, model_factory).0
    }

    /// Like [`get_or_create`](Self::get_or_create), also reporting whether
    /// the session was created by this call.
    pub fn get_or_create_tracked(
        &self,
        id: &str,
        profile: AgentProfile,
        model_factory: &ModelFactory,
    ) -> (Arc<Session>, bool) {
        let mut table = self.table();

        if let Some(session) = table.get(id) {
            debug!(session_id = %id, "Reusing session");
            session.set_profile(profile);
            session.touch();
            return (session.clone(), false);
        }

        if table.len() >= self.max_sessions {
            Self::evict_least_recent(&mut table);
        }

        let binding = model_factory();
        info!(
            session_id = %id,
            provider = binding.provider.name(),
            model = %binding.model,
            "Creating session"
        );
        let session = Arc::new(Session::new(id, profile, binding));
        table.insert(id.to_string(), session.clone());
        (session, true)
    }

    /// A session is pinned while a round holds its turn or while any caller
    /// outside the table still holds a handle to it.
    fn is_pinned(session: &Arc<Session>) -> bool {
        session.is_busy() || Arc::strong_count(session) > 1
    }

    fn evict_least_recent(table: &mut HashMap<String, Arc<Session>>) {
        let victim = table
            .values()
            .filter(|s| !Self::is_pinned(s))
            .min_by_key(|s| s.last_active())
            .map(|s| s.id().to_string());

        match victim {
            Some(id) => {
                info!(session_id = %id, "Session table full; evicting least recently active");
                table.remove(&id);
            }
            None => warn!(
                sessions = table.len(),
                "Session table full and every session is in use; growing past the limit"
            ),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.table().get(id).cloned()
    }

    /// Tear a session down. Runs already holding it finish normally.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.table().remove(id)
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// Drop every idle session whose last activity is older than the TTL.
    /// Returns how many were evicted.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let mut table = self.table();
        let before = table.len();
        table.retain(|_, s| {
            Self::is_pinned(s) || now.saturating_duration_since(s.last_active()) < self.idle_ttl
        });
        let evicted = before - table.len();
        if evicted > 0 {
            info!(evicted, remaining = table.len(), "Evicted idle sessions");
        }
        evicted
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::from_config(&SessionsConfig::default())
    }
}
