//! Agent profile — the per-session context baked into the system preamble.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProfileError;

/// Who the assistant is working with: name, area, and current listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_id: String,
    pub agent_name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub listings: Vec<String>,
}

impl AgentProfile {
    pub fn new(
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        location: impl Into<String>,
        listings: Vec<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            location: location.into(),
            listings,
        }
    }

    /// Profile used when the profile service has nothing for this id:
    /// the id doubles as the name, with no location or listings.
    pub fn fallback(agent_id: &str) -> Self {
        Self::new(agent_id, agent_id, "", Vec::new())
    }

    /// Listings joined for inclusion in a prompt.
    pub fn listings_text(&self) -> String {
        self.listings.join(", ")
    }
}

/// Resolves an agent id into a profile.
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    async fn resolve(&self, agent_id: &str) -> std::result::Result<AgentProfile, ProfileError>;
}

/// Always answers with [`AgentProfile::fallback`]. Used when no profile
/// service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticProfileProvider;

#[async_trait]
impl ProfileProvider for StaticProfileProvider {
    async fn resolve(&self, agent_id: &str) -> std::result::Result<AgentProfile, ProfileError> {
        Ok(AgentProfile::fallback(agent_id))
    }
}
