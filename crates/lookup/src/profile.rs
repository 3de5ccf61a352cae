//! HTTP profile provider — `GET {url}/api/profile/{agent_id}`.

use async_trait::async_trait;
use leadline_core::error::ProfileError;
use leadline_core::profile::{AgentProfile, ProfileProvider};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

pub struct HttpProfileProvider {
    base_url: String,
    client: reqwest::Client,
}

impl HttpProfileProvider {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn from_config(config: &leadline_config::ProfileConfig) -> Self {
        Self::new(&config.url, config.timeout_secs)
    }

    /// `{base}/api/profile/{agent_id}` with the id encoded as one segment.
    fn profile_url(&self, agent_id: &str) -> Result<reqwest::Url, ProfileError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ProfileError::Service(format!("invalid profile service url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ProfileError::Service("profile service url cannot take a path".into()))?
            .pop_if_empty()
            .extend(["api", "profile", agent_id]);
        Ok(url)
    }
}

#[async_trait]
impl ProfileProvider for HttpProfileProvider {
    async fn resolve(&self, agent_id: &str) -> Result<AgentProfile, ProfileError> {
        if matches!(agent_id, "" | "." | "..") {
            return Err(ProfileError::NotFound(agent_id.to_string()));
        }
        let url = self.profile_url(agent_id)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProfileError::Service(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            warn!(agent_id = %agent_id, "Profile not found");
            return Err(ProfileError::NotFound(agent_id.to_string()));
        }
        if !status.is_success() {
            return Err(ProfileError::Service(format!(
                "profile service returned status {}",
                status.as_u16()
            )));
        }

        let payload: ProfilePayload = response
            .json()
            .await
            .map_err(|e| ProfileError::Malformed(e.to_string()))?;

        let profile = payload.into_profile(agent_id);
        info!(
            agent_id = %agent_id,
            name = %profile.agent_name,
            location = %profile.location,
            listings = profile.listings.len(),
            "Resolved agent profile"
        );
        Ok(profile)
    }
}

// --- Profile service wire types ---

#[derive(Debug, Default, Deserialize)]
struct ProfilePayload {
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    areas: Vec<AreaPayload>,
    #[serde(default)]
    listings: Vec<ListingPayload>,
}

#[derive(Debug, Deserialize)]
struct AreaPayload {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListingPayload {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    suburb: Option<String>,
}

impl ProfilePayload {
    fn into_profile(self, agent_id: &str) -> AgentProfile {
        let first = self.first_name.unwrap_or_default();
        let last = self.last_name.unwrap_or_default();
        let agent_name = if first.is_empty() && last.is_empty() {
            self.agent_id.unwrap_or_else(|| agent_id.to_string())
        } else {
            format!("{first} {last}").trim().to_string()
        };

        let location = self
            .areas
            .into_iter()
            .next()
            .and_then(|a| a.name)
            .unwrap_or_default();

        let listings = self
            .listings
            .into_iter()
            .filter_map(|l| {
                let address = l.address.unwrap_or_default();
                let suburb = l.suburb.unwrap_or_default();
                match (address.is_empty(), suburb.is_empty()) {
                    (true, _) => None,
                    (false, true) => Some(address),
                    (false, false) => Some(format!("{address}, {suburb}")),
                }
            })
            .collect();

        AgentProfile::new(agent_id, agent_name, location, listings)
    }
}
