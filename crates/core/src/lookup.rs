//! Lookup collaborators — where FETCH queries go and how their answers are
//! cleaned up before the model sees them.

use async_trait::async_trait;

use crate::error::FetchError;

/// Turns an extracted query into raw text from an external data source.
///
/// Implementations must be safe to share across sessions; the dispatch loop
/// calls `fetch` at most once per run.
#[async_trait]
pub trait FetchGateway: Send + Sync {
    /// A short name for logs (e.g., "http").
    fn name(&self) -> &str;

    async fn fetch(&self, query: &str) -> std::result::Result<String, FetchError>;
}

/// Transforms raw fetched data before it is embedded in the follow-up prompt
/// (masking, relevance trimming, truncation).
///
/// Processing never fails: implementations degrade to a best-effort string.
#[async_trait]
pub trait ResultProcessor: Send + Sync {
    async fn process(&self, raw: &str, query: &str) -> String;
}

/// Passes fetched data through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityProcessor;

#[async_trait]
impl ResultProcessor for IdentityProcessor {
    async fn process(&self, raw: &str, _query: &str) -> String {
        raw.to_string()
    }
}
