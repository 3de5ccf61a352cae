//! # Leadline Lookup
//!
//! Adapters for the collaborators the dispatch loop talks to between model
//! invocations:
//!
//! - [`HttpFetchGateway`]: answers FETCH queries from the search service
//! - [`HttpProfileProvider`]: resolves agent profiles
//! - [`MaskingProcessor`] / [`RelevanceProcessor`]: clean fetched records
//!   before they reach the model

pub mod fetch;
pub mod mask;
pub mod profile;
pub mod relevance;

pub use fetch::HttpFetchGateway;
pub use mask::mask_sensitive_data;
pub use profile::HttpProfileProvider;
pub use relevance::{MaskingProcessor, RelevanceProcessor, cosine_similarity};

use std::sync::Arc;

use leadline_core::{Provider, ResultProcessor};

/// Pick the result processor the configuration asks for.
///
/// Re-ranking needs a provider that can embed; without one, fetched data is
/// only masked.
pub fn processor_from_config(
    config: &leadline_config::AppConfig,
    embedder: Option<Arc<dyn Provider>>,
) -> Arc<dyn ResultProcessor> {
    match embedder {
        Some(provider) if config.embeddings.enabled => Arc::new(RelevanceProcessor::new(
            provider,
            config.embeddings.model.clone(),
            config.embeddings.top_k,
        )),
        _ => {
            if config.embeddings.enabled {
                tracing::warn!("Embeddings enabled but no provider available; masking only");
            }
            Arc::new(MaskingProcessor)
        }
    }
}
