//! Result processors: PII masking and embedding-based relevance re-ranking.

use async_trait::async_trait;
use leadline_core::lookup::ResultProcessor;
use leadline_core::provider::{EmbeddingRequest, Provider};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::mask::mask_sensitive_data;

pub const NO_RESULTS: &str = "No results found for your query.";

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1.0, 1.0]. Returns 0.0 if vectors differ in length,
/// are empty, or either has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Masks PII and otherwise passes fetched data through.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaskingProcessor;

#[async_trait]
impl ResultProcessor for MaskingProcessor {
    async fn process(&self, raw: &str, _query: &str) -> String {
        mask_sensitive_data(raw)
    }
}

/// Keeps the `top_k` fetched records most similar to the query, then masks.
pub struct RelevanceProcessor {
    provider: Arc<dyn Provider>,
    model: String,
    top_k: usize,
}

impl RelevanceProcessor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, top_k: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            top_k: top_k.max(1),
        }
    }

    /// Rank records against the query; `None` when embedding is unavailable.
    async fn rank(&self, records: &[Value], query: &str) -> Option<Vec<usize>> {
        let mut inputs: Vec<String> = records.iter().map(record_text).collect();
        inputs.push(query.to_string());

        let response = match self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs,
            })
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Embedding failed; keeping first records");
                return None;
            }
        };

        let mut embeddings = response.embeddings;
        if embeddings.len() != records.len() + 1 {
            warn!(
                expected = records.len() + 1,
                got = embeddings.len(),
                "Embedding count mismatch; keeping first records"
            );
            return None;
        }
        let query_embedding = embeddings.pop()?;

        let mut scored: Vec<(f32, usize)> = embeddings
            .iter()
            .enumerate()
            .map(|(i, e)| (cosine_similarity(&query_embedding, e), i))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        if let Some((top, _)) = scored.first() {
            info!(
                kept = scored.len().min(self.top_k),
                top_similarity = *top,
                "Re-ranked fetched records"
            );
        }

        Some(scored.into_iter().map(|(_, i)| i).collect())
    }
}

#[async_trait]
impl ResultProcessor for RelevanceProcessor {
    async fn process(&self, raw: &str, query: &str) -> String {
        let records = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => items,
            Ok(obj @ Value::Object(_)) => vec![obj],
            Ok(_) | Err(_) => {
                debug!("Fetched data is not a JSON record list; masking only");
                return mask_sensitive_data(raw);
            }
        };

        if records.is_empty() {
            return NO_RESULTS.to_string();
        }

        let selected: Vec<&Value> = match self.rank(&records, query).await {
            Some(order) => order
                .into_iter()
                .take(self.top_k)
                .map(|i| &records[i])
                .collect(),
            None => records.iter().take(self.top_k).collect(),
        };

        match serde_json::to_string_pretty(&selected) {
            Ok(pretty) => mask_sensitive_data(&pretty),
            Err(_) => mask_sensitive_data(raw),
        }
    }
}

/// Searchable text for one fetched record.
fn record_text(record: &Value) -> String {
    let field = |keys: &[&str]| {
        keys.iter()
            .filter_map(|k| record.get(*k))
            .filter_map(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .next()
    };

    let mut parts = Vec::new();
    if let Some(name) = field(&["FullName", "full_name"]) {
        parts.push(format!("Name: {name}"));
    }
    if let Some(address) = field(&["FullAddress", "full_address"]) {
        parts.push(format!("Address: {address}"));
    }
    if let Some(phone) = field(&["PhoneMobile", "phone2_mobile", "PhoneLandline", "phone1_landline"]) {
        parts.push(format!("Phone: {phone}"));
    }
    if let Some(email) = field(&["EmailAddress", "emailaddress"]) {
        parts.push(format!("Email: {email}"));
    }

    if parts.is_empty() {
        // Embedding endpoints reject empty input
        record.to_string()
    } else {
        parts.join(". ")
    }
}
