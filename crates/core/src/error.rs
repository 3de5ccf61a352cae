//! Error types for the Leadline domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator has its own error enum; the orchestration engine only
//! ever surfaces [`Error`].

use thiserror::Error;

/// The top-level error type for all Leadline operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Lookup errors ---
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    // --- Profile errors ---
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Collaborator errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("{0}")]
    Network(String),

    #[error("lookup service returned status {status_code}: {message}")]
    Status { status_code: u16, message: String },

    #[error("timeout after {0}s")]
    Timeout(u64),
}

#[derive(Debug, Clone, Error)]
pub enum ProfileError {
    #[error("Profile not found for agent {0}")]
    NotFound(String),

    #[error("Profile service error: {0}")]
    Service(String),

    #[error("Malformed profile payload: {0}")]
    Malformed(String),
}
