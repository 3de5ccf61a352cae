//! # Leadline Core
//!
//! Domain types, collaborator traits, and error definitions for the Leadline
//! chat orchestration engine. This crate has **no framework dependencies**:
//! it defines the model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (LLM backend, data lookup, result processing,
//! profile service) is a trait here. Implementations live in their own
//! crates, which keeps the orchestration engine testable with scripted stubs
//! and lets deployments swap backends through configuration.

pub mod error;
pub mod event;
pub mod ledger;
pub mod lookup;
pub mod message;
pub mod profile;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{Error, FetchError, ProfileError, ProviderError, Result};
pub use event::{DomainEvent, EventBus};
pub use ledger::{LedgerSnapshot, TokenLedger};
pub use lookup::{FetchGateway, IdentityProcessor, ResultProcessor};
pub use message::{ConversationMemory, Message, Role};
pub use profile::{AgentProfile, ProfileProvider, StaticProfileProvider};
pub use provider::{
    EmbeddingRequest, EmbeddingResponse, ModelBinding, ModelFactory, Provider, ProviderRequest,
    ProviderResponse, StreamChunk, Usage, UsageAccuracy, UsageReporting,
};
