//! AI-assisted annotation pipeline for collaborative text analysis.
//!
//! Turns uploaded text items plus a label taxonomy into machine-generated
//! annotation proposals via an LLM provider, every one of which lands in
//! `pending_review` until a human accepts or rejects it.
//!
//! The flow, end to end:
//!
//! 1. [`store`] selects target items under a [`types::SelectionPolicy`].
//! 2. [`prompt`] renders the taxonomy and a numbered batch of texts.
//! 3. [`provider`] dispatches the chat request (Ollama or OpenRouter).
//! 4. [`parser`] digs a JSON annotation array out of the free-text reply.
//! 5. [`resolver`] matches parsed label names against the live taxonomy.
//! 6. [`orchestrator`] drives the batches, contains failures, persists.
//! 7. [`review`] applies human accept/reject decisions.

pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod provider;
pub mod resolver;
pub mod review;
pub mod store;
pub mod types;

pub use error::AnnotationError;
pub use orchestrator::{BatchOrchestrator, RetryPolicy, RunOptions};
pub use provider::{ChatClient, ChatMessage};
pub use review::ReviewService;
pub use store::{AnnotationStore, SqliteAnnotationStore};
pub use types::{
    AnnotationProposal, ProposalStatus, ProviderConfig, ProviderKind, ReviewDecision, RunSummary,
    SelectionPolicy,
};
