//! Core types for the annotation pipeline.
//!
//! These model the full lifecycle:
//! Taxonomy + Items → Prompt → Provider reply → Proposal → Review decision.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Timestamp format used for all stored times.
pub fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// ═══════════════════════════════════════════
// Provider
// ═══════════════════════════════════════════

/// The two supported chat-completion backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Local inference server (Ollama wire protocol).
    Ollama,
    /// Hosted multi-model gateway (OpenAI-style wire protocol).
    OpenRouter,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenRouter => "openrouter",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ollama" => Some(Self::Ollama),
            "openrouter" => Some(Self::OpenRouter),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored provider configuration. At most one row is active at a time;
/// activation is a single transaction that clears every other active flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: i64,
    pub provider: ProviderKind,
    /// Base URL of the inference server (required for the local backend).
    pub base_url: Option<String>,
    /// API key (required for the hosted gateway).
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// System message sent ahead of the annotation prompt.
    pub system_prompt: Option<String>,
    /// Preferred instruction template; falls back to the first active one.
    pub template_id: Option<i64>,
    pub is_active: bool,
}

// ═══════════════════════════════════════════
// Taxonomy
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub category_id: Option<i64>,
    pub is_active: bool,
}

/// A label as offered to the model: resolved category name plus how often
/// the label has been used, which feeds the prompt's usage hints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelInfo {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Category name; uncategorized labels report `None` and are grouped
    /// under a generic section by the prompt builder.
    pub category: Option<String>,
    pub usage_count: i64,
}

// ═══════════════════════════════════════════
// Items
// ═══════════════════════════════════════════

/// An opaque text unit owned by the upload layer; read-only to this core.
#[derive(Debug, Clone)]
pub struct AnnotatableItem {
    pub id: i64,
    /// The uploaded source (file) this item belongs to.
    pub source_id: i64,
    pub content: String,
}

/// Item-selection strategy for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Only items with no active or pending proposals.
    New,
    /// All items; new proposals co-exist with prior ones.
    Additional,
    /// All items; prior machine proposals are deleted as replacements land.
    Replace,
}

impl SelectionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Additional => "additional",
            Self::Replace => "replace",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "additional" => Some(Self::Additional),
            "replace" => Some(Self::Replace),
            _ => None,
        }
    }
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Prompt templates
// ═══════════════════════════════════════════

/// Instruction preamble selected per run; immutable at use time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub body: String,
    pub is_active: bool,
}

// ═══════════════════════════════════════════
// Proposals
// ═══════════════════════════════════════════

/// Review lifecycle of a machine-generated proposal.
///
/// Proposals are born `PendingReview` and leave it exactly once, through a
/// review decision. Human-authored annotations never enter this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    PendingReview,
    Active,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingReview => "pending_review",
            Self::Active => "active",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_review" => Some(Self::PendingReview),
            "active" => Some(Self::Active),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reviewer verdict on a pending proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Accept,
    Reject,
}

impl ReviewDecision {
    /// Status a pending proposal transitions to under this decision.
    pub fn target_status(&self) -> ProposalStatus {
        match self {
            Self::Accept => ProposalStatus::Active,
            Self::Reject => ProposalStatus::Rejected,
        }
    }
}

/// A machine-generated candidate annotation awaiting (or past) review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationProposal {
    pub id: i64,
    pub item_id: i64,
    pub label_id: i64,
    /// The synthetic system identity that authored the proposal.
    pub user_id: i64,
    pub confidence: f32,
    pub model: String,
    pub provider: ProviderKind,
    pub status: ProposalStatus,
    pub created_at: String,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<String>,
}

/// Insert shape for a proposal. The store stamps status and creation time;
/// a proposal is never created in any state other than pending review.
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub item_id: i64,
    pub label_id: i64,
    pub user_id: i64,
    pub confidence: f32,
    pub model: String,
    pub provider: ProviderKind,
}

/// Pending proposal joined with its item text and label name, for review UIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalView {
    pub id: i64,
    pub item_id: i64,
    pub text: String,
    pub label: String,
    pub confidence: f32,
    pub model: String,
    pub provider: ProviderKind,
    pub created_at: String,
}

// ═══════════════════════════════════════════
// Run results
// ═══════════════════════════════════════════

/// Per-batch diagnostics from one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// 1-based position of the batch within the run.
    pub index: usize,
    pub items: usize,
    pub proposals: u32,
    /// Set when the batch was abandoned after retries; other batches proceed.
    pub error: Option<String>,
}

/// Aggregate result of one orchestrator invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub policy: SelectionPolicy,
    pub processed: u32,
    pub proposals_created: u32,
    pub batches: Vec<BatchOutcome>,
    /// Human-readable note ("nothing to do", etc.); not an error channel.
    pub note: Option<String>,
}

impl RunSummary {
    pub fn empty(run_id: String, policy: SelectionPolicy) -> Self {
        Self {
            run_id,
            policy,
            processed: 0,
            proposals_created: 0,
            batches: Vec::new(),
            note: None,
        }
    }

    /// True if any batch was abandoned.
    pub fn has_failures(&self) -> bool {
        self.batches.iter().any(|b| b.error.is_some())
    }
}

/// Outcome of a best-effort batch review.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub succeeded: u32,
    pub total: u32,
}
