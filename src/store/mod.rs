//! Persistence interface consumed by the pipeline.
//!
//! The annotation core never talks SQL directly: the orchestrator and the
//! review service go through [`AnnotationStore`]. The taxonomy and item
//! tables belong to the surrounding application and are read-only here; the
//! only rows this core writes are proposal rows and their status stamps.

pub mod sqlite;

pub use sqlite::SqliteAnnotationStore;

use rusqlite::Connection;

use crate::error::AnnotationError;
use crate::types::{
    AnnotatableItem, LabelInfo, NewProposal, PromptTemplate, ProposalStatus, ProposalView,
    ProviderConfig, SelectionPolicy,
};

/// Transactional primitives over the annotation store.
pub trait AnnotationStore: Send + Sync {
    /// The single active provider configuration, if any.
    fn get_active_provider_config(
        &self,
        conn: &Connection,
    ) -> Result<Option<ProviderConfig>, AnnotationError>;

    /// Make one configuration active and every other inactive, atomically.
    fn activate_provider_config(&self, conn: &Connection, id: i64)
        -> Result<(), AnnotationError>;

    /// Active labels with resolved category names and usage counts,
    /// optionally restricted to the named categories.
    fn get_active_labels(
        &self,
        conn: &Connection,
        categories: Option<&[String]>,
    ) -> Result<Vec<LabelInfo>, AnnotationError>;

    /// Template by id, falling back to the first active template; `None`
    /// only when the template table is empty.
    fn get_template(
        &self,
        conn: &Connection,
        template_id: Option<i64>,
    ) -> Result<Option<PromptTemplate>, AnnotationError>;

    /// Target items for a run under the given policy, in stable id order.
    fn select_items(
        &self,
        conn: &Connection,
        source_id: i64,
        policy: SelectionPolicy,
    ) -> Result<Vec<AnnotatableItem>, AnnotationError>;

    /// Persist one batch's proposals in a single transaction. Under the
    /// replace policy, each touched item's prior machine proposals are
    /// deleted inside the same transaction before its new rows land.
    /// Returns the number of proposals created.
    fn persist_proposals(
        &self,
        conn: &Connection,
        proposals: &[NewProposal],
        replace: bool,
    ) -> Result<u32, AnnotationError>;

    fn delete_proposal(&self, conn: &Connection, id: i64) -> Result<(), AnnotationError>;

    /// Guarded status transition: only machine-generated proposals still in
    /// pending review move. Returns whether a row actually changed.
    fn update_proposal_status(
        &self,
        conn: &Connection,
        id: i64,
        status: ProposalStatus,
        reviewer_id: i64,
    ) -> Result<bool, AnnotationError>;

    /// Pending machine proposals joined with item text and label name,
    /// optionally scoped to one source.
    fn list_pending(
        &self,
        conn: &Connection,
        source_id: Option<i64>,
    ) -> Result<Vec<ProposalView>, AnnotationError>;

    /// Id of the synthetic reviewer identity attributed to machine
    /// proposals, created on first use.
    fn get_or_create_system_user(&self, conn: &Connection) -> Result<i64, AnnotationError>;
}
