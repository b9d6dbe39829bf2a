//! Human review of machine-generated proposals.
//!
//! A proposal leaves `pending_review` exactly once. The transition is a
//! guarded UPDATE in the store, so a concurrent or repeated decision on the
//! same proposal is a no-op reported as `false`, not an error, and never
//! touches human-authored annotations.

use rusqlite::Connection;

use crate::error::AnnotationError;
use crate::store::AnnotationStore;
use crate::types::{ProposalView, ReviewDecision, ReviewOutcome};

pub struct ReviewService<'a> {
    store: &'a dyn AnnotationStore,
}

impl<'a> ReviewService<'a> {
    pub fn new(store: &'a dyn AnnotationStore) -> Self {
        Self { store }
    }

    /// Pending machine proposals with their item text and label name,
    /// optionally scoped to one source.
    pub fn list_pending(
        &self,
        conn: &Connection,
        source_id: Option<i64>,
    ) -> Result<Vec<ProposalView>, AnnotationError> {
        self.store.list_pending(conn, source_id)
    }

    /// Apply one decision. Returns `false` when the proposal was already
    /// reviewed, deleted, or is not a machine proposal.
    pub fn review_one(
        &self,
        conn: &Connection,
        proposal_id: i64,
        decision: ReviewDecision,
        reviewer_id: i64,
    ) -> Result<bool, AnnotationError> {
        let changed = self.store.update_proposal_status(
            conn,
            proposal_id,
            decision.target_status(),
            reviewer_id,
        )?;
        if changed {
            tracing::info!(
                proposal_id,
                decision = ?decision,
                reviewer_id,
                "proposal reviewed"
            );
        } else {
            tracing::debug!(proposal_id, "proposal not pending, decision ignored");
        }
        Ok(changed)
    }

    /// Apply one decision to many proposals, best effort. A proposal that
    /// no longer qualifies is skipped; storage failures are logged and
    /// counted, never abort the rest of the batch.
    pub fn review_batch(
        &self,
        conn: &Connection,
        proposal_ids: &[i64],
        decision: ReviewDecision,
        reviewer_id: i64,
    ) -> ReviewOutcome {
        let mut succeeded = 0;
        for &id in proposal_ids {
            match self.review_one(conn, id, decision, reviewer_id) {
                Ok(true) => succeeded += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(proposal_id = id, error = %e, "review failed");
                }
            }
        }
        ReviewOutcome {
            succeeded,
            total: proposal_ids.len() as u32,
        }
    }
}
