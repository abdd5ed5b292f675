//! Collaborator contracts
//!
//! The engine owns neither store. It reads pending decisions and writes
//! patches through a [`DecisionRepository`], and appends audit events through
//! an [`EventSink`]. Neither trait offers delete or rewrite operations.

use crate::audit::AuditEvent;
use crate::error::StoreError;
use crate::types::{Decision, DecisionId, DecisionPatch};
use async_trait::async_trait;

/// Result of a conditional escalation update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Patch merged
    Applied,
    /// Another pass escalated the decision first
    AlreadyEscalated,
    /// Decision is gone or no longer pending
    NotPending,
}

/// Store of decisions awaiting arbiter action
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DecisionRepository: Send + Sync {
    /// Decisions whose status is pending
    async fn query_pending(&self) -> Result<Vec<Decision>, StoreError>;

    /// Merge a patch into a decision's mutable fields
    ///
    /// Must not clobber metadata keys the patch does not name.
    async fn update(&self, id: &DecisionId, patch: &DecisionPatch) -> Result<(), StoreError>;

    /// Merge a patch only if no escalation is recorded yet
    ///
    /// Stores that can check and write atomically should override this.
    /// The default performs a plain [`update`](Self::update), which leaves a
    /// window in which overlapping passes both escalate the same decision.
    async fn update_if_unescalated(
        &self,
        id: &DecisionId,
        patch: &DecisionPatch,
    ) -> Result<UpdateOutcome, StoreError> {
        self.update(id, patch).await?;
        Ok(UpdateOutcome::Applied)
    }
}

/// Append-only audit log
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Append one event
    async fn append(&self, event: AuditEvent) -> Result<(), StoreError>;
}
