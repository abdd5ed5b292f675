//! In-process collaborators
//!
//! Used by embedders that keep decisions in memory and by the test suites.
//! Both types are cheap to share behind an `Arc`.

use crate::audit::{AuditChain, AuditEvent, SealedEvent};
use crate::error::{AuditChainError, StoreError};
use crate::store::{DecisionRepository, EventSink, UpdateOutcome};
use crate::types::{Decision, DecisionId, DecisionPatch};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

/// Decision store keyed by ID, iterated in insertion order
#[derive(Debug, Default)]
pub struct InMemoryDecisionRepository {
    decisions: RwLock<IndexMap<DecisionId, Decision>>,
}

impl InMemoryDecisionRepository {
    /// Create empty repository
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create repository holding the given decisions
    #[must_use]
    pub fn with_decisions(decisions: impl IntoIterator<Item = Decision>) -> Self {
        let repo = Self::new();
        for decision in decisions {
            repo.insert(decision);
        }
        repo
    }

    /// Insert or replace a decision
    pub fn insert(&self, decision: Decision) {
        self.decisions.write().insert(decision.id.clone(), decision);
    }

    /// Snapshot of one decision
    #[must_use]
    pub fn get(&self, id: &DecisionId) -> Option<Decision> {
        self.decisions.read().get(id).cloned()
    }

    /// Snapshot of every decision, pending or not
    #[must_use]
    pub fn all(&self) -> Vec<Decision> {
        self.decisions.read().values().cloned().collect()
    }

    /// Number of stored decisions
    #[must_use]
    pub fn len(&self) -> usize {
        self.decisions.read().len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decisions.read().is_empty()
    }
}

#[async_trait]
impl DecisionRepository for InMemoryDecisionRepository {
    async fn query_pending(&self) -> Result<Vec<Decision>, StoreError> {
        Ok(self
            .decisions
            .read()
            .values()
            .filter(|d| d.is_pending())
            .cloned()
            .collect())
    }

    async fn update(&self, id: &DecisionId, patch: &DecisionPatch) -> Result<(), StoreError> {
        let mut guard = self.decisions.write();
        let decision = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply_to(decision);
        Ok(())
    }

    async fn update_if_unescalated(
        &self,
        id: &DecisionId,
        patch: &DecisionPatch,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut guard = self.decisions.write();
        let Some(decision) = guard.get_mut(id).filter(|d| d.is_pending()) else {
            return Ok(UpdateOutcome::NotPending);
        };
        if decision.metadata.is_escalated() {
            return Ok(UpdateOutcome::AlreadyEscalated);
        }
        patch.apply_to(decision);
        Ok(UpdateOutcome::Applied)
    }
}

/// Append-only event log sealed into a hash chain
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    inner: Mutex<SinkState>,
}

#[derive(Debug, Default)]
struct SinkState {
    chain: AuditChain,
    entries: Vec<SealedEvent>,
}

impl InMemoryEventSink {
    /// Create empty sink
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appended events, oldest first
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|e| e.event.clone())
            .collect()
    }

    /// Sealed entries, oldest first
    #[must_use]
    pub fn sealed(&self) -> Vec<SealedEvent> {
        self.inner.lock().entries.clone()
    }

    /// Number of appended events
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether nothing was appended
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Re-check the hash chain
    ///
    /// # Errors
    /// Returns the first broken link.
    pub fn verify_integrity(&self) -> Result<(), AuditChainError> {
        AuditChain::verify(&self.inner.lock().entries)
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn append(&self, event: AuditEvent) -> Result<(), StoreError> {
        let mut guard = self.inner.lock();
        let sealed = guard.chain.seal(event)?;
        guard.entries.push(sealed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DecisionStatus, EscalationRecord, EscalationStrategy};
    use chrono::{TimeDelta, Utc};
    use serde_json::json;
    use std::time::Duration;

    fn patch(strategy: EscalationStrategy) -> DecisionPatch {
        DecisionPatch::escalate(EscalationRecord::new(
            Utc::now(),
            Duration::from_secs(5 * 3600),
            Duration::from_secs(4 * 3600),
            strategy,
        ))
    }

    fn decision(id: &str) -> Decision {
        Decision::new(id, "gate_decision", Utc::now() - TimeDelta::hours(5))
    }

    #[tokio::test]
    async fn query_returns_only_pending_in_order() {
        let repo = InMemoryDecisionRepository::with_decisions([
            decision("d-1"),
            decision("d-2").with_status(DecisionStatus::Approved),
            decision("d-3"),
        ]);

        let pending = repo.query_pending().await.unwrap();
        let ids: Vec<_> = pending.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["d-1", "d-3"]);
    }

    #[tokio::test]
    async fn update_merges_metadata() {
        let repo = InMemoryDecisionRepository::with_decisions([
            decision("d-1").with_metadata_entry("owner", json!("ops"))
        ]);
        let id = DecisionId::from("d-1");

        repo.update(&id, &patch(EscalationStrategy::BlockAndEscalate))
            .await
            .unwrap();

        let stored = repo.get(&id).unwrap();
        assert!(stored.blocking);
        assert!(stored.metadata.is_escalated());
        assert_eq!(stored.metadata.extra["owner"], json!("ops"));
    }

    #[tokio::test]
    async fn update_missing_decision_is_reported() {
        let repo = InMemoryDecisionRepository::new();
        let err = repo
            .update(&DecisionId::from("nope"), &patch(EscalationStrategy::EscalateNotify))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn conditional_update_applies_once() {
        let repo = InMemoryDecisionRepository::with_decisions([decision("d-1")]);
        let id = DecisionId::from("d-1");
        let p = patch(EscalationStrategy::EscalateNotify);

        assert_eq!(
            repo.update_if_unescalated(&id, &p).await.unwrap(),
            UpdateOutcome::Applied
        );
        assert_eq!(
            repo.update_if_unescalated(&id, &p).await.unwrap(),
            UpdateOutcome::AlreadyEscalated
        );
    }

    #[tokio::test]
    async fn conditional_update_skips_resolved() {
        let repo = InMemoryDecisionRepository::with_decisions([
            decision("d-1").with_status(DecisionStatus::Rejected)
        ]);
        let p = patch(EscalationStrategy::EscalateNotify);

        assert_eq!(
            repo.update_if_unescalated(&DecisionId::from("d-1"), &p)
                .await
                .unwrap(),
            UpdateOutcome::NotPending
        );
        assert_eq!(
            repo.update_if_unescalated(&DecisionId::from("gone"), &p)
                .await
                .unwrap(),
            UpdateOutcome::NotPending
        );
    }

    #[tokio::test]
    async fn sink_chains_events() {
        let sink = InMemoryEventSink::new();
        let p = patch(EscalationStrategy::BlockAndEscalate);
        for id in ["d-1", "d-2"] {
            let event = AuditEvent::sla_escalation(
                &decision(id),
                &p.escalation,
                Duration::from_secs(4 * 3600),
            );
            sink.append(event).await.unwrap();
        }

        assert_eq!(sink.len(), 2);
        let sealed = sink.sealed();
        assert_eq!(sealed[1].prev_hash, sealed[0].hash);
        assert!(sink.verify_integrity().is_ok());
    }
}
