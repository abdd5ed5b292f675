//! Testing utilities for Arbiter workspace
//!
//! Shared clocks, fixtures and fault-injecting collaborators.

#![allow(missing_docs)]

use arbiter_core::{
    AuditEvent, Clock, Decision, DecisionId, DecisionPatch, DecisionRepository, EscalationEntry,
    EventSink, StoreError, UpdateOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;

/// Fixed reference instant used across test suites
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn shared(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self::new(now))
    }

    pub fn advance(&self, by: TimeDelta) {
        *self.now.lock() += by;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Pending decision created `age` before `now`
pub fn decision_aged(id: &str, decision_type: &str, now: DateTime<Utc>, age: TimeDelta) -> Decision {
    Decision::new(id, decision_type, now - age)
}

/// Pending decision created `hours` before `now`
pub fn decision_aged_hours(id: &str, decision_type: &str, now: DateTime<Utc>, hours: i64) -> Decision {
    decision_aged(id, decision_type, now, TimeDelta::hours(hours))
}

/// Decision carrying an escalation from an earlier pass
pub fn previously_escalated(id: &str, decision_type: &str, now: DateTime<Utc>, hours: i64) -> Decision {
    decision_aged_hours(id, decision_type, now, hours).with_escalation(EscalationEntry::Opaque(
        serde_json::json!({ "escalated_at": (now - TimeDelta::hours(1)).to_rfc3339() }),
    ))
}

/// Kind of failure to inject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Store reports the failure
    Rejected,
    /// Store is unreachable
    Connection,
}

impl Fault {
    pub fn to_error(self, what: &str) -> StoreError {
        match self {
            Self::Rejected => StoreError::Rejected(format!("injected: {what}")),
            Self::Connection => StoreError::Connection(format!("injected: {what}")),
        }
    }
}

/// Repository wrapper that fails selected operations
#[derive(Debug)]
pub struct FaultyRepository<R> {
    inner: R,
    query_fault: Mutex<Option<Fault>>,
    update_faults: Mutex<HashMap<DecisionId, Fault>>,
    update_attempts: Mutex<Vec<DecisionId>>,
}

impl<R: DecisionRepository> FaultyRepository<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            query_fault: Mutex::new(None),
            update_faults: Mutex::new(HashMap::new()),
            update_attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_query(&self, fault: Fault) {
        *self.query_fault.lock() = Some(fault);
    }

    pub fn fail_update(&self, id: &str, fault: Fault) {
        self.update_faults.lock().insert(DecisionId::from(id), fault);
    }

    /// IDs passed to update calls, in call order
    pub fn update_attempts(&self) -> Vec<DecisionId> {
        self.update_attempts.lock().clone()
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    fn update_fault(&self, id: &DecisionId) -> Option<Fault> {
        self.update_attempts.lock().push(id.clone());
        self.update_faults.lock().get(id).copied()
    }
}

#[async_trait]
impl<R: DecisionRepository> DecisionRepository for FaultyRepository<R> {
    async fn query_pending(&self) -> Result<Vec<Decision>, StoreError> {
        let fault = *self.query_fault.lock();
        if let Some(fault) = fault {
            return Err(fault.to_error("query_pending"));
        }
        self.inner.query_pending().await
    }

    async fn update(&self, id: &DecisionId, patch: &DecisionPatch) -> Result<(), StoreError> {
        if let Some(fault) = self.update_fault(id) {
            return Err(fault.to_error(id.as_str()));
        }
        self.inner.update(id, patch).await
    }

    async fn update_if_unescalated(
        &self,
        id: &DecisionId,
        patch: &DecisionPatch,
    ) -> Result<UpdateOutcome, StoreError> {
        if let Some(fault) = self.update_fault(id) {
            return Err(fault.to_error(id.as_str()));
        }
        self.inner.update_if_unescalated(id, patch).await
    }
}

/// Sink wrapper that fails appends for selected decisions
#[derive(Debug)]
pub struct FaultySink<S> {
    inner: S,
    faults: Mutex<HashMap<String, Fault>>,
    attempts: Mutex<usize>,
}

impl<S: EventSink> FaultySink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Mutex::new(HashMap::new()),
            attempts: Mutex::new(0),
        }
    }

    pub fn fail_for(&self, decision_id: &str, fault: Fault) {
        self.faults.lock().insert(decision_id.to_string(), fault);
    }

    /// Append calls made, failed or not
    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: EventSink> EventSink for FaultySink<S> {
    async fn append(&self, event: AuditEvent) -> Result<(), StoreError> {
        *self.attempts.lock() += 1;
        let fault = self
            .faults
            .lock()
            .get(&event.event_data.decision_id)
            .copied();
        if let Some(fault) = fault {
            return Err(fault.to_error(&event.event_data.decision_id));
        }
        self.inner.append(event).await
    }
}

/// Repository that serves a fixed snapshot to `query_pending`
///
/// Models a pass that read the pending list before an overlapping pass
/// escalated some of it. Writes go to the shared inner store.
#[derive(Debug)]
pub struct StaleReadRepository<R> {
    inner: Arc<R>,
    snapshot: Vec<Decision>,
}

impl<R: DecisionRepository> StaleReadRepository<R> {
    pub fn new(inner: Arc<R>, snapshot: Vec<Decision>) -> Self {
        Self { inner, snapshot }
    }
}

#[async_trait]
impl<R: DecisionRepository> DecisionRepository for StaleReadRepository<R> {
    async fn query_pending(&self) -> Result<Vec<Decision>, StoreError> {
        Ok(self.snapshot.clone())
    }

    async fn update(&self, id: &DecisionId, patch: &DecisionPatch) -> Result<(), StoreError> {
        self.inner.update(id, patch).await
    }

    async fn update_if_unescalated(
        &self,
        id: &DecisionId,
        patch: &DecisionPatch,
    ) -> Result<UpdateOutcome, StoreError> {
        self.inner.update_if_unescalated(id, patch).await
    }
}

/// Repository whose `query_pending` waits until released
#[derive(Debug)]
pub struct GatedRepository<R> {
    inner: R,
    gate: Notify,
}

impl<R: DecisionRepository> GatedRepository<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            gate: Notify::new(),
        }
    }

    /// Let one waiting query through
    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl<R: DecisionRepository> DecisionRepository for GatedRepository<R> {
    async fn query_pending(&self) -> Result<Vec<Decision>, StoreError> {
        self.gate.notified().await;
        self.inner.query_pending().await
    }

    async fn update(&self, id: &DecisionId, patch: &DecisionPatch) -> Result<(), StoreError> {
        self.inner.update(id, patch).await
    }

    async fn update_if_unescalated(
        &self,
        id: &DecisionId,
        patch: &DecisionPatch,
    ) -> Result<UpdateOutcome, StoreError> {
        self.inner.update_if_unescalated(id, patch).await
    }
}
