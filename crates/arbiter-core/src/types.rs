//! Core types for Arbiter
//!
//! Defines the entities the engine observes and mutates:
//! - Decisions awaiting a human arbiter and their metadata
//! - Escalation records written into decision metadata
//! - Structured patches applied through the decision repository

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

/// Opaque decision identifier assigned by the owning workflow
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionId(pub String);

impl DecisionId {
    /// Wrap an identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DecisionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DecisionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DecisionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Venture correlation identifier, carried into audit events uninterpreted
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VentureId(pub String);

impl std::fmt::Display for VentureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Audit event identifier (UUID v4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Generate a fresh event ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a decision as recorded by the owning workflow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// Awaiting arbiter action
    #[default]
    Pending,
    /// Approved by the arbiter
    Approved,
    /// Rejected by the arbiter
    Rejected,
    /// Deferred by the arbiter
    Deferred,
}

/// Escalation posture applied to an overdue decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStrategy {
    /// Flag and audit only
    EscalateNotify,
    /// Flag, audit and mark the decision blocking
    BlockAndEscalate,
}

impl EscalationStrategy {
    /// Strategy for the given blocking mode
    #[inline]
    #[must_use]
    pub fn for_mode(block_on_violation: bool) -> Self {
        if block_on_violation {
            Self::BlockAndEscalate
        } else {
            Self::EscalateNotify
        }
    }

    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EscalateNotify => "escalate_notify",
            Self::BlockAndEscalate => "block_and_escalate",
        }
    }

    /// Whether this strategy transitions the decision to blocking
    #[inline]
    #[must_use]
    pub fn blocks(self) -> bool {
        matches!(self, Self::BlockAndEscalate)
    }
}

impl std::fmt::Display for EscalationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record written into `metadata.escalation` when a decision is escalated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    /// When the escalation happened
    pub escalated_at: DateTime<Utc>,
    /// Decision age at escalation, hours to one decimal
    pub age_hours: f64,
    /// Applicable SLA, hours to one decimal
    pub sla_hours: f64,
    /// Strategy applied
    pub strategy: EscalationStrategy,
    /// Always true
    pub sla_violated: bool,
}

impl EscalationRecord {
    /// Build a record for an SLA violation
    #[must_use]
    pub fn new(
        escalated_at: DateTime<Utc>,
        age: Duration,
        sla: Duration,
        strategy: EscalationStrategy,
    ) -> Self {
        Self {
            escalated_at,
            age_hours: hours_one_decimal(age),
            sla_hours: hours_one_decimal(sla),
            strategy,
            sla_violated: true,
        }
    }
}

/// Contents of `metadata.escalation`
///
/// Anything present under the key counts as a prior escalation, including
/// shapes written by older tooling that this crate does not model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EscalationEntry {
    /// Record written by this engine
    Recorded(EscalationRecord),
    /// Foreign shape, preserved verbatim
    Opaque(Value),
}

/// Mutable side record of a decision
///
/// The engine reads `escalation` and writes `escalation`,
/// `requires_urgent_review` and `sla_violated`. Every other key belongs to the
/// caller and round-trips untouched through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetadata {
    /// Prior escalation, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationEntry>,
    /// Set on escalation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_urgent_review: Option<bool>,
    /// Set on escalation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_violated: Option<bool>,
    /// Caller-owned keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DecisionMetadata {
    /// Whether a prior escalation is recorded
    #[inline]
    #[must_use]
    pub fn is_escalated(&self) -> bool {
        self.escalation.is_some()
    }

    /// Typed escalation record, if this engine wrote it
    #[must_use]
    pub fn escalation_record(&self) -> Option<&EscalationRecord> {
        match &self.escalation {
            Some(EscalationEntry::Recorded(record)) => Some(record),
            _ => None,
        }
    }
}

/// A unit of work awaiting a human arbiter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Unique identifier
    pub id: DecisionId,
    /// SLA lookup key; not a closed set
    pub decision_type: String,
    /// When the decision entered the pending state
    pub created_at: DateTime<Utc>,
    /// Workflow status
    #[serde(default)]
    pub status: DecisionStatus,
    /// Already under direct arbiter control
    #[serde(default)]
    pub blocking: bool,
    /// Correlation identifier for audit events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venture_id: Option<VentureId>,
    /// Side record
    #[serde(default)]
    pub metadata: DecisionMetadata,
}

impl Decision {
    /// Create a pending, non-blocking decision with empty metadata
    #[must_use]
    pub fn new(
        id: impl Into<DecisionId>,
        decision_type: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            decision_type: decision_type.into(),
            created_at,
            status: DecisionStatus::Pending,
            blocking: false,
            venture_id: None,
            metadata: DecisionMetadata::default(),
        }
    }

    /// With blocking flag
    #[inline]
    #[must_use]
    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// With venture correlation ID
    #[inline]
    #[must_use]
    pub fn with_venture(mut self, venture_id: impl Into<String>) -> Self {
        self.venture_id = Some(VentureId(venture_id.into()));
        self
    }

    /// With status
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: DecisionStatus) -> Self {
        self.status = status;
        self
    }

    /// With a caller-owned metadata entry
    #[inline]
    #[must_use]
    pub fn with_metadata_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.extra.insert(key.into(), value);
        self
    }

    /// With a prior escalation already recorded
    #[inline]
    #[must_use]
    pub fn with_escalation(mut self, entry: EscalationEntry) -> Self {
        self.metadata.escalation = Some(entry);
        self
    }

    /// Whether the decision is awaiting arbiter action
    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == DecisionStatus::Pending
    }
}

/// Fields the engine changes on escalation
///
/// Applying a patch merges into the decision; metadata keys not named here
/// are never touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPatch {
    /// Escalation record to store
    pub escalation: EscalationRecord,
    /// Always true
    pub requires_urgent_review: bool,
    /// Always true
    pub sla_violated: bool,
    /// `Some(true)` in blocking mode, otherwise left alone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking: Option<bool>,
}

impl DecisionPatch {
    /// Patch for an escalation record; the strategy decides `blocking`
    #[must_use]
    pub fn escalate(record: EscalationRecord) -> Self {
        let blocking = record.strategy.blocks().then_some(true);
        Self {
            escalation: record,
            requires_urgent_review: true,
            sla_violated: true,
            blocking,
        }
    }

    /// Merge this patch into a decision
    pub fn apply_to(&self, decision: &mut Decision) {
        let metadata = &mut decision.metadata;
        metadata.escalation = Some(EscalationEntry::Recorded(self.escalation.clone()));
        metadata.requires_urgent_review = Some(self.requires_urgent_review);
        metadata.sla_violated = Some(self.sla_violated);
        if let Some(blocking) = self.blocking {
            decision.blocking = blocking;
        }
    }
}

/// Duration in hours, rounded to one decimal place
#[inline]
#[must_use]
pub fn hours_one_decimal(duration: Duration) -> f64 {
    let hours = duration.as_secs_f64() / 3600.0;
    (hours * 10.0).round() / 10.0
}
