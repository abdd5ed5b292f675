//! Audit events
//!
//! One immutable event is appended per escalation. Sinks that persist events
//! seal them into a SHA-256 hash chain so later tampering is detectable.

use crate::error::AuditChainError;
use crate::types::{Decision, EscalationRecord, EscalationStrategy, EventId, VentureId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Event type for SLA escalations
pub const SLA_ESCALATION_EVENT: &str = "chairman_sla_escalation";

/// Source tag for events written by this engine
pub const EVENT_SOURCE: &str = "chairman_sla_enforcer";

/// Payload of an SLA escalation event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationEventData {
    /// Escalated decision
    pub decision_id: String,
    /// Its type
    pub decision_type: String,
    /// Applicable SLA in milliseconds
    pub sla_ms: u64,
    /// Age at escalation, hours to one decimal
    pub age_hours: f64,
    /// Strategy applied
    pub strategy: EscalationStrategy,
    /// Escalation time
    pub escalated_at: DateTime<Utc>,
}

/// Append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Fresh per event
    pub event_id: EventId,
    /// Event kind
    pub event_type: String,
    /// Writer
    pub event_source: String,
    /// Venture correlation, if the decision carried one
    pub venture_id: Option<VentureId>,
    /// Payload
    pub event_data: EscalationEventData,
    /// Always true for escalations
    pub chairman_flagged: bool,
    /// Write time
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Build the escalation event for a decision
    #[must_use]
    pub fn sla_escalation(decision: &Decision, record: &EscalationRecord, sla: Duration) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: SLA_ESCALATION_EVENT.to_string(),
            event_source: EVENT_SOURCE.to_string(),
            venture_id: decision.venture_id.clone(),
            event_data: EscalationEventData {
                decision_id: decision.id.to_string(),
                decision_type: decision.decision_type.clone(),
                sla_ms: u64::try_from(sla.as_millis()).unwrap_or(u64::MAX),
                age_hours: record.age_hours,
                strategy: record.strategy,
                escalated_at: record.escalated_at,
            },
            chairman_flagged: true,
            created_at: record.escalated_at,
        }
    }
}

/// Audit event sealed into a hash chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedEvent {
    /// The event as written
    #[serde(flatten)]
    pub event: AuditEvent,
    /// Hash of the previous entry, hex
    pub prev_hash: String,
    /// Hash of this entry, hex
    pub hash: String,
}

/// Running head of a hash chain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditChain {
    head: [u8; 32],
}

impl AuditChain {
    /// Chain continuing from the given entry, or a fresh chain
    ///
    /// # Errors
    /// Returns `AuditChainError::MalformedHash` if the entry's hash is not
    /// 32 bytes of hex.
    pub fn resume(last: Option<&SealedEvent>) -> Result<Self, AuditChainError> {
        let head = match last {
            Some(entry) => decode_hash(&entry.hash, 0)?,
            None => [0u8; 32],
        };
        Ok(Self { head })
    }

    /// Seal an event onto the chain
    ///
    /// # Errors
    /// Returns `AuditChainError::Encoding` if the event cannot be serialized.
    pub fn seal(&mut self, event: AuditEvent) -> Result<SealedEvent, AuditChainError> {
        let prev = self.head;
        let hash = compute_hash(&prev, &event)?;
        self.head = hash;

        Ok(SealedEvent {
            event,
            prev_hash: hex::encode(prev),
            hash: hex::encode(hash),
        })
    }

    /// Verify a full chain from genesis
    ///
    /// # Errors
    /// Returns `AuditChainError::Broken` with the index of the first entry
    /// whose links or content do not match.
    pub fn verify(entries: &[SealedEvent]) -> Result<(), AuditChainError> {
        let mut prev = [0u8; 32];
        for (index, entry) in entries.iter().enumerate() {
            if decode_hash(&entry.prev_hash, index)? != prev {
                return Err(AuditChainError::Broken { index });
            }
            let expected = compute_hash(&prev, &entry.event)?;
            if decode_hash(&entry.hash, index)? != expected {
                return Err(AuditChainError::Broken { index });
            }
            prev = expected;
        }
        Ok(())
    }
}

fn compute_hash(prev: &[u8; 32], event: &AuditEvent) -> Result<[u8; 32], AuditChainError> {
    let body = serde_json::to_vec(event)?;
    let mut hasher = Sha256::new();
    hasher.update(prev);
    hasher.update(&body);
    Ok(hasher.finalize().into())
}

fn decode_hash(encoded: &str, index: usize) -> Result<[u8; 32], AuditChainError> {
    let mut out = [0u8; 32];
    hex::decode_to_slice(encoded, &mut out).map_err(|_| AuditChainError::MalformedHash { index })?;
    Ok(out)
}
