//! Escalation processor
//!
//! Escalates one overdue decision:
//! 1. Builds the escalation record for the configured posture
//! 2. Flags the decision through a conditional repository update
//! 3. Appends the audit event, whatever happened in step 2
//!
//! Either write alone still tells a human the decision is urgent, so a failed
//! half degrades the outcome instead of failing it. The outcome fails when
//! neither half is known to have landed: both refused, or a fault on the flag
//! write that leaves its fate unknown.

use crate::audit::AuditEvent;
use crate::error::StoreError;
use crate::store::{DecisionRepository, EventSink, UpdateOutcome};
use crate::types::{Decision, DecisionPatch, EscalationRecord, EscalationStrategy};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Warning when the flag landed but the audit write was refused
pub const AUDIT_WRITE_FAILED: &str = "Decision flagged but audit write failed";

/// Warning when the audit write landed but the flag was refused
pub const FLAG_WRITE_FAILED: &str = "Audit event written but decision flag failed";

/// Error when neither write landed
pub const BOTH_WRITES_FAILED: &str = "Decision flag and audit write both failed";

/// Inputs computed by the caller for one escalation
#[derive(Debug, Clone, Copy)]
pub struct EscalationContext {
    /// Applicable SLA
    pub sla: Duration,
    /// Decision age
    pub age: Duration,
    /// Also transition the decision to blocking
    pub block_on_violation: bool,
    /// Escalation time
    pub now: DateTime<Utc>,
}

/// Outcome of one escalation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// Flag and audit both written
    Escalated { blocked: bool },
    /// One half written, the other refused
    Degraded { blocked: bool, warning: String },
    /// A concurrent pass or the owning workflow got there first
    Superseded { reason: UpdateOutcome },
    /// Nothing can be said about what was written
    Failed { error: String },
}

impl EscalationOutcome {
    /// Whether the decision counts as escalated
    #[inline]
    #[must_use]
    pub fn escalated(&self) -> bool {
        matches!(self, Self::Escalated { .. } | Self::Degraded { .. })
    }

    /// Escalated in blocking mode; meaningful only when escalated
    ///
    /// Follows the configured mode even when the flag write was refused.
    #[inline]
    #[must_use]
    pub fn blocked(&self) -> bool {
        match self {
            Self::Escalated { blocked } | Self::Degraded { blocked, .. } => *blocked,
            _ => false,
        }
    }

    /// Degradation warning
    #[must_use]
    pub fn warning(&self) -> Option<&str> {
        match self {
            Self::Degraded { warning, .. } => Some(warning),
            _ => None,
        }
    }

    /// Failure message
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Escalates single decisions against a repository and an event sink
#[derive(Clone, Copy)]
pub struct EscalationProcessor<'a> {
    repository: &'a dyn DecisionRepository,
    sink: &'a dyn EventSink,
}

impl std::fmt::Debug for EscalationProcessor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalationProcessor").finish_non_exhaustive()
    }
}

impl<'a> EscalationProcessor<'a> {
    /// Create processor over the given collaborators
    #[inline]
    #[must_use]
    pub fn new(repository: &'a dyn DecisionRepository, sink: &'a dyn EventSink) -> Self {
        Self { repository, sink }
    }

    /// Escalate one overdue decision
    ///
    /// The audit append is attempted whenever the flag write was not
    /// superseded, whatever the flag write returned. Once the flag is known to
    /// have landed the outcome counts as escalated, however the append fails.
    pub async fn escalate(&self, decision: &Decision, ctx: EscalationContext) -> EscalationOutcome {
        let strategy = EscalationStrategy::for_mode(ctx.block_on_violation);
        let record = EscalationRecord::new(ctx.now, ctx.age, ctx.sla, strategy);
        let patch = DecisionPatch::escalate(record.clone());

        let flag = match self
            .repository
            .update_if_unescalated(&decision.id, &patch)
            .await
        {
            Ok(UpdateOutcome::Applied) => FlagWrite::Applied,
            Ok(reason) => {
                debug!(decision_id = %decision.id, ?reason, "escalation superseded");
                return EscalationOutcome::Superseded { reason };
            }
            Err(e) if e.is_fatal() => {
                error!(decision_id = %decision.id, error = %e, "flag write fault; outcome unknown");
                FlagWrite::Unknown(e)
            }
            Err(e) => {
                warn!(decision_id = %decision.id, error = %e, "failed to flag decision");
                FlagWrite::Refused
            }
        };

        let event = AuditEvent::sla_escalation(decision, &record, ctx.sla);
        let event_id = event.event_id;
        let audit = self.sink.append(event).await;
        if let Err(e) = &audit {
            warn!(decision_id = %decision.id, %event_id, error = %e, "failed to write audit event");
        }

        let blocked = ctx.block_on_violation;
        let outcome = match (flag, audit) {
            (FlagWrite::Applied, Ok(())) => EscalationOutcome::Escalated { blocked },
            (FlagWrite::Applied, Err(_)) => EscalationOutcome::Degraded {
                blocked,
                warning: AUDIT_WRITE_FAILED.to_string(),
            },
            (FlagWrite::Refused, Ok(())) => EscalationOutcome::Degraded {
                blocked,
                warning: FLAG_WRITE_FAILED.to_string(),
            },
            (FlagWrite::Refused, Err(_)) => EscalationOutcome::Failed {
                error: BOTH_WRITES_FAILED.to_string(),
            },
            (FlagWrite::Unknown(e), _) => EscalationOutcome::Failed {
                error: e.to_string(),
            },
        };

        match &outcome {
            EscalationOutcome::Escalated { .. } => {
                metrics::counter!("arbiter_escalations_total", "strategy" => strategy.as_str())
                    .increment(1);
            }
            EscalationOutcome::Degraded { .. } => {
                metrics::counter!("arbiter_escalations_total", "strategy" => strategy.as_str())
                    .increment(1);
                metrics::counter!("arbiter_degraded_escalations_total").increment(1);
            }
            _ => metrics::counter!("arbiter_escalation_failures_total").increment(1),
        }

        outcome
    }
}

/// What the conditional flag write reported
enum FlagWrite {
    Applied,
    /// Store said no; nothing was written
    Refused,
    /// Fault that leaves the write's fate unknown
    Unknown(StoreError),
}
