//! Arbiter Core - SLA enforcement for human arbitration decisions
//!
//! Decisions handed to a human arbiter must get attention within a
//! type-specific time budget. This crate:
//! - Resolves the SLA for each decision type from an immutable policy
//! - Computes SLA status for dashboards without side effects
//! - Escalates overdue decisions exactly once, flagging them and writing an
//!   append-only audit event
//! - Runs periodic enforcement passes with per-decision fault isolation
//!
//! # Example
//!
//! ```rust,ignore
//! use arbiter_core::{EnforcerOptions, InMemoryDecisionRepository, InMemoryEventSink, SlaEnforcer};
//!
//! # async fn example() {
//! let repo = InMemoryDecisionRepository::new();
//! let sink = InMemoryEventSink::new();
//! let enforcer = SlaEnforcer::new(EnforcerOptions::new());
//!
//! let report = enforcer.run_pass(Some(&repo), &sink).await;
//! println!("checked {} escalated {}", report.checked, report.escalated);
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod audit;
pub mod clock;
pub mod config;
pub mod enforcer;
pub mod error;
pub mod escalation;
pub mod file;
pub mod memory;
pub mod policy;
pub mod status;
pub mod store;
pub mod types;

pub use audit::{AuditChain, AuditEvent, EscalationEventData, SealedEvent};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EnforcerConfig;
pub use enforcer::{enforce, EnforcementReport, EnforcerOptions, SlaEnforcer};
pub use error::{AuditChainError, ConfigError, EnforcementError, PolicyError, StoreError};
pub use escalation::{EscalationContext, EscalationOutcome, EscalationProcessor};
pub use file::{read_audit_log, verify_audit_log, JsonFileDecisionRepository, JsonlEventSink};
pub use memory::{InMemoryDecisionRepository, InMemoryEventSink};
pub use policy::{PolicyTable, SlaPolicy};
pub use status::{sla_status, SlaStatus};
pub use store::{DecisionRepository, EventSink, UpdateOutcome};
pub use types::{
    Decision, DecisionId, DecisionMetadata, DecisionPatch, DecisionStatus, EscalationEntry,
    EscalationRecord, EscalationStrategy, EventId, VentureId,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for wiring an enforcer
    pub use crate::{
        Clock, Decision, DecisionRepository, EnforcementReport, EnforcerOptions, EventSink,
        SlaEnforcer, SlaPolicy, SlaStatus, SystemClock,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
