//! SLA status calculation
//!
//! Pure, side-effect free. The enforcer uses it to pick violations; dashboards
//! can call it directly without triggering enforcement.

use crate::policy::SlaPolicy;
use crate::types::Decision;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// SLA position of one decision at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlaStatus {
    /// `age >= sla`
    pub overdue: bool,
    /// `max(0, sla - age)`
    pub remaining: Duration,
    /// Applicable SLA
    pub sla: Duration,
    /// Time since the decision entered the pending state
    pub age: Duration,
}

/// Compute the SLA status of a decision
///
/// A `created_at` in the future (clock skew between writer and enforcer) is
/// treated as age zero.
#[must_use]
pub fn sla_status(decision: &Decision, policy: &SlaPolicy, now: DateTime<Utc>) -> SlaStatus {
    let sla = policy.lookup(&decision.decision_type);
    let age = (now - decision.created_at)
        .to_std()
        .unwrap_or(Duration::ZERO);

    SlaStatus {
        overdue: age >= sla,
        remaining: sla.saturating_sub(age),
        sla,
        age,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    const HOUR: Duration = Duration::from_secs(3600);

    fn decision_aged(decision_type: &str, now: DateTime<Utc>, age: TimeDelta) -> Decision {
        Decision::new("d-1", decision_type, now - age)
    }

    #[test]
    fn overdue_gate_decision() {
        let now = Utc::now();
        let decision = decision_aged("gate_decision", now, TimeDelta::hours(5));
        let status = sla_status(&decision, &SlaPolicy::default(), now);

        assert!(status.overdue);
        assert_eq!(status.sla, HOUR * 4);
        assert_eq!(status.age, HOUR * 5);
        assert_eq!(status.remaining, Duration::ZERO);
    }

    #[test]
    fn within_sla_reports_remaining() {
        let now = Utc::now();
        let decision = decision_aged("gate_decision", now, TimeDelta::hours(1));
        let status = sla_status(&decision, &SlaPolicy::default(), now);

        assert!(!status.overdue);
        assert_eq!(status.remaining, HOUR * 3);
    }

    #[test]
    fn exactly_at_sla_is_overdue() {
        let now = Utc::now();
        let decision = decision_aged("gate_decision", now, TimeDelta::hours(4));
        let status = sla_status(&decision, &SlaPolicy::default(), now);

        assert!(status.overdue);
        assert_eq!(status.remaining, Duration::ZERO);
    }

    #[test]
    fn unknown_type_uses_fallback() {
        let now = Utc::now();
        let decision = decision_aged("unrecognized_key", now, TimeDelta::hours(25));
        let status = sla_status(&decision, &SlaPolicy::default(), now);

        assert!(status.overdue);
        assert_eq!(status.sla, HOUR * 24);
    }

    #[test]
    fn future_created_at_is_age_zero() {
        let now = Utc::now();
        let decision = Decision::new("d-2", "advisory", now + TimeDelta::minutes(10));
        let status = sla_status(&decision, &SlaPolicy::default(), now);

        assert!(!status.overdue);
        assert_eq!(status.age, Duration::ZERO);
        assert_eq!(status.remaining, status.sla);
    }
}
