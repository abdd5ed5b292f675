//! Enforcement loop
//!
//! Entry point for the external scheduler. One pass:
//! 1. Lists pending decisions
//! 2. Skips decisions under direct arbiter control or already escalated
//! 3. Escalates every remaining decision that is past its SLA
//! 4. Returns aggregate counters; per-decision failures never abort the batch
//!
//! Passes on the same [`SlaEnforcer`] are single-flight. Together with the
//! conditional repository update this keeps overlapping scheduler ticks from
//! escalating a decision twice.

use crate::clock::{Clock, SystemClock};
use crate::error::EnforcementError;
use crate::escalation::{EscalationContext, EscalationOutcome, EscalationProcessor};
use crate::policy::SlaPolicy;
use crate::status::{sla_status, SlaStatus};
use crate::store::{DecisionRepository, EventSink};
use crate::types::{Decision, DecisionId};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Enforcement options
#[derive(Debug, Clone)]
pub struct EnforcerOptions {
    /// SLA table; replaces the default matrix wholesale
    pub policy: SlaPolicy,
    /// Transition escalated decisions to blocking
    pub block_on_violation: bool,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Escalations in flight at once within a pass
    pub max_concurrency: usize,
}

impl EnforcerOptions {
    /// Default options
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With SLA policy
    #[inline]
    #[must_use]
    pub fn with_policy(mut self, policy: SlaPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// With blocking mode
    #[inline]
    #[must_use]
    pub fn with_block_on_violation(mut self, block: bool) -> Self {
        self.block_on_violation = block;
        self
    }

    /// With clock
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// With per-pass concurrency (clamped to at least 1)
    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }
}

impl Default for EnforcerOptions {
    fn default() -> Self {
        Self {
            policy: SlaPolicy::default(),
            block_on_violation: true,
            clock: Arc::new(SystemClock),
            max_concurrency: 1,
        }
    }
}

/// Aggregate result of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnforcementReport {
    /// Pending decisions examined
    pub checked: usize,
    /// Decisions escalated, including degraded escalations
    pub escalated: usize,
    /// Exempt decisions and escalations superseded by a concurrent writer
    pub skipped: usize,
    /// Escalations made in blocking mode
    ///
    /// Mirrors the mode, not the store: an escalation whose flag write was
    /// refused still counts here although its `blocking` field never changed.
    /// Those escalations also carry a warning in `warnings`.
    pub blocked: usize,
    /// Human-readable failures
    pub errors: Vec<String>,
    /// Degraded escalations, prefixed with the decision ID
    pub warnings: Vec<String>,
    /// Another pass was already running; nothing was examined
    pub pass_skipped: bool,
}

impl EnforcementReport {
    fn from_error(error: &EnforcementError) -> Self {
        Self {
            errors: vec![error.to_string()],
            ..Self::default()
        }
    }

    fn overlapped() -> Self {
        Self {
            pass_skipped: true,
            ..Self::default()
        }
    }

    /// Whether any decision failed or the pass could not run
    #[inline]
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn record(&mut self, id: &DecisionId, verdict: Verdict) {
        self.checked += 1;
        match verdict {
            Verdict::Exempt | Verdict::Escalation(EscalationOutcome::Superseded { .. }) => {
                self.skipped += 1;
            }
            Verdict::WithinSla => {}
            Verdict::Escalation(outcome) => {
                if outcome.escalated() {
                    self.escalated += 1;
                    if outcome.blocked() {
                        self.blocked += 1;
                    }
                    if let Some(warning) = outcome.warning() {
                        self.warnings.push(format!("{id}: {warning}"));
                    }
                } else {
                    let cause = outcome.error().unwrap_or("unknown error");
                    self.errors.push(format!("Escalation failed for {id}: {cause}"));
                }
            }
        }
    }
}

/// Per-decision result inside a pass
enum Verdict {
    Exempt,
    WithinSla,
    Escalation(EscalationOutcome),
}

/// Long-lived enforcer owned by the scheduler
#[derive(Debug)]
pub struct SlaEnforcer {
    options: EnforcerOptions,
    in_flight: Mutex<()>,
}

impl SlaEnforcer {
    /// Create enforcer
    #[inline]
    #[must_use]
    pub fn new(options: EnforcerOptions) -> Self {
        Self {
            options,
            in_flight: Mutex::new(()),
        }
    }

    /// Active options
    #[inline]
    #[must_use]
    pub fn options(&self) -> &EnforcerOptions {
        &self.options
    }

    /// SLA status of a decision under this enforcer's policy and clock
    #[must_use]
    pub fn status(&self, decision: &Decision) -> SlaStatus {
        sla_status(decision, &self.options.policy, self.options.clock.now())
    }

    /// Run one enforcement pass
    ///
    /// Never fails: batch-level problems come back as a single entry in
    /// `errors`, per-decision problems as one entry each. A call made while
    /// another pass on this enforcer is running returns immediately with
    /// `pass_skipped` set.
    pub async fn run_pass(
        &self,
        repository: Option<&dyn DecisionRepository>,
        sink: &dyn EventSink,
    ) -> EnforcementReport {
        let Ok(_guard) = self.in_flight.try_lock() else {
            info!("enforcement pass already running; skipping");
            return EnforcementReport::overlapped();
        };

        let span = info_span!(
            "enforcement_pass",
            block_on_violation = self.options.block_on_violation
        );
        let report = self.pass(repository, sink).instrument(span).await;

        metrics::counter!("arbiter_decisions_checked_total").increment(report.checked as u64);
        report
    }

    async fn pass(
        &self,
        repository: Option<&dyn DecisionRepository>,
        sink: &dyn EventSink,
    ) -> EnforcementReport {
        let Some(repository) = repository else {
            let err = EnforcementError::MissingRepository;
            error!(error = %err, "enforcement pass aborted");
            return EnforcementReport::from_error(&err);
        };

        let decisions = match repository.query_pending().await {
            Ok(decisions) => decisions,
            Err(e) => {
                let err = EnforcementError::Query(e);
                error!(error = %err, "enforcement pass aborted");
                return EnforcementReport::from_error(&err);
            }
        };

        if decisions.is_empty() {
            debug!("no pending decisions");
            return EnforcementReport::default();
        }

        let now = self.options.clock.now();
        let processor = EscalationProcessor::new(repository, sink);

        let verdicts: Vec<Verdict> = stream::iter(&decisions)
            .map(|decision| self.evaluate(decision, now, processor))
            .buffered(self.options.max_concurrency.max(1))
            .collect()
            .await;

        let mut report = EnforcementReport::default();
        for (decision, verdict) in decisions.iter().zip(verdicts) {
            report.record(&decision.id, verdict);
        }

        if report.has_errors() {
            warn!(
                checked = report.checked,
                escalated = report.escalated,
                errors = report.errors.len(),
                "enforcement pass completed with errors"
            );
        } else {
            info!(
                checked = report.checked,
                escalated = report.escalated,
                skipped = report.skipped,
                blocked = report.blocked,
                "enforcement pass completed"
            );
        }
        report
    }

    async fn evaluate(
        &self,
        decision: &Decision,
        now: DateTime<Utc>,
        processor: EscalationProcessor<'_>,
    ) -> Verdict {
        if decision.blocking {
            debug!(decision_id = %decision.id, "skipping: under direct arbiter control");
            return Verdict::Exempt;
        }
        if decision.metadata.is_escalated() {
            debug!(decision_id = %decision.id, "skipping: already escalated");
            return Verdict::Exempt;
        }

        let status = sla_status(decision, &self.options.policy, now);
        if !status.overdue {
            return Verdict::WithinSla;
        }

        let ctx = EscalationContext {
            sla: status.sla,
            age: status.age,
            block_on_violation: self.options.block_on_violation,
            now,
        };
        Verdict::Escalation(processor.escalate(decision, ctx).await)
    }
}

/// Run a single pass with the given options
///
/// Convenience for callers that do not keep an enforcer around. Without a
/// shared [`SlaEnforcer`] there is no single-flight guard; overlap protection
/// rests on the repository's conditional update.
pub async fn enforce(
    repository: Option<&dyn DecisionRepository>,
    sink: &dyn EventSink,
    options: EnforcerOptions,
) -> EnforcementReport {
    SlaEnforcer::new(options).run_pass(repository, sink).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::StoreError;
    use crate::store::{MockDecisionRepository, MockEventSink, UpdateOutcome};
    use chrono::TimeDelta;

    fn options_at(now: DateTime<Utc>) -> EnforcerOptions {
        EnforcerOptions::new().with_clock(Arc::new(FixedClock(now)))
    }

    #[tokio::test]
    async fn missing_repository_reports_once() {
        let sink = MockEventSink::new();
        let report = enforce(None, &sink, EnforcerOptions::new()).await;

        assert_eq!(report.errors, vec!["No decision repository configured"]);
        assert_eq!(report.checked, 0);
        assert_eq!(report.escalated, 0);
    }

    #[tokio::test]
    async fn query_failure_short_circuits() {
        let mut repo = MockDecisionRepository::new();
        repo.expect_query_pending()
            .times(1)
            .returning(|| Err(StoreError::Connection("refused".to_string())));
        repo.expect_update_if_unescalated().never();
        let sink = MockEventSink::new();

        let report = enforce(Some(&repo), &sink, EnforcerOptions::new()).await;

        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Failed to query pending decisions"));
        assert_eq!(report.checked, 0);
    }

    #[tokio::test]
    async fn empty_result_is_not_an_error() {
        let mut repo = MockDecisionRepository::new();
        repo.expect_query_pending().returning(|| Ok(Vec::new()));
        let sink = MockEventSink::new();

        let report = enforce(Some(&repo), &sink, EnforcerOptions::new()).await;
        assert_eq!(report, EnforcementReport::default());
    }

    #[tokio::test]
    async fn failed_escalation_does_not_abort_batch() {
        let now = Utc::now();
        let decisions = vec![
            Decision::new("bad", "gate_decision", now - TimeDelta::hours(6)),
            Decision::new("good", "gate_decision", now - TimeDelta::hours(6)),
        ];
        let mut repo = MockDecisionRepository::new();
        repo.expect_query_pending()
            .returning(move || Ok(decisions.clone()));
        repo.expect_update_if_unescalated()
            .times(2)
            .returning(|id, _| {
                if id.as_str() == "bad" {
                    Err(StoreError::Connection("reset".to_string()))
                } else {
                    Ok(UpdateOutcome::Applied)
                }
            });
        let mut sink = MockEventSink::new();
        sink.expect_append().times(2).returning(|_| Ok(()));

        let report = enforce(Some(&repo), &sink, options_at(now)).await;

        assert_eq!(report.checked, 2);
        assert_eq!(report.escalated, 1);
        assert_eq!(report.blocked, 1);
        assert_eq!(
            report.errors,
            vec!["Escalation failed for bad: store connection failed: reset"]
        );
    }

    #[tokio::test]
    async fn superseded_escalation_counts_as_skipped() {
        let now = Utc::now();
        let decision = Decision::new("d-1", "gate_decision", now - TimeDelta::hours(6));
        let mut repo = MockDecisionRepository::new();
        repo.expect_query_pending()
            .returning(move || Ok(vec![decision.clone()]));
        repo.expect_update_if_unescalated()
            .returning(|_, _| Ok(UpdateOutcome::AlreadyEscalated));
        let mut sink = MockEventSink::new();
        sink.expect_append().never();

        let report = enforce(Some(&repo), &sink, options_at(now)).await;

        assert_eq!(report.checked, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.escalated, 0);
        assert!(!report.has_errors());
    }

    #[tokio::test]
    async fn degraded_escalation_is_listed_as_warning() {
        let now = Utc::now();
        let decision = Decision::new("d-7", "budget_review", now - TimeDelta::hours(9));
        let mut repo = MockDecisionRepository::new();
        repo.expect_query_pending()
            .returning(move || Ok(vec![decision.clone()]));
        repo.expect_update_if_unescalated()
            .returning(|_, _| Ok(UpdateOutcome::Applied));
        let mut sink = MockEventSink::new();
        sink.expect_append()
            .returning(|_| Err(StoreError::Rejected("read-only".to_string())));

        let report = enforce(Some(&repo), &sink, options_at(now)).await;

        assert_eq!(report.escalated, 1);
        assert_eq!(
            report.warnings,
            vec!["d-7: Decision flagged but audit write failed"]
        );
        assert!(!report.has_errors());
    }

    #[test]
    fn options_clamp_concurrency() {
        assert_eq!(EnforcerOptions::new().with_max_concurrency(0).max_concurrency, 1);
        assert!(EnforcerOptions::default().block_on_violation);
    }
}
