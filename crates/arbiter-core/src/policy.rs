//! SLA policy
//!
//! Immutable mapping from decision type to the time an arbiter has before a
//! pending decision is overdue, plus one fallback for unrecognized types.
//! A policy is a plain value handed to the enforcer by its composition root;
//! supplying one replaces the default matrix wholesale.

use crate::error::PolicyError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

const HOUR: Duration = Duration::from_secs(3600);

/// Default per-type SLAs, in hours
const DEFAULT_MATRIX: &[(&str, u64)] = &[
    ("gate_decision", 4),
    ("guardrail_override", 2),
    ("cascade_override", 2),
    ("budget_review", 8),
    ("chairman_approval", 24),
    ("advisory", 24),
];

/// Fallback SLA for unknown types, in hours
const DEFAULT_FALLBACK_HOURS: u64 = 24;

/// Per-type SLA table with a fallback
///
/// Lookup always resolves to a positive duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PolicyTable", into = "PolicyTable")]
pub struct SlaPolicy {
    durations: BTreeMap<String, Duration>,
    fallback: Duration,
}

impl SlaPolicy {
    /// Build a policy from explicit entries
    ///
    /// # Errors
    /// - `PolicyError::ZeroDuration` if any entry is zero
    /// - `PolicyError::ZeroFallback` if the fallback is zero
    pub fn new<K, I>(entries: I, fallback: Duration) -> Result<Self, PolicyError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Duration)>,
    {
        if fallback.is_zero() {
            return Err(PolicyError::ZeroFallback);
        }

        let mut durations = BTreeMap::new();
        for (key, duration) in entries {
            let key = key.into();
            if duration.is_zero() {
                return Err(PolicyError::ZeroDuration { decision_type: key });
            }
            durations.insert(key, duration);
        }

        Ok(Self {
            durations,
            fallback,
        })
    }

    /// SLA for a decision type, falling back for unknown types
    #[inline]
    #[must_use]
    pub fn lookup(&self, decision_type: &str) -> Duration {
        self.durations
            .get(decision_type)
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Whether the type has an explicit entry
    #[inline]
    #[must_use]
    pub fn has_entry(&self, decision_type: &str) -> bool {
        self.durations.contains_key(decision_type)
    }

    /// Fallback SLA
    #[inline]
    #[must_use]
    pub fn fallback(&self) -> Duration {
        self.fallback
    }

    /// Explicit entries, ordered by type
    pub fn entries(&self) -> impl Iterator<Item = (&str, Duration)> {
        self.durations.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Default for SlaPolicy {
    fn default() -> Self {
        Self {
            durations: DEFAULT_MATRIX
                .iter()
                .map(|(key, hours)| ((*key).to_string(), hours_to_duration(*hours)))
                .collect(),
            fallback: hours_to_duration(DEFAULT_FALLBACK_HOURS),
        }
    }
}

/// Serialized form of a policy, durations in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyTable {
    /// Fallback SLA
    pub fallback_ms: u64,
    /// Per-type SLAs
    #[serde(default)]
    pub durations: BTreeMap<String, u64>,
}

impl TryFrom<PolicyTable> for SlaPolicy {
    type Error = PolicyError;

    fn try_from(table: PolicyTable) -> Result<Self, Self::Error> {
        Self::new(
            table
                .durations
                .into_iter()
                .map(|(key, ms)| (key, Duration::from_millis(ms))),
            Duration::from_millis(table.fallback_ms),
        )
    }
}

impl From<SlaPolicy> for PolicyTable {
    fn from(policy: SlaPolicy) -> Self {
        Self {
            fallback_ms: millis(policy.fallback),
            durations: policy
                .durations
                .into_iter()
                .map(|(key, duration)| (key, millis(duration)))
                .collect(),
        }
    }
}

const fn hours_to_duration(hours: u64) -> Duration {
    Duration::from_secs(hours * HOUR.as_secs())
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
