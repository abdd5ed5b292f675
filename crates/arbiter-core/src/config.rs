//! Enforcer configuration
//!
//! Loaded from TOML by the scheduler's composition root:
//!
//! ```toml
//! block_on_violation = true
//! max_concurrency = 4
//! interval_secs = 300
//!
//! [policy]
//! fallback_ms = 86400000
//!
//! [policy.durations]
//! gate_decision = 14400000
//! ```
//!
//! A `[policy]` section replaces the default matrix wholesale.

use crate::clock::Clock;
use crate::enforcer::EnforcerOptions;
use crate::error::ConfigError;
use crate::policy::SlaPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Enforcer configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnforcerConfig {
    /// Transition escalated decisions to blocking
    pub block_on_violation: bool,
    /// Escalations in flight at once within a pass
    pub max_concurrency: usize,
    /// Seconds between passes in watch mode
    pub interval_secs: u64,
    /// SLA table override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<SlaPolicy>,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            block_on_violation: true,
            max_concurrency: 1,
            interval_secs: 300,
            policy: None,
        }
    }
}

impl EnforcerConfig {
    /// Parse from TOML text
    ///
    /// # Errors
    /// - `ConfigError::Parse` on malformed TOML, unknown keys or a zero SLA
    /// - `ConfigError::InvalidValue` on a zero concurrency or interval
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// As [`from_toml`](Self::from_toml), plus `ConfigError::Read`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Pass interval for watch mode
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Enforcer options using the given clock
    #[must_use]
    pub fn to_options(&self, clock: Arc<dyn Clock>) -> EnforcerOptions {
        EnforcerOptions::new()
            .with_policy(self.policy.clone().unwrap_or_default())
            .with_block_on_violation(self.block_on_violation)
            .with_max_concurrency(self.max_concurrency)
            .with_clock(clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    #[test]
    fn empty_file_uses_defaults() {
        let config = EnforcerConfig::from_toml("").unwrap();
        assert_eq!(config, EnforcerConfig::default());

        let options = config.to_options(Arc::new(SystemClock));
        assert!(options.block_on_violation);
        assert_eq!(options.policy, SlaPolicy::default());
    }

    #[test]
    fn policy_section_replaces_matrix() {
        let config = EnforcerConfig::from_toml(
            r#"
            block_on_violation = false
            max_concurrency = 4

            [policy]
            fallback_ms = 7200000

            [policy.durations]
            gate_decision = 3600000
            "#,
        )
        .unwrap();

        assert!(!config.block_on_violation);
        let policy = config.policy.unwrap();
        assert_eq!(policy.lookup("gate_decision"), Duration::from_secs(3600));
        assert_eq!(policy.lookup("advisory"), Duration::from_secs(7200));
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = EnforcerConfig::from_toml("block_on_violaton = true").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_sla_rejected() {
        let err = EnforcerConfig::from_toml("[policy]\nfallback_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("fallback SLA duration must be positive"));
    }

    #[test]
    fn zero_interval_rejected() {
        let err = EnforcerConfig::from_toml("interval_secs = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "interval_secs",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arbiter.toml");
        tokio::fs::write(&path, "max_concurrency = 2\n").await.unwrap();

        let config = EnforcerConfig::load(&path).await.unwrap();
        assert_eq!(config.max_concurrency, 2);
    }
}
