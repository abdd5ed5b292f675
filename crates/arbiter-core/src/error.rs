//! Error types for Arbiter Core
//!
//! Provides error handling for:
//! - Decision repository and event sink failures
//! - SLA policy construction
//! - Configuration loading
//! - Batch-level enforcement failures

/// Failure reported by a collaborator store (decision repository or event sink)
///
/// Reported failures (`Rejected`, `NotFound`) mean nothing was written. Fatal
/// faults (`Connection`, `Io`, `Serialization`, `Chain`) mean the engine cannot
/// tell whether the write landed; on the flag write this fails the escalation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store refused the operation and said so
    #[error("store rejected operation: {0}")]
    Rejected(String),

    /// Target record does not exist
    #[error("record not found: {0}")]
    NotFound(String),

    /// Store could not be reached
    #[error("store connection failed: {0}")]
    Connection(String),

    /// Local I/O failure (file-backed stores)
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be encoded or decoded
    #[error("store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted audit chain is unusable
    #[error("audit chain error: {0}")]
    Chain(#[from] AuditChainError),
}

impl StoreError {
    /// Whether this failure means the outcome of the operation is unknown
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Io(_) | Self::Serialization(_) | Self::Chain(_)
        )
    }
}

/// Audit hash chain errors
#[derive(Debug, thiserror::Error)]
pub enum AuditChainError {
    /// Entry does not link to its predecessor or its content was altered
    #[error("audit chain broken at entry {index}")]
    Broken { index: usize },

    /// Stored hash is not 32 bytes of hex
    #[error("malformed hash at entry {index}")]
    MalformedHash { index: usize },

    /// Event could not be encoded for hashing
    #[error("failed to encode audit event: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// SLA policy construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// A decision type was given a zero duration
    #[error("SLA duration for '{decision_type}' must be positive")]
    ZeroDuration { decision_type: String },

    /// The fallback duration is zero
    #[error("fallback SLA duration must be positive")]
    ZeroFallback,
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    /// Config file is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Policy section is invalid
    #[error("invalid SLA policy: {0}")]
    Policy(#[from] PolicyError),

    /// A numeric option is out of range
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Batch-level enforcement failures
///
/// These short-circuit a pass; there is nothing meaningful to iterate.
#[derive(Debug, thiserror::Error)]
pub enum EnforcementError {
    /// No decision repository was supplied
    #[error("No decision repository configured")]
    MissingRepository,

    /// Pending decisions could not be listed
    #[error("Failed to query pending decisions: {0}")]
    Query(#[source] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_fatality() {
        assert!(!StoreError::Rejected("row locked".to_string()).is_fatal());
        assert!(!StoreError::NotFound("d-1".to_string()).is_fatal());
        assert!(StoreError::Connection("reset".to_string()).is_fatal());

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert!(StoreError::from(io).is_fatal());
    }

    #[test]
    fn enforcement_error_display() {
        assert_eq!(
            EnforcementError::MissingRepository.to_string(),
            "No decision repository configured"
        );

        let err = EnforcementError::Query(StoreError::Connection("timeout".to_string()));
        assert_eq!(
            err.to_string(),
            "Failed to query pending decisions: store connection failed: timeout"
        );
    }
}
