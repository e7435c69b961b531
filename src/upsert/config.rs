use crate::core::{DbError, Result};
use crate::driver::IsolationLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for automatic conflict retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictRetryPolicy {
    /// Total attempts including the first one. Zero behaves like one.
    pub max_attempts: usize,
    /// Base duration in milliseconds for backoff calculation. Zero disables
    /// sleeping between attempts.
    pub base_backoff_ms: u64,
    /// Maximum duration in milliseconds for backoff.
    pub max_backoff_ms: u64,
}

impl Default for ConflictRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 2,
            max_backoff_ms: 50,
        }
    }
}

impl ConflictRetryPolicy {
    /// Retries immediately, without backoff.
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    pub fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }

    /// Exponential backoff before attempt `attempt + 1`.
    pub fn backoff(&self, attempt: usize) -> Duration {
        if self.base_backoff_ms == 0 {
            return Duration::ZERO;
        }
        let base = self.base_backoff_ms;
        let cap = self.max_backoff_ms.max(base);

        let mut backoff = base;
        for _ in 1..attempt {
            backoff = backoff.saturating_mul(2).min(cap);
        }
        Duration::from_millis(backoff)
    }
}

/// Engine configuration.
///
/// # Examples
///
/// ```
/// use atomic_upsert::{IsolationLevel, UpsertConfig};
///
/// let config = UpsertConfig::new()
///     .max_attempts(5)
///     .isolation(IsolationLevel::ReadCommitted);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpsertConfig {
    /// Isolation of each attempt's transaction.
    pub isolation: IsolationLevel,
    /// Conflict retry configuration.
    pub retry: ConflictRetryPolicy,
}

impl Default for UpsertConfig {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::ReadCommitted,
            retry: ConflictRetryPolicy::default(),
        }
    }
}

impl UpsertConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set transaction isolation level
    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    /// Set maximum attempts per upsert
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    /// Set retry backoff bounds
    pub fn backoff(mut self, base: Duration, max: Duration) -> Self {
        self.retry.base_backoff_ms = base.as_millis() as u64;
        self.retry.max_backoff_ms = max.as_millis() as u64;
        self
    }

    pub fn retry_policy(mut self, retry: ConflictRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Rejects settings the upsert protocol cannot run under.
    pub fn validate(&self) -> Result<()> {
        if !self.isolation.prevents_dirty_reads() {
            return Err(DbError::InvalidArgument(format!(
                "upsert requires READ COMMITTED or stronger, got {}",
                self.isolation
            )));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DbError::InvalidArgument(format!("Invalid upsert config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            DbError::InvalidArgument(format!(
                "Failed to read upsert config '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = UpsertConfig::default();
        assert_eq!(config.isolation, IsolationLevel::ReadCommitted);
        assert_eq!(config.retry.attempts(), 3);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ConflictRetryPolicy {
            max_attempts: 6,
            base_backoff_ms: 5,
            max_backoff_ms: 30,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(5));
        assert_eq!(policy.backoff(2), Duration::from_millis(10));
        assert_eq!(policy.backoff(3), Duration::from_millis(20));
        assert_eq!(policy.backoff(4), Duration::from_millis(30));
        assert_eq!(ConflictRetryPolicy::immediate(3).backoff(2), Duration::ZERO);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(ConflictRetryPolicy::immediate(0).attempts(), 1);
    }

    #[test]
    fn test_read_uncommitted_rejected() {
        let config = UpsertConfig::new().isolation(IsolationLevel::ReadUncommitted);
        assert!(matches!(config.validate(), Err(DbError::InvalidArgument(_))));
    }

    #[test]
    fn test_from_json() {
        let config = UpsertConfig::from_json(
            r#"{ "isolation": "ReadCommitted", "retry": { "max_attempts": 4 } }"#,
        )
        .unwrap();
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.base_backoff_ms, 2);

        assert!(UpsertConfig::from_json(r#"{ "isolation": "ReadUncommitted" }"#).is_err());
        assert!(UpsertConfig::from_json("not json").is_err());
    }
}
