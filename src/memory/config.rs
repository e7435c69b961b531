use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration of a [`MemoryStore`](super::MemoryStore).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStoreConfig {
    /// How long a transaction waits for a row or unique-key lock before
    /// failing with `LockTimeout`.
    pub lock_wait_timeout_ms: u64,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            lock_wait_timeout_ms: 5_000,
        }
    }
}

impl MemoryStoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set lock wait timeout
    pub fn lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout_ms = timeout.as_millis().max(1) as u64;
        self
    }

    pub fn lock_wait_duration(&self) -> Duration {
        Duration::from_millis(self.lock_wait_timeout_ms.max(1))
    }
}
