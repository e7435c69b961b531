// ============================================================================
// Conflict Retry Controller
// ============================================================================
//
// Runs one transactional attempt at a time:
//
// ```text
// Attempt(n) ──ok──────────────────────────> Success
//    │
//    ├──retryable conflict, n < max──> Attempt(n + 1)
//    ├──retryable conflict, n == max─> Fatal (last error, unchanged)
//    └──any other error──────────────> Fatal (unchanged)
// ```
//
// The attempt closure owns its transaction; by the time it returns an error
// the transaction has been rolled back, so a new attempt starts clean.
//
// ============================================================================

use super::config::ConflictRetryPolicy;
use crate::core::Result;
use log::{debug, warn};
use std::future::Future;

#[derive(Debug, Clone, Default)]
pub struct ConflictRetryController {
    policy: ConflictRetryPolicy,
}

impl ConflictRetryController {
    pub fn new(policy: ConflictRetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ConflictRetryPolicy {
        &self.policy
    }

    /// Runs `attempt` until it succeeds, fails fatally, or the attempt
    /// budget is spent. The closure receives the 1-based attempt number.
    pub async fn run<F, Fut, T>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.attempts();
        let mut current = 1usize;
        loop {
            let err = match attempt(current).await {
                Ok(value) => {
                    if current > 1 {
                        debug!("upsert converged on attempt {} of {}", current, max_attempts);
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let Some(kind) = err.conflict_kind() else {
                return Err(err);
            };
            if current >= max_attempts {
                warn!(
                    "upsert gave up after {} attempt(s) on {} conflict: {}",
                    current, kind, err
                );
                return Err(err);
            }

            let backoff = self.policy.backoff(current);
            warn!(
                "upsert retry on {} conflict (attempt {} of {}): {} (backoff={}ms)",
                kind,
                current,
                max_attempts,
                err,
                backoff.as_millis()
            );
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }
            current += 1;
        }
    }
}
