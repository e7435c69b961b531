// ============================================================================
// Atomic Upsert
// ============================================================================
//
// locate (locking read) -> reconcile soft delete -> update | insert -> commit,
// re-run from the top on unique-key races and deadlocks.
//
// ============================================================================

pub mod config;
pub mod engine;
pub mod locator;
pub mod reconcile;
pub mod retry;

pub use config::{ConflictRetryPolicy, UpsertConfig};
pub use engine::{AtomicUpsertEngine, UpsertOutcome};
pub use locator::RowLocator;
pub use reconcile::SoftDeleteReconciler;
pub use retry::ConflictRetryController;
