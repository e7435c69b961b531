// ============================================================================
// Memory Store
// ============================================================================
//
// Reference `StoreDriver`: committed tables behind one `RwLock`, private
// per-transaction write sets, and a lock manager for row and unique-key
// locks with wait-for-graph deadlock detection.
//
// ============================================================================

pub mod change;
pub mod config;
pub mod lock;
pub mod schema;
pub mod store;
pub mod table;
pub mod transaction;

pub use config::MemoryStoreConfig;
pub use lock::{LockKey, LockManager};
pub use schema::{TableSchema, UniqueConstraint};
pub use store::{MemoryStore, StoreStats};
pub use table::Table;
pub use transaction::{MemoryTransaction, TransactionId, TransactionState};
