// ============================================================================
// Atomic Upsert Library
// ============================================================================

pub mod capability;
pub mod core;
pub mod driver;
pub mod entity;
pub mod memory;
pub mod prelude;
pub mod upsert;

// Re-export main types for convenience
pub use capability::{CapabilityRegistry, SoftDeleteCapability};
pub use core::{
    Column, ConflictKind, DataType, DbError, FieldAccess, FieldMap, Record, Result, RowId, Value,
};
pub use driver::{IsolationLevel, LockingRead, StoreDriver, StoreTransaction};
pub use entity::{DEFAULT_KEY_COLUMN, Entity, SoftDeletes};
pub use memory::{
    MemoryStore, MemoryStoreConfig, MemoryTransaction, StoreStats, TableSchema, UniqueConstraint,
};
pub use upsert::{AtomicUpsertEngine, ConflictRetryPolicy, UpsertConfig, UpsertOutcome};
