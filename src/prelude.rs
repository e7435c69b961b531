//! Everything an application needs to declare entities and upsert them.
//!
//! Store implementors should reach for [`crate::driver`] directly.

pub use crate::fields;
pub use crate::{
    AtomicUpsertEngine, Column, DataType, DbError, Entity, FieldAccess, FieldMap, IsolationLevel,
    MemoryStore, Result, SoftDeletes, TableSchema, UpsertConfig, UpsertOutcome, Value,
};
