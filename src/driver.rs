//! Contract between the upsert engine and a transactional store.
//!
//! The engine only relies on what is declared here: atomic transactions
//! at read-committed isolation or stronger, a locking read, insert and
//! update, and distinguishable [`DbError::UniqueConstraintViolation`] /
//! [`DbError::DeadlockDetected`] failures.
//!
//! [`DbError::UniqueConstraintViolation`]: crate::DbError::UniqueConstraintViolation
//! [`DbError::DeadlockDetected`]: crate::DbError::DeadlockDetected

use crate::core::{FieldMap, Record, Result, RowId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Whether uncommitted writes of other transactions stay invisible.
    pub fn prevents_dirty_reads(&self) -> bool {
        !matches!(self, Self::ReadUncommitted)
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadUncommitted => write!(f, "READ UNCOMMITTED"),
            Self::ReadCommitted => write!(f, "READ COMMITTED"),
            Self::RepeatableRead => write!(f, "REPEATABLE READ"),
            Self::Serializable => write!(f, "SERIALIZABLE"),
        }
    }
}

/// A `SELECT ... FOR UPDATE LIMIT 1` style request.
#[derive(Debug, Clone, PartialEq)]
pub struct LockingRead {
    /// Equality on every pair; a `Null` value matches only `Null`.
    pub predicate: FieldMap,
    /// When set, rows with a non-null value in this column are skipped.
    pub exclude_marked_in: Option<String>,
}

impl LockingRead {
    pub fn new(predicate: FieldMap) -> Self {
        Self {
            predicate,
            exclude_marked_in: None,
        }
    }

    pub fn excluding_marked(mut self, column: impl Into<String>) -> Self {
        self.exclude_marked_in = Some(column.into());
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        if !record.matches(&self.predicate) {
            return false;
        }
        match &self.exclude_marked_in {
            Some(column) => !record.is_marked_deleted(column),
            None => true,
        }
    }
}

#[async_trait]
pub trait StoreDriver: Send + Sync {
    type Transaction: StoreTransaction;

    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Transaction>;
}

/// One open store transaction. Dropping it without `commit` discards its
/// writes.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Returns the first matching row, holding its write lock until the
    /// transaction ends. Blocks while another transaction holds that lock.
    async fn locking_read(&mut self, table: &str, read: &LockingRead) -> Result<Option<Record>>;

    async fn insert(&mut self, table: &str, fields: FieldMap) -> Result<Record>;

    /// Writes `changes` over the row and returns its new image.
    async fn update(&mut self, table: &str, id: RowId, changes: FieldMap) -> Result<Record>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}
