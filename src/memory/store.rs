use super::change::Change;
use super::config::MemoryStoreConfig;
use super::lock::LockManager;
use super::schema::TableSchema;
use super::table::Table;
use super::transaction::MemoryTransaction;
use crate::core::{DbError, FieldMap, Record, Result, RowId};
use crate::driver::{IsolationLevel, StoreDriver};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Counters of transaction outcomes since the store was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub begun: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub deadlocks: u64,
    pub unique_violations: u64,
    pub lock_timeouts: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    begun: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    deadlocks: AtomicU64,
    unique_violations: AtomicU64,
    lock_timeouts: AtomicU64,
}

impl StatCounters {
    pub(crate) fn record_begin(&self) {
        self.begun.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deadlock(&self) {
        self.deadlocks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unique_violation(&self) {
        self.unique_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StoreStats {
        StoreStats {
            begun: self.begun.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            deadlocks: self.deadlocks.load(Ordering::Relaxed),
            unique_violations: self.unique_violations.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
        }
    }
}

pub(crate) struct StoreShared {
    pub(crate) config: MemoryStoreConfig,
    pub(crate) locks: LockManager,
    pub(crate) stats: StatCounters,
    tables: RwLock<HashMap<String, Table>>,
}

impl StoreShared {
    pub(crate) fn with_table<T>(&self, name: &str, f: impl FnOnce(&Table) -> Result<T>) -> Result<T> {
        let tables = self.tables.read()?;
        let table = tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))?;
        f(table)
    }

    pub(crate) fn with_table_mut<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Table) -> Result<T>,
    ) -> Result<T> {
        let mut tables = self.tables.write()?;
        let table = tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))?;
        f(table)
    }

    /// Publishes a write set. All rows become visible at once.
    pub(crate) fn apply(&self, writes: Vec<((String, RowId), Change)>) -> Result<()> {
        let mut tables = self.tables.write()?;
        for ((name, _), _) in &writes {
            if !tables.contains_key(name) {
                return Err(DbError::TableNotFound(name.clone()));
            }
        }
        for ((name, id), change) in writes {
            if let Some(table) = tables.get_mut(&name) {
                let row = match change {
                    Change::InsertRow { row } | Change::UpdateRow { row } => row,
                };
                table.put(id, row);
            }
        }
        Ok(())
    }
}

/// In-process transactional table store with row locks, unique
/// constraints and deadlock detection.
///
/// Cloning is cheap and every clone shares the same tables.
///
/// # Examples
///
/// ```
/// use atomic_upsert::{Column, DataType, MemoryStore, TableSchema};
///
/// # fn main() -> atomic_upsert::Result<()> {
/// let store = MemoryStore::new();
/// store.create_table(
///     TableSchema::new("users")
///         .column(Column::new("email", DataType::Text).not_null())
///         .unique("users_email_unique", &["email"]),
/// )?;
/// assert_eq!(store.row_count("users")?, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<StoreShared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            shared: Arc::new(StoreShared {
                config,
                locks: LockManager::new(),
                stats: StatCounters::default(),
                tables: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &MemoryStoreConfig {
        &self.shared.config
    }

    pub fn create_table(&self, schema: TableSchema) -> Result<()> {
        schema.validate_definition()?;
        let mut tables = self.shared.tables.write()?;
        let name = schema.name().to_string();
        if tables.contains_key(&name) {
            return Err(DbError::TableExists(name));
        }
        tables.insert(name, Table::new(schema));
        Ok(())
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.shared.tables.read()?.contains_key(name))
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.shared.tables.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn get_schema(&self, table: &str) -> Result<TableSchema> {
        self.shared.with_table(table, |t| Ok(t.schema().clone()))
    }

    /// Opens a read-committed transaction.
    pub fn begin_transaction(&self, isolation: IsolationLevel) -> Result<MemoryTransaction> {
        match isolation {
            IsolationLevel::ReadCommitted => {}
            IsolationLevel::ReadUncommitted => {
                return Err(DbError::InvalidArgument(format!(
                    "{} allows dirty reads and is not offered",
                    isolation
                )));
            }
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable => {
                return Err(DbError::UnsupportedOperation(format!(
                    "{} isolation is not implemented by the memory store",
                    isolation
                )));
            }
        }
        self.shared.stats.record_begin();
        Ok(MemoryTransaction::new(Arc::clone(&self.shared)))
    }

    /// Committed rows of `table`, in id order.
    pub fn rows(&self, table: &str) -> Result<Vec<Record>> {
        self.shared.with_table(table, |t| Ok(t.records()))
    }

    /// Committed rows matching every pair of `predicate`.
    pub fn find(&self, table: &str, predicate: &FieldMap) -> Result<Vec<Record>> {
        Ok(self
            .rows(table)?
            .into_iter()
            .filter(|record| record.matches(predicate))
            .collect())
    }

    pub fn get(&self, table: &str, id: RowId) -> Result<Option<Record>> {
        self.shared
            .with_table(table, |t| Ok(t.get(id).map(|row| Record::new(id, row.clone()))))
    }

    pub fn row_count(&self, table: &str) -> Result<usize> {
        self.shared.with_table(table, |t| Ok(t.row_count()))
    }

    pub fn stats(&self) -> StoreStats {
        self.shared.stats.snapshot()
    }

    /// Locks currently held by open transactions.
    pub fn held_locks(&self) -> Result<usize> {
        self.shared.locks.held_count()
    }
}

#[async_trait]
impl StoreDriver for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self, isolation: IsolationLevel) -> Result<MemoryTransaction> {
        self.begin_transaction(isolation)
    }
}
