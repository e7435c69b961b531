// ============================================================================
// Memory Store Transactions
// ============================================================================
//
// Read committed: a transaction sees committed rows overlaid with its own
// pending writes. Writes go to a private write set and become visible to
// others atomically at commit.
//
// Every row a transaction reads with `locking_read`, inserts or updates is
// locked until the transaction ends. Inserts and key-changing updates also
// lock the unique keys they claim, so two writers of the same key are
// serialized and the later one observes the earlier one's committed row.
//
// State transitions:
// ```text
// Active ──commit──> Committed
//   │
//   ├──rollback / drop──> Aborted
//   └──deadlock victim──> Aborted
// ```
//
// ============================================================================

use super::change::WriteSet;
use super::lock::{LockKey, format_key};
use super::schema::UniqueConstraint;
use super::store::StoreShared;
use crate::core::{DbError, FieldMap, Record, Result, RowId, Value};
use crate::driver::{LockingRead, StoreTransaction};
use async_trait::async_trait;
use log::debug;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

pub struct MemoryTransaction {
    id: TransactionId,
    shared: Arc<StoreShared>,
    writes: WriteSet,
    state: TransactionState,
}

impl MemoryTransaction {
    pub(crate) fn new(shared: Arc<StoreShared>) -> Self {
        Self {
            id: TransactionId::new(),
            shared,
            writes: WriteSet::new(),
            state: TransactionState::Active,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Aborted => Err(DbError::TransactionAborted(format!(
                "{} was aborted and must be rolled back",
                self.id
            ))),
            TransactionState::Committed => Err(DbError::ExecutionError(format!(
                "{} is already committed",
                self.id
            ))),
        }
    }

    /// Discards pending writes and releases every lock.
    fn abort(&mut self) -> Result<()> {
        self.writes.clear();
        self.state = TransactionState::Aborted;
        self.shared.locks.release_all(self.id)?;
        Ok(())
    }

    async fn lock(&mut self, key: LockKey) -> Result<()> {
        let timeout = self.shared.config.lock_wait_duration();
        match self.shared.locks.acquire(self.id, key, timeout).await {
            Ok(()) => Ok(()),
            Err(err @ DbError::DeadlockDetected(_)) => {
                self.shared.stats.record_deadlock();
                debug!("{} chosen as deadlock victim: {}", self.id, err);
                self.abort()?;
                Err(err)
            }
            Err(err) => {
                if matches!(err, DbError::LockTimeout(_)) {
                    self.shared.stats.record_lock_timeout();
                }
                Err(err)
            }
        }
    }

    /// Committed image overlaid with this transaction's own write.
    fn visible_row(&self, table: &str, id: RowId) -> Result<Option<FieldMap>> {
        if let Some(change) = self.writes.get(table, id) {
            return Ok(Some(change.row().clone()));
        }
        self.shared
            .with_table(table, |t| Ok(t.get(id).cloned()))
    }

    fn candidate_ids(&self, table: &str, read: &LockingRead) -> Result<BTreeSet<RowId>> {
        let mut ids = self.shared.with_table(table, |t| {
            let mut ids = BTreeSet::new();
            for (id, committed) in t.iter() {
                let row = match self.writes.get(table, *id) {
                    Some(change) => change.row(),
                    None => committed,
                };
                if read.matches(&Record::new(*id, row.clone())) {
                    ids.insert(*id);
                }
            }
            Ok(ids)
        })?;

        for (id, change) in self.writes.rows_of(table) {
            if change.is_insert() && read.matches(&Record::new(id, change.row().clone())) {
                ids.insert(id);
            }
        }
        Ok(ids)
    }

    /// Locks each unique key `row` claims and fails if another row already
    /// holds it.
    async fn claim_unique_keys(
        &mut self,
        table: &str,
        row: &FieldMap,
        constraints: &[UniqueConstraint],
        ignore: Option<RowId>,
    ) -> Result<()> {
        for constraint in constraints {
            let Some(key) = constraint.key_of(row) else {
                continue;
            };
            self.lock(LockKey::unique_key(table, &constraint.name, key.clone()))
                .await?;

            if self.key_taken(table, constraint, &key, ignore)? {
                self.shared.stats.record_unique_violation();
                return Err(DbError::UniqueConstraintViolation {
                    table: table.to_string(),
                    constraint: constraint.name.clone(),
                    key: format_key(&key),
                });
            }
        }
        Ok(())
    }

    fn key_taken(
        &self,
        table: &str,
        constraint: &UniqueConstraint,
        key: &[Value],
        ignore: Option<RowId>,
    ) -> Result<bool> {
        let committed = self
            .shared
            .with_table(table, |t| Ok(t.holders_of(constraint, key, ignore)))?;
        for id in committed {
            match self.writes.get(table, id) {
                Some(change) if constraint.key_of(change.row()).as_deref() != Some(key) => {}
                _ => return Ok(true),
            }
        }

        Ok(self.writes.rows_of(table).any(|(id, change)| {
            Some(id) != ignore && constraint.key_of(change.row()).as_deref() == Some(key)
        }))
    }

    pub async fn locking_read(
        &mut self,
        table: &str,
        read: &LockingRead,
    ) -> Result<Option<Record>> {
        self.ensure_active()?;

        for id in self.candidate_ids(table, read)? {
            self.lock(LockKey::row(table, id)).await?;

            // The row may have changed while we waited for its lock.
            if let Some(row) = self.visible_row(table, id)? {
                let record = Record::new(id, row);
                if read.matches(&record) {
                    return Ok(Some(record));
                }
            }
        }
        Ok(None)
    }

    pub async fn insert(&mut self, table: &str, fields: FieldMap) -> Result<Record> {
        self.ensure_active()?;

        let (id, row, constraints) = self.shared.with_table_mut(table, |t| {
            let key_column = t.schema().key_column().to_string();
            if fields.contains_key(&key_column) {
                return Err(DbError::InvalidArgument(format!(
                    "Primary key '{}' of table '{}' is assigned by the store",
                    key_column, table
                )));
            }
            t.schema().check_fields(&fields)?;

            let id = t.allocate_id();
            let mut fields = fields;
            fields.insert(key_column, Value::Integer(id.as_u64() as i64));
            let row = t.schema().complete_row(fields)?;
            Ok((id, row, t.schema().unique_constraints().to_vec()))
        })?;

        self.lock(LockKey::row(table, id)).await?;
        self.claim_unique_keys(table, &row, &constraints, Some(id))
            .await?;

        self.writes.record_insert(table, id, row.clone());
        Ok(Record::new(id, row))
    }

    pub async fn update(&mut self, table: &str, id: RowId, changes: FieldMap) -> Result<Record> {
        self.ensure_active()?;

        let (key_column, constraints) = self.shared.with_table(table, |t| {
            t.schema().check_fields(&changes)?;
            Ok((
                t.schema().key_column().to_string(),
                t.schema().unique_constraints().to_vec(),
            ))
        })?;
        if let Some(requested) = changes.get(&key_column)
            && requested != &Value::Integer(id.as_u64() as i64)
        {
            return Err(DbError::InvalidArgument(format!(
                "Primary key '{}' of {} cannot be changed",
                key_column, id
            )));
        }

        self.lock(LockKey::row(table, id)).await?;
        let current = self.visible_row(table, id)?.ok_or_else(|| {
            DbError::ExecutionError(format!("{} not found in table '{}'", id, table))
        })?;

        let mut row = current.clone();
        row.extend(changes);

        let changed: Vec<UniqueConstraint> = constraints
            .into_iter()
            .filter(|c| c.key_of(&row) != c.key_of(&current))
            .collect();
        self.claim_unique_keys(table, &row, &changed, Some(id))
            .await?;

        self.writes.record_update(table, id, row.clone());
        Ok(Record::new(id, row))
    }

    pub async fn commit(mut self) -> Result<()> {
        self.ensure_active()?;

        let writes: Vec<_> = self.writes.drain().collect();
        let applied = writes.len();
        self.shared.apply(writes)?;
        self.state = TransactionState::Committed;
        self.shared.locks.release_all(self.id)?;
        self.shared.stats.record_commit();
        debug!("{} committed {} row(s)", self.id, applied);
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        if self.state.is_active() {
            self.abort()?;
            self.shared.stats.record_rollback();
            debug!("{} rolled back", self.id);
        }
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.state.is_active() {
            self.writes.clear();
            self.state = TransactionState::Aborted;
            if self.shared.locks.release_all(self.id).is_ok() {
                self.shared.stats.record_rollback();
                debug!("{} dropped while active, rolled back", self.id);
            }
        }
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn locking_read(&mut self, table: &str, read: &LockingRead) -> Result<Option<Record>> {
        MemoryTransaction::locking_read(self, table, read).await
    }

    async fn insert(&mut self, table: &str, fields: FieldMap) -> Result<Record> {
        MemoryTransaction::insert(self, table, fields).await
    }

    async fn update(&mut self, table: &str, id: RowId, changes: FieldMap) -> Result<Record> {
        MemoryTransaction::update(self, table, id, changes).await
    }

    async fn commit(self) -> Result<()> {
        MemoryTransaction::commit(self).await
    }

    async fn rollback(self) -> Result<()> {
        MemoryTransaction::rollback(self).await
    }
}
