// ============================================================================
// Lock Manager
// ============================================================================
//
// Exclusive, transaction-scoped locks on rows and unique keys.
//
// - Locks are re-entrant per transaction and released only all at once,
//   when the owning transaction commits, rolls back or is dropped.
// - Every blocked request records an edge in the wait-for graph. A request
//   whose edge would close a cycle fails immediately with
//   `DeadlockDetected`; the requester is the victim.
// - Waiters park on a shared `Notify` and re-check ownership on every
//   release.
//
// ============================================================================

use super::transaction::TransactionId;
use crate::core::{DbError, Result, RowId, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    Row {
        table: String,
        id: RowId,
    },
    UniqueKey {
        table: String,
        constraint: String,
        key: Vec<Value>,
    },
}

impl LockKey {
    pub fn row(table: &str, id: RowId) -> Self {
        Self::Row {
            table: table.to_string(),
            id,
        }
    }

    pub fn unique_key(table: &str, constraint: &str, key: Vec<Value>) -> Self {
        Self::UniqueKey {
            table: table.to_string(),
            constraint: constraint.to_string(),
            key,
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Row { table, id } => write!(f, "{}.{}", table, id),
            Self::UniqueKey {
                table,
                constraint,
                key,
            } => write!(f, "{}.{}{}", table, constraint, format_key(key)),
        }
    }
}

pub(crate) fn format_key(key: &[Value]) -> String {
    let parts: Vec<String> = key.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(", "))
}

#[derive(Debug, Default)]
struct LockTable {
    owners: HashMap<LockKey, TransactionId>,
    held: HashMap<TransactionId, Vec<LockKey>>,
    waits_for: HashMap<TransactionId, TransactionId>,
}

impl LockTable {
    fn grant(&mut self, txn: TransactionId, key: LockKey) {
        self.waits_for.remove(&txn);
        self.held.entry(txn).or_default().push(key.clone());
        self.owners.insert(key, txn);
    }

    /// Whether `txn` waiting on `owner` would close a cycle.
    fn closes_cycle(&self, txn: TransactionId, owner: TransactionId) -> bool {
        let mut current = owner;
        for _ in 0..=self.waits_for.len() {
            if current == txn {
                return true;
            }
            match self.waits_for.get(&current) {
                Some(next) => current = *next,
                None => return false,
            }
        }
        false
    }
}

pub struct LockManager {
    state: Mutex<LockTable>,
    released: Notify,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockTable::default()),
            released: Notify::new(),
        }
    }

    /// Acquires `key` for `txn`, waiting at most `timeout` for its owner.
    pub async fn acquire(
        &self,
        txn: TransactionId,
        key: LockKey,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before inspecting ownership so a release
            // between the check and the wait is not missed.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut table = self.state.lock()?;
                match table.owners.get(&key).copied() {
                    None => {
                        table.grant(txn, key);
                        return Ok(());
                    }
                    Some(owner) if owner == txn => {
                        table.waits_for.remove(&txn);
                        return Ok(());
                    }
                    Some(owner) => {
                        if table.closes_cycle(txn, owner) {
                            table.waits_for.remove(&txn);
                            return Err(DbError::DeadlockDetected(format!(
                                "{} waiting for {} on {} which waits for {}",
                                txn, owner, key, txn
                            )));
                        }
                        table.waits_for.insert(txn, owner);
                    }
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let mut table = self.state.lock()?;
                table.waits_for.remove(&txn);
                let owner = table.owners.get(&key).copied();
                return Err(DbError::LockTimeout(match owner {
                    Some(owner) => format!(
                        "{} gave up on {} held by {} after {:?}",
                        txn, key, owner, timeout
                    ),
                    None => format!("{} gave up on {} after {:?}", txn, key, timeout),
                }));
            }
        }
    }

    pub fn holds(&self, txn: TransactionId, key: &LockKey) -> Result<bool> {
        let table = self.state.lock()?;
        Ok(table.owners.get(key) == Some(&txn))
    }

    /// Releases every lock of `txn` and wakes all waiters.
    pub fn release_all(&self, txn: TransactionId) -> Result<usize> {
        let released = {
            let mut table = self.state.lock()?;
            table.waits_for.remove(&txn);
            table.waits_for.retain(|_, owner| *owner != txn);
            let keys = table.held.remove(&txn).unwrap_or_default();
            for key in &keys {
                if table.owners.get(key) == Some(&txn) {
                    table.owners.remove(key);
                }
            }
            keys.len()
        };
        self.released.notify_waiters();
        Ok(released)
    }

    pub fn held_count(&self) -> Result<usize> {
        Ok(self.state.lock()?.owners.len())
    }
}
