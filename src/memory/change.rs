// ============================================================================
// Transaction Write Set
// ============================================================================
//
// Pending writes of one transaction. Nothing here is visible to other
// transactions until commit applies the set to the committed tables.
//
// ============================================================================

use crate::core::{FieldMap, RowId};
use std::collections::BTreeMap;

/// Full row image written by a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    InsertRow { row: FieldMap },
    UpdateRow { row: FieldMap },
}

impl Change {
    pub fn row(&self) -> &FieldMap {
        match self {
            Change::InsertRow { row } | Change::UpdateRow { row } => row,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Change::InsertRow { .. })
    }
}

#[derive(Debug, Default)]
pub struct WriteSet {
    changes: BTreeMap<(String, RowId), Change>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table: &str, id: RowId) -> Option<&Change> {
        self.changes.get(&(table.to_string(), id))
    }

    pub fn record_insert(&mut self, table: &str, id: RowId, row: FieldMap) {
        self.changes
            .insert((table.to_string(), id), Change::InsertRow { row });
    }

    /// An update of a row inserted by the same transaction stays an insert.
    pub fn record_update(&mut self, table: &str, id: RowId, row: FieldMap) {
        let key = (table.to_string(), id);
        let change = match self.changes.get(&key) {
            Some(existing) if existing.is_insert() => Change::InsertRow { row },
            _ => Change::UpdateRow { row },
        };
        self.changes.insert(key, change);
    }

    /// Rows of `table` written by this transaction, in id order.
    pub fn rows_of<'a>(&'a self, table: &'a str) -> impl Iterator<Item = (RowId, &'a Change)> + 'a {
        self.changes
            .iter()
            .filter(move |((name, _), _)| name == table)
            .map(|((_, id), change)| (*id, change))
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    pub fn drain(&mut self) -> impl Iterator<Item = ((String, RowId), Change)> + '_ {
        std::mem::take(&mut self.changes).into_iter()
    }
}
