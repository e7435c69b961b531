use super::schema::{TableSchema, UniqueConstraint};
use crate::core::{FieldMap, Record, RowId, Value};
use std::collections::BTreeMap;

/// Committed state of one table.
#[derive(Debug, Clone)]
pub struct Table {
    schema: TableSchema,
    rows: BTreeMap<RowId, FieldMap>,
    next_row_id: u64,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            next_row_id: 1,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Hands out the next primary key. Ids of rolled-back inserts are
    /// never reused.
    pub fn allocate_id(&mut self) -> RowId {
        let id = RowId(self.next_row_id);
        self.next_row_id += 1;
        id
    }

    pub fn get(&self, id: RowId) -> Option<&FieldMap> {
        self.rows.get(&id)
    }

    pub fn put(&mut self, id: RowId, row: FieldMap) {
        self.rows.insert(id, row);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|(id, row)| Record::new(*id, row.clone()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RowId, &FieldMap)> {
        self.rows.iter()
    }

    /// Committed rows other than `ignore` that carry `key` for `constraint`.
    pub fn holders_of(
        &self,
        constraint: &UniqueConstraint,
        key: &[Value],
        ignore: Option<RowId>,
    ) -> Vec<RowId> {
        self.rows
            .iter()
            .filter(|(id, _)| Some(**id) != ignore)
            .filter(|(_, row)| constraint.key_of(row).as_deref() == Some(key))
            .map(|(id, _)| *id)
            .collect()
    }
}
