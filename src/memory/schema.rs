use crate::core::{Column, DataType, DbError, FieldMap, Result, Value};
use crate::entity::DEFAULT_KEY_COLUMN;
use serde::{Deserialize, Serialize};

/// Named uniqueness constraint over a set of columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub name: String,
    pub columns: Vec<String>,
}

impl UniqueConstraint {
    /// Key tuple of `row` for this constraint. `None` when any part is
    /// NULL, since NULL keys never collide.
    pub fn key_of(&self, row: &FieldMap) -> Option<Vec<Value>> {
        let mut key = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            match row.get(column) {
                Some(value) if !value.is_null() => key.push(value.clone()),
                _ => return None,
            }
        }
        Some(key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    key_column: String,
    columns: Vec<Column>,
    unique: Vec<UniqueConstraint>,
}

impl TableSchema {
    /// New table whose integer primary key column is `id`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_column: DEFAULT_KEY_COLUMN.to_string(),
            columns: vec![Column::new(DEFAULT_KEY_COLUMN, DataType::Integer).not_null()],
            unique: Vec::new(),
        }
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        if let Some(key) = self.columns.iter_mut().find(|c| c.name == self.key_column) {
            key.name = column.clone();
        }
        self.key_column = column;
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn unique(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.unique.push(UniqueConstraint {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn unique_constraints(&self) -> &[UniqueConstraint] {
        &self.unique
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.name == name)
    }

    /// Checks that every referenced column exists.
    pub fn validate_definition(&self) -> Result<()> {
        for constraint in &self.unique {
            if constraint.columns.is_empty() {
                return Err(DbError::ConstraintViolation(format!(
                    "Unique constraint '{}' has no columns",
                    constraint.name
                )));
            }
            for column in &constraint.columns {
                if self.get_column(column).is_none() {
                    return Err(DbError::ColumnNotFound(column.clone(), self.name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Rejects unknown columns and validates types of the given fields.
    pub fn check_fields(&self, fields: &FieldMap) -> Result<()> {
        for (name, value) in fields {
            let column = self
                .get_column(name)
                .ok_or_else(|| DbError::ColumnNotFound(name.clone(), self.name.clone()))?;
            column.validate(value)?;
        }
        Ok(())
    }

    /// Full row image: every column present, missing ones NULL.
    pub fn complete_row(&self, fields: FieldMap) -> Result<FieldMap> {
        self.check_fields(&fields)?;
        let mut row = fields;
        for column in &self.columns {
            let value = row.entry(column.name.clone()).or_insert(Value::Null);
            column.validate(value)?;
        }
        Ok(row)
    }
}
