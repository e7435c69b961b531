use super::{DbError, Result, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Column name to value. Ordering is irrelevant to every caller; the
/// `BTreeMap` only keeps debug output and lock keys deterministic.
pub type FieldMap = BTreeMap<String, Value>;

/// Builds a [`FieldMap`] from `column => value` pairs.
///
/// ```
/// use atomic_upsert::{fields, Value};
///
/// let identity = fields! { "team_id" => 1, "user_id" => 42 };
/// assert_eq!(identity.get("user_id"), Some(&Value::Integer(42)));
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::FieldMap::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::FieldMap::new();
        $(
            map.insert(::std::string::String::from($column), $crate::Value::from($value));
        )+
        map
    }};
}

/// Store-assigned primary key of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl RowId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row_{}", self.0)
    }
}

/// A row as the store returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RowId,
    pub fields: FieldMap,
}

impl Record {
    pub fn new(id: RowId, fields: FieldMap) -> Self {
        Self { id, fields }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    /// `true` when `column` holds a non-null deletion marker.
    pub fn is_marked_deleted(&self, column: &str) -> bool {
        self.fields.get(column).is_some_and(|value| !value.is_null())
    }

    /// `true` when every identity pair matches this row.
    pub fn matches(&self, identity: &FieldMap) -> bool {
        identity
            .iter()
            .all(|(column, expected)| self.fields.get(column).unwrap_or(&Value::Null) == expected)
    }
}

/// Typed accessors used by `Entity::from_fields` implementations.
pub trait FieldAccess {
    fn value(&self, column: &str) -> Result<&Value>;

    fn require_i64(&self, column: &str) -> Result<i64> {
        let value = self.value(column)?;
        value.as_i64().ok_or_else(|| mismatch(column, "INTEGER", value))
    }

    fn require_text(&self, column: &str) -> Result<String> {
        let value = self.value(column)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch(column, "TEXT", value))
    }

    fn optional_text(&self, column: &str) -> Result<Option<String>> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            other => Err(mismatch(column, "TEXT", other)),
        }
    }

    fn optional_timestamp(&self, column: &str) -> Result<Option<DateTime<Utc>>> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Timestamp(ts) => Ok(Some(*ts)),
            other => Err(mismatch(column, "TIMESTAMP", other)),
        }
    }
}

impl FieldAccess for FieldMap {
    fn value(&self, column: &str) -> Result<&Value> {
        self.get(column).ok_or_else(|| {
            DbError::ExecutionError(format!("Field '{}' missing from record", column))
        })
    }
}

fn mismatch(column: &str, expected: &str, got: &Value) -> DbError {
    DbError::TypeMismatch(format!(
        "Field '{}' expects {}, got {}",
        column,
        expected,
        got.type_name()
    ))
}
