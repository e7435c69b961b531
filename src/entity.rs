use crate::core::{FieldMap, Result, Value};

/// Default primary key column for entity tables.
pub const DEFAULT_KEY_COLUMN: &str = "id";

/// Declares that an entity type is soft-deletable through `column`.
///
/// A non-null value in the column means the row is logically absent but
/// still occupies its unique keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftDeletes {
    pub column: &'static str,
}

impl SoftDeletes {
    pub const fn column(column: &'static str) -> Self {
        Self { column }
    }

    pub const fn deleted_at() -> Self {
        Self::column("deleted_at")
    }
}

/// A record type the upsert engine can locate, create and rebuild.
///
/// Capabilities are static properties of the type, never of an instance.
pub trait Entity: Sized + Send + Sync + 'static {
    /// Table the entity is stored in.
    fn table_name() -> &'static str;

    /// Store-assigned primary key column; never accepted in upsert values.
    fn key_column() -> &'static str {
        DEFAULT_KEY_COLUMN
    }

    /// Soft-delete declaration, `None` for hard-delete-only types.
    fn soft_deletes() -> Option<SoftDeletes> {
        None
    }

    /// Builds an instance from the full field map of a stored row.
    fn from_fields(fields: &FieldMap) -> Result<Self>;

    fn primary_key(&self) -> Value;
}
