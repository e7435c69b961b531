#![allow(dead_code)]

use atomic_upsert::{
    AtomicUpsertEngine, CapabilityRegistry, Column, DataType, Entity, FieldAccess, FieldMap,
    IsolationLevel, MemoryStore, MemoryStoreConfig, Result, RowId, SoftDeletes, StoreDriver,
    TableSchema, Value, fields,
};
use std::sync::Arc;
use std::time::Duration;

/// Team membership, soft-deletable through `deleted_at`.
#[derive(Debug, Clone)]
pub struct Membership {
    pub id: i64,
    pub team_id: i64,
    pub user_id: i64,
    pub role: Option<String>,
    pub deleted_at: Option<Value>,
}

impl Entity for Membership {
    fn table_name() -> &'static str {
        "memberships"
    }

    fn soft_deletes() -> Option<SoftDeletes> {
        Some(SoftDeletes::deleted_at())
    }

    fn from_fields(fields: &FieldMap) -> Result<Self> {
        Ok(Self {
            id: fields.require_i64("id")?,
            team_id: fields.require_i64("team_id")?,
            user_id: fields.require_i64("user_id")?,
            role: fields.optional_text("role")?,
            deleted_at: fields.optional_timestamp("deleted_at")?.map(Value::Timestamp),
        })
    }

    fn primary_key(&self) -> Value {
        Value::Integer(self.id)
    }
}

/// Hard-delete-only entity whose table has no marker column.
#[derive(Debug, Clone)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
}

impl Entity for Tag {
    fn table_name() -> &'static str {
        "tags"
    }

    fn from_fields(fields: &FieldMap) -> Result<Self> {
        Ok(Self {
            id: fields.require_i64("id")?,
            name: fields.require_text("name")?,
            color: fields.optional_text("color")?,
        })
    }

    fn primary_key(&self) -> Value {
        Value::Integer(self.id)
    }
}

/// Hard-delete-only entity stored in a table that does carry a marker column.
#[derive(Debug, Clone)]
pub struct Label {
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
}

impl Entity for Label {
    fn table_name() -> &'static str {
        "labels"
    }

    fn from_fields(fields: &FieldMap) -> Result<Self> {
        Ok(Self {
            id: fields.require_i64("id")?,
            name: fields.require_text("name")?,
            color: fields.optional_text("color")?,
        })
    }

    fn primary_key(&self) -> Value {
        Value::Integer(self.id)
    }
}

pub fn memberships_schema() -> TableSchema {
    TableSchema::new("memberships")
        .column(Column::new("team_id", DataType::Integer).not_null())
        .column(Column::new("user_id", DataType::Integer).not_null())
        .column(Column::new("role", DataType::Text))
        .column(Column::new("deleted_at", DataType::Timestamp))
        .unique("memberships_team_user_unique", &["team_id", "user_id"])
}

pub fn tags_schema() -> TableSchema {
    TableSchema::new("tags")
        .column(Column::new("name", DataType::Text).not_null())
        .column(Column::new("color", DataType::Text))
        .unique("tags_name_unique", &["name"])
}

pub fn labels_schema() -> TableSchema {
    TableSchema::new("labels")
        .column(Column::new("name", DataType::Text).not_null())
        .column(Column::new("color", DataType::Text))
        .column(Column::new("deleted_at", DataType::Timestamp))
        .unique("labels_name_unique", &["name"])
}

pub fn store_with(config: MemoryStoreConfig) -> MemoryStore {
    let store = MemoryStore::with_config(config);
    store.create_table(memberships_schema()).unwrap();
    store.create_table(tags_schema()).unwrap();
    store.create_table(labels_schema()).unwrap();
    store
}

pub fn store() -> MemoryStore {
    store_with(MemoryStoreConfig::default())
}

pub fn short_lock_store(timeout_ms: u64) -> MemoryStore {
    store_with(MemoryStoreConfig::new().lock_wait_timeout(Duration::from_millis(timeout_ms)))
}

/// Engine with a private capability registry so tests don't share cache state.
pub fn engine<D: StoreDriver>(driver: D) -> AtomicUpsertEngine<D> {
    AtomicUpsertEngine::new(driver).with_capabilities(Arc::new(CapabilityRegistry::new()))
}

pub fn membership(team_id: i64, user_id: i64) -> FieldMap {
    fields! { "team_id" => team_id, "user_id" => user_id }
}

pub async fn soft_delete(store: &MemoryStore, table: &str, id: RowId) {
    let mut tx = store
        .begin_transaction(IsolationLevel::ReadCommitted)
        .unwrap();
    tx.update(table, id, fields! { "deleted_at" => chrono::Utc::now() })
        .await
        .unwrap();
    tx.commit().await.unwrap();
}
