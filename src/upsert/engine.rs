use super::config::UpsertConfig;
use super::locator::RowLocator;
use super::reconcile::SoftDeleteReconciler;
use super::retry::ConflictRetryController;
use crate::capability::CapabilityRegistry;
use crate::core::{DbError, FieldMap, Record, Result, Value};
use crate::driver::{StoreDriver, StoreTransaction};
use crate::entity::Entity;
use log::{debug, warn};
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// Result of a successful upsert.
#[derive(Debug, Clone)]
pub struct UpsertOutcome<E> {
    pub entity: E,
    /// Row image as committed.
    pub record: Record,
    /// `true` iff this call inserted the row.
    pub was_created: bool,
    /// `true` when a soft-deleted row was revived.
    pub restored: bool,
}

#[derive(Debug)]
struct Written {
    record: Record,
    was_created: bool,
    restored: bool,
}

/// Atomic update-or-create keyed by identity attributes.
///
/// Each attempt runs in one store transaction: a locking read by identity
/// (soft-deleted rows included when the entity supports them), then either
/// restore-and-update of the found row or an insert of identity merged with
/// values. Unique-key races and deadlocks re-run the whole attempt.
///
/// # Examples
///
/// ```
/// use atomic_upsert::{
///     AtomicUpsertEngine, Column, DataType, Entity, FieldAccess, FieldMap, MemoryStore,
///     Result, TableSchema, Value, fields,
/// };
///
/// struct Setting {
///     id: i64,
///     value: String,
/// }
///
/// impl Entity for Setting {
///     fn table_name() -> &'static str {
///         "settings"
///     }
///     fn from_fields(fields: &FieldMap) -> Result<Self> {
///         Ok(Self {
///             id: fields.require_i64("id")?,
///             value: fields.require_text("value")?,
///         })
///     }
///     fn primary_key(&self) -> Value {
///         Value::Integer(self.id)
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() -> Result<()> {
/// let store = MemoryStore::new();
/// store.create_table(
///     TableSchema::new("settings")
///         .column(Column::new("key", DataType::Text).not_null())
///         .column(Column::new("value", DataType::Text))
///         .unique("settings_key_unique", &["key"]),
/// )?;
///
/// let engine = AtomicUpsertEngine::new(store);
/// let first = engine
///     .upsert::<Setting>(fields! { "key" => "theme" }, fields! { "value" => "dark" })
///     .await?;
/// let second = engine
///     .upsert::<Setting>(fields! { "key" => "theme" }, fields! { "value" => "light" })
///     .await?;
///
/// assert!(first.was_created);
/// assert!(!second.was_created);
/// assert_eq!(second.entity.value, "light");
/// # Ok(())
/// # }
/// ```
pub struct AtomicUpsertEngine<D: StoreDriver> {
    driver: D,
    capabilities: Arc<CapabilityRegistry>,
    retry: ConflictRetryController,
    config: UpsertConfig,
}

impl<D: StoreDriver> AtomicUpsertEngine<D> {
    /// Engine with default configuration and the process-wide registry.
    pub fn new(driver: D) -> Self {
        let config = UpsertConfig::default();
        Self {
            driver,
            capabilities: Arc::clone(CapabilityRegistry::global()),
            retry: ConflictRetryController::new(config.retry.clone()),
            config,
        }
    }

    pub fn with_config(driver: D, config: UpsertConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            driver,
            capabilities: Arc::clone(CapabilityRegistry::global()),
            retry: ConflictRetryController::new(config.retry.clone()),
            config,
        })
    }

    /// Uses `registry` instead of the process-wide one.
    pub fn with_capabilities(mut self, registry: Arc<CapabilityRegistry>) -> Self {
        self.capabilities = registry;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn config(&self) -> &UpsertConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &Arc<CapabilityRegistry> {
        &self.capabilities
    }

    /// Updates the row matching `identity` with `values`, creating it from
    /// `identity` merged with `values` when none exists.
    ///
    /// On conflict exhaustion or any fatal store failure, the underlying
    /// error is returned as raised by the store.
    pub async fn upsert<E: Entity>(
        &self,
        identity: FieldMap,
        values: FieldMap,
    ) -> Result<UpsertOutcome<E>> {
        let span = info_span!("upsert", table = %E::table_name());
        async move {
            if identity.is_empty() {
                return Err(DbError::InvalidArgument(format!(
                    "upsert into '{}' needs at least one identity attribute",
                    E::table_name()
                )));
            }
            if values.contains_key(E::key_column()) {
                return Err(DbError::InvalidArgument(format!(
                    "upsert into '{}' cannot assign primary key '{}'",
                    E::table_name(),
                    E::key_column()
                )));
            }

            let identity = &identity;
            let values = &values;
            let written = self
                .retry
                .run(move |attempt| self.attempt::<E>(attempt, identity, values))
                .await?;

            let entity = E::from_fields(&written.record.fields)?;
            event!(
                Level::DEBUG,
                id = %written.record.id,
                was_created = written.was_created,
                restored = written.restored,
                "upsert applied"
            );
            Ok(UpsertOutcome {
                entity,
                record: written.record,
                was_created: written.was_created,
                restored: written.restored,
            })
        }
        .instrument(span)
        .await
    }

    /// One transactional attempt. The transaction is always finished
    /// before this returns.
    async fn attempt<E: Entity>(
        &self,
        attempt: usize,
        identity: &FieldMap,
        values: &FieldMap,
    ) -> Result<Written> {
        let mut tx = self.driver.begin(self.config.isolation).await?;

        match Self::apply::<E>(&self.capabilities, &mut tx, identity, values).await {
            Ok(written) => {
                tx.commit().await?;
                debug!(
                    "upsert attempt {} committed {} ({})",
                    attempt,
                    written.record.id,
                    if written.was_created { "created" } else { "updated" }
                );
                Ok(written)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        "rollback after failed upsert attempt {} failed: {}",
                        attempt, rollback_err
                    );
                }
                debug!("upsert attempt {} rolled back: {}", attempt, err);
                Err(err)
            }
        }
    }

    async fn apply<E: Entity>(
        capabilities: &CapabilityRegistry,
        tx: &mut D::Transaction,
        identity: &FieldMap,
        values: &FieldMap,
    ) -> Result<Written> {
        let capability = capabilities.capability::<E>()?;
        let table = E::table_name();

        let located =
            RowLocator::locate(tx, table, identity, capability, capability.is_supported()).await?;

        match located {
            Some(mut record) => {
                let restored = SoftDeleteReconciler::reconcile(&mut record, capability);

                let mut changes = FieldMap::new();
                if restored && let Some(column) = capability.column() {
                    changes.insert(column.to_string(), Value::Null);
                }
                changes.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));

                let record = if changes.is_empty() {
                    record
                } else {
                    tx.update(table, record.id, changes).await?
                };
                Ok(Written {
                    record,
                    was_created: false,
                    restored,
                })
            }
            None => {
                let mut create = identity.clone();
                create.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));

                let record = tx.insert(table, create).await?;
                Ok(Written {
                    record,
                    was_created: true,
                    restored: false,
                })
            }
        }
    }
}
