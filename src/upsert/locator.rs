use crate::capability::SoftDeleteCapability;
use crate::core::{DbError, FieldMap, Record, Result};
use crate::driver::{LockingRead, StoreTransaction};

/// Finds the row matching a set of identity attributes under a row lock.
#[derive(Debug, Default, Clone, Copy)]
pub struct RowLocator;

impl RowLocator {
    /// Builds the locking read for `identity`.
    ///
    /// Marked rows are excluded only when the entity supports soft deletes
    /// and the caller asked for live rows; an entity without soft-delete
    /// support never has its marker column referenced.
    pub fn request(
        identity: &FieldMap,
        capability: SoftDeleteCapability,
        include_soft_deleted: bool,
    ) -> Result<LockingRead> {
        if identity.is_empty() {
            return Err(DbError::InvalidArgument(
                "identity attributes must contain at least one column".into(),
            ));
        }

        let read = LockingRead::new(identity.clone());
        Ok(match capability.column() {
            Some(column) if !include_soft_deleted => read.excluding_marked(column),
            _ => read,
        })
    }

    pub async fn locate<T: StoreTransaction>(
        tx: &mut T,
        table: &str,
        identity: &FieldMap,
        capability: SoftDeleteCapability,
        include_soft_deleted: bool,
    ) -> Result<Option<Record>> {
        let read = Self::request(identity, capability, include_soft_deleted)?;
        tx.locking_read(table, &read).await
    }
}
