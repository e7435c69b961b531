use crate::capability::SoftDeleteCapability;
use crate::core::{Record, Value};

/// Brings a soft-deleted row back to life before it is updated.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftDeleteReconciler;

impl SoftDeleteReconciler {
    /// Clears the deletion marker in place. Returns `true` when the record
    /// was marked and has been restored.
    pub fn reconcile(record: &mut Record, capability: SoftDeleteCapability) -> bool {
        let Some(column) = capability.column() else {
            return false;
        };
        if !record.is_marked_deleted(column) {
            return false;
        }
        record.fields.insert(column.to_string(), Value::Null);
        true
    }
}
