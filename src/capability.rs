// ============================================================================
// Entity Capability Registry
// ============================================================================
//
// Memoizes per-type capability answers for the lifetime of the process.
// Entries are written once and never change, so concurrent first lookups
// may compute redundantly but always converge on the same value.
//
// ============================================================================

use crate::core::Result;
use crate::entity::Entity;
use lazy_static::lazy_static;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Soft-delete support of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftDeleteCapability {
    Unsupported,
    Supported { column: &'static str },
}

impl SoftDeleteCapability {
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Supported { .. })
    }

    /// Deletion-marker column, only when soft deletes are supported.
    pub fn column(&self) -> Option<&'static str> {
        match self {
            Self::Supported { column } => Some(*column),
            Self::Unsupported => None,
        }
    }
}

// Global singleton instance of CapabilityRegistry
lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<CapabilityRegistry> = Arc::new(CapabilityRegistry::new());
}

#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    soft_deletes: RwLock<HashMap<TypeId, SoftDeleteCapability>>,
    computations: AtomicU64,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry shared by every engine that is not given its own.
    pub fn global() -> &'static Arc<CapabilityRegistry> {
        &GLOBAL_REGISTRY
    }

    pub fn supports_soft_delete<E: Entity>(&self) -> Result<bool> {
        Ok(self.capability::<E>()?.is_supported())
    }

    pub fn capability<E: Entity>(&self) -> Result<SoftDeleteCapability> {
        let key = TypeId::of::<E>();
        if let Some(cached) = self.soft_deletes.read()?.get(&key) {
            return Ok(*cached);
        }

        let computed = Self::inspect::<E>();
        self.computations.fetch_add(1, Ordering::Relaxed);

        let mut cache = self.soft_deletes.write()?;
        Ok(*cache.entry(key).or_insert(computed))
    }

    /// Number of times a capability was computed rather than served from cache.
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }

    pub fn cached_types(&self) -> Result<usize> {
        Ok(self.soft_deletes.read()?.len())
    }

    fn inspect<E: Entity>() -> SoftDeleteCapability {
        match E::soft_deletes() {
            Some(declared) => SoftDeleteCapability::Supported {
                column: declared.column,
            },
            None => SoftDeleteCapability::Unsupported,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldMap, Value};
    use crate::entity::SoftDeletes;

    struct Plain;
    struct Archivable;

    impl Entity for Plain {
        fn table_name() -> &'static str {
            "plain"
        }
        fn from_fields(_fields: &FieldMap) -> Result<Self> {
            Ok(Plain)
        }
        fn primary_key(&self) -> Value {
            Value::Null
        }
    }

    impl Entity for Archivable {
        fn table_name() -> &'static str {
            "archivable"
        }
        fn soft_deletes() -> Option<SoftDeletes> {
            Some(SoftDeletes::column("archived_at"))
        }
        fn from_fields(_fields: &FieldMap) -> Result<Self> {
            Ok(Archivable)
        }
        fn primary_key(&self) -> Value {
            Value::Null
        }
    }

    #[test]
    fn test_capability_is_memoized() {
        let registry = CapabilityRegistry::new();

        assert!(!registry.supports_soft_delete::<Plain>().unwrap());
        assert!(!registry.supports_soft_delete::<Plain>().unwrap());
        assert_eq!(registry.computations(), 1);

        assert_eq!(
            registry.capability::<Archivable>().unwrap(),
            SoftDeleteCapability::Supported {
                column: "archived_at"
            }
        );
        registry.capability::<Archivable>().unwrap();
        assert_eq!(registry.computations(), 2);
        assert_eq!(registry.cached_types().unwrap(), 2);
    }

    #[test]
    fn test_concurrent_first_lookup_converges() {
        let registry = Arc::new(CapabilityRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.capability::<Archivable>().unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().column(), Some("archived_at"));
        }
        assert_eq!(registry.cached_types().unwrap(), 1);
        assert!(registry.computations() >= 1);
    }

    #[test]
    fn test_global_registry_is_shared() {
        assert!(Arc::ptr_eq(CapabilityRegistry::global(), CapabilityRegistry::global()));
        assert!(CapabilityRegistry::global().supports_soft_delete::<Archivable>().unwrap());
    }
}
