//! Module registry.
//!
//! # Responsibility
//! - Map module names declared by the loaded bundle to factory descriptors.
//!
//! # Invariants
//! - A table is built once per load cycle and never mutated afterwards.
//! - Replacement swaps the whole table; readers see the old table or the new
//!   one, never a mix.
//! - Duplicate names are rejected while building, not overwritten.

use crate::bundle::LoadError;
use log::info;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Reference to the engine-side factory for one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FactoryRef {
    pub engine_id: u64,
    pub slot: usize,
}

/// One resolvable module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: String,
    pub entry: String,
    pub factory: FactoryRef,
}

/// Immutable name -> descriptor table for one load cycle.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ModuleTable {
    entries: BTreeMap<String, ModuleDescriptor>,
}

impl ModuleTable {
    /// Builds a table from engine-registered descriptors.
    ///
    /// # Errors
    /// - `DuplicateModule` when two descriptors share a name.
    pub fn build(
        descriptors: impl IntoIterator<Item = ModuleDescriptor>,
    ) -> Result<Self, LoadError> {
        let mut entries = BTreeMap::new();
        for descriptor in descriptors {
            if entries.contains_key(descriptor.name.as_str()) {
                return Err(LoadError::DuplicateModule(descriptor.name));
            }
            entries.insert(descriptor.name.clone(), descriptor);
        }
        Ok(Self { entries })
    }

    pub fn get(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.entries.get(name)
    }

    /// Returns sorted module names.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Swappable registry shared between host threads.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    table: RwLock<Arc<ModuleTable>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, name: &str) -> Option<ModuleDescriptor> {
        self.snapshot().get(name).cloned()
    }

    /// Current table; stays valid even if the registry is swapped later.
    pub fn snapshot(&self) -> Arc<ModuleTable> {
        let guard = self
            .table
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*guard)
    }

    /// Atomically replaces the whole table, returning the previous one.
    pub fn install(&self, table: ModuleTable) -> Arc<ModuleTable> {
        let modules = table.len();
        let next = Arc::new(table);
        let previous = {
            let mut guard = self
                .table
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *guard, next)
        };
        info!(
            "event=registry_install module=registry status=ok modules={} replaced={}",
            modules,
            previous.len()
        );
        previous
    }

    /// Installs an empty table so no lookup can succeed.
    pub fn clear(&self) {
        self.install(ModuleTable::default());
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}
