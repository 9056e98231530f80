//! Host-provided logic catalog.
//!
//! Bundles declare modules by entry id; the catalog holds the executable
//! logic those ids link to.

use crate::bundle::manifest::is_valid_dotted_id;
use crate::engine::logic::ModuleLogic;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Catalog registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    InvalidEntryId(String),
    DuplicateEntryId(String),
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEntryId(value) => write!(f, "logic entry id is invalid: {value}"),
            Self::DuplicateEntryId(value) => {
                write!(f, "logic entry id already registered: {value}")
            }
        }
    }
}

impl Error for CatalogError {}

/// Entry id to module logic mapping.
#[derive(Clone, Default)]
pub struct LogicCatalog {
    entries: BTreeMap<String, Arc<dyn ModuleLogic>>,
}

impl LogicCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one logic implementation.
    pub fn register(
        &mut self,
        entry: &str,
        logic: Arc<dyn ModuleLogic>,
    ) -> Result<(), CatalogError> {
        let entry = entry.trim().to_string();
        if !is_valid_dotted_id(&entry) {
            return Err(CatalogError::InvalidEntryId(entry));
        }
        if self.entries.contains_key(entry.as_str()) {
            return Err(CatalogError::DuplicateEntryId(entry));
        }
        self.entries.insert(entry, logic);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with(
        mut self,
        entry: &str,
        logic: impl ModuleLogic + 'static,
    ) -> Result<Self, CatalogError> {
        self.register(entry, Arc::new(logic))?;
        Ok(self)
    }

    pub fn get(&self, entry: &str) -> Option<Arc<dyn ModuleLogic>> {
        self.entries.get(entry.trim()).cloned()
    }

    /// Returns sorted entry ids.
    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for LogicCatalog {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicCatalog")
            .field("entries", &self.entry_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{CatalogError, LogicCatalog};
    use crate::engine::logic::{ConstructionError, ModuleInstance};
    use crate::model::props::PropertySet;

    struct Noop;

    impl ModuleInstance for Noop {}

    fn noop(_props: &PropertySet) -> Result<Box<dyn ModuleInstance>, ConstructionError> {
        Ok(Box::new(Noop))
    }

    #[test]
    fn registers_and_resolves_entries() {
        let catalog = LogicCatalog::new()
            .with("demo.clock", noop)
            .and_then(|catalog| catalog.with("demo.list", noop))
            .expect("catalog registration");
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get(" demo.clock ").is_some());
        assert!(catalog.get("demo.gauge").is_none());
        assert_eq!(catalog.entry_ids(), vec!["demo.clock", "demo.list"]);
    }

    #[test]
    fn rejects_invalid_or_duplicate_entry_ids() {
        let err = LogicCatalog::new()
            .with("Demo Clock", noop)
            .expect_err("invalid id must fail");
        assert!(matches!(err, CatalogError::InvalidEntryId(_)));

        let err = LogicCatalog::new()
            .with("demo.clock", noop)
            .and_then(|catalog| catalog.with("demo.clock", noop))
            .expect_err("duplicate id must fail");
        assert_eq!(err, CatalogError::DuplicateEntryId("demo.clock".to_string()));
    }
}
