//! Bundle byte sources.
//!
//! # Responsibility
//! - Resolve a `BundleLocation` into raw bundle bytes.
//!
//! # Invariants
//! - Sources never mutate runtime state; they only read.
//! - A location a source cannot resolve is reported as `LoadError::NotFound`.

use crate::bundle::LoadError;
use crate::model::location::BundleLocation;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::sync::{Arc, RwLock};

/// Byte-level bundle fetch capability.
pub trait BundleSource: Send + Sync {
    fn fetch(&self, location: &BundleLocation) -> Result<Vec<u8>, LoadError>;
}

/// Reads `BundleLocation::File` paths from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileBundleSource;

impl BundleSource for FileBundleSource {
    fn fetch(&self, location: &BundleLocation) -> Result<Vec<u8>, LoadError> {
        let BundleLocation::File(path) = location else {
            return Err(LoadError::NotFound(location.to_string()));
        };
        std::fs::read(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                LoadError::NotFound(location.to_string())
            }
            _ => LoadError::ParseFailure(format!("failed to read `{location}`: {err}")),
        })
    }
}

/// In-process keyed bundle store for `BundleLocation::Memory`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBundleSource {
    bundles: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryBundleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores (or replaces) the bytes served for `key`.
    pub fn insert(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let mut bundles = self
            .bundles
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        bundles.insert(key.into(), bytes.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.bundles
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(key)
    }
}

impl BundleSource for InMemoryBundleSource {
    fn fetch(&self, location: &BundleLocation) -> Result<Vec<u8>, LoadError> {
        let BundleLocation::Memory(key) = location else {
            return Err(LoadError::NotFound(location.to_string()));
        };
        self.bundles
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key.as_str())
            .cloned()
            .ok_or_else(|| LoadError::NotFound(location.to_string()))
    }
}

/// Dispatches on location scheme to the file or in-memory source.
#[derive(Debug, Clone, Default)]
pub struct CompositeBundleSource {
    files: FileBundleSource,
    memory: InMemoryBundleSource,
}

impl CompositeBundleSource {
    pub fn new(memory: InMemoryBundleSource) -> Self {
        Self {
            files: FileBundleSource,
            memory,
        }
    }

    pub fn memory(&self) -> &InMemoryBundleSource {
        &self.memory
    }
}

impl BundleSource for CompositeBundleSource {
    fn fetch(&self, location: &BundleLocation) -> Result<Vec<u8>, LoadError> {
        match location {
            BundleLocation::File(_) => self.files.fetch(location),
            BundleLocation::Memory(_) => self.memory.fetch(location),
        }
    }
}
