//! Bundle loading entry points.
//!
//! # Responsibility
//! - Turn a `BundleLocation` into a linked, validated `LoadedUnit`.
//! - Keep byte access and manifest format details inside the loader boundary.
//!
//! # Invariants
//! - Load failures are classified into a closed `LoadError` taxonomy.
//! - Loading never touches engine, registry or surface state.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod builtin;
pub mod catalog;
pub mod loader;
pub mod manifest;
pub mod source;

pub use builtin::{builtin_catalog, register_builtins};
pub use catalog::{CatalogError, LogicCatalog};
pub use loader::{BundleLoader, LinkedModule, LoadReceipt, LoadedUnit, SUPPORTED_FORMAT_VERSION};
pub use manifest::{BundleManifest, ModuleDeclaration};
pub use source::{BundleSource, CompositeBundleSource, FileBundleSource, InMemoryBundleSource};

/// Bundle load failures. All of them are fatal to the runtime instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    NotFound(String),
    ParseFailure(String),
    VersionMismatch { found: u32, supported: u32 },
    DuplicateModule(String),
}

impl LoadError {
    /// Stable error code used in log events and FFI envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "bundle_not_found",
            Self::ParseFailure(_) => "bundle_parse_failure",
            Self::VersionMismatch { .. } => "bundle_version_mismatch",
            Self::DuplicateModule(_) => "bundle_duplicate_module",
        }
    }
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(location) => write!(f, "bundle not found: {location}"),
            Self::ParseFailure(detail) => write!(f, "bundle parse failure: {detail}"),
            Self::VersionMismatch { found, supported } => write!(
                f,
                "bundle format version {found} is not supported (expected {supported})"
            ),
            Self::DuplicateModule(name) => write!(f, "bundle declares module twice: {name}"),
        }
    }
}

impl Error for LoadError {}
