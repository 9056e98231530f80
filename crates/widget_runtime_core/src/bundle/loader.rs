//! Bundle loading.
//!
//! # Responsibility
//! - Fetch, decode, validate and link a bundle into a `LoadedUnit`.
//!
//! # Invariants
//! - `load` has no side effects on shared runtime state; the controller
//!   commits the result.
//! - Loading the same bytes twice yields semantically equal units.
//!
//! # See also
//! - crate::runtime::controller (single-load-per-runtime enforcement)

use crate::bundle::catalog::LogicCatalog;
use crate::bundle::manifest::{BundleManifest, ModuleDeclaration};
use crate::bundle::source::BundleSource;
use crate::bundle::LoadError;
use crate::engine::logic::ModuleLogic;
use crate::model::location::BundleLocation;
use log::{error, info};
use std::sync::Arc;
use std::time::Instant;

/// Format version understood by this runtime build.
pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

/// One manifest module linked to its executable logic.
#[derive(Clone)]
pub struct LinkedModule {
    pub declaration: ModuleDeclaration,
    pub logic: Arc<dyn ModuleLogic>,
}

/// Result of a successful load: manifest plus linked logic graph.
///
/// Ownership moves into the engine execution context on engine start.
pub struct LoadedUnit {
    pub manifest: BundleManifest,
    pub modules: Vec<LinkedModule>,
}

impl LoadedUnit {
    pub fn module_names(&self) -> Vec<&str> {
        self.manifest.module_names()
    }
}

impl std::fmt::Debug for LoadedUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedUnit")
            .field("bundle_id", &self.manifest.bundle_id)
            .field("modules", &self.manifest.module_names())
            .finish()
    }
}

/// Diagnostics retained after a successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReceipt {
    pub location: BundleLocation,
    pub bundle_id: String,
    pub byte_len: usize,
    pub module_count: usize,
}

/// Resolves bundle locations into linked logic units.
pub struct BundleLoader {
    source: Arc<dyn BundleSource>,
    catalog: LogicCatalog,
    supported_format_version: u32,
    receipt: Option<LoadReceipt>,
}

impl BundleLoader {
    pub fn new(source: Arc<dyn BundleSource>, catalog: LogicCatalog) -> Self {
        Self {
            source,
            catalog,
            supported_format_version: SUPPORTED_FORMAT_VERSION,
            receipt: None,
        }
    }

    pub fn with_supported_format_version(mut self, version: u32) -> Self {
        self.supported_format_version = version;
        self
    }

    /// Loads and links the bundle at `location`.
    ///
    /// # Errors
    /// - `NotFound` when the source cannot resolve the location.
    /// - `ParseFailure` for undecodable manifests, invalid declarations or
    ///   entries missing from the catalog.
    /// - `VersionMismatch` for unsupported manifest formats.
    /// - `DuplicateModule` when a module name is declared twice.
    pub fn load(&self, location: &BundleLocation) -> Result<LoadedUnit, LoadError> {
        self.load_logged(location).map(|(unit, _)| unit)
    }

    /// Loads like `load` and records a `LoadReceipt` for diagnostics.
    pub fn load_and_record(&mut self, location: &BundleLocation) -> Result<LoadedUnit, LoadError> {
        let (unit, byte_len) = self.load_logged(location)?;
        self.receipt = Some(LoadReceipt {
            location: location.clone(),
            bundle_id: unit.manifest.bundle_id.clone(),
            byte_len,
            module_count: unit.modules.len(),
        });
        Ok(unit)
    }

    pub fn receipt(&self) -> Option<&LoadReceipt> {
        self.receipt.as_ref()
    }

    /// Drops loader-held load state.
    pub fn release(&mut self) {
        if let Some(receipt) = self.receipt.take() {
            info!(
                "event=loader_release module=loader status=ok bundle_id={}",
                receipt.bundle_id
            );
        }
    }

    fn load_logged(&self, location: &BundleLocation) -> Result<(LoadedUnit, usize), LoadError> {
        let started_at = Instant::now();
        info!(
            "event=bundle_load module=loader status=start scheme={}",
            location.scheme()
        );

        match self.load_unit(location) {
            Ok((unit, byte_len)) => {
                info!(
                    "event=bundle_load module=loader status=ok bundle_id={} modules={} bytes={} duration_ms={}",
                    unit.manifest.bundle_id,
                    unit.modules.len(),
                    byte_len,
                    started_at.elapsed().as_millis()
                );
                Ok((unit, byte_len))
            }
            Err(err) => {
                error!(
                    "event=bundle_load module=loader status=error error_code={} duration_ms={} error={}",
                    err.code(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn load_unit(&self, location: &BundleLocation) -> Result<(LoadedUnit, usize), LoadError> {
        let bytes = self.source.fetch(location)?;
        let unit = self.link(&bytes)?;
        Ok((unit, bytes.len()))
    }

    fn link(&self, bytes: &[u8]) -> Result<LoadedUnit, LoadError> {
        let manifest = BundleManifest::decode(bytes, self.supported_format_version)?;
        manifest.validate(self.supported_format_version)?;

        let modules = manifest
            .modules
            .iter()
            .map(|declaration| {
                let logic = self.catalog.get(declaration.entry.as_str()).ok_or_else(|| {
                    LoadError::ParseFailure(format!(
                        "module `{}` links unknown entry `{}`",
                        declaration.name, declaration.entry
                    ))
                })?;
                Ok(LinkedModule {
                    declaration: declaration.clone(),
                    logic,
                })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;

        Ok(LoadedUnit { manifest, modules })
    }
}
