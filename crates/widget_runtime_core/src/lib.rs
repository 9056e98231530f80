//! Host-embeddable widget runtime.
//!
//! A host constructs a `RuntimeController` for one bundle location, starts it,
//! and asks it for native surfaces by module name. Module logic runs on a
//! dedicated engine thread; native primitives come from an injected
//! `NativePresenter`.

pub mod bundle;
pub mod config;
pub mod engine;
pub mod logging;
pub mod model;
pub mod registry;
pub mod runtime;
pub mod surface;

pub use bundle::{
    builtin_catalog, register_builtins, BundleLoader, BundleManifest, BundleSource,
    CatalogError, CompositeBundleSource, FileBundleSource, InMemoryBundleSource, LoadError,
    LoadReceipt, LoadedUnit, LogicCatalog,
};
pub use config::RuntimeConfig;
pub use engine::{
    ConstructionError, EngineError, InstanceId, LogicEngine, ModuleInstance,
    ModuleInstanceHandle, ModuleLogic,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::location::BundleLocation;
pub use model::props::{PropValue, PropertyError, PropertySet};
pub use registry::{ModuleDescriptor, ModuleRegistry, ModuleTable};
pub use runtime::{RuntimeController, RuntimeError, RuntimeState};
pub use surface::{
    HeadlessPresenter, NativePresenter, NativePrimitive, PresenterError, PrimitiveRequest,
    SurfaceError, SurfaceHandle, SurfaceId,
};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
