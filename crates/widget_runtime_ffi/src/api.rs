//! FFI runtime API for Flutter-facing hosts.
//!
//! # Responsibility
//! - Expose the construct / start / create-surface / invalidate contract to
//!   Dart via FRB, addressing runtimes and surfaces by opaque ids.
//! - Keep every surface handle alive on the Rust side until the host
//!   releases it or the runtime is invalidated.
//!
//! # Invariants
//! - Exported functions must not panic across the FFI boundary.
//! - Failures are reported in envelopes with a stable `error_code`.
//! - The runtime table lock is never held while a runtime call runs.

use log::{info, warn};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use widget_runtime_core::{
    core_version as core_version_inner, default_log_level as default_log_level_inner,
    init_logging as init_logging_inner, ping as ping_inner, register_builtins, BundleLoader,
    BundleLocation, CompositeBundleSource, HeadlessPresenter, InMemoryBundleSource, LoadError,
    LogicCatalog, PropertySet, RuntimeConfig, RuntimeController, RuntimeError, SurfaceHandle,
};

/// Environment variable naming the directory relative bundle paths resolve against.
pub const ENV_BUNDLE_DIR: &str = "WIDGET_RUNTIME_BUNDLE_DIR";

static MEMORY_BUNDLES: Lazy<InMemoryBundleSource> = Lazy::new(InMemoryBundleSource::new);
static PRESENTER: Lazy<Arc<HeadlessPresenter>> = Lazy::new(|| Arc::new(HeadlessPresenter::new()));
static RUNTIMES: Lazy<Mutex<BTreeMap<u64, Arc<RuntimeSlot>>>> =
    Lazy::new(|| Mutex::new(BTreeMap::new()));
static NEXT_RUNTIME_ID: AtomicU64 = AtomicU64::new(1);

struct RuntimeSlot {
    controller: RuntimeController,
    surfaces: Mutex<BTreeMap<String, SurfaceHandle>>,
}

impl RuntimeSlot {
    fn surfaces(&self) -> MutexGuard<'_, BTreeMap<String, SurfaceHandle>> {
        self.surfaces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Tracks `handle` by id unless the runtime already tore it down.
    ///
    /// Liveness is checked under the map lock. `runtime_invalidate` tears
    /// down before it clears the map, so a handle still live here is cleared
    /// by that call.
    fn track(&self, handle: SurfaceHandle) -> Result<(String, u64), RuntimeError> {
        let mut surfaces = self.surfaces();
        if !handle.is_live() {
            return Err(RuntimeError::InvalidState {
                operation: "create_surface",
                state: self.controller.state(),
            });
        }
        let surface_id = handle.id().to_string();
        let primitive_token = handle.primitive_token();
        surfaces.insert(surface_id.clone(), handle);
        Ok((surface_id, primitive_token))
    }
}

/// Outcome envelope for runtime-level calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeResponse {
    /// Whether the operation succeeded.
    pub ok: bool,
    /// Runtime id the call addressed or created.
    pub runtime_id: Option<u64>,
    /// Stable machine-readable error code on failure.
    pub error_code: Option<String>,
    /// Human-readable message for diagnostics.
    pub message: String,
}

impl RuntimeResponse {
    fn success(runtime_id: u64, message: impl Into<String>) -> Self {
        Self {
            ok: true,
            runtime_id: Some(runtime_id),
            error_code: None,
            message: message.into(),
        }
    }

    fn failure(runtime_id: Option<u64>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            runtime_id,
            error_code: Some(code.to_string()),
            message: message.into(),
        }
    }
}

/// Outcome envelope for surface creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceResponse {
    pub ok: bool,
    /// Stable surface id (UUID string) used for later release.
    pub surface_id: Option<String>,
    /// Native primitive token to embed into the host view tree.
    pub primitive_token: Option<u64>,
    pub error_code: Option<String>,
    pub message: String,
}

impl SurfaceResponse {
    fn failure(code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            surface_id: None,
            primitive_token: None,
            error_code: Some(code.to_string()),
            message: message.into(),
        }
    }
}

/// Diagnostics snapshot of one runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeStatus {
    /// `false` when no runtime is registered under the id.
    pub found: bool,
    pub state: String,
    pub location: String,
    pub live_surfaces: u32,
    pub modules: Vec<String>,
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Default log level for the current build mode.
#[flutter_rust_bridge::frb(sync)]
pub fn default_log_level() -> String {
    default_log_level_inner().to_owned()
}

/// Initializes runtime logging once per process.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir`.
/// - Returns an empty string on success and an error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Stores bundle JSON in the process-wide in-memory store under `key`.
///
/// Runtimes created with location `memory:<key>` load these bytes.
#[flutter_rust_bridge::frb(sync)]
pub fn register_memory_bundle(key: String, manifest_json: String) -> String {
    let key = key.trim();
    if key.is_empty() {
        return "bundle key cannot be empty".to_string();
    }
    MEMORY_BUNDLES.insert(key, manifest_json.into_bytes());
    String::new()
}

/// Constructs a runtime for `location` without loading anything.
///
/// # FFI contract
/// - Accepts `memory:<key>`, `file:<path>` or a bare path. Relative paths
///   resolve against `WIDGET_RUNTIME_BUNDLE_DIR` when set.
/// - Returns the new runtime id on success.
#[flutter_rust_bridge::frb(sync)]
pub fn runtime_create(location: String) -> RuntimeResponse {
    let Some(location) = resolve_location(&location, bundle_dir().as_deref()) else {
        let err = LoadError::NotFound(location.trim().to_string());
        return RuntimeResponse::failure(None, err.code(), err.to_string());
    };

    let catalog = match register_builtins(LogicCatalog::new()) {
        Ok(catalog) => catalog,
        Err(err) => {
            return RuntimeResponse::failure(None, "runtime_catalog_invalid", err.to_string())
        }
    };
    let loader = BundleLoader::new(
        Arc::new(CompositeBundleSource::new(MEMORY_BUNDLES.clone())),
        catalog,
    );
    let controller = RuntimeController::new(
        location,
        loader,
        PRESENTER.clone(),
        RuntimeConfig::from_env(),
    );

    let runtime_id = NEXT_RUNTIME_ID.fetch_add(1, Ordering::SeqCst);
    info!(
        "event=ffi_runtime_create module=ffi status=ok runtime_id={} scheme={}",
        runtime_id,
        controller.location().scheme()
    );
    runtimes().insert(
        runtime_id,
        Arc::new(RuntimeSlot {
            controller,
            surfaces: Mutex::new(BTreeMap::new()),
        }),
    );
    RuntimeResponse::success(runtime_id, "Runtime created.")
}

/// Loads the bundle and registers its modules.
///
/// # FFI contract
/// - Blocks until loading finished; repeated calls return the first outcome.
#[flutter_rust_bridge::frb(sync)]
pub fn runtime_start(runtime_id: u64) -> RuntimeResponse {
    with_runtime(runtime_id, |slot| {
        slot.controller.start()?;
        Ok(format!(
            "Runtime started with {} module(s).",
            slot.controller.module_names().len()
        ))
    })
}

/// Creates one surface for `module_name`.
///
/// `props_json` is a JSON object; an empty string means no properties.
#[flutter_rust_bridge::frb(sync)]
pub fn runtime_create_surface(
    runtime_id: u64,
    module_name: String,
    props_json: String,
) -> SurfaceResponse {
    let Some(slot) = lookup(runtime_id) else {
        return SurfaceResponse::failure("runtime_unknown", unknown_runtime(runtime_id));
    };
    let props = match PropertySet::from_json_str(&props_json) {
        Ok(props) => props,
        Err(err) => return SurfaceResponse::failure("surface_invalid_props", err.to_string()),
    };

    let tracked = slot
        .controller
        .create_surface(module_name.as_str(), props)
        .and_then(|handle| slot.track(handle));
    match tracked {
        Ok((surface_id, primitive_token)) => SurfaceResponse {
            ok: true,
            surface_id: Some(surface_id),
            primitive_token: Some(primitive_token),
            error_code: None,
            message: "Surface created.".to_string(),
        },
        Err(err) => SurfaceResponse::failure(err.code(), err.to_string()),
    }
}

/// Releases one surface by id. Releasing an unknown id is a no-op.
#[flutter_rust_bridge::frb(sync)]
pub fn runtime_release_surface(runtime_id: u64, surface_id: String) -> RuntimeResponse {
    with_runtime(runtime_id, |slot| {
        let Some(handle) = slot.surfaces().remove(surface_id.trim()) else {
            return Ok("Surface already released.".to_string());
        };
        if slot.controller.release_surface(&handle)? {
            Ok("Surface released.".to_string())
        } else {
            Ok("Surface already released.".to_string())
        }
    })
}

/// Tears the runtime down. The id stays addressable for `runtime_status`.
#[flutter_rust_bridge::frb(sync)]
pub fn runtime_invalidate(runtime_id: u64) -> RuntimeResponse {
    with_runtime(runtime_id, |slot| {
        slot.controller.invalidate();
        slot.surfaces().clear();
        Ok("Runtime invalidated.".to_string())
    })
}

/// Invalidates the runtime and forgets its id.
#[flutter_rust_bridge::frb(sync)]
pub fn runtime_dispose(runtime_id: u64) -> RuntimeResponse {
    let Some(slot) = runtimes().remove(&runtime_id) else {
        return RuntimeResponse::failure(
            Some(runtime_id),
            "runtime_unknown",
            unknown_runtime(runtime_id),
        );
    };
    slot.controller.invalidate();
    slot.surfaces().clear();
    info!("event=ffi_runtime_dispose module=ffi status=ok runtime_id={runtime_id}");
    RuntimeResponse::success(runtime_id, "Runtime disposed.")
}

/// Diagnostics snapshot for `runtime_id`.
#[flutter_rust_bridge::frb(sync)]
pub fn runtime_status(runtime_id: u64) -> RuntimeStatus {
    match lookup(runtime_id) {
        Some(slot) => RuntimeStatus {
            found: true,
            state: slot.controller.state().to_string(),
            location: slot.controller.location().to_string(),
            live_surfaces: u32::try_from(slot.controller.live_surface_count())
                .unwrap_or(u32::MAX),
            modules: slot.controller.module_names(),
        },
        None => RuntimeStatus {
            found: false,
            state: String::new(),
            location: String::new(),
            live_surfaces: 0,
            modules: Vec::new(),
        },
    }
}

fn runtimes() -> MutexGuard<'static, BTreeMap<u64, Arc<RuntimeSlot>>> {
    RUNTIMES
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lookup(runtime_id: u64) -> Option<Arc<RuntimeSlot>> {
    runtimes().get(&runtime_id).cloned()
}

fn unknown_runtime(runtime_id: u64) -> String {
    format!("no runtime registered under id {runtime_id}")
}

fn with_runtime(
    runtime_id: u64,
    f: impl FnOnce(&RuntimeSlot) -> Result<String, RuntimeError>,
) -> RuntimeResponse {
    let Some(slot) = lookup(runtime_id) else {
        warn!("event=ffi_lookup module=ffi status=error runtime_id={runtime_id}");
        return RuntimeResponse::failure(
            Some(runtime_id),
            "runtime_unknown",
            unknown_runtime(runtime_id),
        );
    };
    match f(&slot) {
        Ok(message) => RuntimeResponse::success(runtime_id, message),
        Err(err) => RuntimeResponse::failure(Some(runtime_id), err.code(), err.to_string()),
    }
}

fn bundle_dir() -> Option<PathBuf> {
    let raw = std::env::var(ENV_BUNDLE_DIR).ok()?;
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

fn resolve_location(raw: &str, bundle_dir: Option<&Path>) -> Option<BundleLocation> {
    match BundleLocation::parse(raw)? {
        BundleLocation::File(path) if path.is_relative() => Some(BundleLocation::File(
            bundle_dir.map(|dir| dir.join(&path)).unwrap_or(path),
        )),
        location => Some(location),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        core_version, init_logging, lookup, ping, register_memory_bundle, resolve_location,
        runtime_create, runtime_create_surface, runtime_dispose, runtime_invalidate,
        runtime_release_surface, runtime_start, runtime_status,
    };
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};
    use widget_runtime_core::{BundleLocation, PropertySet};

    const WIDGETS: &str = r#"{
        "format_version": 1,
        "bundle_id": "demo.widgets",
        "version": "1.0.0",
        "modules": [
            {"name": "Clock", "entry": "builtin.clock"},
            {"name": "List", "entry": "builtin.list"}
        ]
    }"#;

    fn unique_key(prefix: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards")
            .as_nanos();
        format!("{prefix}-{nanos}")
    }

    fn started_runtime() -> u64 {
        let key = unique_key("widgets");
        assert_eq!(register_memory_bundle(key.clone(), WIDGETS.to_string()), "");
        let created = runtime_create(format!("memory:{key}"));
        assert!(created.ok, "{}", created.message);
        let runtime_id = created.runtime_id.expect("runtime id");
        let started = runtime_start(runtime_id);
        assert!(started.ok, "{}", started.message);
        runtime_id
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_bad_arguments() {
        assert!(!init_logging("info".to_string(), String::new()).is_empty());
        assert!(!init_logging("verbose".to_string(), "/tmp/logs".to_string()).is_empty());
    }

    #[test]
    fn blank_location_is_not_found() {
        let response = runtime_create("   ".to_string());
        assert!(!response.ok);
        assert_eq!(response.error_code.as_deref(), Some("bundle_not_found"));
    }

    #[test]
    fn relative_paths_resolve_against_bundle_dir() {
        assert_eq!(
            resolve_location("app.json", Some(Path::new("/srv/bundles"))),
            Some(BundleLocation::File(PathBuf::from("/srv/bundles/app.json")))
        );
        assert_eq!(
            resolve_location("/abs/app.json", Some(Path::new("/srv/bundles"))),
            Some(BundleLocation::File(PathBuf::from("/abs/app.json")))
        );
        assert_eq!(
            resolve_location("memory:demo", Some(Path::new("/srv/bundles"))),
            Some(BundleLocation::Memory("demo".to_string()))
        );
    }

    #[test]
    fn surface_lifecycle_through_ids() {
        let runtime_id = started_runtime();

        let surface = runtime_create_surface(
            runtime_id,
            "Clock".to_string(),
            r#"{"zone": "UTC"}"#.to_string(),
        );
        assert!(surface.ok, "{}", surface.message);
        assert!(surface.primitive_token.is_some());
        let surface_id = surface.surface_id.expect("surface id");

        let status = runtime_status(runtime_id);
        assert!(status.found);
        assert_eq!(status.state, "running");
        assert_eq!(status.live_surfaces, 1);
        assert_eq!(status.modules, vec!["Clock", "List"]);

        let released = runtime_release_surface(runtime_id, surface_id.clone());
        assert!(released.ok, "{}", released.message);
        assert_eq!(released.message, "Surface released.");
        let again = runtime_release_surface(runtime_id, surface_id);
        assert_eq!(again.message, "Surface already released.");
        assert_eq!(runtime_status(runtime_id).live_surfaces, 0);

        assert!(runtime_dispose(runtime_id).ok);
        assert!(!runtime_status(runtime_id).found);
    }

    #[test]
    fn surface_errors_carry_codes() {
        let runtime_id = started_runtime();

        let missing = runtime_create_surface(runtime_id, "Gauge".to_string(), String::new());
        assert_eq!(
            missing.error_code.as_deref(),
            Some("surface_module_not_found")
        );

        let bad_props =
            runtime_create_surface(runtime_id, "Clock".to_string(), "[1, 2]".to_string());
        assert_eq!(bad_props.error_code.as_deref(), Some("surface_invalid_props"));

        let rejected = runtime_create_surface(
            runtime_id,
            "List".to_string(),
            r#"{"items": "not a list"}"#.to_string(),
        );
        assert_eq!(
            rejected.error_code.as_deref(),
            Some("surface_construction_failed")
        );

        assert!(runtime_invalidate(runtime_id).ok);
        let after = runtime_create_surface(runtime_id, "Clock".to_string(), String::new());
        assert_eq!(after.error_code.as_deref(), Some("runtime_invalid_state"));
        assert_eq!(runtime_status(runtime_id).state, "invalidated");
        assert!(runtime_dispose(runtime_id).ok);
    }

    #[test]
    fn handles_torn_down_before_tracking_are_not_kept() {
        let runtime_id = started_runtime();
        let slot = lookup(runtime_id).expect("slot");
        let handle = slot
            .controller
            .create_surface("Clock", PropertySet::new())
            .expect("surface");
        slot.controller.invalidate();

        let err = slot.track(handle).expect_err("dead handle must not be tracked");
        assert_eq!(err.code(), "runtime_invalid_state");
        assert!(slot.surfaces().is_empty());
        assert_eq!(runtime_status(runtime_id).live_surfaces, 0);
        assert!(runtime_dispose(runtime_id).ok);
    }

    #[test]
    fn unknown_runtime_ids_are_reported() {
        let response = runtime_start(u64::MAX);
        assert!(!response.ok);
        assert_eq!(response.error_code.as_deref(), Some("runtime_unknown"));
        assert!(!runtime_status(u64::MAX).found);
    }
}
