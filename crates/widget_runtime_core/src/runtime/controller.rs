//! Runtime controller: the object a host holds.
//!
//! # Responsibility
//! - Drive start (load, engine start, module registration) exactly once.
//! - Create surfaces only while running; release them individually or all at
//!   once on invalidate.
//!
//! # Invariants
//! - Lifecycle state, in-flight count and the live-surface set share one
//!   mutex; critical sections never call into the engine or the presenter.
//! - `invalidate` waits for in-flight creations and releases, so no surface
//!   is created behind a completed invalidate and none is missed by it.
//! - Every issued surface stays reachable from the live set until destroyed,
//!   whether or not the host still holds its handle.
//!
//! # See also
//! - crate::surface::factory (rollback rules)

use crate::bundle::loader::{BundleLoader, LoadReceipt};
use crate::config::RuntimeConfig;
use crate::engine::LogicEngine;
use crate::model::location::BundleLocation;
use crate::model::props::PropertySet;
use crate::registry::{ModuleRegistry, ModuleTable};
use crate::runtime::{RuntimeError, RuntimeState};
use crate::surface::factory::{CreateFailure, SurfaceFactory};
use crate::surface::handle::{SurfaceHandle, SurfaceOwner, SurfaceRecord};
use crate::surface::presenter::NativePresenter;
use crate::surface::SurfaceError;
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Instant;

struct Lifecycle {
    state: RuntimeState,
    closing: bool,
    start_outcome: Option<Result<(), RuntimeError>>,
    in_flight: usize,
    next_sequence: u64,
    live: BTreeMap<u64, Arc<SurfaceRecord>>,
    engine: Option<Arc<LogicEngine>>,
    factory: Option<Arc<SurfaceFactory>>,
}

struct RuntimeShared {
    location: BundleLocation,
    config: RuntimeConfig,
    presenter: Arc<dyn NativePresenter>,
    loader: Mutex<Option<BundleLoader>>,
    registry: ModuleRegistry,
    lifecycle: Mutex<Lifecycle>,
    changed: Condvar,
}

/// Host-facing runtime for one bundle location.
///
/// All methods may be called from any thread. Dropping the controller
/// invalidates it.
pub struct RuntimeController {
    shared: Arc<RuntimeShared>,
}

impl RuntimeController {
    /// Creates an uninitialized runtime. Nothing is loaded until `start`.
    pub fn new(
        location: BundleLocation,
        loader: BundleLoader,
        presenter: Arc<dyn NativePresenter>,
        config: RuntimeConfig,
    ) -> Self {
        let loader = loader.with_supported_format_version(config.supported_format_version);
        Self {
            shared: Arc::new(RuntimeShared {
                location,
                config,
                presenter,
                loader: Mutex::new(Some(loader)),
                registry: ModuleRegistry::new(),
                lifecycle: Mutex::new(Lifecycle {
                    state: RuntimeState::Uninitialized,
                    closing: false,
                    start_outcome: None,
                    in_flight: 0,
                    next_sequence: 1,
                    live: BTreeMap::new(),
                    engine: None,
                    factory: None,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// Loads the bundle, starts the engine and registers modules.
    ///
    /// Only the first call does work; later calls return the same outcome.
    /// A failed start leaves the runtime `Invalidated`.
    pub fn start(&self) -> Result<(), RuntimeError> {
        self.shared.start()
    }

    /// Creates one surface for `module_name` initialized with `props`.
    ///
    /// # Errors
    /// - `InvalidState` unless the runtime is `Running`.
    /// - `Surface(ModuleNotFound | ConstructionFailed | NativeBindingFailed)`
    ///   for local failures; the runtime stays `Running`.
    /// - `Fatal` when a rollback could not complete; the runtime invalidates.
    pub fn create_surface(
        &self,
        module_name: &str,
        props: PropertySet,
    ) -> Result<SurfaceHandle, RuntimeError> {
        self.shared.create_surface(module_name, props)
    }

    /// Releases one surface. Returns `Ok(false)` when it was already gone.
    pub fn release_surface(&self, handle: &SurfaceHandle) -> Result<bool, RuntimeError> {
        handle.invalidate()
    }

    /// Tears down every live surface, then the engine, then loader state.
    ///
    /// Legal from any state; later calls are no-ops.
    pub fn invalidate(&self) {
        self.shared.invalidate();
    }

    pub fn state(&self) -> RuntimeState {
        self.shared.lifecycle().state
    }

    pub fn live_surface_count(&self) -> usize {
        self.shared.lifecycle().live.len()
    }

    /// Sorted names of the currently resolvable modules.
    pub fn module_names(&self) -> Vec<String> {
        self.shared.registry.snapshot().names()
    }

    pub fn location(&self) -> &BundleLocation {
        &self.shared.location
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    /// Load diagnostics; `None` before a successful start and after invalidate.
    pub fn load_receipt(&self) -> Option<LoadReceipt> {
        self.shared
            .loader()
            .as_ref()
            .and_then(|loader| loader.receipt().cloned())
    }
}

impl Drop for RuntimeController {
    fn drop(&mut self) {
        self.shared.invalidate();
    }
}

impl RuntimeShared {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn loader(&self) -> MutexGuard<'_, Option<BundleLoader>> {
        self.loader
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Lifecycle>) -> MutexGuard<'a, Lifecycle> {
        self.changed
            .wait(guard)
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn start(&self) -> Result<(), RuntimeError> {
        let mut lifecycle = self.lifecycle();
        loop {
            if let Some(outcome) = &lifecycle.start_outcome {
                return outcome.clone();
            }
            match lifecycle.state {
                RuntimeState::Uninitialized if !lifecycle.closing => break,
                RuntimeState::Loading => lifecycle = self.wait(lifecycle),
                state => {
                    return Err(RuntimeError::InvalidState {
                        operation: "start",
                        state,
                    })
                }
            }
        }
        lifecycle.state = RuntimeState::Loading;
        drop(lifecycle);

        let started_at = Instant::now();
        info!(
            "event=runtime_start module=runtime status=start scheme={}",
            self.location.scheme()
        );
        let prepared = self.prepare();

        let mut lifecycle = self.lifecycle();
        let outcome = match prepared {
            Ok((engine, table)) => {
                let modules = table.len();
                self.registry.install(table);
                lifecycle.factory = Some(Arc::new(SurfaceFactory::new(
                    Arc::clone(&engine),
                    Arc::clone(&self.presenter),
                )));
                lifecycle.engine = Some(engine);
                lifecycle.state = RuntimeState::Running;
                info!(
                    "event=runtime_start module=runtime status=ok modules={} duration_ms={}",
                    modules,
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                lifecycle.state = RuntimeState::Invalidated;
                lifecycle.closing = true;
                error!(
                    "event=runtime_start module=runtime status=error error_code={} duration_ms={} error={}",
                    err.code(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        };
        lifecycle.start_outcome = Some(outcome.clone());
        drop(lifecycle);
        self.changed.notify_all();

        if outcome.is_err() {
            self.release_loader();
        }
        outcome
    }

    /// Load, spawn and register without touching shared lifecycle state.
    fn prepare(&self) -> Result<(Arc<LogicEngine>, ModuleTable), RuntimeError> {
        let unit = {
            let mut loader = self.loader();
            let loader = loader.as_mut().ok_or(RuntimeError::InvalidState {
                operation: "start",
                state: RuntimeState::Invalidated,
            })?;
            loader.load_and_record(&self.location)?
        };

        let engine = Arc::new(LogicEngine::start(
            unit,
            self.config.engine_thread_name.as_str(),
        )?);
        let registered = engine
            .register_modules()
            .map_err(RuntimeError::from)
            .and_then(|descriptors| ModuleTable::build(descriptors).map_err(RuntimeError::from));

        match registered {
            Ok(table) => Ok((engine, table)),
            Err(err) => {
                if let Err(teardown) = engine.teardown() {
                    warn!(
                        "event=runtime_start module=runtime status=error step=engine_teardown error_code={} error={}",
                        teardown.code(),
                        teardown
                    );
                }
                Err(err)
            }
        }
    }

    fn create_surface(
        self: &Arc<Self>,
        module_name: &str,
        props: PropertySet,
    ) -> Result<SurfaceHandle, RuntimeError> {
        let (factory, descriptor, sequence) = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.state != RuntimeState::Running || lifecycle.closing {
                return Err(RuntimeError::InvalidState {
                    operation: "create_surface",
                    state: lifecycle.state,
                });
            }
            let factory = lifecycle.factory.clone().ok_or(RuntimeError::InvalidState {
                operation: "create_surface",
                state: lifecycle.state,
            })?;
            let descriptor = self
                .registry
                .resolve(module_name)
                .ok_or_else(|| SurfaceError::ModuleNotFound(module_name.to_string()))?;
            if let Some(limit) = self.config.max_live_surfaces {
                if lifecycle.live.len() + lifecycle.in_flight >= limit {
                    return Err(SurfaceError::NativeBindingFailed(format!(
                        "live surface limit {limit} reached"
                    ))
                    .into());
                }
            }
            lifecycle.in_flight += 1;
            let sequence = lifecycle.next_sequence;
            lifecycle.next_sequence += 1;
            (factory, descriptor, sequence)
        };

        let created = factory.create(&descriptor, props, sequence);

        let mut lifecycle = self.lifecycle();
        lifecycle.in_flight -= 1;
        let result = match created {
            Ok(record) => {
                lifecycle.live.insert(sequence, Arc::clone(&record));
                let owner: Arc<dyn SurfaceOwner> = Arc::<RuntimeShared>::clone(self);
                Ok(SurfaceHandle::new(record, Arc::downgrade(&owner)))
            }
            Err(CreateFailure::Surface(err)) => {
                warn!(
                    "event=surface_create module=runtime status=error module_name={} error_code={} error={}",
                    module_name,
                    err.code(),
                    err
                );
                Err(RuntimeError::Surface(err))
            }
            Err(CreateFailure::RollbackFailed { cause, detail }) => Err(RuntimeError::Fatal(
                format!("rollback after `{cause}` failed: {detail}"),
            )),
        };
        drop(lifecycle);
        self.changed.notify_all();

        if let Err(RuntimeError::Fatal(detail)) = &result {
            error!(
                "event=surface_create module=runtime status=fatal module_name={} error={}",
                module_name, detail
            );
            self.invalidate();
        }
        result
    }

    fn release_by_sequence(&self, sequence: u64) -> Result<bool, RuntimeError> {
        let (factory, record) = {
            let mut lifecycle = self.lifecycle();
            let Some(factory) = lifecycle.factory.clone() else {
                return Ok(false);
            };
            let Some(record) = lifecycle.live.remove(&sequence) else {
                return Ok(false);
            };
            lifecycle.in_flight += 1;
            (factory, record)
        };

        let released = factory.destroy(&record);

        self.lifecycle().in_flight -= 1;
        self.changed.notify_all();

        match released {
            Ok(destroyed) => Ok(destroyed),
            Err(err) => {
                error!(
                    "event=surface_release module=runtime status=fatal surface_id={} error={}",
                    err.surface_id, err
                );
                self.invalidate();
                Err(RuntimeError::Fatal(err.to_string()))
            }
        }
    }

    fn invalidate(&self) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.closing {
            while lifecycle.state != RuntimeState::Invalidated {
                lifecycle = self.wait(lifecycle);
            }
            return;
        }
        lifecycle.closing = true;
        while lifecycle.state == RuntimeState::Loading || lifecycle.in_flight > 0 {
            lifecycle = self.wait(lifecycle);
        }

        let started_at = Instant::now();
        let surfaces = std::mem::take(&mut lifecycle.live);
        let factory = lifecycle.factory.take();
        let engine = lifecycle.engine.take();
        drop(lifecycle);

        let surface_count = surfaces.len();
        if let Some(factory) = &factory {
            for record in surfaces.into_values().rev() {
                if let Err(err) = factory.destroy(&record) {
                    error!(
                        "event=runtime_invalidate module=runtime status=error step=surface surface_id={} error={}",
                        err.surface_id, err
                    );
                }
            }
        }
        drop(factory);

        self.registry.clear();
        if let Some(engine) = engine {
            if let Err(err) = engine.teardown() {
                warn!(
                    "event=runtime_invalidate module=runtime status=error step=engine error_code={} error={}",
                    err.code(),
                    err
                );
            }
        }
        self.release_loader();

        self.lifecycle().state = RuntimeState::Invalidated;
        self.changed.notify_all();
        info!(
            "event=runtime_invalidate module=runtime status=ok surfaces={} duration_ms={}",
            surface_count,
            started_at.elapsed().as_millis()
        );
    }

    fn release_loader(&self) {
        if let Some(mut loader) = self.loader().take() {
            loader.release();
        }
    }
}

impl SurfaceOwner for RuntimeShared {
    fn release_surface(&self, sequence: u64) -> Result<bool, RuntimeError> {
        self.release_by_sequence(sequence)
    }
}
