//! Two-phase surface construction.
//!
//! # Responsibility
//! - Instantiate the module on the engine, then allocate and bind a native
//!   primitive on the calling thread.
//! - Roll back whichever half succeeded when the other half fails.
//!
//! # Invariants
//! - A primitive is never allocated or bound before the engine reported the
//!   instance as constructed.
//! - On failure neither an orphaned primitive nor an orphaned instance
//!   survives; a rollback that cannot complete is reported, never swallowed.

use crate::engine::{EngineError, LogicEngine, ModuleInstanceHandle};
use crate::model::props::PropertySet;
use crate::registry::ModuleDescriptor;
use crate::surface::handle::{BoundSurface, SurfaceId, SurfaceRecord};
use crate::surface::presenter::{NativePresenter, NativePrimitive, PrimitiveRequest};
use crate::surface::SurfaceError;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

/// Why a creation attempt did not produce a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateFailure {
    /// Local failure; all partial resources were released.
    Surface(SurfaceError),
    /// The original failure plus a rollback step that could not complete.
    RollbackFailed { cause: SurfaceError, detail: String },
}

/// Failure to release one half of a live surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseError {
    pub surface_id: SurfaceId,
    pub detail: String,
}

impl Display for ReleaseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "surface {} release failed: {}", self.surface_id, self.detail)
    }
}

impl Error for ReleaseError {}

/// Builds and destroys surfaces against one engine and one presenter.
pub struct SurfaceFactory {
    engine: Arc<LogicEngine>,
    presenter: Arc<dyn NativePresenter>,
}

impl SurfaceFactory {
    pub fn new(engine: Arc<LogicEngine>, presenter: Arc<dyn NativePresenter>) -> Self {
        Self { engine, presenter }
    }

    /// Creates one surface for `descriptor`.
    ///
    /// Blocks until the engine has finished construction, then realizes the
    /// native half on the calling thread.
    pub fn create(
        &self,
        descriptor: &ModuleDescriptor,
        props: PropertySet,
        sequence: u64,
    ) -> Result<Arc<SurfaceRecord>, CreateFailure> {
        let started_at = Instant::now();
        let surface_id = SurfaceId::new();

        let instance = self
            .engine
            .instantiate(descriptor.name.as_str(), props.clone())
            .map_err(|err| CreateFailure::Surface(classify_engine_error(descriptor, err)))?;

        let request = PrimitiveRequest {
            surface_id,
            module: descriptor.name.as_str(),
            props: &props,
        };
        let primitive = match self.presenter.allocate(&request) {
            Ok(primitive) => primitive,
            Err(err) => {
                let cause = SurfaceError::NativeBindingFailed(format!("allocate: {err}"));
                return Err(self.rollback(cause, None, &instance));
            }
        };

        if let Err(err) = self.presenter.bind(&primitive, &instance) {
            let cause = SurfaceError::NativeBindingFailed(format!("bind: {err}"));
            return Err(self.rollback(cause, Some(primitive), &instance));
        }

        info!(
            "event=surface_create module=surface status=ok surface_id={} module_name={} instance={} token={} duration_ms={}",
            surface_id,
            descriptor.name,
            instance.id,
            primitive.token(),
            started_at.elapsed().as_millis()
        );
        Ok(Arc::new(SurfaceRecord::new(
            surface_id,
            sequence,
            BoundSurface {
                instance,
                primitive,
            },
        )))
    }

    /// Releases the native primitive, then the engine instance.
    ///
    /// Returns `Ok(false)` when the record was already destroyed.
    pub fn destroy(&self, record: &SurfaceRecord) -> Result<bool, ReleaseError> {
        let Some(bound) = record.take_bound() else {
            return Ok(false);
        };

        let mut failures = Vec::new();
        if let Err(err) = self.presenter.release(bound.primitive) {
            failures.push(format!("primitive: {err}"));
        }
        if let Err(err) = self.engine.release(&bound.instance) {
            failures.push(format!("instance: {err}"));
        }

        if failures.is_empty() {
            info!(
                "event=surface_destroy module=surface status=ok surface_id={} module_name={}",
                record.id(),
                record.module()
            );
            Ok(true)
        } else {
            Err(ReleaseError {
                surface_id: record.id(),
                detail: failures.join("; "),
            })
        }
    }

    fn rollback(
        &self,
        cause: SurfaceError,
        primitive: Option<NativePrimitive>,
        instance: &ModuleInstanceHandle,
    ) -> CreateFailure {
        warn!(
            "event=surface_rollback module=surface status=start module_name={} instance={} error_code={}",
            instance.module,
            instance.id,
            cause.code()
        );

        let mut failures = Vec::new();
        if let Some(primitive) = primitive {
            if let Err(err) = self.presenter.release(primitive) {
                failures.push(format!("primitive: {err}"));
            }
        }
        if let Err(err) = self.engine.release(instance) {
            failures.push(format!("instance: {err}"));
        }

        if failures.is_empty() {
            CreateFailure::Surface(cause)
        } else {
            CreateFailure::RollbackFailed {
                cause,
                detail: failures.join("; "),
            }
        }
    }
}

fn classify_engine_error(descriptor: &ModuleDescriptor, err: EngineError) -> SurfaceError {
    match err {
        EngineError::UnknownModule(_) => SurfaceError::ModuleNotFound(descriptor.name.clone()),
        other => SurfaceError::ConstructionFailed(other),
    }
}

#[cfg(test)]
mod tests {
    use super::{CreateFailure, SurfaceFactory};
    use crate::bundle::loader::{LinkedModule, LoadedUnit};
    use crate::bundle::manifest::{BundleManifest, ModuleDeclaration};
    use crate::engine::logic::{ConstructionError, ModuleInstance};
    use crate::engine::{EngineError, LogicEngine, ModuleInstanceHandle};
    use crate::model::props::PropertySet;
    use crate::registry::{FactoryRef, ModuleDescriptor};
    use crate::surface::presenter::{
        HeadlessPresenter, NativePresenter, NativePrimitive, PresenterError, PrimitiveRequest,
    };
    use crate::surface::SurfaceError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    static DISPOSED: AtomicUsize = AtomicUsize::new(0);

    struct Tracked;

    impl ModuleInstance for Tracked {
        fn dispose(&mut self) {
            DISPOSED.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked(_props: &PropertySet) -> Result<Box<dyn ModuleInstance>, ConstructionError> {
        Ok(Box::new(Tracked))
    }

    fn failing(_props: &PropertySet) -> Result<Box<dyn ModuleInstance>, ConstructionError> {
        Err(ConstructionError::new("bad props"))
    }

    fn engine() -> Arc<LogicEngine> {
        let declare = |name: &str, entry: &str| ModuleDeclaration {
            name: name.to_string(),
            entry: entry.to_string(),
        };
        let unit = LoadedUnit {
            manifest: BundleManifest {
                format_version: 1,
                bundle_id: "demo.widgets".to_string(),
                version: "1.0.0".to_string(),
                modules: vec![
                    declare("Clock", "demo.clock"),
                    declare("Broken", "demo.broken"),
                ],
            },
            modules: vec![
                LinkedModule {
                    declaration: declare("Clock", "demo.clock"),
                    logic: Arc::new(tracked),
                },
                LinkedModule {
                    declaration: declare("Broken", "demo.broken"),
                    logic: Arc::new(failing),
                },
            ],
        };
        Arc::new(LogicEngine::start(unit, "factory-test").expect("engine start"))
    }

    fn descriptor(name: &str) -> ModuleDescriptor {
        ModuleDescriptor {
            name: name.to_string(),
            entry: "demo.any".to_string(),
            factory: FactoryRef {
                engine_id: 0,
                slot: 0,
            },
        }
    }

    /// Allocates through a headless presenter, then refuses to bind.
    struct RefusingBinder {
        inner: HeadlessPresenter,
        fail_release: bool,
    }

    impl NativePresenter for RefusingBinder {
        fn allocate(
            &self,
            request: &PrimitiveRequest<'_>,
        ) -> Result<NativePrimitive, PresenterError> {
            self.inner.allocate(request)
        }

        fn bind(
            &self,
            _primitive: &NativePrimitive,
            _instance: &ModuleInstanceHandle,
        ) -> Result<(), PresenterError> {
            Err(PresenterError::new("toolkit refused"))
        }

        fn release(&self, primitive: NativePrimitive) -> Result<(), PresenterError> {
            if self.fail_release {
                return Err(PresenterError::new("release lost"));
            }
            self.inner.release(primitive)
        }
    }

    #[test]
    fn creates_and_destroys_exactly_once() {
        let presenter = Arc::new(HeadlessPresenter::new());
        let engine = engine();
        let factory = SurfaceFactory::new(Arc::clone(&engine), presenter.clone());

        let record = factory
            .create(&descriptor("Clock"), PropertySet::new(), 1)
            .expect("surface");
        assert_eq!(
            presenter.bound_instance(record.primitive_token()),
            Some(record.instance_id())
        );

        let before = DISPOSED.load(Ordering::SeqCst);
        assert!(factory.destroy(&record).expect("destroy"));
        assert!(!factory.destroy(&record).expect("second destroy is a no-op"));
        assert_eq!(presenter.live_count(), 0);
        assert!(DISPOSED.load(Ordering::SeqCst) > before);
        engine.teardown().expect("teardown");
    }

    #[test]
    fn construction_failure_allocates_nothing() {
        let presenter = Arc::new(HeadlessPresenter::new());
        let engine = engine();
        let factory = SurfaceFactory::new(Arc::clone(&engine), presenter.clone());

        let err = factory
            .create(&descriptor("Broken"), PropertySet::new(), 1)
            .expect_err("construction must fail");
        assert!(matches!(
            err,
            CreateFailure::Surface(SurfaceError::ConstructionFailed(
                EngineError::ConstructionThrew { .. }
            ))
        ));
        assert_eq!(presenter.live_count(), 0);
        engine.teardown().expect("teardown");
    }

    #[test]
    fn unknown_engine_module_maps_to_module_not_found() {
        let engine = engine();
        let factory = SurfaceFactory::new(Arc::clone(&engine), Arc::new(HeadlessPresenter::new()));
        let err = factory
            .create(&descriptor("Gauge"), PropertySet::new(), 1)
            .expect_err("unknown module");
        assert_eq!(
            err,
            CreateFailure::Surface(SurfaceError::ModuleNotFound("Gauge".to_string()))
        );
        engine.teardown().expect("teardown");
    }

    #[test]
    fn bind_failure_rolls_back_both_halves() {
        let presenter = Arc::new(RefusingBinder {
            inner: HeadlessPresenter::new(),
            fail_release: false,
        });
        let engine = engine();
        let factory = SurfaceFactory::new(Arc::clone(&engine), presenter.clone());

        let err = factory
            .create(&descriptor("Clock"), PropertySet::new(), 1)
            .expect_err("bind must fail");
        assert!(matches!(
            err,
            CreateFailure::Surface(SurfaceError::NativeBindingFailed(_))
        ));
        assert_eq!(presenter.inner.live_count(), 0);
        assert_eq!(engine.teardown().expect("teardown"), 0);
    }

    #[test]
    fn failed_rollback_is_reported() {
        let presenter = Arc::new(RefusingBinder {
            inner: HeadlessPresenter::new(),
            fail_release: true,
        });
        let engine = engine();
        let factory = SurfaceFactory::new(Arc::clone(&engine), presenter);

        let err = factory
            .create(&descriptor("Clock"), PropertySet::new(), 1)
            .expect_err("bind must fail");
        assert!(
            matches!(err, CreateFailure::RollbackFailed { detail, .. } if detail.contains("release lost"))
        );
        engine.teardown().expect("teardown");
    }

    #[test]
    fn torn_down_engine_fails_construction_cleanly() {
        let presenter = Arc::new(HeadlessPresenter::new());
        let engine = engine();
        engine.teardown().expect("teardown");
        let factory = SurfaceFactory::new(engine, presenter.clone());

        let err = factory
            .create(&descriptor("Clock"), PropertySet::new(), 1)
            .expect_err("torn down");
        assert_eq!(
            err,
            CreateFailure::Surface(SurfaceError::ConstructionFailed(
                EngineError::EngineTornDown
            ))
        );
        assert_eq!(presenter.live_count(), 0);
    }
}
