//! Native presentation layer contract.
//!
//! The runtime never realizes pixels itself. It asks an injected
//! `NativePresenter` for one opaque primitive per surface and binds it to the
//! engine-side module instance.

use crate::engine::{InstanceId, ModuleInstanceHandle};
use crate::model::props::PropertySet;
use crate::surface::handle::SurfaceId;
use log::debug;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Opaque token for one allocated native presentation primitive.
///
/// Deliberately not `Clone`: it is released exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct NativePrimitive {
    token: u64,
}

impl NativePrimitive {
    pub fn new(token: u64) -> Self {
        Self { token }
    }

    pub fn token(&self) -> u64 {
        self.token
    }
}

/// Allocation request passed to the presenter.
#[derive(Debug)]
pub struct PrimitiveRequest<'a> {
    pub surface_id: SurfaceId,
    pub module: &'a str,
    pub props: &'a PropertySet,
}

/// Native presentation layer failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenterError {
    pub message: String,
}

impl PresenterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for PresenterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for PresenterError {}

/// Allocate/bind/release capability supplied by the host platform.
///
/// Implementations marshal onto whatever thread their toolkit requires.
pub trait NativePresenter: Send + Sync {
    fn allocate(&self, request: &PrimitiveRequest<'_>) -> Result<NativePrimitive, PresenterError>;

    fn bind(
        &self,
        primitive: &NativePrimitive,
        instance: &ModuleInstanceHandle,
    ) -> Result<(), PresenterError>;

    fn release(&self, primitive: NativePrimitive) -> Result<(), PresenterError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PrimitiveRecord {
    module: String,
    bound_instance: Option<InstanceId>,
}

/// Bookkeeping-only presenter for hosts without a UI toolkit.
#[derive(Debug, Default)]
pub struct HeadlessPresenter {
    next_token: AtomicU64,
    primitives: Mutex<BTreeMap<u64, PrimitiveRecord>>,
    released_total: AtomicU64,
}

impl HeadlessPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Primitives allocated and not yet released.
    pub fn live_count(&self) -> usize {
        self.primitives().len()
    }

    pub fn released_total(&self) -> u64 {
        self.released_total.load(Ordering::SeqCst)
    }

    /// Instance bound to `token`, if the primitive is live and bound.
    pub fn bound_instance(&self, token: u64) -> Option<InstanceId> {
        self.primitives()
            .get(&token)
            .and_then(|record| record.bound_instance)
    }

    pub fn module_of(&self, token: u64) -> Option<String> {
        self.primitives()
            .get(&token)
            .map(|record| record.module.clone())
    }

    fn primitives(&self) -> MutexGuard<'_, BTreeMap<u64, PrimitiveRecord>> {
        self.primitives
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NativePresenter for HeadlessPresenter {
    fn allocate(&self, request: &PrimitiveRequest<'_>) -> Result<NativePrimitive, PresenterError> {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;
        self.primitives().insert(
            token,
            PrimitiveRecord {
                module: request.module.to_string(),
                bound_instance: None,
            },
        );
        debug!(
            "event=primitive_allocate module=presenter status=ok token={} surface_id={}",
            token, request.surface_id
        );
        Ok(NativePrimitive::new(token))
    }

    fn bind(
        &self,
        primitive: &NativePrimitive,
        instance: &ModuleInstanceHandle,
    ) -> Result<(), PresenterError> {
        let mut primitives = self.primitives();
        let record = primitives.get_mut(&primitive.token()).ok_or_else(|| {
            PresenterError::new(format!("primitive {} is not allocated", primitive.token()))
        })?;
        if record.bound_instance.is_some() {
            return Err(PresenterError::new(format!(
                "primitive {} is already bound",
                primitive.token()
            )));
        }
        record.bound_instance = Some(instance.id);
        Ok(())
    }

    fn release(&self, primitive: NativePrimitive) -> Result<(), PresenterError> {
        self.primitives()
            .remove(&primitive.token())
            .ok_or_else(|| {
                PresenterError::new(format!("primitive {} is not allocated", primitive.token()))
            })?;
        self.released_total.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{HeadlessPresenter, NativePresenter, NativePrimitive, PrimitiveRequest};
    use crate::engine::{InstanceId, ModuleInstanceHandle};
    use crate::model::props::PropertySet;
    use crate::surface::handle::SurfaceId;

    fn instance(id: u64) -> ModuleInstanceHandle {
        ModuleInstanceHandle {
            id: InstanceId(id),
            module: "Clock".to_string(),
            engine_id: 1,
        }
    }

    #[test]
    fn allocates_binds_and_releases() {
        let presenter = HeadlessPresenter::new();
        let props = PropertySet::new();
        let primitive = presenter
            .allocate(&PrimitiveRequest {
                surface_id: SurfaceId::new(),
                module: "Clock",
                props: &props,
            })
            .expect("allocate");
        let token = primitive.token();
        assert_eq!(presenter.live_count(), 1);
        assert_eq!(presenter.module_of(token).as_deref(), Some("Clock"));

        presenter.bind(&primitive, &instance(4)).expect("bind");
        assert_eq!(presenter.bound_instance(token), Some(InstanceId(4)));

        let err = presenter
            .bind(&primitive, &instance(5))
            .expect_err("rebind must fail");
        assert!(err.message.contains("already bound"));

        presenter.release(primitive).expect("release");
        assert_eq!(presenter.live_count(), 0);
        assert_eq!(presenter.released_total(), 1);
    }

    #[test]
    fn rejects_unknown_primitive_release() {
        let presenter = HeadlessPresenter::new();
        let err = presenter
            .release(NativePrimitive::new(99))
            .expect_err("unknown primitive");
        assert!(err.message.contains("not allocated"));
    }
}
