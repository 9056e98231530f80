//! Surface handles.
//!
//! # Responsibility
//! - Give the host an opaque, embeddable reference to one realized surface.
//! - Keep the runtime's own record of the same surface reachable for teardown.
//!
//! # Invariants
//! - The bound instance/primitive pair is taken out exactly once; every later
//!   destroy attempt observes `None` and is a no-op.
//! - Host handles reach the runtime only through a weak reference.

use crate::engine::{InstanceId, ModuleInstanceHandle};
use crate::runtime::RuntimeError;
use crate::surface::presenter::NativePrimitive;
use log::error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, Weak};
use uuid::Uuid;

/// Stable surface identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(Uuid);

impl SurfaceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SurfaceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Engine instance plus native primitive backing one live surface.
#[derive(Debug)]
pub(crate) struct BoundSurface {
    pub(crate) instance: ModuleInstanceHandle,
    pub(crate) primitive: NativePrimitive,
}

/// Runtime-side record of one issued surface.
#[derive(Debug)]
pub struct SurfaceRecord {
    id: SurfaceId,
    sequence: u64,
    module: String,
    primitive_token: u64,
    instance_id: InstanceId,
    bound: Mutex<Option<BoundSurface>>,
}

impl SurfaceRecord {
    pub(crate) fn new(id: SurfaceId, sequence: u64, bound: BoundSurface) -> Self {
        Self {
            id,
            sequence,
            module: bound.instance.module.clone(),
            primitive_token: bound.primitive.token(),
            instance_id: bound.instance.id,
            bound: Mutex::new(Some(bound)),
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn primitive_token(&self) -> u64 {
        self.primitive_token
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn is_live(&self) -> bool {
        self.bound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    pub(crate) fn take_bound(&self) -> Option<BoundSurface> {
        self.bound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

/// Runtime-side release entry point reached from host handles.
pub(crate) trait SurfaceOwner: Send + Sync {
    fn release_surface(&self, sequence: u64) -> Result<bool, RuntimeError>;
}

/// Host-held handle to one surface.
///
/// Dropping the handle releases the surface. Releasing after the runtime
/// was invalidated, or releasing twice, is a no-op.
pub struct SurfaceHandle {
    record: Arc<SurfaceRecord>,
    owner: Weak<dyn SurfaceOwner>,
}

impl SurfaceHandle {
    pub(crate) fn new(record: Arc<SurfaceRecord>, owner: Weak<dyn SurfaceOwner>) -> Self {
        Self { record, owner }
    }

    pub fn id(&self) -> SurfaceId {
        self.record.id()
    }

    pub fn module(&self) -> &str {
        self.record.module()
    }

    /// Opaque native primitive token for embedding into the host tree.
    pub fn primitive_token(&self) -> u64 {
        self.record.primitive_token()
    }

    pub fn instance_id(&self) -> InstanceId {
        self.record.instance_id()
    }

    pub fn sequence(&self) -> u64 {
        self.record.sequence()
    }

    pub fn is_live(&self) -> bool {
        self.record.is_live()
    }

    /// Releases this surface now.
    ///
    /// Returns `Ok(true)` when this call destroyed the surface and `Ok(false)`
    /// when it was already gone.
    pub fn invalidate(&self) -> Result<bool, RuntimeError> {
        if !self.record.is_live() {
            return Ok(false);
        }
        match self.owner.upgrade() {
            Some(owner) => owner.release_surface(self.record.sequence()),
            None => Ok(false),
        }
    }
}

impl std::fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceHandle")
            .field("id", &self.record.id())
            .field("module", &self.record.module())
            .field("primitive_token", &self.record.primitive_token())
            .field("live", &self.record.is_live())
            .finish()
    }
}

impl Drop for SurfaceHandle {
    fn drop(&mut self) {
        if let Err(err) = self.invalidate() {
            error!(
                "event=surface_drop module=surface status=error surface_id={} error_code={} error={}",
                self.record.id(),
                err.code(),
                err
            );
        }
    }
}
