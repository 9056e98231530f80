//! Surface creation and ownership.
//!
//! # Responsibility
//! - Pair an engine-side module instance with a native presentation primitive.
//! - Hand the host an opaque handle while keeping a runtime-side record.
//!
//! # Invariants
//! - Surface errors are local to one creation call.
//! - Every surface is destroyed at most once.

use crate::engine::EngineError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod factory;
pub mod handle;
pub mod presenter;

pub use factory::{CreateFailure, ReleaseError, SurfaceFactory};
pub use handle::{SurfaceHandle, SurfaceId, SurfaceRecord};
pub use presenter::{
    HeadlessPresenter, NativePresenter, NativePrimitive, PresenterError, PrimitiveRequest,
};

/// Per-surface creation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    ModuleNotFound(String),
    ConstructionFailed(EngineError),
    NativeBindingFailed(String),
}

impl SurfaceError {
    /// Stable error code used in log events and FFI envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModuleNotFound(_) => "surface_module_not_found",
            Self::ConstructionFailed(_) => "surface_construction_failed",
            Self::NativeBindingFailed(_) => "surface_native_binding_failed",
        }
    }
}

impl Display for SurfaceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ModuleNotFound(name) => write!(f, "module not found: {name}"),
            Self::ConstructionFailed(err) => write!(f, "surface construction failed: {err}"),
            Self::NativeBindingFailed(detail) => {
                write!(f, "native binding failed: {detail}")
            }
        }
    }
}

impl Error for SurfaceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ConstructionFailed(err) => Some(err),
            Self::ModuleNotFound(_) | Self::NativeBindingFailed(_) => None,
        }
    }
}
