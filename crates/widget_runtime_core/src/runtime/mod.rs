//! Runtime lifecycle.
//!
//! # Responsibility
//! - Own loader, engine, registry and every issued surface for one bundle.
//! - Enforce the `Uninitialized -> Loading -> Running -> Invalidated` order.
//!
//! # Invariants
//! - State transitions are monotonic; no state is revisited.
//! - Load failures are fatal to the runtime; surface failures are local.

use crate::bundle::LoadError;
use crate::engine::EngineError;
use crate::surface::SurfaceError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod controller;

pub use controller::RuntimeController;

/// Lifecycle state of one runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuntimeState {
    Uninitialized,
    Loading,
    Running,
    Invalidated,
}

impl RuntimeState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Running => "running",
            Self::Invalidated => "invalidated",
        }
    }
}

impl Display for RuntimeState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned to the host by `RuntimeController`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Operation is not legal in the current lifecycle state.
    InvalidState {
        operation: &'static str,
        state: RuntimeState,
    },
    Load(LoadError),
    Engine(EngineError),
    Surface(SurfaceError),
    /// Resource tracking lost consistency; the runtime invalidated itself.
    Fatal(String),
}

impl RuntimeError {
    /// Stable error code used in log events and FFI envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidState { .. } => "runtime_invalid_state",
            Self::Load(err) => err.code(),
            Self::Engine(err) => err.code(),
            Self::Surface(err) => err.code(),
            Self::Fatal(_) => "runtime_fatal",
        }
    }
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidState { operation, state } => {
                write!(f, "{operation} is not allowed while runtime is {state}")
            }
            Self::Load(err) => write!(f, "{err}"),
            Self::Engine(err) => write!(f, "{err}"),
            Self::Surface(err) => write!(f, "{err}"),
            Self::Fatal(detail) => write!(f, "runtime failed fatally: {detail}"),
        }
    }
}

impl Error for RuntimeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Load(err) => Some(err),
            Self::Engine(err) => Some(err),
            Self::Surface(err) => Some(err),
            Self::InvalidState { .. } | Self::Fatal(_) => None,
        }
    }
}

impl From<LoadError> for RuntimeError {
    fn from(value: LoadError) -> Self {
        Self::Load(value)
    }
}

impl From<EngineError> for RuntimeError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl From<SurfaceError> for RuntimeError {
    fn from(value: SurfaceError) -> Self {
        Self::Surface(value)
    }
}
