//! Logic engine: the single serialized execution context for loaded logic.
//!
//! # Responsibility
//! - Own the `LoadedUnit` and every live module instance.
//! - Run construction, release and teardown one at a time on a dedicated
//!   thread, regardless of how many host threads call in.
//!
//! # Invariants
//! - No two engine operations execute concurrently.
//! - Construction failures (errors or panics) never take the engine down.
//! - After teardown every call fails with `EngineError::EngineTornDown`.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod context;
pub mod logic;

pub use context::LogicEngine;
pub use logic::{ConstructionError, ModuleInstance, ModuleLogic};

/// Engine-scoped identifier of one live module instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub u64);

impl Display for InstanceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "instance-{}", self.0)
    }
}

/// Host-side reference to an engine-owned module instance.
///
/// The handle carries no ownership; the instance lives on the engine thread
/// until released or until engine teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInstanceHandle {
    pub id: InstanceId,
    pub module: String,
    pub engine_id: u64,
}

/// Engine operation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    UnknownModule(String),
    ConstructionThrew { module: String, message: String },
    EngineTornDown,
    UnknownInstance(InstanceId),
    SpawnFailed(String),
}

impl EngineError {
    /// Stable error code used in log events and FFI envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownModule(_) => "engine_unknown_module",
            Self::ConstructionThrew { .. } => "engine_construction_threw",
            Self::EngineTornDown => "engine_torn_down",
            Self::UnknownInstance(_) => "engine_unknown_instance",
            Self::SpawnFailed(_) => "engine_spawn_failed",
        }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownModule(name) => write!(f, "engine has no module named {name}"),
            Self::ConstructionThrew { module, message } => {
                write!(f, "module {module} construction failed: {message}")
            }
            Self::EngineTornDown => write!(f, "engine has been torn down"),
            Self::UnknownInstance(id) => write!(f, "engine does not own {id}"),
            Self::SpawnFailed(detail) => {
                write!(f, "engine execution context could not start: {detail}")
            }
        }
    }
}

impl Error for EngineError {}
