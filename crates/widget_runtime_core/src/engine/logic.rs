//! Contract between the engine and loaded module logic.
//!
//! # Responsibility
//! - Define what a linked bundle must provide for every declared module.
//!
//! # Invariants
//! - `ModuleLogic::construct` and `ModuleInstance::dispose` only ever run on
//!   the engine execution context.
//! - `dispose` is called at most once per instance.

use crate::model::props::PropertySet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One live module instance owned by the engine.
pub trait ModuleInstance: Send {
    /// Releases instance-held state. Called exactly once by the engine.
    fn dispose(&mut self) {}

    /// Short metadata-only description for diagnostics.
    fn describe(&self) -> String {
        String::from("module-instance")
    }
}

/// Construction capability for one named module.
pub trait ModuleLogic: Send + Sync {
    fn construct(&self, props: &PropertySet) -> Result<Box<dyn ModuleInstance>, ConstructionError>;
}

impl<F> ModuleLogic for F
where
    F: Fn(&PropertySet) -> Result<Box<dyn ModuleInstance>, ConstructionError> + Send + Sync,
{
    fn construct(&self, props: &PropertySet) -> Result<Box<dyn ModuleInstance>, ConstructionError> {
        self(props)
    }
}

/// Error raised by module construction logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructionError {
    pub message: String,
}

impl ConstructionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for ConstructionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ConstructionError {}
