//! Runtime data model.
//!
//! # Responsibility
//! - Define value types shared by loader, engine and surface layers.
//!
//! # Invariants
//! - Model types carry no runtime resources; they are freely cloneable.

pub mod location;
pub mod props;
