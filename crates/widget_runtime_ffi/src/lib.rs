//! Flutter-facing bindings for the widget runtime.

pub mod api;
