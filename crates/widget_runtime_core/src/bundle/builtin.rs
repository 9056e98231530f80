//! Built-in module logic shipped with the runtime.
//!
//! Bundles reference these under `builtin.*` entry ids. Hosts that bring
//! their own logic register it next to these in the same `LogicCatalog`.

use crate::bundle::catalog::{CatalogError, LogicCatalog};
use crate::engine::logic::{ConstructionError, ModuleInstance};
use crate::model::props::{PropValue, PropertySet};
use log::debug;

pub const CLOCK_ENTRY: &str = "builtin.clock";
pub const LIST_ENTRY: &str = "builtin.list";
pub const TEXT_ENTRY: &str = "builtin.text";

/// Adds every built-in entry to `catalog`.
pub fn register_builtins(catalog: LogicCatalog) -> Result<LogicCatalog, CatalogError> {
    catalog
        .with(CLOCK_ENTRY, construct_clock)?
        .with(LIST_ENTRY, construct_list)?
        .with(TEXT_ENTRY, construct_text)
}

/// Catalog holding only the built-in entries.
pub fn builtin_catalog() -> Result<LogicCatalog, CatalogError> {
    register_builtins(LogicCatalog::new())
}

struct Clock {
    zone: String,
    twelve_hour: bool,
}

impl ModuleInstance for Clock {
    fn describe(&self) -> String {
        let mode = if self.twelve_hour { "12h" } else { "24h" };
        format!("clock zone={} mode={mode}", self.zone)
    }
}

struct List {
    items: usize,
}

impl ModuleInstance for List {
    fn dispose(&mut self) {
        debug!("event=builtin_dispose module=builtin kind=list items={}", self.items);
        self.items = 0;
    }

    fn describe(&self) -> String {
        format!("list items={}", self.items)
    }
}

struct Text {
    chars: usize,
}

impl ModuleInstance for Text {
    fn describe(&self) -> String {
        format!("text chars={}", self.chars)
    }
}

fn construct_clock(props: &PropertySet) -> Result<Box<dyn ModuleInstance>, ConstructionError> {
    let zone = match props.get("zone") {
        None => "UTC".to_string(),
        Some(PropValue::String(zone)) if !zone.trim().is_empty() => zone.trim().to_string(),
        Some(_) => return Err(ConstructionError::new("`zone` must be a non-empty string")),
    };
    let twelve_hour = match props.get("twelve_hour") {
        None => false,
        Some(value) => value
            .as_bool()
            .ok_or_else(|| ConstructionError::new("`twelve_hour` must be a bool"))?,
    };
    Ok(Box::new(Clock { zone, twelve_hour }))
}

fn construct_list(props: &PropertySet) -> Result<Box<dyn ModuleInstance>, ConstructionError> {
    let items = match props.get("items") {
        None => 0,
        Some(value) => value
            .as_list()
            .map(<[PropValue]>::len)
            .ok_or_else(|| ConstructionError::new("`items` must be a list"))?,
    };
    Ok(Box::new(List { items }))
}

fn construct_text(props: &PropertySet) -> Result<Box<dyn ModuleInstance>, ConstructionError> {
    let text = props
        .get("text")
        .and_then(PropValue::as_str)
        .ok_or_else(|| ConstructionError::new("`text` is required"))?;
    Ok(Box::new(Text {
        chars: text.chars().count(),
    }))
}
