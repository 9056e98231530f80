//! Bundle manifest declaration and validation.
//!
//! # Responsibility
//! - Decode the JSON manifest carried in bundle bytes.
//! - Enforce declaration-level invariants before any logic is linked.
//!
//! # Invariants
//! - Module names are unique within one manifest.
//! - `format_version` must equal the runtime's supported format version.

use crate::bundle::LoadError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Module names are identifier-like: `Clock`, `list.Row`, `chat_panel-v2`.
static MODULE_NAME_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.\-]{0,63}$").ok());

/// Declarative bundle manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleManifest {
    /// Manifest layout version understood by the loader.
    pub format_version: u32,
    /// Stable bundle identifier, e.g. `demo.widgets`.
    pub bundle_id: String,
    /// Bundle semantic version string (`major.minor.patch`).
    pub version: String,
    /// Declared modules in declaration order.
    pub modules: Vec<ModuleDeclaration>,
}

/// Lenient view used to read the format version before the strict decode.
#[derive(Deserialize)]
struct FormatHeader {
    format_version: u32,
}

/// One module declared by the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleDeclaration {
    /// Name the host uses to request a surface.
    pub name: String,
    /// Logic entry id resolved against the host's `LogicCatalog`.
    pub entry: String,
}

impl BundleManifest {
    /// Decodes manifest JSON bytes without validating declarations.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, LoadError> {
        serde_json::from_slice(bytes)
            .map_err(|err| LoadError::ParseFailure(format!("manifest json is invalid: {err}")))
    }

    /// Decodes manifest bytes for a loader that understands
    /// `supported_format_version`.
    ///
    /// The version is read from a lenient header first, so a future-format
    /// manifest with added or renamed fields reports `VersionMismatch`
    /// instead of a strict-decode `ParseFailure`.
    pub fn decode(bytes: &[u8], supported_format_version: u32) -> Result<Self, LoadError> {
        let header: FormatHeader = serde_json::from_slice(bytes)
            .map_err(|err| LoadError::ParseFailure(format!("manifest json is invalid: {err}")))?;
        if header.format_version != supported_format_version {
            return Err(LoadError::VersionMismatch {
                found: header.format_version,
                supported: supported_format_version,
            });
        }
        Self::from_slice(bytes)
    }

    /// Validates declaration-level manifest invariants.
    ///
    /// Version is checked first so a future-format bundle reports
    /// `VersionMismatch` rather than a field-level parse failure.
    pub fn validate(&self, supported_format_version: u32) -> Result<(), LoadError> {
        if self.format_version != supported_format_version {
            return Err(LoadError::VersionMismatch {
                found: self.format_version,
                supported: supported_format_version,
            });
        }

        let bundle_id = self.bundle_id.trim();
        if bundle_id.is_empty() || !is_valid_dotted_id(bundle_id) {
            return Err(LoadError::ParseFailure(format!(
                "bundle_id is invalid: `{}`",
                self.bundle_id
            )));
        }
        if !is_semver_triplet(self.version.trim()) {
            return Err(LoadError::ParseFailure(format!(
                "bundle version is invalid: `{}` (expected major.minor.patch)",
                self.version
            )));
        }

        let mut seen = BTreeSet::<&str>::new();
        for module in &self.modules {
            if !is_valid_module_name(module.name.as_str()) {
                return Err(LoadError::ParseFailure(format!(
                    "module name is invalid: `{}`",
                    module.name
                )));
            }
            if !is_valid_dotted_id(module.entry.trim()) {
                return Err(LoadError::ParseFailure(format!(
                    "module `{}` declares invalid entry `{}`",
                    module.name, module.entry
                )));
            }
            if !seen.insert(module.name.as_str()) {
                return Err(LoadError::DuplicateModule(module.name.clone()));
            }
        }
        Ok(())
    }

    /// Declared module names in declaration order.
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|module| module.name.as_str()).collect()
    }
}

pub(crate) fn is_valid_module_name(value: &str) -> bool {
    match MODULE_NAME_PATTERN.as_ref() {
        Some(pattern) => pattern.is_match(value),
        None => false,
    }
}

/// Lowercase dotted identifier: `demo.clock`, `builtin.list_row`.
pub(crate) fn is_valid_dotted_id(value: &str) -> bool {
    let mut chars = value.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return false;
    }

    let mut prev_separator = false;
    for c in chars {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            prev_separator = false;
            continue;
        }
        if c == '.' || c == '_' || c == '-' {
            if prev_separator {
                return false;
            }
            prev_separator = true;
            continue;
        }
        return false;
    }
    !prev_separator
}

fn is_semver_triplet(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    if parts.len() != 3 {
        return false;
    }
    parts
        .iter()
        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}
