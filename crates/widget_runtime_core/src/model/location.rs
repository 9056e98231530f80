//! Bundle location addressing.
//!
//! # Invariants
//! - A `BundleLocation` is immutable once constructed.
//! - `parse` never yields a blank location. The `file`/`memory` constructors
//!   take their value as given; a location no source can serve fails at load
//!   with `LoadError::NotFound`.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const FILE_SCHEME: &str = "file:";
const MEMORY_SCHEME: &str = "memory:";

/// Where bundle bytes are fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BundleLocation {
    /// File-system path.
    File(PathBuf),
    /// Key into an in-process bundle store.
    Memory(String),
}

impl BundleLocation {
    /// Parses `file:<path>`, `memory:<key>` or a bare path.
    ///
    /// Returns `None` when the input (or the part after the scheme) is blank.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if let Some(key) = trimmed.strip_prefix(MEMORY_SCHEME) {
            let key = key.trim();
            return (!key.is_empty()).then(|| Self::Memory(key.to_string()));
        }
        let path = trimmed
            .strip_prefix(FILE_SCHEME)
            .map(|rest| rest.strip_prefix("//").unwrap_or(rest))
            .unwrap_or(trimmed)
            .trim();
        (!path.is_empty()).then(|| Self::File(PathBuf::from(path)))
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::File(path.as_ref().to_path_buf())
    }

    pub fn memory(key: impl Into<String>) -> Self {
        Self::Memory(key.into())
    }

    /// Short scheme label used in log events.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory(_) => "memory",
        }
    }
}

impl Display for BundleLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{FILE_SCHEME}{}", path.display()),
            Self::Memory(key) => write!(f, "{MEMORY_SCHEME}{key}"),
        }
    }
}
