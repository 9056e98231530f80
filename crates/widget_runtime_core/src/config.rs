//! Runtime configuration.
//!
//! # Responsibility
//! - Hold tunables for one runtime instance.
//! - Overlay process environment values onto defaults.
//!
//! # Invariants
//! - Invalid environment values never abort construction; they are ignored
//!   with a warning and the default stays in effect.

use crate::bundle::loader::SUPPORTED_FORMAT_VERSION;
use log::warn;

/// Environment variable overriding the engine thread name.
pub const ENV_ENGINE_THREAD: &str = "WIDGET_RUNTIME_ENGINE_THREAD";
/// Environment variable capping live surfaces per runtime.
pub const ENV_MAX_SURFACES: &str = "WIDGET_RUNTIME_MAX_SURFACES";

const DEFAULT_ENGINE_THREAD: &str = "widget-engine";

/// Tunables for one `RuntimeController`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// OS thread name of the engine execution context.
    pub engine_thread_name: String,
    /// Upper bound on concurrently live surfaces; `None` means unbounded.
    pub max_live_surfaces: Option<usize>,
    /// Bundle manifest format accepted by the loader.
    pub supported_format_version: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine_thread_name: DEFAULT_ENGINE_THREAD.to_string(),
            max_live_surfaces: None,
            supported_format_version: SUPPORTED_FORMAT_VERSION,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overlaid with process environment values.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup` (environment-shaped key/value source).
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(ENV_ENGINE_THREAD) {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.contains('\0') {
                warn!("event=config_overlay module=config status=ignored key={ENV_ENGINE_THREAD}");
            } else {
                self.engine_thread_name = trimmed.to_string();
            }
        }

        if let Some(raw) = lookup(ENV_MAX_SURFACES) {
            match raw.trim().parse::<usize>() {
                Ok(0) => self.max_live_surfaces = None,
                Ok(limit) => self.max_live_surfaces = Some(limit),
                Err(_) => {
                    warn!("event=config_overlay module=config status=ignored key={ENV_MAX_SURFACES}");
                }
            }
        }
        self
    }
}
