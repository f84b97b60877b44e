//! Runtime Configuration
//!
//! A small set of knobs read by the scheduler and by dependency
//! notification. Configuration is per thread, like the rest of the runtime
//! state, and can be loaded from JSON:
//!
//! ```rust,ignore
//! let cfg = Config::from_json(r#"{ "async_flush": false }"#)?;
//! trellis_core::config::set(cfg);
//! ```

use std::cell::Cell;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default circuit-breaker threshold for a watcher re-queueing itself.
pub const MAX_UPDATE_COUNT: usize = 100;

/// Runtime configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Batch watcher runs behind the deferred-execution primitive.
    ///
    /// When `false`, queueing a watcher flushes the scheduler immediately and
    /// dependencies notify their subscribers sorted by watcher id.
    pub async_flush: bool,

    /// Suppress warnings.
    pub silent: bool,

    /// Enable development diagnostics (runaway update detection).
    pub dev_diagnostics: bool,

    /// How many times one watcher may re-queue itself within a single flush
    /// before the flush is aborted.
    pub max_update_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_flush: true,
            silent: false,
            dev_diagnostics: cfg!(debug_assertions),
            max_update_count: MAX_UPDATE_COUNT,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

thread_local! {
    static CONFIG: Cell<Config> = Cell::new(Config::default());
}

/// Current configuration for this thread.
pub fn get() -> Config {
    CONFIG.with(Cell::get)
}

/// Replace the configuration for this thread.
pub fn set(config: Config) {
    CONFIG.with(|c| c.set(config));
}

/// Modify the configuration for this thread in place.
pub fn update(f: impl FnOnce(&mut Config)) {
    CONFIG.with(|c| {
        let mut config = c.get();
        f(&mut config);
        c.set(config);
    });
}
