//! Process-wide defaults
//!
//! A [`Config`] is snapshotted into every container created with
//! [`Ldict::new`](crate::Ldict::new). Changing the global defaults with
//! [`setup`] only affects containers created afterwards; pass a config
//! explicitly with [`Ldict::with_config`](crate::Ldict::with_config) to
//! bypass the global entirely.

use crate::persistence::Cache;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

/// Default byte budget for the packed-value memo.
pub const DEFAULT_COMPRESSION_CACHE_LIMIT: usize = 1_000_000_000;

#[derive(Clone)]
pub struct Config {
    /// Record every application step.
    pub history: bool,
    /// Bytes of packed values kept in memory to avoid repacking.
    pub compression_cache_limit: usize,
    /// Backend used when caching is requested without naming one.
    pub cache: Option<Arc<dyn Cache>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            history: false,
            compression_cache_limit: DEFAULT_COMPRESSION_CACHE_LIMIT,
            cache: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("history", &self.history)
            .field("compression_cache_limit", &self.compression_cache_limit)
            .field("cache", &self.cache.as_ref().map(|c| c.describe()))
            .finish()
    }
}

impl Config {
    pub fn with_history(mut self, history: bool) -> Self {
        self.history = history;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_compression_cache_limit(mut self, bytes: usize) -> Self {
        self.compression_cache_limit = bytes;
        self
    }
}

fn global_lock() -> &'static RwLock<Config> {
    static GLOBAL: OnceLock<RwLock<Config>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(Config::default()))
}

/// Snapshot of the current global defaults.
pub fn global() -> Config {
    match global_lock().read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Change the global defaults.
///
/// ```
/// ldict::config::setup(|cfg| cfg.history = true);
/// assert!(ldict::config::global().history);
/// ldict::config::reset();
/// ```
pub fn setup<F: FnOnce(&mut Config)>(f: F) {
    let mut guard = match global_lock().write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&mut guard);
    tracing::debug!(config = ?*guard, "global config updated");
}

/// Restore the global defaults.
pub fn reset() {
    setup(|cfg| *cfg = Config::default());
}
