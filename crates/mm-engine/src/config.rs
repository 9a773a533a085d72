use std::mem::size_of;
use std::num::NonZeroUsize;
use std::thread;

use mm_core::Element;

use crate::error::{EngineError, Result};

/// L1 data cache size assumed when nothing better is known.
pub const DEFAULT_L1_CACHE_BYTES: usize = 32 * 1024;

/// Environment variable overriding [`EngineConfig::l1_cache_bytes`].
pub const L1_CACHE_ENV: &str = "MATMUL_L1_CACHE_BYTES";
/// Environment variable overriding [`EngineConfig::max_helper_threads`].
pub const MAX_THREADS_ENV: &str = "MATMUL_MAX_THREADS";

/// Tuning inputs for the size-adaptive multipliers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// L1 data cache size in bytes. Drives Strassen/recursion thresholds and
    /// cache-aware block sizes.
    pub l1_cache_bytes: usize,
    /// Upper bound on helper threads alive at once in a scheduler built from
    /// this config.
    pub max_helper_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            l1_cache_bytes: DEFAULT_L1_CACHE_BYTES,
            max_helper_threads: default_helper_threads(),
        }
    }
}

/// Hardware concurrency minus the calling thread.
fn default_helper_threads() -> usize {
    thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .saturating_sub(1)
}

fn parse_override(name: &str, value: Option<String>) -> Result<Option<usize>> {
    match value {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<usize>().map(Some).map_err(|_| {
            EngineError::InvalidConfig(format!("{}={:?} is not a non-negative integer", name, raw))
        }),
    }
}

impl EngineConfig {
    /// Defaults, overridden by `MATMUL_L1_CACHE_BYTES` and `MATMUL_MAX_THREADS`
    /// when set.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if an override does not parse or the result
    /// fails [`EngineConfig::validate`].
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(bytes) = parse_override(L1_CACHE_ENV, std::env::var(L1_CACHE_ENV).ok())? {
            config.l1_cache_bytes = bytes;
        }
        if let Some(threads) =
            parse_override(MAX_THREADS_ENV, std::env::var(MAX_THREADS_ENV).ok())?
        {
            config.max_helper_threads = threads;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_l1_cache_bytes(mut self, bytes: usize) -> Self {
        self.l1_cache_bytes = bytes;
        self
    }

    pub fn with_max_helper_threads(mut self, threads: usize) -> Self {
        self.max_helper_threads = threads;
        self
    }

    /// The cache must hold at least one element.
    pub fn validate(&self) -> Result<()> {
        if self.l1_cache_bytes < size_of::<Element>() {
            return Err(EngineError::InvalidConfig(format!(
                "l1_cache_bytes={} is smaller than one element",
                self.l1_cache_bytes
            )));
        }
        Ok(())
    }

    /// Number of elements that fit in L1.
    pub fn element_threshold(&self) -> usize {
        self.l1_cache_bytes / size_of::<Element>()
    }

    /// Side of a square block such that four blocks fit in L1 (at least 1).
    pub fn block_size(&self) -> usize {
        ((self.element_threshold() / 4) as f64).sqrt().floor().max(1.0) as usize
    }

    /// True if the three operands of an `n x m` by `m x p` product together
    /// overflow L1.
    pub fn exceeds_cache(&self, n: usize, m: usize, p: usize) -> bool {
        n * m + m * p + n * p > self.element_threshold()
    }
}
