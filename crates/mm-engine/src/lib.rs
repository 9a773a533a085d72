//! `mm-engine` - Composable integer matrix multiplication.
//!
//! This crate provides:
//! - Iterative, blocked, recursive and Strassen algorithms behind the
//!   `MatMulAlgorithm` trait
//! - A bounded multithreaded recursion driven by a `ThreadScheduler`
//! - `Multiplier`, a first-match strategy chain with combinators and the
//!   size-adaptive hybrid presets
//! - `EngineConfig` for cache and thread tuning

pub mod algorithm;
pub mod blocked;
pub mod config;
pub mod error;
pub mod iterative;
pub mod multiplier;
pub mod recursive;
pub mod strassen;
pub mod threaded;

pub use algorithm::{multipliable, MatMulAlgorithm};
pub use blocked::Blocked;
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use iterative::{
    cache_friendly_iterative, naive_iterative, CacheFriendlyIterative, NaiveIterative,
};
pub use multiplier::{Multiplier, Precondition, Strategy};
pub use recursive::Recursive;
pub use strassen::Strassen;
pub use threaded::{MultithreadedRecursive, ThreadScheduler};
