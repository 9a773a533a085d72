use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, Scope, ScopedJoinHandle};

use mm_core::{MatMulMode, MatrixView, TripleKey};
use tracing::{debug, warn};

use crate::algorithm::MatMulAlgorithm;
use crate::config::EngineConfig;
use crate::multiplier::Multiplier;
use crate::recursive::{quadrant_products, trivial_case, SubProduct};

/// Thread budget and serial-lease bookkeeping shared by every
/// [`MultithreadedRecursive`] call that uses it.
///
/// `bound` caps the helper threads alive at once across all call trees using
/// this scheduler. Sub-problems that a caller runs on its own thread after
/// the budget ran out hold a lease for the duration; [`is_threaded_part`]
/// reports them as serial so the engine does not schedule them again.
///
/// [`is_threaded_part`]: ThreadScheduler::is_threaded_part
#[derive(Debug)]
pub struct ThreadScheduler {
    bound: usize,
    active: AtomicUsize,
    peak: AtomicUsize,
    leases: Mutex<HashMap<TripleKey, usize>>,
    spawns_refused: AtomicBool,
}

/// One unit of thread budget, returned when dropped.
struct Reservation<'s> {
    scheduler: &'s ThreadScheduler,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.scheduler.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Serial sub-problems registered by one caller, released when dropped.
struct SerialLease<'s> {
    scheduler: &'s ThreadScheduler,
    keys: Vec<TripleKey>,
}

impl Drop for SerialLease<'_> {
    fn drop(&mut self) {
        let mut leases = self.scheduler.lock_leases();
        for key in &self.keys {
            if let Some(count) = leases.get_mut(key) {
                *count -= 1;
                if *count == 0 {
                    leases.remove(key);
                }
            }
        }
    }
}

impl ThreadScheduler {
    pub fn new(bound: usize) -> Self {
        Self {
            bound,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            leases: Mutex::new(HashMap::new()),
            spawns_refused: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_helper_threads)
    }

    /// The process-wide scheduler, configured from the environment on first
    /// use.
    pub fn global() -> Arc<ThreadScheduler> {
        static GLOBAL: OnceLock<Arc<ThreadScheduler>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| {
                let config = EngineConfig::from_env().unwrap_or_else(|err| {
                    warn!(error = %err, "ignoring matmul environment overrides");
                    EngineConfig::default()
                });
                Arc::new(ThreadScheduler::from_config(&config))
            })
            .clone()
    }

    /// Maximum number of helper threads alive at once.
    pub fn bound(&self) -> usize {
        self.bound
    }

    /// Helper threads currently reserved.
    pub fn active_threads(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Highest number of helper threads ever reserved at once.
    pub fn peak_threads(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    /// True unless `(a, b, c)` is currently being run serially by some caller.
    pub fn is_threaded_part(
        &self,
        a: &MatrixView<'_>,
        b: &MatrixView<'_>,
        c: &MatrixView<'_>,
    ) -> bool {
        !self.lock_leases().contains_key(&TripleKey::of(a, b, c))
    }

    fn try_reserve(&self) -> Option<Reservation<'_>> {
        let previous = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.bound).then_some(n + 1)
            })
            .ok()?;
        self.peak.fetch_max(previous + 1, Ordering::AcqRel);
        Some(Reservation { scheduler: self })
    }

    fn lease(&self, parts: &[SubProduct<'_>]) -> SerialLease<'_> {
        let keys: Vec<TripleKey> = parts.iter().map(|(a, b, c)| TripleKey::of(a, b, c)).collect();
        let mut leases = self.lock_leases();
        for key in &keys {
            *leases.entry(*key).or_insert(0) += 1;
        }
        drop(leases);
        SerialLease {
            scheduler: self,
            keys,
        }
    }

    /// Start a named helper on `scope`. The closure, and any reservation it
    /// owns, is dropped unrun if the thread cannot be created.
    fn spawn_helper<'scope, 'env, F>(
        &self,
        scope: &'scope Scope<'scope, 'env>,
        f: F,
    ) -> io::Result<ScopedJoinHandle<'scope, ()>>
    where
        F: FnOnce() + Send + 'scope,
    {
        if self.spawns_refused.load(Ordering::Acquire) {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "helper spawning disabled",
            ));
        }
        thread::Builder::new()
            .name("mm-helper".to_string())
            .spawn_scoped(scope, f)
    }

    #[cfg(test)]
    fn refuse_spawns(&self) {
        self.spawns_refused.store(true, Ordering::Release);
    }

    fn lock_leases(&self) -> MutexGuard<'_, HashMap<TripleKey, usize>> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Quadrant recursion that runs up to three of its four output quadrants on
/// helper threads while the scheduler's budget allows.
///
/// Each helper computes both products feeding one quadrant of `C`, so helpers
/// never write the same memory. The last quadrant, plus any quadrant the
/// budget could not cover, runs on the calling thread. All helpers are joined
/// before `multiply` returns.
#[derive(Debug, Clone)]
pub struct MultithreadedRecursive {
    scheduler: Arc<ThreadScheduler>,
}

impl MultithreadedRecursive {
    pub fn new(scheduler: Arc<ThreadScheduler>) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Arc<ThreadScheduler> {
        &self.scheduler
    }
}

impl MatMulAlgorithm for MultithreadedRecursive {
    fn name(&self) -> &str {
        "multithreaded_recursive"
    }

    fn multiply(
        &self,
        engine: &Multiplier,
        a: MatrixView<'_>,
        b: MatrixView<'_>,
        c: MatrixView<'_>,
        mode: MatMulMode,
    ) {
        if mode == MatMulMode::Overwrite {
            c.clear();
        }
        if trivial_case(&a, &b, &c) {
            return;
        }

        let scheduler = &*self.scheduler;
        let products = quadrant_products(a, b, c);
        let (threadable, last) = products.split_at(6);

        thread::scope(|scope| {
            let mut helpers = Vec::with_capacity(3);
            let mut serial: Vec<SubProduct<'_>> = Vec::with_capacity(8);

            for pair in threadable.chunks(2) {
                if let Some(reservation) = scheduler.try_reserve() {
                    let work: Vec<SubProduct<'_>> = pair.to_vec();
                    let spawned = scheduler.spawn_helper(scope, move || {
                        let _reservation = reservation;
                        for (x, y, z) in work {
                            engine.multiply(x, y, z, MatMulMode::Add);
                        }
                    });
                    match spawned {
                        Ok(handle) => {
                            debug!(
                                rows = pair[0].2.row_count(),
                                cols = pair[0].2.col_count(),
                                active = scheduler.active_threads(),
                                bound = scheduler.bound(),
                                "spawned helper"
                            );
                            helpers.push(handle);
                            continue;
                        }
                        Err(err) => {
                            warn!(error = %err, "helper spawn failed, running serially");
                        }
                    }
                }
                serial.extend_from_slice(pair);
            }
            serial.extend_from_slice(last);

            debug!(
                helpers = helpers.len(),
                serial = serial.len(),
                "running deferred products on caller"
            );
            {
                let _lease = scheduler.lease(&serial);
                for &(x, y, z) in &serial {
                    engine.multiply(x, y, z, MatMulMode::Add);
                }
            }

            let mut panic = None;
            for handle in helpers {
                if let Err(payload) = handle.join() {
                    panic = panic.or(Some(payload));
                }
            }
            if let Some(payload) = panic {
                std::panic::resume_unwind(payload);
            }
        });
    }
}
