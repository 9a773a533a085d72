use std::fmt;
use std::sync::Arc;

use mm_core::{MatMulMode, MatrixBuffer, MatrixView};
use tracing::{debug, trace};

use crate::algorithm::{multipliable, MatMulAlgorithm};
use crate::blocked::Blocked;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::iterative::{CacheFriendlyIterative, NaiveIterative};
use crate::recursive::Recursive;
use crate::strassen::Strassen;
use crate::threaded::{MultithreadedRecursive, ThreadScheduler};

/// Predicate over the problem sizes `(n, m, p)` of an `n x m` by `m x p` product.
pub type SizePredicate = dyn Fn(usize, usize, usize) -> bool + Send + Sync;

/// Predicate over the operand views themselves.
pub type ViewPredicate =
    dyn for<'x, 'y, 'z> Fn(&MatrixView<'x>, &MatrixView<'y>, &MatrixView<'z>) -> bool
        + Send
        + Sync;

/// Guard deciding whether a strategy applies to a sub-problem.
#[derive(Clone)]
pub enum Precondition {
    /// Evaluated on `(A.rows, A.cols, B.cols)`.
    Sizes(Arc<SizePredicate>),
    /// Evaluated on `(A, B, C)`; needed when identity matters, not just size.
    Views(Arc<ViewPredicate>),
}

impl Precondition {
    pub fn always() -> Self {
        Precondition::Sizes(Arc::new(|_, _, _| true))
    }

    pub fn sizes(f: impl Fn(usize, usize, usize) -> bool + Send + Sync + 'static) -> Self {
        Precondition::Sizes(Arc::new(f))
    }

    pub fn views(
        f: impl for<'x, 'y, 'z> Fn(&MatrixView<'x>, &MatrixView<'y>, &MatrixView<'z>) -> bool
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Precondition::Views(Arc::new(f))
    }

    pub fn holds(&self, a: &MatrixView<'_>, b: &MatrixView<'_>, c: &MatrixView<'_>) -> bool {
        match self {
            Precondition::Sizes(f) => f(a.row_count(), a.col_count(), b.col_count()),
            Precondition::Views(f) => f(a, b, c),
        }
    }
}

impl fmt::Debug for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::Sizes(_) => write!(f, "Precondition::Sizes(..)"),
            Precondition::Views(_) => write!(f, "Precondition::Views(..)"),
        }
    }
}

/// A guarded algorithm.
#[derive(Clone, Debug)]
pub struct Strategy {
    pub precondition: Precondition,
    pub algorithm: Arc<dyn MatMulAlgorithm>,
}

/// An ordered chain of strategies with first-match dispatch.
///
/// Multipliers are immutable; the combinators build a new chain by
/// prepending one guarded strategy to a copy of an existing one. Algorithms
/// that split their input dispatch the pieces back through the same chain, so
/// a pipeline such as blocked -> Strassen -> recursive -> iterative degrades
/// step by step as sub-problems shrink.
///
/// ```
/// use mm_core::{MatMulMode, MatrixBuffer};
/// use mm_engine::{EngineConfig, Multiplier};
///
/// let a = MatrixBuffer::from_rows(&[[1, 2], [3, 4]]);
/// let b = MatrixBuffer::from_rows(&[[5, 6], [7, 8]]);
/// let c = MatrixBuffer::zeros(2, 2);
///
/// let engine = Multiplier::hybrid(2, 2, 2, &EngineConfig::default()).unwrap();
/// engine.multiply(a.view(), b.view(), c.view(), MatMulMode::Overwrite);
/// assert_eq!(c.to_vec(), vec![19, 22, 43, 50]);
/// ```
#[derive(Clone, Debug)]
pub struct Multiplier {
    strategies: Vec<Strategy>,
}

/// Largest power of two not above `n`, or 1 for `n == 0`.
fn prev_power_of_two(n: usize) -> usize {
    if n == 0 {
        1
    } else {
        1 << n.ilog2()
    }
}

impl Multiplier {
    /// A single algorithm that accepts every problem.
    pub fn one_strategy<A: MatMulAlgorithm + 'static>(algorithm: A) -> Self {
        Multiplier {
            strategies: vec![Strategy {
                precondition: Precondition::always(),
                algorithm: Arc::new(algorithm),
            }],
        }
    }

    /// `inner` with `(precondition, algorithm)` tried first.
    pub fn add_strategy<A: MatMulAlgorithm + 'static>(
        precondition: Precondition,
        algorithm: A,
        inner: &Multiplier,
    ) -> Self {
        let mut strategies = Vec::with_capacity(inner.strategies.len() + 1);
        strategies.push(Strategy {
            precondition,
            algorithm: Arc::new(algorithm),
        });
        strategies.extend(inner.strategies.iter().cloned());
        Multiplier { strategies }
    }

    /// Tile problems whose three dimensions all exceed `block_size`.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for a zero block size.
    pub fn into_blocks_then(block_size: usize, inner: &Multiplier) -> Result<Self> {
        let blocked = Blocked::new(block_size)?;
        Ok(Self::add_strategy(
            Precondition::sizes(move |n, m, p| n > block_size && m > block_size && p > block_size),
            blocked,
            inner,
        ))
    }

    /// Use Strassen for square power-of-two problems accepted by `until`.
    pub fn strassen_then(
        until: impl Fn(usize, usize, usize) -> bool + Send + Sync + 'static,
        inner: &Multiplier,
    ) -> Self {
        Self::add_strategy(
            Precondition::sizes(move |n, m, p| {
                n == m && m == p && n.is_power_of_two() && until(n, m, p)
            }),
            Strassen,
            inner,
        )
    }

    /// Use quadrant recursion for problems accepted by `until`.
    pub fn recursive_then(until: Precondition, inner: &Multiplier) -> Self {
        Self::add_strategy(until, Recursive, inner)
    }

    /// Gate `inner` behind the process-wide multithreaded scheduler.
    pub fn possibly_multithreaded(inner: &Multiplier) -> Self {
        Self::possibly_multithreaded_with(ThreadScheduler::global(), inner)
    }

    /// Gate `inner` behind a multithreaded recursion that draws helper threads
    /// from `scheduler`. Sub-problems a caller is running serially fall
    /// through to `inner`.
    pub fn possibly_multithreaded_with(scheduler: Arc<ThreadScheduler>, inner: &Multiplier) -> Self {
        let gate = Arc::clone(&scheduler);
        Self::add_strategy(
            Precondition::views(move |a, b, c| gate.is_threaded_part(a, b, c)),
            MultithreadedRecursive::new(scheduler),
            inner,
        )
    }

    pub fn naive_iterative() -> Self {
        Self::one_strategy(NaiveIterative)
    }

    pub fn cache_friendly() -> Self {
        Self::one_strategy(CacheFriendlyIterative)
    }

    pub fn full_recursive() -> Self {
        Self::one_strategy(Recursive)
    }

    /// Strassen wherever it applies, cache-friendly loops elsewhere.
    pub fn full_strassen() -> Self {
        Self::strassen_then(|_, _, _| true, &Self::cache_friendly())
    }

    /// Blocks sized so four fit in L1, each multiplied with cache-friendly loops.
    pub fn cache_aware_blocked(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Self::into_blocks_then(config.block_size(), &Self::cache_friendly())
    }

    /// The size-adaptive pipeline for an `n x m` by `m x p` product:
    /// blocks of the largest power of two within `min(n, m, p)`, then Strassen
    /// and quadrant recursion while the operands overflow L1, then
    /// cache-friendly loops.
    pub fn hybrid(n: usize, m: usize, p: usize, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let block_size = prev_power_of_two(n.min(m).min(p));
        let (strassen_cfg, recursive_cfg) = (config.clone(), config.clone());
        Self::into_blocks_then(
            block_size,
            &Self::strassen_then(
                move |n, m, p| strassen_cfg.exceeds_cache(n, m, p),
                &Self::recursive_then(
                    Precondition::sizes(move |n, m, p| recursive_cfg.exceeds_cache(n, m, p)),
                    &Self::cache_friendly(),
                ),
            ),
        )
    }

    /// [`Multiplier::hybrid`] behind the multithreaded gate.
    pub fn multithreaded_hybrid(
        n: usize,
        m: usize,
        p: usize,
        config: &EngineConfig,
        scheduler: Arc<ThreadScheduler>,
    ) -> Result<Self> {
        Ok(Self::possibly_multithreaded_with(
            scheduler,
            &Self::hybrid(n, m, p, config)?,
        ))
    }

    /// Dispatch to the first strategy whose precondition holds.
    ///
    /// Mismatched shapes, or no matching strategy, leave `C` untouched.
    pub fn multiply(&self, a: MatrixView<'_>, b: MatrixView<'_>, c: MatrixView<'_>, mode: MatMulMode) {
        let (n, m, p) = (a.row_count(), a.col_count(), b.col_count());
        if !multipliable(&a, &b, &c) {
            trace!(n, m, p, "dimension mismatch, skipping");
            return;
        }
        for strategy in &self.strategies {
            if strategy.precondition.holds(&a, &b, &c) {
                trace!(strategy = strategy.algorithm.name(), n, m, p, %mode, "dispatch");
                strategy.algorithm.multiply(self, a, b, c, mode);
                return;
            }
        }
        trace!(n, m, p, "no strategy matched");
    }

    /// Like [`Multiplier::multiply`] but rejects mismatched shapes.
    ///
    /// # Errors
    /// Returns `DimensionMismatch` if `A * B` does not fit `C`.
    pub fn try_multiply(
        &self,
        a: MatrixView<'_>,
        b: MatrixView<'_>,
        c: MatrixView<'_>,
        mode: MatMulMode,
    ) -> Result<()> {
        if !multipliable(&a, &b, &c) {
            return Err(EngineError::DimensionMismatch {
                a_rows: a.row_count(),
                a_cols: a.col_count(),
                b_rows: b.row_count(),
                b_cols: b.col_count(),
                c_rows: c.row_count(),
                c_cols: c.col_count(),
            });
        }
        debug!(
            n = a.row_count(),
            m = a.col_count(),
            p = b.col_count(),
            %mode,
            strategies = ?self.strategy_names(),
            "multiply"
        );
        self.multiply(a, b, c, mode);
        Ok(())
    }

    /// `A * B` into a freshly allocated matrix.
    ///
    /// # Errors
    /// Returns `DimensionMismatch` if `a.cols() != b.rows()`.
    pub fn product(&self, a: &MatrixBuffer, b: &MatrixBuffer) -> Result<MatrixBuffer> {
        let c = MatrixBuffer::zeros(a.rows(), b.cols());
        self.try_multiply(a.view(), b.view(), c.view(), MatMulMode::Overwrite)?;
        Ok(c)
    }

    /// Algorithm names in dispatch order.
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.algorithm.name()).collect()
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records how often it runs and writes a marker instead of multiplying.
    #[derive(Debug)]
    struct Marker {
        value: i32,
        calls: AtomicUsize,
    }

    impl MatMulAlgorithm for Arc<Marker> {
        fn name(&self) -> &str {
            "marker"
        }

        fn multiply(
            &self,
            _engine: &Multiplier,
            _a: MatrixView<'_>,
            _b: MatrixView<'_>,
            c: MatrixView<'_>,
            _mode: MatMulMode,
        ) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            c.set(0, 0, self.value);
        }
    }

    fn marker(value: i32) -> Arc<Marker> {
        Arc::new(Marker {
            value,
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_prev_power_of_two() {
        assert_eq!(prev_power_of_two(0), 1);
        assert_eq!(prev_power_of_two(1), 1);
        assert_eq!(prev_power_of_two(7), 4);
        assert_eq!(prev_power_of_two(64), 64);
        assert_eq!(prev_power_of_two(100), 64);
    }

    #[test]
    fn test_first_match_wins() {
        let first = marker(1);
        let second = marker(2);
        let engine = Multiplier::add_strategy(
            Precondition::sizes(|n, _, _| n > 1),
            first.clone(),
            &Multiplier::one_strategy(second.clone()),
        );
        assert_eq!(engine.strategy_names(), vec!["marker", "marker"]);

        let big = MatrixBuffer::zeros(2, 2);
        engine.multiply(big.view(), big.view(), big.view(), MatMulMode::Overwrite);
        assert_eq!(big.get(0, 0), 1);

        let small = MatrixBuffer::zeros(1, 1);
        engine.multiply(small.view(), small.view(), small.view(), MatMulMode::Overwrite);
        assert_eq!(small.get(0, 0), 2);

        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_match_is_noop() {
        let engine = Multiplier::add_strategy(
            Precondition::sizes(|_, _, _| false),
            marker(1),
            &Multiplier {
                strategies: Vec::new(),
            },
        );
        let c = MatrixBuffer::from_rows(&[[5]]);
        engine.multiply(c.view(), c.view(), c.view(), MatMulMode::Overwrite);
        assert_eq!(c.get(0, 0), 5);
    }

    #[test]
    fn test_mismatch_is_noop_and_try_multiply_errors() {
        let hit = marker(1);
        let engine = Multiplier::one_strategy(hit.clone());
        let a = MatrixBuffer::zeros(2, 3);
        let b = MatrixBuffer::zeros(2, 2);
        let c = MatrixBuffer::zeros(2, 2);
        engine.multiply(a.view(), b.view(), c.view(), MatMulMode::Overwrite);
        assert_eq!(hit.calls.load(Ordering::SeqCst), 0);

        let err = engine
            .try_multiply(a.view(), b.view(), c.view(), MatMulMode::Overwrite)
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::DimensionMismatch {
                a_rows: 2,
                a_cols: 3,
                b_rows: 2,
                b_cols: 2,
                c_rows: 2,
                c_cols: 2,
            }
        );
    }

    #[test]
    fn test_combinators_do_not_mutate_inner() {
        let base = Multiplier::cache_friendly();
        let extended = Multiplier::recursive_then(Precondition::always(), &base);
        assert_eq!(base.len(), 1);
        assert_eq!(extended.strategy_names(), vec!["recursive", "cache_friendly"]);
    }

    #[test]
    fn test_view_precondition_sees_identity() {
        let buf = MatrixBuffer::zeros(2, 2);
        let whole = buf.view().key();
        let engine = Multiplier::add_strategy(
            Precondition::views(move |a, _, _| a.key() == whole),
            marker(7),
            &Multiplier::one_strategy(marker(9)),
        );
        let copy = buf.clone();
        engine.multiply(copy.view(), buf.view(), buf.view(), MatMulMode::Overwrite);
        assert_eq!(buf.get(0, 0), 9);
        engine.multiply(buf.view(), copy.view(), copy.view(), MatMulMode::Overwrite);
        assert_eq!(copy.get(0, 0), 7);
    }

    #[test]
    fn test_strassen_guard_rejects_non_power_of_two() {
        let engine = Multiplier::strassen_then(|_, _, _| true, &Multiplier::cache_friendly());
        assert_eq!(engine.strategy_names(), vec!["strassen", "cache_friendly"]);
        let guard = &engine.strategies()[0].precondition;

        for &(n, m, p) in &[(3, 3, 3), (6, 6, 6), (12, 12, 12), (4, 4, 2), (2, 4, 4), (0, 0, 0)] {
            let a = MatrixBuffer::zeros(n, m);
            let b = MatrixBuffer::zeros(m, p);
            let c = MatrixBuffer::zeros(n, p);
            assert!(!guard.holds(&a.view(), &b.view(), &c.view()), "{}x{}x{}", n, m, p);
        }
        for s in [1, 2, 8] {
            let m = MatrixBuffer::zeros(s, s);
            assert!(guard.holds(&m.view(), &m.view(), &m.view()), "size {}", s);
        }
    }

    #[test]
    fn test_full_strassen_handles_non_power_of_two_squares() {
        let engine = Multiplier::full_strassen();
        let reference = Multiplier::naive_iterative();
        for s in [3, 6, 12, 24] {
            let a = MatrixBuffer::random(s, s, 93, -9..=9);
            let b = MatrixBuffer::random(s, s, 94, -9..=9);
            assert_eq!(
                engine.product(&a, &b).unwrap(),
                reference.product(&a, &b).unwrap(),
                "size {}",
                s
            );
        }
    }

    #[test]
    fn test_hybrid_shape() {
        let engine = Multiplier::hybrid(100, 80, 90, &EngineConfig::default()).unwrap();
        assert_eq!(
            engine.strategy_names(),
            vec!["blocked", "strassen", "recursive", "cache_friendly"]
        );
        assert!(Multiplier::hybrid(4, 4, 4, &EngineConfig::default().with_l1_cache_bytes(0)).is_err());
    }

    #[test]
    fn test_multithreaded_hybrid_shape() {
        let scheduler = Arc::new(ThreadScheduler::new(1));
        let engine =
            Multiplier::multithreaded_hybrid(8, 8, 8, &EngineConfig::default(), scheduler).unwrap();
        assert_eq!(engine.strategy_names()[0], "multithreaded_recursive");
        assert_eq!(engine.len(), 5);
    }

    #[test]
    fn test_possibly_multithreaded_uses_global_scheduler() {
        assert!(Arc::ptr_eq(&ThreadScheduler::global(), &ThreadScheduler::global()));
        let engine = Multiplier::possibly_multithreaded(&Multiplier::cache_friendly());
        let a = MatrixBuffer::random(6, 5, 91, -9..=9);
        let b = MatrixBuffer::random(5, 7, 92, -9..=9);
        let expected = Multiplier::naive_iterative().product(&a, &b).unwrap();
        assert_eq!(engine.product(&a, &b).unwrap(), expected);
        assert!(ThreadScheduler::global().peak_threads() <= ThreadScheduler::global().bound());
    }

    #[test]
    fn test_product() {
        let engine = Multiplier::naive_iterative();
        let a = MatrixBuffer::from_rows(&[[1, 2], [3, 4]]);
        let b = MatrixBuffer::from_rows(&[[5, 6], [7, 8]]);
        let c = engine.product(&a, &b).unwrap();
        assert_eq!(c, MatrixBuffer::from_rows(&[[19, 22], [43, 50]]));
        assert!(engine.product(&a, &MatrixBuffer::zeros(3, 1)).is_err());
    }
}
