use mm_core::{Element, MatMulMode, MatrixView};

use crate::algorithm::{multipliable, MatMulAlgorithm};
use crate::multiplier::Multiplier;

/// Textbook triple loop in (row, col, inner) order.
///
/// Mismatched shapes are a no-op.
pub fn naive_iterative(a: MatrixView<'_>, b: MatrixView<'_>, c: MatrixView<'_>, mode: MatMulMode) {
    if !multipliable(&a, &b, &c) {
        return;
    }
    if mode == MatMulMode::Overwrite {
        c.clear();
    }

    let (n, m, p) = (a.row_count(), a.col_count(), b.col_count());
    for i in 0..n {
        for j in 0..p {
            let mut sum: Element = 0;
            for k in 0..m {
                sum = sum.wrapping_add(a.get(i, k).wrapping_mul(b.get(k, j)));
            }
            c.add_at(i, j, sum);
        }
    }
}

/// Triple loop in (row, inner, col) order, so the innermost loop walks rows of
/// both `B` and `C` sequentially.
///
/// Mismatched shapes are a no-op.
pub fn cache_friendly_iterative(
    a: MatrixView<'_>,
    b: MatrixView<'_>,
    c: MatrixView<'_>,
    mode: MatMulMode,
) {
    if !multipliable(&a, &b, &c) {
        return;
    }
    if mode == MatMulMode::Overwrite {
        c.clear();
    }

    let (n, m, p) = (a.row_count(), a.col_count(), b.col_count());
    for i in 0..n {
        for k in 0..m {
            let aik = a.get(i, k);
            for j in 0..p {
                c.add_at(i, j, aik.wrapping_mul(b.get(k, j)));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveIterative;

impl MatMulAlgorithm for NaiveIterative {
    fn name(&self) -> &str {
        "naive"
    }

    fn multiply(
        &self,
        _engine: &Multiplier,
        a: MatrixView<'_>,
        b: MatrixView<'_>,
        c: MatrixView<'_>,
        mode: MatMulMode,
    ) {
        naive_iterative(a, b, c, mode);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheFriendlyIterative;

impl MatMulAlgorithm for CacheFriendlyIterative {
    fn name(&self) -> &str {
        "cache_friendly"
    }

    fn multiply(
        &self,
        _engine: &Multiplier,
        a: MatrixView<'_>,
        b: MatrixView<'_>,
        c: MatrixView<'_>,
        mode: MatMulMode,
    ) {
        cache_friendly_iterative(a, b, c, mode);
    }
}
