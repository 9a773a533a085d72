use std::fmt::Debug;

use mm_core::{MatMulMode, MatrixView};

use crate::multiplier::Multiplier;

/// A matrix multiplication algorithm operating through views.
///
/// `engine` is the composite that dispatched this call. Algorithms that split
/// the problem hand every sub-problem back to `engine`, so each piece goes
/// through strategy selection again.
pub trait MatMulAlgorithm: Send + Sync + Debug {
    /// Returns the name of this algorithm (e.g., "naive", "strassen").
    fn name(&self) -> &str;

    /// Compute `C = A * B` (`Overwrite`) or `C += A * B` (`Add`).
    ///
    /// Callers guarantee `A.cols == B.rows`, `A.rows == C.rows` and
    /// `B.cols == C.cols`, plus whatever precondition guarded this algorithm.
    fn multiply(
        &self,
        engine: &Multiplier,
        a: MatrixView<'_>,
        b: MatrixView<'_>,
        c: MatrixView<'_>,
        mode: MatMulMode,
    );
}

/// True if `C = A * B` is well-formed.
pub fn multipliable(a: &MatrixView<'_>, b: &MatrixView<'_>, c: &MatrixView<'_>) -> bool {
    a.col_count() == b.row_count() && b.col_count() == c.col_count() && a.row_count() == c.row_count()
}
