use mm_core::{MatMulMode, MatrixView};

use crate::algorithm::MatMulAlgorithm;
use crate::error::{EngineError, Result};
use crate::multiplier::Multiplier;

/// Tiles the iteration space into `block_size` cubes and hands each tile to
/// the enclosing composite in `Add` mode.
#[derive(Debug, Clone, Copy)]
pub struct Blocked {
    block_size: usize,
}

impl Blocked {
    /// # Errors
    /// Returns `InvalidConfig` for a zero block size.
    pub fn new(block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(EngineError::InvalidConfig(
                "block size must be at least 1".to_string(),
            ));
        }
        Ok(Self { block_size })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

impl MatMulAlgorithm for Blocked {
    fn name(&self) -> &str {
        "blocked"
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

        let bs = self.block_size;
        let (n, m, p) = (a.row_count(), a.col_count(), b.col_count());
        for i in (0..n).step_by(bs) {
            let i_end = (i + bs).min(n);
            for k in (0..m).step_by(bs) {
                let k_end = (k + bs).min(m);
                for j in (0..p).step_by(bs) {
                    let j_end = (j + bs).min(p);
                    engine.multiply(
                        a.sub_view(i, i_end, k, k_end),
                        b.sub_view(k, k_end, j, j_end),
                        c.sub_view(i, i_end, j, j_end),
                        MatMulMode::Add,
                    );
                }
            }
        }
    }
}
