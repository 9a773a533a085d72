use mm_core::{add, sub, MatMulMode, MatrixBuffer, MatrixView};
use tracing::trace;

use crate::algorithm::MatMulAlgorithm;
use crate::multiplier::Multiplier;

/// Strassen's seven-product scheme.
///
/// Only valid for square operands whose side is a power of two; the
/// `strassen_then` combinator guards this, the algorithm does not re-check it
/// outside debug builds. The seven sub-products go back through the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Strassen;

impl MatMulAlgorithm for Strassen {
    fn name(&self) -> &str {
        "strassen"
    }

    fn multiply(
        &self,
        engine: &Multiplier,
        a: MatrixView<'_>,
        b: MatrixView<'_>,
        c: MatrixView<'_>,
        mode: MatMulMode,
    ) {
        let s = a.row_count();
        if s == 0 {
            return;
        }
        debug_assert!(
            s.is_power_of_two()
                && a.col_count() == s
                && b.row_count() == s
                && b.col_count() == s
                && c.row_count() == s
                && c.col_count() == s,
            "strassen needs square power-of-two operands"
        );

        if s == 1 {
            let product = a.get(0, 0).wrapping_mul(b.get(0, 0));
            match mode {
                MatMulMode::Overwrite => c.set(0, 0, product),
                MatMulMode::Add => c.add_at(0, 0, product),
            }
            return;
        }

        // The combination step assumes the quadrants of C start from the
        // fresh products, so accumulation goes through a full-size temporary.
        if mode == MatMulMode::Add {
            let product = MatrixBuffer::zeros(s, s);
            self.multiply(engine, a, b, product.view(), MatMulMode::Overwrite);
            c.add_into(&product.view());
            return;
        }

        let h = s / 2;
        trace!(s, scratch = 5 * h * h, "strassen scratch");
        // Five h x h temporaries stacked vertically, owned by this frame.
        let scratch = MatrixBuffer::zeros(5 * h, h);
        let sv = scratch.view();
        let [x, y, u, v, w] = [0, 1, 2, 3, 4].map(|t| sv.sub_view(t * h, (t + 1) * h, 0, h));

        let (qa, qb, qc) = (a.quadrants(), b.quadrants(), c.quadrants());
        let (a11, a12, a21, a22) = (qa.q11, qa.q12, qa.q21, qa.q22);
        let (b11, b12, b21, b22) = (qb.q11, qb.q12, qb.q21, qb.q22);
        let (c11, c12, c21, c22) = (qc.q11, qc.q12, qc.q21, qc.q22);
        let overwrite = MatMulMode::Overwrite;

        add(&a11, &a22, &x);
        add(&b11, &b22, &y);
        engine.multiply(x, y, u, overwrite);

        add(&a21, &a22, &x);
        engine.multiply(x, b11, c21, overwrite);

        sub(&b12, &b22, &x);
        engine.multiply(a11, x, c12, overwrite);

        sub(&b21, &b11, &x);
        engine.multiply(a22, x, v, overwrite);

        add(&a11, &a12, &x);
        engine.multiply(x, b22, w, overwrite);

        sub(&a21, &a11, &x);
        add(&b11, &b12, &y);
        engine.multiply(x, y, c22, overwrite);

        sub(&a12, &a22, &x);
        add(&b21, &b22, &y);
        engine.multiply(x, y, c11, overwrite);

        c11.add_into(&u);
        c11.add_into(&v);
        c11.sub_into(&w);
        c22.add_into(&u);
        c22.add_into(&c12);
        c22.sub_into(&c21);
        c12.add_into(&w);
        c21.add_into(&v);
    }
}
