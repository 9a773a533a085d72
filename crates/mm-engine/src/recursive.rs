use mm_core::{MatMulMode, MatrixView};

use crate::algorithm::MatMulAlgorithm;
use crate::multiplier::Multiplier;

/// One `C_ij += A_ik * B_kj` term of a quadrant split.
pub type SubProduct<'a> = (MatrixView<'a>, MatrixView<'a>, MatrixView<'a>);

/// Split `C = A * B` into the eight quadrant products, grouped so that
/// consecutive pairs accumulate into the same quadrant of `C`
/// (C11, C12, C21, C22 in that order).
///
/// `A` splits at its own row/col midpoints, `B` at its own, and `C` at
/// `A`'s row midpoint and `B`'s col midpoint, so the pieces stay conformant
/// for any shape.
pub fn quadrant_products<'a>(
    a: MatrixView<'a>,
    b: MatrixView<'a>,
    c: MatrixView<'a>,
) -> [SubProduct<'a>; 8] {
    let (qa, qb, qc) = (a.quadrants(), b.quadrants(), c.quadrants());
    [
        (qa.q11, qb.q11, qc.q11),
        (qa.q12, qb.q21, qc.q11),
        (qa.q11, qb.q12, qc.q12),
        (qa.q12, qb.q22, qc.q12),
        (qa.q21, qb.q11, qc.q21),
        (qa.q22, qb.q21, qc.q21),
        (qa.q21, qb.q12, qc.q22),
        (qa.q22, qb.q22, qc.q22),
    ]
}

/// Returns true once the call is fully handled: the operands are empty, or
/// `C` held a single element and received the scalar product.
pub(crate) fn trivial_case(a: &MatrixView<'_>, b: &MatrixView<'_>, c: &MatrixView<'_>) -> bool {
    let (n, m, p) = (a.row_count(), a.col_count(), b.col_count());
    if n == 0 || m == 0 || p == 0 {
        return true;
    }
    if n == 1 && m == 1 && p == 1 {
        c.add_at(0, 0, a.get(0, 0).wrapping_mul(b.get(0, 0)));
        return true;
    }
    false
}

/// Divide and conquer over quadrants, for any shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recursive;

impl MatMulAlgorithm for Recursive {
    fn name(&self) -> &str {
        "recursive"
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
        for (x, y, z) in quadrant_products(a, b, c) {
            engine.multiply(x, y, z, MatMulMode::Add);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterative::naive_iterative;
    use mm_core::MatrixBuffer;

    #[test]
    fn test_2x2() {
        let engine = Multiplier::full_recursive();
        let a = MatrixBuffer::from_rows(&[[1, 2], [3, 4]]);
        let b = MatrixBuffer::from_rows(&[[5, 6], [7, 8]]);
        let c = MatrixBuffer::from_rows(&[[9, 9], [9, 9]]);
        engine.multiply(a.view(), b.view(), c.view(), MatMulMode::Overwrite);
        assert_eq!(c.to_vec(), vec![19, 22, 43, 50]);
        engine.multiply(a.view(), b.view(), c.view(), MatMulMode::Add);
        assert_eq!(c.to_vec(), vec![38, 44, 86, 100]);
    }

    #[test]
    fn test_odd_rectangular_shapes() {
        let engine = Multiplier::full_recursive();
        for &(n, m, p) in &[(1, 1, 5), (3, 1, 2), (5, 3, 7), (2, 9, 1), (7, 7, 7)] {
            let a = MatrixBuffer::random(n, m, 21, -9..=9);
            let b = MatrixBuffer::random(m, p, 22, -9..=9);
            let expected = MatrixBuffer::zeros(n, p);
            let actual = MatrixBuffer::random(n, p, 23, -9..=9);
            naive_iterative(a.view(), b.view(), expected.view(), MatMulMode::Overwrite);
            engine.multiply(a.view(), b.view(), actual.view(), MatMulMode::Overwrite);
            assert_eq!(actual, expected, "shape {}x{}x{}", n, m, p);
        }
    }

    #[test]
    fn test_quadrant_products_cover_every_term() {
        let a = MatrixBuffer::zeros(4, 6);
        let b = MatrixBuffer::zeros(6, 2);
        let c = MatrixBuffer::zeros(4, 2);
        let parts = quadrant_products(a.view(), b.view(), c.view());
        for (x, y, z) in &parts {
            assert_eq!(x.col_count(), y.row_count());
            assert_eq!(x.row_count(), z.row_count());
            assert_eq!(y.col_count(), z.col_count());
        }
        let area: usize = parts
            .iter()
            .map(|(x, _, z)| x.col_count() * z.row_count() * z.col_count())
            .sum();
        assert_eq!(area, 4 * 6 * 2);
    }

    #[test]
    fn test_empty_inner_dimension_overwrites_with_zero() {
        let engine = Multiplier::full_recursive();
        let a = MatrixBuffer::zeros(2, 0);
        let b = MatrixBuffer::zeros(0, 2);
        let c = MatrixBuffer::from_rows(&[[1, 2], [3, 4]]);
        engine.multiply(a.view(), b.view(), c.view(), MatMulMode::Overwrite);
        assert_eq!(c.to_vec(), vec![0; 4]);
    }
}
