use std::fmt;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicI32, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{MatrixError, Result};
use crate::view::MatrixView;

/// Scalar type stored in every matrix.
pub type Element = i32;

/// Owned, row-major storage for one full matrix.
///
/// Elements live in atomic cells accessed with relaxed ordering. Views over
/// the same buffer may alias freely, and scoped worker threads may write
/// disjoint regions concurrently, without any `unsafe` in the crate.
/// The buffer is never resized after creation.
pub struct MatrixBuffer {
    data: Box<[AtomicI32]>,
    rows: usize,
    cols: usize,
}

impl MatrixBuffer {
    /// Create a zero-filled `rows x cols` buffer.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        MatrixBuffer {
            data: (0..rows * cols).map(|_| AtomicI32::new(0)).collect(),
            rows,
            cols,
        }
    }

    /// Create a buffer from row-major data split into rows of `cols` elements.
    ///
    /// # Errors
    /// Returns `InvalidStride` if `data.len()` is not a multiple of `cols`.
    pub fn from_vec(data: Vec<Element>, cols: usize) -> Result<Self> {
        if cols == 0 {
            if !data.is_empty() {
                return Err(MatrixError::InvalidStride {
                    len: data.len(),
                    stride: cols,
                });
            }
            return Ok(MatrixBuffer::zeros(0, 0));
        }
        if data.len() % cols != 0 {
            return Err(MatrixError::InvalidStride {
                len: data.len(),
                stride: cols,
            });
        }
        let rows = data.len() / cols;
        Ok(MatrixBuffer {
            data: data.into_iter().map(AtomicI32::new).collect(),
            rows,
            cols,
        })
    }

    /// Create a buffer from a slice of fixed-width rows.
    pub fn from_rows<const N: usize>(rows: &[[Element; N]]) -> Self {
        MatrixBuffer {
            data: rows.iter().flatten().map(|&v| AtomicI32::new(v)).collect(),
            rows: rows.len(),
            cols: N,
        }
    }

    /// Create an `n x n` identity matrix.
    pub fn identity(n: usize) -> Self {
        let buf = MatrixBuffer::zeros(n, n);
        for i in 0..n {
            buf.data[i * n + i].store(1, Ordering::Relaxed);
        }
        buf
    }

    /// Create a `rows x cols` buffer of values drawn uniformly from `range`.
    ///
    /// The same seed always produces the same matrix.
    ///
    /// # Panics
    /// Panics if `range` is empty and the matrix has at least one element.
    pub fn random(rows: usize, cols: usize, seed: u64, range: RangeInclusive<Element>) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        MatrixBuffer {
            data: (0..rows * cols)
                .map(|_| AtomicI32::new(rng.gen_range(range.clone())))
                .collect(),
            rows,
            cols,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of elements in the buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read the element at `(row, col)`.
    ///
    /// # Panics
    /// Panics if the position is outside the matrix.
    pub fn get(&self, row: usize, col: usize) -> Element {
        assert!(
            row < self.rows && col < self.cols,
            "position ({}, {}) outside {}x{} matrix",
            row,
            col,
            self.rows,
            self.cols
        );
        self.data[row * self.cols + col].load(Ordering::Relaxed)
    }

    /// Copy the contents out in row-major order.
    pub fn to_vec(&self) -> Vec<Element> {
        self.data.iter().map(|v| v.load(Ordering::Relaxed)).collect()
    }

    /// A view covering the whole matrix.
    pub fn view(&self) -> MatrixView<'_> {
        MatrixView::from_parts(&self.data, self.cols, 0, self.rows, 0, self.cols)
    }

    /// A view over rows `row_start..row_end` and cols `col_start..col_end`.
    ///
    /// # Errors
    /// Returns `InvalidBounds` if the window is inverted or leaves the matrix.
    pub fn view_bounds(
        &self,
        row_start: usize,
        row_end: usize,
        col_start: usize,
        col_end: usize,
    ) -> Result<MatrixView<'_>> {
        if row_start > row_end || col_start > col_end || row_end > self.rows || col_end > self.cols
        {
            return Err(MatrixError::InvalidBounds {
                rows: self.rows,
                cols: self.cols,
                row_start,
                row_end,
                col_start,
                col_end,
            });
        }
        Ok(MatrixView::from_parts(
            &self.data, self.cols, row_start, row_end, col_start, col_end,
        ))
    }
}

impl Clone for MatrixBuffer {
    fn clone(&self) -> Self {
        MatrixBuffer {
            data: self
                .data
                .iter()
                .map(|v| AtomicI32::new(v.load(Ordering::Relaxed)))
                .collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }
}

impl PartialEq for MatrixBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows && self.cols == other.cols && self.view().value_equals(&other.view())
    }
}

impl Eq for MatrixBuffer {}

impl fmt::Debug for MatrixBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixBuffer")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("data", &self.to_vec())
            .finish()
    }
}
