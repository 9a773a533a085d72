use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::buffer::Element;
use crate::error::{MatrixError, Result};

/// A zero-copy rectangular window into a row-major buffer.
///
/// Views are cheap `Copy` handles that borrow their backing storage. Any
/// number of views may alias the same buffer, and writes through one are
/// visible through every other. Row and column positions passed to a view
/// are relative to its own origin.
///
/// `MatrixView` deliberately has no `PartialEq`: use [`MatrixView::value_equals`]
/// to compare contents and [`MatrixView::is_same_view`] to compare identity.
#[derive(Clone, Copy)]
pub struct MatrixView<'a> {
    data: &'a [AtomicI32],
    stride: usize,
    row_start: usize,
    row_end: usize,
    col_start: usize,
    col_end: usize,
}

/// The four quadrants of a view.
#[derive(Debug, Clone, Copy)]
pub struct Quadrants<'a> {
    pub q11: MatrixView<'a>,
    pub q12: MatrixView<'a>,
    pub q21: MatrixView<'a>,
    pub q22: MatrixView<'a>,
}

/// Identity of a view: backing storage address plus stride and bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewKey {
    addr: usize,
    len: usize,
    stride: usize,
    rows: (usize, usize),
    cols: (usize, usize),
}

/// Identity of an `(A, B, C)` sub-problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TripleKey(pub ViewKey, pub ViewKey, pub ViewKey);

impl TripleKey {
    pub fn of(a: &MatrixView<'_>, b: &MatrixView<'_>, c: &MatrixView<'_>) -> Self {
        TripleKey(a.key(), b.key(), c.key())
    }
}

impl<'a> MatrixView<'a> {
    /// A view over all of `data`, split into rows of `stride` elements.
    ///
    /// # Errors
    /// Returns `InvalidStride` if `data.len()` is not a multiple of `stride`.
    pub fn new(data: &'a [AtomicI32], stride: usize) -> Result<Self> {
        if stride == 0 {
            if !data.is_empty() {
                return Err(MatrixError::InvalidStride {
                    len: data.len(),
                    stride,
                });
            }
            return Ok(MatrixView::from_parts(data, 0, 0, 0, 0, 0));
        }
        if data.len() % stride != 0 {
            return Err(MatrixError::InvalidStride {
                len: data.len(),
                stride,
            });
        }
        Ok(MatrixView::from_parts(
            data,
            stride,
            0,
            data.len() / stride,
            0,
            stride,
        ))
    }

    /// A view over an explicit window of `data`.
    ///
    /// # Errors
    /// Returns `InvalidStride` for a ragged buffer and `InvalidBounds` if the
    /// window is inverted or does not fit.
    pub fn with_bounds(
        data: &'a [AtomicI32],
        stride: usize,
        row_start: usize,
        row_end: usize,
        col_start: usize,
        col_end: usize,
    ) -> Result<Self> {
        let full = MatrixView::new(data, stride)?;
        let (rows, cols) = (full.row_count(), full.col_count());
        if row_start > row_end || col_start > col_end || row_end > rows || col_end > cols {
            return Err(MatrixError::InvalidBounds {
                rows,
                cols,
                row_start,
                row_end,
                col_start,
                col_end,
            });
        }
        Ok(MatrixView::from_parts(
            data, stride, row_start, row_end, col_start, col_end,
        ))
    }

    pub(crate) fn from_parts(
        data: &'a [AtomicI32],
        stride: usize,
        row_start: usize,
        row_end: usize,
        col_start: usize,
        col_end: usize,
    ) -> Self {
        MatrixView {
            data,
            stride,
            row_start,
            row_end,
            col_start,
            col_end,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_end - self.row_start
    }

    pub fn col_count(&self) -> usize {
        self.col_end - self.col_start
    }

    /// Row stride of the backing buffer.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// True if the view has no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0 || self.col_count() == 0
    }

    /// The cells of row `row`, restricted to the view's columns.
    pub fn row_cells(&self, row: usize) -> &'a [AtomicI32] {
        debug_assert!(row < self.row_count(), "row {} outside view", row);
        let start = self.stride * (self.row_start + row) + self.col_start;
        &self.data[start..start + self.col_count()]
    }

    #[inline]
    fn cell(&self, row: usize, col: usize) -> &'a AtomicI32 {
        debug_assert!(
            row < self.row_count() && col < self.col_count(),
            "position ({}, {}) outside {}x{} view",
            row,
            col,
            self.row_count(),
            self.col_count()
        );
        &self.data[self.stride * (self.row_start + row) + self.col_start + col]
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Element {
        self.cell(row, col).load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, row: usize, col: usize, value: Element) {
        self.cell(row, col).store(value, Ordering::Relaxed);
    }

    /// Wrapping `self[row, col] += value`.
    #[inline]
    pub fn add_at(&self, row: usize, col: usize, value: Element) {
        let cell = self.cell(row, col);
        cell.store(cell.load(Ordering::Relaxed).wrapping_add(value), Ordering::Relaxed);
    }

    /// A window into the same backing buffer. Bounds are relative to this
    /// view's origin, so sub-views compose.
    ///
    /// # Panics
    /// Panics if the window is inverted or extends past this view.
    pub fn sub_view(
        &self,
        row_start: usize,
        row_end: usize,
        col_start: usize,
        col_end: usize,
    ) -> MatrixView<'a> {
        assert!(
            row_start <= row_end
                && row_end <= self.row_count()
                && col_start <= col_end
                && col_end <= self.col_count(),
            "sub_view rows {}..{}, cols {}..{} outside {}x{} view",
            row_start,
            row_end,
            col_start,
            col_end,
            self.row_count(),
            self.col_count()
        );
        MatrixView::from_parts(
            self.data,
            self.stride,
            self.row_start + row_start,
            self.row_start + row_end,
            self.col_start + col_start,
            self.col_start + col_end,
        )
    }

    /// Split at `rows / 2` and `cols / 2`. Odd extents put the extra row or
    /// column in the second half.
    pub fn quadrants(&self) -> Quadrants<'a> {
        let (n, m) = (self.row_count(), self.col_count());
        let (rh, ch) = (n / 2, m / 2);
        Quadrants {
            q11: self.sub_view(0, rh, 0, ch),
            q12: self.sub_view(0, rh, ch, m),
            q21: self.sub_view(rh, n, 0, ch),
            q22: self.sub_view(rh, n, ch, m),
        }
    }

    /// Zero every element in the view.
    pub fn clear(&self) {
        for i in 0..self.row_count() {
            for cell in self.row_cells(i) {
                cell.store(0, Ordering::Relaxed);
            }
        }
    }

    fn assert_same_shape(&self, other: &MatrixView<'_>, op: &str) {
        assert!(
            self.row_count() == other.row_count() && self.col_count() == other.col_count(),
            "{}: shape mismatch {}x{} vs {}x{}",
            op,
            self.row_count(),
            self.col_count(),
            other.row_count(),
            other.col_count()
        );
    }

    fn zip_apply(&self, other: &MatrixView<'_>, f: impl Fn(Element, Element) -> Element) {
        for i in 0..self.row_count() {
            for (dst, src) in self.row_cells(i).iter().zip(other.row_cells(i)) {
                let v = f(dst.load(Ordering::Relaxed), src.load(Ordering::Relaxed));
                dst.store(v, Ordering::Relaxed);
            }
        }
    }

    /// `self += other`, elementwise with wrapping.
    ///
    /// # Panics
    /// Panics if the views differ in shape.
    pub fn add_into(&self, other: &MatrixView<'_>) {
        self.assert_same_shape(other, "add_into");
        self.zip_apply(other, Element::wrapping_add);
    }

    /// `self -= other`, elementwise with wrapping.
    ///
    /// # Panics
    /// Panics if the views differ in shape.
    pub fn sub_into(&self, other: &MatrixView<'_>) {
        self.assert_same_shape(other, "sub_into");
        self.zip_apply(other, Element::wrapping_sub);
    }

    /// Copy `other` into `self`.
    ///
    /// # Panics
    /// Panics if the views differ in shape.
    pub fn assign_from(&self, other: &MatrixView<'_>) {
        self.assert_same_shape(other, "assign_from");
        self.zip_apply(other, |_, src| src);
    }

    /// True if both views have the same shape and equal elements.
    pub fn value_equals(&self, other: &MatrixView<'_>) -> bool {
        if self.row_count() != other.row_count() || self.col_count() != other.col_count() {
            return false;
        }
        (0..self.row_count()).all(|i| {
            self.row_cells(i)
                .iter()
                .zip(other.row_cells(i))
                .all(|(x, y)| x.load(Ordering::Relaxed) == y.load(Ordering::Relaxed))
        })
    }

    /// True if both views cover the same window of the same storage.
    pub fn is_same_view(&self, other: &MatrixView<'_>) -> bool {
        self.key() == other.key()
    }

    pub fn key(&self) -> ViewKey {
        ViewKey {
            addr: self.data.as_ptr() as usize,
            len: self.data.len(),
            stride: self.stride,
            rows: (self.row_start, self.row_end),
            cols: (self.col_start, self.col_end),
        }
    }

    /// Copy the view's elements out in row-major order.
    pub fn to_vec(&self) -> Vec<Element> {
        (0..self.row_count())
            .flat_map(|i| self.row_cells(i).iter().map(|v| v.load(Ordering::Relaxed)))
            .collect()
    }
}

/// `dst = a + b`
///
/// # Panics
/// Panics if the three views differ in shape.
pub fn add(a: &MatrixView<'_>, b: &MatrixView<'_>, dst: &MatrixView<'_>) {
    combine(a, b, dst, "add", Element::wrapping_add);
}

/// `dst = a - b`
///
/// # Panics
/// Panics if the three views differ in shape.
pub fn sub(a: &MatrixView<'_>, b: &MatrixView<'_>, dst: &MatrixView<'_>) {
    combine(a, b, dst, "sub", Element::wrapping_sub);
}

fn combine(
    a: &MatrixView<'_>,
    b: &MatrixView<'_>,
    dst: &MatrixView<'_>,
    op: &str,
    f: impl Fn(Element, Element) -> Element,
) {
    dst.assert_same_shape(a, op);
    dst.assert_same_shape(b, op);
    for i in 0..dst.row_count() {
        let (ra, rb) = (a.row_cells(i), b.row_cells(i));
        for (j, out) in dst.row_cells(i).iter().enumerate() {
            out.store(
                f(ra[j].load(Ordering::Relaxed), rb[j].load(Ordering::Relaxed)),
                Ordering::Relaxed,
            );
        }
    }
}

impl fmt::Debug for MatrixView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixView")
            .field("stride", &self.stride)
            .field("rows", &(self.row_start..self.row_end))
            .field("cols", &(self.col_start..self.col_end))
            .finish()
    }
}

impl fmt::Display for MatrixView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.row_count() {
            write!(f, "[")?;
            for j in 0..self.col_count() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", self.get(i, j))?;
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MatrixBuffer;

    fn counting(rows: usize, cols: usize) -> MatrixBuffer {
        MatrixBuffer::from_vec((0..(rows * cols) as Element).collect(), cols).unwrap()
    }

    #[test]
    fn test_new_full_view() {
        let buf = counting(3, 4);
        let v = buf.view();
        assert_eq!(v.row_count(), 3);
        assert_eq!(v.col_count(), 4);
        assert_eq!(v.stride(), 4);
        assert_eq!(v.get(2, 1), 9);
    }

    #[test]
    fn test_new_rejects_ragged() {
        let buf = counting(1, 5);
        let data = &buf.view().row_cells(0)[..];
        assert!(MatrixView::new(data, 2).is_err());
        assert!(MatrixView::new(data, 0).is_err());
        assert_eq!(MatrixView::new(data, 5).unwrap().row_count(), 1);
    }

    #[test]
    fn test_with_bounds() {
        let buf = counting(1, 6);
        let data = buf.view().row_cells(0);
        let v = MatrixView::with_bounds(data, 3, 1, 2, 1, 3).unwrap();
        assert_eq!(v.to_vec(), vec![4, 5]);
        assert!(MatrixView::with_bounds(data, 3, 0, 3, 0, 1).is_err());
        assert!(MatrixView::with_bounds(data, 3, 0, 1, 2, 1).is_err());
    }

    #[test]
    fn test_set_and_add_at_write_through() {
        let buf = MatrixBuffer::zeros(2, 2);
        let v = buf.view();
        v.sub_view(1, 2, 0, 2).set(0, 1, 5);
        v.add_at(1, 1, 3);
        assert_eq!(buf.to_vec(), vec![0, 0, 0, 8]);
    }

    #[test]
    fn test_sub_view_composes() {
        let buf = counting(6, 7);
        let v = buf.view();
        let nested = v.sub_view(1, 5, 2, 7).sub_view(1, 3, 0, 4);
        let direct = v.sub_view(2, 4, 2, 6);
        assert!(nested.value_equals(&direct));
        assert!(nested.is_same_view(&direct));
    }

    #[test]
    #[should_panic]
    fn test_sub_view_out_of_range_panics() {
        let buf = counting(2, 2);
        let _ = buf.view().sub_view(0, 3, 0, 1);
    }

    #[test]
    fn test_quadrants_odd() {
        let buf = counting(3, 3);
        let q = buf.view().quadrants();
        assert_eq!(q.q11.to_vec(), vec![0]);
        assert_eq!(q.q12.to_vec(), vec![1, 2]);
        assert_eq!(q.q21.to_vec(), vec![3, 6]);
        assert_eq!(q.q22.to_vec(), vec![4, 5, 7, 8]);
    }

    #[test]
    fn test_clear_only_touches_window() {
        let buf = MatrixBuffer::from_rows(&[[1, 2, 3], [4, 5, 6]]);
        buf.view().sub_view(0, 2, 1, 2).clear();
        assert_eq!(buf.to_vec(), vec![1, 0, 3, 4, 0, 6]);
    }

    #[test]
    fn test_elementwise_ops() {
        let a = MatrixBuffer::from_rows(&[[1, 2], [3, 4]]);
        let b = MatrixBuffer::from_rows(&[[10, 20], [30, 40]]);
        let (va, vb) = (a.view(), b.view());
        va.add_into(&vb);
        assert_eq!(a.to_vec(), vec![11, 22, 33, 44]);
        va.sub_into(&vb);
        va.sub_into(&vb);
        assert_eq!(a.to_vec(), vec![-9, -18, -27, -36]);
        va.assign_from(&vb);
        assert!(va.value_equals(&vb));
    }

    #[test]
    fn test_add_sub_free_functions() {
        let a = MatrixBuffer::from_rows(&[[5, 7]]);
        let b = MatrixBuffer::from_rows(&[[2, 3]]);
        let out = MatrixBuffer::zeros(1, 2);
        add(&a.view(), &b.view(), &out.view());
        assert_eq!(out.to_vec(), vec![7, 10]);
        sub(&a.view(), &b.view(), &out.view());
        assert_eq!(out.to_vec(), vec![3, 4]);
    }

    #[test]
    fn test_add_wraps() {
        let a = MatrixBuffer::from_rows(&[[Element::MAX]]);
        let b = MatrixBuffer::from_rows(&[[1]]);
        a.view().add_into(&b.view());
        assert_eq!(a.get(0, 0), Element::MIN);
    }

    #[test]
    #[should_panic(expected = "shape mismatch")]
    fn test_add_into_mismatch_panics() {
        let a = MatrixBuffer::zeros(2, 2);
        let b = MatrixBuffer::zeros(2, 3);
        a.view().add_into(&b.view());
    }

    #[test]
    fn test_value_equals_vs_identity() {
        let a = MatrixBuffer::from_rows(&[[1, 2], [3, 4]]);
        let b = a.clone();
        assert!(a.view().value_equals(&b.view()));
        assert!(!a.view().is_same_view(&b.view()));
        assert!(a.view().is_same_view(&a.view()));
        assert!(!a.view().is_same_view(&a.view().sub_view(0, 1, 0, 2)));
        assert!(!a.view().value_equals(&a.view().sub_view(0, 1, 0, 2)));
    }

    #[test]
    fn test_triple_key_compares_all_components() {
        let a = MatrixBuffer::zeros(2, 2);
        let (v, q) = (a.view(), a.view().quadrants());
        assert_eq!(TripleKey::of(&v, &v, &v), TripleKey::of(&v, &v, &v));
        assert_ne!(TripleKey::of(&v, &v, &v), TripleKey::of(&v, &v, &q.q11));
        assert_ne!(TripleKey::of(&v, &v, &v), TripleKey::of(&v, &q.q11, &v));
    }

    #[test]
    fn test_display() {
        let a = MatrixBuffer::from_rows(&[[1, 2], [3, 4]]);
        assert_eq!(a.view().to_string(), "[1, 2]\n[3, 4]\n");
    }
}
