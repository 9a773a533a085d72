use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
    #[error("buffer of length {len} cannot be split into rows of stride {stride}")]
    InvalidStride { len: usize, stride: usize },
    #[error(
        "view bounds rows {row_start}..{row_end}, cols {col_start}..{col_end} \
         do not fit a {rows}x{cols} buffer"
    )]
    InvalidBounds {
        rows: usize,
        cols: usize,
        row_start: usize,
        row_end: usize,
        col_start: usize,
        col_end: usize,
    },
}

pub type Result<T> = std::result::Result<T, MatrixError>;
