use std::fmt;

/// How a multiplication treats the destination matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatMulMode {
    /// `C = A * B`: the destination is zeroed before it is written.
    Overwrite,
    /// `C += A * B`: the product is accumulated into the destination.
    Add,
}

impl fmt::Display for MatMulMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatMulMode::Overwrite => write!(f, "overwrite"),
            MatMulMode::Add => write!(f, "add"),
        }
    }
}
