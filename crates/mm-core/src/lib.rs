//! `mm-core` - Integer matrix storage and zero-copy submatrix views.
//!
//! This crate provides:
//! - `MatrixBuffer`, an owned row-major integer matrix
//! - `MatrixView`, a borrowing rectangular window that can alias other views
//! - `MatMulMode`, the overwrite/accumulate switch shared by every algorithm
//! - View identity keys for tracking in-flight sub-problems

pub mod buffer;
pub mod error;
pub mod mode;
pub mod view;

pub use buffer::{Element, MatrixBuffer};
pub use error::{MatrixError, Result};
pub use mode::MatMulMode;
pub use view::{add, sub, MatrixView, Quadrants, TripleKey, ViewKey};
