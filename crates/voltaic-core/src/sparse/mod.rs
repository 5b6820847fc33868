//! Sparse linear algebra for MNA systems.
//!
//! The same doubly-linked structure serves the real solver (DC, transient)
//! and the complex solver (AC) through the [`Scalar`] abstraction.

mod factor;
mod matrix;
mod perm;
mod scalar;
mod vector;

pub use matrix::{ElemId, SparseMatrix};
pub use perm::Permutation;
pub use scalar::Scalar;
pub use vector::{SparseVector, VecElemId};
