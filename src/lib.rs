//! Pure-Rust singular value decomposition for `ndarray`.
//!
//! A matrix is first reduced to bidiagonal form with Householder reflectors, then the implicit
//! shift QR algorithm drives the off-diagonal of the bidiagonal matrix to zero. Givens rotations
//! generated along the way are accumulated into the orthogonal factors when they are requested.
//!
//! ```
//! use linalg_svd::svd::{SvdConfig, SvdImplicitQr};
//! use ndarray::array;
//!
//! let a = array![[5.0f64, 2., 3.], [1.5, -2., 8.], [-3., 4.7, -0.5]];
//! let mut svd = SvdImplicitQr::<f64>::new(SvdConfig::default());
//! svd.decompose(&a).unwrap();
//!
//! let u = svd.u(false).unwrap();
//! let w = svd.w().unwrap();
//! let vt = svd.v(true).unwrap();
//! approx::assert_abs_diff_eq!(u.dot(&w).dot(&vt), a, epsilon = 1e-9);
//! ```

pub mod bidiagonal;
pub mod givens;
pub mod householder;
pub mod implicit_qr;
mod index;
pub mod reflection;
pub mod rotator;
pub mod svd;
pub mod workspace;

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LinalgError {
    /// Unexpected number of rows
    #[error("Expected {expected} rows, got {actual}")]
    WrongRows { expected: usize, actual: usize },
    /// Unexpected number of columns
    #[error("Expected {expected} cols, got {actual}")]
    WrongColumns { expected: usize, actual: usize },
    /// Empty matrix
    #[error("Empty matrix")]
    EmptyMatrix,
    /// The QR iteration hit its step cap before the bidiagonal matrix became diagonal
    #[error("Failed to converge after {iterations} implicit QR steps")]
    NotConverged { iterations: usize },
    /// A factor that was configured as not needed was requested
    #[error("{factor} was not computed, as configured")]
    NotComputed { factor: &'static str },
    /// Results were requested before a successful decomposition
    #[error("No successful decomposition to read results from")]
    NotDecomposed,
}

pub type Result<T> = std::result::Result<T, LinalgError>;

/// Ordering of singular values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Largest,
    Smallest,
}
