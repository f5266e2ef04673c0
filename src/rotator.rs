//! Accumulation of Givens rotations into orthogonal factors
//!
//! The implicit QR engine hands every rotation it performs to a [`RotationSink`], which applies
//! it to the rows of a (transposed) orthogonal factor. Two strategies are provided:
//!
//! * [`FullRotation`] updates the whole row pair and works with any starting matrix.
//! * [`DirtyRangeRotation`] resets the factor to the identity and remembers, per row, the last
//!   column that can be non-zero. Early rotations then only touch a short prefix of each row,
//!   which removes the `O(N)` per-rotation cost that dominates on large matrices. The caller
//!   multiplies the accumulated rotations into the actual factor afterwards.

use ndarray::{Array2, NdFloat};

use crate::{
    givens::GivensRotation,
    index::*,
    workspace::{set_identity, Workspace},
};

/// Strategy for applying rotations to an accumulator matrix
pub trait RotationSink<A>: Default {
    /// Whether [`init`](RotationSink::init) overwrites the accumulator with the identity
    const RESETS_TO_IDENTITY: bool;

    /// Prepares `q` to receive rotations
    fn init(&mut self, q: &mut Array2<A>);

    /// Applies `rot` to rows `row_a` and `row_b` of `q`
    fn update(&mut self, q: &mut Array2<A>, row_a: usize, row_b: usize, rot: &GivensRotation<A>);
}

/// Applies each rotation to the entire row pair
#[derive(Debug, Clone, Copy, Default)]
pub struct FullRotation;

impl<A: NdFloat> RotationSink<A> for FullRotation {
    const RESETS_TO_IDENTITY: bool = false;

    fn init(&mut self, _q: &mut Array2<A>) {}

    fn update(&mut self, q: &mut Array2<A>, row_a: usize, row_b: usize, rot: &GivensRotation<A>) {
        let len = q.ncols();
        rot.rotate_rows(q, row_a, row_b, len);
    }
}

/// Applies each rotation only over the columns that can be non-zero
///
/// Starting from the identity, row `i` is non-zero only up to column `i`. Rotating two rows
/// together couples them, so both inherit the larger of their two bounds. The bounds never
/// decrease during one decomposition.
#[derive(Debug, Clone, Default)]
pub struct DirtyRangeRotation {
    dirty: Workspace<usize>,
}

impl DirtyRangeRotation {
    /// Last column that can be non-zero in each row
    pub fn dirty(&self) -> &[usize] {
        &self.dirty
    }
}

impl<A: NdFloat> RotationSink<A> for DirtyRangeRotation {
    const RESETS_TO_IDENTITY: bool = true;

    fn init(&mut self, q: &mut Array2<A>) {
        set_identity(q);
        self.dirty.resize(q.nrows());
        for (i, d) in self.dirty.iter_mut().enumerate() {
            *d = i;
        }
    }

    fn update(&mut self, q: &mut Array2<A>, row_a: usize, row_b: usize, rot: &GivensRotation<A>) {
        let last = unsafe {
            let last = (*self.dirty.at(row_a)).max(*self.dirty.at(row_b));
            *self.dirty.atm(row_a) = last;
            *self.dirty.atm(row_b) = last;
            last
        };
        let len = (last + 1).min(q.ncols());
        rot.rotate_rows(q, row_a, row_b, len);
    }
}
