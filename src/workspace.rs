//! Scratch storage reused across decompositions
//!
//! Decompositions are usually run many times on matrices of similar size. The buffers here only
//! ever grow, so after the largest problem has been seen no further allocation happens.

use std::ops::{Deref, DerefMut};

use ndarray::{Array2, ArrayView1};
use num_traits::{One, Zero};

/// Growable 1D scratch buffer.
///
/// The buffer has a backing capacity, which never shrinks, and a logical length, which is what
/// the buffer derefs to.
#[derive(Debug, Clone, Default)]
pub struct Workspace<A> {
    data: Vec<A>,
    len: usize,
}

impl<A: Clone + Zero> Workspace<A> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            len: 0,
        }
    }

    /// Grow the backing storage to hold at least `capacity` elements. Never shrinks, and never
    /// changes the logical length.
    pub fn ensure_capacity(&mut self, capacity: usize) {
        if self.data.len() < capacity {
            self.data.resize(capacity, A::zero());
        }
    }

    /// Set the logical length, growing the backing storage if needed. Elements that were
    /// previously in use keep their values.
    pub fn resize(&mut self, len: usize) {
        self.ensure_capacity(len);
        self.len = len;
    }

    /// Set the logical length and fill the buffer with zeros
    pub fn reset(&mut self, len: usize) {
        self.resize(len);
        self.data[..len].fill(A::zero());
    }

    /// Number of elements the buffer can hold without reallocating
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn view(&self) -> ArrayView1<'_, A> {
        ArrayView1::from(&self.data[..self.len])
    }
}

impl<A> Deref for Workspace<A> {
    type Target = [A];

    fn deref(&self) -> &[A] {
        &self.data[..self.len]
    }
}

impl<A> DerefMut for Workspace<A> {
    fn deref_mut(&mut self) -> &mut [A] {
        &mut self.data[..self.len]
    }
}

/// Returns a zeroed `rows x cols` matrix, reusing the allocation of `storage` if one is given.
pub fn reshape_or_declare<A: Clone + Zero>(
    storage: Option<Array2<A>>,
    rows: usize,
    cols: usize,
) -> Array2<A> {
    match storage {
        Some(mut mat) if mat.dim() == (rows, cols) => {
            mat.fill(A::zero());
            mat
        }
        Some(mat) => {
            let (mut data, _) = mat.into_raw_vec_and_offset();
            data.clear();
            data.resize(rows * cols, A::zero());
            Array2::from_shape_vec((rows, cols), data)
                .unwrap_or_else(|_| Array2::zeros((rows, cols)))
        }
        None => Array2::zeros((rows, cols)),
    }
}

/// Sets `mat` to the (possibly rectangular) identity matrix
pub fn set_identity<A: Clone + Zero + One>(mat: &mut Array2<A>) {
    mat.fill(A::zero());
    mat.diag_mut().fill(A::one());
}
