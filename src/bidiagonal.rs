//! Bidiagonal decomposition for matrices

use ndarray::{s, Array1, Array2, ArrayBase, ArrayViewMut1, Data, Ix2, NdFloat};

use crate::{
    householder::householder_vector,
    reflection::Reflection,
    workspace::{reshape_or_declare, set_identity, Workspace},
    LinalgError, Result,
};

/// Upper bidiagonal decomposition of a non-empty matrix `A = U * B * V.t`, computed with
/// Householder reflectors applied alternately on the left and on the right.
///
/// The decomposition object owns all of its buffers and can be reused for any number of
/// matrices. Buffers grow to the largest matrix seen and are never shrunk.
///
/// `U` and `V` are not formed during the decomposition. They are assembled on request from the
/// stored reflectors, either full-size or compact, optionally transposed.
#[derive(Debug, Clone)]
pub struct BidiagonalDecomposition<A> {
    // Scratch matrix. Once decomposed, B occupies the diagonal and first superdiagonal, the left
    // reflector tails sit below the diagonal and the right reflector tails sit right of the
    // superdiagonal.
    ubv: Array2<A>,
    // Scale factor of each left and right reflector, zero for skipped reflections
    gammas_u: Workspace<A>,
    gammas_v: Workspace<A>,
    // Axis of the reflector currently being built or applied
    axis: Workspace<A>,
    // Rank-1 update scratch
    work: Workspace<A>,
}

impl<A: NdFloat> Default for BidiagonalDecomposition<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: NdFloat> BidiagonalDecomposition<A> {
    pub fn new() -> Self {
        Self {
            ubv: Array2::zeros((0, 0)),
            gammas_u: Workspace::new(),
            gammas_v: Workspace::new(),
            axis: Workspace::new(),
            work: Workspace::new(),
        }
    }

    /// Decomposes `matrix`, which is copied and not modified.
    ///
    /// Tall and square matrices are reduced column first. Wide matrices are accepted too, in which
    /// case `B` has one extra non-zero to the right of its last diagonal element; callers that
    /// want a square `B` should pass the transpose instead.
    pub fn decompose<S: Data<Elem = A>>(&mut self, matrix: &ArrayBase<S, Ix2>) -> Result<()> {
        let (m, n) = matrix.dim();
        let min = m.min(n);
        if min == 0 {
            return Err(LinalgError::EmptyMatrix);
        }

        let ubv = std::mem::replace(&mut self.ubv, Array2::zeros((0, 0)));
        self.ubv = reshape_or_declare(Some(ubv), m, n);
        self.ubv.assign(matrix);

        self.gammas_u.reset(min);
        self.gammas_v.reset(min);
        self.axis.resize(m.max(n));
        self.work.resize(m.max(n));

        for k in 0..min {
            self.clear_column(k);
            self.clear_row(k);
        }

        Ok(())
    }

    /// Zeroes column `k` below the diagonal
    fn clear_column(&mut self, k: usize) {
        let Self {
            ubv,
            gammas_u,
            axis,
            work,
            ..
        } = self;
        let (m, n) = ubv.dim();

        let mut u = ArrayViewMut1::from(&mut axis[k..m]);
        u.assign(&ubv.slice(s![k.., k]));

        if let Some((gamma, beta)) = householder_vector(&mut u) {
            ubv.slice_mut(s![k + 1.., k]).assign(&u.slice(s![1..]));
            gammas_u[k] = gamma;

            let refl = Reflection::new(u.view(), gamma);
            let mut work = ArrayViewMut1::from(&mut work[..n - k - 1]);
            refl.reflect_cols(&mut ubv.slice_mut(s![k.., k + 1..]), &mut work);
            ubv[(k, k)] = beta;
        }
    }

    /// Zeroes row `k` right of the superdiagonal
    fn clear_row(&mut self, k: usize) {
        let Self {
            ubv,
            gammas_v,
            axis,
            work,
            ..
        } = self;
        let (m, n) = ubv.dim();
        if k + 1 >= n {
            return;
        }

        let mut u = ArrayViewMut1::from(&mut axis[k + 1..n]);
        u.assign(&ubv.slice(s![k, k + 1..]));

        if let Some((gamma, beta)) = householder_vector(&mut u) {
            ubv.slice_mut(s![k, k + 2..]).assign(&u.slice(s![1..]));
            gammas_v[k] = gamma;

            let refl = Reflection::new(u.view(), gamma);
            let mut work = ArrayViewMut1::from(&mut work[..m - k - 1]);
            refl.reflect_rows(&mut ubv.slice_mut(s![k + 1.., k + 1..]), &mut work);
            ubv[(k, k + 1)] = beta;
        }
    }

    /// Rows of the decomposed matrix
    pub fn nrows(&self) -> usize {
        self.ubv.nrows()
    }

    /// Columns of the decomposed matrix
    pub fn ncols(&self) -> usize {
        self.ubv.ncols()
    }

    fn min(&self) -> usize {
        self.nrows().min(self.ncols())
    }

    // Columns of compact B and V. Wide matrices carry one extra superdiagonal element.
    fn compact_width(&self) -> usize {
        let (m, n) = self.ubv.dim();
        if n > m {
            m + 1
        } else {
            n
        }
    }

    pub fn gammas_u(&self) -> &[A] {
        &self.gammas_u
    }

    pub fn gammas_v(&self) -> &[A] {
        &self.gammas_v
    }

    /// Copies the diagonal of `B` into `diag` and its superdiagonal into `off`. Both slices must
    /// be at least `min(rows, cols)` and `min(rows, cols) - 1` long.
    pub fn get_diagonal(&self, diag: &mut [A], off: &mut [A]) {
        let min = self.min();
        for (i, d) in diag.iter_mut().take(min).enumerate() {
            *d = self.ubv[(i, i)];
        }
        for (i, o) in off.iter_mut().take(min.saturating_sub(1)).enumerate() {
            *o = self.ubv[(i, i + 1)];
        }
    }

    /// Returns the diagonal and the superdiagonal of `B` as 1D arrays
    pub fn diagonals(&self) -> (Array1<A>, Array1<A>) {
        let min = self.min();
        let mut diag = Array1::zeros(min);
        let mut off = Array1::zeros(min.saturating_sub(1));
        if let (Some(d), Some(o)) = (diag.as_slice_mut(), off.as_slice_mut()) {
            self.get_diagonal(d, o);
        }
        (diag, off)
    }

    /// Returns `B`, either `rows x cols` or compact. Compact `B` is square unless the matrix is
    /// wide, in which case it has one extra column.
    pub fn b(&self, compact: bool) -> Array2<A> {
        let min = self.min();
        let mut b = if compact {
            Array2::zeros((min, self.compact_width()))
        } else {
            Array2::zeros(self.ubv.dim())
        };

        for i in 0..min {
            b[(i, i)] = self.ubv[(i, i)];
            if i + 1 < b.ncols() {
                b[(i, i + 1)] = self.ubv[(i, i + 1)];
            }
        }
        b
    }

    /// Assembles `U` into `storage` (reshaped as needed) or a new matrix.
    ///
    /// Full `U` is `rows x rows`, compact `U` is `rows x min(rows, cols)`. With `transpose` the
    /// transpose of that is produced instead.
    pub fn u_into(
        &mut self,
        storage: Option<Array2<A>>,
        transpose: bool,
        compact: bool,
    ) -> Array2<A> {
        let m = self.nrows();
        let min = self.min();
        let (rows, cols) = match (compact, transpose) {
            (false, _) => (m, m),
            (true, false) => (m, min),
            (true, true) => (min, m),
        };
        let mut u = reshape_or_declare(storage, rows, cols);
        set_identity(&mut u);

        let Self {
            ubv,
            gammas_u,
            axis,
            work,
            ..
        } = self;

        for j in (0..min).rev() {
            let gamma = gammas_u[j];
            if gamma.is_zero() {
                continue;
            }
            let mut axis = ArrayViewMut1::from(&mut axis[j..m]);
            axis[0] = A::one();
            axis.slice_mut(s![1..]).assign(&ubv.slice(s![j + 1.., j]));
            let refl = Reflection::new(axis.view(), gamma);

            let mut block = u.slice_mut(s![j.., j..]);
            if transpose {
                let mut work = ArrayViewMut1::from(&mut work[..block.nrows()]);
                refl.reflect_rows(&mut block, &mut work);
            } else {
                let mut work = ArrayViewMut1::from(&mut work[..block.ncols()]);
                refl.reflect_cols(&mut block, &mut work);
            }
        }

        u
    }

    pub fn u(&mut self, transpose: bool, compact: bool) -> Array2<A> {
        self.u_into(None, transpose, compact)
    }

    /// Assembles `V` into `storage` (reshaped as needed) or a new matrix.
    ///
    /// Full `V` is `cols x cols`. Compact `V` has as many columns as compact `B`. With `transpose`
    /// the transpose of that is produced instead.
    pub fn v_into(
        &mut self,
        storage: Option<Array2<A>>,
        transpose: bool,
        compact: bool,
    ) -> Array2<A> {
        let n = self.ncols();
        let min = self.min();
        let w = self.compact_width();
        let (rows, cols) = match (compact, transpose) {
            (false, _) => (n, n),
            (true, false) => (n, w),
            (true, true) => (w, n),
        };
        let mut v = reshape_or_declare(storage, rows, cols);
        set_identity(&mut v);

        let Self {
            ubv,
            gammas_v,
            axis,
            work,
            ..
        } = self;

        for j in (0..min).rev() {
            let gamma = gammas_v[j];
            if gamma.is_zero() {
                continue;
            }
            let mut axis = ArrayViewMut1::from(&mut axis[j + 1..n]);
            axis[0] = A::one();
            axis.slice_mut(s![1..]).assign(&ubv.slice(s![j, j + 2..]));
            let refl = Reflection::new(axis.view(), gamma);

            let mut block = v.slice_mut(s![j + 1.., j + 1..]);
            if transpose {
                let mut work = ArrayViewMut1::from(&mut work[..block.nrows()]);
                refl.reflect_rows(&mut block, &mut work);
            } else {
                let mut work = ArrayViewMut1::from(&mut work[..block.ncols()]);
                refl.reflect_cols(&mut block, &mut work);
            }
        }

        v
    }

    pub fn v(&mut self, transpose: bool, compact: bool) -> Array2<A> {
        self.v_into(None, transpose, compact)
    }
}

/// Bidiagonal decomposition of a non-empty matrix
pub trait Bidiagonal {
    type Decomp;

    /// Calculate the bidiagonal decomposition of a matrix, consisting of bidiagonal matrix `B`
    /// and orthogonal matrices `U` and `V`, such that `U * B * V.t` yields the original matrix.
    fn bidiagonal(&self) -> Result<Self::Decomp>;
}

impl<A: NdFloat, S: Data<Elem = A>> Bidiagonal for ArrayBase<S, Ix2> {
    type Decomp = BidiagonalDecomposition<A>;

    fn bidiagonal(&self) -> Result<Self::Decomp> {
        let mut decomp = BidiagonalDecomposition::new();
        decomp.decompose(self)?;
        Ok(decomp)
    }
}
