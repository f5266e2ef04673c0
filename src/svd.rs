//! Singular value decomposition with the implicit shift QR algorithm
//!
//! The input is reduced to bidiagonal form, then [`ImplicitQrAlgorithm`] diagonalizes the
//! bidiagonal matrix. Wide matrices are processed through their transpose so the engine always
//! sees a tall or square problem.

use std::cmp::Ordering;

use log::debug;
use ndarray::{
    linalg::general_mat_mul, s, Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix2, NdFloat,
};
use rand::Rng;
use rand_xoshiro::Xoshiro256Plus;

use crate::{
    bidiagonal::BidiagonalDecomposition,
    implicit_qr::ImplicitQrAlgorithm,
    rotator::{DirtyRangeRotation, RotationSink},
    workspace::{reshape_or_declare, Workspace},
    LinalgError, Order, Result,
};

/// What [`SvdImplicitQr`] computes and returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SvdConfig {
    /// Return `U`, `W` and `V` with only `min(rows, cols)` singular vectors
    pub compact: bool,
    pub compute_u: bool,
    pub compute_v: bool,
    /// Find singular values and vectors in a single QR pass. Otherwise the values are found first
    /// and then used as shifts in a second pass that builds the vectors.
    pub all_at_once: bool,
}

impl Default for SvdConfig {
    fn default() -> Self {
        Self {
            compact: true,
            compute_u: true,
            compute_v: true,
            all_at_once: true,
        }
    }
}

/// Reusable SVD `A = U * W * V.t` of real matrices
///
/// All buffers are owned by the decomposition and kept between calls to
/// [`decompose`](Self::decompose). They only grow, so decomposing a small matrix after a large
/// one allocates nothing.
///
/// Singular values are non-negative but not ordered. Use [`SvdSort`] on the output of
/// [`SVD::svd`] for ordered results.
#[derive(Debug, Clone)]
pub struct SvdImplicitQr<A, S = DirtyRangeRotation, R = Xoshiro256Plus> {
    config: SvdConfig,
    bidiag: BidiagonalDecomposition<A>,
    qr: ImplicitQrAlgorithm<A, S, R>,

    // Bidiagonal matrix, kept for the second pass
    diag: Workspace<A>,
    off: Workspace<A>,
    values: Workspace<A>,

    ut: Option<Array2<A>>,
    vt: Option<Array2<A>>,
    // Accumulated rotations, for sinks that start from the identity
    rot_u: Option<Array2<A>>,
    rot_v: Option<Array2<A>>,
    temp: Option<Array2<A>>,

    nrows: usize,
    ncols: usize,
    transposed: bool,
    decomposed: bool,
}

impl<A: NdFloat, S: RotationSink<A>> SvdImplicitQr<A, S> {
    pub fn new(config: SvdConfig) -> Self {
        Self::with_qr(config, ImplicitQrAlgorithm::new())
    }
}

impl<A: NdFloat, S: RotationSink<A>, R: Rng> SvdImplicitQr<A, S, R> {
    /// Uses `rng` for the exceptional shifts of the QR iteration
    pub fn with_rng(config: SvdConfig, rng: R) -> Self {
        Self::with_qr(config, ImplicitQrAlgorithm::with_rng(rng))
    }

    /// Uses a preconfigured QR engine
    pub fn with_qr(config: SvdConfig, qr: ImplicitQrAlgorithm<A, S, R>) -> Self {
        Self {
            config,
            bidiag: BidiagonalDecomposition::new(),
            qr,
            diag: Workspace::new(),
            off: Workspace::new(),
            values: Workspace::new(),
            ut: None,
            vt: None,
            rot_u: None,
            rot_v: None,
            temp: None,
            nrows: 0,
            ncols: 0,
            transposed: false,
            decomposed: false,
        }
    }

    /// Cap on the implicit QR steps of one decomposition, see
    /// [`ImplicitQrAlgorithm::with_max_iterations`]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.qr = self.qr.with_max_iterations(max_iterations);
        self
    }

    pub fn with_exceptional_threshold(mut self, threshold: usize) -> Self {
        self.qr = self.qr.with_exceptional_threshold(threshold);
        self
    }

    pub fn config(&self) -> &SvdConfig {
        &self.config
    }

    /// Decomposes `a`, which is not modified. On failure no results are available until the next
    /// successful call.
    pub fn decompose<Sd: Data<Elem = A>>(&mut self, a: &ArrayBase<Sd, Ix2>) -> Result<()> {
        self.decomposed = false;
        self.values.resize(0);

        let (nrows, ncols) = a.dim();
        self.nrows = nrows;
        self.ncols = ncols;
        if nrows == 0 || ncols == 0 {
            return Err(LinalgError::EmptyMatrix);
        }
        self.transposed = ncols > nrows;

        if self.transposed {
            self.bidiag.decompose(&a.t())?;
        } else {
            self.bidiag.decompose(a)?;
        }

        self.compute_uwv()?;
        self.make_singular_positive();
        self.undo_transpose();
        self.decomposed = true;

        debug!(
            "svd of {}x{} matrix{} in {} QR steps, {}",
            nrows,
            ncols,
            if self.transposed { " (transposed)" } else { "" },
            self.qr.total_steps(),
            if self.config.all_at_once {
                "single pass"
            } else {
                "two passes"
            }
        );
        Ok(())
    }

    // Which factors are built for the tall problem the engine sees
    fn internal_flags(&self) -> (bool, bool) {
        if self.transposed {
            (self.config.compute_v, self.config.compute_u)
        } else {
            (self.config.compute_u, self.config.compute_v)
        }
    }

    fn compute_uwv(&mut self) -> Result<()> {
        let n = self.nrows.min(self.ncols);
        self.diag.resize(n);
        self.off.resize(n - 1);
        self.bidiag.get_diagonal(&mut self.diag, &mut self.off);
        self.qr.set_matrix(&self.diag, &self.off)?;

        let (compute_u, compute_v) = self.internal_flags();

        if self.config.all_at_once {
            self.qr.set_fast_values(false);
            self.attach_accumulators(compute_u, compute_v)?;
            self.qr.process()?;
        } else {
            self.qr.set_fast_values(true);
            self.qr.set_ut(None)?;
            self.qr.set_vt(None)?;
            self.qr.process()?;

            if compute_u || compute_v {
                self.values.resize(n);
                self.values.copy_from_slice(self.qr.singular_values());

                self.qr.set_matrix(&self.diag, &self.off)?;
                self.qr.set_fast_values(false);
                self.attach_accumulators(compute_u, compute_v)?;
                self.qr.process_with_shifts(&self.values)?;
            }
        }

        self.collect_accumulators();
        Ok(())
    }

    /// Builds `U.t` and `V.t` of the bidiagonal decomposition and hands them, or identity
    /// accumulators for the sink to fill, to the QR engine.
    fn attach_accumulators(&mut self, compute_u: bool, compute_v: bool) -> Result<()> {
        let compact = self.config.compact;
        let n = self.nrows.min(self.ncols);

        self.ut = if compute_u {
            Some(self.bidiag.u_into(self.ut.take(), true, compact))
        } else {
            None
        };
        self.vt = if compute_v {
            Some(self.bidiag.v_into(self.vt.take(), true, compact))
        } else {
            None
        };

        if S::RESETS_TO_IDENTITY {
            let rot_u = compute_u.then(|| reshape_or_declare(self.rot_u.take(), n, n));
            let rot_v = compute_v.then(|| reshape_or_declare(self.rot_v.take(), n, n));
            self.qr.set_ut(rot_u)?;
            self.qr.set_vt(rot_v)?;
        } else {
            self.qr.set_ut(self.ut.take())?;
            self.qr.set_vt(self.vt.take())?;
        }
        Ok(())
    }

    fn collect_accumulators(&mut self) {
        if S::RESETS_TO_IDENTITY {
            if let Some(rot) = self.qr.take_ut() {
                if let Some(ut) = &mut self.ut {
                    self.temp = Some(apply_rotations(&rot, ut, self.temp.take()));
                }
                self.rot_u = Some(rot);
            }
            if let Some(rot) = self.qr.take_vt() {
                if let Some(vt) = &mut self.vt {
                    self.temp = Some(apply_rotations(&rot, vt, self.temp.take()));
                }
                self.rot_v = Some(rot);
            }
        } else {
            self.ut = self.qr.take_ut();
            self.vt = self.qr.take_vt();
        }
    }

    fn make_singular_positive(&mut self) {
        let (compute_u, _) = self.internal_flags();
        let values = self.qr.singular_values();
        self.values.resize(values.len());

        for (i, (out, &val)) in self.values.iter_mut().zip(values).enumerate() {
            *out = val.abs();
            if val < A::zero() {
                if let (true, Some(ut)) = (compute_u, &mut self.ut) {
                    ut.row_mut(i).mapv_inplace(|v| -v);
                }
            }
        }
    }

    // Decomposing A.t gave V.t and U.t in place of U.t and V.t
    fn undo_transpose(&mut self) {
        if self.transposed {
            std::mem::swap(&mut self.ut, &mut self.vt);
        }
    }

    fn check_decomposed(&self) -> Result<()> {
        if self.decomposed {
            Ok(())
        } else {
            Err(LinalgError::NotDecomposed)
        }
    }

    /// Writes `U`, or `U.t` if `transpose` is set, into `storage` (reshaped as needed) or a new
    /// matrix. `U` is `rows x rows`, or `rows x min(rows, cols)` if compact.
    pub fn u_into(&self, storage: Option<Array2<A>>, transpose: bool) -> Result<Array2<A>> {
        self.check_decomposed()?;
        if !self.config.compute_u {
            return Err(LinalgError::NotComputed { factor: "U" });
        }
        let ut = self.ut.as_ref().ok_or(LinalgError::NotDecomposed)?;
        Ok(copy_factor(ut, storage, transpose))
    }

    pub fn u(&self, transpose: bool) -> Result<Array2<A>> {
        self.u_into(None, transpose)
    }

    /// Writes `V`, or `V.t` if `transpose` is set, into `storage` (reshaped as needed) or a new
    /// matrix. `V` is `cols x cols`, or `cols x min(rows, cols)` if compact.
    pub fn v_into(&self, storage: Option<Array2<A>>, transpose: bool) -> Result<Array2<A>> {
        self.check_decomposed()?;
        if !self.config.compute_v {
            return Err(LinalgError::NotComputed { factor: "V" });
        }
        let vt = self.vt.as_ref().ok_or(LinalgError::NotDecomposed)?;
        Ok(copy_factor(vt, storage, transpose))
    }

    pub fn v(&self, transpose: bool) -> Result<Array2<A>> {
        self.v_into(None, transpose)
    }

    /// Writes the diagonal matrix of singular values `W` into `storage` (reshaped as needed) or a
    /// new matrix. `W` is `rows x cols`, or square if compact.
    pub fn w_into(&self, storage: Option<Array2<A>>) -> Result<Array2<A>> {
        self.check_decomposed()?;
        let n = self.values.len();
        let (rows, cols) = if self.config.compact {
            (n, n)
        } else {
            (self.nrows, self.ncols)
        };

        let mut w = reshape_or_declare(storage, rows, cols);
        w.diag_mut()
            .iter_mut()
            .zip(self.values.iter())
            .for_each(|(d, &v)| *d = v);
        Ok(w)
    }

    pub fn w(&self) -> Result<Array2<A>> {
        self.w_into(None)
    }

    /// Non-negative, unordered singular values of the last successful decomposition. Empty if
    /// there is none.
    pub fn singular_values(&self) -> ArrayView1<'_, A> {
        self.values.view()
    }

    pub fn number_of_singular_values(&self) -> usize {
        self.values.len()
    }

    pub fn is_compact(&self) -> bool {
        self.config.compact
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Default threshold below which a singular value counts as zero,
    /// `max(rows, cols) * largest singular value * epsilon`
    pub fn singular_threshold(&self) -> Result<A> {
        self.check_decomposed()?;
        let largest = self.values.iter().fold(A::zero(), |m, &v| m.max(v));
        let dim = A::from(self.nrows.max(self.ncols)).unwrap();
        Ok(dim * largest * A::epsilon())
    }

    /// Number of singular values above `threshold`
    pub fn rank(&self, threshold: A) -> Result<usize> {
        self.check_decomposed()?;
        Ok(self.values.iter().filter(|&&v| v > threshold).count())
    }

    /// Dimension of the null space, counting singular values at or below `threshold` as zero
    pub fn nullity(&self, threshold: A) -> Result<usize> {
        self.check_decomposed()?;
        let zeros = self.values.iter().filter(|&&v| v <= threshold).count();
        Ok(zeros + self.ncols - self.values.len())
    }
}

/// `q[..n, ..] = rot * q[..n, ..]` for the `n x n` matrix `rot`. Returns the scratch matrix.
fn apply_rotations<A: NdFloat>(
    rot: &Array2<A>,
    q: &mut Array2<A>,
    temp: Option<Array2<A>>,
) -> Array2<A> {
    let n = rot.nrows();
    let mut temp = reshape_or_declare(temp, n, q.ncols());
    general_mat_mul(A::one(), rot, &q.slice(s![..n, ..]), A::zero(), &mut temp);
    q.slice_mut(s![..n, ..]).assign(&temp);
    temp
}

fn copy_factor<A: NdFloat>(
    transposed: &Array2<A>,
    storage: Option<Array2<A>>,
    transpose: bool,
) -> Array2<A> {
    let (rows, cols) = transposed.dim();
    if transpose {
        let mut out = reshape_or_declare(storage, rows, cols);
        out.assign(transposed);
        out
    } else {
        let mut out = reshape_or_declare(storage, cols, rows);
        out.assign(&transposed.t());
        out
    }
}

/// Compact singular value decomposition of a non-empty matrix
pub trait SVDInto {
    type U;
    type Vt;
    type Sigma;

    /// Calculates the compact SVD of a matrix, consisting of a square non-negative diagonal
    /// matrix `S` and non-square semi-orthogonal matrices `U` and `Vt`, such that `U * S * Vt`
    /// yields the original matrix. Only the diagonal elements of `S` are returned, unordered.
    #[allow(clippy::type_complexity)]
    fn svd_into(
        self,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<(Option<Self::U>, Self::Sigma, Option<Self::Vt>)>;
}

impl<A: NdFloat, S: Data<Elem = A>> SVDInto for ArrayBase<S, Ix2> {
    type U = Array2<A>;
    type Vt = Array2<A>;
    type Sigma = Array1<A>;

    fn svd_into(
        self,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<(Option<Self::U>, Self::Sigma, Option<Self::Vt>)> {
        self.svd(compute_u, compute_v)
    }
}

/// Compact singular value decomposition of a non-empty matrix
pub trait SVD {
    type U;
    type Vt;
    type Sigma;

    /// Calculates the compact SVD of a matrix, consisting of a square non-negative diagonal
    /// matrix `S` and non-square semi-orthogonal matrices `U` and `Vt`, such that `U * S * Vt`
    /// yields the original matrix. Only the diagonal elements of `S` are returned, unordered.
    #[allow(clippy::type_complexity)]
    fn svd(
        &self,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<(Option<Self::U>, Self::Sigma, Option<Self::Vt>)>;
}

impl<A: NdFloat, S: Data<Elem = A>> SVD for ArrayBase<S, Ix2> {
    type U = Array2<A>;
    type Vt = Array2<A>;
    type Sigma = Array1<A>;

    fn svd(
        &self,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<(Option<Self::U>, Self::Sigma, Option<Self::Vt>)> {
        let mut decomp: SvdImplicitQr<A> = SvdImplicitQr::new(SvdConfig {
            compact: true,
            compute_u,
            compute_v,
            all_at_once: true,
        });
        decomp.decompose(self)?;

        let u = if compute_u { Some(decomp.u(false)?) } else { None };
        let vt = if compute_v { Some(decomp.v(true)?) } else { None };
        Ok((u, decomp.singular_values().to_owned(), vt))
    }
}

/// Sorting of SVD decomposition by the singular values. Rearranges the columns of `U` and rows of
/// `Vt` accordingly.
pub trait SvdSort: Sized {
    fn sort_svd(self, order: Order) -> Self;

    /// Sort SVD decomposition by the singular values in ascending order
    fn sort_svd_asc(self) -> Self {
        self.sort_svd(Order::Smallest)
    }

    /// Sort SVD decomposition by the singular values in descending order
    fn sort_svd_desc(self) -> Self {
        self.sort_svd(Order::Largest)
    }
}

impl<A: NdFloat> SvdSort for (Option<Array2<A>>, Array1<A>, Option<Array2<A>>) {
    fn sort_svd(self, order: Order) -> Self {
        let (u, s, vt) = self;
        let mut idx: Vec<_> = (0..s.len()).collect();
        let cmp = |a: &usize, b: &usize| s[*a].partial_cmp(&s[*b]).unwrap_or(Ordering::Equal);
        match order {
            Order::Smallest => idx.sort_by(cmp),
            Order::Largest => idx.sort_by(|a, b| cmp(b, a)),
        }

        let s = s.select(Axis(0), &idx);
        let u = u.map(|u| u.select(Axis(1), &idx));
        let vt = vt.map(|vt| vt.select(Axis(0), &idx));
        (u, s, vt)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::{rand_distr::Uniform, RandomExt};
    use rand::SeedableRng;

    use super::*;
    use crate::rotator::FullRotation;

    const CONFIGS: [SvdConfig; 4] = [
        SvdConfig {
            compact: true,
            compute_u: true,
            compute_v: true,
            all_at_once: true,
        },
        SvdConfig {
            compact: false,
            compute_u: true,
            compute_v: true,
            all_at_once: true,
        },
        SvdConfig {
            compact: true,
            compute_u: true,
            compute_v: true,
            all_at_once: false,
        },
        SvdConfig {
            compact: false,
            compute_u: true,
            compute_v: true,
            all_at_once: false,
        },
    ];

    fn sorted(values: ArrayView1<f64>) -> Array1<f64> {
        let mut v = values.to_vec();
        v.sort_by(|a, b| b.partial_cmp(a).unwrap());
        Array1::from(v)
    }

    fn random(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        Array2::random_using((rows, cols), Uniform::new(-1.0, 1.0), &mut rng)
    }

    /// Checks shapes, orthogonality and reconstruction of a finished decomposition
    fn check<S: RotationSink<f64>>(a: &Array2<f64>, svd: &SvdImplicitQr<f64, S>, tol: f64) {
        let (m, n) = a.dim();
        let k = m.min(n);
        let u = svd.u(false).unwrap();
        let w = svd.w().unwrap();
        let v = svd.v(false).unwrap();

        if svd.is_compact() {
            assert_eq!(u.dim(), (m, k));
            assert_eq!(w.dim(), (k, k));
            assert_eq!(v.dim(), (n, k));
        } else {
            assert_eq!(u.dim(), (m, m));
            assert_eq!(w.dim(), (m, n));
            assert_eq!(v.dim(), (n, n));
        }
        assert_eq!(svd.number_of_singular_values(), k);
        assert!(svd.singular_values().iter().all(|&s| s >= 0.0));

        assert_abs_diff_eq!(u.t().dot(&u), Array2::eye(u.ncols()), epsilon = tol);
        assert_abs_diff_eq!(v.t().dot(&v), Array2::eye(v.ncols()), epsilon = tol);
        assert_abs_diff_eq!(u.dot(&w).dot(&v.t()), *a, epsilon = tol);

        assert_abs_diff_eq!(svd.u(true).unwrap(), u.t());
        assert_abs_diff_eq!(svd.v(true).unwrap(), v.t());
    }

    fn check_all_configs(a: &Array2<f64>, tol: f64) {
        let mut expected = None;
        for &config in &CONFIGS {
            let mut svd: SvdImplicitQr<f64> = SvdImplicitQr::new(config);
            svd.decompose(a).unwrap();
            check(a, &svd, tol);

            let mut full: SvdImplicitQr<f64, FullRotation> = SvdImplicitQr::new(config);
            full.decompose(a).unwrap();
            check(a, &full, tol);

            let values = sorted(svd.singular_values());
            assert_abs_diff_eq!(sorted(full.singular_values()), values, epsilon = tol);
            match &expected {
                None => expected = Some(values),
                Some(e) => assert_abs_diff_eq!(&values, e, epsilon = tol),
            }
        }
    }

    #[test]
    fn trivial() {
        let a = array![[5.0, 2., 3.], [1.5, -2., 8.], [-3., 4.7, -0.5]];
        let mut svd: SvdImplicitQr<f64> = SvdImplicitQr::new(SvdConfig::default());
        svd.decompose(&a).unwrap();
        assert_abs_diff_eq!(
            sorted(svd.singular_values()),
            array![9.59186, 5.18005, 4.55558],
            epsilon = 1e-5
        );
        check_all_configs(&a, 1e-10);
    }

    #[test]
    fn identity() {
        let a = Array2::<f64>::eye(6);
        let mut svd: SvdImplicitQr<f64> = SvdImplicitQr::new(SvdConfig::default());
        svd.decompose(&a).unwrap();
        assert_abs_diff_eq!(svd.singular_values(), Array1::<f64>::ones(6).view());
        check_all_configs(&a, 1e-12);
    }

    #[test]
    fn zero_matrices() {
        for i in 1..=16 {
            for j in 1..=16 {
                let a = Array2::<f64>::zeros((i, j));
                for &config in &CONFIGS {
                    let mut svd: SvdImplicitQr<f64> = SvdImplicitQr::new(config);
                    svd.decompose(&a).unwrap();
                    assert!(svd.singular_values().iter().all(|&s| s == 0.0));
                    check(&a, &svd, 1e-12);
                }
            }
        }
    }

    #[test]
    fn empty_matrix() {
        let mut svd: SvdImplicitQr<f64> = SvdImplicitQr::new(SvdConfig::default());
        for &(rows, cols) in &[(0, 0), (0, 4), (4, 0)] {
            assert!(matches!(
                svd.decompose(&Array2::<f64>::zeros((rows, cols))),
                Err(LinalgError::EmptyMatrix)
            ));
            assert!(matches!(svd.u(false), Err(LinalgError::NotDecomposed)));
            assert!(matches!(svd.w(), Err(LinalgError::NotDecomposed)));
            assert_eq!(svd.number_of_singular_values(), 0);
        }
    }

    #[test]
    fn tall_and_wide() {
        check_all_configs(&random(21, 5, 1), 1e-10);
        check_all_configs(&random(5, 20, 2), 1e-10);
        check_all_configs(&random(1, 7, 3), 1e-12);
        check_all_configs(&random(7, 1, 4), 1e-12);
        check_all_configs(&random(30, 30, 5), 1e-10);
    }

    #[test]
    fn rank_deficient() {
        // rank 2, built from two outer products
        let x = random(8, 2, 6);
        let y = random(2, 6, 7);
        let a = x.dot(&y);
        check_all_configs(&a, 1e-10);

        let mut svd: SvdImplicitQr<f64> = SvdImplicitQr::new(SvdConfig::default());
        svd.decompose(&a).unwrap();
        assert_eq!(svd.rank(1e-10).unwrap(), 2);
        assert_eq!(svd.nullity(1e-10).unwrap(), 4);
        let threshold = svd.singular_threshold().unwrap();
        assert!(threshold > 0.0 && threshold < 1e-10);
        assert_eq!(svd.rank(threshold).unwrap(), 2);

        svd.decompose(&a.t()).unwrap();
        assert_eq!(svd.rank(1e-10).unwrap(), 2);
        assert_eq!(svd.nullity(1e-10).unwrap(), 6);
    }

    #[test]
    fn very_small_values() {
        let a = random(5, 5, 8) * 1e-190;
        let mut svd: SvdImplicitQr<f64> = SvdImplicitQr::new(SvdConfig::default());
        svd.decompose(&a).unwrap();

        let u = svd.u(false).unwrap();
        let v = svd.v(false).unwrap();
        let w = svd.w().unwrap() * 1e190;
        assert!(svd.singular_values().iter().all(|&s| s > 0.0));
        assert_abs_diff_eq!(u.dot(&w).dot(&v.t()), a * 1e190, epsilon = 1e-10);
    }

    #[test]
    fn large_to_small() {
        let mut svd: SvdImplicitQr<f64> = SvdImplicitQr::new(SvdConfig {
            compact: false,
            ..SvdConfig::default()
        });
        let large = random(20, 14, 9);
        svd.decompose(&large).unwrap();
        check(&large, &svd, 1e-10);

        for &(rows, cols) in &[(3, 2), (2, 3), (1, 1), (6, 6)] {
            let small = random(rows, cols, 10);
            svd.decompose(&small).unwrap();
            check(&small, &svd, 1e-10);
        }
    }

    #[test]
    fn reuse_matches_fresh() {
        let large = random(10, 10, 13);
        let small = random(5, 5, 14);
        for &config in &CONFIGS {
            let mut reused: SvdImplicitQr<f64> = SvdImplicitQr::new(config);
            reused.decompose(&large).unwrap();
            reused.decompose(&small).unwrap();
            assert_eq!(reused.diag.capacity(), 10);

            let mut fresh: SvdImplicitQr<f64> = SvdImplicitQr::new(config);
            fresh.decompose(&small).unwrap();

            assert_eq!(reused.singular_values(), fresh.singular_values());
            assert_eq!(reused.u(false).unwrap(), fresh.u(false).unwrap());
            assert_eq!(reused.v(false).unwrap(), fresh.v(false).unwrap());
        }
    }

    #[test]
    fn partial_configs() {
        for a in &[random(9, 4, 11), random(4, 9, 12)] {
            let mut all: SvdImplicitQr<f64> = SvdImplicitQr::new(SvdConfig::default());
            all.decompose(a).unwrap();

            for &(compute_u, compute_v) in &[(true, false), (false, true), (false, false)] {
                for &all_at_once in &[true, false] {
                    let config = SvdConfig {
                        compute_u,
                        compute_v,
                        all_at_once,
                        ..SvdConfig::default()
                    };
                    let mut svd: SvdImplicitQr<f64> = SvdImplicitQr::new(config);
                    svd.decompose(a).unwrap();
                    assert_abs_diff_eq!(
                        sorted(svd.singular_values()),
                        sorted(all.singular_values()),
                        epsilon = 1e-10
                    );

                    if compute_u {
                        svd.u(false).unwrap();
                    } else {
                        assert!(matches!(
                            svd.u(false),
                            Err(LinalgError::NotComputed { factor: "U" })
                        ));
                    }
                    if compute_v {
                        svd.v(false).unwrap();
                    } else {
                        assert!(matches!(
                            svd.v(true),
                            Err(LinalgError::NotComputed { factor: "V" })
                        ));
                    }
                }
            }
        }
    }

    #[test]
    fn getters_with_storage() {
        let a = random(6, 4, 13);
        let mut svd: SvdImplicitQr<f64> = SvdImplicitQr::new(SvdConfig::default());
        svd.decompose(&a).unwrap();

        let u = svd.u_into(Some(Array2::ones((10, 10))), false).unwrap();
        assert_abs_diff_eq!(u, svd.u(false).unwrap());
        let vt = svd.v_into(Some(Array2::ones((4, 4))), true).unwrap();
        assert_abs_diff_eq!(vt, svd.v(true).unwrap());
        let w = svd.w_into(Some(Array2::ones((2, 7)))).unwrap();
        assert_abs_diff_eq!(w, Array2::from_diag(&svd.singular_values()));
        assert!(svd.is_compact());
        assert_eq!(svd.config(), &SvdConfig::default());
        assert_eq!((svd.nrows(), svd.ncols()), (6, 4));
    }

    #[test]
    fn iteration_cap() {
        let a = random(6, 6, 14);
        let mut svd: SvdImplicitQr<f64> =
            SvdImplicitQr::new(SvdConfig::default()).with_max_iterations(1);
        assert!(matches!(
            svd.decompose(&a),
            Err(LinalgError::NotConverged { .. })
        ));
        assert!(matches!(svd.v(false), Err(LinalgError::NotDecomposed)));
    }

    #[test]
    fn injected_rng() {
        let a = random(12, 12, 15);
        let mut svd: SvdImplicitQr<f64, DirtyRangeRotation, _> =
            SvdImplicitQr::with_rng(SvdConfig::default(), Xoshiro256Plus::seed_from_u64(3))
                .with_exceptional_threshold(3);
        svd.decompose(&a).unwrap();
        check(&a, &svd, 1e-10);
    }

    #[test]
    fn svd_traits() {
        let a = random(7, 4, 16);
        let (u, s, vt) = a.svd(true, true).unwrap().sort_svd_desc();
        let (u, vt) = (u.unwrap(), vt.unwrap());
        assert_eq!(u.dim(), (7, 4));
        assert_eq!(vt.dim(), (4, 4));
        assert!(s.windows(2).into_iter().all(|w| w[0] >= w[1]));
        assert_abs_diff_eq!(u.dot(&Array2::from_diag(&s)).dot(&vt), a, epsilon = 1e-10);

        let (u, s, vt) = a.t().svd_into(false, true).unwrap().sort_svd_asc();
        assert!(u.is_none());
        assert!(s.windows(2).into_iter().all(|w| w[0] <= w[1]));
        assert_eq!(vt.unwrap().dim(), (4, 7));
    }
}
