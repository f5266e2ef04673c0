//! Implicit shift QR algorithm for bidiagonal matrices
//!
//! Computes the singular values of an upper bidiagonal matrix `B`, stored as its diagonal and
//! superdiagonal, by implicitly running the shifted QR algorithm on `B.t * B` without ever
//! forming it. Each step chases a bulge from the top of the active window to its bottom with
//! Givens rotations. Rotations are optionally accumulated into `U.t` and `V.t`, stored transposed
//! so that every update only touches two rows.
//!
//! Based on David S. Watkins, "Fundamentals of Matrix Computations", 2nd edition, pp. 404-411.

use log::{debug, trace};
use ndarray::{Array2, NdFloat};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

use crate::{
    givens::GivensRotation,
    rotator::{FullRotation, RotationSink},
    workspace::Workspace,
    LinalgError, Result,
};

const DEFAULT_SEED: u64 = 0x34671e;
const DEFAULT_EXCEPTIONAL_THRESHOLD: usize = 15;
// Default cap on implicit steps, per singular value
const STEPS_PER_VALUE: usize = 300;
// Steps spent on zero shifts before switching to Wilkinson shifts
const ZERO_SHIFT_STEPS: usize = 6;
// Steps a window may take with supplied shifts before falling back to Wilkinson shifts
const GIVE_UP_ON_KNOWN: usize = 10;

/// Computes the wilkinson shift, i.e., the 2x2 symmetric matrix eigenvalue to its tailing
/// component `tnn`.
///
/// The inputs are interpreted as the 2x2 matrix:
///     tmm  tmn
///     tmn  tnn
///
/// The entries are divided by the largest of them before being combined, so the result is finite
/// for any finite input.
pub fn wilkinson_shift<A: NdFloat>(tmm: A, tnn: A, tmn: A) -> A {
    let scale = tmm.abs().max(tnn.abs()).max(tmn.abs());
    if scale.is_zero() {
        return A::zero();
    }
    let (tmm, tnn, tmn) = (tmm / scale, tnn / scale, tmn / scale);

    let tmn_sq = tmn * tmn;
    let shift = if !tmn_sq.is_zero() {
        let d = (tmm - tnn) * A::from(0.5).unwrap();
        tnn - tmn_sq / (d + d.signum() * d.hypot(tmn))
    } else {
        tnn
    };
    shift * scale
}

/// Singular values of the upper triangular matrix `[[m11, m12], [0, m22]]`, larger one first.
/// Both are non-negative.
//
// Explicit formulae inspired from the paper "Computing the Singular Values of 2-by-2 Complex
// Matrices", Sanzheng Qiao and Xiaohong Wang.
pub fn uptrig_2x2_singular_values<A: NdFloat>(m11: A, m12: A, m22: A) -> (A, A) {
    let two = A::from(2.0).unwrap();
    let denom = (m11 + m22).hypot(m12) + (m11 - m22).hypot(m12);
    if denom.is_zero() {
        return (A::zero(), A::zero());
    }
    (denom / two, (m11 * m22).abs() * two / denom)
}

/// Implicit shift QR iteration on a bidiagonal matrix
///
/// The engine is set up with [`set_matrix`](Self::set_matrix), optionally given `U.t`/`V.t`
/// accumulators, then run with [`process`](Self::process). The invariant maintained is
/// `B_original = U.t.t * B_current * V.t`, relative to whatever the accumulators held when they
/// were handed over. Singular values are left unsorted and may be negative.
///
/// `S` decides how rotations reach the accumulators, `R` drives the exceptional shifts.
#[derive(Debug, Clone)]
pub struct ImplicitQrAlgorithm<A, S = FullRotation, R = Xoshiro256Plus> {
    rng: R,

    ut: Option<Array2<A>>,
    vt: Option<Array2<A>>,
    sink_u: S,
    sink_v: S,

    diag: Workspace<A>,
    off: Workspace<A>,
    // Largest absolute element of B, zero for a zero matrix
    max_value: A,
    bulge: A,

    // Active window [x1, x2]
    x1: usize,
    x2: usize,
    // Ends of the windows still waiting to be processed
    splits: Vec<usize>,

    // Steps since the last split
    steps: usize,
    total_steps: usize,
    num_exceptional: usize,
    next_exceptional: usize,
    exceptional_threshold: usize,
    max_iterations: Option<usize>,

    fast_values: bool,
    follow_script: bool,
    finding_zeros: bool,
}

impl<A: NdFloat, S: RotationSink<A>> Default for ImplicitQrAlgorithm<A, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: NdFloat, S: RotationSink<A>> ImplicitQrAlgorithm<A, S> {
    /// Creates the engine with a deterministically seeded generator for exceptional shifts
    pub fn new() -> Self {
        Self::with_rng(Xoshiro256Plus::seed_from_u64(DEFAULT_SEED))
    }
}

impl<A: NdFloat, S: RotationSink<A>, R: Rng> ImplicitQrAlgorithm<A, S, R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            ut: None,
            vt: None,
            sink_u: S::default(),
            sink_v: S::default(),
            diag: Workspace::new(),
            off: Workspace::new(),
            max_value: A::zero(),
            bulge: A::zero(),
            x1: 0,
            x2: 0,
            splits: Vec::new(),
            steps: 0,
            total_steps: 0,
            num_exceptional: 0,
            next_exceptional: DEFAULT_EXCEPTIONAL_THRESHOLD,
            exceptional_threshold: DEFAULT_EXCEPTIONAL_THRESHOLD,
            max_iterations: None,
            fast_values: false,
            follow_script: false,
            finding_zeros: false,
        }
    }

    /// Number of steps without a split after which an exceptional shift is taken
    pub fn with_exceptional_threshold(mut self, threshold: usize) -> Self {
        self.exceptional_threshold = threshold.max(1);
        self
    }

    /// Cap on the total number of implicit steps of one run. Defaults to 300 steps per singular
    /// value.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// If set, 2x2 windows are solved in closed form instead of iterated. Only valid when no
    /// accumulators are in use.
    pub fn set_fast_values(&mut self, fast_values: bool) {
        self.fast_values = fast_values;
    }

    /// Loads the bidiagonal matrix with diagonal `diag` and superdiagonal `off`, and resets all
    /// iteration state.
    pub fn set_matrix(&mut self, diag: &[A], off: &[A]) -> Result<()> {
        let n = diag.len();
        if n == 0 {
            return Err(LinalgError::EmptyMatrix);
        }
        if off.len() + 1 < n {
            return Err(LinalgError::WrongRows {
                expected: n - 1,
                actual: off.len(),
            });
        }

        self.diag.resize(n);
        self.diag.copy_from_slice(diag);
        self.off.resize(n - 1);
        self.off.copy_from_slice(&off[..n - 1]);

        self.max_value = self
            .diag
            .iter()
            .chain(self.off.iter())
            .fold(A::zero(), |max, v| max.max(v.abs()));

        self.x1 = 0;
        self.x2 = n - 1;
        self.splits.clear();
        self.total_steps = 0;
        self.reset_steps();
        Ok(())
    }

    fn check_accumulator(&self, q: &Array2<A>) -> Result<()> {
        if q.nrows() < self.diag.len() {
            return Err(LinalgError::WrongRows {
                expected: self.diag.len(),
                actual: q.nrows(),
            });
        }
        Ok(())
    }

    /// Hands over the accumulator for `U.t`, which must have at least as many rows as the loaded
    /// matrix. The rotation sink prepares it first.
    pub fn set_ut(&mut self, ut: Option<Array2<A>>) -> Result<()> {
        self.ut = match ut {
            Some(mut ut) => {
                self.check_accumulator(&ut)?;
                self.sink_u.init(&mut ut);
                Some(ut)
            }
            None => None,
        };
        Ok(())
    }

    /// Hands over the accumulator for `V.t`, see [`set_ut`](Self::set_ut).
    pub fn set_vt(&mut self, vt: Option<Array2<A>>) -> Result<()> {
        self.vt = match vt {
            Some(mut vt) => {
                self.check_accumulator(&vt)?;
                self.sink_v.init(&mut vt);
                Some(vt)
            }
            None => None,
        };
        Ok(())
    }

    pub fn ut(&self) -> Option<&Array2<A>> {
        self.ut.as_ref()
    }

    pub fn vt(&self) -> Option<&Array2<A>> {
        self.vt.as_ref()
    }

    pub fn take_ut(&mut self) -> Option<Array2<A>> {
        self.ut.take()
    }

    pub fn take_vt(&mut self) -> Option<Array2<A>> {
        self.vt.take()
    }

    /// Runs the iteration, choosing shifts dynamically
    pub fn process(&mut self) -> Result<()> {
        self.follow_script = false;
        self.finding_zeros = true;
        self.run(None)
    }

    /// Runs the iteration using `values`, singular values found by an earlier run on the same
    /// matrix, as shifts. This usually converges in one or two steps per value. Windows that
    /// fail to converge this way fall back to dynamic shifts.
    pub fn process_with_shifts(&mut self, values: &[A]) -> Result<()> {
        if values.len() < self.diag.len() {
            return Err(LinalgError::WrongRows {
                expected: self.diag.len(),
                actual: values.len(),
            });
        }
        self.follow_script = true;
        self.finding_zeros = false;
        self.run(Some(values))
    }

    fn run(&mut self, shifts: Option<&[A]>) -> Result<()> {
        // it is a zero matrix
        if self.max_value.is_zero() {
            return Ok(());
        }
        let max_iterations = self
            .max_iterations
            .unwrap_or(STEPS_PER_VALUE * self.diag.len());

        loop {
            if self.total_steps > max_iterations {
                debug!(
                    "implicit QR gave up after {} steps, window [{}, {}] of {}",
                    self.total_steps,
                    self.x1,
                    self.x2,
                    self.diag.len()
                );
                return Err(LinalgError::NotConverged {
                    iterations: self.total_steps,
                });
            }

            if self.x1 == self.x2 {
                self.reset_steps();
                if !self.next_split() {
                    break;
                }
            } else if self.fast_values && self.x2 - self.x1 == 1 {
                self.reset_steps();
                self.eigen_bb_2x2(self.x1);
                self.x1 = self.x2;
            } else if self.steps >= self.next_exceptional {
                self.exceptional_shift();
            } else if !self.check_for_and_handle_zeros() {
                match shifts {
                    Some(values) if self.follow_script => self.scripted_step(values),
                    _ => self.dynamic_step(),
                }
            }
        }

        Ok(())
    }

    fn reset_steps(&mut self) {
        self.steps = 0;
        self.next_exceptional = self.exceptional_threshold;
        self.num_exceptional = 0;
    }

    fn increment_steps(&mut self) {
        self.steps += 1;
        self.total_steps += 1;
    }

    /// Moves the window to the next pending submatrix, returns false if there is none
    fn next_split(&mut self) -> bool {
        match self.splits.pop() {
            Some(x2) => {
                self.x2 = x2;
                self.x1 = self.splits.last().map_or(0, |&s| s + 1);
                true
            }
            None => false,
        }
    }

    fn is_off_zero(&self, i: usize) -> bool {
        let bottom = self.diag[i].abs() + self.diag[i + 1].abs();
        self.off[i].abs() <= bottom * A::epsilon()
    }

    fn is_diagonal_zero(&self, i: usize) -> bool {
        let bottom = self.diag[i + 1].abs() + self.off[i].abs();
        self.diag[i].abs() <= bottom * A::epsilon()
    }

    /// Looks for negligible off-diagonal or diagonal elements in the window. If one is found the
    /// window is split there and true is returned.
    fn check_for_and_handle_zeros(&mut self) -> bool {
        for i in (self.x1..self.x2).rev() {
            if self.is_off_zero(i) {
                self.split_at(i);
                return true;
            }
        }

        for i in (self.x1..self.x2).rev() {
            if self.is_diagonal_zero(i) {
                self.push_right(i);
                self.split_at(i);
                return true;
            }
        }
        false
    }

    fn split_at(&mut self, i: usize) {
        trace!("split at {} after {} steps", i, self.steps);
        self.reset_steps();
        self.splits.push(i);
        self.x1 = i + 1;
    }

    fn dynamic_step(&mut self) {
        // Zero shifts first, which quickly reveal singular values that are (close to) zero
        if self.finding_zeros {
            if self.steps > ZERO_SHIFT_STEPS {
                self.finding_zeros = false;
            } else {
                let scale = self.bulge_scale();
                self.implicit_single_step(scale, A::zero(), false);
            }
        } else {
            // The shift and the step must share one scale, otherwise the shift would be
            // multiplied by the scale twice and overflow
            let scale = self.bulge_scale();
            let lambda = self.select_wilkinson_shift(scale);
            self.implicit_single_step(scale, lambda, false);
        }
    }

    fn scripted_step(&mut self, values: &[A]) {
        if self.steps > GIVE_UP_ON_KNOWN {
            self.follow_script = false;
        } else {
            let scale = self.bulge_scale();
            let s = values[self.x2] / scale;
            self.implicit_single_step(scale, s * s, false);
        }
    }

    /// Takes a step with a random rotation angle, which breaks the symmetric cycles the shifted
    /// iteration can get stuck in. The angle grows with each consecutive exceptional shift.
    fn exceptional_shift(&mut self) {
        self.num_exceptional += 1;
        let mag = (0.05 * self.num_exceptional as f64).min(1.0);
        let angle = 2.0 * std::f64::consts::PI * (self.rng.gen::<f64>() - 0.5) * mag;
        trace!(
            "exceptional shift {} in window [{}, {}], angle {}",
            self.num_exceptional,
            self.x1,
            self.x2,
            angle
        );
        self.implicit_single_step(A::zero(), A::from(angle).unwrap(), true);

        self.next_exceptional = self.steps + self.exceptional_threshold;
    }

    fn bulge_scale(&self) -> A {
        self.diag[self.x1].abs().max(self.off[self.x1].abs())
    }

    /// Wilkinson shift for `B.t * B`, divided by `scale^2`
    fn select_wilkinson_shift(&self, scale: A) -> A {
        let (x1, x2) = (self.x1, self.x2);
        let (diag, off) = (&self.diag, &self.off);

        let (a11, a12, a22) = if x2 - x1 > 1 {
            let d1 = diag[x2 - 1] / scale;
            let o1 = off[x2 - 2] / scale;
            let d2 = diag[x2] / scale;
            let o2 = off[x2 - 1] / scale;
            (o1 * o1 + d1 * d1, o2 * d1, o2 * o2 + d2 * d2)
        } else {
            let a = diag[x2 - 1] / scale;
            let b = off[x2 - 1] / scale;
            let c = diag[x2] / scale;
            (a * a, a * b, b * b + c * c)
        };

        wilkinson_shift(a11, a22, a12)
    }

    /// One implicit QR step on `B.t * B - lambda * I` over the active window
    fn implicit_single_step(&mut self, scale: A, lambda: A, by_angle: bool) {
        let (x1, x2) = (self.x1, self.x2);
        self.create_bulge(x1, lambda, scale, by_angle);

        let mut i = x1;
        while i + 1 < x2 && !self.bulge.is_zero() {
            self.remove_bulge_left(i, true);
            if self.bulge.is_zero() {
                break;
            }
            self.remove_bulge_right(i);
            i += 1;
        }

        if !self.bulge.is_zero() {
            self.remove_bulge_left(x2 - 1, false);
        }

        self.increment_steps();
    }

    fn rotate_u(&mut self, m: usize, n: usize, rot: &GivensRotation<A>) {
        if let Some(ut) = &mut self.ut {
            self.sink_u.update(ut, m, n, rot);
        }
    }

    fn rotate_v(&mut self, m: usize, n: usize, rot: &GivensRotation<A>) {
        if let Some(vt) = &mut self.vt {
            self.sink_v.update(vt, m, n, rot);
        }
    }

    /// Applies the first rotation of a step on the right, creating the bulge below the diagonal
    fn create_bulge(&mut self, x1: usize, p: A, scale: A, by_angle: bool) {
        let b11 = self.diag[x1];
        let b12 = self.off[x1];
        let b22 = self.diag[x1 + 1];

        let rot = if by_angle {
            GivensRotation::from_angle(p)
        } else {
            // normalized to resist overflow/underflow
            let u1 = (b11 / scale) * (b11 / scale) - p;
            let u2 = (b12 / scale) * (b11 / scale);
            let gamma = u1.hypot(u2);
            if gamma.is_zero() {
                GivensRotation::new(A::one(), A::zero())
            } else {
                GivensRotation::new(u1 / gamma, u2 / gamma)
            }
        };
        let (c, s) = (rot.c(), rot.s());

        self.diag[x1] = b11 * c + b12 * s;
        self.off[x1] = b12 * c - b11 * s;
        self.diag[x1 + 1] = b22 * c;
        self.bulge = b22 * s;

        self.rotate_v(x1, x1 + 1, &rot);
    }

    /// Rotates rows `x1` and `x1 + 1` to cancel the bulge below the diagonal. Unless this is the
    /// last rotation of the step, a new bulge appears right of the superdiagonal.
    fn remove_bulge_left(&mut self, x1: usize, not_last: bool) {
        let b11 = self.diag[x1];
        let b12 = self.off[x1];
        let b22 = self.diag[x1 + 1];

        let rot = GivensRotation::from_rise_run(b11, self.bulge);
        let (c, s) = (rot.c(), rot.s());

        self.diag[x1] = c * b11 + s * self.bulge;
        self.off[x1] = c * b12 + s * b22;
        self.diag[x1 + 1] = c * b22 - s * b12;

        if not_last {
            let b23 = self.off[x1 + 1];
            self.bulge = s * b23;
            self.off[x1 + 1] = c * b23;
        }

        self.rotate_u(x1, x1 + 1, &rot);
    }

    /// Rotates columns `x1 + 1` and `x1 + 2` to cancel the bulge right of the superdiagonal,
    /// pushing it below the diagonal one row further down.
    fn remove_bulge_right(&mut self, x1: usize) {
        let b12 = self.off[x1];
        let b22 = self.diag[x1 + 1];
        let b23 = self.off[x1 + 1];

        let rot = GivensRotation::from_rise_run(b12, self.bulge);
        let (c, s) = (rot.c(), rot.s());

        self.off[x1] = b12 * c + self.bulge * s;
        self.diag[x1 + 1] = b22 * c + b23 * s;
        self.off[x1 + 1] = -b22 * s + b23 * c;

        let b33 = self.diag[x1 + 2];
        self.diag[x1 + 2] = b33 * c;
        self.bulge = b33 * s;

        self.rotate_v(x1 + 1, x1 + 2, &rot);
    }

    /// With a zero on the diagonal at `row`, chases the superdiagonal element of that row off to
    /// the right with left rotations, so the matrix splits there.
    fn push_right(&mut self, row: usize) {
        if self.is_off_zero(row) {
            return;
        }
        let n = self.diag.len();

        self.rotator_push_right(row);
        let end = n - 2 - row;
        let mut i = 0;
        while i < end && !self.bulge.is_zero() {
            self.rotator_push_right2(row, i + 2);
            i += 1;
        }
    }

    fn rotator_push_right(&mut self, m: usize) {
        let n = self.diag.len();
        let b11 = self.off[m];
        let b21 = self.diag[m + 1];

        let rot = GivensRotation::from_rise_run(b21, -b11);
        let (c, s) = (rot.c(), rot.s());

        self.off[m] = A::zero();
        self.diag[m + 1] = b21 * c - b11 * s;

        if m + 2 < n {
            let b22 = self.off[m + 1];
            self.off[m + 1] = b22 * c;
            self.bulge = b22 * s;
        } else {
            self.bulge = A::zero();
        }

        self.rotate_u(m, m + 1, &rot);
    }

    fn rotator_push_right2(&mut self, m: usize, offset: usize) {
        let n = self.diag.len();
        let b11 = self.bulge;
        let b12 = self.diag[m + offset];

        let rot = GivensRotation::from_rise_run(b12, -b11);
        let (c, s) = (rot.c(), rot.s());

        self.diag[m + offset] = b12 * c - b11 * s;

        if m + offset < n - 1 {
            let b22 = self.off[m + offset];
            self.off[m + offset] = b22 * c;
            self.bulge = b22 * s;
        }

        self.rotate_u(m, m + offset, &rot);
    }

    /// Replaces the 2x2 window starting at `x1` with its singular values
    fn eigen_bb_2x2(&mut self, x1: usize) {
        let b11 = self.diag[x1];
        let b12 = self.off[x1];
        let b22 = self.diag[x1 + 1];

        // normalize to reduce overflow
        let scale = b11.abs().max(b12.abs()).max(b22.abs());
        // the diagonal must already be zero and so are the singular values
        if scale.is_zero() {
            return;
        }

        let (big, small) = uptrig_2x2_singular_values(b11 / scale, b12 / scale, b22 / scale);
        self.off[x1] = A::zero();
        self.diag[x1] = scale * big;
        self.diag[x1 + 1] = scale * small;
    }

    pub fn number_of_singular_values(&self) -> usize {
        self.diag.len()
    }

    /// Current diagonal, which holds the singular values once processing succeeded. The values
    /// are unsorted and may be negative.
    pub fn singular_values(&self) -> &[A] {
        &self.diag
    }

    pub fn off_diagonal(&self) -> &[A] {
        &self.off
    }

    pub fn max_value(&self) -> A {
        self.max_value
    }

    /// Implicit steps taken by the last run
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }
}
