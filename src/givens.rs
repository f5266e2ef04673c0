use ndarray::{ArrayBase, DataMut, Ix2, NdFloat};

use crate::index::*;

/// A Givens Rotation
///
/// Represents the 2x2 rotation `[[c, s], [-s, c]]` acting on a pair of rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GivensRotation<A> {
    c: A,
    s: A,
}

impl<A: NdFloat> GivensRotation<A> {
    pub fn new(c: A, s: A) -> Self {
        Self { c, s }
    }

    /// Computes the rotation that maps `[rise, run]` onto `[r, 0]`, with `r >= 0` when `rise` is
    /// positive.
    ///
    /// The larger of the two inputs divides the smaller one, so no intermediate value is squared
    /// at its original magnitude. If both inputs are zero the identity is returned.
    pub fn from_rise_run(rise: A, run: A) -> Self {
        if rise.abs() < run.abs() {
            let k = rise / run;
            let bottom = (A::one() + k * k).sqrt();
            let s = A::one() / bottom;
            Self { c: k * s, s }
        } else if !rise.is_zero() {
            let t = run / rise;
            let bottom = (A::one() + t * t).sqrt();
            let c = A::one() / bottom;
            Self { c, s: t * c }
        } else {
            Self {
                c: A::one(),
                s: A::zero(),
            }
        }
    }

    /// Rotation by the angle `theta`
    pub fn from_angle(theta: A) -> Self {
        Self {
            c: theta.cos(),
            s: theta.sin(),
        }
    }

    pub fn c(&self) -> A {
        self.c
    }
    pub fn s(&self) -> A {
        self.s
    }

    /// The inverse Givens rotation
    pub fn inverse(self) -> Self {
        Self {
            c: self.c,
            s: -self.s,
        }
    }

    /// Rotates the pair `(a, b)`
    pub fn apply(&self, a: A, b: A) -> (A, A) {
        (self.c * a + self.s * b, self.c * b - self.s * a)
    }

    /// Rotates rows `m` and `n` of `q` in place, touching only the first `len` columns.
    ///
    /// Panics in debug builds if either row or `len` is out of bounds.
    pub fn rotate_rows<S: DataMut<Elem = A>>(
        &self,
        q: &mut ArrayBase<S, Ix2>,
        m: usize,
        n: usize,
        len: usize,
    ) {
        for j in 0..len {
            unsafe {
                let (a, b) = self.apply(*q.at((m, j)), *q.at((n, j)));
                *q.atm((m, j)) = a;
                *q.atm((n, j)) = b;
            }
        }
    }
}
