//! Construction of Householder reflectors
//!
//! All computations normalize the input by its largest absolute element first, which keeps the
//! intermediate norms away from overflow and underflow.

use ndarray::{s, ArrayBase, Data, DataMut, Ix1, NdFloat};

/// Largest absolute value in `x`, zero if `x` is empty
pub fn find_max<A: NdFloat, S: Data<Elem = A>>(x: &ArrayBase<S, Ix1>) -> A {
    x.iter().fold(A::zero(), |max, &v| max.max(v.abs()))
}

/// Divides every element of `x` by `max` and returns the 2-norm of the result. The norm takes the
/// sign of the first element of `x`.
pub fn compute_tau_and_divide<A: NdFloat, S: DataMut<Elem = A>>(
    x: &mut ArrayBase<S, Ix1>,
    max: A,
) -> A {
    let mut tau = A::zero();
    for v in x.iter_mut() {
        *v /= max;
        tau += *v * *v;
    }
    tau = tau.sqrt();

    match x.get(0) {
        Some(first) if first.is_sign_negative() => -tau,
        _ => tau,
    }
}

/// Overwrites `x` with the axis `u` of the reflector `H = I - gamma * u * u.t` that maps `x` onto
/// the first coordinate axis. The first element of `u` is always 1.
///
/// Returns `gamma` and the value of the first component of `H * x`. If `x` is all zeros no
/// reflection is needed, `None` is returned and `x` is left untouched.
pub fn householder_vector<A: NdFloat, S: DataMut<Elem = A>>(
    x: &mut ArrayBase<S, Ix1>,
) -> Option<(A, A)> {
    let max = find_max(x);
    if max.is_zero() {
        return None;
    }

    let tau = compute_tau_and_divide(x, max);
    let nu = x[0] + tau;
    x.slice_mut(s![1..]).mapv_inplace(|v| v / nu);
    x[0] = A::one();

    Some((nu / tau, -tau * max))
}
