use ndarray::{
    linalg::{general_mat_mul, general_mat_vec_mul},
    ArrayBase, Axis, Data, DataMut, Ix1, Ix2, NdFloat,
};

/// Householder reflector `H = I - gamma * u * u.t`
///
/// `u` does not need to be normalized, `gamma` absorbs its norm. A `gamma` of zero is the
/// identity.
pub struct Reflection<A, D: Data<Elem = A>> {
    axis: ArrayBase<D, Ix1>,
    gamma: A,
}

impl<A, D: Data<Elem = A>> Reflection<A, D> {
    pub fn new(axis: ArrayBase<D, Ix1>, gamma: A) -> Self {
        Self { axis, gamma }
    }
}

impl<A: NdFloat, D: Data<Elem = A>> Reflection<A, D> {
    /// Performs the rank-1 update `rhs = H * rhs`, reflecting each column of `rhs`.
    ///
    /// Length of `work` must equal columns of `rhs` and length of the axis must equal rows of
    /// `rhs`.
    pub fn reflect_cols<M1: DataMut<Elem = A>, M2: DataMut<Elem = A>>(
        &self,
        rhs: &mut ArrayBase<M1, Ix2>,
        work: &mut ArrayBase<M2, Ix1>,
    ) {
        if self.gamma.is_zero() {
            return;
        }
        // work = gamma * rhs.t * axis
        general_mat_vec_mul(self.gamma, &rhs.t(), &self.axis, A::zero(), work);
        // rhs -= axis * work.t
        general_mat_mul(
            -A::one(),
            &self.axis.view().insert_axis(Axis(1)),
            &work.view().insert_axis(Axis(0)),
            A::one(),
            rhs,
        );
    }

    /// Performs the rank-1 update `lhs = lhs * H`, reflecting each row of `lhs`.
    ///
    /// Length of `work` must equal rows of `lhs` and length of the axis must equal columns of
    /// `lhs`.
    pub fn reflect_rows<M1: DataMut<Elem = A>, M2: DataMut<Elem = A>>(
        &self,
        lhs: &mut ArrayBase<M1, Ix2>,
        work: &mut ArrayBase<M2, Ix1>,
    ) {
        if self.gamma.is_zero() {
            return;
        }
        // work = gamma * lhs * axis
        general_mat_vec_mul(self.gamma, lhs, &self.axis, A::zero(), work);
        // lhs -= work * axis.t
        general_mat_mul(
            -A::one(),
            &work.view().insert_axis(Axis(1)),
            &self.axis.view().insert_axis(Axis(0)),
            A::one(),
            lhs,
        );
    }
}
