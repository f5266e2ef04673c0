//! Element access that is bounds-checked in debug builds and unchecked in release builds.
//!
//! The bidiagonalizer and the rotation accumulators spend nearly all their time in these
//! accesses. Every caller is internal and covered by tests run in debug mode, so an out-of-bounds
//! index shows up there as a panic rather than as undefined behaviour in release.

use ndarray::{ArrayBase, Data, DataMut, Dimension, NdIndex};

pub(crate) trait UncheckedIndex<I> {
    type Elem;
    unsafe fn at(&self, index: I) -> &Self::Elem;
}

pub(crate) trait UncheckedIndexMut<I> {
    type Elem;
    unsafe fn atm(&mut self, index: I) -> &mut Self::Elem;
}

impl<A, S: Data<Elem = A>, D: Dimension, I: NdIndex<D>> UncheckedIndex<I> for ArrayBase<S, D> {
    type Elem = A;

    unsafe fn at(&self, index: I) -> &A {
        #[cfg(debug_assertions)]
        {
            self.get(index).unwrap()
        }
        #[cfg(not(debug_assertions))]
        self.uget(index)
    }
}

impl<A, S: DataMut<Elem = A>, D: Dimension, I: NdIndex<D>> UncheckedIndexMut<I>
    for ArrayBase<S, D>
{
    type Elem = A;

    unsafe fn atm(&mut self, index: I) -> &mut A {
        #[cfg(debug_assertions)]
        {
            self.get_mut(index).unwrap()
        }
        #[cfg(not(debug_assertions))]
        self.uget_mut(index)
    }
}

// Workspace buffers deref to plain slices
impl<A> UncheckedIndex<usize> for [A] {
    type Elem = A;

    unsafe fn at(&self, index: usize) -> &A {
        #[cfg(debug_assertions)]
        {
            &self[index]
        }
        #[cfg(not(debug_assertions))]
        self.get_unchecked(index)
    }
}

impl<A> UncheckedIndexMut<usize> for [A] {
    type Elem = A;

    unsafe fn atm(&mut self, index: usize) -> &mut A {
        #[cfg(debug_assertions)]
        {
            &mut self[index]
        }
        #[cfg(not(debug_assertions))]
        self.get_unchecked_mut(index)
    }
}
