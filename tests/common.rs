#![allow(unused)]

use std::ops::RangeInclusive;

use ndarray::prelude::*;
use proptest::prelude::*;
use proptest_derive::Arbitrary;

const FLOAT_RANGE: RangeInclusive<f64> = -1000.0..=1000.0;
const DIM_RANGE: RangeInclusive<usize> = 1..=10;

#[derive(Debug, Arbitrary)]
struct Layout {
    invert_rows: bool,
    invert_cols: bool,
    transpose: bool,
}

impl Layout {
    fn apply(&self, mut arr: Array2<f64>) -> Array2<f64> {
        if self.invert_rows {
            arr.invert_axis(Axis(0));
        }
        if self.invert_cols {
            arr.invert_axis(Axis(1));
        }
        if self.transpose {
            arr.reversed_axes()
        } else {
            arr
        }
    }
}

prop_compose! {
    pub fn square_arr()(dim in DIM_RANGE)
        (data in prop::collection::vec(FLOAT_RANGE, dim*dim), dim in Just(dim), layout in any::<Layout>()) -> Array2<f64> {
        layout.apply(Array2::from_shape_vec((dim, dim), data).unwrap())
    }
}

prop_compose! {
    pub fn rect_arr()(rows in DIM_RANGE, cols in DIM_RANGE)
        (data in prop::collection::vec(FLOAT_RANGE, rows*cols), rows in Just(rows), cols in Just(cols), layout in any::<Layout>()) -> Array2<f64> {
        layout.apply(Array2::from_shape_vec((rows, cols), data).unwrap())
    }
}

// Matrices with many repeated columns, so most singular values are zero
prop_compose! {
    pub fn thin_arr()(rows in DIM_RANGE, cols in DIM_RANGE, rank in 1..=2usize)
        (data in prop::collection::vec(FLOAT_RANGE, rows*rank), rows in Just(rows), cols in Just(cols), rank in Just(rank)) -> Array2<f64> {
        let basis = Array2::from_shape_vec((rows, rank), data).unwrap();
        Array2::from_shape_fn((rows, cols), |(i, j)| basis[(i, j % rank)])
    }
}
