//! Approximate equality of floating point results.
//!
//! Backends are free to reorder reductions and the GPU computes in `f32`, so
//! results are compared by grade rather than bit for bit. The difference is
//! measured relative to the larger magnitude once that exceeds one, and
//! absolutely below that.

use crate::matrix::{DenseMatrix, Matrix, Scalar};

/// The max epsilon accepted on `f32`s.
pub const F32_MAX_ERROR: f32 = 1e-3;

/// The expected epsilon on `f32`s.
pub const F32_AVG_ERROR: f32 = 1e-5;

/// The best expected epsilon on `f32`s.
pub const F32_MIN_ERROR: f32 = 1e-6;

/// The max epsilon accepted on `f64`s.
pub const F64_MAX_ERROR: f64 = 1e-3;

/// The expected epsilon on `f64`s.
pub const F64_AVG_ERROR: f64 = 1e-6;

/// The best expected epsilon on `f64`s.
pub const F64_MIN_ERROR: f64 = 1e-13;

/// The approximated equality enumerated, best first.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApproxEquality {
    /// Very strong epsilon.
    Precise = 0,

    /// Good epsilon.
    Partial = 1,

    /// Acceptable epsilon.
    Relative = 2,

    /// No relative equality; also used for mismatched shapes.
    Scarce = 3,
}

/// Grades how close two values are.
pub trait RelativeEq<Rhs: ?Sized = Self> {
    /// The grade of `self` against `rhs`.
    fn approx_eq(&self, rhs: &Rhs) -> ApproxEquality;
}

macro_rules! impl_relative_eq {
    ($t:ty, $min:expr, $avg:expr, $max:expr) => {
        impl RelativeEq for $t {
            fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
                let scale = self.abs().max(rhs.abs()).max(1.0);
                let dif = (self - rhs).abs() / scale;

                if dif < $min {
                    ApproxEquality::Precise
                } else if dif < $avg {
                    ApproxEquality::Partial
                } else if dif < $max {
                    ApproxEquality::Relative
                } else {
                    ApproxEquality::Scarce
                }
            }
        }
    };
}

impl_relative_eq!(f32, F32_MIN_ERROR, F32_AVG_ERROR, F32_MAX_ERROR);
impl_relative_eq!(f64, F64_MIN_ERROR, F64_AVG_ERROR, F64_MAX_ERROR);

/// The worst grade over pairs; stops at the first `Scarce`.
fn worst<'a, T, U>(pairs: impl Iterator<Item = (&'a T, &'a U)>) -> ApproxEquality
where
    T: RelativeEq<U> + 'a,
    U: 'a,
{
    let mut eq = ApproxEquality::Precise;
    for (t, u) in pairs {
        eq = eq.max(t.approx_eq(u));
        if eq == ApproxEquality::Scarce {
            break;
        }
    }
    eq
}

impl<T: RelativeEq<U>, U> RelativeEq<[U]> for [T] {
    fn approx_eq(&self, rhs: &[U]) -> ApproxEquality {
        if self.len() != rhs.len() {
            return ApproxEquality::Scarce;
        }
        worst(self.iter().zip(rhs))
    }
}

impl<T: Scalar + RelativeEq> RelativeEq for DenseMatrix<T> {
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        if self.rows() != rhs.rows() || self.cols() != rhs.cols() {
            return ApproxEquality::Scarce;
        }
        self.data().approx_eq(rhs.data())
    }
}

/// Whether `a` and `b` agree to the tightest grade.
pub fn approx_eq<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B) -> bool {
    a.approx_eq(b) == ApproxEquality::Precise
}

/// Whether `a` and `b` agree within single-precision rounding.
pub fn roughly_eq<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B) -> bool {
    a.approx_eq(b) <= ApproxEquality::Relative
}
