//! Scalar abstraction so the same sparse engine serves real (DC, transient)
//! and complex (AC) analyses.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use num_complex::Complex;

/// The scalar field of a sparse system.
///
/// Pivoting decisions compare magnitudes through [`Scalar::norm`]; the
/// elimination kernel only ever needs `+ − × ÷`, the reciprocal and an
/// exact zero test.
pub trait Scalar:
    Copy
    + Debug
    + PartialEq
    + Default
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
{
    fn zero() -> Self;

    fn one() -> Self;

    /// Absolute magnitude, used for threshold pivoting.
    fn norm(self) -> f64;

    /// Multiplicative inverse.
    fn recip(self) -> Self;

    /// Exact zero test (not a tolerance check).
    fn is_zero(self) -> bool {
        self == Self::zero()
    }
}

impl Scalar for f64 {
    fn zero() -> Self {
        0.0
    }

    fn one() -> Self {
        1.0
    }

    fn norm(self) -> f64 {
        self.abs()
    }

    fn recip(self) -> Self {
        1.0 / self
    }
}

impl Scalar for Complex<f64> {
    fn zero() -> Self {
        Complex::new(0.0, 0.0)
    }

    fn one() -> Self {
        Complex::new(1.0, 0.0)
    }

    fn norm(self) -> f64 {
        // |re| + |im| is cheaper than a hypot and is a valid pivot-ranking
        // norm: within a factor √2 of the Euclidean magnitude.
        self.re.abs() + self.im.abs()
    }

    fn recip(self) -> Self {
        self.inv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f64_scalar() {
        assert_eq!(<f64 as Scalar>::zero(), 0.0);
        assert!((-3.0f64).norm() == 3.0);
        assert!((0.25f64).recip() == 4.0);
        assert!(0.0f64.is_zero());
    }

    #[test]
    fn test_complex_recip() {
        let z = Complex::new(3.0, 4.0);
        let r = z * Scalar::recip(z);
        assert!((r.re - 1.0).abs() < 1e-15);
        assert!(r.im.abs() < 1e-15);
    }
}
