use nalgebra::{RealField, SMatrix, SVector};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::error::{FilterError, Result};

/// Multivariate normal distribution over D dimensional vectors.
///
/// Construction factorizes the covariance once; density evaluation and
/// sampling reuse the factorization.
#[derive(Debug)]
pub struct MultiVariateNormal<T: RealField, const D: usize> {
    mean: SVector<T, D>,
    precision: SMatrix<T, D, D>,
    sqrt_covariance: SMatrix<T, D, D>,
    factor: T,
}

impl<T: RealField + Copy, const D: usize> MultiVariateNormal<T, D> {
    /// Fails when the covariance is not positive definite.
    pub fn new(mean: &SVector<T, D>, covariance: &SMatrix<T, D, D>) -> Result<Self> {
        let Some(covariance_cholesky) = covariance.cholesky() else {
            return Err(FilterError::NonPositiveDefiniteCovariance);
        };
        let det = covariance_cholesky.determinant();
        let precision = covariance_cholesky.inverse();
        let factor = T::one() / (T::two_pi().powi(D as i32) * det).sqrt();
        Ok(MultiVariateNormal {
            mean: *mean,
            precision,
            sqrt_covariance: covariance_cholesky.l(),
            factor,
        })
    }

    /// Probability density function
    pub fn pdf(&self, x: &SVector<T, D>) -> T {
        let neg_half = T::from_f64(-0.5).unwrap();
        self.factor * T::exp(neg_half * self.quadratic_form(x))
    }

    /// Log density, usable where `pdf` underflows.
    pub fn log_pdf(&self, x: &SVector<T, D>) -> T {
        let neg_half = T::from_f64(-0.5).unwrap();
        self.factor.ln() + neg_half * self.quadratic_form(x)
    }

    /// One draw, mean + L * eps with eps standard normal.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> SVector<T, D>
    where
        StandardNormal: Distribution<T>,
    {
        let eps = SVector::<T, D>::from_fn(|_, _| StandardNormal.sample(rng));
        self.mean + self.sqrt_covariance * eps
    }

    fn quadratic_form(&self, x: &SVector<T, D>) -> T {
        let dx = self.mean - x;
        (dx.transpose() * self.precision * dx).x
    }
}
