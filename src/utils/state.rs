#![allow(non_snake_case)]

use nalgebra::{RealField, SMatrix, SVector};

/// Gaussian belief over a D dimensional state.
#[derive(Debug, Clone, Copy)]
pub struct GaussianState<T: RealField, const D: usize> {
    /// State vector
    pub x: SVector<T, D>,
    /// Covariance matrix
    pub P: SMatrix<T, D, D>,
}

impl<T: RealField + Copy, const D: usize> GaussianState<T, D> {
    pub fn new(x: SVector<T, D>, P: SMatrix<T, D, D>) -> GaussianState<T, D> {
        GaussianState { x, P }
    }

    /// Restores exact covariance symmetry lost to floating point roundoff.
    pub fn symmetrize(&mut self) {
        let half = T::from_f64(0.5).unwrap();
        self.P = (self.P + self.P.transpose()) * half;
    }

    pub fn is_finite(&self) -> bool {
        self.x.iter().all(|v| v.is_finite()) && self.P.iter().all(|v| v.is_finite())
    }
}
