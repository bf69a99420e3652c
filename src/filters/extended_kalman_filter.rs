#![allow(non_snake_case)]

use nalgebra::{RealField, SMatrix, SVector};

use crate::error::{FilterError, Result};
use crate::filters::bayesian_filter::BayesianFilter;
use crate::models::{MeasurementFn, MeasurementJacobianFn, TransitionFn, TransitionJacobianFn};
use crate::utils::joseph_form;
use crate::utils::mvn::MultiVariateNormal;
use crate::utils::state::GaussianState;

/// Kalman filter for nonlinear models, linearized through caller supplied
/// Jacobians.
///
/// The Jacobians are part of the construction contract: the filter never
/// differentiates anything itself. Linearization error under strong
/// nonlinearity shows up directly in the estimates.
pub struct ExtendedKalmanFilter<T: RealField, const S: usize, const Z: usize, const U: usize> {
    f: TransitionFn<T, S, U>,
    F_jacobian: TransitionJacobianFn<T, S, U>,
    h: MeasurementFn<T, S, Z>,
    H_jacobian: MeasurementJacobianFn<T, S, Z>,
    Q: SMatrix<T, S, S>,
    R: SMatrix<T, Z, Z>,
    state: GaussianState<T, S>,
}

impl<T: RealField + Copy, const S: usize, const Z: usize, const U: usize>
    ExtendedKalmanFilter<T, S, Z, U>
{
    pub fn new(
        f: TransitionFn<T, S, U>,
        F_jacobian: TransitionJacobianFn<T, S, U>,
        h: MeasurementFn<T, S, Z>,
        H_jacobian: MeasurementJacobianFn<T, S, Z>,
        Q: SMatrix<T, S, S>,
        R: SMatrix<T, Z, Z>,
        prior: GaussianState<T, S>,
    ) -> ExtendedKalmanFilter<T, S, Z, U> {
        ExtendedKalmanFilter {
            f,
            F_jacobian,
            h,
            H_jacobian,
            Q,
            R,
            state: prior,
        }
    }
}

impl<T: RealField + Copy, const S: usize, const Z: usize, const U: usize>
    BayesianFilter<T, S, Z, U> for ExtendedKalmanFilter<T, S, Z, U>
{
    fn predict(&mut self, u: Option<&SVector<T, U>>) -> Result<()> {
        // linearize around the mean before it moves
        let F = (self.F_jacobian)(&self.state.x, u);
        self.state.x = (self.f)(&self.state.x, u);
        self.state.P = F * self.state.P * F.transpose() + self.Q;
        if !self.state.is_finite() {
            return Err(FilterError::NonFinite("ekf predict"));
        }
        Ok(())
    }

    fn update(&mut self, z: &SVector<T, Z>) -> Result<()> {
        let H = (self.H_jacobian)(&self.state.x);
        let innovation = z - (self.h)(&self.state.x);
        let s = H * self.state.P * H.transpose() + self.R;
        let s_inv = s.try_inverse().ok_or(FilterError::SingularInnovation)?;
        let gain = self.state.P * H.transpose() * s_inv;

        self.state.x += gain * innovation;
        self.state.P = joseph_form(&self.state.P, &gain, &H, &self.R);
        self.state.symmetrize();
        if !self.state.is_finite() {
            return Err(FilterError::NonFinite("ekf update"));
        }
        Ok(())
    }

    fn estimate(&self) -> GaussianState<T, S> {
        self.state
    }

    fn set_estimate(&mut self, estimate: &GaussianState<T, S>) -> Result<()> {
        self.state = *estimate;
        Ok(())
    }

    fn measurement_likelihood(&self, z: &SVector<T, Z>) -> Result<T> {
        let H = (self.H_jacobian)(&self.state.x);
        let z_pred = (self.h)(&self.state.x);
        let s = H * self.state.P * H.transpose() + self.R;
        let mvn = MultiVariateNormal::new(&z_pred, &s)?;
        Ok(mvn.pdf(z))
    }
}
