#![allow(non_snake_case)]

use nalgebra::{RealField, SMatrix, SVector};

use crate::error::{FilterError, Result};
use crate::filters::bayesian_filter::BayesianFilter;
use crate::utils::joseph_form;
use crate::utils::mvn::MultiVariateNormal;
use crate::utils::state::GaussianState;

/// Linear Gaussian filter, the canonical predict/update recursion.
///
/// S: state size, Z: measurement size, U: control size.
pub struct KalmanFilter<T: RealField, const S: usize, const Z: usize, const U: usize> {
    F: SMatrix<T, S, S>,
    B: Option<SMatrix<T, S, U>>,
    H: SMatrix<T, Z, S>,
    Q: SMatrix<T, S, S>,
    R: SMatrix<T, Z, Z>,
    state: GaussianState<T, S>,
}

impl<T: RealField + Copy, const S: usize, const Z: usize, const U: usize>
    KalmanFilter<T, S, Z, U>
{
    pub fn new(
        F: SMatrix<T, S, S>,
        B: Option<SMatrix<T, S, U>>,
        H: SMatrix<T, Z, S>,
        Q: SMatrix<T, S, S>,
        R: SMatrix<T, Z, Z>,
        prior: GaussianState<T, S>,
    ) -> KalmanFilter<T, S, Z, U> {
        KalmanFilter {
            F,
            B,
            H,
            Q,
            R,
            state: prior,
        }
    }

    /// Innovation covariance of `z` against the current estimate.
    fn innovation_covariance(&self) -> SMatrix<T, Z, Z> {
        self.H * self.state.P * self.H.transpose() + self.R
    }
}

impl<T: RealField + Copy, const S: usize, const Z: usize, const U: usize>
    BayesianFilter<T, S, Z, U> for KalmanFilter<T, S, Z, U>
{
    fn predict(&mut self, u: Option<&SVector<T, U>>) -> Result<()> {
        self.state.x = match (u, &self.B) {
            (Some(u), Some(B)) => self.F * self.state.x + B * u,
            (None, _) => self.F * self.state.x,
            (Some(_), None) => {
                return Err(FilterError::InvalidConfiguration(
                    "control input supplied without a control matrix".into(),
                ))
            }
        };
        self.state.P = self.F * self.state.P * self.F.transpose() + self.Q;
        if !self.state.is_finite() {
            return Err(FilterError::NonFinite("kalman predict"));
        }
        Ok(())
    }

    fn update(&mut self, z: &SVector<T, Z>) -> Result<()> {
        let innovation = z - self.H * self.state.x;
        let s = self.innovation_covariance();
        let s_inv = s.try_inverse().ok_or(FilterError::SingularInnovation)?;
        let gain = self.state.P * self.H.transpose() * s_inv;

        self.state.x += gain * innovation;
        self.state.P = joseph_form(&self.state.P, &gain, &self.H, &self.R);
        self.state.symmetrize();
        if !self.state.is_finite() {
            return Err(FilterError::NonFinite("kalman update"));
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
        let z_pred = self.H * self.state.x;
        let mvn = MultiVariateNormal::new(&z_pred, &self.innovation_covariance())?;
        Ok(mvn.pdf(z))
    }
}
