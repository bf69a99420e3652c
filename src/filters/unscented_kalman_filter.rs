#![allow(non_snake_case)]

use nalgebra::{RealField, SMatrix, SVector};

use crate::error::{FilterError, Result};
use crate::filters::bayesian_filter::BayesianFilter;
use crate::models::{MeasurementFn, TransitionFn};
use crate::utils::mvn::MultiVariateNormal;
use crate::utils::state::GaussianState;

/// Diagonal jitter added once when a covariance square root fails.
const CHOLESKY_JITTER: f64 = 1e-6;

/// Sigma point Kalman filter. Propagates 2S+1 deterministically chosen
/// samples through the raw nonlinear models instead of linearizing them,
/// so no Jacobians are required.
///
/// S: state size, Z: measurement size, U: input size.
pub struct UnscentedKalmanFilter<T: RealField, const S: usize, const Z: usize, const U: usize> {
    f: TransitionFn<T, S, U>,
    h: MeasurementFn<T, S, Z>,
    Q: SMatrix<T, S, S>,
    R: SMatrix<T, Z, Z>,
    gamma: T,
    mw: Vec<T>,
    cw: Vec<T>,
    state: GaussianState<T, S>,
}

impl<T: RealField, const S: usize, const Z: usize, const U: usize> std::fmt::Debug
    for UnscentedKalmanFilter<T, S, Z, U>
{
    /// The model closures carry no printable state and are skipped.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnscentedKalmanFilter")
            .field("Q", &self.Q)
            .field("R", &self.R)
            .field("gamma", &self.gamma)
            .field("mw", &self.mw)
            .field("cw", &self.cw)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<T: RealField + Copy, const S: usize, const Z: usize, const U: usize>
    UnscentedKalmanFilter<T, S, Z, U>
{
    /// Tuning: `alpha` scales the sigma point spread (must be positive),
    /// `beta` folds in prior distribution knowledge (2 is exact for
    /// Gaussians), `kappa` is a secondary spread knob with `kappa > -S`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        f: TransitionFn<T, S, U>,
        h: MeasurementFn<T, S, Z>,
        Q: SMatrix<T, S, S>,
        R: SMatrix<T, Z, Z>,
        alpha: T,
        beta: T,
        kappa: T,
        prior: GaussianState<T, S>,
    ) -> Result<UnscentedKalmanFilter<T, S, Z, U>> {
        if alpha <= T::zero() {
            return Err(FilterError::InvalidConfiguration(
                "sigma point spread alpha must be positive".into(),
            ));
        }
        let n = T::from_usize(S).unwrap();
        if n + kappa <= T::zero() {
            return Err(FilterError::InvalidConfiguration(
                "kappa must be greater than the negated state dimension".into(),
            ));
        }
        let (mw, cw, gamma) = Self::sigma_weights(alpha, beta, kappa);
        Ok(UnscentedKalmanFilter {
            f,
            h,
            Q,
            R,
            gamma,
            mw,
            cw,
            state: prior,
        })
    }

    fn sigma_weights(alpha: T, beta: T, kappa: T) -> (Vec<T>, Vec<T>, T) {
        let n = T::from_usize(S).unwrap();
        let lambda = alpha.powi(2) * (n + kappa) - n;

        let v = T::one() / ((T::one() + T::one()) * (n + lambda));
        let mut mw = vec![v; 2 * S + 1];
        let mut cw = vec![v; 2 * S + 1];

        // special cases
        let v = lambda / (n + lambda);
        mw[0] = v;
        cw[0] = v + T::one() - alpha.powi(2) + beta;

        let gamma = (n + lambda).sqrt();
        (mw, cw, gamma)
    }

    /// cholesky(P) = L * L^T gives the matrix square root; one jitter retry
    /// covers covariances that drifted marginally indefinite.
    fn generate_sigma_points(&self, state: &GaussianState<T, S>) -> Result<Vec<SVector<T, S>>> {
        let sqrt = match state.P.cholesky() {
            Some(c) => c,
            None => {
                let jitter = SMatrix::<T, S, S>::identity() * T::from_f64(CHOLESKY_JITTER).unwrap();
                (state.P + jitter)
                    .cholesky()
                    .ok_or(FilterError::NonPositiveDefiniteCovariance)?
            }
        };
        let sigma = sqrt.l() * self.gamma;
        let mut sigma_points = vec![state.x; 2 * S + 1];
        for i in 0..S {
            let sigma_column = sigma.column(i);
            sigma_points[i + 1] += sigma_column;
            sigma_points[i + 1 + S] -= sigma_column;
        }
        Ok(sigma_points)
    }

    /// Weighted measurement mean and innovation covariance of the current
    /// estimate's sigma points.
    fn measurement_moments(&self) -> Result<(SVector<T, Z>, SMatrix<T, Z, Z>)> {
        let sigma_points = self.generate_sigma_points(&self.state)?;
        let sp_z: Vec<SVector<T, Z>> = sigma_points.iter().map(|x| (self.h)(x)).collect();
        let mean_z: SVector<T, Z> = sp_z.iter().zip(self.mw.iter()).map(|(z, w)| z * *w).sum();
        let cov_z = sp_z
            .iter()
            .map(|z| z - mean_z)
            .zip(self.cw.iter())
            .map(|(dz, cw)| dz * dz.transpose() * *cw)
            .sum::<SMatrix<T, Z, Z>>()
            + self.R;
        Ok((mean_z, cov_z))
    }
}

impl<T: RealField + Copy, const S: usize, const Z: usize, const U: usize>
    BayesianFilter<T, S, Z, U> for UnscentedKalmanFilter<T, S, Z, U>
{
    fn predict(&mut self, u: Option<&SVector<T, U>>) -> Result<()> {
        let sigma_points = self.generate_sigma_points(&self.state)?;
        let sp_xpred: Vec<SVector<T, S>> = sigma_points.iter().map(|x| (self.f)(x, u)).collect();

        let mean_xpred: SVector<T, S> = sp_xpred
            .iter()
            .zip(self.mw.iter())
            .map(|(x, w)| x * *w)
            .sum();

        let cov_xpred = sp_xpred
            .iter()
            .map(|x| x - mean_xpred)
            .zip(self.cw.iter())
            .map(|(dx, cw)| dx * dx.transpose() * *cw)
            .sum::<SMatrix<T, S, S>>()
            + self.Q;

        self.state.x = mean_xpred;
        self.state.P = cov_xpred;
        self.state.symmetrize();
        if !self.state.is_finite() {
            return Err(FilterError::NonFinite("ukf predict"));
        }
        Ok(())
    }

    fn update(&mut self, z: &SVector<T, Z>) -> Result<()> {
        // fresh sigma points around the prediction
        let sp_xpred = self.generate_sigma_points(&self.state)?;
        let sp_z: Vec<SVector<T, Z>> = sp_xpred.iter().map(|x| (self.h)(x)).collect();

        let mean_z: SVector<T, Z> = sp_z.iter().zip(self.mw.iter()).map(|(z, w)| z * *w).sum();

        let cov_z = sp_z
            .iter()
            .map(|z| z - mean_z)
            .zip(self.cw.iter())
            .map(|(dz, cw)| dz * dz.transpose() * *cw)
            .sum::<SMatrix<T, Z, Z>>()
            + self.R;

        let cross = sp_xpred
            .iter()
            .zip(sp_z.iter().zip(self.cw.iter()))
            .map(|(x_pred, (z_point, cw))| {
                (x_pred - self.state.x) * (z_point - mean_z).transpose() * *cw
            })
            .sum::<SMatrix<T, S, Z>>();

        let cov_z_inv = cov_z
            .try_inverse()
            .ok_or(FilterError::SingularInnovation)?;
        let gain = cross * cov_z_inv;

        self.state.x += gain * (z - mean_z);
        self.state.P -= gain * cov_z * gain.transpose();
        self.state.symmetrize();
        if !self.state.is_finite() {
            return Err(FilterError::NonFinite("ukf update"));
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
        let (mean_z, cov_z) = self.measurement_moments()?;
        let mvn = MultiVariateNormal::new(&mean_z, &cov_z)?;
        Ok(mvn.pdf(z))
    }
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use nalgebra::{Matrix1, Matrix1x2, Matrix2, Vector1, Vector2};

    use crate::error::FilterError;
    use crate::filters::bayesian_filter::BayesianFilter;
    use crate::filters::kalman_filter::KalmanFilter;
    use crate::filters::unscented_kalman_filter::UnscentedKalmanFilter;
    use crate::utils::state::GaussianState;

    fn linear_ukf(alpha: f64) -> UnscentedKalmanFilter<f64, 2, 1, 0> {
        let F = Matrix2::new(1.0, 1.0, 0.0, 1.0);
        let H = Matrix1x2::new(1.0, 0.0);
        UnscentedKalmanFilter::new(
            Box::new(move |x, _u| F * x),
            Box::new(move |x| H * x),
            Matrix2::identity() * 0.01,
            Matrix1::new(0.25),
            alpha,
            2.0,
            0.0,
            GaussianState::new(Vector2::zeros(), Matrix2::identity()),
        )
        .unwrap()
    }

    #[test]
    fn sigma_weights_are_normalized() {
        let (mw, _cw, _gamma) =
            UnscentedKalmanFilter::<f64, 4, 2, 0>::sigma_weights(0.1, 2.0, 0.0);
        assert_eq!(mw.len(), 2 * 4 + 1);
        assert_relative_eq!(mw.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn matches_kalman_filter_on_a_linear_problem() {
        // the unscented transform is exact under linear models, so the
        // recursion reproduces the closed form answer for any spread
        for alpha in [1e-3, 0.1, 1.0] {
            let mut ukf = linear_ukf(alpha);
            let mut kf: KalmanFilter<f64, 2, 1, 0> = KalmanFilter::new(
                Matrix2::new(1.0, 1.0, 0.0, 1.0),
                None,
                Matrix1x2::new(1.0, 0.0),
                Matrix2::identity() * 0.01,
                Matrix1::new(0.25),
                GaussianState::new(Vector2::zeros(), Matrix2::identity()),
            );
            for z in [1.0, 2.1, 2.9, 4.2].map(Vector1::new) {
                kf.predict(None).unwrap();
                ukf.predict(None).unwrap();
                kf.update(&z).unwrap();
                ukf.update(&z).unwrap();
                assert_abs_diff_eq!(kf.estimate().x, ukf.estimate().x, epsilon = 1e-8);
                assert_abs_diff_eq!(kf.estimate().P, ukf.estimate().P, epsilon = 1e-8);
            }
            assert_relative_eq!(ukf.estimate().x[0], 4.049260772847348, epsilon = 1e-6);
        }
    }

    #[test]
    fn jitter_recovers_a_zero_covariance() {
        let mut ukf = linear_ukf(0.1);
        ukf.set_estimate(&GaussianState::new(Vector2::new(1.0, 1.0), Matrix2::zeros()))
            .unwrap();
        ukf.predict(None).unwrap();
        assert!(ukf.estimate().is_finite());
    }

    #[test]
    fn indefinite_covariance_is_fatal() {
        let mut ukf = linear_ukf(0.1);
        ukf.set_estimate(&GaussianState::new(
            Vector2::zeros(),
            Matrix2::identity() * -1.0,
        ))
        .unwrap();
        let err = ukf.predict(None).unwrap_err();
        assert_eq!(err, FilterError::NonPositiveDefiniteCovariance);
    }

    #[test]
    fn rejects_nonpositive_alpha() {
        let err = UnscentedKalmanFilter::<f64, 2, 1, 0>::new(
            Box::new(|x, _u| *x),
            Box::new(|x| Vector1::new(x[0])),
            Matrix2::identity(),
            Matrix1::new(0.25),
            0.0,
            2.0,
            0.0,
            GaussianState::new(Vector2::zeros(), Matrix2::identity()),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::InvalidConfiguration(_)));
    }

    #[test]
    fn tracks_a_range_measurement() {
        let mut ukf: UnscentedKalmanFilter<f64, 2, 1, 0> = UnscentedKalmanFilter::new(
            Box::new(|x, _u| *x),
            Box::new(|x: &Vector2<f64>| Vector1::new((x[0] * x[0] + x[1] * x[1]).sqrt())),
            Matrix2::identity() * 0.01,
            Matrix1::new(0.04),
            0.1,
            2.0,
            0.0,
            GaussianState::new(Vector2::new(3.0, 4.0), Matrix2::identity()),
        )
        .unwrap();
        for z in [5.1, 4.9, 5.05].map(Vector1::new) {
            ukf.predict(None).unwrap();
            ukf.update(&z).unwrap();
            let p = ukf.estimate().P;
            assert_abs_diff_eq!(p, p.transpose(), epsilon = 1e-12);
        }
        let x = ukf.estimate().x;
        assert_relative_eq!((x[0] * x[0] + x[1] * x[1]).sqrt(), 5.0, epsilon = 0.2);
    }
}
