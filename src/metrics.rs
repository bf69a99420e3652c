//! Accuracy, consistency, and timing scores for filter output against
//! ground truth.
//!
//! Position metrics read the first two state components, the `[x, y, ...]`
//! layout used throughout the benchmark layer. Sequences are compared
//! elementwise and extra trailing entries are ignored.

use std::time::Instant;

use nalgebra::SVector;

use crate::utils::state::GaussianState;

/// Euclidean position error at every step.
pub fn per_step_position_errors<const S: usize>(
    estimates: &[SVector<f64, S>],
    truths: &[SVector<f64, S>],
) -> Vec<f64> {
    estimates
        .iter()
        .zip(truths.iter())
        .map(|(estimate, truth)| (estimate.fixed_rows::<2>(0) - truth.fixed_rows::<2>(0)).norm())
        .collect()
}

/// Root mean square position error. NaN for empty input.
pub fn position_rmse<const S: usize>(
    estimates: &[SVector<f64, S>],
    truths: &[SVector<f64, S>],
) -> f64 {
    let errors = per_step_position_errors(estimates, truths);
    if errors.is_empty() {
        return f64::NAN;
    }
    let mean_sq = errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64;
    mean_sq.sqrt()
}

/// Mean absolute position error. NaN for empty input.
pub fn position_mae<const S: usize>(
    estimates: &[SVector<f64, S>],
    truths: &[SVector<f64, S>],
) -> f64 {
    let errors = per_step_position_errors(estimates, truths);
    if errors.is_empty() {
        return f64::NAN;
    }
    errors.iter().sum::<f64>() / errors.len() as f64
}

/// Normalized estimation error squared per step, over the full state.
///
/// A consistent filter averages to the state dimension. Steps whose
/// covariance cannot be inverted yield NaN.
pub fn nees<const S: usize>(
    estimates: &[GaussianState<f64, S>],
    truths: &[SVector<f64, S>],
) -> Vec<f64> {
    estimates
        .iter()
        .zip(truths.iter())
        .map(|(estimate, truth)| match estimate.P.try_inverse() {
            Some(precision) => {
                let error = estimate.x - truth;
                (error.transpose() * precision * error)[(0, 0)]
            }
            None => f64::NAN,
        })
        .collect()
}

/// Mean NEES with NaN steps excluded. NaN when nothing is left.
pub fn mean_nees<const S: usize>(
    estimates: &[GaussianState<f64, S>],
    truths: &[SVector<f64, S>],
) -> f64 {
    let values = nees(estimates, truths);
    let finite: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite.iter().sum::<f64>() / finite.len() as f64
}

/// Wall clock mean and standard deviation over repeated executions of
/// `run`, in seconds.
pub fn computation_time<F: FnMut()>(mut run: F, n_runs: usize) -> (f64, f64) {
    if n_runs == 0 {
        return (f64::NAN, f64::NAN);
    }
    let mut times = Vec::with_capacity(n_runs);
    for _ in 0..n_runs {
        let start = Instant::now();
        run();
        times.push(start.elapsed().as_secs_f64());
    }
    let mean = times.iter().sum::<f64>() / times.len() as f64;
    let variance = times.iter().map(|t| (t - mean) * (t - mean)).sum::<f64>() / times.len() as f64;
    (mean, variance.sqrt())
}
