use nalgebra::{RealField, SVector};

use crate::error::{FilterError, Result};
use crate::utils::state::GaussianState;

/// Recursion contract shared by the single target filters.
///
/// S: state size, Z: measurement size, U: control size. `predict` and
/// `update` alternate strictly; the filter does not police the ordering.
pub trait BayesianFilter<T: RealField + Copy, const S: usize, const Z: usize, const U: usize> {
    /// Propagate the estimate one step forward.
    fn predict(&mut self, u: Option<&SVector<T, U>>) -> Result<()>;

    /// Fold one measurement into the predicted estimate.
    fn update(&mut self, z: &SVector<T, Z>) -> Result<()>;

    /// Current estimate as a Gaussian (moment matched for sampling filters).
    fn estimate(&self) -> GaussianState<T, S>;

    /// Overwrite the current estimate, e.g. with a mixed prior before a
    /// prediction step.
    fn set_estimate(&mut self, estimate: &GaussianState<T, S>) -> Result<()>;

    /// Density of `z` under the predicted measurement distribution of the
    /// current estimate. Meaningful between `predict` and `update`.
    fn measurement_likelihood(&self, z: &SVector<T, Z>) -> Result<T>;

    /// One predict + update cycle per measurement.
    fn run(&mut self, measurements: &[SVector<T, Z>]) -> Result<FilterHistory<T, S>> {
        let mut history = FilterHistory::with_capacity(measurements.len());
        for z in measurements {
            self.predict(None)?;
            history.predictions.push(self.estimate());
            self.update(z)?;
            history.posteriors.push(self.estimate());
        }
        Ok(history)
    }

    /// `run` with one control input paired with each measurement.
    fn run_controlled(
        &mut self,
        measurements: &[SVector<T, Z>],
        controls: &[SVector<T, U>],
    ) -> Result<FilterHistory<T, S>> {
        if measurements.len() != controls.len() {
            return Err(FilterError::InvalidConfiguration(format!(
                "{} measurements paired with {} controls",
                measurements.len(),
                controls.len()
            )));
        }
        let mut history = FilterHistory::with_capacity(measurements.len());
        for (z, u) in measurements.iter().zip(controls.iter()) {
            self.predict(Some(u))?;
            history.predictions.push(self.estimate());
            self.update(z)?;
            history.posteriors.push(self.estimate());
        }
        Ok(history)
    }
}

/// Per step estimates collected by `run`, prediction and posterior phases
/// kept separate.
#[derive(Debug, Clone)]
pub struct FilterHistory<T: RealField, const S: usize> {
    /// Estimate after each `predict`, before the paired `update`.
    pub predictions: Vec<GaussianState<T, S>>,
    /// Estimate after each `update`.
    pub posteriors: Vec<GaussianState<T, S>>,
}

impl<T: RealField + Copy, const S: usize> FilterHistory<T, S> {
    pub fn with_capacity(n: usize) -> FilterHistory<T, S> {
        FilterHistory {
            predictions: Vec::with_capacity(n),
            posteriors: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.posteriors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posteriors.is_empty()
    }

    /// Posterior means in step order.
    pub fn posterior_means(&self) -> Vec<SVector<T, S>> {
        self.posteriors.iter().map(|s| s.x).collect()
    }
}

impl<T: RealField + Copy, const S: usize> Default for FilterHistory<T, S> {
    fn default() -> Self {
        FilterHistory::with_capacity(0)
    }
}
