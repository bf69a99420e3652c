//! Ground truth container shared by the generators, the runner and the
//! sweep.

use nalgebra::{Matrix4, Vector2, Vector4};

use crate::error::{FilterError, Result};
use crate::utils::state::GaussianState;

/// One synthetic run: a name, the sampling interval, the prior handed to
/// filters, and aligned truth/measurement sequences.
///
/// `states[k]` is the true state observed by `measurements[k]`, so filter
/// estimates score against truth index for index. The initial state lives
/// in `prior` and is not part of `states`.
#[derive(Debug, Clone)]
pub struct Trajectory {
    pub name: String,
    pub dt: f64,
    pub prior: GaussianState<f64, 4>,
    pub states: Vec<Vector4<f64>>,
    pub measurements: Vec<Vector2<f64>>,
}

impl Trajectory {
    pub fn new(
        name: impl Into<String>,
        dt: f64,
        prior: GaussianState<f64, 4>,
        states: Vec<Vector4<f64>>,
        measurements: Vec<Vector2<f64>>,
    ) -> Result<Trajectory> {
        if dt <= 0.0 {
            return Err(FilterError::InvalidConfiguration(format!(
                "sampling interval must be positive, got {dt}"
            )));
        }
        if states.is_empty() {
            return Err(FilterError::InvalidConfiguration(
                "trajectory needs at least one step".to_string(),
            ));
        }
        if states.len() != measurements.len() {
            return Err(FilterError::InvalidConfiguration(format!(
                "{} states but {} measurements",
                states.len(),
                measurements.len()
            )));
        }
        Ok(Trajectory { name: name.into(), dt, prior, states, measurements })
    }

    /// Number of steps (truth/measurement pairs).
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Identity-covariance prior centered on `x0`.
    pub fn prior_at(x0: Vector4<f64>) -> GaussianState<f64, 4> {
        GaussianState::new(x0, Matrix4::identity())
    }
}
