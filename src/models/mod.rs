pub mod measurement;
pub mod motion;

use nalgebra::{SMatrix, SVector};

/// State transition x' = f(x, u). The sampling interval is captured by the
/// closure, not threaded through filter calls.
pub type TransitionFn<T, const S: usize, const U: usize> =
    Box<dyn Fn(&SVector<T, S>, Option<&SVector<T, U>>) -> SVector<T, S> + Send + Sync>;

/// Jacobian of the transition with respect to the state, evaluated at (x, u).
pub type TransitionJacobianFn<T, const S: usize, const U: usize> =
    Box<dyn Fn(&SVector<T, S>, Option<&SVector<T, U>>) -> SMatrix<T, S, S> + Send + Sync>;

/// Transition with an explicit process noise draw, x' = f(x, u, w).
pub type NoisyTransitionFn<T, const S: usize, const U: usize> = Box<
    dyn Fn(&SVector<T, S>, Option<&SVector<T, U>>, &SVector<T, S>) -> SVector<T, S> + Send + Sync,
>;

/// Measurement prediction z = h(x).
pub type MeasurementFn<T, const S: usize, const Z: usize> =
    Box<dyn Fn(&SVector<T, S>) -> SVector<T, Z> + Send + Sync>;

/// Jacobian of the measurement with respect to the state.
pub type MeasurementJacobianFn<T, const S: usize, const Z: usize> =
    Box<dyn Fn(&SVector<T, S>) -> SMatrix<T, Z, S> + Send + Sync>;
