#![allow(non_snake_case)]

use nalgebra::Matrix4;

use crate::models::{NoisyTransitionFn, TransitionFn, TransitionJacobianFn};

/// Turn rates below this integrate as straight-line motion.
const STRAIGHT_LINE_RATE: f64 = 1e-9;

/// Constant velocity dynamics, state [x, y, vx, vy]
///
/// x_{t+1} = x_t + vx * dt
///
/// y_{t+1} = y_t + vy * dt
///
/// vx_{t+1} = vx_t
///
/// vy_{t+1} = vy_t
pub fn constant_velocity_matrix(dt: f64) -> Matrix4<f64> {
    #[allow(clippy::deprecated_cfg_attr)]
    #[cfg_attr(rustfmt, rustfmt_skip)]
    let F = Matrix4::new(
        1., 0., dt, 0.,
        0., 1., 0., dt,
        0., 0., 1., 0.,
        0., 0., 0., 1.,
    );
    F
}

pub fn constant_velocity_transition(dt: f64) -> TransitionFn<f64, 4, 0> {
    let F = constant_velocity_matrix(dt);
    Box::new(move |x, _u| F * x)
}

pub fn constant_velocity_jacobian(dt: f64) -> TransitionJacobianFn<f64, 4, 0> {
    let F = constant_velocity_matrix(dt);
    Box::new(move |_x, _u| F)
}

/// Constant velocity step with an additive process noise draw, for sampling
/// filters.
pub fn constant_velocity_noisy_transition(dt: f64) -> NoisyTransitionFn<f64, 4, 0> {
    let F = constant_velocity_matrix(dt);
    Box::new(move |x, _u, noise| F * x + noise)
}

/// Coordinated turn at a fixed rate omega, state [x, y, vx, vy].
///
/// Exact integration over one step: the velocity rotates by omega * dt while
/// the position follows the arc. Falls back to constant velocity as omega
/// approaches zero.
pub fn coordinated_turn_matrix(omega: f64, dt: f64) -> Matrix4<f64> {
    if omega.abs() < STRAIGHT_LINE_RATE {
        return constant_velocity_matrix(dt);
    }
    let (swt, cwt) = (omega * dt).sin_cos();
    #[allow(clippy::deprecated_cfg_attr)]
    #[cfg_attr(rustfmt, rustfmt_skip)]
    let F = Matrix4::new(
        1., 0., swt / omega,        -(1. - cwt) / omega,
        0., 1., (1. - cwt) / omega,  swt / omega,
        0., 0., cwt,                -swt,
        0., 0., swt,                 cwt,
    );
    F
}

pub fn coordinated_turn_transition(omega: f64, dt: f64) -> TransitionFn<f64, 4, 0> {
    let F = coordinated_turn_matrix(omega, dt);
    Box::new(move |x, _u| F * x)
}

pub fn coordinated_turn_jacobian(omega: f64, dt: f64) -> TransitionJacobianFn<f64, 4, 0> {
    let F = coordinated_turn_matrix(omega, dt);
    Box::new(move |_x, _u| F)
}
