//! Canonical filter configurations for the benchmark state layout: a 4-D
//! constant velocity state observed through 2-D position measurements.

use nalgebra::{DMatrix, DVector, Matrix2, Matrix4, Vector4};

use crate::benchmark::trajectory::Trajectory;
use crate::error::Result;
use crate::filters::bayesian_filter::BayesianFilter;
use crate::filters::extended_kalman_filter::ExtendedKalmanFilter;
use crate::filters::interacting_multiple_model::InteractingMultipleModel;
use crate::filters::kalman_filter::KalmanFilter;
use crate::filters::particle_filter::{ParticleFilter, ResamplePolicy};
use crate::filters::unscented_kalman_filter::UnscentedKalmanFilter;
use crate::models::measurement::{
    position_measurement, position_measurement_jacobian, position_measurement_matrix,
};
use crate::models::motion::{
    constant_velocity_jacobian, constant_velocity_matrix, constant_velocity_noisy_transition,
    constant_velocity_transition, coordinated_turn_matrix,
};

const PROCESS_NOISE: f64 = 0.08;
const MEASUREMENT_NOISE: f64 = 0.25;

const PF_PARTICLES: usize = 300;
const PF_ESS_FRACTION: f64 = 0.5;

const IMM_TURN_RATE: f64 = 0.15;
const IMM_CRUISE_PROCESS_NOISE: f64 = 0.01;
const IMM_TURN_PROCESS_NOISE: f64 = 0.05;
const IMM_STAY_PROBABILITY: f64 = 0.9;

/// Filters the benchmark drives, type erased over the concrete algorithm.
pub type DynFilter = Box<dyn BayesianFilter<f64, 4, 2, 0>>;

/// A named recipe for building a fresh filter on a trajectory. The seed
/// only matters for stochastic filters; deterministic ones ignore it.
pub struct FilterFactory {
    pub name: String,
    constructor: Box<dyn Fn(&Trajectory, u64) -> Result<DynFilter> + Send + Sync>,
}

impl FilterFactory {
    pub fn new<F>(name: impl Into<String>, constructor: F) -> FilterFactory
    where
        F: Fn(&Trajectory, u64) -> Result<DynFilter> + Send + Sync + 'static,
    {
        FilterFactory {
            name: name.into(),
            constructor: Box::new(constructor),
        }
    }

    pub fn build(&self, trajectory: &Trajectory, seed: u64) -> Result<DynFilter> {
        (self.constructor)(trajectory, seed)
    }
}

fn process_noise() -> Matrix4<f64> {
    Matrix4::identity() * PROCESS_NOISE
}

fn particle_process_noise() -> Matrix4<f64> {
    Matrix4::from_diagonal(&Vector4::new(0.02, 0.02, 0.04, 0.04))
}

fn measurement_noise() -> Matrix2<f64> {
    Matrix2::identity() * MEASUREMENT_NOISE
}

/// Linear Kalman filter on the CV model.
pub fn kalman_factory() -> FilterFactory {
    FilterFactory::new("KF", |trajectory, _seed| {
        let filter: DynFilter = Box::new(KalmanFilter::new(
            constant_velocity_matrix(trajectory.dt),
            None,
            position_measurement_matrix(),
            process_noise(),
            measurement_noise(),
            trajectory.prior,
        ));
        Ok(filter)
    })
}

/// EKF over the CV closures. Linearization is exact here, so it should
/// shadow the KF; regressions show up as daylight between the two.
pub fn extended_kalman_factory() -> FilterFactory {
    FilterFactory::new("EKF", |trajectory, _seed| {
        let filter: DynFilter = Box::new(ExtendedKalmanFilter::new(
            constant_velocity_transition(trajectory.dt),
            constant_velocity_jacobian(trajectory.dt),
            position_measurement(),
            position_measurement_jacobian(),
            process_noise(),
            measurement_noise(),
            trajectory.prior,
        ));
        Ok(filter)
    })
}

/// UKF with the standard Gaussian scaling (alpha 0.1, beta 2, kappa 0).
pub fn unscented_kalman_factory() -> FilterFactory {
    FilterFactory::new("UKF", |trajectory, _seed| {
        let filter: DynFilter = Box::new(UnscentedKalmanFilter::new(
            constant_velocity_transition(trajectory.dt),
            position_measurement(),
            process_noise(),
            measurement_noise(),
            0.1,
            2.0,
            0.0,
            trajectory.prior,
        )?);
        Ok(filter)
    })
}

/// SIR particle filter with reduced process noise and ESS/2 resampling.
pub fn particle_factory() -> FilterFactory {
    FilterFactory::new("PF", |trajectory, seed| {
        let filter: DynFilter = Box::new(ParticleFilter::new(
            constant_velocity_noisy_transition(trajectory.dt),
            position_measurement(),
            particle_process_noise(),
            measurement_noise(),
            PF_PARTICLES,
            ResamplePolicy::EffectiveSampleSize(PF_ESS_FRACTION),
            trajectory.prior,
            seed,
        )?);
        Ok(filter)
    })
}

/// IMM over a cruise model and two opposite coordinated turns, with a
/// slightly sticky mode transition matrix.
pub fn imm_factory() -> FilterFactory {
    FilterFactory::new("IMM", |trajectory, _seed| {
        let models = [
            (0.0, IMM_CRUISE_PROCESS_NOISE),
            (IMM_TURN_RATE, IMM_TURN_PROCESS_NOISE),
            (-IMM_TURN_RATE, IMM_TURN_PROCESS_NOISE),
        ];
        let mut bank: Vec<DynFilter> = Vec::with_capacity(models.len());
        for (rate, q) in models {
            bank.push(Box::new(KalmanFilter::new(
                coordinated_turn_matrix(rate, trajectory.dt),
                None,
                position_measurement_matrix(),
                Matrix4::identity() * q,
                measurement_noise(),
                trajectory.prior,
            )));
        }
        let m = bank.len();
        let hop = (1.0 - IMM_STAY_PROBABILITY) / (m - 1) as f64;
        let transition =
            DMatrix::from_fn(m, m, |i, j| if i == j { IMM_STAY_PROBABILITY } else { hop });
        let initial = DVector::from_element(m, 1.0 / m as f64);
        let filter: DynFilter =
            Box::new(InteractingMultipleModel::new(bank, transition, initial)?);
        Ok(filter)
    })
}

/// The four filters the corpus compares, in reporting order.
pub fn standard_factories() -> Vec<FilterFactory> {
    vec![
        kalman_factory(),
        extended_kalman_factory(),
        unscented_kalman_factory(),
        particle_factory(),
    ]
}
