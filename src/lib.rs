//! Recursive Bayesian state estimation: Kalman style filters, a particle
//! filter, and multi model / multi target compositions, plus a seeded
//! benchmark harness for comparing them on synthetic tracking problems.

pub mod benchmark;
pub mod error;
pub mod filters;
pub mod metrics;
pub mod models;
pub mod utils;

pub use crate::error::{FilterError, Result};
pub use crate::filters::bayesian_filter::{BayesianFilter, FilterHistory};
pub use crate::filters::extended_kalman_filter::ExtendedKalmanFilter;
pub use crate::filters::gaussian_mixture_phd::{
    GaussianComponent, GaussianMixturePhd, PhdConfig, PhdEstimate,
};
pub use crate::filters::interacting_multiple_model::InteractingMultipleModel;
pub use crate::filters::kalman_filter::KalmanFilter;
pub use crate::filters::particle_filter::{ParticleFilter, ResamplePolicy};
pub use crate::filters::unscented_kalman_filter::UnscentedKalmanFilter;
pub use crate::utils::mvn::MultiVariateNormal;
pub use crate::utils::state::GaussianState;
