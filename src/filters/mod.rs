pub mod bayesian_filter;
pub mod extended_kalman_filter;
pub mod gaussian_mixture_phd;
pub mod interacting_multiple_model;
pub mod kalman_filter;
pub mod particle_filter;
pub mod unscented_kalman_filter;
