//! End to end evaluation: synthetic trajectories, canonical filter
//! configurations, corpus scoring, and the turn-rate sweep.

pub mod configs;
pub mod runner;
pub mod sweep;
pub mod synthetic;
pub mod trajectory;
