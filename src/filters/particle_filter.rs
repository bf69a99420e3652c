#![allow(non_snake_case)]

use log::warn;
use nalgebra::{RealField, SMatrix, SVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

use crate::error::{FilterError, Result};
use crate::filters::bayesian_filter::BayesianFilter;
use crate::models::{MeasurementFn, NoisyTransitionFn};
use crate::utils::mvn::MultiVariateNormal;
use crate::utils::state::GaussianState;

/// Raw weight sums below this trigger a uniform reset instead of a division.
const WEIGHT_SUM_FLOOR: f64 = 1e-300;

/// When to replace the weighted set by a resampled one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResamplePolicy<T> {
    /// Resample after every update.
    EveryStep,
    /// Resample when the effective sample size drops below this fraction of
    /// the particle count. Must lie in (0, 1].
    EffectiveSampleSize(T),
}

/// Sequential importance resampling filter. The posterior is carried as a
/// weighted particle cloud; `estimate` moment matches it to a Gaussian.
///
/// The filter owns its generator, so runs with equal seeds reproduce the
/// same draws and resampling decisions exactly.
pub struct ParticleFilter<T: RealField, const S: usize, const Z: usize, const U: usize> {
    f: NoisyTransitionFn<T, S, U>,
    h: MeasurementFn<T, S, Z>,
    process_noise: MultiVariateNormal<T, S>,
    innovation_density: MultiVariateNormal<T, Z>,
    particles: Vec<SVector<T, S>>,
    weights: Vec<T>,
    policy: ResamplePolicy<T>,
    rng: StdRng,
}

impl<T: RealField, const S: usize, const Z: usize, const U: usize> std::fmt::Debug
    for ParticleFilter<T, S, Z, U>
{
    /// The model closures carry no printable state and are skipped.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticleFilter")
            .field("process_noise", &self.process_noise)
            .field("innovation_density", &self.innovation_density)
            .field("particles", &self.particles)
            .field("weights", &self.weights)
            .field("policy", &self.policy)
            .field("rng", &self.rng)
            .finish_non_exhaustive()
    }
}

impl<T: RealField + Copy, const S: usize, const Z: usize, const U: usize>
    ParticleFilter<T, S, Z, U>
where
    StandardNormal: Distribution<T>,
{
    /// The initial cloud is drawn from the prior. Q and R must be strictly
    /// positive definite so that noise can be sampled and likelihoods
    /// evaluated.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        f: NoisyTransitionFn<T, S, U>,
        h: MeasurementFn<T, S, Z>,
        Q: SMatrix<T, S, S>,
        R: SMatrix<T, Z, Z>,
        n_particles: usize,
        policy: ResamplePolicy<T>,
        prior: GaussianState<T, S>,
        seed: u64,
    ) -> Result<ParticleFilter<T, S, Z, U>> {
        if n_particles == 0 {
            return Err(FilterError::InvalidConfiguration(
                "particle count must be positive".into(),
            ));
        }
        if let ResamplePolicy::EffectiveSampleSize(fraction) = policy {
            if fraction <= T::zero() || fraction > T::one() {
                return Err(FilterError::InvalidConfiguration(
                    "effective sample size fraction must lie in (0, 1]".into(),
                ));
            }
        }
        let process_noise = MultiVariateNormal::new(&SVector::zeros(), &Q)?;
        let innovation_density = MultiVariateNormal::new(&SVector::zeros(), &R)?;

        let mut rng = StdRng::seed_from_u64(seed);
        let prior_density = MultiVariateNormal::new(&prior.x, &prior.P)?;
        let particles = (0..n_particles)
            .map(|_| prior_density.sample(&mut rng))
            .collect();
        let weights = vec![T::one() / T::from_usize(n_particles).unwrap(); n_particles];

        Ok(ParticleFilter {
            f,
            h,
            process_noise,
            innovation_density,
            particles,
            weights,
            policy,
            rng,
        })
    }

    pub fn particles(&self) -> &[SVector<T, S>] {
        &self.particles
    }

    pub fn weights(&self) -> &[T] {
        &self.weights
    }

    /// 1 / sum of squared weights, between 1 (degenerate) and the particle
    /// count (uniform).
    pub fn effective_sample_size(&self) -> T {
        let sum_sq = self
            .weights
            .iter()
            .fold(T::zero(), |acc, w| acc + *w * *w);
        T::one() / sum_sq
    }

    fn should_resample(&self) -> bool {
        match self.policy {
            ResamplePolicy::EveryStep => true,
            ResamplePolicy::EffectiveSampleSize(fraction) => {
                let n = T::from_usize(self.particles.len()).unwrap();
                self.effective_sample_size() < fraction * n
            }
        }
    }

    fn resample(&mut self) {
        let n = self.particles.len();
        let step = T::one() / T::from_usize(n).unwrap();
        let offset = T::from_f64(self.rng.gen::<f64>()).unwrap() * step;
        let indices = systematic_resample_indices(&self.weights, offset);
        let resampled: Vec<SVector<T, S>> = indices.iter().map(|&i| self.particles[i]).collect();
        self.particles = resampled;
        self.weights.fill(step);
    }

    fn reset_to_uniform_weights(&mut self) {
        let uniform = T::one() / T::from_usize(self.weights.len()).unwrap();
        self.weights.fill(uniform);
    }
}

/// Stratified index selection with one shared offset: stratum k sits at
/// offset + k/N and picks the particle whose cumulative weight covers it.
fn systematic_resample_indices<T: RealField + Copy>(weights: &[T], offset: T) -> Vec<usize> {
    let n = weights.len();
    let step = T::one() / T::from_usize(n).unwrap();
    let mut indices = Vec::with_capacity(n);
    let mut cumulative = weights[0];
    let mut i = 0;
    for k in 0..n {
        let position = offset + step * T::from_usize(k).unwrap();
        while position > cumulative && i + 1 < n {
            i += 1;
            cumulative += weights[i];
        }
        indices.push(i);
    }
    indices
}

impl<T: RealField + Copy, const S: usize, const Z: usize, const U: usize>
    BayesianFilter<T, S, Z, U> for ParticleFilter<T, S, Z, U>
where
    StandardNormal: Distribution<T>,
{
    fn predict(&mut self, u: Option<&SVector<T, U>>) -> Result<()> {
        for particle in self.particles.iter_mut() {
            let noise = self.process_noise.sample(&mut self.rng);
            *particle = (self.f)(particle, u, &noise);
        }
        if !self.particles.iter().all(|p| p.iter().all(|v| v.is_finite())) {
            return Err(FilterError::NonFinite("particle predict"));
        }
        Ok(())
    }

    fn update(&mut self, z: &SVector<T, Z>) -> Result<()> {
        let mut raw_sum = T::zero();
        for (weight, particle) in self.weights.iter_mut().zip(self.particles.iter()) {
            let innovation = z - (self.h)(particle);
            *weight *= self.innovation_density.pdf(&innovation);
            raw_sum += *weight;
        }

        if !raw_sum.is_finite() {
            return Err(FilterError::NonFinite("particle update"));
        }
        if raw_sum < T::from_f64(WEIGHT_SUM_FLOOR).unwrap() {
            warn!("particle weights collapsed, resetting to uniform");
            self.reset_to_uniform_weights();
        } else {
            for weight in self.weights.iter_mut() {
                *weight /= raw_sum;
            }
        }

        if self.should_resample() {
            self.resample();
        }
        Ok(())
    }

    fn estimate(&self) -> GaussianState<T, S> {
        let mean: SVector<T, S> = self
            .particles
            .iter()
            .zip(self.weights.iter())
            .map(|(p, w)| p * *w)
            .sum();
        let covariance: SMatrix<T, S, S> = self
            .particles
            .iter()
            .zip(self.weights.iter())
            .map(|(p, w)| {
                let dx = p - mean;
                dx * dx.transpose() * *w
            })
            .sum();
        GaussianState::new(mean, covariance)
    }

    /// Redraws the whole cloud from the given Gaussian.
    fn set_estimate(&mut self, estimate: &GaussianState<T, S>) -> Result<()> {
        let density = MultiVariateNormal::new(&estimate.x, &estimate.P)?;
        for particle in self.particles.iter_mut() {
            *particle = density.sample(&mut self.rng);
        }
        self.reset_to_uniform_weights();
        Ok(())
    }

    /// Weighted average of per particle observation likelihoods.
    fn measurement_likelihood(&self, z: &SVector<T, Z>) -> Result<T> {
        let likelihood = self
            .particles
            .iter()
            .zip(self.weights.iter())
            .fold(T::zero(), |acc, (p, w)| {
                let innovation = z - (self.h)(p);
                acc + *w * self.innovation_density.pdf(&innovation)
            });
        Ok(likelihood)
    }
}
