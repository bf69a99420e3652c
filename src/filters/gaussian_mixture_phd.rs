#![allow(non_snake_case)]

use std::cmp::Ordering;

use nalgebra::{RealField, SMatrix, SVector};

use crate::error::{FilterError, Result};
use crate::utils::joseph_form;
use crate::utils::mvn::MultiVariateNormal;
use crate::utils::state::GaussianState;

/// One weighted component of the intensity mixture.
#[derive(Debug, Clone, Copy)]
pub struct GaussianComponent<T: RealField, const D: usize> {
    pub weight: T,
    pub state: GaussianState<T, D>,
}

impl<T: RealField + Copy, const D: usize> GaussianComponent<T, D> {
    pub fn new(weight: T, x: SVector<T, D>, P: SMatrix<T, D, D>) -> GaussianComponent<T, D> {
        GaussianComponent {
            weight,
            state: GaussianState::new(x, P),
        }
    }
}

/// Scene and mixture maintenance parameters.
#[derive(Debug, Clone, Copy)]
pub struct PhdConfig<T> {
    /// Probability that a target survives one step.
    pub survival_probability: T,
    /// Probability that a present target generates a measurement.
    pub detection_probability: T,
    /// Clutter density at a measurement, in targets per unit volume.
    pub clutter_intensity: T,
    /// Components lighter than this are discarded.
    pub prune_threshold: T,
    /// Squared Mahalanobis radius inside which components merge.
    pub merge_threshold: T,
    /// Hard cap on mixture size, heaviest components kept.
    pub max_components: usize,
    /// Components heavier than this count as reported targets.
    pub extraction_threshold: T,
}

impl<T: RealField + Copy> PhdConfig<T> {
    /// Scene probabilities with the usual mixture maintenance settings:
    /// prune at 1e-5, merge inside 4.0, cap at 100, report above 0.5.
    pub fn new(
        survival_probability: T,
        detection_probability: T,
        clutter_intensity: T,
    ) -> PhdConfig<T> {
        PhdConfig {
            survival_probability,
            detection_probability,
            clutter_intensity,
            prune_threshold: T::from_f64(1e-5).unwrap(),
            merge_threshold: T::from_f64(4.0).unwrap(),
            max_components: 100,
            extraction_threshold: T::from_f64(0.5).unwrap(),
        }
    }

    fn validate(&self) -> Result<()> {
        let unit = T::zero()..=T::one();
        if !unit.contains(&self.survival_probability) {
            return Err(FilterError::InvalidConfiguration(
                "survival probability must lie in [0, 1]".into(),
            ));
        }
        if !unit.contains(&self.detection_probability) {
            return Err(FilterError::InvalidConfiguration(
                "detection probability must lie in [0, 1]".into(),
            ));
        }
        if self.clutter_intensity < T::zero() {
            return Err(FilterError::InvalidConfiguration(
                "clutter intensity must be non negative".into(),
            ));
        }
        if self.prune_threshold < T::zero() || self.merge_threshold <= T::zero() {
            return Err(FilterError::InvalidConfiguration(
                "pruning thresholds out of range".into(),
            ));
        }
        if self.max_components == 0 {
            return Err(FilterError::InvalidConfiguration(
                "component cap must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Extracted multi target summary after one update.
#[derive(Debug, Clone)]
pub struct PhdEstimate<T: RealField, const D: usize> {
    /// Expected target count, the total mixture weight.
    pub cardinality: T,
    /// Reported target states.
    pub states: Vec<SVector<T, D>>,
}

/// Gaussian mixture probability hypothesis density filter over a linear
/// motion and observation model.
///
/// The mixture approximates the first moment of the multi target posterior:
/// its integral over a region is the expected number of targets there, so
/// weights need not sum to one. `update` consumes a whole measurement set,
/// which keeps this filter beside `BayesianFilter` rather than behind it.
#[derive(Debug)]
pub struct GaussianMixturePhd<T: RealField, const D: usize, const Z: usize> {
    F: SMatrix<T, D, D>,
    Q: SMatrix<T, D, D>,
    H: SMatrix<T, Z, D>,
    R: SMatrix<T, Z, Z>,
    config: PhdConfig<T>,
    births: Vec<GaussianComponent<T, D>>,
    components: Vec<GaussianComponent<T, D>>,
}

impl<T: RealField + Copy, const D: usize, const Z: usize> GaussianMixturePhd<T, D, Z> {
    /// The filter starts empty; `births` are appended by every `predict`.
    pub fn new(
        F: SMatrix<T, D, D>,
        Q: SMatrix<T, D, D>,
        H: SMatrix<T, Z, D>,
        R: SMatrix<T, Z, Z>,
        births: Vec<GaussianComponent<T, D>>,
        config: PhdConfig<T>,
    ) -> Result<GaussianMixturePhd<T, D, Z>> {
        config.validate()?;
        Ok(GaussianMixturePhd {
            F,
            Q,
            H,
            R,
            config,
            births,
            components: Vec::new(),
        })
    }

    pub fn components(&self) -> &[GaussianComponent<T, D>] {
        &self.components
    }

    /// Expected number of targets, the total mixture weight.
    pub fn cardinality(&self) -> T {
        self.components
            .iter()
            .fold(T::zero(), |acc, c| acc + c.weight)
    }

    /// Survival discounted propagation of every component, then the birth
    /// components are appended unmodified.
    pub fn predict(&mut self) {
        for component in self.components.iter_mut() {
            component.weight *= self.config.survival_probability;
            component.state.x = self.F * component.state.x;
            component.state.P = self.F * component.state.P * self.F.transpose() + self.Q;
        }
        self.components.extend(self.births.iter().copied());
    }

    /// Folds a measurement set into the mixture. Every prior component keeps
    /// a missed detection copy; every (measurement, component) pair yields a
    /// detection candidate normalized against clutter plus the competing
    /// candidates for the same measurement. The refreshed mixture is pruned
    /// and merged before returning.
    pub fn update(&mut self, measurements: &[SVector<T, Z>]) -> Result<()> {
        let pd = self.config.detection_probability;
        let missed_factor = T::one() - pd;

        let mut predicted_z = Vec::with_capacity(self.components.len());
        let mut gains = Vec::with_capacity(self.components.len());
        let mut updated_P = Vec::with_capacity(self.components.len());
        let mut densities = Vec::with_capacity(self.components.len());
        for component in self.components.iter() {
            let z_pred = self.H * component.state.x;
            let s = self.H * component.state.P * self.H.transpose() + self.R;
            let s_inv = s.try_inverse().ok_or(FilterError::SingularInnovation)?;
            let gain = component.state.P * self.H.transpose() * s_inv;
            predicted_z.push(z_pred);
            updated_P.push(joseph_form(&component.state.P, &gain, &self.H, &self.R));
            gains.push(gain);
            densities.push(MultiVariateNormal::new(&z_pred, &s)?);
        }

        let mut updated =
            Vec::with_capacity(self.components.len() * (measurements.len() + 1));
        for component in self.components.iter() {
            updated.push(GaussianComponent {
                weight: component.weight * missed_factor,
                state: component.state,
            });
        }

        for z in measurements {
            let group_start = updated.len();
            let mut detection_sum = T::zero();
            for (i, component) in self.components.iter().enumerate() {
                let weight = pd * component.weight * densities[i].pdf(z);
                detection_sum += weight;
                let mean = component.state.x + gains[i] * (z - predicted_z[i]);
                updated.push(GaussianComponent {
                    weight,
                    state: GaussianState::new(mean, updated_P[i]),
                });
            }
            let denominator = self.config.clutter_intensity + detection_sum;
            if denominator > T::zero() {
                for candidate in updated[group_start..].iter_mut() {
                    candidate.weight /= denominator;
                }
            }
        }

        self.components = updated;
        self.prune_and_merge();
        Ok(())
    }

    /// Discards light components, greedily merges neighborhoods around the
    /// heaviest survivors, and caps the mixture size.
    pub fn prune_and_merge(&mut self) {
        let mut survivors: Vec<GaussianComponent<T, D>> = self
            .components
            .drain(..)
            .filter(|c| c.weight >= self.config.prune_threshold)
            .collect();

        let mut merged = Vec::with_capacity(survivors.len());
        while !survivors.is_empty() {
            let heaviest = survivors
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| {
                    a.weight.partial_cmp(&b.weight).unwrap_or(Ordering::Equal)
                })
                .map(|(i, _)| i)
                .unwrap();
            let absorbing = survivors.swap_remove(heaviest);

            // distance is measured in the absorbing component's metric
            let Some(precision) = absorbing.state.P.try_inverse() else {
                merged.push(absorbing);
                continue;
            };

            let mut cluster = vec![absorbing];
            let mut rest = Vec::with_capacity(survivors.len());
            for component in survivors.drain(..) {
                let dx = component.state.x - absorbing.state.x;
                let distance = (dx.transpose() * precision * dx)[(0, 0)];
                if distance <= self.config.merge_threshold {
                    cluster.push(component);
                } else {
                    rest.push(component);
                }
            }
            survivors = rest;
            merged.push(merge_cluster(&cluster));
        }

        if merged.len() > self.config.max_components {
            merged.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal));
            merged.truncate(self.config.max_components);
        }
        self.components = merged;
    }

    /// Means of components heavy enough to report; a component whose weight
    /// rounds to k > 1 stands for k coincident targets.
    pub fn extract_states(&self) -> Vec<SVector<T, D>> {
        let mut states = Vec::new();
        for component in self.components.iter() {
            if component.weight > self.config.extraction_threshold {
                let mut copies = component.weight.round().max(T::one());
                while copies > T::zero() {
                    states.push(component.state.x);
                    copies -= T::one();
                }
            }
        }
        states
    }

    /// One predict + update per measurement set, reporting the extracted
    /// targets after each step.
    pub fn run(&mut self, measurement_sets: &[Vec<SVector<T, Z>>]) -> Result<Vec<PhdEstimate<T, D>>> {
        let mut estimates = Vec::with_capacity(measurement_sets.len());
        for set in measurement_sets {
            self.predict();
            self.update(set)?;
            estimates.push(PhdEstimate {
                cardinality: self.cardinality(),
                states: self.extract_states(),
            });
        }
        Ok(estimates)
    }
}

/// Moment match of a cluster into a single component carrying its total
/// weight.
fn merge_cluster<T: RealField + Copy, const D: usize>(
    cluster: &[GaussianComponent<T, D>],
) -> GaussianComponent<T, D> {
    let total = cluster.iter().fold(T::zero(), |acc, c| acc + c.weight);
    if total <= T::zero() {
        return cluster[0];
    }
    let mut mean = SVector::<T, D>::zeros();
    for component in cluster {
        mean += component.state.x * (component.weight / total);
    }
    let mut covariance = SMatrix::<T, D, D>::zeros();
    for component in cluster {
        let dx = component.state.x - mean;
        covariance += (component.state.P + dx * dx.transpose()) * (component.weight / total);
    }
    let mut state = GaussianState::new(mean, covariance);
    state.symmetrize();
    GaussianComponent {
        weight: total,
        state,
    }
}
