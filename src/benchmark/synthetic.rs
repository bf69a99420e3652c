//! Seeded trajectory generators and the benchmark corpus.
//!
//! Four motion regimes stress different filter assumptions: `linear` is the
//! friendly case, `pedestrian` adds random heading changes, `coordinated_turn`
//! follows an exact constant turn, and `sharp_turn` switches heading by 90
//! degrees at fixed intervals. All generators are deterministic for a given
//! seed.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_6};

use nalgebra::{Vector2, Vector4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson, StandardNormal};

use crate::benchmark::trajectory::Trajectory;
use crate::error::{FilterError, Result};
use crate::models::motion::{constant_velocity_matrix, coordinated_turn_matrix};

const LINEAR_VELOCITY: (f64, f64) = (0.5, 0.3);
const LINEAR_PROCESS_STD: f64 = 0.1;

const PEDESTRIAN_SPEED: f64 = 1.0;
const PEDESTRIAN_TURN_PROBABILITY: f64 = 0.1;
const PEDESTRIAN_TURN_ANGLE_STD: f64 = FRAC_PI_6;
const PEDESTRIAN_PROCESS_STD: f64 = 0.15;

const TURN_SPEED: f64 = 1.0;
const TURN_PROCESS_STD: f64 = 0.1;

const SHARP_TURN_SPEED: f64 = 0.8;
const SHARP_TURN_PROCESS_STD: f64 = 0.05;
const SHARP_TURN_INTERVAL: usize = 15;

const CORPUS_STEPS: usize = 60;
const CORPUS_DT: f64 = 0.5;
const CORPUS_MEASUREMENT_STD: f64 = 0.5;

fn gaussian(rng: &mut StdRng, std: f64) -> f64 {
    let draw: f64 = StandardNormal.sample(rng);
    draw * std
}

fn gaussian2(rng: &mut StdRng, std: f64) -> Vector2<f64> {
    Vector2::new(gaussian(rng, std), gaussian(rng, std))
}

fn rotated(v: Vector2<f64>, angle: f64) -> Vector2<f64> {
    let (s, c) = angle.sin_cos();
    Vector2::new(c * v.x - s * v.y, s * v.x + c * v.y)
}

/// Constant velocity motion with small acceleration noise.
pub fn linear_trajectory(
    name: &str,
    n_steps: usize,
    dt: f64,
    measurement_noise_std: f64,
    seed: u64,
) -> Result<Trajectory> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut position = Vector2::zeros();
    let mut velocity = Vector2::new(LINEAR_VELOCITY.0, LINEAR_VELOCITY.1);
    let prior = Trajectory::prior_at(Vector4::new(0.0, 0.0, velocity.x, velocity.y));

    let mut states = Vec::with_capacity(n_steps);
    let mut measurements = Vec::with_capacity(n_steps);
    for _ in 0..n_steps {
        let accel = gaussian2(&mut rng, LINEAR_PROCESS_STD);
        position += velocity * dt;
        velocity += accel * dt;
        states.push(Vector4::new(position.x, position.y, velocity.x, velocity.y));
        measurements.push(position + gaussian2(&mut rng, measurement_noise_std));
    }
    Trajectory::new(name, dt, prior, states, measurements)
}

/// Mostly straight walking with occasional random heading changes.
pub fn pedestrian_trajectory(
    name: &str,
    n_steps: usize,
    dt: f64,
    measurement_noise_std: f64,
    seed: u64,
) -> Result<Trajectory> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut position = Vector2::zeros();
    let mut velocity = Vector2::new(PEDESTRIAN_SPEED, 0.0);
    let prior = Trajectory::prior_at(Vector4::new(0.0, 0.0, velocity.x, velocity.y));

    let mut states = Vec::with_capacity(n_steps);
    let mut measurements = Vec::with_capacity(n_steps);
    for _ in 0..n_steps {
        if rng.gen::<f64>() < PEDESTRIAN_TURN_PROBABILITY {
            let angle = gaussian(&mut rng, PEDESTRIAN_TURN_ANGLE_STD);
            velocity = rotated(velocity, angle);
        }
        let accel = gaussian2(&mut rng, PEDESTRIAN_PROCESS_STD);
        position += velocity * dt + accel * (0.5 * dt * dt);
        velocity += accel * dt;
        states.push(Vector4::new(position.x, position.y, velocity.x, velocity.y));
        measurements.push(position + gaussian2(&mut rng, measurement_noise_std));
    }
    Trajectory::new(name, dt, prior, states, measurements)
}

/// Constant turn motion whose rate itself drifts slowly.
pub fn coordinated_turn_trajectory(
    name: &str,
    n_steps: usize,
    dt: f64,
    turn_rate: f64,
    measurement_noise_std: f64,
    seed: u64,
) -> Result<Trajectory> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = Vector4::new(0.0, 0.0, TURN_SPEED, 0.0);
    let mut omega = turn_rate;
    let prior = Trajectory::prior_at(state);

    let mut states = Vec::with_capacity(n_steps);
    let mut measurements = Vec::with_capacity(n_steps);
    for _ in 0..n_steps {
        state = coordinated_turn_matrix(omega, dt) * state;
        state[2] += gaussian(&mut rng, TURN_PROCESS_STD) * dt;
        state[3] += gaussian(&mut rng, TURN_PROCESS_STD) * dt;
        omega += gaussian(&mut rng, 0.5 * TURN_PROCESS_STD) * dt;
        states.push(state);
        measurements.push(Vector2::new(state.x, state.y) + gaussian2(&mut rng, measurement_noise_std));
    }
    Trajectory::new(name, dt, prior, states, measurements)
}

/// Straight segments joined by alternating 90 degree turns.
pub fn sharp_turn_trajectory(
    name: &str,
    n_steps: usize,
    dt: f64,
    measurement_noise_std: f64,
    seed: u64,
) -> Result<Trajectory> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut position = Vector2::zeros();
    let mut velocity = Vector2::new(SHARP_TURN_SPEED, 0.0);
    let mut turn_sign = 1.0;
    let prior = Trajectory::prior_at(Vector4::new(0.0, 0.0, velocity.x, velocity.y));

    let mut states = Vec::with_capacity(n_steps);
    let mut measurements = Vec::with_capacity(n_steps);
    for k in 0..n_steps {
        if k > 0 && k % SHARP_TURN_INTERVAL == 0 {
            velocity = rotated(velocity, turn_sign * FRAC_PI_2);
            turn_sign = -turn_sign;
        }
        let accel = gaussian2(&mut rng, SHARP_TURN_PROCESS_STD);
        position += velocity * dt;
        velocity += accel * dt;
        states.push(Vector4::new(position.x, position.y, velocity.x, velocity.y));
        measurements.push(position + gaussian2(&mut rng, measurement_noise_std));
    }
    Trajectory::new(name, dt, prior, states, measurements)
}

/// The full evaluation corpus: `n_per_regime` trajectories from each of the
/// four regimes, 60 steps at dt 0.5, with one continuously incrementing seed
/// so every trajectory is distinct but the whole corpus replays exactly.
///
/// Coordinated turn rates spread from 0.1 to 0.3 rad/s across the regime.
pub fn synthetic_corpus(n_per_regime: usize, base_seed: u64) -> Result<Vec<Trajectory>> {
    let mut trajectories = Vec::with_capacity(4 * n_per_regime);
    if n_per_regime == 0 {
        return Ok(trajectories);
    }
    let mut seed = base_seed;

    for i in 0..n_per_regime {
        trajectories.push(linear_trajectory(
            &format!("linear_{i:02}"),
            CORPUS_STEPS,
            CORPUS_DT,
            CORPUS_MEASUREMENT_STD,
            seed,
        )?);
        seed += 1;
    }
    for i in 0..n_per_regime {
        trajectories.push(pedestrian_trajectory(
            &format!("pedestrian_{i:02}"),
            CORPUS_STEPS,
            CORPUS_DT,
            CORPUS_MEASUREMENT_STD,
            seed,
        )?);
        seed += 1;
    }
    for i in 0..n_per_regime {
        let spread = i as f64 / (n_per_regime - 1).max(1) as f64;
        trajectories.push(coordinated_turn_trajectory(
            &format!("coordinated_turn_{i:02}"),
            CORPUS_STEPS,
            CORPUS_DT,
            0.1 + 0.2 * spread,
            CORPUS_MEASUREMENT_STD,
            seed,
        )?);
        seed += 1;
    }
    for i in 0..n_per_regime {
        trajectories.push(sharp_turn_trajectory(
            &format!("sharp_turn_{i:02}"),
            CORPUS_STEPS,
            CORPUS_DT,
            CORPUS_MEASUREMENT_STD,
            seed,
        )?);
        seed += 1;
    }
    Ok(trajectories)
}

/// A trajectory that cruises, turns, and cruises again, with the active
/// mode recorded per step. Segment dynamics are exact; only the
/// measurements carry noise.
#[derive(Debug, Clone)]
pub struct ModeSwitchingScenario {
    pub trajectory: Trajectory,
    /// 0 while cruising, 1 while turning, one entry per step.
    pub true_modes: Vec<usize>,
}

pub fn mode_switching_scenario(
    n_steps: usize,
    dt: f64,
    turn_rate: f64,
    measurement_noise_std: f64,
    seed: u64,
) -> Result<ModeSwitchingScenario> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = Vector4::new(0.0, 0.0, 1.0, 0.0);
    let prior = Trajectory::prior_at(state);
    let turn_start = n_steps / 3;
    let turn_end = 2 * n_steps / 3;

    let mut states = Vec::with_capacity(n_steps);
    let mut measurements = Vec::with_capacity(n_steps);
    let mut true_modes = Vec::with_capacity(n_steps);
    for k in 0..n_steps {
        let turning = k >= turn_start && k < turn_end;
        let omega = if turning { turn_rate } else { 0.0 };
        state = coordinated_turn_matrix(omega, dt) * state;
        states.push(state);
        measurements
            .push(Vector2::new(state.x, state.y) + gaussian2(&mut rng, measurement_noise_std));
        true_modes.push(usize::from(turning));
    }
    let trajectory = Trajectory::new("mode_switching", dt, prior, states, measurements)?;
    Ok(ModeSwitchingScenario { trajectory, true_modes })
}

/// One target's lifetime: the step it appears at and its state at every
/// step it stays alive.
#[derive(Debug, Clone)]
pub struct TargetTrack {
    pub birth_step: usize,
    pub states: Vec<Vector4<f64>>,
}

/// Multi-target scene with staggered births and deaths, missed detections,
/// and uniform clutter over the square `[-region, region]^2`.
#[derive(Debug, Clone)]
pub struct MultiTargetScenario {
    pub dt: f64,
    pub tracks: Vec<TargetTrack>,
    /// Unlabeled detections plus clutter, one set per step.
    pub measurement_sets: Vec<Vec<Vector2<f64>>>,
    /// Number of live targets per step.
    pub true_cardinality: Vec<usize>,
}

pub fn multi_target_scenario(
    n_steps: usize,
    dt: f64,
    detection_probability: f64,
    clutter_rate: f64,
    measurement_noise_std: f64,
    region_half_width: f64,
    seed: u64,
) -> Result<MultiTargetScenario> {
    if !(0.0..=1.0).contains(&detection_probability) {
        return Err(FilterError::InvalidConfiguration(format!(
            "detection probability must lie in [0, 1], got {detection_probability}"
        )));
    }
    if clutter_rate < 0.0 || region_half_width <= 0.0 {
        return Err(FilterError::InvalidConfiguration(format!(
            "clutter rate {clutter_rate} and region half width {region_half_width} out of range"
        )));
    }
    let clutter = if clutter_rate > 0.0 {
        Some(Poisson::new(clutter_rate).map_err(|e| {
            FilterError::InvalidConfiguration(format!("bad clutter rate {clutter_rate}: {e}"))
        })?)
    } else {
        None
    };

    let mut rng = StdRng::seed_from_u64(seed);
    let w = region_half_width;
    // (birth step, death step, initial state); targets cross the region.
    let script = [
        (0, n_steps, Vector4::new(-0.6 * w, -0.3 * w, 1.2, 0.6)),
        (0, 2 * n_steps / 3, Vector4::new(0.6 * w, -0.3 * w, -1.2, 0.6)),
        (n_steps / 3, n_steps, Vector4::new(-0.6 * w, 0.5 * w, 1.0, -0.8)),
    ];
    let transition = constant_velocity_matrix(dt);

    let mut tracks: Vec<TargetTrack> = script
        .iter()
        .map(|&(birth, _, _)| TargetTrack { birth_step: birth, states: Vec::new() })
        .collect();
    let mut current: Vec<Option<Vector4<f64>>> = vec![None; script.len()];
    let mut measurement_sets = Vec::with_capacity(n_steps);
    let mut true_cardinality = Vec::with_capacity(n_steps);

    for k in 0..n_steps {
        for (ti, &(birth, death, x0)) in script.iter().enumerate() {
            if k == birth {
                current[ti] = Some(x0);
            } else if k >= death {
                current[ti] = None;
            } else if let Some(state) = current[ti] {
                current[ti] = Some(transition * state);
            }
        }

        let mut detections = Vec::new();
        let mut alive = 0;
        for (ti, state) in current.iter().enumerate() {
            if let Some(s) = state {
                tracks[ti].states.push(*s);
                alive += 1;
                if rng.gen::<f64>() < detection_probability {
                    detections
                        .push(Vector2::new(s.x, s.y) + gaussian2(&mut rng, measurement_noise_std));
                }
            }
        }
        if let Some(poisson) = &clutter {
            let n_clutter = poisson.sample(&mut rng) as usize;
            for _ in 0..n_clutter {
                detections.push(Vector2::new(rng.gen_range(-w..w), rng.gen_range(-w..w)));
            }
        }
        true_cardinality.push(alive);
        measurement_sets.push(detections);
    }

    Ok(MultiTargetScenario { dt, tracks, measurement_sets, true_cardinality })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    use crate::benchmark::synthetic::{
        coordinated_turn_trajectory, linear_trajectory, mode_switching_scenario,
        multi_target_scenario, pedestrian_trajectory, sharp_turn_trajectory, synthetic_corpus,
    };

    #[test]
    fn corpus_covers_all_regimes_with_distinct_seeds() {
        let corpus = synthetic_corpus(2, 100).unwrap();
        assert_eq!(corpus.len(), 8);
        assert_eq!(corpus[0].name, "linear_00");
        assert_eq!(corpus[3].name, "pedestrian_01");
        assert_eq!(corpus[4].name, "coordinated_turn_00");
        assert_eq!(corpus[7].name, "sharp_turn_01");
        for trajectory in &corpus {
            assert_eq!(trajectory.len(), 60);
            assert_relative_eq!(trajectory.dt, 0.5);
        }
        // consecutive seeds give different noise realizations
        assert_ne!(corpus[0].measurements[0], corpus[1].measurements[0]);
    }

    #[test]
    fn generators_replay_exactly_under_the_same_seed() {
        let a = pedestrian_trajectory("a", 40, 0.5, 0.5, 7).unwrap();
        let b = pedestrian_trajectory("b", 40, 0.5, 0.5, 7).unwrap();
        assert_eq!(a.states, b.states);
        assert_eq!(a.measurements, b.measurements);

        let c = pedestrian_trajectory("c", 40, 0.5, 0.5, 8).unwrap();
        assert_ne!(a.states, c.states);
    }

    #[test]
    fn measurements_stay_near_the_true_positions() {
        for trajectory in [
            linear_trajectory("l", 60, 0.5, 0.5, 1).unwrap(),
            sharp_turn_trajectory("s", 60, 0.5, 0.5, 2).unwrap(),
            coordinated_turn_trajectory("c", 60, 0.5, 0.2, 0.5, 3).unwrap(),
        ] {
            for (state, measurement) in trajectory.states.iter().zip(&trajectory.measurements) {
                let offset = measurement - Vector2::new(state.x, state.y);
                assert!(offset.norm() < 4.0, "measurement strayed {} from truth", offset.norm());
            }
        }
    }

    #[test]
    fn mode_labels_track_the_turn_segment() {
        let scenario = mode_switching_scenario(30, 0.5, 0.3, 0.5, 11).unwrap();
        assert_eq!(scenario.true_modes.len(), 30);
        assert!(scenario.true_modes[..10].iter().all(|&m| m == 0));
        assert!(scenario.true_modes[10..20].iter().all(|&m| m == 1));
        assert!(scenario.true_modes[20..].iter().all(|&m| m == 0));

        // segment dynamics are exact, so the net heading change is the
        // turn segment's rotation
        let total_angle: f64 = 0.3 * 10.0 * 0.5;
        let first = scenario.trajectory.states[0];
        let last = scenario.trajectory.states[29];
        assert_relative_eq!(last[2], total_angle.cos() * first[2], epsilon = 1e-10);
        assert_relative_eq!(last[3], total_angle.sin() * first[2], epsilon = 1e-10);
    }

    #[test]
    fn cardinality_follows_births_and_deaths() {
        let scenario = multi_target_scenario(30, 1.0, 1.0, 0.0, 0.1, 20.0, 5).unwrap();
        // two targets from the start, a third born at step 10, one dead at 20
        assert_eq!(scenario.true_cardinality[0], 2);
        assert_eq!(scenario.true_cardinality[10], 3);
        assert_eq!(scenario.true_cardinality[20], 2);
        assert_eq!(scenario.tracks[1].states.len(), 20);
        assert_eq!(scenario.tracks[2].birth_step, 10);
        // perfect detection and no clutter: one measurement per live target
        for (detections, &alive) in
            scenario.measurement_sets.iter().zip(&scenario.true_cardinality)
        {
            assert_eq!(detections.len(), alive);
        }
    }

    #[test]
    fn clutter_and_missed_detections_change_the_measurement_count() {
        let scenario = multi_target_scenario(40, 1.0, 0.5, 3.0, 0.1, 20.0, 17).unwrap();
        let total: usize = scenario.measurement_sets.iter().map(Vec::len).sum();
        let targets: usize = scenario.true_cardinality.iter().sum();
        // roughly half the targets detected plus ~3 clutter points per step
        assert!(total > targets / 2);
        let expected = 0.5 * targets as f64 + 3.0 * 40.0;
        assert!((total as f64) < 2.0 * expected);
        assert_eq!(scenario.measurement_sets.len(), scenario.true_cardinality.len());
    }

    #[test]
    fn scenario_validation_rejects_bad_probabilities() {
        assert!(multi_target_scenario(10, 1.0, 1.5, 0.0, 0.1, 20.0, 1).is_err());
        assert!(multi_target_scenario(10, 1.0, 0.9, -1.0, 0.1, 20.0, 1).is_err());
    }
}
