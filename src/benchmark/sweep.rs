//! Turn-rate sweep: run the filter lineup over coordinated-turn
//! trajectories of increasing rate to find where the linear model breaks.

use log::warn;
use rayon::prelude::*;

use crate::benchmark::configs::FilterFactory;
use crate::benchmark::runner::{mean_std, run_single_trajectory};
use crate::benchmark::synthetic::coordinated_turn_trajectory;

/// Mean/std RMSE per (turn rate, filter) cell, indexed `[rate][filter]`.
#[derive(Debug, Clone)]
pub struct TurnRateSweep {
    pub turn_rates: Vec<f64>,
    pub filter_names: Vec<String>,
    pub mean_rmse: Vec<Vec<f64>>,
    pub std_rmse: Vec<Vec<f64>>,
}

/// 25 rates evenly spaced over [0, 0.5] rad/s.
pub fn default_turn_rates() -> Vec<f64> {
    (0..25).map(|i| 0.5 * i as f64 / 24.0).collect()
}

/// For each turn rate, generate `trials_per_rate` trajectories and collect
/// per filter RMSE statistics. Trial seeds never repeat across rates, and
/// every filter sees the same trajectories at a given rate.
pub fn sweep_turn_rate(
    factories: &[FilterFactory],
    turn_rates: &[f64],
    trials_per_rate: usize,
    n_steps: usize,
    dt: f64,
    measurement_noise_std: f64,
    base_seed: u64,
) -> TurnRateSweep {
    let rows: Vec<(Vec<f64>, Vec<f64>)> = turn_rates
        .par_iter()
        .enumerate()
        .map(|(ri, &rate)| {
            let mut rmses: Vec<Vec<f64>> =
                vec![Vec::with_capacity(trials_per_rate); factories.len()];
            for ti in 0..trials_per_rate {
                let seed = base_seed + (ri * trials_per_rate + ti) as u64;
                let trajectory = match coordinated_turn_trajectory(
                    &format!("turn_{ri:02}_trial_{ti:02}"),
                    n_steps,
                    dt,
                    rate,
                    measurement_noise_std,
                    seed,
                ) {
                    Ok(trajectory) => trajectory,
                    Err(e) => {
                        warn!("skipping trial {ti} at turn rate {rate}: {e}");
                        continue;
                    }
                };
                for (fi, factory) in factories.iter().enumerate() {
                    match run_single_trajectory(factory, &trajectory, seed) {
                        Ok(record) => rmses[fi].push(record.rmse),
                        Err(e) => {
                            warn!("{} failed at turn rate {rate}, trial {ti}: {e}", factory.name)
                        }
                    }
                }
            }
            let (means, stds) = rmses.iter().map(|values| mean_std(values)).unzip();
            (means, stds)
        })
        .collect();

    let (mean_rmse, std_rmse) = rows.into_iter().unzip();
    TurnRateSweep {
        turn_rates: turn_rates.to_vec(),
        filter_names: factories.iter().map(|f| f.name.clone()).collect(),
        mean_rmse,
        std_rmse,
    }
}

#[cfg(test)]
mod tests {
    use crate::benchmark::configs::{extended_kalman_factory, kalman_factory};
    use crate::benchmark::sweep::{default_turn_rates, sweep_turn_rate};

    #[test]
    fn default_rates_span_the_breaking_range() {
        let rates = default_turn_rates();
        assert_eq!(rates.len(), 25);
        assert_eq!(rates[0], 0.0);
        assert_eq!(rates[24], 0.5);
        assert!(rates.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn grid_shape_follows_rates_and_factories() {
        let factories = vec![kalman_factory(), extended_kalman_factory()];
        let sweep = sweep_turn_rate(&factories, &[0.0, 0.2, 0.4], 2, 30, 0.5, 0.5, 500);

        assert_eq!(sweep.turn_rates, [0.0, 0.2, 0.4]);
        assert_eq!(sweep.filter_names, ["KF", "EKF"]);
        assert_eq!(sweep.mean_rmse.len(), 3);
        for (means, stds) in sweep.mean_rmse.iter().zip(&sweep.std_rmse) {
            assert_eq!(means.len(), 2);
            assert_eq!(stds.len(), 2);
            for (&m, &s) in means.iter().zip(stds) {
                assert!(m.is_finite() && m > 0.0);
                assert!(s >= 0.0);
            }
        }
    }

    #[test]
    fn fast_turns_degrade_the_linear_model() {
        let factories = vec![kalman_factory()];
        let sweep = sweep_turn_rate(&factories, &[0.0, 1.0], 8, 60, 0.5, 0.5, 700);
        assert!(
            sweep.mean_rmse[1][0] > sweep.mean_rmse[0][0],
            "turning RMSE {} did not exceed straight line RMSE {}",
            sweep.mean_rmse[1][0],
            sweep.mean_rmse[0][0]
        );
    }

    #[test]
    fn sweeps_replay_exactly() {
        let factories = vec![kalman_factory()];
        let first = sweep_turn_rate(&factories, &[0.1, 0.3], 3, 20, 0.5, 0.5, 9);
        let second = sweep_turn_rate(&factories, &[0.1, 0.3], 3, 20, 0.5, 0.5, 9);
        assert_eq!(first.mean_rmse, second.mean_rmse);
        assert_eq!(first.std_rmse, second.std_rmse);
    }
}
