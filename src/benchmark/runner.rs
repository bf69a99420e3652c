//! Corpus execution: every filter against every trajectory, scored and
//! aggregated per filter. A run that errors is recorded and excluded from
//! the aggregates instead of aborting the whole corpus.

use std::io::Write;
use std::time::Instant;

use log::{debug, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::benchmark::configs::FilterFactory;
use crate::benchmark::trajectory::Trajectory;
use crate::error::Result;
use crate::metrics;

/// Scores for one (filter, trajectory) run. The per step errors stay in
/// memory; the serialized row is the flat remainder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub filter: String,
    pub trajectory: String,
    pub rmse: f64,
    pub mae: f64,
    pub mean_nees: f64,
    pub elapsed_seconds: f64,
    #[serde(skip)]
    pub per_step_errors: Vec<f64>,
}

/// A run that returned an error instead of scores.
#[derive(Debug, Clone)]
pub struct CorpusFailure {
    pub filter: String,
    pub trajectory: String,
    pub error: String,
}

/// Per filter aggregate over the trajectories that completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterAggregate {
    pub filter: String,
    pub mean_rmse: f64,
    pub std_rmse: f64,
    pub mean_mae: f64,
    pub std_mae: f64,
    pub n_trajectories: usize,
}

/// Everything a corpus run produces.
#[derive(Debug)]
pub struct CorpusReport {
    pub records: Vec<BenchmarkRecord>,
    pub failures: Vec<CorpusFailure>,
    pub summary: FxHashMap<String, FilterAggregate>,
}

/// Build the factory's filter for `trajectory`, run it over the
/// measurements, and score the posterior track against the truth.
pub fn run_single_trajectory(
    factory: &FilterFactory,
    trajectory: &Trajectory,
    seed: u64,
) -> Result<BenchmarkRecord> {
    let mut filter = factory.build(trajectory, seed)?;
    let start = Instant::now();
    let history = filter.run(&trajectory.measurements)?;
    let elapsed_seconds = start.elapsed().as_secs_f64();

    let means = history.posterior_means();
    Ok(BenchmarkRecord {
        filter: factory.name.clone(),
        trajectory: trajectory.name.clone(),
        rmse: metrics::position_rmse(&means, &trajectory.states),
        mae: metrics::position_mae(&means, &trajectory.states),
        mean_nees: metrics::mean_nees(&history.posteriors, &trajectory.states),
        elapsed_seconds,
        per_step_errors: metrics::per_step_position_errors(&means, &trajectory.states),
    })
}

/// Run every factory against every trajectory in parallel.
///
/// The per run seed is `base_seed` plus the trajectory index, so every
/// filter sees identical randomness on a given trajectory.
pub fn run_corpus(
    factories: &[FilterFactory],
    trajectories: &[Trajectory],
    base_seed: u64,
) -> CorpusReport {
    let pairs: Vec<(usize, usize)> = (0..factories.len())
        .flat_map(|fi| (0..trajectories.len()).map(move |ti| (fi, ti)))
        .collect();

    let outcomes: Vec<std::result::Result<BenchmarkRecord, CorpusFailure>> = pairs
        .par_iter()
        .map(|&(fi, ti)| {
            let factory = &factories[fi];
            let trajectory = &trajectories[ti];
            debug!("running {} on {}", factory.name, trajectory.name);
            run_single_trajectory(factory, trajectory, base_seed + ti as u64).map_err(|e| {
                warn!("{} failed on {}: {e}", factory.name, trajectory.name);
                CorpusFailure {
                    filter: factory.name.clone(),
                    trajectory: trajectory.name.clone(),
                    error: e.to_string(),
                }
            })
        })
        .collect();

    let mut records = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(record) => records.push(record),
            Err(failure) => failures.push(failure),
        }
    }
    let summary = summarize(&records);
    CorpusReport { records, failures, summary }
}

fn summarize(records: &[BenchmarkRecord]) -> FxHashMap<String, FilterAggregate> {
    let mut grouped: FxHashMap<&str, Vec<&BenchmarkRecord>> = FxHashMap::default();
    for record in records {
        grouped.entry(&record.filter).or_default().push(record);
    }
    grouped
        .into_iter()
        .map(|(filter, group)| {
            let rmses: Vec<f64> = group.iter().map(|r| r.rmse).collect();
            let maes: Vec<f64> = group.iter().map(|r| r.mae).collect();
            let (mean_rmse, std_rmse) = mean_std(&rmses);
            let (mean_mae, std_mae) = mean_std(&maes);
            let aggregate = FilterAggregate {
                filter: filter.to_string(),
                mean_rmse,
                std_rmse,
                mean_mae,
                std_mae,
                n_trajectories: group.len(),
            };
            (filter.to_string(), aggregate)
        })
        .collect()
}

pub(crate) fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    (mean, variance.sqrt())
}

/// One CSV row per completed (filter, trajectory) run.
pub fn write_records_csv<W: Write>(records: &[BenchmarkRecord], writer: W) -> csv::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer.serialize(record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// The per filter aggregate table, rows sorted by filter name.
pub fn write_summary_csv<W: Write>(report: &CorpusReport, writer: W) -> csv::Result<()> {
    let mut rows: Vec<&FilterAggregate> = report.summary.values().collect();
    rows.sort_by(|a, b| a.filter.cmp(&b.filter));
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::benchmark::configs::{kalman_factory, particle_factory, FilterFactory};
    use crate::benchmark::runner::{
        run_corpus, run_single_trajectory, write_records_csv, write_summary_csv,
        BenchmarkRecord,
    };
    use crate::benchmark::synthetic::synthetic_corpus;
    use crate::error::FilterError;

    #[test]
    fn corpus_report_covers_every_pair() {
        let factories = vec![kalman_factory(), particle_factory()];
        let trajectories = synthetic_corpus(1, 900).unwrap();
        let report = run_corpus(&factories, &trajectories, 900);

        assert_eq!(report.records.len(), 8);
        assert!(report.failures.is_empty());
        for name in ["KF", "PF"] {
            let aggregate = &report.summary[name];
            assert_eq!(aggregate.n_trajectories, 4);
            assert!(aggregate.mean_rmse > 0.0 && aggregate.mean_rmse.is_finite());
            assert!(aggregate.std_rmse >= 0.0);
        }
        for record in &report.records {
            assert_eq!(record.per_step_errors.len(), 60);
            assert!(record.rmse.is_finite() && record.mae.is_finite());
            assert!(record.mae <= record.rmse + 1e-12);
        }
    }

    #[test]
    fn corpus_runs_replay_exactly() {
        let factories = vec![kalman_factory(), particle_factory()];
        let trajectories = synthetic_corpus(1, 300).unwrap();
        let first = run_corpus(&factories, &trajectories, 11);
        let second = run_corpus(&factories, &trajectories, 11);

        assert_eq!(first.records.len(), second.records.len());
        for (a, b) in first.records.iter().zip(&second.records) {
            assert_eq!(a.filter, b.filter);
            assert_eq!(a.trajectory, b.trajectory);
            assert_eq!(a.rmse, b.rmse);
            assert_eq!(a.mae, b.mae);
        }
    }

    #[test]
    fn a_broken_filter_does_not_poison_the_corpus() {
        let broken = FilterFactory::new("BROKEN", |_, _| {
            Err(FilterError::InvalidConfiguration("always refuses".into()))
        });
        let factories = vec![kalman_factory(), broken];
        let trajectories = synthetic_corpus(1, 50).unwrap();
        let report = run_corpus(&factories, &trajectories, 50);

        assert_eq!(report.records.len(), 4);
        assert_eq!(report.failures.len(), 4);
        assert!(report.failures.iter().all(|f| f.filter == "BROKEN"));
        assert!(report.failures[0].error.contains("always refuses"));
        assert!(report.summary.contains_key("KF"));
        assert!(!report.summary.contains_key("BROKEN"));
    }

    #[test]
    fn single_run_matches_its_corpus_record() {
        let factories = vec![particle_factory()];
        let trajectories = synthetic_corpus(1, 77).unwrap();
        let report = run_corpus(&factories, &trajectories, 7);

        // trajectory index 2 gets seed base + 2
        let single = run_single_trajectory(&factories[0], &trajectories[2], 9).unwrap();
        let record = &report.records[2];
        assert_eq!(single.trajectory, record.trajectory);
        assert_eq!(single.rmse, record.rmse);
    }

    #[test]
    fn csv_output_is_flat_and_ordered() {
        let factories = vec![kalman_factory()];
        let trajectories = synthetic_corpus(1, 42).unwrap();
        let report = run_corpus(&factories, &trajectories, 42);

        let mut records_buf = Vec::new();
        write_records_csv(&report.records, &mut records_buf).unwrap();
        let records_csv = String::from_utf8(records_buf).unwrap();
        assert!(records_csv
            .starts_with("filter,trajectory,rmse,mae,mean_nees,elapsed_seconds"));
        assert_eq!(records_csv.lines().count(), 5);

        let read_back: Vec<BenchmarkRecord> = csv::Reader::from_reader(records_csv.as_bytes())
            .deserialize()
            .collect::<csv::Result<_>>()
            .unwrap();
        assert_eq!(read_back.len(), report.records.len());
        assert_eq!(read_back[0].filter, report.records[0].filter);
        assert_eq!(read_back[0].rmse, report.records[0].rmse);
        assert!(read_back[0].per_step_errors.is_empty());

        let mut summary_buf = Vec::new();
        write_summary_csv(&report, &mut summary_buf).unwrap();
        let summary_csv = String::from_utf8(summary_buf).unwrap();
        assert!(summary_csv
            .starts_with("filter,mean_rmse,std_rmse,mean_mae,std_mae,n_trajectories"));
        assert!(summary_csv.contains("KF,"));
    }
}
