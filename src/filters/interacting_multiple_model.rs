#![allow(non_snake_case)]

use log::warn;
use nalgebra::{DMatrix, DVector, RealField, SMatrix, SVector};

use crate::error::{FilterError, Result};
use crate::filters::bayesian_filter::BayesianFilter;
use crate::utils::state::GaussianState;

/// Predicted mode probabilities never drop below this during mixing.
const MIXING_FLOOR: f64 = 1e-20;
/// Posterior mode mass below this resets the mode distribution to uniform.
const MODE_MASS_FLOOR: f64 = 1e-30;

/// Markov switched bank of filters.
///
/// Each cycle mixes the sub filter states under the transition matrix, runs
/// every sub filter on the same measurement, and reweights the mode
/// probabilities by the sub filters' predicted measurement likelihoods. The
/// combined estimate is the probability weighted moment match over the bank.
pub struct InteractingMultipleModel<T: RealField, const S: usize, const Z: usize, const U: usize> {
    filters: Vec<Box<dyn BayesianFilter<T, S, Z, U>>>,
    transition: DMatrix<T>,
    mode_probabilities: DVector<T>,
    probability_history: Vec<DVector<T>>,
}

impl<T: RealField, const S: usize, const Z: usize, const U: usize> std::fmt::Debug
    for InteractingMultipleModel<T, S, Z, U>
{
    /// The sub filters are opaque trait objects; only the bank size is shown.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractingMultipleModel")
            .field("filters", &self.filters.len())
            .field("transition", &self.transition)
            .field("mode_probabilities", &self.mode_probabilities)
            .field("probability_history", &self.probability_history)
            .finish_non_exhaustive()
    }
}

impl<T: RealField + Copy, const S: usize, const Z: usize, const U: usize>
    InteractingMultipleModel<T, S, Z, U>
{
    /// `transition` must be a row stochastic square matrix matching the bank
    /// size and `initial_probabilities` a probability vector of the same
    /// length.
    pub fn new(
        filters: Vec<Box<dyn BayesianFilter<T, S, Z, U>>>,
        transition: DMatrix<T>,
        initial_probabilities: DVector<T>,
    ) -> Result<InteractingMultipleModel<T, S, Z, U>> {
        let m = filters.len();
        if m == 0 {
            return Err(FilterError::InvalidConfiguration(
                "filter bank is empty".into(),
            ));
        }
        if transition.nrows() != m || transition.ncols() != m {
            return Err(FilterError::InvalidConfiguration(format!(
                "transition matrix is {}x{}, bank holds {} filters",
                transition.nrows(),
                transition.ncols(),
                m
            )));
        }
        validate_probability_rows(&transition)?;
        if initial_probabilities.len() != m {
            return Err(FilterError::InvalidConfiguration(format!(
                "{} initial mode probabilities for {} filters",
                initial_probabilities.len(),
                m
            )));
        }
        validate_probability_vector(initial_probabilities.as_slice())?;

        Ok(InteractingMultipleModel {
            filters,
            transition,
            mode_probabilities: initial_probabilities,
            probability_history: Vec::new(),
        })
    }

    /// Current mode probability vector, summing to one.
    pub fn mode_probabilities(&self) -> &DVector<T> {
        &self.mode_probabilities
    }

    /// Mode probabilities recorded after every update, in step order.
    pub fn probability_history(&self) -> &[DVector<T>] {
        &self.probability_history
    }

    /// Index of the currently most probable mode.
    pub fn most_probable_mode(&self) -> usize {
        self.mode_probabilities.argmax().0
    }

    fn predicted_mode_probabilities(&self) -> DVector<T> {
        let m = self.filters.len();
        let floor = T::from_f64(MIXING_FLOOR).unwrap();
        DVector::from_fn(m, |j, _| {
            let mut acc = T::zero();
            for i in 0..m {
                acc += self.transition[(i, j)] * self.mode_probabilities[i];
            }
            acc.max(floor)
        })
    }
}

fn validate_probability_rows<T: RealField + Copy>(transition: &DMatrix<T>) -> Result<()> {
    let tolerance = T::from_f64(1e-6).unwrap();
    for row in 0..transition.nrows() {
        let mut sum = T::zero();
        for col in 0..transition.ncols() {
            let p = transition[(row, col)];
            if p < T::zero() {
                return Err(FilterError::InvalidConfiguration(
                    "transition matrix has a negative entry".into(),
                ));
            }
            sum += p;
        }
        if (sum - T::one()).abs() > tolerance {
            return Err(FilterError::InvalidConfiguration(format!(
                "transition matrix row {row} is not a probability distribution"
            )));
        }
    }
    Ok(())
}

fn validate_probability_vector<T: RealField + Copy>(probabilities: &[T]) -> Result<()> {
    let tolerance = T::from_f64(1e-6).unwrap();
    let mut sum = T::zero();
    for p in probabilities {
        if *p < T::zero() {
            return Err(FilterError::InvalidConfiguration(
                "probability vector has a negative entry".into(),
            ));
        }
        sum += *p;
    }
    if (sum - T::one()).abs() > tolerance {
        return Err(FilterError::InvalidConfiguration(
            "probabilities do not sum to one".into(),
        ));
    }
    Ok(())
}

/// Probability weighted mean and covariance over a set of Gaussians, the
/// covariance widened by the spread of the means.
fn moment_match<T: RealField + Copy, const S: usize>(
    states: &[GaussianState<T, S>],
    weights: &[T],
) -> GaussianState<T, S> {
    let mut mean = SVector::<T, S>::zeros();
    for (state, w) in states.iter().zip(weights.iter()) {
        mean += state.x * *w;
    }
    let mut covariance = SMatrix::<T, S, S>::zeros();
    for (state, w) in states.iter().zip(weights.iter()) {
        let dx = state.x - mean;
        covariance += (state.P + dx * dx.transpose()) * *w;
    }
    let mut blended = GaussianState::new(mean, covariance);
    blended.symmetrize();
    blended
}

impl<T: RealField + Copy, const S: usize, const Z: usize, const U: usize>
    BayesianFilter<T, S, Z, U> for InteractingMultipleModel<T, S, Z, U>
{
    /// Mixes the bank, then predicts every sub filter from its mixed prior.
    fn predict(&mut self, u: Option<&SVector<T, U>>) -> Result<()> {
        let m = self.filters.len();
        let predicted = self.predicted_mode_probabilities();
        let states: Vec<GaussianState<T, S>> =
            self.filters.iter().map(|f| f.estimate()).collect();

        let mut weights = vec![T::zero(); m];
        for j in 0..m {
            for i in 0..m {
                weights[i] = self.transition[(i, j)] * self.mode_probabilities[i] / predicted[j];
            }
            let mixed = moment_match(&states, &weights);
            self.filters[j].set_estimate(&mixed)?;
        }
        for filter in self.filters.iter_mut() {
            filter.predict(u)?;
        }

        let total = predicted.sum();
        self.mode_probabilities = predicted / total;
        Ok(())
    }

    /// Bayes step over the bank: likelihoods are taken at the predicted
    /// states before the sub filters fold the measurement in.
    fn update(&mut self, z: &SVector<T, Z>) -> Result<()> {
        let m = self.filters.len();
        let mut likelihoods = Vec::with_capacity(m);
        for filter in self.filters.iter() {
            likelihoods.push(filter.measurement_likelihood(z)?);
        }
        for filter in self.filters.iter_mut() {
            filter.update(z)?;
        }

        let mut posterior =
            DVector::from_fn(m, |j, _| self.mode_probabilities[j] * likelihoods[j]);
        let total = posterior.sum();
        if total < T::from_f64(MODE_MASS_FLOOR).unwrap() {
            warn!("mode probability mass collapsed, resetting to uniform");
            posterior.fill(T::one() / T::from_usize(m).unwrap());
        } else {
            posterior /= total;
        }
        self.mode_probabilities = posterior;
        self.probability_history.push(self.mode_probabilities.clone());
        Ok(())
    }

    fn estimate(&self) -> GaussianState<T, S> {
        let states: Vec<GaussianState<T, S>> =
            self.filters.iter().map(|f| f.estimate()).collect();
        moment_match(&states, self.mode_probabilities.as_slice())
    }

    fn set_estimate(&mut self, estimate: &GaussianState<T, S>) -> Result<()> {
        for filter in self.filters.iter_mut() {
            filter.set_estimate(estimate)?;
        }
        Ok(())
    }

    /// Mixture likelihood of `z` over the bank.
    fn measurement_likelihood(&self, z: &SVector<T, Z>) -> Result<T> {
        let mut acc = T::zero();
        for (filter, p) in self.filters.iter().zip(self.mode_probabilities.iter()) {
            acc += *p * filter.measurement_likelihood(z)?;
        }
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use nalgebra::{DMatrix, DVector, Matrix2, Matrix4, Vector2, Vector4};

    use crate::benchmark::synthetic::mode_switching_scenario;
    use crate::error::FilterError;
    use crate::filters::bayesian_filter::BayesianFilter;
    use crate::filters::interacting_multiple_model::InteractingMultipleModel;
    use crate::filters::kalman_filter::KalmanFilter;
    use crate::models::measurement::position_measurement_matrix;
    use crate::models::motion::{constant_velocity_matrix, coordinated_turn_matrix};
    use crate::utils::state::GaussianState;

    const DT: f64 = 0.5;

    fn cv_kalman(prior: GaussianState<f64, 4>) -> Box<dyn BayesianFilter<f64, 4, 2, 0>> {
        Box::new(KalmanFilter::new(
            constant_velocity_matrix(DT),
            None,
            position_measurement_matrix(),
            Matrix4::identity() * 0.01,
            Matrix2::identity() * 0.0625,
            prior,
        ))
    }

    fn turn_kalman(
        omega: f64,
        prior: GaussianState<f64, 4>,
    ) -> Box<dyn BayesianFilter<f64, 4, 2, 0>> {
        Box::new(KalmanFilter::new(
            coordinated_turn_matrix(omega, DT),
            None,
            position_measurement_matrix(),
            Matrix4::identity() * 0.01,
            Matrix2::identity() * 0.0625,
            prior,
        ))
    }

    fn sticky_transition(m: usize) -> DMatrix<f64> {
        DMatrix::from_fn(m, m, |i, j| {
            if i == j {
                0.95
            } else {
                0.05 / (m as f64 - 1.0)
            }
        })
    }

    #[test]
    fn single_model_bank_matches_the_bare_filter() {
        let prior = GaussianState::new(Vector4::new(0.0, 0.0, 1.0, 0.0), Matrix4::identity());
        let mut bare = KalmanFilter::<f64, 4, 2, 0>::new(
            constant_velocity_matrix(DT),
            None,
            position_measurement_matrix(),
            Matrix4::identity() * 0.01,
            Matrix2::identity() * 0.0625,
            prior,
        );
        let mut imm = InteractingMultipleModel::new(
            vec![cv_kalman(prior)],
            DMatrix::from_element(1, 1, 1.0),
            DVector::from_element(1, 1.0),
        )
        .unwrap();

        for step in 0..10 {
            let z = Vector2::new(step as f64 * 0.5, 0.1 * step as f64);
            bare.predict(None).unwrap();
            imm.predict(None).unwrap();
            bare.update(&z).unwrap();
            imm.update(&z).unwrap();
            assert_abs_diff_eq!(bare.estimate().x, imm.estimate().x, epsilon = 1e-12);
            assert_abs_diff_eq!(bare.estimate().P, imm.estimate().P, epsilon = 1e-12);
        }
        assert_relative_eq!(imm.mode_probabilities()[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn mode_probabilities_stay_normalized() {
        let prior = GaussianState::new(Vector4::new(0.0, 0.0, 1.0, 0.0), Matrix4::identity());
        let mut imm = InteractingMultipleModel::new(
            vec![
                cv_kalman(prior),
                turn_kalman(0.2, prior),
                turn_kalman(-0.2, prior),
            ],
            sticky_transition(3),
            DVector::from_element(3, 1.0 / 3.0),
        )
        .unwrap();

        let mut truth = Vector4::new(0.0, 0.0, 1.0, 0.0);
        let F = coordinated_turn_matrix(0.2, DT);
        for _ in 0..15 {
            truth = F * truth;
            imm.predict(None).unwrap();
            imm.update(&Vector2::new(truth[0], truth[1])).unwrap();
            assert_relative_eq!(imm.mode_probabilities().sum(), 1.0, epsilon = 1e-9);
        }
        assert_eq!(imm.probability_history().len(), 15);
    }

    #[test]
    fn identifies_the_turning_mode() {
        let prior = GaussianState::new(Vector4::new(0.0, 0.0, 1.0, 0.0), Matrix4::identity());
        let mut imm = InteractingMultipleModel::new(
            vec![cv_kalman(prior), turn_kalman(0.3, prior)],
            sticky_transition(2),
            DVector::from_element(2, 0.5),
        )
        .unwrap();

        let mut truth = Vector4::new(0.0, 0.0, 1.0, 0.0);
        let F = coordinated_turn_matrix(0.3, DT);
        for _ in 0..25 {
            truth = F * truth;
            imm.predict(None).unwrap();
            imm.update(&Vector2::new(truth[0], truth[1])).unwrap();
        }
        assert_eq!(imm.most_probable_mode(), 1);
        assert!(imm.mode_probabilities()[1] > 0.7);
    }

    #[test]
    fn follows_a_mode_switching_scene() {
        let scenario = mode_switching_scenario(30, DT, 1.2, 0.1, 19).unwrap();
        let prior = scenario.trajectory.prior;
        let cv: Box<dyn BayesianFilter<f64, 4, 2, 0>> = Box::new(KalmanFilter::new(
            constant_velocity_matrix(DT),
            None,
            position_measurement_matrix(),
            Matrix4::identity() * 0.01,
            Matrix2::identity() * 0.01,
            prior,
        ));
        let turn: Box<dyn BayesianFilter<f64, 4, 2, 0>> = Box::new(KalmanFilter::new(
            coordinated_turn_matrix(1.2, DT),
            None,
            position_measurement_matrix(),
            Matrix4::identity() * 0.01,
            Matrix2::identity() * 0.01,
            prior,
        ));
        let mut imm = InteractingMultipleModel::new(
            vec![cv, turn],
            sticky_transition(2),
            DVector::from_element(2, 0.5),
        )
        .unwrap();

        let mut decided = Vec::with_capacity(30);
        for z in &scenario.trajectory.measurements {
            imm.predict(None).unwrap();
            imm.update(z).unwrap();
            decided.push(imm.most_probable_mode());
        }

        // the mixer needs a few steps to commit after each regime change,
        // so agreement is judged over the whole run rather than per step
        let agreements = decided
            .iter()
            .zip(&scenario.true_modes)
            .filter(|(got, want)| got == want)
            .count();
        assert!(agreements >= 20, "only {agreements} of 30 steps matched");
        assert_eq!(decided[5], 0);
        assert_eq!(decided[15], 1);
        assert_eq!(decided[25], 0);
        assert_eq!(imm.probability_history().len(), 30);
    }

    #[test]
    fn rejects_malformed_configurations() {
        let prior = GaussianState::new(Vector4::zeros(), Matrix4::identity());

        let err = InteractingMultipleModel::<f64, 4, 2, 0>::new(
            vec![],
            DMatrix::identity(0, 0),
            DVector::zeros(0),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::InvalidConfiguration(_)));

        let err = InteractingMultipleModel::new(
            vec![cv_kalman(prior), turn_kalman(0.1, prior)],
            DMatrix::from_row_slice(2, 2, &[0.9, 0.3, 0.05, 0.95]),
            DVector::from_element(2, 0.5),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::InvalidConfiguration(_)));

        let err = InteractingMultipleModel::new(
            vec![cv_kalman(prior), turn_kalman(0.1, prior)],
            sticky_transition(2),
            DVector::from_element(2, 0.6),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::InvalidConfiguration(_)));
    }
}
