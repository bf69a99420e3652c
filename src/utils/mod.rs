pub mod mvn;
pub mod state;

use nalgebra::{RealField, SMatrix};

/// Joseph form posterior covariance, (I - KH) P (I - KH)' + K R K'.
///
/// Algebraically equal to (I - KH) P and stays symmetric positive
/// semi-definite under roundoff.
pub fn joseph_form<T: RealField + Copy, const S: usize, const Z: usize>(
    covariance: &SMatrix<T, S, S>,
    gain: &SMatrix<T, S, Z>,
    observation: &SMatrix<T, Z, S>,
    measurement_noise: &SMatrix<T, Z, Z>,
) -> SMatrix<T, S, S> {
    let i_kh = SMatrix::<T, S, S>::identity() - gain * observation;
    i_kh * covariance * i_kh.transpose() + gain * measurement_noise * gain.transpose()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use nalgebra::{Matrix1, Matrix1x2, Matrix2};

    use crate::utils::joseph_form;

    #[test]
    fn joseph_form_matches_short_form_and_stays_symmetric() {
        let p = Matrix2::new(2.0, 0.5, 0.5, 1.0);
        let h = Matrix1x2::new(1.0, 0.0);
        let r = Matrix1::new(0.25);
        let s = (h * p * h.transpose() + r)[(0, 0)];
        let k = p * h.transpose() / s;
        let joseph = joseph_form(&p, &k, &h, &r);
        let short = (Matrix2::identity() - k * h) * p;
        assert_abs_diff_eq!(joseph, short, epsilon = 1e-12);
        assert_abs_diff_eq!(joseph, joseph.transpose(), epsilon = 1e-15);
    }
}
