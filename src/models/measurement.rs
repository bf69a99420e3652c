#![allow(non_snake_case)]

use nalgebra::Matrix2x4;

use crate::models::{MeasurementFn, MeasurementJacobianFn};

/// Position fix of the [x, y, vx, vy] state, z = [x, y].
pub fn position_measurement_matrix() -> Matrix2x4<f64> {
    #[allow(clippy::deprecated_cfg_attr)]
    #[cfg_attr(rustfmt, rustfmt_skip)]
    let H = Matrix2x4::new(
        1., 0., 0., 0.,
        0., 1., 0., 0.,
    );
    H
}

pub fn position_measurement() -> MeasurementFn<f64, 4, 2> {
    let H = position_measurement_matrix();
    Box::new(move |x| H * x)
}

pub fn position_measurement_jacobian() -> MeasurementJacobianFn<f64, 4, 2> {
    let H = position_measurement_matrix();
    Box::new(move |_x| H)
}
