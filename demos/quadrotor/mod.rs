//! Linearized Crazyflie about hover at 20 Hz, shared by the demos.
#![allow(dead_code)]

use nalgebra::{DMatrix, DVector};
use tinympc_rho::{Error, PlantModel, Reference, SolverConfig};

pub const NX: usize = 12;
pub const NU: usize = 4;
pub const NH: usize = 10;
pub const DT: f64 = 0.05;

// Motor thrust relative to hover
pub const U_MIN: f64 = -0.5;
pub const U_MAX: f64 = 0.5;

pub fn plant() -> Result<PlantModel<f64>, Error> {
    PlantModel::from_diagonal_costs(
        DMatrix::from_row_slice(NX, NX, &A),
        DMatrix::from_row_slice(NX, NU, &B),
        &DVector::from_row_slice(&Q),
        &DVector::from_row_slice(&R),
    )
}

pub fn config() -> SolverConfig<f64> {
    SolverConfig::uniform(NH, NU, U_MIN, U_MAX)
}

pub fn hover_at(position: [f64; 3]) -> DVector<f64> {
    let mut x = DVector::zeros(NX);
    x.fixed_rows_mut::<3>(0).copy_from_slice(&position);
    x
}

pub fn hover_reference(position: [f64; 3]) -> Reference<f64> {
    Reference::constant(&hover_at(position), &DVector::zeros(NU), NH)
}

#[rustfmt::skip]
const A: [f64; 144] = [
    1.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0245250, 0.0000000, 0.0500000, 0.0000000, 0.0000000, 0.0000000, 0.0002044, 0.0000000,
    0.0000000, 1.0000000, 0.0000000, -0.0245250, 0.0000000, 0.0000000, 0.0000000, 0.0500000, 0.0000000, -0.0002044, 0.0000000, 0.0000000,
    0.0000000, 0.0000000, 1.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0500000, 0.0000000, 0.0000000, 0.0000000,
    0.0000000, 0.0000000, 0.0000000, 1.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0250000, 0.0000000, 0.0000000,
    0.0000000, 0.0000000, 0.0000000, 0.0000000, 1.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0250000, 0.0000000,
    0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 1.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0250000,
    0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.9810000, 0.0000000, 1.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0122625, 0.0000000,
    0.0000000, 0.0000000, 0.0000000, -0.9810000, 0.0000000, 0.0000000, 0.0000000, 1.0000000, 0.0000000, -0.0122625, 0.0000000, 0.0000000,
    0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 1.0000000, 0.0000000, 0.0000000, 0.0000000,
    0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 1.0000000, 0.0000000, 0.0000000,
    0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 1.0000000, 0.0000000,
    0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 0.0000000, 1.0000000
];

#[rustfmt::skip]
const B: [f64; 48] = [
    -0.0007069, 0.0007773, 0.0007091, -0.0007795,
    0.0007034, 0.0007747, -0.0007042, -0.0007739,
    0.0052554, 0.0052554, 0.0052554, 0.0052554,
    -0.1720966, -0.1895213, 0.1722891, 0.1893288,
    -0.1729419, 0.1901740, 0.1734809, -0.1907131,
    0.0123423, -0.0045148, -0.0174024, 0.0095748,
    -0.0565520, 0.0621869, 0.0567283, -0.0623632,
    0.0562756, 0.0619735, -0.0563386, -0.0619105,
    0.2102143, 0.2102143, 0.2102143, 0.2102143,
    -13.7677303, -15.1617018, 13.7831318, 15.1463003,
    -13.8353509, 15.2139209, 13.8784751, -15.2570451,
    0.9873856, -0.3611820, -1.3921880, 0.7659845
];

#[rustfmt::skip]
const Q: [f64; 12] = [ 100.0000000, 100.0000000, 100.0000000, 4.0000000, 4.0000000, 400.0000000, 4.0000000, 4.0000000, 4.0000000, 2.0408163, 2.0408163, 4.0000000, ];

#[rustfmt::skip]
const R: [f64; 4] = [4.0000000, 4.0000000, 4.0000000, 4.0000000];
