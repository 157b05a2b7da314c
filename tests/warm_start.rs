mod common;

use common::quadrotor::{self, NH, NU, NX};
use nalgebra::{DMatrix, DVector};
use tinympc_rho::{Reference, TinySolver};

/// Altitude ramp starting at `tick`.
fn climb(tick: usize) -> Reference<f64> {
    let x = DMatrix::from_fn(NX, NH, |r, c| if r == 2 { 0.02 * (tick + c) as f64 } else { 0.0 });
    Reference::from_states(x, NU).unwrap()
}

#[test]
fn warm_start_needs_no_more_iterations_than_cold() {
    common::init_logger();
    let mut solver = TinySolver::new(quadrotor::plant(), quadrotor::config()).unwrap();
    let mut x = DVector::zeros(NX);
    let (mut warm_total, mut cold_total) = (0, 0);

    for tick in 0..40 {
        let reference = climb(tick);

        let mut cold = solver.clone();
        cold.reset();
        let cold_out = cold.solve(&x, &reference).unwrap();

        let out = solver.solve(&x, &reference).unwrap();
        assert!(out.converged && cold_out.converged);

        warm_total += out.iterations;
        cold_total += cold_out.iterations;
        x = solver.plant().step(&x, &out.u0);
    }

    assert!(warm_total < cold_total, "warm {warm_total}, cold {cold_total}");
}

#[test]
fn disabled_warm_start_matches_reset() {
    let config = quadrotor::config();
    let mut warm_off = TinySolver::new(quadrotor::plant(), config.clone().with_warm_start(false)).unwrap();
    let mut resetting = TinySolver::new(quadrotor::plant(), config).unwrap();
    let mut x = DVector::zeros(NX);

    for tick in 0..10 {
        let reference = climb(tick);
        resetting.reset();
        let a = warm_off.solve(&x, &reference).unwrap();
        let b = resetting.solve(&x, &reference).unwrap();
        assert_eq!(a.iterations, b.iterations);
        assert_eq!(a.u0, b.u0);
        x = warm_off.plant().step(&x, &a.u0);
    }
}
