mod common;

use common::quadrotor::{self, NX, U_MAX};
use nalgebra::DVector;
use tinympc_rho::TinySolver;

#[test]
fn out_of_range_reference_saturates_inputs() {
    common::init_logger();
    let mut solver = TinySolver::new(quadrotor::plant(), quadrotor::config()).unwrap();
    // Climbing 5 m asks for far more thrust than the motors have
    let reference = quadrotor::hover_reference([0.0, 0.0, 5.0]);
    let mut x = DVector::zeros(NX);

    for tick in 0..10 {
        let out = solver.solve(&x, &reference).unwrap();
        assert!(
            out.u0.iter().all(|u| *u == U_MAX),
            "tick {tick}: u0 = {}",
            out.u0
        );

        let (_, y) = solver.duals();
        let (_, z) = solver.slacks();
        assert!(z.column(0).iter().all(|u| *u == U_MAX));
        assert!(y.column(0).iter().all(|y| y.is_finite() && *y > 0.0));

        x = solver.plant().step(&x, &out.u0);
    }
}

#[test]
fn duals_stay_bounded_under_saturation() {
    let mut solver = TinySolver::new(quadrotor::plant(), quadrotor::config()).unwrap();
    let reference = quadrotor::hover_reference([0.0, 0.0, 5.0]);

    let (outputs, x) = common::run_closed_loop(&mut solver, DVector::zeros(NX), &reference, 30);
    assert!(outputs.iter().all(|o| o.u0.iter().all(|u| u.is_finite())));
    assert!(x.iter().all(|v| v.is_finite()));

    let (g, y) = solver.duals();
    assert!(g.iter().chain(y.iter()).all(|d| d.is_finite() && d.abs() < 1e3));
}
