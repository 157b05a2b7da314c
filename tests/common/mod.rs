#![allow(dead_code)]

pub mod quadrotor;

use nalgebra::DVector;
use tinympc_rho::{Reference, SolveOutput, TinySolver};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Closed loop on the nominal dynamics: solve, apply `u0`, repeat.
pub fn run_closed_loop(
    solver: &mut TinySolver<f64>,
    mut x: DVector<f64>,
    reference: &Reference<f64>,
    ticks: usize,
) -> (Vec<SolveOutput<f64>>, DVector<f64>) {
    let mut outputs = Vec::with_capacity(ticks);
    for _ in 0..ticks {
        let out = solver.solve(&x, reference).expect("tick inputs are well formed");
        x = solver.plant().step(&x, &out.u0);
        outputs.push(out);
    }
    (outputs, x)
}

pub fn total_iterations(outputs: &[SolveOutput<f64>]) -> usize {
    outputs.iter().map(|o| o.iterations).sum()
}
