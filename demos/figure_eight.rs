//! Figure-eight position tracking on the linearized Crazyflie model.
//!
//! Usage:
//!   cargo run --example figure_eight -- --radius 0.5 --period 8

mod quadrotor;

use std::f64::consts::TAU;

use clap::Parser;
use log::debug;
use nalgebra::{DMatrix, DVector};
use tinympc_rho::{Reference, SolveHistory, TinySolver};

use quadrotor::{DT, NH, NU, NX};

#[derive(Parser)]
#[command(about = "Figure-eight tracking with warm-started ADMM")]
struct Args {
    /// Lap time in seconds
    #[arg(long, default_value_t = 8.0)]
    period: f64,

    /// Half width of the figure eight (m)
    #[arg(long, default_value_t = 0.5)]
    radius: f64,

    /// Number of laps
    #[arg(long, default_value_t = 2)]
    laps: usize,

    /// Adapt rho from the residuals of each tick
    #[arg(long)]
    adapt: bool,
}

/// Lemniscate of Gerono at 1 m altitude, positions and velocities.
fn figure_eight(args: &Args, k: usize) -> DVector<f64> {
    let w = TAU / args.period;
    let t = k as f64 * DT;
    let mut x = DVector::zeros(NX);
    x[0] = args.radius * (w * t).sin();
    x[1] = 0.5 * args.radius * (2.0 * w * t).sin();
    x[2] = 1.0;
    x[6] = args.radius * w * (w * t).cos();
    x[7] = args.radius * w * (2.0 * w * t).cos();
    x
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = quadrotor::config().with_adaptation(args.adapt);
    let mut mpc = match quadrotor::plant().and_then(|plant| TinySolver::new(plant, config)) {
        Ok(mpc) => mpc,
        Err(err) => {
            eprintln!("invalid setup: {err}");
            std::process::exit(1);
        }
    };

    let window = DMatrix::from_fn(NX, NH, |r, c| figure_eight(&args, c)[r]);
    let mut reference = match Reference::from_states(window, NU) {
        Ok(reference) => reference,
        Err(err) => {
            eprintln!("invalid reference: {err}");
            std::process::exit(1);
        }
    };

    let steps = (args.laps as f64 * args.period / DT).round() as usize;
    let mut x = figure_eight(&args, 0);
    let mut history = SolveHistory::with_capacity(steps);
    let mut squared_error = 0.0;
    let hover = DVector::zeros(NU);

    for k in 0..steps {
        let out = match mpc.solve(&x, &reference) {
            Ok(out) => out,
            Err(err) => {
                eprintln!("tick {k}: {err}");
                std::process::exit(1);
            }
        };

        let error = (x.rows(0, 3) - reference.x().column(0).rows(0, 3)).norm();
        debug!("step {k:4}: {:3} iterations, position error {error:.4}", out.iterations);
        squared_error += error * error;

        x = mpc.plant().step(&x, &out.u0);
        reference.advance(&figure_eight(&args, k + NH), &hover);
        history.record(&out);
    }

    println!("Total iterations: {}", history.total_iterations());
    println!("Mean iterations: {:.2}", history.mean_iterations());
    println!("Converged ticks: {:.1}%", 100.0 * history.convergence_rate());
    println!("RMS position error: {:.4}", (squared_error / steps.max(1) as f64).sqrt());
}
