//! Quadrotor hover in closed loop on the linearized Crazyflie model.
//!
//! The drone starts displaced and tilted and is asked to hold 2 m of altitude.
//! An optional gust pushes it sideways for a couple of seconds.
//!
//! Usage:
//!   cargo run --example quadrotor_hover
//!   cargo run --example quadrotor_hover -- --adapt --rho 50 --wind 0.5
//!   cargo run --example quadrotor_hover -- --adapt --taylor --steps 200

mod quadrotor;

use clap::Parser;
use log::debug;
use nalgebra::dvector;
use tinympc_rho::{AdaptationMethod, RebuildOutcome, SolveHistory, TinySolver};

#[derive(Parser)]
#[command(about = "Closed-loop quadrotor hover with cached Riccati gains")]
struct Args {
    /// Number of control ticks (20 Hz)
    #[arg(long, default_value_t = 500)]
    steps: usize,

    /// Initial ADMM penalty
    #[arg(long, default_value_t = 5.0)]
    rho: f64,

    /// ADMM iterations per tick
    #[arg(long, default_value_t = 100)]
    max_iter: usize,

    /// Adapt rho from the residuals of each tick
    #[arg(long)]
    adapt: bool,

    /// Follow rho changes with first-order gain updates instead of a full recache
    #[arg(long)]
    taylor: bool,

    /// Lateral gust acceleration (m/s^2) applied from tick 100 to 140
    #[arg(long, default_value_t = 0.0)]
    wind: f64,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let method = if args.taylor {
        AdaptationMethod::Taylor
    } else {
        AdaptationMethod::Recache
    };
    let config = quadrotor::config()
        .with_rho(args.rho)
        .with_rho_range(1.0, args.rho.max(100.0))
        .with_max_iterations(args.max_iter)
        .with_adaptation(args.adapt)
        .with_adapt_method(method);

    let mut mpc = match quadrotor::plant().and_then(|plant| TinySolver::new(plant, config)) {
        Ok(mpc) => mpc,
        Err(err) => {
            eprintln!("invalid setup: {err}");
            std::process::exit(1);
        }
    };

    // Constant reference through entire horizon
    let target = [0.0, 0.0, 2.0];
    let reference = quadrotor::hover_reference(target);
    let setpoint = quadrotor::hover_at(target);

    let mut x = dvector![0.0, 1.0, 0.0, 0.2, 0.0, 0.0, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0];
    let mut history = SolveHistory::with_capacity(args.steps);
    let mut rebuilds = 0;

    for k in 0..args.steps {
        let out = match mpc.solve(&x, &reference) {
            Ok(out) => out,
            Err(err) => {
                eprintln!("tick {k}: {err}");
                std::process::exit(1);
            }
        };

        debug!(
            "At step {k:3} in {:4} iterations, got tracking error : {:05.4}",
            out.iterations,
            (&x - &setpoint).norm(),
        );
        if let Some(outcome) = &out.rebuild {
            rebuilds += 1;
            if let RebuildOutcome::Rejected { requested, reason, .. } = outcome {
                println!("tick {k}: rebuild for rho {requested:.3} rejected: {reason}");
            }
        }

        // Iterate simulation
        x = mpc.plant().step(&x, &out.u0);
        if (100..140).contains(&k) {
            x[6] += args.wind * quadrotor::DT;
        }

        history.record(&out);
    }

    println!("Total iterations: {}", history.total_iterations());
    println!("Mean iterations: {:.2}", history.mean_iterations());
    println!("Converged ticks: {:.1}%", 100.0 * history.convergence_rate());
    println!("Cache rebuilds: {rebuilds}, final rho {:.3}", mpc.rho());
    println!("Final tracking error: {:.5}", (&x - &setpoint).norm());
}
