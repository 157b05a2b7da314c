//! TinyMPC-style ADMM solver for linear MPC.
//!
//! The solver splits each tick into a cheap ADMM loop around cached
//! infinite-horizon Riccati gains. The gains depend on the penalty `rho` and are
//! only rebuilt between ticks, when the plant changes or when the [`RhoAdapter`]
//! moves `rho` far enough to be worth the Riccati recursion.
//!
//! ```no_run
//! use nalgebra::{dmatrix, dvector};
//! use tinympc_rho::{PlantModel, Reference, SolverConfig, TinySolver};
//!
//! let plant = PlantModel::new(
//!     dmatrix![1.0, 0.1; 0.0, 1.0],
//!     dmatrix![0.005; 0.1],
//!     dmatrix![10.0, 0.0; 0.0, 1.0],
//!     dmatrix![0.1],
//! )?;
//! let mut mpc = TinySolver::new(plant, SolverConfig::uniform(20, 1, -1.0, 1.0))?;
//!
//! let reference = Reference::constant(&dvector![0.0, 0.0], &dvector![0.0], 20);
//! let out = mpc.solve(&dvector![1.0, 0.0], &reference)?;
//! println!("u0 = {}, converged = {}", out.u0, out.converged);
//! # Ok::<(), tinympc_rho::Error>(())
//! ```

mod admm;
mod cache;
mod error;
mod history;
mod plant;
mod reference;
mod rho_adapter;
mod settings;
mod tinympc;
mod util;

pub use cache::{CacheStatus, RebuildOutcome, RhoSensitivity, RiccatiCache, RiccatiGains};
pub use error::Error;
pub use history::{SolveHistory, TickRecord};
pub use plant::PlantModel;
pub use reference::Reference;
pub use rho_adapter::{Residuals, RhoAdapter};
pub use settings::{AdaptationMethod, AdaptationRule, CacheSettings, SolverConfig};
pub use tinympc::{SolveOutput, TinySolver};
