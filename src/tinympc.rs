#![allow(non_snake_case)]

use log::info;
use nalgebra::{DMatrix, DVector, RealField, Scalar, SimdRealField, convert};

use crate::Error;
use crate::cache::{CacheStatus, RebuildOutcome, RiccatiCache, RiccatiGains};
use crate::plant::PlantModel;
use crate::reference::Reference;
use crate::rho_adapter::{Residuals, RhoAdapter};
use crate::settings::{AdaptationMethod, SolverConfig};
use crate::util::all_finite;

/// Receding-horizon controller: one [`solve`](TinySolver::solve) per control tick.
///
/// The solver owns its workspace and its [`RiccatiCache`]. Trajectories, slacks and
/// duals persist across ticks and seed the next tick (warm start). The cache is only
/// replaced between ticks, either because the plant changed or because the
/// [`RhoAdapter`] asked for a different penalty.
#[derive(Debug, Clone)]
pub struct TinySolver<F: Scalar> {
    pub(crate) plant: PlantModel<F>,
    pub(crate) config: SolverConfig<F>,
    pub(crate) cache: RiccatiCache<F>,
    pub(crate) adapter: RhoAdapter<F>,
    pub(crate) work: TinyWorkspace<F>,
    ticks: usize,
}

/// Result of one control tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutput<F: Scalar> {
    /// First input of the projected trajectory, always within the input bounds
    pub u0: DVector<F>,
    pub converged: bool,
    pub iterations: usize,
    pub residuals: Residuals<F>,
    /// rho in effect once the tick has returned
    pub rho: F,
    pub cache_status: CacheStatus,
    /// The tick iterated on gains built for a previous plant because their rebuild was rejected
    pub stale_gains: bool,
    /// Set when the cache was asked to move during this tick
    pub rebuild: Option<RebuildOutcome<F>>,
}

/// Problem variables
#[derive(Debug, Clone)]
pub struct TinyWorkspace<F: Scalar> {
    pub(crate) Nx: usize, // Number of states
    pub(crate) Nu: usize, // Number of control inputs
    pub(crate) N: usize,  // Number of knotpoints in the horizon

    // State and inputs
    pub(crate) x: DMatrix<F>, // Nx * N
    pub(crate) u: DMatrix<F>, // Nu * N-1

    // Linear cost matrices
    pub(crate) q: DMatrix<F>, // Nx * N
    pub(crate) r: DMatrix<F>, // Nu * N-1

    // Riccati backward pass terms
    pub(crate) p: DMatrix<F>, // Nx * N
    pub(crate) d: DMatrix<F>, // Nu * N-1

    // Auxiliary variables
    pub(crate) v: DMatrix<F>,    // Nx * N
    pub(crate) vnew: DMatrix<F>, // Nx * N
    pub(crate) z: DMatrix<F>,    // Nu * N-1
    pub(crate) znew: DMatrix<F>, // Nu * N-1

    // Dual variables, unscaled
    pub(crate) g: DMatrix<F>, // Nx * N
    pub(crate) y: DMatrix<F>, // Nu * N-1

    pub(crate) BdynT: DMatrix<F>, // Nu * Nx

    // State and input bounds
    pub(crate) en_state_bound: bool,
    pub(crate) x_min: DMatrix<F>, // Nx * N
    pub(crate) x_max: DMatrix<F>, // Nx * N
    pub(crate) u_min: DMatrix<F>, // Nu * N-1
    pub(crate) u_max: DMatrix<F>, // Nu * N-1

    /// Variables for keeping track of solve status
    pub(crate) residuals: Residuals<F>,
    pub(crate) residual_trace: Vec<Residuals<F>>,
    pub(crate) iter: usize,
    pub(crate) initialized: bool,
}

impl<F> TinyWorkspace<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    fn new(plant: &PlantModel<F>, config: &SolverConfig<F>) -> Self {
        let Nx = plant.nx();
        let Nu = plant.nu();
        let N = config.horizon;

        let inf: F = convert(f64::INFINITY);
        let (en_state_bound, x_min, x_max) = match &config.x_bounds {
            Some((lo, hi)) => (true, repeat_columns(lo, N), repeat_columns(hi, N)),
            None => (
                false,
                DMatrix::from_element(Nx, N, -inf),
                DMatrix::from_element(Nx, N, inf),
            ),
        };

        Self {
            Nx,
            Nu,
            N,
            x: DMatrix::zeros(Nx, N),
            u: DMatrix::zeros(Nu, N - 1),
            q: DMatrix::zeros(Nx, N),
            r: DMatrix::zeros(Nu, N - 1),
            p: DMatrix::zeros(Nx, N),
            d: DMatrix::zeros(Nu, N - 1),
            v: DMatrix::zeros(Nx, N),
            vnew: DMatrix::zeros(Nx, N),
            z: DMatrix::zeros(Nu, N - 1),
            znew: DMatrix::zeros(Nu, N - 1),
            g: DMatrix::zeros(Nx, N),
            y: DMatrix::zeros(Nu, N - 1),
            BdynT: plant.Bdyn.transpose(),
            en_state_bound,
            x_min,
            x_max,
            u_min: repeat_columns(&config.u_min, N - 1),
            u_max: repeat_columns(&config.u_max, N - 1),
            residuals: Residuals::default(),
            residual_trace: Vec::with_capacity(config.max_iterations),
            iter: 0,
            initialized: false,
        }
    }
}

fn repeat_columns<F: Scalar + Copy>(column: &DVector<F>, n: usize) -> DMatrix<F> {
    DMatrix::from_fn(column.len(), n, |r, _| column[r])
}

impl<F> TinySolver<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    /// Creates a new [`TinySolver`] and builds its first Riccati cache at `config.rho_init`.
    ///
    /// Fails fast on malformed configuration. A first cache whose recursion ran out of
    /// sweeps is accepted; check [`cache`](Self::cache) for its status.
    pub fn new(plant: PlantModel<F>, config: SolverConfig<F>) -> Result<Self, Error> {
        config.validate(plant.nx(), plant.nu())?;

        let cache = RiccatiCache::new(&plant, config.rho_init, config.cache)?;
        let adapter = RhoAdapter::from_config(&config);
        let work = TinyWorkspace::new(&plant, &config);

        Ok(Self {
            plant,
            config,
            cache,
            adapter,
            work,
            ticks: 0,
        })
    }

    /// # Solve for the optimal MPC solution
    ///
    /// Runs one control tick from the measured state `x0` towards `reference`.
    ///
    /// Running out of iterations is not an error: the best-effort control is returned
    /// with `converged == false`. Errors are limited to inputs that do not fit the
    /// solver, in which case no state is touched.
    pub fn solve(&mut self, x0: &DVector<F>, reference: &Reference<F>) -> Result<SolveOutput<F>, Error> {
        if x0.len() != self.work.Nx {
            return Err(Error::DimensionMismatch {
                what: "x0",
                expected: self.work.Nx,
                got: x0.len(),
            });
        }
        if !all_finite(x0.iter()) {
            return Err(Error::NonFiniteState);
        }
        reference.check(self.work.Nx, self.work.Nu, self.work.N)?;

        let mut rebuild = None;
        if self.cache.is_stale() {
            rebuild = Some(self.cache.rebuild(&self.plant, self.cache.rho()));
        }

        let stale_gains = self.cache.is_stale();

        let converged = self.admm_solve(x0, reference);
        let residuals = self.work.residuals;
        let iterations = self.work.iter;
        let u0 = self.work.znew.column(0).into_owned();

        // A rejected stale rebuild is retried next tick, rho stays put until then
        self.ticks += 1;
        if !stale_gains {
            if let Some(outcome) = self.adapt_rho(&residuals) {
                rebuild = Some(outcome);
            }
        }

        Ok(SolveOutput {
            u0,
            converged,
            iterations,
            residuals,
            rho: self.cache.rho(),
            cache_status: self.cache.status(),
            stale_gains,
            rebuild,
        })
    }

    /// Moves the cache to the adapter's proposal, if the proposal is worth a rebuild.
    fn adapt_rho(&mut self, residuals: &Residuals<F>) -> Option<RebuildOutcome<F>> {
        if !self.adapter.enabled || !self.ticks.is_multiple_of(self.config.adapt_interval) {
            return None;
        }
        let new_rho = self.adapter.decide(residuals, self.cache.rho())?;
        let outcome = match self.config.adapt_method {
            AdaptationMethod::Recache => self.cache.rebuild(&self.plant, new_rho),
            AdaptationMethod::Taylor => self.cache.taylor_update(&self.plant, new_rho),
        };
        Some(outcome)
    }

    /// Replaces the linearization. The gains are rebuilt at the start of the next tick.
    pub fn set_plant(&mut self, plant: PlantModel<F>) -> Result<(), Error> {
        if plant.nx() != self.work.Nx {
            return Err(Error::DimensionMismatch {
                what: "plant states",
                expected: self.work.Nx,
                got: plant.nx(),
            });
        }
        if plant.nu() != self.work.Nu {
            return Err(Error::DimensionMismatch {
                what: "plant inputs",
                expected: self.work.Nu,
                got: plant.nu(),
            });
        }
        self.work.BdynT = plant.Bdyn.transpose();
        self.plant = plant;
        self.cache.invalidate();
        info!("plant replaced, Riccati cache marked stale");
        Ok(())
    }

    /// Explicitly moves the cache to `rho`, outside of any adaptation.
    pub fn set_rho(&mut self, rho: F) -> Result<RebuildOutcome<F>, Error> {
        if !(rho.is_finite() && rho > F::zero()) {
            return Err(Error::NonPositiveRho);
        }
        Ok(self.cache.rebuild(&self.plant, rho))
    }

    /// Rebuilds the gains for the current plant and rho.
    pub fn rebuild_cache(&mut self) -> RebuildOutcome<F> {
        self.cache.rebuild(&self.plant, self.cache.rho())
    }

    /// Drops the warm start: the next tick starts from zero trajectories and duals.
    pub fn reset(&mut self) {
        self.cold_start();
        self.work.initialized = false;
    }

    pub fn num_iters(&self) -> usize {
        self.work.iter
    }

    /// Number of completed ticks
    pub fn ticks(&self) -> usize {
        self.ticks
    }

    /// Get the system input `u` for the current time
    pub fn u(&self) -> DVector<F> {
        self.get_u_at(0)
    }

    /// Get the system state `x` for the time `i`
    pub fn get_x_at(&self, i: usize) -> DVector<F> {
        self.work.x.column(i).into()
    }

    /// Get the system input `u` for the time `i`
    pub fn get_u_at(&self, i: usize) -> DVector<F> {
        self.work.u.column(i).into()
    }

    /// Get reference to matrix containing state predictions
    pub fn x_matrix(&self) -> &DMatrix<F> {
        &self.work.x
    }

    /// Get reference to matrix containing input predictions
    pub fn u_matrix(&self) -> &DMatrix<F> {
        &self.work.u
    }

    /// Projected state and input trajectories `(v, z)`
    pub fn slacks(&self) -> (&DMatrix<F>, &DMatrix<F>) {
        (&self.work.vnew, &self.work.znew)
    }

    /// State and input duals `(g, y)`
    pub fn duals(&self) -> (&DMatrix<F>, &DMatrix<F>) {
        (&self.work.g, &self.work.y)
    }

    /// Residuals evaluated during the last tick, in iteration order
    pub fn residual_trace(&self) -> &[Residuals<F>] {
        &self.work.residual_trace
    }

    pub fn gains(&self) -> &RiccatiGains<F> {
        self.cache.gains()
    }

    pub fn cache(&self) -> &RiccatiCache<F> {
        &self.cache
    }

    pub fn config(&self) -> &SolverConfig<F> {
        &self.config
    }

    pub fn plant(&self) -> &PlantModel<F> {
        &self.plant
    }

    pub fn rho(&self) -> F {
        self.cache.rho()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheSettings;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    fn double_integrator() -> PlantModel<f64> {
        PlantModel::new(
            dmatrix![1.0, 0.1; 0.0, 1.0],
            dmatrix![0.005; 0.1],
            dmatrix![10.0, 0.0; 0.0, 1.0],
            dmatrix![0.1],
        )
        .unwrap()
    }

    fn solver(config: SolverConfig<f64>) -> TinySolver<f64> {
        TinySolver::new(double_integrator(), config).unwrap()
    }

    #[test]
    fn construction_rejects_bad_config() {
        let config = SolverConfig::uniform(1, 1, -1.0, 1.0);
        assert_eq!(
            TinySolver::new(double_integrator(), config).unwrap_err(),
            Error::HorizonTooShort(1)
        );

        let config = SolverConfig::uniform(10, 1, 1.0, -1.0);
        assert_eq!(
            TinySolver::new(double_integrator(), config).unwrap_err(),
            Error::InvalidInputBounds { index: 0 }
        );
    }

    #[test]
    fn bad_tick_inputs_leave_state_untouched() {
        let mut solver = solver(SolverConfig::uniform(10, 1, -1.0, 1.0));
        let reference = Reference::constant(&dvector![0.0, 0.0], &dvector![0.0], 10);

        let err = solver.solve(&dvector![1.0, 0.0, 0.0], &reference).unwrap_err();
        assert_eq!(err, Error::DimensionMismatch { what: "x0", expected: 2, got: 3 });

        let err = solver.solve(&dvector![f64::NAN, 0.0], &reference).unwrap_err();
        assert_eq!(err, Error::NonFiniteState);

        let short = Reference::constant(&dvector![0.0, 0.0], &dvector![0.0], 5);
        assert!(solver.solve(&dvector![1.0, 0.0], &short).is_err());

        assert_eq!(solver.ticks(), 0);
        assert_eq!(solver.num_iters(), 0);
        assert!(solver.x_matrix().iter().all(|x| *x == 0.0));
    }

    #[test]
    fn unconstrained_tick_converges() {
        let config = SolverConfig::unbounded(20, 1).with_rho(1.0).with_max_iterations(200);
        let mut solver = solver(config);
        let reference = Reference::constant(&dvector![0.0, 0.0], &dvector![0.0], 20);

        let out = solver.solve(&dvector![1.0, 0.0], &reference).unwrap();
        assert!(out.converged);
        assert!(out.iterations < 200);
        assert!(out.residuals.primal < 1e-3 && out.residuals.dual < 1e-3);

        // Nothing is clipped, so the slack agrees with the rollout.
        assert_relative_eq!(out.u0[0], solver.u()[0], epsilon = 1e-3);
        assert!(out.u0[0] < 0.0);
    }

    #[test]
    fn output_respects_input_bounds() {
        let mut solver = solver(SolverConfig::uniform(10, 1, -0.2, 0.2).with_max_iterations(3));
        let reference = Reference::constant(&dvector![0.0, 0.0], &dvector![0.0], 10);

        let out = solver.solve(&dvector![5.0, 0.0], &reference).unwrap();
        assert_eq!(out.iterations, 3);
        assert!(!out.converged);
        assert!(out.u0[0] >= -0.2 && out.u0[0] <= 0.2);
        assert_eq!(solver.residual_trace().len(), 3);
    }

    #[test]
    fn set_plant_marks_cache_stale() {
        let mut solver = solver(SolverConfig::uniform(10, 1, -1.0, 1.0));
        let plant = PlantModel::new(
            dmatrix![1.0, 0.1; 0.0, 1.0],
            dmatrix![0.005; 0.1],
            dmatrix![20.0, 0.0; 0.0, 1.0],
            dmatrix![0.1],
        )
        .unwrap();
        solver.set_plant(plant.clone()).unwrap();
        assert!(solver.cache().is_stale());

        let reference = Reference::constant(&dvector![0.0, 0.0], &dvector![0.0], 10);
        let out = solver.solve(&dvector![0.5, 0.0], &reference).unwrap();
        assert!(out.rebuild.as_ref().is_some_and(RebuildOutcome::is_replaced));
        assert!(!solver.cache().is_stale());

        let expected = RiccatiGains::build(&plant, solver.rho(), solver.cache().settings()).unwrap();
        assert_eq!(solver.gains(), &expected);
    }

    #[test]
    fn rejected_stale_rebuild_is_reported_and_retried() {
        let config = SolverConfig::uniform(10, 1, -1.0, 1.0)
            .with_adaptation(true)
            .with_adapt_interval(1);
        let mut solver = solver(config);
        let rho = solver.rho();
        let plant = PlantModel::new(
            dmatrix![1.0, 0.1; 0.0, 1.0],
            dmatrix![0.005; 0.1],
            dmatrix![20.0, 0.0; 0.0, 1.0],
            dmatrix![0.1],
        )
        .unwrap();
        solver.set_plant(plant).unwrap();
        solver.cache.settings.max_sweeps = 2;

        let reference = Reference::constant(&dvector![0.0, 0.0], &dvector![0.0], 10);
        let out = solver.solve(&dvector![2.0, 0.0], &reference).unwrap();
        assert!(out.stale_gains);
        assert_eq!(
            out.rebuild,
            Some(RebuildOutcome::Rejected {
                requested: rho,
                retained: rho,
                reason: Error::RiccatiDiverged { sweeps: 2 },
            })
        );
        assert_eq!(out.rho, rho);
        assert!(solver.cache().is_stale());

        solver.cache.settings.max_sweeps = CacheSettings::<f64>::default().max_sweeps;
        let out = solver.solve(&dvector![2.0, 0.0], &reference).unwrap();
        assert!(!out.stale_gains);
        assert!(!solver.cache().is_stale());
        assert!(out.rebuild.is_some_and(|r| r.is_replaced()));
    }

    #[test]
    fn set_plant_rejects_other_dimensions() {
        let mut solver = solver(SolverConfig::uniform(10, 1, -1.0, 1.0));
        let plant = PlantModel::new(
            DMatrix::identity(3, 3),
            DMatrix::from_element(3, 1, 0.1),
            DMatrix::identity(3, 3),
            dmatrix![1.0],
        )
        .unwrap();
        assert!(solver.set_plant(plant).is_err());
    }

    #[test]
    fn set_rho_rebuilds_cache() {
        let mut solver = solver(SolverConfig::uniform(10, 1, -1.0, 1.0));
        assert_eq!(solver.set_rho(-1.0), Err(Error::NonPositiveRho));

        let outcome = solver.set_rho(12.0).unwrap();
        assert_eq!(outcome.active_rho(), 12.0);
        assert_eq!(solver.rho(), 12.0);
    }

    #[test]
    fn reset_clears_warm_start() {
        let mut solver = solver(SolverConfig::uniform(10, 1, -1.0, 1.0));
        let reference = Reference::constant(&dvector![0.0, 0.0], &dvector![0.0], 10);
        solver.solve(&dvector![1.0, 0.0], &reference).unwrap();
        assert!(solver.u_matrix().iter().any(|u| *u != 0.0));

        solver.reset();
        let (g, y) = solver.duals();
        assert!(g.iter().chain(y.iter()).all(|v| *v == 0.0));
        assert!(solver.u_matrix().iter().all(|u| *u == 0.0));
    }
}
