use nalgebra::{DVector, RealField, Scalar, SimdRealField, convert};

use crate::Error;

// Default settings
const TINY_DEFAULT_ABS_PRI_TOL: f64 = 1e-03;
const TINY_DEFAULT_ABS_DUA_TOL: f64 = 1e-03;
const TINY_DEFAULT_MAX_ITER: usize = 100;
const TINY_DEFAULT_CHECK_TERMINATION: usize = 1;
const TINY_DEFAULT_WARM_START: bool = true;
const TINY_DEFAULT_RHO: f64 = 5.0;
const TINY_DEFAULT_RHO_MIN: f64 = 1.0;
const TINY_DEFAULT_RHO_MAX: f64 = 100.0;
const TINY_DEFAULT_ADAPT_TOL: f64 = 0.2;
const TINY_DEFAULT_ADAPT_INTERVAL: usize = 1;
const TINY_DEFAULT_ADAPT_EXPONENT: f64 = 0.5;
const TINY_DEFAULT_RICCATI_TOL: f64 = 1e-07;
const TINY_DEFAULT_RICCATI_SWEEPS: usize = 1000;

/// How the cache follows a rho change proposed by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdaptationMethod {
    /// Rerun the Riccati recursion for the new rho.
    #[default]
    Recache,
    /// First-order update from rho sensitivities, no Riccati sweep.
    Taylor,
}

/// Rule turning residuals into a proposed rho. The constants are tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdaptationRule<F> {
    /// `rho * (primal_norm / dual_norm)^exponent` on scale-normalized residuals.
    Proportional { exponent: F },
    /// Multiply by `tau` when primal exceeds `mu` times dual, divide in the opposite case.
    Threshold { mu: F, tau: F },
}

impl<F> Default for AdaptationRule<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    fn default() -> Self {
        AdaptationRule::Proportional {
            exponent: convert(TINY_DEFAULT_ADAPT_EXPONENT),
        }
    }
}

/// Settings for the infinite-horizon Riccati fixed point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheSettings<F> {
    /// Largest change of the cost-to-go between sweeps, relative to its magnitude
    pub tolerance: F,
    pub max_sweeps: usize,
    /// Keep the previous converged gains when a rebuild fails to settle
    pub reject_unconverged: bool,
}

impl<F> Default for CacheSettings<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    fn default() -> Self {
        Self {
            tolerance: convert(TINY_DEFAULT_RICCATI_TOL),
            max_sweeps: TINY_DEFAULT_RICCATI_SWEEPS,
            reject_unconverged: true,
        }
    }
}

impl<F> CacheSettings<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.tolerance.is_finite() && self.tolerance > F::zero()) {
            return Err(Error::InvalidTolerance("riccati tolerance"));
        }
        if self.max_sweeps == 0 {
            return Err(Error::ZeroCount("max_sweeps"));
        }
        Ok(())
    }
}

/// User settings
#[derive(Debug, Clone)]
pub struct SolverConfig<F: Scalar> {
    /// Number of knot points in the horizon
    pub horizon: usize,

    // Per channel input bounds, may be infinite
    pub u_min: DVector<F>,
    pub u_max: DVector<F>,

    /// Optional per state bounds `(x_min, x_max)`
    pub x_bounds: Option<(DVector<F>, DVector<F>)>,

    pub primal_tol: F,
    pub dual_tol: F,
    pub max_iterations: usize,
    /// Evaluate residuals every this many iterations
    pub check_termination: usize,
    /// Shift the previous solution forward instead of starting from zero
    pub warm_start: bool,

    pub rho_init: F,
    pub rho_min: F,
    pub rho_max: F,

    pub adapt_enabled: bool,
    /// Relative rho change below which the cache is left alone
    pub adapt_tolerance: F,
    /// Ticks between adaptation decisions
    pub adapt_interval: usize,
    pub adapt_method: AdaptationMethod,
    pub adapt_rule: AdaptationRule<F>,

    pub cache: CacheSettings<F>,
}

impl<F> SolverConfig<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    /// Configuration with the given input bounds and default settings otherwise.
    pub fn new(horizon: usize, u_min: DVector<F>, u_max: DVector<F>) -> Self {
        Self {
            horizon,
            u_min,
            u_max,
            x_bounds: None,
            primal_tol: convert(TINY_DEFAULT_ABS_PRI_TOL),
            dual_tol: convert(TINY_DEFAULT_ABS_DUA_TOL),
            max_iterations: TINY_DEFAULT_MAX_ITER,
            check_termination: TINY_DEFAULT_CHECK_TERMINATION,
            warm_start: TINY_DEFAULT_WARM_START,
            rho_init: convert(TINY_DEFAULT_RHO),
            rho_min: convert(TINY_DEFAULT_RHO_MIN),
            rho_max: convert(TINY_DEFAULT_RHO_MAX),
            adapt_enabled: false,
            adapt_tolerance: convert(TINY_DEFAULT_ADAPT_TOL),
            adapt_interval: TINY_DEFAULT_ADAPT_INTERVAL,
            adapt_method: AdaptationMethod::default(),
            adapt_rule: AdaptationRule::default(),
            cache: CacheSettings::default(),
        }
    }

    /// Configuration with the same bounds `[lower, upper]` on every input channel.
    pub fn uniform(horizon: usize, nu: usize, lower: F, upper: F) -> Self {
        Self::new(horizon, DVector::from_element(nu, lower), DVector::from_element(nu, upper))
    }

    /// Configuration without any input bounds.
    pub fn unbounded(horizon: usize, nu: usize) -> Self {
        let inf: F = convert(f64::INFINITY);
        Self::uniform(horizon, nu, -inf, inf)
    }

    pub fn with_state_bounds(mut self, x_min: DVector<F>, x_max: DVector<F>) -> Self {
        self.x_bounds = Some((x_min, x_max));
        self
    }

    pub fn with_tolerances(mut self, primal_tol: F, dual_tol: F) -> Self {
        self.primal_tol = primal_tol;
        self.dual_tol = dual_tol;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_check_termination(mut self, every: usize) -> Self {
        self.check_termination = every;
        self
    }

    pub fn with_warm_start(mut self, warm_start: bool) -> Self {
        self.warm_start = warm_start;
        self
    }

    pub fn with_rho(mut self, rho: F) -> Self {
        self.rho_init = rho;
        self
    }

    pub fn with_rho_range(mut self, rho_min: F, rho_max: F) -> Self {
        self.rho_min = rho_min;
        self.rho_max = rho_max;
        self
    }

    pub fn with_adaptation(mut self, enabled: bool) -> Self {
        self.adapt_enabled = enabled;
        self
    }

    pub fn with_adapt_tolerance(mut self, tolerance: F) -> Self {
        self.adapt_tolerance = tolerance;
        self
    }

    pub fn with_adapt_interval(mut self, ticks: usize) -> Self {
        self.adapt_interval = ticks;
        self
    }

    pub fn with_adapt_method(mut self, method: AdaptationMethod) -> Self {
        self.adapt_method = method;
        self
    }

    pub fn with_adapt_rule(mut self, rule: AdaptationRule<F>) -> Self {
        self.adapt_rule = rule;
        self
    }

    pub fn with_cache_settings(mut self, cache: CacheSettings<F>) -> Self {
        self.cache = cache;
        self
    }

    /// Number of input knot points
    pub fn input_horizon(&self) -> usize {
        self.horizon.saturating_sub(1)
    }

    /// Rejects malformed settings for a plant with `nx` states and `nu` inputs.
    pub fn validate(&self, nx: usize, nu: usize) -> Result<(), Error> {
        if self.horizon < 2 {
            return Err(Error::HorizonTooShort(self.horizon));
        }

        check_len("u_min", &self.u_min, nu)?;
        check_len("u_max", &self.u_max, nu)?;
        if let Some(index) = first_crossed(&self.u_min, &self.u_max) {
            return Err(Error::InvalidInputBounds { index });
        }

        if let Some((x_min, x_max)) = &self.x_bounds {
            check_len("x_min", x_min, nx)?;
            check_len("x_max", x_max, nx)?;
            if let Some(index) = first_crossed(x_min, x_max) {
                return Err(Error::InvalidStateBounds { index });
            }
        }

        if !positive(self.primal_tol) {
            return Err(Error::InvalidTolerance("primal_tol"));
        }
        if !positive(self.dual_tol) {
            return Err(Error::InvalidTolerance("dual_tol"));
        }
        if self.max_iterations == 0 {
            return Err(Error::ZeroCount("max_iterations"));
        }
        if self.check_termination == 0 {
            return Err(Error::ZeroCount("check_termination"));
        }

        if !positive(self.rho_init) {
            return Err(Error::NonPositiveRho);
        }
        if !positive(self.rho_min) || !self.rho_max.is_finite() || self.rho_min > self.rho_max {
            return Err(Error::InvalidRhoRange);
        }
        if !(self.adapt_tolerance.is_finite() && self.adapt_tolerance >= F::zero()) {
            return Err(Error::InvalidTolerance("adapt_tolerance"));
        }
        if self.adapt_interval == 0 {
            return Err(Error::ZeroCount("adapt_interval"));
        }
        match self.adapt_rule {
            AdaptationRule::Proportional { exponent } if !positive(exponent) => {
                return Err(Error::InvalidTolerance("adaptation exponent"));
            }
            AdaptationRule::Threshold { mu, tau } if !positive(mu) || !(tau.is_finite() && tau > F::one()) => {
                return Err(Error::InvalidTolerance("adaptation threshold"));
            }
            _ => {}
        }

        self.cache.validate()
    }
}

fn positive<F: Scalar + Copy + RealField>(value: F) -> bool {
    value.is_finite() && value > F::zero()
}

fn check_len<F: Scalar>(what: &'static str, v: &DVector<F>, expected: usize) -> Result<(), Error> {
    if v.len() == expected {
        Ok(())
    } else {
        Err(Error::DimensionMismatch { what, expected, got: v.len() })
    }
}

/// Index of the first component with `min > max`, NaN bounds count as crossed.
fn first_crossed<F: Scalar + Copy + RealField>(min: &DVector<F>, max: &DVector<F>) -> Option<usize> {
    min.iter()
        .zip(max.iter())
        .position(|(lo, hi)| !(lo <= hi))
}
