#![allow(non_snake_case)]

use log::{debug, info, warn};
use nalgebra::{Cholesky, DMatrix, RealField, Scalar, SimdRealField, convert};

use crate::Error;
use crate::plant::PlantModel;
use crate::settings::CacheSettings;
use crate::util::{all_finite, max_abs, max_abs_diff};

/// How trustworthy a set of gains is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// The cost-to-go settled within tolerance.
    Converged,
    /// The sweep budget ran out; gains hold the last iterate.
    Diverged,
    /// First-order extrapolation from rho sensitivities.
    Approximate,
}

/// Matrices that must be recomputed with changes in rho
#[derive(Debug, Clone, PartialEq)]
pub struct RiccatiGains<F: Scalar> {
    pub rho: F,

    /// Infinite-time horizon LQR gain
    pub Kinf: DMatrix<F>, // Nu * Nx
    pub KinfT: DMatrix<F>, // Nx * Nu

    /// Infinite-time horizon cost-to-go
    pub Pinf: DMatrix<F>, // Nx * Nx

    /// Precomputed `inv(R + rho*I + B^T * Pinf * B)`, from its Cholesky factor
    pub Quu_inv: DMatrix<F>, // Nu * Nu

    /// Precomputed `(A - B * Kinf)^T`
    pub AmBKt: DMatrix<F>, // Nx * Nx

    /// Sweeps spent by the recursion
    pub sweeps: usize,
    /// Last change of the cost-to-go, relative to its magnitude
    pub delta: F,
    pub status: CacheStatus,
}

impl<F> RiccatiGains<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    /// Runs the infinite-horizon Riccati recursion for `plant` augmented by `rho`.
    ///
    /// Deterministic in `(plant, rho, settings)`. Running out of sweeps is not an error:
    /// the last iterate is returned with [`CacheStatus::Diverged`].
    pub fn build(plant: &PlantModel<F>, rho: F, settings: &CacheSettings<F>) -> Result<Self, Error> {
        if !(rho.is_finite() && rho > F::zero()) {
            return Err(Error::NonPositiveRho);
        }

        let Nx = plant.nx();
        let Nu = plant.nu();
        let Adyn = &plant.Adyn;
        let Bdyn = &plant.Bdyn;

        // Update by adding rho * identity matrix to Q, R
        let Q1 = &plant.Q + DMatrix::<F>::identity(Nx, Nx).scale(rho);
        let R1 = &plant.R + DMatrix::<F>::identity(Nu, Nu).scale(rho);

        debug!("A = {}", Adyn);
        debug!("B = {}", Bdyn);
        debug!("Q = {}", Q1);
        debug!("R = {}", R1);
        debug!("rho = {} ", rho);

        let At = Adyn.transpose();
        let Bt = Bdyn.transpose();

        // Riccati recursion from the terminal cost to get Pinf
        let mut Pinf = &plant.Qf + DMatrix::<F>::identity(Nx, Nx).scale(rho);
        let mut delta = F::zero();
        let mut sweeps = 0;
        let mut status = CacheStatus::Diverged;

        while sweeps < settings.max_sweeps {
            sweeps += 1;
            let BtP = &Bt * &Pinf;
            let Kinf = factorize(&R1 + &BtP * Bdyn)?.solve(&(&BtP * Adyn));
            let Pnext = &Q1 + &At * &Pinf * (Adyn - Bdyn * &Kinf);
            // Keep the iterate symmetric, Cholesky only reads the lower triangle
            let Pnext = (&Pnext + Pnext.transpose()).scale(convert(0.5));

            if !all_finite(Pnext.iter()) {
                return Err(Error::NonFiniteGains);
            }

            delta = max_abs_diff(&Pnext, &Pinf) / max_abs(&Pnext).max(F::one());
            Pinf = Pnext;

            // if Pinf converges, break
            if delta < settings.tolerance {
                status = CacheStatus::Converged;
                break;
            }
        }

        match status {
            CacheStatus::Converged => debug!("Pinf converged after {} sweeps", sweeps),
            _ => warn!("Pinf did not converge after {} sweeps, last delta {}", sweeps, delta),
        }

        // Compute cached matrices
        let BtP = &Bt * &Pinf;
        let Quu_inv = factorize(&R1 + &BtP * Bdyn)?.inverse();
        let Kinf = &Quu_inv * (&BtP * Adyn);
        let AmBKt = (Adyn - Bdyn * &Kinf).transpose();

        if !all_finite(Kinf.iter().chain(Quu_inv.iter()).chain(AmBKt.iter())) {
            return Err(Error::NonFiniteGains);
        }

        debug!("Kinf = {}", Kinf);
        debug!("Pinf = {}", Pinf);
        debug!("Quu_inv = {}", Quu_inv);
        debug!("AmBKt = {}", AmBKt);
        debug!("Precomputation finished!");

        Ok(Self {
            rho,
            KinfT: Kinf.transpose(),
            Kinf,
            Pinf,
            Quu_inv,
            AmBKt,
            sweeps,
            delta,
            status,
        })
    }

    pub fn is_converged(&self) -> bool {
        self.status == CacheStatus::Converged
    }

    /// Extrapolates the gains to `new_rho` along the stored sensitivities.
    pub fn taylor_update(sensitivity: &RhoSensitivity<F>, new_rho: F) -> Self {
        let base = &sensitivity.base;
        let delta_rho = new_rho - base.rho;

        let Kinf = &base.Kinf + sensitivity.dKinf_drho.scale(delta_rho);
        Self {
            rho: new_rho,
            KinfT: Kinf.transpose(),
            Kinf,
            Pinf: &base.Pinf + sensitivity.dPinf_drho.scale(delta_rho),
            Quu_inv: &base.Quu_inv + sensitivity.dQuu_inv_drho.scale(delta_rho),
            AmBKt: &base.AmBKt + sensitivity.dAmBKt_drho.scale(delta_rho),
            sweeps: 0,
            delta: base.delta,
            status: CacheStatus::Approximate,
        }
    }
}

fn factorize<F>(m: DMatrix<F>) -> Result<Cholesky<F, nalgebra::Dyn>, Error>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    Cholesky::new(m).ok_or(Error::SingularFactorization)
}

/// Derivatives of the cached matrices with respect to rho, taken at `base.rho`.
#[derive(Debug, Clone)]
pub struct RhoSensitivity<F: Scalar> {
    pub base: RiccatiGains<F>,
    pub dKinf_drho: DMatrix<F>,    // Nu * Nx
    pub dPinf_drho: DMatrix<F>,    // Nx * Nx
    pub dQuu_inv_drho: DMatrix<F>, // Nu * Nu
    pub dAmBKt_drho: DMatrix<F>,   // Nx * Nx
}

impl<F> RhoSensitivity<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    /// Central finite differences of [`RiccatiGains::build`] around `base.rho`.
    pub fn finite_difference(
        plant: &PlantModel<F>,
        base: &RiccatiGains<F>,
        settings: &CacheSettings<F>,
    ) -> Result<Self, Error> {
        let h = base.rho * convert(1e-3);
        let plus = RiccatiGains::build(plant, base.rho + h, settings)?;
        let minus = RiccatiGains::build(plant, base.rho - h, settings)?;
        let two_h = h + h;

        Ok(Self {
            base: base.clone(),
            dKinf_drho: (plus.Kinf - minus.Kinf) / two_h,
            dPinf_drho: (plus.Pinf - minus.Pinf) / two_h,
            dQuu_inv_drho: (plus.Quu_inv - minus.Quu_inv) / two_h,
            dAmBKt_drho: (plus.AmBKt - minus.AmBKt) / two_h,
        })
    }
}

/// Result of asking the cache to move to a new rho.
#[derive(Debug, Clone, PartialEq)]
pub enum RebuildOutcome<F> {
    /// The active gains were swapped for gains built at `to`.
    Replaced { from: F, to: F, status: CacheStatus },
    /// The new gains were unusable, the gains at `retained` stay active.
    Rejected { requested: F, retained: F, reason: Error },
}

impl<F: Copy> RebuildOutcome<F> {
    pub fn is_replaced(&self) -> bool {
        matches!(self, RebuildOutcome::Replaced { .. })
    }

    /// rho of the gains active after the rebuild attempt
    pub fn active_rho(&self) -> F {
        match *self {
            RebuildOutcome::Replaced { to, .. } => to,
            RebuildOutcome::Rejected { retained, .. } => retained,
        }
    }
}

/// Owner of the active [`RiccatiGains`].
///
/// Gains are only ever replaced as a whole, between ticks. Nothing in the ADMM
/// iteration triggers a rebuild.
#[derive(Debug, Clone)]
pub struct RiccatiCache<F: Scalar> {
    active: RiccatiGains<F>,
    pub(crate) settings: CacheSettings<F>,
    sensitivity: Option<RhoSensitivity<F>>,
    stale: bool,
    divergences: usize,
}

impl<F> RiccatiCache<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    /// Builds the first set of gains. A recursion that runs out of sweeps is kept in
    /// degraded mode since there is nothing to fall back to.
    pub fn new(plant: &PlantModel<F>, rho: F, settings: CacheSettings<F>) -> Result<Self, Error> {
        settings.validate()?;
        let active = RiccatiGains::build(plant, rho, &settings)?;
        let divergences = usize::from(!active.is_converged());
        Ok(Self {
            active,
            settings,
            sensitivity: None,
            stale: false,
            divergences,
        })
    }

    pub fn gains(&self) -> &RiccatiGains<F> {
        &self.active
    }

    pub fn rho(&self) -> F {
        self.active.rho
    }

    pub fn settings(&self) -> &CacheSettings<F> {
        &self.settings
    }

    pub fn status(&self) -> CacheStatus {
        self.active.status
    }

    /// Rebuilds that failed to settle in a row. A growing count points at an
    /// unstabilizable plant and rho combination.
    pub fn consecutive_divergences(&self) -> usize {
        self.divergences
    }

    /// Marks the gains as belonging to an outdated plant.
    pub fn invalidate(&mut self) {
        self.stale = true;
        self.sensitivity = None;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Rebuilds the gains for `rho` with a full Riccati recursion.
    pub fn rebuild(&mut self, plant: &PlantModel<F>, rho: F) -> RebuildOutcome<F> {
        let from = self.active.rho;
        match RiccatiGains::build(plant, rho, &self.settings) {
            Ok(gains) if gains.is_converged() => {
                self.divergences = 0;
                self.replace(gains, from)
            }
            Ok(gains) => {
                self.divergences += 1;
                let reason = Error::RiccatiDiverged { sweeps: gains.sweeps };
                if self.settings.reject_unconverged && self.active.is_converged() {
                    self.reject(rho, reason)
                } else {
                    self.replace(gains, from)
                }
            }
            Err(reason) => {
                self.divergences += 1;
                self.reject(rho, reason)
            }
        }
    }

    /// Moves the gains to `rho` by first-order extrapolation.
    ///
    /// Sensitivities are taken once, around the first converged gains they are
    /// requested for, and reused until the plant changes.
    pub fn taylor_update(&mut self, plant: &PlantModel<F>, rho: F) -> RebuildOutcome<F> {
        if self.stale {
            return self.rebuild(plant, rho);
        }

        if self.sensitivity.is_none() {
            let base = match self.exact_base(plant) {
                Ok(base) => base,
                Err(reason) => return self.reject(rho, reason),
            };
            match RhoSensitivity::finite_difference(plant, &base, &self.settings) {
                Ok(sensitivity) => self.sensitivity = Some(sensitivity),
                Err(reason) => return self.reject(rho, reason),
            }
        }

        let from = self.active.rho;
        let Some(sensitivity) = &self.sensitivity else {
            return self.reject(rho, Error::NonFiniteGains);
        };
        let gains = RiccatiGains::taylor_update(sensitivity, rho);
        if !all_finite(gains.Kinf.iter().chain(gains.Quu_inv.iter()).chain(gains.AmBKt.iter())) {
            return self.reject(rho, Error::NonFiniteGains);
        }
        self.replace(gains, from)
    }

    /// Exactly built gains around which sensitivities are taken.
    fn exact_base(&self, plant: &PlantModel<F>) -> Result<RiccatiGains<F>, Error> {
        if self.active.is_converged() {
            return Ok(self.active.clone());
        }
        let base = RiccatiGains::build(plant, self.active.rho, &self.settings)?;
        if base.is_converged() {
            Ok(base)
        } else {
            Err(Error::RiccatiDiverged { sweeps: base.sweeps })
        }
    }

    fn replace(&mut self, gains: RiccatiGains<F>, from: F) -> RebuildOutcome<F> {
        let to = gains.rho;
        let status = gains.status;
        self.active = gains;
        self.stale = false;
        info!("Riccati cache moved from rho {} to {} ({:?})", from, to, status);
        RebuildOutcome::Replaced { from, to, status }
    }

    fn reject(&mut self, requested: F, reason: Error) -> RebuildOutcome<F> {
        let retained = self.active.rho;
        warn!(
            "Riccati rebuild for rho {} rejected ({}), keeping rho {}",
            requested, reason, retained
        );
        RebuildOutcome::Rejected { requested, retained, reason }
    }
}
