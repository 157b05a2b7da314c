use log::trace;
use nalgebra::{RealField, Scalar, SimdRealField, convert};

use crate::settings::{AdaptationRule, SolverConfig};

/// Residual norms of one ADMM iterate, with the scales used to normalize them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Residuals<F> {
    /// Largest constraint violation `|x - v|`, `|u - z|` before projection
    pub primal: F,
    /// Largest slack movement between iterations, times rho
    pub dual: F,
    /// Largest magnitude among constrained primal variables and their slacks
    pub primal_scale: F,
    /// Largest magnitude among the dual variables
    pub dual_scale: F,
}

impl<F> Default for Residuals<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    fn default() -> Self {
        Self {
            primal: F::zero(),
            dual: F::zero(),
            primal_scale: F::zero(),
            dual_scale: F::zero(),
        }
    }
}

/// Proposes a new penalty parameter from the residuals of the last tick.
#[derive(Debug, Clone)]
pub struct RhoAdapter<F> {
    pub enabled: bool,
    pub rho_min: F,
    pub rho_max: F,
    /// Relative change a proposal must exceed to trigger a rebuild
    pub tolerance: F,
    pub rule: AdaptationRule<F>,
}

impl<F> RhoAdapter<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    pub fn from_config(config: &SolverConfig<F>) -> Self {
        Self {
            enabled: config.adapt_enabled,
            rho_min: config.rho_min,
            rho_max: config.rho_max,
            tolerance: config.adapt_tolerance,
            rule: config.adapt_rule,
        }
    }

    /// Predict new rho value. Returns `current_rho` unchanged when disabled.
    pub fn propose(&self, residuals: &Residuals<F>, current_rho: F) -> F {
        if !self.enabled {
            return current_rho;
        }

        let eps: F = convert(1e-10);
        let new_rho = match self.rule {
            AdaptationRule::Proportional { exponent } => {
                let normalized_pri = residuals.primal / (residuals.primal_scale + eps);
                let normalized_dual = residuals.dual / (residuals.dual_scale + eps);

                // Nothing to balance once both residuals vanish
                if normalized_pri <= eps && normalized_dual <= eps {
                    return current_rho;
                }

                let ratio = normalized_pri / (normalized_dual + eps);
                current_rho * ratio.powf(exponent)
            }
            AdaptationRule::Threshold { mu, tau } => {
                if residuals.primal > mu * residuals.dual {
                    current_rho * tau
                } else if residuals.dual > mu * residuals.primal {
                    current_rho / tau
                } else {
                    current_rho
                }
            }
        };

        trace!(
            "rho proposal {} -> {} (primal {}, dual {})",
            current_rho, new_rho, residuals.primal, residuals.dual
        );

        if new_rho.is_finite() {
            new_rho.clamp(self.rho_min, self.rho_max)
        } else {
            current_rho
        }
    }

    /// True when `proposed` differs from `current` enough to pay for a rebuild.
    pub fn exceeds_tolerance(&self, current_rho: F, proposed: F) -> bool {
        (proposed - current_rho).abs() / current_rho > self.tolerance
    }

    /// The rho the cache should move to, if any.
    pub fn decide(&self, residuals: &Residuals<F>, current_rho: F) -> Option<F> {
        let proposed = self.propose(residuals, current_rho);
        self.exceeds_tolerance(current_rho, proposed).then_some(proposed)
    }
}
