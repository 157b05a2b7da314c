#![allow(non_snake_case)]

use log::{debug, trace};
use nalgebra::{DVector, RealField, Scalar, SimdRealField};

use crate::TinySolver;
use crate::reference::Reference;
use crate::rho_adapter::Residuals;
use crate::util::{max_abs, max_abs_diff, shift_columns};

impl<F> TinySolver<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    /// Update linear terms from Riccati backward pass
    pub(crate) fn backward_pass_grad(&mut self) {
        let gains = self.cache.gains();
        let work = &mut self.work;
        for i in (0..work.N - 1).rev() {
            let Bt_p = &work.BdynT * work.p.column(i + 1);
            work.d.set_column(i, &(&gains.Quu_inv * (Bt_p + work.r.column(i))));

            let p = work.q.column(i) + &gains.AmBKt * work.p.column(i + 1)
                - &gains.KinfT * work.r.column(i);
            work.p.set_column(i, &p);
        }
    }

    /// Use LQR feedback policy to roll out trajectory
    pub(crate) fn forward_pass(&mut self) {
        let gains = self.cache.gains();
        let plant = &self.plant;
        let work = &mut self.work;
        for i in 0..work.N - 1 {
            let u = -&gains.Kinf * work.x.column(i) - work.d.column(i);
            let x = &plant.Adyn * work.x.column(i) + &plant.Bdyn * &u;
            work.u.set_column(i, &u);
            work.x.set_column(i + 1, &x);
        }
    }

    /// Project slack (auxiliary) variables into their feasible domain
    pub(crate) fn update_slack(&mut self) {
        let inv_rho = F::one() / self.cache.rho();
        let work = &mut self.work;

        work.znew
            .zip_zip_apply(&work.u, &work.y, |z, u, y| *z = u + y * inv_rho);
        work.vnew
            .zip_zip_apply(&work.x, &work.g, |v, x, g| *v = x + g * inv_rho);

        // Box constraints on input
        work.znew
            .zip_zip_apply(&work.u_min, &work.u_max, |u, min, max| *u = (*u).clamp(min, max));

        // Box constraints on state
        if work.en_state_bound {
            work.vnew
                .zip_zip_apply(&work.x_min, &work.x_max, |x, min, max| *x = (*x).clamp(min, max));
        }
    }

    /// Dual ascent on the constraint violation, duals are kept unscaled
    pub(crate) fn update_dual(&mut self) {
        let rho = self.cache.rho();
        let work = &mut self.work;
        work.y
            .zip_zip_apply(&work.u, &work.znew, |y, u, z| *y += rho * (u - z));
        work.g
            .zip_zip_apply(&work.x, &work.vnew, |g, x, v| *g += rho * (x - v));
    }

    /// Update linear control cost terms in the Riccati feedback using the changing slack and dual variables from ADMM
    pub(crate) fn update_linear_cost(&mut self, reference: &Reference<F>) {
        let rho = self.cache.rho();
        let gains = self.cache.gains();
        let plant = &self.plant;
        let work = &mut self.work;

        // r = -R * uref + y - rho * z
        work.r.gemm(-F::one(), &plant.R, reference.u(), F::zero());
        work.r
            .zip_zip_apply(&work.y, &work.znew, |r, y, z| *r += y - rho * z);

        // q = -Q * xref + g - rho * v
        work.q.gemm(-F::one(), &plant.Q, reference.x(), F::zero());
        work.q
            .zip_zip_apply(&work.g, &work.vnew, |q, g, v| *q += g - rho * v);

        // p
        let last = work.N - 1;
        let p = -(&gains.Pinf * reference.x().column(last)) + work.g.column(last)
            - work.vnew.column(last).scale(rho);
        work.p.set_column(last, &p);
    }

    /// Largest primal and dual residuals over states and inputs.
    pub(crate) fn compute_residuals(&self) -> Residuals<F> {
        let rho = self.cache.rho();
        let work = &self.work;

        let primal = max_abs_diff(&work.x, &work.vnew).max(max_abs_diff(&work.u, &work.znew));
        let dual = rho * max_abs_diff(&work.v, &work.vnew).max(max_abs_diff(&work.z, &work.znew));

        let primal_scale = max_abs(&work.x)
            .max(max_abs(&work.vnew))
            .max(max_abs(&work.u))
            .max(max_abs(&work.znew));
        let dual_scale = max_abs(&work.y).max(max_abs(&work.g));

        Residuals {
            primal,
            dual,
            primal_scale,
            dual_scale,
        }
    }

    /// Check for termination condition by evaluating whether the largest absolute primal and dual residuals for states and inputs are below threshold.
    ///
    /// Residuals are evaluated every `check_termination` iterations, or when `force` is set.
    pub(crate) fn termination_condition(&mut self, force: bool) -> bool {
        if !force && !self.work.iter.is_multiple_of(self.config.check_termination) {
            return false;
        }

        let residuals = self.compute_residuals();
        trace!(
            "iter {} primal {} dual {}",
            self.work.iter, residuals.primal, residuals.dual
        );
        self.work.residuals = residuals;
        self.work.residual_trace.push(residuals);

        residuals.primal < self.config.primal_tol && residuals.dual < self.config.dual_tol
    }

    /// Shift the previous tick's solution one knot point forward.
    pub(crate) fn warm_start(&mut self) {
        let work = &mut self.work;
        for m in [
            &mut work.x,
            &mut work.u,
            &mut work.vnew,
            &mut work.znew,
            &mut work.g,
            &mut work.y,
        ] {
            shift_columns(m);
        }
        work.v.copy_from(&work.vnew);
        work.z.copy_from(&work.znew);
    }

    /// Zero trajectories, slacks and duals.
    pub(crate) fn cold_start(&mut self) {
        let work = &mut self.work;
        for m in [
            &mut work.x,
            &mut work.u,
            &mut work.q,
            &mut work.r,
            &mut work.p,
            &mut work.d,
            &mut work.v,
            &mut work.vnew,
            &mut work.z,
            &mut work.znew,
            &mut work.g,
            &mut work.y,
        ] {
            m.fill(F::zero());
        }
    }

    /// Runs ADMM for one tick from the measured state `x0`. Returns whether both
    /// residuals met their tolerance within the iteration budget.
    pub(crate) fn admm_solve(&mut self, x0: &DVector<F>, reference: &Reference<F>) -> bool {
        if self.config.warm_start && self.work.initialized {
            self.warm_start();
        } else {
            self.cold_start();
        }
        self.work.initialized = true;
        self.work.iter = 0;
        self.work.residual_trace.clear();
        self.work.x.set_column(0, x0);

        self.update_linear_cost(reference);
        self.backward_pass_grad();

        let max_iter = self.config.max_iterations;
        for _ in 0..max_iter {
            // Solve linear system with Riccati and roll out to get new trajectory
            self.forward_pass();

            // Project slack variables into feasible domain
            self.update_slack();

            // Compute next iteration of dual variables
            self.update_dual();

            // Update linear control cost terms using reference trajectory, duals, and slack variables
            self.update_linear_cost(reference);

            self.work.iter += 1;

            // Check for whether cost is minimized by calculating residuals
            let converged = self.termination_condition(self.work.iter == max_iter);

            // Save previous slack variables
            self.work.v.copy_from(&self.work.vnew);
            self.work.z.copy_from(&self.work.znew);

            if converged {
                debug!("Solver converged in {} iterations", self.work.iter);
                return true;
            }

            self.backward_pass_grad();
        }

        debug!(
            "Solver stopped after {} iterations, primal {} dual {}",
            self.work.iter, self.work.residuals.primal, self.work.residuals.dual
        );
        false
    }
}
