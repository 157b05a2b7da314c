use nalgebra::{RealField, Scalar, SimdRealField};

use crate::rho_adapter::Residuals;
use crate::tinympc::SolveOutput;

/// One tick as seen by an offline consumer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickRecord<F> {
    pub iterations: usize,
    pub converged: bool,
    pub rho: F,
    pub residuals: Residuals<F>,
}

/// Per-tick solver statistics. Never fed back into the solver.
#[derive(Debug, Clone, Default)]
pub struct SolveHistory<F> {
    records: Vec<TickRecord<F>>,
}

impl<F> SolveHistory<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    pub fn new() -> Self {
        Self { records: Vec::new() }
    }

    pub fn with_capacity(ticks: usize) -> Self {
        Self { records: Vec::with_capacity(ticks) }
    }

    pub fn record(&mut self, output: &SolveOutput<F>) {
        self.records.push(TickRecord {
            iterations: output.iterations,
            converged: output.converged,
            rho: output.rho,
            residuals: output.residuals,
        });
    }

    pub fn records(&self) -> &[TickRecord<F>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_iterations(&self) -> usize {
        self.records.iter().map(|r| r.iterations).sum()
    }

    pub fn mean_iterations(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.total_iterations() as f64 / self.records.len() as f64
    }

    /// Fraction of ticks that met both tolerances.
    pub fn convergence_rate(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let converged = self.records.iter().filter(|r| r.converged).count();
        converged as f64 / self.records.len() as f64
    }

    /// rho in effect at the end of every tick.
    pub fn rho_trace(&self) -> Vec<F> {
        self.records.iter().map(|r| r.rho).collect()
    }
}
