use nalgebra::{DMatrix, DVector, RealField, Scalar, SimdRealField};

use crate::Error;
use crate::util::shift_columns;

/// Reference window aligned with the solver horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference<F: Scalar> {
    x: DMatrix<F>, // Nx * N
    u: DMatrix<F>, // Nu * N-1
}

impl<F> Reference<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    /// Window from explicit state and input references. `u` must have one column
    /// less than `x`.
    pub fn new(x: DMatrix<F>, u: DMatrix<F>) -> Result<Self, Error> {
        if x.ncols() < 2 {
            return Err(Error::HorizonTooShort(x.ncols()));
        }
        if u.ncols() + 1 != x.ncols() {
            return Err(Error::DimensionMismatch {
                what: "reference inputs",
                expected: x.ncols() - 1,
                got: u.ncols(),
            });
        }
        Ok(Self { x, u })
    }

    /// Holds `x` and `u` over the whole horizon, e.g. a hover set point.
    pub fn constant(x: &DVector<F>, u: &DVector<F>, horizon: usize) -> Self {
        Self {
            x: DMatrix::from_fn(x.len(), horizon, |r, _| x[r]),
            u: DMatrix::from_fn(u.len(), horizon.saturating_sub(1), |r, _| u[r]),
        }
    }

    /// State-only tracking window, the input reference is zero.
    pub fn from_states(x: DMatrix<F>, nu: usize) -> Result<Self, Error> {
        let n = x.ncols();
        Self::new(x, DMatrix::zeros(nu, n.saturating_sub(1)))
    }

    /// Slides the window one knot point forward and appends the new tail.
    pub fn advance(&mut self, x_next: &DVector<F>, u_next: &DVector<F>) {
        shift_columns(&mut self.x);
        shift_columns(&mut self.u);
        if let Some(last) = self.x.ncols().checked_sub(1) {
            self.x.set_column(last, x_next);
        }
        if let Some(last) = self.u.ncols().checked_sub(1) {
            self.u.set_column(last, u_next);
        }
    }

    pub fn x(&self) -> &DMatrix<F> {
        &self.x
    }

    pub fn u(&self) -> &DMatrix<F> {
        &self.u
    }

    pub fn horizon(&self) -> usize {
        self.x.ncols()
    }

    pub(crate) fn check(&self, nx: usize, nu: usize, horizon: usize) -> Result<(), Error> {
        let checks = [
            ("reference horizon", horizon, self.x.ncols()),
            ("reference states", nx, self.x.nrows()),
            ("reference inputs", nu, self.u.nrows()),
        ];
        for (what, expected, got) in checks {
            if expected != got {
                return Err(Error::DimensionMismatch { what, expected, got });
            }
        }
        Ok(())
    }
}
