#![allow(non_snake_case)]

use nalgebra::{Cholesky, DMatrix, DVector, RealField, Scalar, SimdRealField, convert};

use crate::Error;
use crate::util::max_abs;

/// Discrete-time linear plant `x[k+1] = A x[k] + B u[k]` with its quadratic cost.
///
/// The model is owned by whoever linearizes the dynamics. The solver only ever reads
/// it; swapping in a new linearization goes through
/// [`TinySolver::set_plant`](crate::TinySolver::set_plant) so the cached gains get
/// rebuilt.
#[derive(Debug, Clone)]
pub struct PlantModel<F: Scalar> {
    pub(crate) Adyn: DMatrix<F>, // Nx * Nx
    pub(crate) Bdyn: DMatrix<F>, // Nx * Nu
    pub(crate) Q: DMatrix<F>,    // Nx * Nx
    pub(crate) R: DMatrix<F>,    // Nu * Nu
    pub(crate) Qf: DMatrix<F>,   // Nx * Nx
}

impl<F> PlantModel<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    /// Creates a plant whose terminal cost equals the stage cost `Q`.
    ///
    /// ## Arguments
    /// - `Adyn`: State propagation matrix
    /// - `Bdyn`: Input matrix
    /// - `Q`: State penalty, symmetric positive semidefinite
    /// - `R`: Input penalty, symmetric positive definite
    pub fn new(Adyn: DMatrix<F>, Bdyn: DMatrix<F>, Q: DMatrix<F>, R: DMatrix<F>) -> Result<Self, Error> {
        let Qf = Q.clone();
        let plant = Self { Adyn, Bdyn, Q, R, Qf };
        plant.validate()?;
        Ok(plant)
    }

    /// Creates a plant from diagonal state and input penalties.
    pub fn from_diagonal_costs(
        Adyn: DMatrix<F>,
        Bdyn: DMatrix<F>,
        q: &DVector<F>,
        r: &DVector<F>,
    ) -> Result<Self, Error> {
        Self::new(Adyn, Bdyn, DMatrix::from_diagonal(q), DMatrix::from_diagonal(r))
    }

    /// Replaces the terminal cost the Riccati recursion is seeded with.
    pub fn with_terminal_cost(mut self, Qf: DMatrix<F>) -> Result<Self, Error> {
        check_shape("Qf", &Qf, self.nx(), self.nx())?;
        if !is_positive_semidefinite(&Qf) {
            return Err(Error::QNotPositiveSemidefinite);
        }
        self.Qf = Qf;
        Ok(self)
    }

    fn validate(&self) -> Result<(), Error> {
        if !self.Adyn.is_square() {
            return Err(Error::NotSquare("A"));
        }
        let nx = self.Adyn.nrows();
        let nu = self.Bdyn.ncols();
        if nu == 0 {
            return Err(Error::ZeroCount("input dimension"));
        }

        check_shape("B", &self.Bdyn, nx, nu)?;
        check_shape("Q", &self.Q, nx, nx)?;
        check_shape("R", &self.R, nu, nu)?;

        if !is_positive_semidefinite(&self.Q) {
            return Err(Error::QNotPositiveSemidefinite);
        }
        if !is_symmetric(&self.R) || Cholesky::new(self.R.clone()).is_none() {
            return Err(Error::RNotPositiveDefinite);
        }
        Ok(())
    }

    /// Number of states
    pub fn nx(&self) -> usize {
        self.Adyn.nrows()
    }

    /// Number of control inputs
    pub fn nu(&self) -> usize {
        self.Bdyn.ncols()
    }

    pub fn A(&self) -> &DMatrix<F> {
        &self.Adyn
    }

    pub fn B(&self) -> &DMatrix<F> {
        &self.Bdyn
    }

    pub fn Q(&self) -> &DMatrix<F> {
        &self.Q
    }

    pub fn R(&self) -> &DMatrix<F> {
        &self.R
    }

    pub fn Qf(&self) -> &DMatrix<F> {
        &self.Qf
    }

    /// Propagates the nominal dynamics one step.
    pub fn step(&self, x: &DVector<F>, u: &DVector<F>) -> DVector<F> {
        &self.Adyn * x + &self.Bdyn * u
    }
}

fn check_shape<F: Scalar>(what: &'static str, m: &DMatrix<F>, rows: usize, cols: usize) -> Result<(), Error> {
    if m.nrows() != rows {
        return Err(Error::DimensionMismatch { what, expected: rows, got: m.nrows() });
    }
    if m.ncols() != cols {
        return Err(Error::DimensionMismatch { what, expected: cols, got: m.ncols() });
    }
    Ok(())
}

fn is_symmetric<F>(m: &DMatrix<F>) -> bool
where
    F: Scalar + Copy + RealField,
{
    let scale = max_abs(m).max(F::one());
    let tol = scale * convert(1e-9);
    (0..m.nrows()).all(|i| (0..i).all(|j| (m[(i, j)] - m[(j, i)]).abs() <= tol))
}

/// Semidefinite matrices become definite after a tiny diagonal shift.
fn is_positive_semidefinite<F>(m: &DMatrix<F>) -> bool
where
    F: Scalar + Copy + RealField,
{
    if !is_symmetric(m) {
        return false;
    }
    let shift = max_abs(m).max(F::one()) * convert(1e-9);
    let shifted = m + DMatrix::identity(m.nrows(), m.ncols()).scale(shift);
    Cholesky::new(shifted).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dmatrix;

    fn double_integrator() -> (DMatrix<f64>, DMatrix<f64>) {
        (dmatrix![1.0, 0.1; 0.0, 1.0], dmatrix![0.005; 0.1])
    }

    #[test]
    fn accepts_semidefinite_state_cost() {
        let (a, b) = double_integrator();
        let plant = PlantModel::new(a, b, dmatrix![1.0, 0.0; 0.0, 0.0], dmatrix![0.1]).unwrap();
        assert_eq!(plant.nx(), 2);
        assert_eq!(plant.nu(), 1);
        assert_eq!(plant.Qf(), plant.Q());
    }

    #[test]
    fn rejects_indefinite_costs() {
        let (a, b) = double_integrator();
        let err = PlantModel::new(a.clone(), b.clone(), dmatrix![1.0, 0.0; 0.0, -1.0], dmatrix![0.1]);
        assert_eq!(err.unwrap_err(), Error::QNotPositiveSemidefinite);

        let err = PlantModel::new(a, b, DMatrix::identity(2, 2), dmatrix![0.0]);
        assert_eq!(err.unwrap_err(), Error::RNotPositiveDefinite);
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let (a, _) = double_integrator();
        let err = PlantModel::new(a, dmatrix![0.005; 0.1; 0.0], DMatrix::identity(2, 2), dmatrix![0.1]);
        assert_eq!(
            err.unwrap_err(),
            Error::DimensionMismatch { what: "B", expected: 2, got: 3 }
        );
    }

    #[test]
    fn terminal_cost_is_checked() {
        let (a, b) = double_integrator();
        let plant = PlantModel::new(a, b, DMatrix::identity(2, 2), dmatrix![0.1]).unwrap();
        assert!(plant.clone().with_terminal_cost(DMatrix::identity(3, 3)).is_err());

        let plant = plant.with_terminal_cost(DMatrix::identity(2, 2).scale(10.0)).unwrap();
        assert_eq!(plant.Qf()[(0, 0)], 10.0);
    }
}
