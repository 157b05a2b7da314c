use thiserror::Error;

/// Errors raised while setting up or driving a [`TinySolver`](crate::TinySolver).
///
/// Running out of ADMM iterations is not an error: it is reported through
/// [`SolveOutput::converged`](crate::SolveOutput). A Riccati recursion that fails
/// to settle is only surfaced as [`Error::RiccatiDiverged`] inside a rejected
/// [`RebuildOutcome`](crate::RebuildOutcome), never returned from `solve`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("horizon must contain at least 2 knot points, got {0}")]
    HorizonTooShort(usize),

    #[error("input channel {index} has u_min > u_max")]
    InvalidInputBounds { index: usize },

    #[error("state {index} has x_min > x_max")]
    InvalidStateBounds { index: usize },

    #[error("rho must be finite and strictly positive")]
    NonPositiveRho,

    #[error("rho_min must be positive and not exceed rho_max")]
    InvalidRhoRange,

    #[error("{0} must be finite and strictly positive")]
    InvalidTolerance(&'static str),

    #[error("{0} must be non-zero")]
    ZeroCount(&'static str),

    #[error("{what} has dimension {got}, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{0} must be square")]
    NotSquare(&'static str),

    #[error("Q must be symmetric positive semidefinite")]
    QNotPositiveSemidefinite,

    #[error("R must be symmetric positive definite")]
    RNotPositiveDefinite,

    #[error("R + rho*I + B'PB could not be factorized")]
    SingularFactorization,

    #[error("Riccati recursion produced non-finite values")]
    NonFiniteGains,

    #[error("Riccati recursion did not settle within {sweeps} sweeps")]
    RiccatiDiverged { sweeps: usize },

    #[error("measured state contains non-finite values")]
    NonFiniteState,
}

impl Error {
    /// True for the errors that reject a solver setup (as opposed to numerical
    /// trouble while building a cache).
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self,
            Error::SingularFactorization
                | Error::NonFiniteGains
                | Error::RiccatiDiverged { .. }
                | Error::NonFiniteState
        )
    }
}
