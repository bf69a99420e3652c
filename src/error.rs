use thiserror::Error;

/// Errors raised by filter construction and recursion steps.
///
/// Numerical failures are fatal to the run that produced them; degenerate
/// weights are not errors (filters recover by flooring and renormalizing).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The innovation covariance cannot be inverted during an update.
    #[error("innovation covariance is singular")]
    SingularInnovation,

    /// A covariance required to be positive definite failed its Cholesky
    /// factorization.
    #[error("covariance is not positive definite")]
    NonPositiveDefiniteCovariance,

    /// NaN or infinity reached the filter state.
    #[error("non-finite value produced in {0}")]
    NonFinite(&'static str),

    /// Parameters rejected at construction or first use.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, FilterError>;
