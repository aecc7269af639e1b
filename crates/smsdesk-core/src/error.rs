use thiserror::Error;

/// Expected failure conditions of core operations. None of these escape as
/// panics; services turn them into failure responses or `false`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Please sign in first")]
    NotAuthenticated,

    #[error("Storage failure: {0}")]
    Persistence(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),
}
