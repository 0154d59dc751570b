//! Error taxonomy for the clustering engine
//!

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error("invalid variant input for '{id}': {msg}")]
    InputValidation { id: String, msg: String },
    #[error("invalid clustering configuration: {msg}")]
    Configuration { msg: String },
    #[error(
        "numerically degenerate assignment distribution for variant '{id}' at iteration {iteration}: {msg}"
    )]
    NumericDegeneracy {
        id: String,
        iteration: usize,
        msg: String,
    },
    #[error("all {requested} requested sampler runs failed, first failure: {first_error}")]
    AllRunsFailed {
        requested: usize,
        first_error: String,
    },
    #[error("failed to read '{path}': {msg}")]
    Io { path: String, msg: String },
}

pub type ClusterResult<T> = Result<T, ClusterError>;

pub(crate) fn invalid_input(id: &str, msg: impl Into<String>) -> ClusterError {
    ClusterError::InputValidation {
        id: id.to_owned(),
        msg: msg.into(),
    }
}

pub(crate) fn invalid_config(msg: impl Into<String>) -> ClusterError {
    ClusterError::Configuration { msg: msg.into() }
}
