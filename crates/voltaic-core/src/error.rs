//! Error types for voltaic-core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("singular matrix at elimination step {step}")]
    SingularMatrix { step: usize },

    #[error("matrix has not been factored")]
    NotFactored,

    #[error("matrix is frozen; no element at ({row}, {col})")]
    MatrixFrozen { row: usize, col: usize },

    #[error("bad connection on {device}: {reason}")]
    BadConnection { device: String, reason: String },

    #[error("invalid parameter {param} on {device}: {reason}")]
    InvalidParameter {
        device: String,
        param: String,
        reason: String,
    },

    #[error("unknown parameter {param} on {device}")]
    UnknownParameter { device: String, param: String },

    #[error("unknown node: {0}")]
    UnknownNode(String),
}

pub type Result<T> = std::result::Result<T, Error>;
