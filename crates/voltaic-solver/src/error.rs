//! Error types for voltaic-solver.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] voltaic_core::Error),

    #[error("no convergence after {iterations} iterations{}", fmt_time(.time))]
    NoConvergence { iterations: usize, time: Option<f64> },

    #[error("timestep {delta:e} too small at t = {time:e}")]
    TimestepTooSmall { delta: f64, time: f64 },

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("invalid analysis configuration: {0}")]
    InvalidConfig(String),
}

fn fmt_time(time: &Option<f64>) -> String {
    match time {
        Some(t) => format!(" at t = {t:e}"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
