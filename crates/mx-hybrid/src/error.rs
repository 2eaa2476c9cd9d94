//! Error types for the iteration controller.

use mx_core::{CoreError, Match};
use mx_project::ConfigurationError;
use mx_results::ResultsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HybridError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Model build failed: {what}")]
    Build { what: String },

    #[error("Cannot derive boundary conditions for {unit}: {what}")]
    Boundary { unit: Match, what: String },

    #[error("Controller setup error: {what}")]
    Setup { what: String },

    #[error("Run aborted at iteration {iteration} without a feasible network")]
    RunAborted { iteration: usize },

    #[error("Results error: {0}")]
    Results(#[from] ResultsError),
}

pub type HybridResult<T> = Result<T, HybridError>;
