//! Error types for solver configuration and engine invocation.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Invalid escalation ladder: {what}")]
    InvalidLadder { what: String },
}

pub type SolverResult<T> = Result<T, SolverError>;

/// Execution-level failure raised by an engine (missing executable, crash,
/// license problem). Absorbed by the gateway and treated like any other
/// unacceptable rung.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("engine fault: {message}")]
pub struct EngineFault {
    pub message: String,
}

impl EngineFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
