use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IterationPhase {
    Init,
    BuildMinlp,
    SolveMinlp,
    MinlpRetry,
    MinlpSolved,
    Refine,
    DeriveBoundaries,
    SolveDetailed,
    CorrectAndCheck,
    Continue,
    Converged,
    Aborted,
    MaxIterations,
}

#[derive(Debug, Clone, Default)]
pub struct RetryProgress {
    pub attempt: u64,
    pub max_attempts: u64,
    pub min_height: Option<f64>,
    pub big_m_scale: f64,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub iteration: usize,
    pub phase: IterationPhase,
    pub elapsed_wall_s: f64,
    pub message: Option<String>,
    pub retry: Option<RetryProgress>,
}

impl ProgressEvent {
    pub fn phase(
        iteration: usize,
        phase: IterationPhase,
        elapsed_wall_s: f64,
        message: Option<String>,
    ) -> Self {
        Self {
            iteration,
            phase,
            elapsed_wall_s,
            message,
            retry: None,
        }
    }
}
