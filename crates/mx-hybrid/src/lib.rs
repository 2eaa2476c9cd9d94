//! mx-hybrid: the hybrid topology / detailed-design iteration controller.
//!
//! Each iteration solves a simplified discrete topology model, solves a
//! detailed model for every active unit, and feeds the ratio between the
//! two back into the next topology model as correction factors. Model
//! construction and numerical solving stay behind [`NetworkBuilder`] and
//! [`mx_solver::SolverService`].

pub mod boundary;
pub mod controller;
pub mod convergence;
pub mod correction;
pub mod cuts;
pub mod error;
pub mod network;
pub mod progress;
pub mod report;

pub use boundary::{derive_boundaries, derive_boundary};
pub use controller::{BestNetwork, ControllerState, IterationController, StepOutcome};
pub use convergence::{
    Authority, BestSolution, BestTopology, ConvergenceChecker, ConvergenceDecision, CostBreakdown,
    IterationRecord, corrections_stable, objective_gap, objective_gap_met,
};
pub use correction::{CorrectionFactorEngine, CorrectionFilter, DetailedOutcome};
pub use cuts::{BinaryCutGenerator, CutRegistry, ShiftInvariance, TopologyCut};
pub use error::{HybridError, HybridResult};
pub use network::*;
pub use progress::{IterationPhase, ProgressEvent, RetryProgress};
pub use report::{RunReport, save_report};

use mx_core::{Match, enumerate_matches};
use mx_project::ProjectFile;

/// Candidate matches of the project's superstructure.
pub fn superstructure_matches(project: &ProjectFile) -> HybridResult<Vec<Match>> {
    let streams = project.problem.stream_set()?;
    let stages = project
        .hybrid
        .superstruct
        .stage_count(&streams, project.hybrid.stages)?;
    Ok(enumerate_matches(&streams, stages))
}
