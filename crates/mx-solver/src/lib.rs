//! Uniform access to external optimization engines.
//!
//! A [`SolverGateway`] walks an ordered [`EscalationLadder`] of
//! `(engine, options)` rungs against a [`SolverService`] until one rung
//! terminates acceptably. Running out of rungs is reported as a value,
//! never as an error or panic.

pub mod error;
pub mod gateway;
pub mod ladder;
pub mod service;

pub use error::{EngineFault, SolverError, SolverResult};
pub use gateway::{AttemptOutcome, AttemptRecord, SolveOutcome, SolveStatus, SolveTier, Solved, SolverGateway};
pub use ladder::{EngineStage, EscalationLadder, OptionSet, OptionValue};
pub use service::{RawSolve, SolverService, Termination};
