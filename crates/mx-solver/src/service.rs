//! Contract for the external solve capability.

use crate::error::EngineFault;
use crate::ladder::OptionSet;
use serde::{Deserialize, Serialize};

/// Termination condition reported by an engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Optimal,
    LocallyOptimal,
    Infeasible,
    ResourceLimitReached,
    EngineError,
}

impl Termination {
    /// Only optimal and locally optimal terminations count as success.
    pub fn is_acceptable(self) -> bool {
        matches!(self, Termination::Optimal | Termination::LocallyOptimal)
    }
}

/// What one engine invocation produced.
#[derive(Clone, Debug, PartialEq)]
pub struct RawSolve<S> {
    pub termination: Termination,
    /// Solved values, when the engine loaded any back.
    pub solution: Option<S>,
}

impl<S> RawSolve<S> {
    pub fn solved(termination: Termination, solution: S) -> Self {
        Self {
            termination,
            solution: Some(solution),
        }
    }

    pub fn failed(termination: Termination) -> Self {
        Self {
            termination,
            solution: None,
        }
    }
}

/// Something that can run a named engine with an option bag against a model.
///
/// Implementations wrap the actual solver executables. One service can
/// handle several model kinds by implementing the trait once per model type.
pub trait SolverService<M> {
    type Solution;

    fn invoke(
        &mut self,
        model: &M,
        engine: &str,
        options: &OptionSet,
    ) -> Result<RawSolve<Self::Solution>, EngineFault>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acceptable_terminations() {
        assert!(Termination::Optimal.is_acceptable());
        assert!(Termination::LocallyOptimal.is_acceptable());
        assert!(!Termination::Infeasible.is_acceptable());
        assert!(!Termination::ResourceLimitReached.is_acceptable());
        assert!(!Termination::EngineError.is_acceptable());
    }
}
