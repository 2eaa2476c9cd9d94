//! Gateway that walks escalation ladders.

use crate::ladder::EscalationLadder;
use crate::service::{SolverService, Termination};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Which ladder to use for a solve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveTier {
    #[default]
    Local,
    Global,
}

/// Tagged result of a gateway solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    LocallyOptimal,
    Infeasible,
    SolverError,
}

impl SolveStatus {
    pub fn is_success(self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::LocallyOptimal)
    }
}

impl From<Termination> for SolveStatus {
    fn from(t: Termination) -> Self {
        match t {
            Termination::Optimal => SolveStatus::Optimal,
            Termination::LocallyOptimal => SolveStatus::LocallyOptimal,
            Termination::Infeasible => SolveStatus::Infeasible,
            Termination::ResourceLimitReached | Termination::EngineError => {
                SolveStatus::SolverError
            }
        }
    }
}

/// One rung attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct AttemptRecord {
    pub engine: String,
    /// Rung index within the engine stage
    pub rung: usize,
    pub outcome: AttemptOutcome,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AttemptOutcome {
    Terminated(Termination),
    /// Acceptable termination but nothing loaded back.
    MissingSolution(Termination),
    Fault(String),
}

impl AttemptOutcome {
    pub fn status(&self) -> SolveStatus {
        match self {
            AttemptOutcome::Terminated(t) => (*t).into(),
            AttemptOutcome::MissingSolution(_) | AttemptOutcome::Fault(_) => {
                SolveStatus::SolverError
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Solved<S> {
    pub solution: S,
    pub status: SolveStatus,
    pub engine: String,
    /// Every attempt made, the successful one last.
    pub attempts: Vec<AttemptRecord>,
}

/// Result of walking a ladder.
#[derive(Clone, Debug, PartialEq)]
pub enum SolveOutcome<S> {
    Solved(Solved<S>),
    /// Every rung failed.
    Exhausted { attempts: Vec<AttemptRecord> },
}

impl<S> SolveOutcome<S> {
    pub fn status(&self) -> SolveStatus {
        match self {
            SolveOutcome::Solved(s) => s.status,
            SolveOutcome::Exhausted { .. } => SolveStatus::SolverError,
        }
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            SolveOutcome::Solved(s) => &s.attempts,
            SolveOutcome::Exhausted { attempts } => attempts,
        }
    }

    pub fn into_solution(self) -> Option<S> {
        match self {
            SolveOutcome::Solved(s) => Some(s.solution),
            SolveOutcome::Exhausted { .. } => None,
        }
    }
}

/// Local and global ladders for one model family.
#[derive(Clone, Debug, PartialEq)]
pub struct SolverGateway {
    pub local: EscalationLadder,
    pub global: EscalationLadder,
}

impl SolverGateway {
    pub fn new(local: EscalationLadder, global: EscalationLadder) -> Self {
        Self { local, global }
    }

    /// Gateway for continuous models. Both tiers use the NLP ladder.
    pub fn for_nlp() -> Self {
        Self::new(EscalationLadder::continuous(), EscalationLadder::continuous())
    }

    pub fn for_minlp() -> Self {
        Self::new(
            EscalationLadder::discrete_local(),
            EscalationLadder::discrete_global(),
        )
    }

    pub fn ladder(&self, tier: SolveTier) -> &EscalationLadder {
        match tier {
            SolveTier::Local => &self.local,
            SolveTier::Global => &self.global,
        }
    }

    /// Try every rung of the tier's ladder in order until one terminates
    /// acceptably with a solution.
    pub fn solve<M, S>(
        &self,
        service: &mut S,
        model: &M,
        tier: SolveTier,
    ) -> SolveOutcome<S::Solution>
    where
        S: SolverService<M>,
    {
        let mut attempts = Vec::new();

        for (engine, rung, options) in self.ladder(tier).rungs() {
            debug!(engine, rung, ?tier, "invoking solver");
            let outcome = match service.invoke(model, engine, options) {
                Ok(raw) if raw.termination.is_acceptable() => match raw.solution {
                    Some(solution) => {
                        attempts.push(AttemptRecord {
                            engine: engine.to_string(),
                            rung,
                            outcome: AttemptOutcome::Terminated(raw.termination),
                        });
                        return SolveOutcome::Solved(Solved {
                            solution,
                            status: raw.termination.into(),
                            engine: engine.to_string(),
                            attempts,
                        });
                    }
                    None => AttemptOutcome::MissingSolution(raw.termination),
                },
                Ok(raw) => AttemptOutcome::Terminated(raw.termination),
                Err(fault) => AttemptOutcome::Fault(fault.message),
            };
            warn!(engine, rung, outcome = ?outcome, "solver rung failed");
            attempts.push(AttemptRecord {
                engine: engine.to_string(),
                rung,
                outcome,
            });
        }

        warn!(attempts = attempts.len(), ?tier, "escalation ladder exhausted");
        SolveOutcome::Exhausted { attempts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineFault;
    use crate::ladder::{EngineStage, OptionSet};
    use crate::service::RawSolve;

    /// Fails the first `fail_for` invocations, then succeeds.
    struct Scripted {
        fail_for: usize,
        calls: Vec<String>,
    }

    impl SolverService<()> for Scripted {
        type Solution = u32;

        fn invoke(
            &mut self,
            _model: &(),
            engine: &str,
            _options: &OptionSet,
        ) -> Result<RawSolve<u32>, EngineFault> {
            self.calls.push(engine.to_string());
            let n = self.calls.len();
            if n <= self.fail_for {
                if n % 2 == 0 {
                    Err(EngineFault::new("executable not found"))
                } else {
                    Ok(RawSolve::failed(Termination::Infeasible))
                }
            } else {
                Ok(RawSolve::solved(Termination::LocallyOptimal, n as u32))
            }
        }
    }

    fn ladder(rungs: &[usize]) -> EscalationLadder {
        EscalationLadder::new(
            rungs
                .iter()
                .enumerate()
                .map(|(i, n)| EngineStage::new(format!("engine{i}"), vec![OptionSet::new(); *n]))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn exhausts_after_every_rung() {
        let lad = ladder(&[2, 3]);
        let gateway = SolverGateway::new(lad.clone(), lad);
        let mut service = Scripted {
            fail_for: usize::MAX,
            calls: vec![],
        };
        let out = gateway.solve(&mut service, &(), SolveTier::Local);
        assert_eq!(service.calls.len(), 5);
        assert_eq!(out.status(), SolveStatus::SolverError);
        match out {
            SolveOutcome::Exhausted { attempts } => {
                assert_eq!(attempts.len(), 5);
                assert_eq!(attempts[2].engine, "engine1");
                assert_eq!(attempts[2].rung, 0);
            }
            SolveOutcome::Solved(_) => panic!("expected exhaustion"),
        }
    }

    #[test]
    fn escalates_across_engines_until_success() {
        let lad = ladder(&[2, 3]);
        let gateway = SolverGateway::new(lad.clone(), lad);
        let mut service = Scripted {
            fail_for: 3,
            calls: vec![],
        };
        let out = gateway.solve(&mut service, &(), SolveTier::Global);
        let SolveOutcome::Solved(solved) = out else {
            panic!("expected success");
        };
        assert_eq!(solved.solution, 4);
        assert_eq!(solved.engine, "engine1");
        assert_eq!(solved.status, SolveStatus::LocallyOptimal);
        assert_eq!(solved.attempts.len(), 4);
        assert!(matches!(solved.attempts[1].outcome, AttemptOutcome::Fault(_)));
    }

    #[test]
    fn acceptable_termination_without_solution_is_a_failure() {
        struct Empty;
        impl SolverService<()> for Empty {
            type Solution = ();
            fn invoke(
                &mut self,
                _: &(),
                _: &str,
                _: &OptionSet,
            ) -> Result<RawSolve<()>, EngineFault> {
                Ok(RawSolve::failed(Termination::Optimal))
            }
        }
        let gateway = SolverGateway::new(ladder(&[1]), ladder(&[1]));
        let out = gateway.solve(&mut Empty, &(), SolveTier::Local);
        assert_eq!(out.attempts().len(), 1);
        assert!(out.into_solution().is_none());
    }

    #[test]
    fn termination_maps_to_status() {
        assert_eq!(SolveStatus::from(Termination::ResourceLimitReached), SolveStatus::SolverError);
        assert_eq!(SolveStatus::from(Termination::Infeasible), SolveStatus::Infeasible);
        assert!(SolveStatus::Optimal.is_success());
    }
}
