//! Stopping criteria and best-solution tracking.

use crate::correction::DetailedOutcome;
use crate::network::{CapitalCost, TopologySolution, UnitDesign};
use mx_core::{CorrectionMap, Match, Real};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Which solution the iteration's detailed solves were built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    Topology,
    Refinement,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CostBreakdown {
    pub minlp_capital: CapitalCost,
    pub detailed_capital: CapitalCost,
    pub fixed: Real,
    pub utility: Real,
}

/// Snapshot of one completed iteration. Never modified once recorded.
#[derive(Clone, Debug, PartialEq)]
pub struct IterationRecord {
    pub iteration: usize,
    pub minlp_objective: Real,
    /// Detailed capital of successfully solved units plus fixed and utility costs.
    pub real_objective: Real,
    /// `(real - minlp) / real * 100`; `None` when the real objective is zero.
    pub gap_percent: Option<Real>,
    pub unit_success: BTreeMap<Match, bool>,
    pub corrections: CorrectionMap,
    pub discarded: bool,
    pub costs: CostBreakdown,
    /// Number of active units.
    pub unit_count: usize,
    pub authority: Authority,
    pub gap_met: bool,
    pub stable: bool,
    pub converged: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BestSolution {
    pub iteration: usize,
    pub real_objective: Real,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BestTopology {
    pub iteration: usize,
    pub minlp_objective: Real,
}

/// Verdict for one iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConvergenceDecision {
    pub converged: bool,
    pub gap_met: bool,
    pub stable: bool,
    pub discarded: bool,
    /// The iteration became the new best solution.
    pub improved: bool,
}

/// Relative gap `|real - minlp| / real`, undefined for a zero or non-finite real objective.
pub fn objective_gap(real: Real, minlp: Real) -> Option<Real> {
    if real == 0.0 || !real.is_finite() || !minlp.is_finite() {
        return None;
    }
    Some(((real - minlp) / real).abs())
}

pub fn objective_gap_met(real: Real, minlp: Real, tol: Real) -> bool {
    objective_gap(real, minlp).is_some_and(|gap| gap <= tol)
}

/// Every coefficient of every match moved by a ratio inside `[1 - tol, 1 + tol]`.
/// Matches absent from `previous` compare against 1.
pub fn corrections_stable(new: &CorrectionMap, previous: &CorrectionMap, tol: Real) -> bool {
    new.iter().all(|(m, factor)| {
        let prev = previous.factor(m);
        factor.iter().all(|(c, v)| {
            let ratio = v / prev.get(c);
            ratio.is_finite() && ratio >= 1.0 - tol && ratio <= 1.0 + tol
        })
    })
}

/// Owns the iteration log and the best-known solutions.
#[derive(Clone, Debug)]
pub struct ConvergenceChecker {
    tol: Real,
    records: Vec<IterationRecord>,
    best: Option<BestSolution>,
    best_topology: Option<BestTopology>,
}

impl ConvergenceChecker {
    pub fn new(tol: Real) -> Self {
        Self {
            tol,
            records: Vec::new(),
            best: None,
            best_topology: None,
        }
    }

    pub fn tol(&self) -> Real {
        self.tol
    }

    pub fn records(&self) -> &[IterationRecord] {
        &self.records
    }

    pub fn best(&self) -> Option<BestSolution> {
        self.best
    }

    pub fn best_topology(&self) -> Option<BestTopology> {
        self.best_topology
    }

    /// Evaluate iteration `iteration` and append its record.
    ///
    /// An iteration with any failed active unit is discarded: it is
    /// recorded but can neither become the best solution nor satisfy the
    /// objective-gap criterion. Correction stability is checked from
    /// iteration 2 on and only stops the run once a best solution exists.
    pub fn check_convergence(
        &mut self,
        iteration: usize,
        topology: &TopologySolution,
        detailed: &BTreeMap<Match, DetailedOutcome>,
        corrections: &CorrectionMap,
        previous: &CorrectionMap,
        authority: Authority,
    ) -> ConvergenceDecision {
        let minlp = topology.objective;

        let mut unit_success = BTreeMap::new();
        let mut designs: Vec<&UnitDesign> = Vec::new();
        for (m, _) in topology.active_units() {
            let design = detailed.get(m).and_then(DetailedOutcome::design);
            unit_success.insert(m.clone(), design.is_some());
            designs.extend(design);
        }
        let discarded = unit_success.values().any(|ok| !ok);

        let costs = CostBreakdown {
            minlp_capital: topology.simplified_capital(),
            detailed_capital: designs.iter().map(|d| d.capital).sum(),
            fixed: topology.fixed_cost(),
            utility: topology.utility_cost,
        };
        let real = costs.detailed_capital.total() + costs.fixed + costs.utility;

        let improved = !discarded && self.best.is_none_or(|b| real < b.real_objective);
        if improved {
            self.best = Some(BestSolution {
                iteration,
                real_objective: real,
            });
        } else if discarded {
            warn!(iteration, "detailed solve failed for at least one unit, iteration discarded");
        }
        if self.best_topology.is_none_or(|b| minlp < b.minlp_objective) {
            self.best_topology = Some(BestTopology {
                iteration,
                minlp_objective: minlp,
            });
        }

        let gap_met = !discarded && objective_gap_met(real, minlp, self.tol);
        let stable = iteration >= 2 && corrections_stable(corrections, previous, self.tol);
        let converged = gap_met || (stable && self.best.is_some());

        let gap_percent = (real != 0.0).then(|| (real - minlp) / real * 100.0);
        info!(
            iteration,
            minlp_objective = minlp,
            real_objective = real,
            gap_percent = gap_percent.unwrap_or(Real::NAN),
            gap_met,
            stable,
            discarded,
            converged,
            "convergence check"
        );

        self.records.push(IterationRecord {
            iteration,
            minlp_objective: minlp,
            real_objective: real,
            gap_percent,
            unit_count: unit_success.len(),
            unit_success,
            corrections: corrections.clone(),
            discarded,
            costs,
            authority,
            gap_met,
            stable,
            converged,
        });

        ConvergenceDecision {
            converged,
            gap_met,
            stable,
            discarded,
            improved,
        }
    }
}
