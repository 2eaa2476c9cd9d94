//! Project schema definitions.

use mx_core::{CoreResult, Real, Stream, StreamSet, Superstructure};
use mx_solver::{EscalationLadder, SolveTier, SolverGateway};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectFile {
    /// Files written before versioning was introduced have no version field.
    #[serde(default)]
    pub version: u32,
    pub name: String,
    pub problem: ProblemDef,
    #[serde(default)]
    pub hybrid: HybridConfig,
    #[serde(default, skip_serializing_if = "SolverDef::is_default")]
    pub solvers: SolverDef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProblemDef {
    pub rich: Vec<StreamDef>,
    pub lean: Vec<StreamDef>,
}

impl ProblemDef {
    pub fn stream_set(&self) -> CoreResult<StreamSet> {
        StreamSet::new(
            self.rich
                .iter()
                .map(|s| Stream::rich(s.name.as_str(), s.c_in, s.c_out, s.flow))
                .collect(),
            self.lean
                .iter()
                .map(|s| Stream::lean(s.name.as_str(), s.c_in, s.c_out, s.flow))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamDef {
    pub name: String,
    pub c_in: Real,
    pub c_out: Real,
    pub flow: Real,
}

/// Iteration controller settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HybridConfig {
    pub max_iter: u32,
    /// Half-width `f` of the `[1 - f, 1 + f]` band per-iteration correction
    /// ratios are clipped into.
    pub cor_filter_size: Real,
    /// Tolerance shared by the objective-gap and correction-stability criteria.
    pub tol: Real,
    /// Refine each topology with the non-isocompositional split model.
    pub non_iso: bool,
    /// Stage count for SWS superstructures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stages: Option<u32>,
    pub superstruct: Superstructure,
    /// Exclude previously selected topologies from later MINLP solves.
    pub bin_cuts: bool,
    pub minlp_tier: SolveTier,
    pub retry: RetryPolicy,
    /// Discretization element counts tried in order for each detailed unit.
    pub element_schedule: Vec<u32>,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            cor_filter_size: 0.5,
            tol: 0.02,
            non_iso: true,
            stages: None,
            superstruct: Superstructure::StageBased,
            bin_cuts: false,
            minlp_tier: SolveTier::Local,
            retry: RetryPolicy::default(),
            element_schedule: vec![20, 50, 100, 200],
        }
    }
}

/// Perturbation schedule applied when the topology solve fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    pub threshold_steps: u32,
    /// Big-M perturbations tried within each threshold step.
    pub big_m_steps: u32,
    pub initial_min_height: Real,
    pub threshold_shrink: Real,
    pub big_m_shrink: Real,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            threshold_steps: 20,
            big_m_steps: 50,
            initial_min_height: 0.01,
            threshold_shrink: 5.0,
            big_m_shrink: 1.5,
        }
    }
}

impl RetryPolicy {
    /// Minimum-height threshold for 0-based retry step `step`.
    pub fn min_height(&self, step: u32) -> Real {
        self.initial_min_height / ((step as Real + 1.0) * self.threshold_shrink)
    }

    /// Big-M scale after `step + 1` reductions. `step` counts from 0 within
    /// one threshold step, so the scale does not carry over between them.
    pub fn big_m_scale(&self, step: u32) -> Real {
        self.big_m_shrink.powi(-(step as i32 + 1))
    }

    /// Topology attempts made before giving up, counting the first one.
    pub fn max_attempts(&self) -> u64 {
        1 + self.threshold_steps as u64 * (1 + self.big_m_steps as u64)
    }
}

/// Optional ladder overrides. Anything left out uses the built-in ladders.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverDef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nlp: Option<EscalationLadder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minlp_local: Option<EscalationLadder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minlp_global: Option<EscalationLadder>,
}

impl SolverDef {
    pub fn is_default(&self) -> bool {
        self == &SolverDef::default()
    }

    pub fn nlp_gateway(&self) -> SolverGateway {
        let ladder = self.nlp.clone().unwrap_or_else(EscalationLadder::continuous);
        SolverGateway::new(ladder.clone(), ladder)
    }

    pub fn minlp_gateway(&self) -> SolverGateway {
        SolverGateway::new(
            self.minlp_local
                .clone()
                .unwrap_or_else(EscalationLadder::discrete_local),
            self.minlp_global
                .clone()
                .unwrap_or_else(EscalationLadder::discrete_global),
        )
    }
}
