//! Escalation ladders: ordered `(engine, options)` rungs.

use crate::error::{SolverError, SolverResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Scalar engine option.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{b}"),
            OptionValue::Int(i) => write!(f, "{i}"),
            OptionValue::Float(x) => write!(f, "{x}"),
            OptionValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Text(v.to_string())
    }
}

/// Option bag passed to one engine invocation.
pub type OptionSet = BTreeMap<String, OptionValue>;

fn options<const N: usize>(pairs: [(&str, OptionValue); N]) -> OptionSet {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// All rungs tried on one engine before escalating to the next.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineStage {
    pub engine: String,
    #[serde(default = "default_rungs")]
    pub rungs: Vec<OptionSet>,
}

fn default_rungs() -> Vec<OptionSet> {
    vec![OptionSet::new()]
}

impl EngineStage {
    pub fn new(engine: impl Into<String>, rungs: Vec<OptionSet>) -> Self {
        Self {
            engine: engine.into(),
            rungs,
        }
    }
}

/// Ordered list of engine stages, most permissive first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<EngineStage>", into = "Vec<EngineStage>")]
pub struct EscalationLadder {
    stages: Vec<EngineStage>,
}

impl EscalationLadder {
    pub fn new(stages: Vec<EngineStage>) -> SolverResult<Self> {
        if stages.is_empty() {
            return Err(SolverError::InvalidLadder {
                what: "ladder has no engine stages".into(),
            });
        }
        for stage in &stages {
            if stage.engine.trim().is_empty() {
                return Err(SolverError::InvalidLadder {
                    what: "engine name must not be empty".into(),
                });
            }
            if stage.rungs.is_empty() {
                return Err(SolverError::InvalidLadder {
                    what: format!("engine '{}' has no rungs", stage.engine),
                });
            }
        }
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[EngineStage] {
        &self.stages
    }

    /// Total number of `(engine, options)` attempts the ladder can make.
    pub fn rung_count(&self) -> usize {
        self.stages.iter().map(|s| s.rungs.len()).sum()
    }

    /// Every rung in order as `(engine, rung index within engine, options)`.
    pub fn rungs(&self) -> impl Iterator<Item = (&str, usize, &OptionSet)> {
        self.stages.iter().flat_map(|stage| {
            stage
                .rungs
                .iter()
                .enumerate()
                .map(move |(i, opts)| (stage.engine.as_str(), i, opts))
        })
    }

    /// Continuous (NLP) ladder: CONOPT, then IPOPT with progressively
    /// tighter barrier settings.
    pub fn continuous() -> Self {
        Self {
            stages: vec![
                EngineStage::new("conopt", vec![OptionSet::new()]),
                EngineStage::new(
                    "ipopt",
                    vec![
                        OptionSet::new(),
                        options([("mu_strategy", "adaptive".into())]),
                        options([("mu_init", 1e-6.into())]),
                        options([("mu_init", 1e-6.into()), ("bound_push", 1e-6.into())]),
                        options([("mu_init", 1e-5.into()), ("bound_push", 1e-5.into())]),
                    ],
                ),
            ],
        }
    }

    /// Discrete (MINLP) ladder for local solves: DICOPT, BARON, BONMIN.
    pub fn discrete_local() -> Self {
        Self {
            stages: vec![
                dicopt_stage(),
                baron_stage(),
                bonmin_stage(),
            ],
        }
    }

    /// Discrete (MINLP) ladder for global solves: BARON leads.
    pub fn discrete_global() -> Self {
        Self {
            stages: vec![baron_stage(), dicopt_stage(), bonmin_stage()],
        }
    }
}

fn dicopt_stage() -> EngineStage {
    EngineStage::new(
        "dicopt",
        vec![
            OptionSet::new(),
            options([("feaspump", 2i64.into())]),
            options([("optcr", 0.05.into())]),
        ],
    )
}

fn baron_stage() -> EngineStage {
    EngineStage::new(
        "baron",
        vec![
            options([("MaxTime", 1000i64.into())]),
            options([("MaxTime", 1000i64.into()), ("EpsR", 0.02.into())]),
            options([("MaxTime", 1000i64.into()), ("EpsR", 0.05.into())]),
        ],
    )
}

fn bonmin_stage() -> EngineStage {
    let bb = || ("bonmin.algorithm", OptionValue::from("B-BB"));
    EngineStage::new(
        "bonmin",
        vec![
            options([bb()]),
            options([bb(), ("bonmin.allowable_fraction_gap", 0.05.into())]),
            options([bb(), ("bonmin.num_resolve_at_root", 5i64.into())]),
            options([bb(), ("bonmin.num_resolve_at_node", 5i64.into())]),
            options([
                bb(),
                ("mu_strategy", "monotone".into()),
                ("mu_init", 1e-5.into()),
                ("bound_push", 1e-5.into()),
            ]),
            options([
                ("bonmin.algorithm", "B-Hyb".into()),
                ("bonmin.pump_for_minlp", "yes".into()),
                ("pump_for_minlp.time_limit", 90i64.into()),
                ("pump_for_minlp.solution_limit", 7i64.into()),
                ("mu_strategy", "monotone".into()),
                ("mu_init", 1e-5.into()),
                ("bound_push", 1e-5.into()),
            ]),
            options([("bonmin.algorithm", "B-OA".into())]),
        ],
    )
}

impl TryFrom<Vec<EngineStage>> for EscalationLadder {
    type Error = SolverError;

    fn try_from(stages: Vec<EngineStage>) -> Result<Self, Self::Error> {
        Self::new(stages)
    }
}

impl From<EscalationLadder> for Vec<EngineStage> {
    fn from(ladder: EscalationLadder) -> Self {
        ladder.stages
    }
}
