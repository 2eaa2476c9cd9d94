//! No-good cuts excluding previously selected topologies.

use mx_core::{Match, Real};
use std::collections::BTreeMap;
use tracing::debug;

/// Whether the same pattern moved by one stage would also fit the superstructure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShiftInvariance {
    /// Nothing is selected at the first stage.
    pub earlier: bool,
    /// Nothing is selected at the last stage.
    pub later: bool,
}

/// The 0/1 selection realized in one iteration.
///
/// As a constraint on a later topology model with selections `y`:
/// `sum over selected (1 - y) + sum over unselected y >= 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct TopologyCut {
    pub iteration: usize,
    pub pattern: BTreeMap<Match, bool>,
    pub shift: ShiftInvariance,
}

impl TopologyCut {
    pub fn selected(&self) -> impl Iterator<Item = &Match> {
        self.pattern.iter().filter(|(_, s)| **s).map(|(m, _)| m)
    }

    pub fn unselected(&self) -> impl Iterator<Item = &Match> {
        self.pattern.iter().filter(|(_, s)| !**s).map(|(m, _)| m)
    }

    /// Left-hand side of the exclusion constraint for `assignment`.
    /// Matches missing from `assignment` count as 0.
    pub fn lhs(&self, assignment: &BTreeMap<Match, Real>) -> Real {
        self.pattern
            .iter()
            .map(|(m, selected)| {
                let y = assignment.get(m).copied().unwrap_or(0.0);
                if *selected { 1.0 - y } else { y }
            })
            .sum()
    }

    pub fn admits(&self, assignment: &BTreeMap<Match, Real>) -> bool {
        self.lhs(assignment) >= 1.0 - 1e-9
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BinaryCutGenerator {
    stage_count: u32,
}

impl BinaryCutGenerator {
    pub fn new(stage_count: u32) -> Self {
        Self { stage_count }
    }

    /// Capture `selection` (rounded at 0.5) as the cut for `iteration`.
    pub fn generate_cut(&self, selection: &BTreeMap<Match, bool>, iteration: usize) -> TopologyCut {
        let selected_at = |stage: u32| selection.iter().any(|(m, s)| *s && m.stage == stage);
        let shift = ShiftInvariance {
            earlier: !selected_at(1),
            later: !selected_at(self.stage_count),
        };
        debug!(
            iteration,
            selected = selection.values().filter(|s| **s).count(),
            shift_earlier = shift.earlier,
            shift_later = shift.later,
            "binary cut generated"
        );
        TopologyCut {
            iteration,
            pattern: selection.clone(),
            shift,
        }
    }
}

/// Cuts keyed by the iteration that produced them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CutRegistry {
    cuts: BTreeMap<usize, TopologyCut>,
}

impl CutRegistry {
    pub fn insert(&mut self, cut: TopologyCut) {
        self.cuts.insert(cut.iteration, cut);
    }

    pub fn get(&self, iteration: usize) -> Option<&TopologyCut> {
        self.cuts.get(&iteration)
    }

    /// All cuts, oldest first.
    pub fn cuts(&self) -> Vec<&TopologyCut> {
        self.cuts.values().collect()
    }

    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }
}
