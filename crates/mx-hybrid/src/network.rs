//! Contract with the problem-definition collaborator and the solved-model
//! data it hands back.
//!
//! The controller never looks inside a model. It asks a [`NetworkBuilder`]
//! for a fresh model from declarative inputs, passes it to a solver gateway,
//! and reads the solved values through [`TopologySolution`] and
//! [`UnitDesign`].

use crate::error::HybridResult;
use mx_core::{Coefficient, CorrectionFactor, CorrectionMap, Match, Real};
use mx_solver::SolverService;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Selection value at or above which a unit counts as built.
pub const ACTIVE_SELECTION: Real = 0.99;

/// Annualized capital cost split into column shell and packing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CapitalCost {
    pub shell: Real,
    pub packing: Real,
}

impl CapitalCost {
    pub fn total(&self) -> Real {
        self.shell + self.packing
    }
}

impl std::ops::Add for CapitalCost {
    type Output = CapitalCost;

    fn add(self, rhs: CapitalCost) -> CapitalCost {
        CapitalCost {
            shell: self.shell + rhs.shell,
            packing: self.packing + rhs.packing,
        }
    }
}

impl std::iter::Sum for CapitalCost {
    fn sum<I: Iterator<Item = CapitalCost>>(iter: I) -> Self {
        iter.fold(CapitalCost::default(), |a, b| a + b)
    }
}

/// Simplified-model values for one match.
///
/// Coefficient values are the uncorrected simplified quantities; the
/// topology model multiplies them by the match's correction factor.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitEstimate {
    /// Discrete selection `y`, possibly relaxed.
    pub selection: Real,
    /// Mass exchanged `M`.
    pub mass_exchanged: Real,
    pub mass_transfer: Real,
    pub diameter: Real,
    pub height: Real,
    pub packing_cost: Real,
    pub specific_area: Real,
    /// Corrected capital cost as seen by the simplified model.
    pub capital: CapitalCost,
}

impl UnitEstimate {
    pub fn is_active(&self) -> bool {
        self.selection >= ACTIVE_SELECTION && self.mass_exchanged != 0.0
    }

    /// Selection rounded to a binary.
    pub fn is_selected(&self) -> bool {
        self.selection >= 0.5
    }

    pub fn simplified(&self, c: Coefficient) -> Real {
        match c {
            Coefficient::MassTransfer => self.mass_transfer,
            Coefficient::Diameter => self.diameter,
            Coefficient::Height => self.height,
            Coefficient::PackingCost => self.packing_cost,
            Coefficient::SpecificArea => self.specific_area,
        }
    }
}

/// Per-match compositions of the non-isocompositional split model.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SplitProfile {
    /// Lean composition leaving the unit at its rich-inlet end.
    pub lean_outlet: BTreeMap<Match, Real>,
    /// Rich composition leaving the unit before remixing.
    pub rich_outlet: BTreeMap<Match, Real>,
}

/// Solved values of an initialization, topology or redistribution model.
#[derive(Clone, Debug, PartialEq)]
pub struct TopologySolution {
    pub objective: Real,
    pub units: BTreeMap<Match, UnitEstimate>,
    /// Rich composition at stage boundary `k` (1..=stages+1), keyed by stream.
    pub rich_profile: BTreeMap<(String, u32), Real>,
    /// Lean composition at stage boundary `k` (1..=stages+1), keyed by stream.
    pub lean_profile: BTreeMap<(String, u32), Real>,
    /// Present only for split (non-isocompositional) solutions.
    pub split: Option<SplitProfile>,
    pub fixed_cost_per_unit: Real,
    pub utility_cost: Real,
}

impl TopologySolution {
    pub fn unit(&self, m: &Match) -> Option<&UnitEstimate> {
        self.units.get(m)
    }

    pub fn active_units(&self) -> impl Iterator<Item = (&Match, &UnitEstimate)> {
        self.units.iter().filter(|(_, u)| u.is_active())
    }

    /// Binary selection of every match in `matches`. Missing matches are unselected.
    pub fn selection_pattern(&self, matches: &[Match]) -> BTreeMap<Match, bool> {
        matches
            .iter()
            .map(|m| (m.clone(), self.units.get(m).is_some_and(|u| u.is_selected())))
            .collect()
    }

    pub fn simplified_capital(&self) -> CapitalCost {
        self.units.values().map(|u| u.capital).sum()
    }

    /// Fixed cost charged for every (possibly fractional) selection.
    pub fn fixed_cost(&self) -> Real {
        self.units
            .values()
            .map(|u| self.fixed_cost_per_unit * u.selection)
            .sum()
    }
}

/// Solved values of one detailed unit model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitDesign {
    pub mass_transfer: Real,
    pub diameter: Real,
    pub height: Real,
    pub packing_cost: Real,
    pub specific_area: Real,
    pub capital: CapitalCost,
}

impl UnitDesign {
    pub fn get(&self, c: Coefficient) -> Real {
        match c {
            Coefficient::MassTransfer => self.mass_transfer,
            Coefficient::Diameter => self.diameter,
            Coefficient::Height => self.height,
            Coefficient::PackingCost => self.packing_cost,
            Coefficient::SpecificArea => self.specific_area,
        }
    }
}

/// Boundary conditions handed to a detailed unit model.
///
/// Flows are countercurrent: the rich stream enters where the lean stream
/// leaves.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitBoundary {
    pub unit: Match,
    pub rich_inlet: Real,
    pub rich_outlet: Real,
    pub lean_inlet: Real,
    pub lean_outlet: Real,
    pub rich_flow: Real,
    pub lean_flow: Real,
}

pub struct InitializationRequest<'a> {
    pub corrections: &'a CorrectionMap,
    /// Multiplier on the builder's default big-M.
    pub big_m_scale: Real,
}

pub struct TopologyRequest<'a> {
    pub corrections: &'a CorrectionMap,
    /// No-good cuts from earlier iterations, oldest first.
    pub cuts: Vec<&'a crate::cuts::TopologyCut>,
    /// Minimum height below which initialization units are not preselected.
    /// `None` leaves the builder's default.
    pub min_height: Option<Real>,
    pub big_m_scale: Real,
    pub initial: Option<&'a TopologySolution>,
}

pub struct DetailedRequest<'a> {
    pub boundary: &'a UnitBoundary,
    /// Simplified values of this unit, used as the initial guess.
    pub initial: &'a UnitEstimate,
    pub correction: CorrectionFactor,
    /// Discretization element count.
    pub elements: u32,
}

/// Builds fresh optimization models from declarative inputs.
pub trait NetworkBuilder {
    /// All-matches continuous model solved before each topology attempt.
    type Initialization;
    /// Discrete topology (MINLP) model.
    type Topology;
    /// Non-isocompositional stream-splitting refinement of a fixed topology.
    type Redistribution;
    /// Detailed model of a single unit.
    type Detailed;

    /// Every candidate match of the superstructure.
    fn matches(&self) -> &[Match];

    fn build_initialization(
        &self,
        request: &InitializationRequest<'_>,
    ) -> HybridResult<Self::Initialization>;

    fn build_topology(&self, request: &TopologyRequest<'_>) -> HybridResult<Self::Topology>;

    fn build_redistribution(
        &self,
        topology: &TopologySolution,
    ) -> HybridResult<Self::Redistribution>;

    fn build_detailed(&self, request: &DetailedRequest<'_>) -> HybridResult<Self::Detailed>;
}

/// A solver service able to solve every model kind a builder produces.
pub trait NetworkSolver<B: NetworkBuilder>:
    SolverService<B::Initialization, Solution = TopologySolution>
    + SolverService<B::Topology, Solution = TopologySolution>
    + SolverService<B::Redistribution, Solution = TopologySolution>
    + SolverService<B::Detailed, Solution = UnitDesign>
{
}

impl<B, S> NetworkSolver<B> for S
where
    B: NetworkBuilder,
    S: SolverService<B::Initialization, Solution = TopologySolution>
        + SolverService<B::Topology, Solution = TopologySolution>
        + SolverService<B::Redistribution, Solution = TopologySolution>
        + SolverService<B::Detailed, Solution = UnitDesign>,
{
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(selection: Real, mass: Real) -> UnitEstimate {
        UnitEstimate {
            selection,
            mass_exchanged: mass,
            mass_transfer: 1.0,
            diameter: 1.0,
            height: 1.0,
            packing_cost: 1.0,
            specific_area: 1.0,
            capital: CapitalCost {
                shell: 10.0,
                packing: 5.0,
            },
        }
    }

    #[test]
    fn activity_needs_selection_and_mass() {
        assert!(estimate(1.0, 0.1).is_active());
        assert!(estimate(0.995, 0.1).is_active());
        assert!(!estimate(0.98, 0.1).is_active());
        assert!(!estimate(1.0, 0.0).is_active());
        assert!(estimate(0.6, 0.0).is_selected());
    }

    #[test]
    fn topology_aggregates() {
        let a = Match::new("R1", "S1", 1);
        let b = Match::new("R1", "S1", 2);
        let c = Match::new("R1", "S1", 3);
        let topo = TopologySolution {
            objective: 100.0,
            units: [(a.clone(), estimate(1.0, 0.2)), (b.clone(), estimate(0.0, 0.0))]
                .into_iter()
                .collect(),
            rich_profile: BTreeMap::new(),
            lean_profile: BTreeMap::new(),
            split: None,
            fixed_cost_per_unit: 3.0,
            utility_cost: 7.0,
        };

        assert_eq!(topo.active_units().count(), 1);
        assert_eq!(topo.fixed_cost(), 3.0);
        assert_eq!(topo.simplified_capital().total(), 30.0);

        let pattern = topo.selection_pattern(&[a.clone(), b.clone(), c.clone()]);
        assert_eq!(pattern[&a], true);
        assert_eq!(pattern[&b], false);
        assert_eq!(pattern[&c], false);
    }
}
