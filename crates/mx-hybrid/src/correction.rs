//! Correction factors between the simplified and detailed models.

use crate::error::{HybridError, HybridResult};
use crate::network::{TopologySolution, UnitDesign};
use mx_core::{CorrectionFactor, CorrectionMap, Match, Real, clip, finite_ratio};
use std::collections::BTreeMap;
use tracing::debug;

/// Result of the detailed solve for one active unit.
#[derive(Clone, Debug, PartialEq)]
pub enum DetailedOutcome {
    Solved(UnitDesign),
    Failed { reason: String },
}

impl DetailedOutcome {
    pub fn design(&self) -> Option<&UnitDesign> {
        match self {
            DetailedOutcome::Solved(d) => Some(d),
            DetailedOutcome::Failed { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DetailedOutcome::Solved(_))
    }
}

/// Bounds each per-iteration ratio to `[1 - size, 1 + size]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CorrectionFilter {
    size: Real,
}

impl CorrectionFilter {
    pub fn new(size: Real) -> HybridResult<Self> {
        if !(size.is_finite() && size > 0.0 && size <= 1.0) {
            return Err(HybridError::Setup {
                what: format!("correction filter size {size} must lie in (0, 1]"),
            });
        }
        Ok(Self { size })
    }

    pub fn size(&self) -> Real {
        self.size
    }

    pub fn apply(&self, ratio: Real) -> Real {
        clip(ratio, 1.0 - self.size, 1.0 + self.size)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CorrectionFactorEngine {
    filter: CorrectionFilter,
}

impl CorrectionFactorEngine {
    pub fn new(filter: CorrectionFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> CorrectionFilter {
        self.filter
    }

    /// New correction map from the detailed outcomes of one iteration.
    ///
    /// Every match of `prior` gets an entry. A match is updated only when it
    /// is active in `simplified` and its detailed solve succeeded; every
    /// other match, and any coefficient whose corrected value would not be
    /// finite and positive, keeps its prior value.
    pub fn compute_corrections(
        &self,
        detailed: &BTreeMap<Match, DetailedOutcome>,
        simplified: &TopologySolution,
        prior: &CorrectionMap,
    ) -> CorrectionMap {
        prior
            .iter()
            .map(|(m, previous)| {
                let design = simplified
                    .unit(m)
                    .filter(|u| u.is_active())
                    .zip(detailed.get(m).and_then(DetailedOutcome::design));
                let next = match design {
                    Some((estimate, design)) => CorrectionFactor::from_fn(|c| {
                        let prev = previous.get(c);
                        let next = finite_ratio(design.get(c), estimate.simplified(c) * prev)
                            .map(|ratio| self.filter.apply(ratio) * prev)
                            .filter(|v| v.is_finite() && *v > 0.0);
                        match next {
                            Some(v) => v,
                            None => {
                                debug!(unit = %m, coefficient = c.key(), "no positive corrected value, keeping prior");
                                prev
                            }
                        }
                    }),
                    None => *previous,
                };
                (m.clone(), next)
            })
            .collect()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::network::{CapitalCost, UnitEstimate};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn new_factor_stays_within_filter_band_of_prior(
            f in 0.01f64..=1.0,
            prior in 0.1f64..10.0,
            simplified in 0.01f64..100.0,
            detailed in 0.0f64..1000.0,
        ) {
            let m = Match::new("R", "S", 1);
            let estimate = UnitEstimate {
                selection: 1.0,
                mass_exchanged: 1.0,
                mass_transfer: simplified,
                diameter: simplified,
                height: simplified,
                packing_cost: simplified,
                specific_area: simplified,
                capital: CapitalCost::default(),
            };
            let design = UnitDesign {
                mass_transfer: detailed,
                diameter: detailed,
                height: detailed,
                packing_cost: detailed,
                specific_area: detailed,
                capital: CapitalCost::default(),
            };
            let topo = TopologySolution {
                objective: 0.0,
                units: BTreeMap::from([(m.clone(), estimate)]),
                rich_profile: BTreeMap::new(),
                lean_profile: BTreeMap::new(),
                split: None,
                fixed_cost_per_unit: 0.0,
                utility_cost: 0.0,
            };
            let prior_map: CorrectionMap =
                [(m.clone(), CorrectionFactor::from_fn(|_| prior))].into_iter().collect();
            let detailed_map = BTreeMap::from([(m.clone(), DetailedOutcome::Solved(design))]);

            let engine = CorrectionFactorEngine::new(CorrectionFilter::new(f).unwrap());
            let out = engine.compute_corrections(&detailed_map, &topo, &prior_map);

            prop_assert!(out.factor(&m).is_positive());
            for (_, v) in out.factor(&m).iter() {
                let ratio = v / prior;
                prop_assert!(ratio >= 1.0 - f - 1e-9);
                prop_assert!(ratio <= 1.0 + f + 1e-9);
            }
        }
    }
}
