//! Boundary conditions for the detailed unit models.

use crate::error::{HybridError, HybridResult};
use crate::network::{TopologySolution, UnitBoundary};
use mx_core::{Match, Real};

/// Derive compositions and flows for one active unit of `topology`.
///
/// Stage `k` spans composition boundaries `k` and `k + 1`. The rich stream
/// enters at boundary `k`, the lean stream at boundary `k + 1`. Split
/// solutions replace the unit's lean outlet and rich outlet with their
/// per-match branch compositions.
pub fn derive_boundary(topology: &TopologySolution, unit: &Match) -> HybridResult<UnitBoundary> {
    let fail = |what: String| HybridError::Boundary {
        unit: unit.clone(),
        what,
    };

    let estimate = topology
        .unit(unit)
        .ok_or_else(|| fail("unit missing from topology solution".to_string()))?;

    let k = unit.stage;
    let rich_at = |stage: u32| {
        topology
            .rich_profile
            .get(&(unit.rich.clone(), stage))
            .copied()
            .ok_or_else(|| fail(format!("no rich composition for {} at boundary {stage}", unit.rich)))
    };
    let lean_at = |stage: u32| {
        topology
            .lean_profile
            .get(&(unit.lean.clone(), stage))
            .copied()
            .ok_or_else(|| fail(format!("no lean composition for {} at boundary {stage}", unit.lean)))
    };

    let rich_inlet = rich_at(k)?;
    let lean_inlet = lean_at(k + 1)?;
    let (rich_outlet, lean_outlet) = match &topology.split {
        Some(split) => (
            split
                .rich_outlet
                .get(unit)
                .copied()
                .ok_or_else(|| fail("no split rich outlet".to_string()))?,
            split
                .lean_outlet
                .get(unit)
                .copied()
                .ok_or_else(|| fail("no split lean outlet".to_string()))?,
        ),
        None => (rich_at(k + 1)?, lean_at(k)?),
    };

    let flow = |delta: Real, side: &str| {
        let f = estimate.mass_exchanged / delta;
        if delta > 0.0 && f.is_finite() && f > 0.0 {
            Ok(f)
        } else {
            Err(fail(format!(
                "{side} composition change {delta} gives no usable flow"
            )))
        }
    };

    Ok(UnitBoundary {
        unit: unit.clone(),
        rich_inlet,
        rich_outlet,
        lean_inlet,
        lean_outlet,
        rich_flow: flow(rich_inlet - rich_outlet, "rich")?,
        lean_flow: flow(lean_outlet - lean_inlet, "lean")?,
    })
}

/// Boundaries for every active unit, in match order.
pub fn derive_boundaries(topology: &TopologySolution) -> Vec<(Match, HybridResult<UnitBoundary>)> {
    topology
        .active_units()
        .map(|(m, _)| (m.clone(), derive_boundary(topology, m)))
        .collect()
}
