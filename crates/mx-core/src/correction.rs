//! Correction factors reconciling the simplified topology model with the
//! detailed unit models.

use crate::matches::Match;
use crate::numeric::Real;
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One of the five corrected quantities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Coefficient {
    MassTransfer,
    Diameter,
    Height,
    PackingCost,
    SpecificArea,
}

impl Coefficient {
    pub const ALL: [Coefficient; 5] = [
        Coefficient::MassTransfer,
        Coefficient::Diameter,
        Coefficient::Height,
        Coefficient::PackingCost,
        Coefficient::SpecificArea,
    ];

    /// Short key used in table columns.
    pub fn key(self) -> &'static str {
        match self {
            Coefficient::MassTransfer => "kw",
            Coefficient::Diameter => "dia",
            Coefficient::Height => "height",
            Coefficient::PackingCost => "pack_cost",
            Coefficient::SpecificArea => "area",
        }
    }
}

/// Multiplicative corrections for one match.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CorrectionFactor {
    pub mass_transfer: Real,
    pub diameter: Real,
    pub height: Real,
    pub packing_cost: Real,
    pub specific_area: Real,
}

impl CorrectionFactor {
    pub const IDENTITY: CorrectionFactor = CorrectionFactor {
        mass_transfer: 1.0,
        diameter: 1.0,
        height: 1.0,
        packing_cost: 1.0,
        specific_area: 1.0,
    };

    pub fn get(&self, c: Coefficient) -> Real {
        match c {
            Coefficient::MassTransfer => self.mass_transfer,
            Coefficient::Diameter => self.diameter,
            Coefficient::Height => self.height,
            Coefficient::PackingCost => self.packing_cost,
            Coefficient::SpecificArea => self.specific_area,
        }
    }

    pub fn with(mut self, c: Coefficient, value: Real) -> Self {
        match c {
            Coefficient::MassTransfer => self.mass_transfer = value,
            Coefficient::Diameter => self.diameter = value,
            Coefficient::Height => self.height = value,
            Coefficient::PackingCost => self.packing_cost = value,
            Coefficient::SpecificArea => self.specific_area = value,
        }
        self
    }

    /// Build a factor coefficient by coefficient.
    pub fn from_fn(mut f: impl FnMut(Coefficient) -> Real) -> Self {
        Coefficient::ALL
            .iter()
            .fold(Self::IDENTITY, |acc, &c| acc.with(c, f(c)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Coefficient, Real)> + '_ {
        Coefficient::ALL.iter().map(move |&c| (c, self.get(c)))
    }

    pub fn is_positive(&self) -> bool {
        self.iter().all(|(_, v)| v.is_finite() && v > 0.0)
    }
}

impl Default for CorrectionFactor {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Running correction state, keyed directly by match.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CorrectionMap {
    factors: BTreeMap<Match, CorrectionFactor>,
}

impl CorrectionMap {
    /// Identity factor for every match.
    pub fn identity(matches: &[Match]) -> Self {
        Self {
            factors: matches
                .iter()
                .map(|m| (m.clone(), CorrectionFactor::IDENTITY))
                .collect(),
        }
    }

    pub fn get(&self, m: &Match) -> Option<&CorrectionFactor> {
        self.factors.get(m)
    }

    /// Factor for `m`, identity when the match has no entry.
    pub fn factor(&self, m: &Match) -> CorrectionFactor {
        self.factors.get(m).copied().unwrap_or_default()
    }

    pub fn insert(&mut self, m: Match, factor: CorrectionFactor) -> Option<CorrectionFactor> {
        self.factors.insert(m, factor)
    }

    pub fn contains(&self, m: &Match) -> bool {
        self.factors.contains_key(m)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Match, &CorrectionFactor)> {
        self.factors.iter()
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Copy of this map restricted to `matches`, filling gaps with identity.
    pub fn covering(&self, matches: &[Match]) -> Self {
        Self {
            factors: matches
                .iter()
                .map(|m| (m.clone(), self.factor(m)))
                .collect(),
        }
    }
}

impl FromIterator<(Match, CorrectionFactor)> for CorrectionMap {
    fn from_iter<T: IntoIterator<Item = (Match, CorrectionFactor)>>(iter: T) -> Self {
        Self {
            factors: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_and_get_address_the_same_field() {
        for c in Coefficient::ALL {
            let f = CorrectionFactor::IDENTITY.with(c, 2.5);
            assert_eq!(f.get(c), 2.5);
            assert_eq!(f.iter().filter(|(_, v)| *v == 2.5).count(), 1);
        }
    }

    #[test]
    fn from_fn_visits_every_coefficient() {
        let f = CorrectionFactor::from_fn(|c| match c {
            Coefficient::Height => 0.5,
            _ => 1.5,
        });
        assert_eq!(f.height, 0.5);
        assert_eq!(f.diameter, 1.5);
        assert!(f.is_positive());
    }

    #[test]
    fn covering_fills_missing_matches_with_identity() {
        let a = Match::new("R1", "S1", 1);
        let b = Match::new("R1", "S1", 2);
        let seeded: CorrectionMap = [(a.clone(), CorrectionFactor::IDENTITY.with(Coefficient::Height, 1.2))]
            .into_iter()
            .collect();

        let full = seeded.covering(&[a.clone(), b.clone()]);
        assert_eq!(full.len(), 2);
        assert_eq!(full.factor(&a).height, 1.2);
        assert_eq!(full.get(&b), Some(&CorrectionFactor::IDENTITY));
    }

    #[test]
    fn coefficient_keys_are_unique() {
        let mut keys: Vec<_> = Coefficient::ALL.iter().map(|c| c.key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 5);
    }
}
