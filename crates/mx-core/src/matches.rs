//! Matches and superstructure index space.

use crate::error::{CoreError, CoreResult};
use crate::stream::StreamSet;
use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Candidate mass-exchange unit: one rich stream, one lean stream, one stage.
///
/// Ordering is rich, then lean, then stage, which is the order matches are
/// enumerated and reported in.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Match {
    pub rich: String,
    pub lean: String,
    /// 1-based stage index
    pub stage: u32,
}

impl Match {
    pub fn new(rich: impl Into<String>, lean: impl Into<String>, stage: u32) -> Self {
        Self {
            rich: rich.into(),
            lean: lean.into(),
            stage,
        }
    }

    /// Same stream pair, different stage.
    pub fn at_stage(&self, stage: u32) -> Self {
        Self {
            rich: self.rich.clone(),
            lean: self.lean.clone(),
            stage,
        }
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.rich, self.lean, self.stage)
    }
}

impl FromStr for Match {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(rich), Some(lean), Some(stage), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CoreError::InvalidArg {
                what: "match label must look like rich:lean:stage",
            });
        };
        let stage = stage.parse::<u32>().map_err(|_| CoreError::InvalidArg {
            what: "match stage must be a positive integer",
        })?;
        if stage == 0 || rich.is_empty() || lean.is_empty() {
            return Err(CoreError::InvalidArg {
                what: "match label must look like rich:lean:stage",
            });
        }
        Ok(Match::new(rich, lean, stage))
    }
}

/// Superstructure kind used to lay out candidate matches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Superstructure {
    /// Stage-by-stage: one stage per concentration interval between supply concentrations.
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "SBS", alias = "sbs"))]
    StageBased,
    /// Stage-wise: user-chosen number of stages, each allowing every pairing.
    #[cfg_attr(feature = "serde", serde(rename = "SWS", alias = "sws"))]
    StageWise,
}

impl Superstructure {
    pub fn as_str(self) -> &'static str {
        match self {
            Superstructure::StageBased => "SBS",
            Superstructure::StageWise => "SWS",
        }
    }

    /// Number of mass-transfer stages for the given streams.
    ///
    /// SBS ignores `stages`; SWS defaults to the larger of the rich and lean
    /// stream counts.
    pub fn stage_count(self, streams: &StreamSet, stages: Option<u32>) -> CoreResult<u32> {
        let count = match self {
            Superstructure::StageBased => {
                let intervals = streams.supply_concentrations().len().saturating_sub(1);
                u32::try_from(intervals).map_err(|_| CoreError::InvalidArg {
                    what: "too many concentration intervals",
                })?
            }
            Superstructure::StageWise => match stages {
                Some(n) => n,
                None => {
                    let n = streams.rich().len().max(streams.lean().len());
                    u32::try_from(n).map_err(|_| CoreError::InvalidArg {
                        what: "too many streams",
                    })?
                }
            },
        };
        if count == 0 {
            return Err(CoreError::InvalidArg {
                what: "superstructure must have at least one stage",
            });
        }
        Ok(count)
    }
}

impl fmt::Display for Superstructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Superstructure {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SBS" => Ok(Superstructure::StageBased),
            "SWS" => Ok(Superstructure::StageWise),
            _ => Err(CoreError::UnknownSuperstructure {
                name: s.to_string(),
            }),
        }
    }
}

/// Every candidate match: rich x lean x stage (stages 1..=stage_count).
pub fn enumerate_matches(streams: &StreamSet, stage_count: u32) -> Vec<Match> {
    let mut out = Vec::with_capacity(streams.rich().len() * streams.lean().len() * stage_count as usize);
    for rich in streams.rich() {
        for lean in streams.lean() {
            for stage in 1..=stage_count {
                out.push(Match::new(rich.name.as_str(), lean.name.as_str(), stage));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Stream;

    fn streams() -> StreamSet {
        StreamSet::new(
            vec![
                Stream::rich("R1", 0.07, 0.0003, 2.0),
                Stream::rich("R2", 0.051, 0.0001, 1.0),
            ],
            vec![
                Stream::lean("S1", 0.0006, 0.031, 1.8),
                Stream::lean("S2", 0.0002, 0.0035, 1.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn sbs_counts_concentration_intervals() {
        let n = Superstructure::StageBased
            .stage_count(&streams(), Some(9))
            .unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn sws_uses_explicit_or_heuristic_stages() {
        let s = streams();
        assert_eq!(Superstructure::StageWise.stage_count(&s, Some(4)).unwrap(), 4);
        assert_eq!(Superstructure::StageWise.stage_count(&s, None).unwrap(), 2);
        assert!(Superstructure::StageWise.stage_count(&s, Some(0)).is_err());
    }

    #[test]
    fn enumeration_order_is_rich_lean_stage() {
        let all = enumerate_matches(&streams(), 2);
        assert_eq!(all.len(), 8);
        assert_eq!(all[0], Match::new("R1", "S1", 1));
        assert_eq!(all[1], Match::new("R1", "S1", 2));
        assert_eq!(all[2], Match::new("R1", "S2", 1));
        let mut sorted = all.clone();
        sorted.sort();
        assert_eq!(sorted, all);
    }

    #[test]
    fn superstructure_parses_case_insensitively() {
        assert_eq!("sbs".parse::<Superstructure>().unwrap(), Superstructure::StageBased);
        assert_eq!("SWS".parse::<Superstructure>().unwrap(), Superstructure::StageWise);
        assert!(matches!(
            "ring".parse::<Superstructure>(),
            Err(CoreError::UnknownSuperstructure { .. })
        ));
    }

    #[test]
    fn match_label_round_trips() {
        let m = Match::new("R1", "S2", 3);
        assert_eq!(m.to_string(), "R1:S2:3");
        assert_eq!("R1:S2:3".parse::<Match>().unwrap(), m);
        assert!("R1:S2".parse::<Match>().is_err());
        assert!("R1:S2:0".parse::<Match>().is_err());
    }
}
