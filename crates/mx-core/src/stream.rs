//! Process stream data.
//!
//! Rich streams give up the transferred component (inlet concentration above
//! outlet), lean streams and mass separating agents pick it up (outlet above
//! inlet). Streams are immutable once a [`StreamSet`] has been built.

use crate::error::{CoreError, CoreResult};
use crate::numeric::{Real, Tolerances, ensure_finite, nearly_equal};
use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Direction of mass transfer for a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StreamKind {
    Rich,
    Lean,
}

/// A single process stream.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Stream {
    pub name: String,
    pub kind: StreamKind,
    /// Inlet (supply) concentration, mass fraction
    pub c_in: Real,
    /// Outlet (target) concentration, mass fraction
    pub c_out: Real,
    /// Flow rate, or the flow capacity for lean streams whose flow is a decision variable
    pub flow: Real,
}

impl Stream {
    pub fn rich(name: impl Into<String>, c_in: Real, c_out: Real, flow: Real) -> Self {
        Self {
            name: name.into(),
            kind: StreamKind::Rich,
            c_in,
            c_out,
            flow,
        }
    }

    pub fn lean(name: impl Into<String>, c_in: Real, c_out: Real, flow: Real) -> Self {
        Self {
            name: name.into(),
            kind: StreamKind::Lean,
            c_in,
            c_out,
            flow,
        }
    }

    /// Mass load the stream can exchange at full flow.
    pub fn load(&self) -> Real {
        (self.c_in - self.c_out).abs() * self.flow
    }

    pub fn validate(&self) -> CoreResult<()> {
        let invalid = |reason| CoreError::InvalidStream {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidArg {
                what: "stream name must not be empty",
            });
        }
        ensure_finite(self.c_in, "stream inlet concentration")?;
        ensure_finite(self.c_out, "stream outlet concentration")?;
        ensure_finite(self.flow, "stream flow")?;
        if self.c_in < 0.0 || self.c_out < 0.0 {
            return Err(invalid("concentrations must be non-negative"));
        }
        if self.flow <= 0.0 {
            return Err(invalid("flow must be positive"));
        }
        match self.kind {
            StreamKind::Rich if self.c_in <= self.c_out => {
                Err(invalid("rich stream inlet must exceed outlet"))
            }
            StreamKind::Lean if self.c_out <= self.c_in => {
                Err(invalid("lean stream outlet must exceed inlet"))
            }
            _ => Ok(()),
        }
    }
}

/// Validated collection of rich and lean streams.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamSet {
    rich: Vec<Stream>,
    lean: Vec<Stream>,
}

impl StreamSet {
    pub fn new(rich: Vec<Stream>, lean: Vec<Stream>) -> CoreResult<Self> {
        if rich.is_empty() {
            return Err(CoreError::InvalidArg {
                what: "at least one rich stream is required",
            });
        }
        if lean.is_empty() {
            return Err(CoreError::InvalidArg {
                what: "at least one lean stream is required",
            });
        }

        let mut names = HashSet::new();
        for (expected, stream) in rich
            .iter()
            .map(|s| (StreamKind::Rich, s))
            .chain(lean.iter().map(|s| (StreamKind::Lean, s)))
        {
            if stream.kind != expected {
                return Err(CoreError::InvalidStream {
                    name: stream.name.clone(),
                    reason: "stream listed under the wrong kind",
                });
            }
            stream.validate()?;
            if !names.insert(stream.name.as_str()) {
                return Err(CoreError::DuplicateStream {
                    name: stream.name.clone(),
                });
            }
        }

        Ok(Self { rich, lean })
    }

    pub fn rich(&self) -> &[Stream] {
        &self.rich
    }

    pub fn lean(&self) -> &[Stream] {
        &self.lean
    }

    pub fn get(&self, name: &str) -> Option<&Stream> {
        self.rich
            .iter()
            .chain(self.lean.iter())
            .find(|s| s.name == name)
    }

    /// Distinct supply concentrations across all streams, highest first.
    pub fn supply_concentrations(&self) -> Vec<Real> {
        let tol = Tolerances::default();
        let mut values: Vec<Real> = Vec::new();
        for stream in self.rich.iter().chain(self.lean.iter()) {
            if !values.iter().any(|v| nearly_equal(*v, stream.c_in, tol)) {
                values.push(stream.c_in);
            }
        }
        values.sort_by(|a, b| b.total_cmp(a));
        values
    }
}
