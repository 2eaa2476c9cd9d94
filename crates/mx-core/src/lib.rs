//! mx-core: stable foundation for mass-exchanger network synthesis.
//!
//! Contains:
//! - numeric (Real + tolerances + float helpers)
//! - stream (rich/lean stream data and the stream set)
//! - matches (match triples, superstructure kinds, match enumeration)
//! - correction (correction coefficients, factors and the per-match map)
//! - error (shared error types)

pub mod correction;
pub mod error;
pub mod matches;
pub mod numeric;
pub mod stream;

// Re-exports: nice ergonomics for downstream crates
pub use correction::{Coefficient, CorrectionFactor, CorrectionMap};
pub use error::{CoreError, CoreResult};
pub use matches::{Match, Superstructure, enumerate_matches};
pub use numeric::*;
pub use stream::{Stream, StreamKind, StreamSet};
