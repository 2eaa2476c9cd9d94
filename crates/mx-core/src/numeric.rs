use crate::CoreError;

/// Floating point type used throughout system
pub type Real = f64;

/// One tolerance for everything
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Clamp `v` into `[lo, hi]`. NaN passes through unchanged.
pub fn clip(v: Real, lo: Real, hi: Real) -> Real {
    if v < lo {
        lo
    } else if v > hi {
        hi
    } else {
        v
    }
}

/// Ratio `num / den`, or `None` when the result would not be a finite number.
pub fn finite_ratio(num: Real, den: Real) -> Option<Real> {
    if den == 0.0 {
        return None;
    }
    let r = num / den;
    r.is_finite().then_some(r)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn clip_stays_inside_band(v in -10.0f64..10.0, f in 0.001f64..=1.0) {
            let out = clip(v, 1.0 - f, 1.0 + f);
            prop_assert!(out >= 1.0 - f && out <= 1.0 + f);
            if v >= 1.0 - f && v <= 1.0 + f {
                prop_assert_eq!(out, v);
            }
        }
    }
}
