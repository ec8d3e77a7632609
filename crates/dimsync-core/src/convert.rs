#![forbid(unsafe_code)]

//! Bidirectional px ↔ percent conversion.
//!
//! Pure arithmetic over a caller-supplied [`ReferenceBox`]; this module
//! never resolves references itself.
//!
//! # Invariants
//!
//! 1. `from == to` returns the value unchanged, reference or not.
//! 2. Zero is absorbing: converting 0 yields 0 under any reference.
//! 3. px→percent rounds to 1 decimal place; percent→px rounds to the
//!    nearest integer.
//! 4. The result is never NaN and the function never panics: a missing
//!    or invalid reference (and any pair involving `auto`) returns the
//!    input unconverted, flagged as degraded.

use crate::reference::ReferenceBox;
use crate::value::Unit;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Outcome of a conversion. `degraded` marks results that came back
/// unconverted (invalid reference, unsupported unit pair, non-finite
/// input) so callers can badge approximate values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    pub value: f64,
    pub degraded: bool,
}

impl Conversion {
    const fn exact(value: f64) -> Self {
        Self {
            value,
            degraded: false,
        }
    }

    const fn degraded(value: f64) -> Self {
        Self {
            value,
            degraded: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Convert `value` between units against the given reference, reporting
/// whether the result is degraded.
#[must_use]
pub fn convert_with(
    value: f64,
    from: Unit,
    to: Unit,
    reference: Option<&ReferenceBox>,
) -> Conversion {
    if !value.is_finite() {
        tracing::warn!(?from, ?to, "non-finite conversion input, returning zero");
        return Conversion::degraded(0.0);
    }
    if from == to {
        return Conversion::exact(value);
    }
    if value == 0.0 {
        return Conversion::exact(0.0);
    }

    let size_px = match reference {
        Some(r) if r.is_valid && r.size_px > 0.0 => r.size_px,
        _ => {
            tracing::warn!(
                ?from,
                ?to,
                value,
                "conversion without a usable reference, returning unconverted value"
            );
            return Conversion::degraded(value);
        }
    };

    match (from, to) {
        (Unit::Px, Unit::Percent) => {
            let pct = (value / size_px) * 100.0;
            Conversion::exact((pct * 10.0).round() / 10.0)
        }
        (Unit::Percent, Unit::Px) => Conversion::exact((value * size_px / 100.0).round()),
        _ => {
            tracing::warn!(?from, ?to, "unsupported unit pair, returning unconverted value");
            Conversion::degraded(value)
        }
    }
}

/// [`convert_with`] without the degraded flag.
#[must_use]
pub fn convert(value: f64, from: Unit, to: Unit, reference: Option<&ReferenceBox>) -> f64 {
    convert_with(value, from, to, reference).value
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceSource;
    use proptest::prelude::*;

    fn reference(size_px: f64) -> ReferenceBox {
        ReferenceBox::valid(ReferenceSource::Canvas, size_px)
    }

    #[test]
    fn identity_needs_no_reference() {
        assert_eq!(convert(123.4, Unit::Px, Unit::Px, None), 123.4);
        assert_eq!(convert(55.0, Unit::Percent, Unit::Percent, None), 55.0);
        assert_eq!(convert(1.0, Unit::Auto, Unit::Auto, None), 1.0);
    }

    #[test]
    fn zero_is_absorbing() {
        let r = reference(800.0);
        assert_eq!(convert(0.0, Unit::Px, Unit::Percent, Some(&r)), 0.0);
        assert_eq!(convert(0.0, Unit::Percent, Unit::Px, Some(&r)), 0.0);
        assert_eq!(convert(0.0, Unit::Px, Unit::Percent, None), 0.0);
    }

    #[test]
    fn px_to_percent_rounds_to_one_decimal() {
        let r = reference(800.0);
        // 123 / 800 * 100 = 15.375 → 15.4
        assert_eq!(convert(123.0, Unit::Px, Unit::Percent, Some(&r)), 15.4);
        assert_eq!(convert(400.0, Unit::Px, Unit::Percent, Some(&r)), 50.0);
    }

    #[test]
    fn percent_to_px_rounds_to_integer() {
        let r = reference(800.0);
        assert_eq!(convert(50.0, Unit::Percent, Unit::Px, Some(&r)), 400.0);
        // 15.4% of 800 = 123.2 → 123
        assert_eq!(convert(15.4, Unit::Percent, Unit::Px, Some(&r)), 123.0);
    }

    #[test]
    fn fifty_percent_of_800_scenario() {
        let r = reference(800.0);
        assert_eq!(convert(50.0, Unit::Percent, Unit::Px, Some(&r)), 400.0);
    }

    #[test]
    fn invalid_reference_is_fail_soft() {
        let zero = ReferenceBox::valid(ReferenceSource::Canvas, 0.0);
        let got = convert_with(100.0, Unit::Px, Unit::Percent, Some(&zero));
        assert_eq!(got.value, 100.0);
        assert!(got.degraded);

        let flagged = ReferenceBox::invalid(ReferenceSource::Container);
        let got = convert_with(100.0, Unit::Px, Unit::Percent, Some(&flagged));
        assert_eq!(got.value, 100.0);
        assert!(got.degraded);

        let got = convert_with(100.0, Unit::Px, Unit::Percent, None);
        assert_eq!(got.value, 100.0);
        assert!(got.degraded);
        assert!(!got.value.is_nan());
    }

    #[test]
    fn auto_pairs_are_unsupported() {
        let r = reference(800.0);
        let got = convert_with(40.0, Unit::Auto, Unit::Px, Some(&r));
        assert_eq!(got.value, 40.0);
        assert!(got.degraded);

        let got = convert_with(40.0, Unit::Percent, Unit::Auto, Some(&r));
        assert_eq!(got.value, 40.0);
        assert!(got.degraded);
    }

    #[test]
    fn non_finite_input_returns_zero() {
        let r = reference(800.0);
        let got = convert_with(f64::NAN, Unit::Px, Unit::Percent, Some(&r));
        assert_eq!(got.value, 0.0);
        assert!(got.degraded);
        let got = convert_with(f64::INFINITY, Unit::Percent, Unit::Px, Some(&r));
        assert_eq!(got.value, 0.0);
        assert!(got.degraded);
    }

    #[test]
    fn exact_results_are_not_degraded() {
        let r = reference(800.0);
        assert!(!convert_with(400.0, Unit::Px, Unit::Percent, Some(&r)).degraded);
        assert!(!convert_with(50.0, Unit::Percent, Unit::Px, Some(&r)).degraded);
    }

    proptest! {
        // Round trip px → percent → px stays within integer rounding
        // tolerance while the reference keeps the 1-decimal percent
        // representation precise enough (error ≤ ref/2000 + 0.5).
        #[test]
        fn round_trip_within_tolerance(
            v in 0.1f64..5000.0,
            size in 1.0f64..1000.0,
        ) {
            let r = reference(size);
            let pct = convert(v, Unit::Px, Unit::Percent, Some(&r));
            let back = convert(pct, Unit::Percent, Unit::Px, Some(&r));
            prop_assert!((back - v).abs() <= 1.0 + 1e-9, "v={v} size={size} back={back}");
        }

        #[test]
        fn identity_for_any_unit(v in -1.0e6f64..1.0e6, size in 1.0f64..5000.0) {
            let r = reference(size);
            for unit in [Unit::Px, Unit::Percent, Unit::Auto] {
                prop_assert_eq!(convert(v, unit, unit, Some(&r)), v);
            }
        }

        #[test]
        fn never_nan(v in proptest::num::f64::ANY, size in -10.0f64..5000.0) {
            let r = reference(size);
            for (from, to) in [(Unit::Px, Unit::Percent), (Unit::Percent, Unit::Px)] {
                prop_assert!(!convert(v, from, to, Some(&r)).is_nan());
            }
        }
    }
}
