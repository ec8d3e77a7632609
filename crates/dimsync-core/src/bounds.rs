#![forbid(unsafe_code)]

//! Per-archetype dimension bounds.
//!
//! Each entity archetype (button, text, image, container) carries
//! min/max bounds per axis in both units. [`BoundsTable::clamp`] pulls a
//! candidate value into range and hands back the canonical formatted
//! string. Validation is advisory: the coordinator can be configured to
//! skip it, and clamping stays available for callers that want it
//! explicitly.
//!
//! # Invariants
//!
//! 1. Percent bounds never exceed 100.
//! 2. `max_px` is optional; pixels are unbounded above by default.
//! 3. Unknown archetypes fall back to the `default` rule.
//! 4. Clamping is idempotent.
//! 5. Non-numeric values pass through formatted, unclamped.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::measure::Axis;
use crate::value::{DimensionValue, Unit};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Min/max bounds for one (archetype, axis) pair, in both units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundsRule {
    pub min_px: f64,
    /// `None` means unbounded above in pixels.
    pub max_px: Option<f64>,
    pub min_percent: f64,
    pub max_percent: f64,
}

impl BoundsRule {
    #[must_use]
    pub const fn new(min_px: f64, max_px: Option<f64>, min_percent: f64, max_percent: f64) -> Self {
        Self {
            min_px,
            max_px,
            min_percent,
            max_percent,
        }
    }

    fn clamp_px(&self, value: f64) -> f64 {
        let floored = value.max(self.min_px);
        match self.max_px {
            Some(max) => floored.min(max),
            None => floored,
        }
    }

    fn clamp_percent(&self, value: f64) -> f64 {
        value.max(self.min_percent).min(self.max_percent)
    }
}

/// Bounds for both axes of one archetype.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeBounds {
    pub width: BoundsRule,
    pub height: BoundsRule,
}

impl ArchetypeBounds {
    #[must_use]
    pub const fn rule(&self, axis: Axis) -> &BoundsRule {
        match axis {
            Axis::Width => &self.width,
            Axis::Height => &self.height,
        }
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Archetype name → per-axis bounds, with a guaranteed fallback rule.
#[derive(Debug, Clone)]
pub struct BoundsTable {
    rules: FxHashMap<String, ArchetypeBounds>,
    fallback: ArchetypeBounds,
}

impl BoundsTable {
    /// An empty table with only the fallback rule.
    #[must_use]
    pub fn with_fallback(fallback: ArchetypeBounds) -> Self {
        Self {
            rules: FxHashMap::default(),
            fallback,
        }
    }

    /// Register bounds for an archetype (builder pattern).
    #[must_use]
    pub fn with_archetype(mut self, name: impl Into<String>, bounds: ArchetypeBounds) -> Self {
        self.rules.insert(name.into(), bounds);
        self
    }

    /// The rule for `(archetype, property)`. The property is normalized
    /// to its axis; unknown archetypes use the fallback.
    #[must_use]
    pub fn rules_for(&self, archetype: &str, property: &str) -> &BoundsRule {
        let axis = Axis::from_property(property);
        self.rules
            .get(archetype)
            .unwrap_or(&self.fallback)
            .rule(axis)
    }

    /// Clamp a candidate value to the archetype's bounds and format it.
    /// Non-numeric values are formatted as-is, no clamping attempted.
    #[must_use]
    pub fn clamp(&self, value: &DimensionValue, archetype: &str, property: &str) -> String {
        let Some(number) = value.value else {
            return value.format();
        };
        let rule = self.rules_for(archetype, property);
        let clamped = match value.unit {
            Unit::Px => DimensionValue::px(rule.clamp_px(number)),
            Unit::Percent => DimensionValue::percent(rule.clamp_percent(number)),
            Unit::Auto => return value.format(),
        };
        clamped.format()
    }
}

impl Default for BoundsTable {
    /// The built-in archetype set. The only bound fixed by the product
    /// is the 80px button width minimum; the rest keep tiny elements
    /// selectable and captions readable without constraining layout.
    fn default() -> Self {
        let sym = |rule: BoundsRule| ArchetypeBounds {
            width: rule,
            height: rule,
        };
        Self::with_fallback(sym(BoundsRule::new(10.0, None, 0.0, 100.0)))
            .with_archetype(
                "button",
                ArchetypeBounds {
                    width: BoundsRule::new(80.0, Some(600.0), 1.0, 100.0),
                    height: BoundsRule::new(30.0, Some(200.0), 1.0, 100.0),
                },
            )
            .with_archetype(
                "text",
                ArchetypeBounds {
                    width: BoundsRule::new(50.0, None, 1.0, 100.0),
                    height: BoundsRule::new(20.0, None, 1.0, 100.0),
                },
            )
            .with_archetype("image", sym(BoundsRule::new(20.0, None, 1.0, 100.0)))
            .with_archetype(
                "container",
                ArchetypeBounds {
                    width: BoundsRule::new(100.0, None, 1.0, 100.0),
                    height: BoundsRule::new(50.0, None, 1.0, 100.0),
                },
            )
            .with_archetype("default", sym(BoundsRule::new(10.0, None, 0.0, 100.0)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
