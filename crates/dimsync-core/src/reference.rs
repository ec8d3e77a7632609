#![forbid(unsafe_code)]

//! Reference resolution: which ancestor defines 100%.
//!
//! Percent values are meaningless without a reference box. The policy:
//! the nearest ancestor flagged as a container defines 100%; if there is
//! none (or it is not measurable), the root canvas does; if nothing is
//! measurable the reference is marked invalid and conversions degrade
//! instead of failing.
//!
//! Resolution is never cached — layout can change between any two calls.
//!
//! # Invariants
//!
//! 1. `resolve` returns `None` only when both `entity_id` and `property`
//!    are empty (a caller contract violation, logged).
//! 2. A returned reference with `is_valid: false` always has
//!    `size_px: 0.0`.
//! 3. A valid reference always has `size_px > 0.0`.
//!
//! # Failure Modes
//!
//! An unmeasurable canvas yields an invalid reference, not an error.
//! Callers must treat `is_valid: false` as "do not divide by this".

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::measure::{Axis, MeasurementProvider};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where a reference box came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceSource {
    /// The nearest ancestor container element.
    Container,
    /// The root canvas element.
    Canvas,
}

/// The measured size that defines what 100% means for one property.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceBox {
    pub source: ReferenceSource,
    pub size_px: f64,
    /// False when the resolved element reported zero or negative size.
    /// Conversions must not divide by an invalid reference.
    pub is_valid: bool,
}

impl ReferenceBox {
    /// A measurable reference.
    #[must_use]
    pub const fn valid(source: ReferenceSource, size_px: f64) -> Self {
        Self {
            source,
            size_px,
            is_valid: true,
        }
    }

    /// The degraded reference used when nothing is measurable.
    #[must_use]
    pub const fn invalid(source: ReferenceSource) -> Self {
        Self {
            source,
            size_px: 0.0,
            is_valid: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolves the reference box for an (entity, property) pair.
pub struct ReferenceResolver {
    provider: Rc<dyn MeasurementProvider>,
}

impl ReferenceResolver {
    #[must_use]
    pub fn new(provider: Rc<dyn MeasurementProvider>) -> Self {
        Self { provider }
    }

    /// Resolve the reference for percent conversions of `property` on
    /// the given entity. Container first, canvas fallback, invalid last.
    #[must_use]
    pub fn resolve(&self, entity_id: &str, property: &str) -> Option<ReferenceBox> {
        if entity_id.is_empty() && property.is_empty() {
            tracing::warn!("resolve called with neither entity id nor property");
            return None;
        }

        let axis = Axis::from_property(property);

        let mut container_seen = false;
        if let Some(element) = self.provider.find_element(entity_id) {
            if let Some(container) = self.provider.find_ancestor_container(&element) {
                container_seen = true;
                if let Some(size) = self.provider.measure_box(&container) {
                    let extent = size.along(axis);
                    if extent > 0.0 {
                        return Some(ReferenceBox::valid(ReferenceSource::Container, extent));
                    }
                }
            }
        }

        if let Some(canvas) = self.provider.find_root_canvas() {
            if let Some(size) = self.provider.measure_box(&canvas) {
                let extent = size.along(axis);
                if extent > 0.0 {
                    return Some(ReferenceBox::valid(ReferenceSource::Canvas, extent));
                }
            }
        }

        tracing::warn!(
            entity_id,
            property,
            "no measurable container or canvas, reference is invalid"
        );
        let source = if container_seen {
            ReferenceSource::Container
        } else {
            ReferenceSource::Canvas
        };
        Some(ReferenceBox::invalid(source))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::{BoxSize, StaticProvider};

    fn resolver(provider: StaticProvider) -> ReferenceResolver {
        ReferenceResolver::new(Rc::new(provider))
    }

    #[test]
    fn container_wins_over_canvas() {
        let r = resolver(
            StaticProvider::new()
                .with_canvas("canvas", BoxSize::new(1200.0, 800.0))
                .with_element("card", BoxSize::new(300.0, 200.0))
                .with_element("btn", BoxSize::new(80.0, 30.0))
                .with_container("btn", "card"),
        );

        let reference = r.resolve("btn", "width").expect("resolvable");
        assert_eq!(reference.source, ReferenceSource::Container);
        assert_eq!(reference.size_px, 300.0);
        assert!(reference.is_valid);
    }

    #[test]
    fn axis_selects_extent() {
        let r = resolver(
            StaticProvider::new()
                .with_element("card", BoxSize::new(300.0, 200.0))
                .with_element("btn", BoxSize::new(80.0, 30.0))
                .with_container("btn", "card"),
        );

        let by_height = r.resolve("btn", "height").expect("resolvable");
        assert_eq!(by_height.size_px, 200.0);
        let by_min_width = r.resolve("btn", "minWidth").expect("resolvable");
        assert_eq!(by_min_width.size_px, 300.0);
    }

    #[test]
    fn canvas_fallback_when_no_container() {
        let r = resolver(
            StaticProvider::new()
                .with_canvas("canvas", BoxSize::new(1200.0, 800.0))
                .with_element("hero", BoxSize::new(400.0, 300.0)),
        );

        let reference = r.resolve("hero", "width").expect("resolvable");
        assert_eq!(reference.source, ReferenceSource::Canvas);
        assert_eq!(reference.size_px, 1200.0);
    }

    #[test]
    fn zero_sized_container_falls_back_to_canvas() {
        let r = resolver(
            StaticProvider::new()
                .with_canvas("canvas", BoxSize::new(1200.0, 800.0))
                .with_element("collapsed", BoxSize::new(0.0, 0.0))
                .with_element("btn", BoxSize::new(80.0, 30.0))
                .with_container("btn", "collapsed"),
        );

        let reference = r.resolve("btn", "width").expect("resolvable");
        assert_eq!(reference.source, ReferenceSource::Canvas);
        assert_eq!(reference.size_px, 1200.0);
    }

    #[test]
    fn nothing_measurable_is_invalid_not_fatal() {
        let r = resolver(StaticProvider::new());
        let reference = r.resolve("ghost", "width").expect("still a reference");
        assert!(!reference.is_valid);
        assert_eq!(reference.size_px, 0.0);
    }

    #[test]
    fn unknown_entity_uses_canvas() {
        let r = resolver(StaticProvider::new().with_canvas("canvas", BoxSize::new(1000.0, 500.0)));
        let reference = r.resolve("ghost", "height").expect("resolvable");
        assert_eq!(reference.source, ReferenceSource::Canvas);
        assert_eq!(reference.size_px, 500.0);
    }

    #[test]
    fn both_inputs_empty_is_contract_violation() {
        let r = resolver(StaticProvider::new().with_canvas("canvas", BoxSize::new(1000.0, 500.0)));
        assert!(r.resolve("", "").is_none());
        // One of the two is enough.
        assert!(r.resolve("", "width").is_some());
        assert!(r.resolve("hero", "").is_some());
    }
}
