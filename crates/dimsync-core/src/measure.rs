#![forbid(unsafe_code)]

//! Element measurement seam.
//!
//! The engine never touches a rendering technology directly. Everything
//! it needs from the canvas is behind [`MeasurementProvider`]: look an
//! element up by entity id, walk to its nearest container ancestor, find
//! the root canvas, and measure a box. Any renderer that can implement
//! these four operations is compatible.
//!
//! [`StaticProvider`] is a canned in-memory implementation for tests and
//! headless use.
//!
//! # Invariants
//!
//! 1. `measure_box` returns `None` for elements the provider does not
//!    know; it never fabricates a size.
//! 2. [`Axis::from_property`] classifies any property name containing
//!    `"width"` (case-insensitively) as `Width`, everything else as
//!    `Height`.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Opaque handle to an on-canvas element, as minted by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    id: String,
}

impl ElementRef {
    /// Wrap a provider-side element identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// The provider-side identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// A measured box size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxSize {
    pub width_px: f64,
    pub height_px: f64,
}

impl BoxSize {
    #[must_use]
    pub const fn new(width_px: f64, height_px: f64) -> Self {
        Self {
            width_px,
            height_px,
        }
    }

    /// The extent along the given axis.
    #[must_use]
    pub const fn along(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Width => self.width_px,
            Axis::Height => self.height_px,
        }
    }
}

/// Which box extent a dimension property refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Width,
    Height,
}

impl Axis {
    /// Classify a property name: contains `"width"` (any case) → width,
    /// otherwise height. `"minWidth"`, `"max-width"` and friends all map
    /// to the width axis.
    #[must_use]
    pub fn from_property(property: &str) -> Self {
        if property.to_ascii_lowercase().contains("width") {
            Axis::Width
        } else {
            Axis::Height
        }
    }
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// The four abstract canvas operations the engine consumes.
pub trait MeasurementProvider {
    /// Measure an element's box, if it is currently measurable.
    fn measure_box(&self, element: &ElementRef) -> Option<BoxSize>;

    /// Find the element for an entity identifier.
    fn find_element(&self, entity_id: &str) -> Option<ElementRef>;

    /// Find the nearest ancestor flagged as a container archetype.
    fn find_ancestor_container(&self, element: &ElementRef) -> Option<ElementRef>;

    /// Find the root canvas element.
    fn find_root_canvas(&self) -> Option<ElementRef>;
}

// ---------------------------------------------------------------------------
// Static provider
// ---------------------------------------------------------------------------

/// Canned measurement provider backed by in-memory maps.
///
/// Intended for tests and headless tooling; build it up with the
/// `with_*` methods.
#[derive(Debug, Default, Clone)]
pub struct StaticProvider {
    boxes: FxHashMap<String, BoxSize>,
    containers: FxHashMap<String, String>,
    canvas: Option<String>,
}

impl StaticProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the root canvas element and its size.
    #[must_use]
    pub fn with_canvas(mut self, id: impl Into<String>, size: BoxSize) -> Self {
        let id = id.into();
        self.boxes.insert(id.clone(), size);
        self.canvas = Some(id);
        self
    }

    /// Register an element and its measured size.
    #[must_use]
    pub fn with_element(mut self, id: impl Into<String>, size: BoxSize) -> Self {
        self.boxes.insert(id.into(), size);
        self
    }

    /// Register `container` as the nearest container ancestor of `child`.
    /// The container must also be registered as an element to be
    /// measurable.
    #[must_use]
    pub fn with_container(
        mut self,
        child: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        self.containers.insert(child.into(), container.into());
        self
    }
}

impl MeasurementProvider for StaticProvider {
    fn measure_box(&self, element: &ElementRef) -> Option<BoxSize> {
        self.boxes.get(element.id()).copied()
    }

    fn find_element(&self, entity_id: &str) -> Option<ElementRef> {
        if self.boxes.contains_key(entity_id) {
            Some(ElementRef::new(entity_id))
        } else {
            None
        }
    }

    fn find_ancestor_container(&self, element: &ElementRef) -> Option<ElementRef> {
        self.containers.get(element.id()).map(ElementRef::new)
    }

    fn find_root_canvas(&self) -> Option<ElementRef> {
        self.canvas.as_deref().map(ElementRef::new)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_from_property() {
        assert_eq!(Axis::from_property("width"), Axis::Width);
        assert_eq!(Axis::from_property("minWidth"), Axis::Width);
        assert_eq!(Axis::from_property("max-width"), Axis::Width);
        assert_eq!(Axis::from_property("WIDTH"), Axis::Width);
        assert_eq!(Axis::from_property("height"), Axis::Height);
        assert_eq!(Axis::from_property("minHeight"), Axis::Height);
        assert_eq!(Axis::from_property("size"), Axis::Height);
        assert_eq!(Axis::from_property(""), Axis::Height);
    }

    #[test]
    fn box_size_along() {
        let size = BoxSize::new(800.0, 600.0);
        assert_eq!(size.along(Axis::Width), 800.0);
        assert_eq!(size.along(Axis::Height), 600.0);
    }

    #[test]
    fn static_provider_lookup() {
        let provider = StaticProvider::new()
            .with_canvas("canvas", BoxSize::new(1200.0, 800.0))
            .with_element("hero", BoxSize::new(400.0, 300.0));

        let el = provider.find_element("hero").expect("element exists");
        assert_eq!(provider.measure_box(&el), Some(BoxSize::new(400.0, 300.0)));
        assert_eq!(provider.find_element("missing"), None);
    }

    #[test]
    fn static_provider_canvas() {
        let provider = StaticProvider::new().with_canvas("root", BoxSize::new(1200.0, 800.0));
        let canvas = provider.find_root_canvas().expect("canvas registered");
        assert_eq!(canvas.id(), "root");
        assert_eq!(
            provider.measure_box(&canvas),
            Some(BoxSize::new(1200.0, 800.0))
        );
    }

    #[test]
    fn static_provider_no_canvas() {
        let provider = StaticProvider::new();
        assert_eq!(provider.find_root_canvas(), None);
    }

    #[test]
    fn static_provider_container_chain() {
        let provider = StaticProvider::new()
            .with_element("card", BoxSize::new(300.0, 200.0))
            .with_element("button-1", BoxSize::new(80.0, 30.0))
            .with_container("button-1", "card");

        let el = provider.find_element("button-1").expect("element exists");
        let container = provider
            .find_ancestor_container(&el)
            .expect("container registered");
        assert_eq!(container.id(), "card");
        assert_eq!(
            provider.measure_box(&container),
            Some(BoxSize::new(300.0, 200.0))
        );

        let orphan = ElementRef::new("card");
        assert_eq!(provider.find_ancestor_container(&orphan), None);
    }
}
