#![forbid(unsafe_code)]

//! Pure building blocks for the dimsync engine.
//!
//! Everything in this crate is stateless or trivially owned: parsing and
//! formatting of size expressions, breakpoint tiers, the measurement
//! provider seam, reference resolution, px ↔ percent conversion, and
//! per-archetype bounds. The stateful coordination layer lives in
//! `dimsync-runtime` and composes these pieces.

pub mod bounds;
pub mod breakpoint;
pub mod convert;
pub mod measure;
pub mod reference;
pub mod value;

pub use bounds::{ArchetypeBounds, BoundsRule, BoundsTable};
pub use breakpoint::Breakpoint;
pub use convert::{Conversion, convert, convert_with};
pub use measure::{Axis, BoxSize, ElementRef, MeasurementProvider, StaticProvider};
pub use reference::{ReferenceBox, ReferenceResolver, ReferenceSource};
pub use value::{DimensionValue, RawValue, Unit, parse};
