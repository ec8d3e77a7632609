#![forbid(unsafe_code)]

//! Stateful coordination layer of the dimsync engine.
//!
//! [`coordinator::DimensionCoordinator`] owns the value cache and the
//! subscription registries, validates and broadcasts every write, and
//! hands out [`adapter::SyncAdapter`] bindings for individual UI
//! fragments. The whole layer is single-threaded and cooperative:
//! handles are `Rc`-backed, dispatch is synchronous, and a misbehaving
//! subscriber can slow things down but never corrupt shared state.
//!
//! The pure pieces (parsing, conversion, bounds, reference resolution)
//! live in `dimsync-core`.

pub mod adapter;
pub mod coordinator;
pub mod event;
pub mod shared;

pub use adapter::{AdapterConfig, AdapterStats, SyncAdapter};
pub use coordinator::{
    CoordinatorConfig, CoordinatorStats, DimensionCoordinator, SubscriberCounts, Subscription,
    UpdateOutcome,
};
pub use event::{ChangeEvent, DimensionEvent, ErrorEvent, EventKind};
pub use shared::{reset_shared, shared, shared_with};
