#![forbid(unsafe_code)]

//! Broadcast event types.
//!
//! Every successful cache write produces exactly one [`ChangeEvent`];
//! internal failures produce an [`ErrorEvent`] instead. Both are
//! immutable value types: subscribers receive a shared reference and can
//! clone what they need, but can never mutate shared state through the
//! event.
//!
//! # Invariants
//!
//! 1. `sequence` is assigned by the coordinator and strictly increases
//!    across all events it emits (change and error alike).
//! 2. An event is broadcast exactly once per triggering call.

use dimsync_core::Breakpoint;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Discriminant for the per-event-type subscription registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Change,
    Error,
}

/// A dimension value changed for one (entity, breakpoint, property).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub entity_id: String,
    pub property: String,
    /// The finalized formatted value, e.g. `"80px"`.
    pub value: String,
    pub breakpoint: Breakpoint,
    /// Free-form tag naming the write path that caused this change.
    pub source: String,
    /// The previously cached value for this property, if any.
    pub previous_value: Option<String>,
    /// Milliseconds since the coordinator started.
    pub timestamp_ms: u64,
    /// Coordinator-assigned monotonic event number.
    pub sequence: u64,
}

/// An internal failure surfaced as an event rather than a panic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub entity_id: String,
    pub property: String,
    pub message: String,
    pub breakpoint: Breakpoint,
    pub source: String,
    pub timestamp_ms: u64,
    pub sequence: u64,
}

/// Tagged union delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DimensionEvent {
    Change(ChangeEvent),
    Error(ErrorEvent),
}

impl DimensionEvent {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            DimensionEvent::Change(_) => EventKind::Change,
            DimensionEvent::Error(_) => EventKind::Error,
        }
    }

    #[must_use]
    pub fn entity_id(&self) -> &str {
        match self {
            DimensionEvent::Change(e) => &e.entity_id,
            DimensionEvent::Error(e) => &e.entity_id,
        }
    }

    #[must_use]
    pub const fn sequence(&self) -> u64 {
        match self {
            DimensionEvent::Change(e) => e.sequence,
            DimensionEvent::Error(e) => e.sequence,
        }
    }

    #[must_use]
    pub const fn as_change(&self) -> Option<&ChangeEvent> {
        match self {
            DimensionEvent::Change(e) => Some(e),
            DimensionEvent::Error(_) => None,
        }
    }

    #[must_use]
    pub const fn as_error(&self) -> Option<&ErrorEvent> {
        match self {
            DimensionEvent::Error(e) => Some(e),
            DimensionEvent::Change(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
