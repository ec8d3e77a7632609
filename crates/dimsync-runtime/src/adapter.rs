#![forbid(unsafe_code)]

//! Per-consumer synchronization adapters.
//!
//! A [`SyncAdapter`] binds one UI fragment to the coordinator for a
//! single (entity, breakpoint) pair. It keeps a local snapshot of the
//! relevant cache entry, filters incoming broadcasts down to its pair,
//! suppresses echoes of its own writes, and exposes a narrow
//! read/write/convert surface.
//!
//! # Echo suppression
//!
//! Writes go to the coordinator, which broadcasts back to every
//! subscriber including the writer. Without suppression a write would
//! bounce straight back and could retrigger UI effects in a loop. Each
//! write records a one-shot `{source, sequence floor}`; the first
//! incoming change matching that source and property with a newer
//! sequence is dropped instead of reapplied. The record expires after a
//! short window so a stale one can never swallow a legitimate later
//! change.
//!
//! # Invariants
//!
//! 1. Local state is updated before `write` returns (optimistic), and a
//!    clamped result is reconciled from the write's own return path, not
//!    from the echo.
//! 2. Events for a different entity or breakpoint never touch local
//!    state.
//! 3. A suppression record fires at most once and only for this adapter
//!    instance; a second adapter bound to the same pair applies the
//!    event normally.
//! 4. After `dispose`, no local-state updates occur and coordinator
//!    calls become no-ops (conversions fall back to the last-known
//!    reference, clearly logged as degraded).

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};
use web_time::Instant;

use dimsync_core::convert::convert_with;
use dimsync_core::value::{RawValue, parse};
use dimsync_core::{Breakpoint, ReferenceBox, ReferenceSource, Unit};

use crate::coordinator::{DimensionCoordinator, Subscription};
use crate::event::DimensionEvent;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Reference size used by the offline conversion fallback when no
/// reference was ever observed.
pub const FALLBACK_REFERENCE_PX: f64 = 1000.0;

/// Adapter construction options.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Verbose per-event diagnostics.
    pub debug: bool,
    /// When false the adapter never subscribes: writes still delegate,
    /// but no broadcasts are applied locally (pass-through mode).
    pub enable_sync: bool,
    /// Staleness bound for echo-suppression records.
    pub echo_window: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            debug: false,
            enable_sync: true,
            echo_window: Duration::from_millis(100),
        }
    }
}

/// Adapter-side observability counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdapterStats {
    /// Broadcasts applied to local state.
    pub applied_events: u64,
    /// Broadcasts dropped as echoes of this adapter's own writes.
    pub suppressed_events: u64,
    /// Conversions served by the local fallback instead of the
    /// coordinator.
    pub fallback_conversions: u64,
}

struct EchoRecord {
    source: String,
    property: String,
    /// Only events sequenced after this floor can be the echo.
    after_sequence: u64,
    at: Instant,
}

struct AdapterInner {
    entity_id: String,
    breakpoint: Breakpoint,
    local: FxHashMap<String, String>,
    pending_echo: Option<EchoRecord>,
    last_reference_px: Option<f64>,
    stats: AdapterStats,
    active: bool,
    debug: bool,
    echo_window: Duration,
}

impl AdapterInner {
    /// Apply or drop one broadcast. Returns nothing; counters record the
    /// decision.
    fn on_event(&mut self, event: &DimensionEvent) {
        if !self.active {
            return;
        }
        let Some(change) = event.as_change() else {
            if self.debug {
                debug!(entity = %self.entity_id, "adapter observed an error event");
            }
            return;
        };
        if change.entity_id != self.entity_id || change.breakpoint != self.breakpoint {
            return;
        }

        if let Some(record) = &self.pending_echo {
            if record.at.elapsed() > self.echo_window {
                // Stale record: the echo never arrived in time.
                self.pending_echo = None;
            } else if record.source == change.source
                && record.property == change.property
                && change.sequence > record.after_sequence
            {
                self.pending_echo = None;
                self.stats.suppressed_events += 1;
                if self.debug {
                    debug!(
                        entity = %self.entity_id,
                        property = %change.property,
                        sequence = change.sequence,
                        "suppressed echo of own write"
                    );
                }
                return;
            }
        }

        self.local
            .insert(change.property.clone(), change.value.clone());
        self.stats.applied_events += 1;
        if self.debug {
            debug!(
                entity = %self.entity_id,
                property = %change.property,
                value = %change.value,
                "applied broadcast to local state"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// A per-(entity, breakpoint) binding to the coordinator.
pub struct SyncAdapter {
    coordinator: DimensionCoordinator,
    inner: Rc<RefCell<AdapterInner>>,
    subscription: Option<Subscription>,
}

impl SyncAdapter {
    /// Bind to the coordinator for one (entity, breakpoint) pair,
    /// seeding local state from the cache.
    #[must_use]
    pub fn new(
        coordinator: DimensionCoordinator,
        entity_id: impl Into<String>,
        breakpoint: Breakpoint,
        config: AdapterConfig,
    ) -> Self {
        let entity_id = entity_id.into();
        let local = coordinator.get_value(&entity_id, breakpoint);
        let inner = Rc::new(RefCell::new(AdapterInner {
            entity_id: entity_id.clone(),
            breakpoint,
            local,
            pending_echo: None,
            last_reference_px: None,
            stats: AdapterStats::default(),
            active: true,
            debug: config.debug,
            echo_window: config.echo_window,
        }));

        let subscription = if config.enable_sync {
            let weak: Weak<RefCell<AdapterInner>> = Rc::downgrade(&inner);
            Some(coordinator.subscribe(move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.borrow_mut().on_event(event);
                }
            }))
        } else {
            debug!(entity = %entity_id, "adapter created in pass-through mode");
            None
        };

        Self {
            coordinator,
            inner,
            subscription,
        }
    }

    // -- reads --------------------------------------------------------------

    /// A copy of the local property snapshot.
    #[must_use]
    pub fn read_all(&self) -> FxHashMap<String, String> {
        self.inner.borrow().local.clone()
    }

    /// One property from the local snapshot.
    #[must_use]
    pub fn read_one(&self, property: &str) -> Option<String> {
        self.inner.borrow().local.get(property).cloned()
    }

    /// Whether this adapter is subscribed and not disposed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.borrow().active
            && self
                .subscription
                .as_ref()
                .is_some_and(Subscription::is_active)
    }

    /// Adapter-side counters.
    #[must_use]
    pub fn stats(&self) -> AdapterStats {
        self.inner.borrow().stats
    }

    // -- writes -------------------------------------------------------------

    /// Write a property value: local state is updated optimistically
    /// before the coordinator is invoked, so the owning UI never waits
    /// for the broadcast round-trip. Coordinator failures are logged,
    /// not propagated. No-op after `dispose`.
    pub fn write(&self, property: &str, value: impl Into<RawValue>, source: &str) {
        let raw = value.into();
        let (entity_id, breakpoint) = {
            let mut inner = self.inner.borrow_mut();
            if !inner.active {
                debug!(property, "write on a disposed adapter is a no-op");
                return;
            }
            let optimistic = parse(raw.clone()).format();
            inner.local.insert(property.to_string(), optimistic);
            inner.pending_echo = Some(EchoRecord {
                source: source.to_string(),
                property: property.to_string(),
                after_sequence: self.coordinator.last_sequence(),
                at: Instant::now(),
            });
            (inner.entity_id.clone(), inner.breakpoint)
        };

        let outcome = self
            .coordinator
            .update(&entity_id, property, raw, breakpoint, source);
        if !outcome.success {
            warn!(
                entity = %entity_id,
                property,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "coordinator rejected write; local state keeps the optimistic value"
            );
            return;
        }

        // Validation may have adjusted the value. The echo was
        // suppressed, so reconcile from the synchronous return path.
        let mut inner = self.inner.borrow_mut();
        if inner.local.get(property) != Some(&outcome.final_value) {
            if inner.debug {
                debug!(
                    entity = %entity_id,
                    property,
                    adjusted = %outcome.final_value,
                    "write was adjusted by validation"
                );
            }
            inner.local.insert(property.to_string(), outcome.final_value);
        }
    }

    // -- conversion ---------------------------------------------------------

    /// Convert between units for this adapter's entity. The coordinator
    /// is the primary path; after `dispose` a local approximation
    /// against the last-known reference size is used and logged as
    /// degraded.
    #[must_use]
    pub fn convert(&self, value: impl Into<RawValue>, from: Unit, to: Unit, property: &str) -> f64 {
        let raw = value.into();
        let (entity_id, active) = {
            let inner = self.inner.borrow();
            (inner.entity_id.clone(), inner.active)
        };

        if active {
            // Remember the reference for the offline fallback path.
            if let Some(reference) = self.coordinator.resolve_reference(&entity_id, property) {
                if reference.is_valid {
                    self.inner.borrow_mut().last_reference_px = Some(reference.size_px);
                }
            }
            return self.coordinator.convert(raw, from, to, &entity_id, property);
        }

        let parsed = parse(raw);
        let Some(numeric) = parsed.value else {
            return 0.0;
        };
        let mut inner = self.inner.borrow_mut();
        let size_px = inner.last_reference_px.unwrap_or(FALLBACK_REFERENCE_PX);
        inner.stats.fallback_conversions += 1;
        warn!(
            entity = %entity_id,
            property,
            size_px,
            "adapter disposed; converting against last-known reference (approximate)"
        );
        let reference = ReferenceBox::valid(ReferenceSource::Canvas, size_px);
        convert_with(numeric, from, to, Some(&reference)).value
    }

    // -- lifecycle ----------------------------------------------------------

    /// Detach from the coordinator. Idempotent; subsequent reads return
    /// the frozen snapshot and writes are no-ops.
    pub fn dispose(&mut self) {
        let was_active = {
            let mut inner = self.inner.borrow_mut();
            std::mem::replace(&mut inner.active, false)
        };
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        if was_active {
            debug!("adapter disposed");
        }
    }
}

impl std::fmt::Debug for SyncAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("SyncAdapter")
            .field("entity_id", &inner.entity_id)
            .field("breakpoint", &inner.breakpoint)
            .field("active", &inner.active)
            .field("properties", &inner.local.len())
            .finish()
    }
}

impl DimensionCoordinator {
    /// Construct a [`SyncAdapter`] bound to this coordinator.
    #[must_use]
    pub fn create_adapter(
        &self,
        entity_id: impl Into<String>,
        breakpoint: Breakpoint,
        config: AdapterConfig,
    ) -> SyncAdapter {
        SyncAdapter::new(self.clone(), entity_id, breakpoint, config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use dimsync_core::{BoxSize, MeasurementProvider, StaticProvider};

    fn provider() -> Rc<dyn MeasurementProvider> {
        Rc::new(
            StaticProvider::new()
                .with_canvas("canvas", BoxSize::new(800.0, 600.0))
                .with_element("hero", BoxSize::new(400.0, 300.0))
                .with_element("btn", BoxSize::new(80.0, 30.0)),
        )
    }

    fn coordinator() -> DimensionCoordinator {
        DimensionCoordinator::new(provider(), CoordinatorConfig::default())
    }

    #[test]
    fn seeds_local_state_from_cache() {
        let c = coordinator();
        c.update("hero", "width", "200px", Breakpoint::Desktop, "seed");

        let adapter = c.create_adapter("hero", Breakpoint::Desktop, AdapterConfig::default());
        assert_eq!(adapter.read_one("width").as_deref(), Some("200px"));
        assert!(adapter.is_connected());
    }

    #[test]
    fn write_is_optimistic_and_reaches_the_cache() {
        let c = coordinator();
        let adapter = c.create_adapter("hero", Breakpoint::Desktop, AdapterConfig::default());

        adapter.write("width", "250px", "input-panel");
        assert_eq!(adapter.read_one("width").as_deref(), Some("250px"));
        assert_eq!(
            c.get_value("hero", Breakpoint::Desktop)
                .get("width")
                .map(String::as_str),
            Some("250px")
        );
    }

    #[test]
    fn own_write_is_suppressed_peer_applies() {
        let c = coordinator();
        let writer = c.create_adapter("hero", Breakpoint::Desktop, AdapterConfig::default());
        let peer = c.create_adapter("hero", Breakpoint::Desktop, AdapterConfig::default());

        writer.write("width", "200px", "input-panel");

        assert_eq!(writer.stats().suppressed_events, 1);
        assert_eq!(writer.stats().applied_events, 0);
        assert_eq!(peer.stats().applied_events, 1);
        assert_eq!(peer.read_one("width").as_deref(), Some("200px"));
    }

    #[test]
    fn suppression_record_is_one_shot() {
        let c = coordinator();
        let writer = c.create_adapter("hero", Breakpoint::Desktop, AdapterConfig::default());

        writer.write("width", "200px", "input-panel");
        assert_eq!(writer.stats().suppressed_events, 1);

        // A later external change with the same source tag is a real
        // change, not an echo: the one-shot record is gone.
        c.emit_external_change("hero", "width", "300px", Breakpoint::Desktop, "input-panel");
        assert_eq!(writer.stats().suppressed_events, 1);
        assert_eq!(writer.read_one("width").as_deref(), Some("300px"));
    }

    #[test]
    fn clamped_write_reconciles_from_return_path() {
        let c = DimensionCoordinator::new(
            provider(),
            CoordinatorConfig::default().with_entity_archetype("btn", "button"),
        );
        let adapter = c.create_adapter("btn", Breakpoint::Desktop, AdapterConfig::default());

        adapter.write("width", 5, "input-panel");
        // Echo suppressed, yet local state converges on the clamped value.
        assert_eq!(adapter.read_one("width").as_deref(), Some("80px"));
        assert_eq!(adapter.stats().suppressed_events, 1);
    }

    #[test]
    fn filters_other_entities_and_breakpoints() {
        let c = coordinator();
        let adapter = c.create_adapter("hero", Breakpoint::Desktop, AdapterConfig::default());

        c.update("btn", "width", "90px", Breakpoint::Desktop, "other-entity");
        c.update("hero", "width", "120px", Breakpoint::Mobile, "other-breakpoint");

        assert_eq!(adapter.stats().applied_events, 0);
        assert!(adapter.read_one("width").is_none());
    }

    #[test]
    fn applies_matching_external_changes() {
        let c = coordinator();
        let adapter = c.create_adapter("hero", Breakpoint::Desktop, AdapterConfig::default());

        c.emit_external_change("hero", "width", "333px", Breakpoint::Desktop, "drag");
        assert_eq!(adapter.read_one("width").as_deref(), Some("333px"));
        assert_eq!(adapter.stats().applied_events, 1);
    }

    #[test]
    fn pass_through_adapter_does_not_subscribe() {
        let c = coordinator();
        let adapter = c.create_adapter(
            "hero",
            Breakpoint::Desktop,
            AdapterConfig {
                enable_sync: false,
                ..AdapterConfig::default()
            },
        );

        assert!(!adapter.is_connected());
        assert_eq!(c.stats().subscribers.global, 0);

        // Writes still delegate.
        adapter.write("width", "150px", "panel");
        assert_eq!(
            c.get_value("hero", Breakpoint::Desktop)
                .get("width")
                .map(String::as_str),
            Some("150px")
        );

        // Broadcasts are not applied locally.
        c.emit_external_change("hero", "width", "999px", Breakpoint::Desktop, "drag");
        assert_eq!(adapter.read_one("width").as_deref(), Some("150px"));
    }

    #[test]
    fn convert_delegates_to_coordinator() {
        let c = coordinator();
        let adapter = c.create_adapter("hero", Breakpoint::Desktop, AdapterConfig::default());
        // Canvas is 800 wide.
        assert_eq!(adapter.convert(50, Unit::Percent, Unit::Px, "width"), 400.0);
        assert_eq!(c.stats().conversion_count, 1);
    }

    #[test]
    fn disposed_adapter_converts_against_last_known_reference() {
        let c = coordinator();
        let mut adapter = c.create_adapter("hero", Breakpoint::Desktop, AdapterConfig::default());

        // Prime the last-known reference (canvas width 800).
        assert_eq!(adapter.convert(50, Unit::Percent, Unit::Px, "width"), 400.0);
        adapter.dispose();

        let conversions_before = c.stats().conversion_count;
        assert_eq!(adapter.convert(25, Unit::Percent, Unit::Px, "width"), 200.0);
        assert_eq!(c.stats().conversion_count, conversions_before);
        assert_eq!(adapter.stats().fallback_conversions, 1);
    }

    #[test]
    fn disposed_adapter_without_reference_uses_default() {
        let c = coordinator();
        let mut adapter = c.create_adapter("hero", Breakpoint::Desktop, AdapterConfig::default());
        adapter.dispose();
        // 50% of the 1000px fallback.
        assert_eq!(adapter.convert(50, Unit::Percent, Unit::Px, "width"), 500.0);
    }

    #[test]
    fn dispose_freezes_local_state() {
        let c = coordinator();
        let mut adapter = c.create_adapter("hero", Breakpoint::Desktop, AdapterConfig::default());
        c.emit_external_change("hero", "width", "100px", Breakpoint::Desktop, "drag");
        assert_eq!(adapter.read_one("width").as_deref(), Some("100px"));

        adapter.dispose();
        assert!(!adapter.is_connected());

        c.emit_external_change("hero", "width", "200px", Breakpoint::Desktop, "drag");
        assert_eq!(adapter.read_one("width").as_deref(), Some("100px"));

        adapter.write("width", "300px", "panel");
        assert_eq!(adapter.read_one("width").as_deref(), Some("100px"));
        assert_eq!(
            c.get_value("hero", Breakpoint::Desktop)
                .get("width")
                .map(String::as_str),
            Some("200px"),
            "disposed writes must not reach the coordinator"
        );
    }

    #[test]
    fn dispose_is_idempotent() {
        let c = coordinator();
        let mut adapter = c.create_adapter("hero", Breakpoint::Desktop, AdapterConfig::default());
        adapter.dispose();
        adapter.dispose();
        assert!(!adapter.is_connected());
    }

    #[test]
    fn read_all_is_a_copy() {
        let c = coordinator();
        let adapter = c.create_adapter("hero", Breakpoint::Desktop, AdapterConfig::default());
        adapter.write("width", "10px", "panel");

        let mut copy = adapter.read_all();
        copy.insert("width".into(), "tampered".into());
        assert_eq!(adapter.read_one("width").as_deref(), Some("10px"));
    }

    #[test]
    fn writes_to_different_properties_keep_their_own_echo_records() {
        let c = coordinator();
        let adapter = c.create_adapter("hero", Breakpoint::Desktop, AdapterConfig::default());

        adapter.write("width", "100px", "panel");
        adapter.write("height", "50px", "panel");

        // Each write suppressed its own echo; nothing else was applied.
        assert_eq!(adapter.stats().suppressed_events, 2);
        assert_eq!(adapter.stats().applied_events, 0);
        assert_eq!(adapter.read_one("width").as_deref(), Some("100px"));
        assert_eq!(adapter.read_one("height").as_deref(), Some("50px"));
    }

    #[test]
    fn debug_format() {
        let c = coordinator();
        let adapter = c.create_adapter("hero", Breakpoint::Desktop, AdapterConfig::default());
        let dbg = format!("{adapter:?}");
        assert!(dbg.contains("SyncAdapter"));
        assert!(dbg.contains("hero"));
    }
}
