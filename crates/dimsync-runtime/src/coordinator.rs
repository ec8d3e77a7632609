#![forbid(unsafe_code)]

//! The dimension coordinator: cache, event bus, and orchestration.
//!
//! [`DimensionCoordinator`] owns the last-known value per
//! (entity, breakpoint, property), three subscription registries
//! (global, per-entity, per-event-kind), and the update pipeline:
//! parse → resolve reference → clamp → cache → broadcast.
//!
//! Cloning the handle shares the same inner state (the
//! `Rc<RefCell<..>>` pattern); all calls are single-threaded and run to
//! completion, including the synchronous fan-out to subscribers.
//!
//! # Invariants
//!
//! 1. Every `update`/`emit_external_change` call broadcasts exactly one
//!    event, in call order — no batching, no coalescing.
//! 2. For one event, global subscribers are notified before per-entity
//!    subscribers, which are notified before per-kind subscribers;
//!    registration order within each registry.
//! 3. `get_value` returns a copy, never the live cache map.
//! 4. A panicking subscriber is logged and skipped; the remaining
//!    subscribers are still notified and the emitting caller never sees
//!    the panic.
//! 5. Cancellation is idempotent and immediate: a subscriber cancelled
//!    mid-dispatch (by an earlier callback) does not fire.
//! 6. Nothing in the public contract panics: invalid parameters produce
//!    a failure outcome plus an error event.
//!
//! # Failure Modes
//!
//! Subscriber callbacks must not re-enter `update` synchronously for the
//! same key; dispatch iterates a snapshot so registry mutation is safe,
//! but a re-entrant write loop is a subscriber-graph bug this layer does
//! not detect.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, error, warn};
use web_time::Instant;

use dimsync_core::convert::convert_with;
use dimsync_core::value::{DimensionValue, RawValue, parse};
use dimsync_core::{
    BoundsTable, Breakpoint, MeasurementProvider, ReferenceBox, ReferenceResolver, Unit,
};

use crate::event::{ChangeEvent, DimensionEvent, ErrorEvent, EventKind};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

type SubId = u64;
type Callback = Rc<dyn Fn(&DimensionEvent)>;
type CacheKey = (String, Breakpoint);

/// Fallback archetype used when an entity has no registered archetype.
pub const DEFAULT_ARCHETYPE: &str = "default";

/// Coordinator construction options.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// When false, `update` skips clamping entirely (permissive
    /// free-form editing); explicit clamping via the bounds table stays
    /// available to callers.
    pub validate: bool,
    /// Archetype name → bounds rules, consulted during validation.
    pub bounds: BoundsTable,
    /// Entity id → archetype name. Entities not listed here validate
    /// against [`DEFAULT_ARCHETYPE`].
    pub archetypes: FxHashMap<String, String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            validate: true,
            bounds: BoundsTable::default(),
            archetypes: FxHashMap::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Register an entity's archetype (builder pattern).
    #[must_use]
    pub fn with_entity_archetype(
        mut self,
        entity_id: impl Into<String>,
        archetype: impl Into<String>,
    ) -> Self {
        self.archetypes.insert(entity_id.into(), archetype.into());
        self
    }
}

/// Result shape of [`DimensionCoordinator::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub success: bool,
    /// The finalized formatted value that was cached and broadcast.
    pub final_value: String,
    /// The parsed (pre-clamp) value.
    pub normalized: DimensionValue,
    pub error: Option<String>,
}

impl UpdateOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            final_value: String::new(),
            normalized: DimensionValue::empty_px(),
            error: Some(message.into()),
        }
    }
}

/// Point-in-time subscriber counts per registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriberCounts {
    pub global: usize,
    pub entity: usize,
    pub event_kind: usize,
}

impl SubscriberCounts {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.global + self.entity + self.event_kind
    }
}

/// Observability snapshot. Counters are monotonic for the lifetime of
/// the coordinator (until `reset`); subscriber counts are point-in-time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoordinatorStats {
    pub subscribers: SubscriberCounts,
    pub conversion_count: u64,
    pub degraded_conversion_count: u64,
    pub validation_count: u64,
    pub event_count: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    conversion_count: u64,
    degraded_conversion_count: u64,
    validation_count: u64,
    event_count: u64,
}

#[derive(Debug, Clone)]
enum SubTarget {
    Global,
    Entity(String),
    Kind(EventKind),
    /// Produced for invalid subscribe calls; cancels to nothing.
    Inert,
}

struct Inner {
    config: CoordinatorConfig,
    cache: FxHashMap<CacheKey, FxHashMap<String, String>>,
    global: Vec<(SubId, Callback)>,
    by_entity: FxHashMap<String, Vec<(SubId, Callback)>>,
    by_kind: FxHashMap<EventKind, Vec<(SubId, Callback)>>,
    /// Liveness set consulted at dispatch time so cancellation takes
    /// effect even for callbacks already in the dispatch snapshot.
    live: FxHashSet<SubId>,
    next_sub_id: SubId,
    next_sequence: u64,
    started: Instant,
    counters: Counters,
}

impl Inner {
    fn subscriber_counts(&self) -> SubscriberCounts {
        SubscriberCounts {
            global: self.global.len(),
            entity: self.by_entity.values().map(Vec::len).sum(),
            event_kind: self.by_kind.values().map(Vec::len).sum(),
        }
    }

    fn stamp(&mut self) -> (u64, u64) {
        self.next_sequence += 1;
        let timestamp_ms = self.started.elapsed().as_millis() as u64;
        (self.next_sequence, timestamp_ms)
    }

    fn archetype_for(&self, entity_id: &str) -> String {
        self.config
            .archetypes
            .get(entity_id)
            .cloned()
            .unwrap_or_else(|| DEFAULT_ARCHETYPE.to_string())
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// The shared dimension coordinator. Clone the handle freely; all
/// clones see the same cache, registries, and counters.
pub struct DimensionCoordinator {
    resolver: Rc<ReferenceResolver>,
    inner: Rc<RefCell<Inner>>,
}

// Manual Clone: shares the same inner state.
impl Clone for DimensionCoordinator {
    fn clone(&self) -> Self {
        Self {
            resolver: Rc::clone(&self.resolver),
            inner: Rc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for DimensionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("DimensionCoordinator")
            .field("cache_entries", &inner.cache.len())
            .field("subscribers", &inner.subscriber_counts().total())
            .field("event_count", &inner.counters.event_count)
            .finish()
    }
}

impl DimensionCoordinator {
    /// Create a coordinator over the given measurement provider.
    #[must_use]
    pub fn new(provider: Rc<dyn MeasurementProvider>, config: CoordinatorConfig) -> Self {
        Self {
            resolver: Rc::new(ReferenceResolver::new(provider)),
            inner: Rc::new(RefCell::new(Inner {
                config,
                cache: FxHashMap::default(),
                global: Vec::new(),
                by_entity: FxHashMap::default(),
                by_kind: FxHashMap::default(),
                live: FxHashSet::default(),
                next_sub_id: 1,
                next_sequence: 0,
                started: Instant::now(),
                counters: Counters::default(),
            })),
        }
    }

    // -- update pipeline ----------------------------------------------------

    /// Parse, validate, cache, and broadcast a dimension write.
    ///
    /// Never panics across this boundary: invalid parameters produce a
    /// `{success: false}` outcome plus an [`ErrorEvent`] broadcast.
    pub fn update(
        &self,
        entity_id: &str,
        property: &str,
        raw: impl Into<RawValue>,
        breakpoint: Breakpoint,
        source: &str,
    ) -> UpdateOutcome {
        let raw = raw.into();
        if entity_id.is_empty() || property.is_empty() {
            let message = "update requires an entity id and a property";
            warn!(entity_id, property, source, "{message}");
            let event = {
                let mut inner = self.inner.borrow_mut();
                let (sequence, timestamp_ms) = inner.stamp();
                ErrorEvent {
                    entity_id: entity_id.to_string(),
                    property: property.to_string(),
                    message: message.to_string(),
                    breakpoint,
                    source: source.to_string(),
                    timestamp_ms,
                    sequence,
                }
            };
            self.broadcast(&DimensionEvent::Error(event));
            return UpdateOutcome::failure(message);
        }

        let normalized = parse(raw);

        // Resolved fresh on every write; layout can change between calls.
        if let Some(reference) = self.resolver.resolve(entity_id, property) {
            if !reference.is_valid {
                debug!(entity_id, property, "reference unresolvable for this write");
            }
        }

        let final_value = {
            let mut inner = self.inner.borrow_mut();
            if inner.config.validate && normalized.is_numeric() {
                inner.counters.validation_count += 1;
                let archetype = inner.archetype_for(entity_id);
                inner.config.bounds.clamp(&normalized, &archetype, property)
            } else {
                normalized.format()
            }
        };

        let event = self.commit(entity_id, property, final_value.clone(), breakpoint, source);
        self.broadcast(&DimensionEvent::Change(event));

        UpdateOutcome {
            success: true,
            final_value,
            normalized,
            error: None,
        }
    }

    /// Push an externally observed value (e.g. a drag-resize gesture)
    /// straight into the cache and broadcast it, bypassing parse and
    /// validation. Returns false for invalid parameters.
    pub fn emit_external_change(
        &self,
        entity_id: &str,
        property: &str,
        value: &str,
        breakpoint: Breakpoint,
        source: &str,
    ) -> bool {
        if entity_id.is_empty() || property.is_empty() {
            warn!(
                entity_id,
                property, source, "external change requires an entity id and a property"
            );
            return false;
        }
        let event = self.commit(entity_id, property, value.to_string(), breakpoint, source);
        self.broadcast(&DimensionEvent::Change(event));
        true
    }

    /// Shared cache-write/event-construction tail of the two entry
    /// points.
    fn commit(
        &self,
        entity_id: &str,
        property: &str,
        value: String,
        breakpoint: Breakpoint,
        source: &str,
    ) -> ChangeEvent {
        let mut inner = self.inner.borrow_mut();
        let previous_value = inner
            .cache
            .entry((entity_id.to_string(), breakpoint))
            .or_default()
            .insert(property.to_string(), value.clone());
        let (sequence, timestamp_ms) = inner.stamp();
        ChangeEvent {
            entity_id: entity_id.to_string(),
            property: property.to_string(),
            value,
            breakpoint,
            source: source.to_string(),
            previous_value,
            timestamp_ms,
            sequence,
        }
    }

    // -- conversion ---------------------------------------------------------

    /// Resolve a fresh reference and convert between units. Fail-soft:
    /// unparseable input converts as zero, a missing reference returns
    /// the value unconverted.
    pub fn convert(
        &self,
        raw: impl Into<RawValue>,
        from: Unit,
        to: Unit,
        entity_id: &str,
        property: &str,
    ) -> f64 {
        let parsed = parse(raw);
        let Some(value) = parsed.value else {
            warn!(entity_id, property, "convert called with a non-numeric value");
            let mut inner = self.inner.borrow_mut();
            inner.counters.conversion_count += 1;
            inner.counters.degraded_conversion_count += 1;
            return 0.0;
        };
        let reference = self.resolver.resolve(entity_id, property);
        let conversion = convert_with(value, from, to, reference.as_ref());
        let mut inner = self.inner.borrow_mut();
        inner.counters.conversion_count += 1;
        if conversion.degraded {
            inner.counters.degraded_conversion_count += 1;
        }
        conversion.value
    }

    /// Resolve the reference box for an (entity, property) pair. Exposed
    /// for consumers that need the reference itself, not a conversion.
    #[must_use]
    pub fn resolve_reference(&self, entity_id: &str, property: &str) -> Option<ReferenceBox> {
        self.resolver.resolve(entity_id, property)
    }

    // -- cache --------------------------------------------------------------

    /// A copy of the cached property map for one (entity, breakpoint),
    /// empty if nothing has been written yet.
    #[must_use]
    pub fn get_value(
        &self,
        entity_id: &str,
        breakpoint: Breakpoint,
    ) -> FxHashMap<String, String> {
        self.inner
            .borrow()
            .cache
            .get(&(entity_id.to_string(), breakpoint))
            .cloned()
            .unwrap_or_default()
    }

    // -- subscriptions ------------------------------------------------------

    /// Subscribe to every event.
    pub fn subscribe(&self, callback: impl Fn(&DimensionEvent) + 'static) -> Subscription {
        self.add_subscription(SubTarget::Global, Rc::new(callback))
    }

    /// Subscribe to events for one entity id.
    pub fn subscribe_to_entity(
        &self,
        entity_id: &str,
        callback: impl Fn(&DimensionEvent) + 'static,
    ) -> Subscription {
        if entity_id.is_empty() {
            warn!("subscribe_to_entity requires an entity id; returning inert subscription");
            return Subscription::inert();
        }
        self.add_subscription(SubTarget::Entity(entity_id.to_string()), Rc::new(callback))
    }

    /// Subscribe to one event kind.
    pub fn subscribe_to_event_kind(
        &self,
        kind: EventKind,
        callback: impl Fn(&DimensionEvent) + 'static,
    ) -> Subscription {
        self.add_subscription(SubTarget::Kind(kind), Rc::new(callback))
    }

    fn add_subscription(&self, target: SubTarget, callback: Callback) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_sub_id;
        inner.next_sub_id += 1;
        inner.live.insert(id);
        match &target {
            SubTarget::Global => inner.global.push((id, callback)),
            SubTarget::Entity(entity) => inner
                .by_entity
                .entry(entity.clone())
                .or_default()
                .push((id, callback)),
            SubTarget::Kind(kind) => inner.by_kind.entry(*kind).or_default().push((id, callback)),
            SubTarget::Inert => unreachable!("inert subscriptions are never registered"),
        }
        debug!(subscriber = id, scope = ?target, "subscriber attached");
        Subscription {
            id,
            target,
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Fan an event out to every matching subscriber: global first, then
    /// per-entity, then per-kind, registration order within each.
    fn broadcast(&self, event: &DimensionEvent) {
        let snapshot: Vec<(SubId, Callback)> = {
            let mut inner = self.inner.borrow_mut();
            inner.counters.event_count += 1;
            let mut list: Vec<(SubId, Callback)> = inner.global.clone();
            if let Some(subs) = inner.by_entity.get(event.entity_id()) {
                list.extend(subs.iter().cloned());
            }
            if let Some(subs) = inner.by_kind.get(&event.kind()) {
                list.extend(subs.iter().cloned());
            }
            list
        };

        for (id, callback) in snapshot {
            // Re-check liveness so a cancellation performed by an
            // earlier callback in this same dispatch takes effect.
            if !self.inner.borrow().live.contains(&id) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!(
                    subscriber = id,
                    sequence = event.sequence(),
                    "subscriber callback panicked during dispatch; skipping it"
                );
            }
        }
    }

    // -- introspection and lifecycle ----------------------------------------

    /// Observability snapshot.
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        let inner = self.inner.borrow();
        CoordinatorStats {
            subscribers: inner.subscriber_counts(),
            conversion_count: inner.counters.conversion_count,
            degraded_conversion_count: inner.counters.degraded_conversion_count,
            validation_count: inner.counters.validation_count,
            event_count: inner.counters.event_count,
        }
    }

    /// The sequence number of the most recently emitted event (0 before
    /// the first). Adapters use this as their echo-suppression floor.
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.inner.borrow().next_sequence
    }

    /// Whether any subscriber is attached to any registry.
    #[must_use]
    pub fn has_subscribers(&self) -> bool {
        self.inner.borrow().subscriber_counts().total() > 0
    }

    /// Clear the cache, registries, and counters (test isolation).
    /// Refuses while subscribers are attached unless `force` is set.
    pub fn reset(&self, force: bool) -> bool {
        let mut inner = self.inner.borrow_mut();
        let attached = inner.subscriber_counts().total();
        if attached > 0 && !force {
            warn!(attached, "reset refused while subscribers are attached");
            return false;
        }
        inner.cache.clear();
        inner.global.clear();
        inner.by_entity.clear();
        inner.by_kind.clear();
        inner.live.clear();
        inner.next_sequence = 0;
        inner.counters = Counters::default();
        debug!("coordinator reset");
        true
    }
}

// ---------------------------------------------------------------------------
// Subscription guard
// ---------------------------------------------------------------------------

/// Handle to a registered subscriber. `cancel()` is idempotent and takes
/// effect immediately; dropping the guard also cancels (RAII).
pub struct Subscription {
    id: SubId,
    target: SubTarget,
    inner: Weak<RefCell<Inner>>,
}

impl Subscription {
    /// The inert guard returned for invalid subscribe calls.
    #[must_use]
    pub fn inert() -> Self {
        Self {
            id: 0,
            target: SubTarget::Inert,
            inner: Weak::new(),
        }
    }

    /// Detach the subscriber. No further callbacks fire after this
    /// returns, even for an event currently being dispatched.
    pub fn cancel(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut inner = inner.borrow_mut();
        if !inner.live.remove(&self.id) {
            return; // already cancelled (or reset cleared us)
        }
        match &self.target {
            SubTarget::Global => inner.global.retain(|(id, _)| *id != self.id),
            SubTarget::Entity(entity) => {
                if let Some(subs) = inner.by_entity.get_mut(entity) {
                    subs.retain(|(id, _)| *id != self.id);
                    if subs.is_empty() {
                        inner.by_entity.remove(entity);
                    }
                }
            }
            SubTarget::Kind(kind) => {
                if let Some(subs) = inner.by_kind.get_mut(kind) {
                    subs.retain(|(id, _)| *id != self.id);
                    if subs.is_empty() {
                        inner.by_kind.remove(kind);
                    }
                }
            }
            SubTarget::Inert => {}
        }
        debug!(subscriber = self.id, "subscriber detached");
    }

    /// Whether this guard refers to a still-attached subscriber.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| inner.borrow().live.contains(&self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
