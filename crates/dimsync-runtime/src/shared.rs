#![forbid(unsafe_code)]

//! Process-wide shared coordinator.
//!
//! The engine is single-threaded by design, so the shared instance is
//! thread-local: each thread that calls [`shared_with`] gets its own
//! coordinator, and handles are never sent across threads.
//!
//! # Invariants
//!
//! 1. `shared_with` is first-call-wins per thread; later calls return
//!    the existing instance and ignore their arguments (with a warning).
//! 2. `reset_shared` refuses while subscribers are attached unless
//!    forced, mirroring [`DimensionCoordinator::reset`].

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, warn};

use dimsync_core::MeasurementProvider;

use crate::coordinator::{CoordinatorConfig, DimensionCoordinator};

thread_local! {
    static SHARED: RefCell<Option<DimensionCoordinator>> = const { RefCell::new(None) };
}

/// The shared coordinator for this thread, creating it on first call.
/// On later calls the provider and config arguments are ignored.
pub fn shared_with(
    provider: Rc<dyn MeasurementProvider>,
    config: CoordinatorConfig,
) -> DimensionCoordinator {
    SHARED.with(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(existing) = slot.as_ref() {
            warn!("shared coordinator already initialized; arguments ignored");
            return existing.clone();
        }
        debug!("initializing shared coordinator");
        let coordinator = DimensionCoordinator::new(provider, config);
        *slot = Some(coordinator.clone());
        coordinator
    })
}

/// The shared coordinator if one has been initialized on this thread.
#[must_use]
pub fn shared() -> Option<DimensionCoordinator> {
    SHARED.with(|slot| slot.borrow().clone())
}

/// Drop the shared instance so the next [`shared_with`] builds a fresh
/// one. Refuses (returning false) while subscribers are attached unless
/// `force` is set. Intended for test isolation.
pub fn reset_shared(force: bool) -> bool {
    SHARED.with(|slot| {
        let mut slot = slot.borrow_mut();
        match slot.as_ref() {
            None => true,
            Some(coordinator) => {
                if !coordinator.reset(force) {
                    return false;
                }
                *slot = None;
                true
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use dimsync_core::StaticProvider;

    fn provider() -> Rc<dyn MeasurementProvider> {
        Rc::new(StaticProvider::new())
    }

    // The slot is thread-local, so each test runs against a private
    // instance by spawning its own thread.

    #[test]
    fn first_call_wins() {
        std::thread::spawn(|| {
            assert!(shared().is_none());
            let a = shared_with(provider(), CoordinatorConfig::default());
            let b = shared_with(provider(), CoordinatorConfig::default());
            a.emit_external_change(
                "hero",
                "width",
                "10px",
                dimsync_core::Breakpoint::Desktop,
                "t",
            );
            assert_eq!(
                b.get_value("hero", dimsync_core::Breakpoint::Desktop)
                    .get("width")
                    .map(String::as_str),
                Some("10px"),
                "both handles must share state"
            );
        })
        .join()
        .expect("thread");
    }

    #[test]
    fn reset_refuses_with_subscribers_then_forces() {
        std::thread::spawn(|| {
            let c = shared_with(provider(), CoordinatorConfig::default());
            let _sub = c.subscribe(|_| {});
            assert!(!reset_shared(false));
            assert!(shared().is_some());
            assert!(reset_shared(true));
            assert!(shared().is_none());
        })
        .join()
        .expect("thread");
    }

    #[test]
    fn reset_without_instance_is_ok() {
        std::thread::spawn(|| {
            assert!(reset_shared(false));
        })
        .join()
        .expect("thread");
    }
}
