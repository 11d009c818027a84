//! Defines watchers that run integration hooks at timer lifecycle points.

use crate::events::{LifecycleEvent, PlaybackSnapshot, TimerLifecycle};

/// A closure run when its lifecycle point is crossed.
///
/// Hooks run inside the engine's actor loop, so they must return quickly;
/// anything slow (an HTTP request, a file write) should be handed off to a
/// task of its own.
pub type LifecycleHook = Box<dyn FnMut(&PlaybackSnapshot) + Send + Sync>;

/// Watches the lifecycle stream for one `TimerLifecycle` point.
#[doc(hidden)]
pub(crate) struct LifecycleWatcher {
    pub cycle: TimerLifecycle,
    pub fire_count: u64,
    hook: LifecycleHook,
}

impl LifecycleWatcher {
    /// Creates a new `LifecycleWatcher`.
    pub(crate) fn new(cycle: TimerLifecycle, hook: LifecycleHook) -> Self {
        Self {
            cycle,
            fire_count: 0,
            hook,
        }
    }

    /// Runs the hook if the event matches this watcher's lifecycle point.
    /// Returns `true` if the hook was executed.
    pub(crate) fn process(&mut self, event: &LifecycleEvent) -> bool {
        if event.cycle != self.cycle {
            return false;
        }
        (self.hook)(&event.snapshot);
        self.fire_count += 1;
        true
    }
}
