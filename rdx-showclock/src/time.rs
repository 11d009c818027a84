//! Time sources, the monotonic clock and the `SystemClock` ticker.
//!
//! The engine reads time in two flavours. Monotonic milliseconds drive the
//! play/pause timer and must never run backwards. Wall-clock milliseconds
//! since local midnight drive roll mode, which follows the rundown's
//! absolute times.

use crate::common::{Millis, DAY_MS};
use chrono::{Timelike, Utc};
use chrono_tz::Tz;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{info, trace, warn};

/// Something that can tell the engine what time it is.
pub trait TimeSource: Send + Sync {
    /// Milliseconds from an arbitrary fixed origin. Expected to be monotonic,
    /// but `MonotonicClock` guards against sources that are not.
    fn monotonic_ms(&self) -> Millis;

    /// Milliseconds since midnight of the current show day.
    fn wall_ms(&self) -> Millis;
}

/// The real clock: `Instant` for monotonic time, the configured timezone for
/// wall time.
pub struct SystemTimeSource {
    origin: Instant,
    timezone: Tz,
}

impl SystemTimeSource {
    pub fn new(timezone: Tz) -> Self {
        Self {
            origin: Instant::now(),
            timezone,
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn monotonic_ms(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }

    fn wall_ms(&self) -> Millis {
        let now = Utc::now().with_timezone(&self.timezone);
        let ms = Millis::from(now.num_seconds_from_midnight()) * 1000
            + Millis::from(now.nanosecond() / 1_000_000);
        // Leap seconds report nanosecond >= 1e9.
        ms.min(DAY_MS - 1)
    }
}

/// A hand-driven time source for tests and simulations.
///
/// Cloning shares the same underlying time, so a test can keep one handle
/// and give the other to the engine.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    monotonic: Arc<AtomicI64>,
    wall: Arc<AtomicI64>,
}

impl ManualTimeSource {
    pub fn new(monotonic: Millis, wall: Millis) -> Self {
        Self {
            monotonic: Arc::new(AtomicI64::new(monotonic)),
            wall: Arc::new(AtomicI64::new(wall)),
        }
    }

    /// Moves both clocks forward by `ms`.
    pub fn advance(&self, ms: Millis) {
        self.monotonic.fetch_add(ms, Ordering::SeqCst);
        self.wall.fetch_add(ms, Ordering::SeqCst);
    }

    /// Sets the monotonic reading directly, including backwards.
    pub fn set_monotonic(&self, ms: Millis) {
        self.monotonic.store(ms, Ordering::SeqCst);
    }

    pub fn set_wall(&self, ms: Millis) {
        self.wall.store(ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn monotonic_ms(&self) -> Millis {
        self.monotonic.load(Ordering::SeqCst)
    }

    fn wall_ms(&self) -> Millis {
        self.wall.load(Ordering::SeqCst)
    }
}

/// Wraps a `TimeSource` and guarantees readings never go backwards.
pub struct MonotonicClock {
    source: Arc<dyn TimeSource>,
    last_observed: Millis,
}

impl MonotonicClock {
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        let last_observed = source.monotonic_ms();
        Self {
            source,
            last_observed,
        }
    }

    /// The current monotonic timestamp. A regression in the underlying source
    /// is clamped to the last value handed out.
    pub fn now(&mut self) -> Millis {
        let reading = self.source.monotonic_ms();
        if reading < self.last_observed {
            warn!(
                reading,
                last_observed = self.last_observed,
                "Clock regression detected, holding last observed time."
            );
            return self.last_observed;
        }
        self.last_observed = reading;
        reading
    }

    /// `now() - since`, never negative.
    pub fn elapsed_since(&mut self, since: Millis) -> Millis {
        self.now().saturating_sub(since).max(0)
    }

    /// Milliseconds since midnight of the show day.
    pub fn wall(&self) -> Millis {
        self.source.wall_ms()
    }
}

/// A single pulse of the `SystemClock`.
#[derive(Debug, Clone)]
pub struct TickEvent {
    pub tick_count: u64,
    pub timestamp: tokio::time::Instant,
}

/// The engine's heartbeat. Runs as its own task and broadcasts a `TickEvent`
/// every interval until told to shut down.
pub struct SystemClock {
    interval: Duration,
    tick_sender: broadcast::Sender<Arc<TickEvent>>,
}

impl SystemClock {
    pub fn new(interval: Duration, tick_sender: broadcast::Sender<Arc<TickEvent>>) -> Self {
        Self {
            interval,
            tick_sender,
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of a tokio interval completes immediately.
        ticker.tick().await;
        let mut tick_count: u64 = 0;
        info!("SystemClock ticking every {:?}.", self.interval);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                timestamp = ticker.tick() => {
                    tick_count += 1;
                    trace!("Tick #{}", tick_count);
                    self.tick_sender.send(Arc::new(TickEvent { tick_count, timestamp })).ok();
                }
            }
        }
        info!("SystemClock stopped after {} ticks.", tick_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regression_is_clamped_to_last_observed() {
        let source = ManualTimeSource::new(10_000, 0);
        let mut clock = MonotonicClock::new(Arc::new(source.clone()));
        assert_eq!(clock.now(), 10_000);

        source.set_monotonic(9_000);
        assert_eq!(clock.now(), 10_000);
        assert_eq!(clock.elapsed_since(10_000), 0);

        source.set_monotonic(10_500);
        assert_eq!(clock.now(), 10_500);
    }

    #[test]
    fn elapsed_since_future_timestamp_is_zero() {
        let source = ManualTimeSource::new(1_000, 0);
        let mut clock = MonotonicClock::new(Arc::new(source));
        assert_eq!(clock.elapsed_since(5_000), 0);
    }

    #[test]
    fn system_wall_clock_stays_within_a_day() {
        let source = SystemTimeSource::new(Tz::UTC);
        let wall = source.wall_ms();
        assert!((0..DAY_MS).contains(&wall));
    }

    #[tokio::test]
    async fn system_clock_ticks_until_shutdown() {
        let (tick_tx, mut tick_rx) = broadcast::channel(16);
        let (shutdown_tx, _) = broadcast::channel(1);
        let clock = SystemClock::new(Duration::from_millis(5), tick_tx);
        let handle = tokio::spawn(clock.run(shutdown_tx.subscribe()));

        let first = tick_rx.recv().await.expect("first tick");
        assert_eq!(first.tick_count, 1);

        shutdown_tx.send(()).expect("clock is listening");
        handle.await.expect("clock task joins");
    }
}
