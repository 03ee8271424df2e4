//! Virtual clock for deterministic tests.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mom_scope::Scope;

use crate::{
    fire, parse_instant, TimeError, TimeService, TimerCallback, TimerId, DEFAULT_START_MS,
    TIME_SERVICE,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Interval,
    Timeout,
}

struct Pending {
    id: TimerId,
    kind: Kind,
    delay_ms: u64,
    due: i64,
    callback: TimerCallback,
}

struct Clock {
    initial_ms: i64,
    now_ms: i64,
    last_id: u64,
    /// Ordered by due time; timers due at the same instant keep their
    /// registration order.
    queue: Vec<Pending>,
    /// Timers that have not been cleared, including one whose callback is
    /// currently running.
    live: BTreeSet<TimerId>,
}

impl Clock {
    fn schedule(&mut self, pending: Pending) {
        let at = self.queue.partition_point(|p| p.due <= pending.due);
        self.queue.insert(at, pending);
    }

    fn cancel(&mut self, id: TimerId, kind: Kind) {
        let Some(at) = self.queue.iter().position(|p| p.id == id) else {
            // Still counts when cleared from its own callback.
            self.live.remove(&id);
            return;
        };
        if self.queue[at].kind == kind {
            self.queue.remove(at);
            self.live.remove(&id);
        }
    }

    fn count(&self, kind: Kind) -> usize {
        self.queue.iter().filter(|p| p.kind == kind).count()
    }
}

/// A [`TimeService`] whose clock only moves when told to.
///
/// Callbacks run on the caller's thread, in due order, with the clock already
/// set to their due time. They may freely call back into the service.
pub struct FakeTimeService {
    clock: Mutex<Clock>,
}

impl FakeTimeService {
    /// A clock starting at `2025-01-01T12:00:00Z`.
    pub fn new() -> Self {
        Self::at(DEFAULT_START_MS)
    }

    /// A clock starting at `start_ms` milliseconds since the Unix epoch.
    pub fn at(start_ms: i64) -> Self {
        Self {
            clock: Mutex::new(Clock {
                initial_ms: start_ms,
                now_ms: start_ms,
                last_id: 0,
                queue: Vec::new(),
                live: BTreeSet::new(),
            }),
        }
    }

    /// A clock starting at an RFC 3339 instant or a `YYYY-MM-DD` date.
    pub fn starting_at(instant: &str) -> Result<Self, TimeError> {
        parse_instant(instant).map(Self::at)
    }

    /// Advance the clock by `duration_ms`, running every callback that falls
    /// due on the way, including interval repeats.
    pub fn move_time(&self, duration_ms: u64) {
        let target = self.lock().now_ms.saturating_add_unsigned(duration_ms);
        while self.run_next(target) {}
    }

    /// Jump to the next pending callback and run it.
    ///
    /// Returns `false` when nothing is pending.
    pub fn execute_next_callback(&self) -> bool {
        let due = match self.lock().queue.first() {
            Some(next) => next.due,
            None => return false,
        };
        self.run_next(due)
    }

    /// Intervals set and not yet cleared.
    pub fn active_intervals(&self) -> usize {
        self.lock().count(Kind::Interval)
    }

    /// Timeouts that have neither fired nor been cleared.
    pub fn active_timeouts(&self) -> usize {
        self.lock().count(Kind::Timeout)
    }

    /// Drop every pending timer and rewind to the start instant.
    pub fn reset(&self) {
        let mut clock = self.lock();
        clock.queue.clear();
        clock.live.clear();
        clock.last_id = 0;
        clock.now_ms = clock.initial_ms;
        tracing::debug!(now = clock.now_ms, "fake clock reset");
    }

    /// Run the first callback due at or before `target`; otherwise move the
    /// clock to `target`.
    fn run_next(&self, target: i64) -> bool {
        let mut pending = {
            let mut clock = self.lock();
            match clock.queue.first() {
                Some(next) if next.due <= target => {}
                _ => {
                    clock.now_ms = clock.now_ms.max(target);
                    return false;
                }
            }
            let pending = clock.queue.remove(0);
            clock.now_ms = pending.due;
            pending
        };

        // The lock is released so the callback can use the service.
        fire(pending.id, &mut pending.callback);

        let mut clock = self.lock();
        match pending.kind {
            Kind::Timeout => {
                clock.live.remove(&pending.id);
            }
            Kind::Interval if clock.live.contains(&pending.id) => {
                pending.due = clock.now_ms.saturating_add_unsigned(pending.delay_ms);
                clock.schedule(pending);
            }
            Kind::Interval => {}
        }
        true
    }

    fn add(&self, kind: Kind, callback: TimerCallback, delay_ms: u64) -> TimerId {
        let mut clock = self.lock();
        clock.last_id += 1;
        let id = TimerId::new(clock.last_id);
        let due = clock.now_ms.saturating_add_unsigned(delay_ms);
        clock.live.insert(id);
        clock.schedule(Pending {
            id,
            kind,
            delay_ms,
            due,
            callback,
        });
        tracing::trace!(timer = %id, ?kind, due, "fake timer scheduled");
        id
    }

    fn lock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FakeTimeService {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FakeTimeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let clock = self.lock();
        f.debug_struct("FakeTimeService")
            .field("now_ms", &clock.now_ms)
            .field("pending", &clock.queue.len())
            .finish()
    }
}

impl TimeService for FakeTimeService {
    fn now(&self) -> i64 {
        self.lock().now_ms
    }

    fn set_interval(&self, callback: TimerCallback, delay_ms: u64) -> TimerId {
        // A zero period would never let the clock move past it.
        self.add(Kind::Interval, callback, delay_ms.max(1))
    }

    fn clear_interval(&self, id: TimerId) {
        self.lock().cancel(id, Kind::Interval);
    }

    fn set_timeout(&self, callback: TimerCallback, delay_ms: u64) -> TimerId {
        self.add(Kind::Timeout, callback, delay_ms)
    }

    fn clear_timeout(&self, id: TimerId) {
        self.lock().cancel(id, Kind::Timeout);
    }
}

/// Create a fake clock starting at `start_ms` and register it in `scope`.
///
/// The returned handle drives the clock; stores see the same instance
/// through [`TIME_SERVICE`].
pub fn install_fake_time_service(scope: &Scope, start_ms: i64) -> Arc<FakeTimeService> {
    let service = Arc::new(FakeTimeService::at(start_ms));
    scope.register_object(&TIME_SERVICE, service.clone() as Arc<dyn TimeService>);
    tracing::debug!(scope = %scope.path(), start_ms, "fake time service installed");
    service
}
