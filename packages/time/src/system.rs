//! Wall clock and tokio-driven timers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mom_scope::Scope;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::{fire, TimeError, TimeService, TimerCallback, TimerId, TIME_SERVICE};

type Tasks = Arc<Mutex<BTreeMap<TimerId, JoinHandle<()>>>>;

/// A [`TimeService`] backed by `chrono::Utc::now` and tokio timers.
///
/// Each interval or timeout is a task spawned on the runtime the service was
/// created on. Clearing a timer aborts its task; dropping the service aborts
/// all of them.
pub struct SystemTimeService {
    handle: Handle,
    next_id: AtomicU64,
    tasks: Tasks,
}

impl SystemTimeService {
    /// Bind to the tokio runtime of the calling context.
    pub fn new() -> Result<Self, TimeError> {
        Ok(Self::with_handle(Handle::try_current()?))
    }

    /// Spawn timers on `handle`.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            next_id: AtomicU64::new(1),
            tasks: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Number of timers that have not fired (timeouts) or been cleared.
    pub fn active_timers(&self) -> usize {
        lock(&self.tasks).len()
    }

    fn spawn<F>(&self, task: F) -> TimerId
    where
        F: FnOnce(TimerId, Tasks) -> JoinHandle<()>,
    {
        let id = TimerId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        // Hold the map while spawning so a zero-delay timeout cannot remove
        // itself before it is inserted.
        let mut tasks = lock(&self.tasks);
        let join = task(id, self.tasks.clone());
        tasks.insert(id, join);
        id
    }

    fn cancel(&self, id: TimerId) {
        if let Some(join) = lock(&self.tasks).remove(&id) {
            join.abort();
            tracing::trace!(timer = %id, "timer cleared");
        }
    }
}

impl TimeService for SystemTimeService {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn set_interval(&self, mut callback: TimerCallback, delay_ms: u64) -> TimerId {
        // tokio rejects a zero period.
        let period = Duration::from_millis(delay_ms.max(1));
        let handle = self.handle.clone();
        self.spawn(move |id, _| {
            handle.spawn(async move {
                let mut ticks = time::interval_at(Instant::now() + period, period);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticks.tick().await;
                    fire(id, &mut callback);
                }
            })
        })
    }

    fn clear_interval(&self, id: TimerId) {
        self.cancel(id);
    }

    fn set_timeout(&self, mut callback: TimerCallback, delay_ms: u64) -> TimerId {
        let delay = Duration::from_millis(delay_ms);
        let handle = self.handle.clone();
        self.spawn(move |id, tasks| {
            handle.spawn(async move {
                time::sleep(delay).await;
                lock(&tasks).remove(&id);
                fire(id, &mut callback);
            })
        })
    }

    fn clear_timeout(&self, id: TimerId) {
        self.cancel(id);
    }
}

impl Drop for SystemTimeService {
    fn drop(&mut self) {
        let tasks = std::mem::take(&mut *lock(&self.tasks));
        for join in tasks.into_values() {
            join.abort();
        }
    }
}

impl std::fmt::Debug for SystemTimeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemTimeService")
            .field("active_timers", &self.active_timers())
            .finish()
    }
}

/// Register a [`SystemTimeService`] bound to the current tokio runtime in
/// `scope`. Nothing is spawned until a store sets a timer.
pub fn register_system_time_service(scope: &Scope) -> Result<(), TimeError> {
    let handle = Handle::try_current()?;
    scope.register_service(&TIME_SERVICE, move |_| {
        Arc::new(SystemTimeService::with_handle(handle.clone())) as Arc<dyn TimeService>
    });
    tracing::debug!(scope = %scope.path(), "system time service registered");
    Ok(())
}

fn lock(tasks: &Tasks) -> MutexGuard<'_, BTreeMap<TimerId, JoinHandle<()>>> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}
