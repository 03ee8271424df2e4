//! Time capability for stores.
//!
//! Stores that need the clock or timers look up a [`TimeService`] in their
//! scope under [`TIME_SERVICE`] instead of using tokio timers directly, so a
//! test can install a [`FakeTimeService`] and drive time by hand:
//!
//! - [`SystemTimeService`] reads the wall clock with `chrono` and runs timers
//!   as tokio tasks
//! - [`FakeTimeService`] is a virtual clock; callbacks only run when the test
//!   calls [`FakeTimeService::move_time`] or
//!   [`FakeTimeService::execute_next_callback`]
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use mom_scope::Scope;
//! use mom_time::{install_fake_time_service, TIME_SERVICE};
//!
//! let scope = Scope::new_root("test");
//! let clock = install_fake_time_service(&scope, mom_time::DEFAULT_START_MS);
//!
//! let ticks = Arc::new(AtomicUsize::new(0));
//! let t = ticks.clone();
//! let time = scope.get(&TIME_SERVICE).unwrap();
//! time.set_interval(Box::new(move || { t.fetch_add(1, Ordering::SeqCst); }), 1000);
//!
//! clock.move_time(3500);
//! assert_eq!(ticks.load(Ordering::SeqCst), 3);
//! assert_eq!(time.now(), mom_time::DEFAULT_START_MS + 3500);
//! ```

mod error;
mod fake;
mod system;

pub use error::TimeError;
pub use fake::{install_fake_time_service, FakeTimeService};
pub use system::{register_system_time_service, SystemTimeService};

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::{DateTime, NaiveDate};
use mom_scope::InterfaceId;

/// Interface id under which stores look up their time service.
pub const TIME_SERVICE: InterfaceId<dyn TimeService> =
    InterfaceId::new("mom.services.TimeService");

/// `2025-01-01T12:00:00Z` in milliseconds since the Unix epoch.
pub const DEFAULT_START_MS: i64 = 1_735_732_800_000;

/// Callback run by an interval or a timeout.
pub type TimerCallback = Box<dyn FnMut() + Send + 'static>;

/// Handle returned by `set_interval` / `set_timeout`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl TimerId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Clock and timers.
///
/// Clearing an id that is unknown, already fired or of the other kind is a
/// no-op.
pub trait TimeService: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now(&self) -> i64;

    /// Run `callback` every `delay_ms` milliseconds until cleared.
    fn set_interval(&self, callback: TimerCallback, delay_ms: u64) -> TimerId;

    fn clear_interval(&self, id: TimerId);

    /// Run `callback` once, `delay_ms` milliseconds from now.
    fn set_timeout(&self, callback: TimerCallback, delay_ms: u64) -> TimerId;

    fn clear_timeout(&self, id: TimerId);
}

/// Parse a start instant: RFC 3339, or a bare `YYYY-MM-DD` date taken as
/// midnight UTC. Returns milliseconds since the Unix epoch.
pub fn parse_instant(input: &str) -> Result<i64, TimeError> {
    match DateTime::parse_from_rfc3339(input) {
        Ok(instant) => Ok(instant.timestamp_millis()),
        Err(rfc_err) => NaiveDate::parse_from_str(input, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|midnight| midnight.and_utc().timestamp_millis())
            .ok_or(TimeError::InvalidStart {
                input: input.to_string(),
                source: rfc_err,
            }),
    }
}

/// Run a timer callback, logging instead of unwinding if it panics.
pub(crate) fn fire(id: TimerId, callback: &mut TimerCallback) -> bool {
    match catch_unwind(AssertUnwindSafe(|| callback())) {
        Ok(()) => true,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic".to_string());
            tracing::error!(timer = %id, %message, "timer callback panicked");
            false
        }
    }
}
