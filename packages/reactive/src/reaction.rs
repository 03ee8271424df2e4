//! Autoruns and reactions.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::atom::{resubscribe, Atom, Observer};
use crate::{lock, next_id, tracking};

/// One run of a reaction: performs its tracked work and returns what it read.
type Body = Box<dyn FnMut() -> Vec<Atom> + Send>;

pub(crate) struct ReactionCore {
    id: u64,
    name: String,
    body: Mutex<Option<Body>>,
    deps: Mutex<Vec<Atom>>,
    disposed: AtomicBool,
    me: Weak<ReactionCore>,
}

impl ReactionCore {
    fn new(name: String, body: Body) -> Arc<Self> {
        Arc::new_cyclic(|me| ReactionCore {
            id: next_id(),
            name,
            body: Mutex::new(Some(body)),
            deps: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
            me: me.clone(),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn run(&self) {
        if self.is_disposed() {
            return;
        }
        let deps = {
            let mut body = lock(&self.body);
            match body.as_mut() {
                Some(body) => body(),
                None => return,
            }
        };
        if self.is_disposed() {
            // Disposed by its own effect.
            for atom in deps {
                atom.unsubscribe(self.id);
            }
            return;
        }
        let observer: Weak<dyn Observer> = self.me.clone();
        let previous = std::mem::replace(&mut *lock(&self.deps), deps.clone());
        resubscribe(self.id, &observer, previous, &deps);
    }

    fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return false;
        }
        for atom in lock(&self.deps).drain(..) {
            atom.unsubscribe(self.id);
        }
        // Free captured state unless the body is running right now.
        if let Ok(mut body) = self.body.try_lock() {
            body.take();
        }
        tracing::trace!(reaction = %self.name, "reaction disposed");
        true
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Observer for ReactionCore {
    fn on_stale(&self) {
        if self.is_disposed() {
            return;
        }
        if let Some(me) = self.me.upgrade() {
            tracking::schedule(me);
        }
    }
}

/// Handle returned by [`autorun`] and [`reaction`].
///
/// The subscription lives as long as a disposer for it exists or until
/// [`dispose`](Disposer::dispose) is called. Disposing is idempotent.
#[derive(Clone)]
pub struct Disposer {
    core: Arc<ReactionCore>,
}

impl Disposer {
    /// Stop the subscription. Returns `false` if it was already stopped.
    pub fn dispose(&self) -> bool {
        self.core.dispose()
    }

    /// Whether the subscription has been torn down.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("name", &self.core.name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Run `effect` now and again whenever anything it read changes.
///
/// Inside a batch, the first run is deferred until the batch ends.
pub fn autorun(name: impl Into<String>, mut effect: impl FnMut() + Send + 'static) -> Disposer {
    let body: Body = Box::new(move || tracking::track(&mut effect).1);
    let core = ReactionCore::new(name.into(), body);
    tracking::schedule(core.clone());
    Disposer { core }
}

/// Track only what `selector` reads; run `effect` with the selected value
/// whenever it changes.
///
/// With `fire_immediately`, `effect` also runs once with the initial value.
/// The effect itself is not tracked.
pub fn reaction<T, S, E>(
    name: impl Into<String>,
    mut selector: S,
    mut effect: E,
    fire_immediately: bool,
) -> Disposer
where
    T: PartialEq + Send + 'static,
    S: FnMut() -> T + Send + 'static,
    E: FnMut(&T) + Send + 'static,
{
    let mut previous: Option<T> = None;
    let body: Body = Box::new(move || {
        let (value, deps) = tracking::track(&mut selector);
        let fire = match &previous {
            None => fire_immediately,
            Some(prev) => *prev != value,
        };
        if fire {
            tracking::untracked(|| effect(&value));
        }
        previous = Some(value);
        deps
    });
    let core = ReactionCore::new(name.into(), body);
    tracking::schedule(core.clone());
    Disposer { core }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{batch, Computed, Observable};

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn autorun_runs_immediately_and_on_change() {
        let value = Observable::new("value", "a".to_string());
        let seen = log();

        let v = value.clone();
        let s = seen.clone();
        let _d = autorun("log", move || s.lock().unwrap().push(v.get()));

        value.set("b".into());
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn autorun_created_in_batch_runs_at_batch_end() {
        let value = Observable::new("value", 1);
        let seen = log();

        let s = seen.clone();
        let v = value.clone();
        let disposer = batch(|| {
            let d = autorun("deferred", move || s.lock().unwrap().push(v.get().to_string()));
            assert!(seen.lock().unwrap().is_empty());
            d
        });
        assert_eq!(*seen.lock().unwrap(), vec!["1"]);
        disposer.dispose();
    }

    #[test]
    fn disposed_autorun_stops() {
        let value = Observable::new("value", 0);
        let seen = log();

        let v = value.clone();
        let s = seen.clone();
        let disposer = autorun("log", move || s.lock().unwrap().push(v.get().to_string()));
        assert!(disposer.dispose());
        assert!(!disposer.dispose());

        value.set(1);
        assert_eq!(*seen.lock().unwrap(), vec!["0"]);
        assert_eq!(value.atom().observer_count(), 0);
    }

    #[test]
    fn reaction_fires_only_when_selection_changes() {
        let value = Observable::new("value", 1);
        let seen = log();

        let v = value.clone();
        let s = seen.clone();
        let _d = reaction(
            "parity",
            move || v.get() % 2 == 0,
            move |even| s.lock().unwrap().push(even.to_string()),
            false,
        );

        value.set(3);
        value.set(4);
        value.set(6);
        value.set(7);
        assert_eq!(*seen.lock().unwrap(), vec!["true", "false"]);
    }

    #[test]
    fn reaction_fire_immediately_uses_initial_value() {
        let value = Observable::new("value", 5);
        let seen = log();

        let v = value.clone();
        let s = seen.clone();
        let _d = reaction(
            "now",
            move || v.get(),
            move |x| s.lock().unwrap().push(x.to_string()),
            true,
        );
        assert_eq!(*seen.lock().unwrap(), vec!["5"]);
    }

    #[test]
    fn batched_writes_notify_once() {
        let a = Observable::new("a", 0);
        let b = Observable::new("b", 0);
        let seen = log();

        let (ra, rb, s) = (a.clone(), b.clone(), seen.clone());
        let _d = autorun("sum", move || {
            s.lock().unwrap().push((ra.get() + rb.get()).to_string())
        });

        batch(|| {
            a.set(1);
            b.set(2);
        });
        assert_eq!(*seen.lock().unwrap(), vec!["0", "3"]);
    }

    #[test]
    fn chained_reactions_settle_in_one_flush() {
        let value = Observable::new("value", "x".to_string());
        let upper = Observable::new("upper", String::new());

        let (v, u) = (value.clone(), upper.clone());
        let _r = reaction(
            "upper",
            move || v.get(),
            move |s| {
                u.set(s.to_uppercase());
            },
            true,
        );
        assert_eq!(upper.peek(), "X");

        value.set("abc".into());
        assert_eq!(upper.peek(), "ABC");
    }

    #[test]
    fn autorun_over_computed() {
        let base = Observable::new("base", 1);
        let b = base.clone();
        let squared = Computed::new("squared", move || b.get() * b.get());
        let seen = log();

        let (sq, s) = (squared.clone(), seen.clone());
        let _d = autorun("squared", move || s.lock().unwrap().push(sq.get().to_string()));

        base.set(3);
        assert_eq!(*seen.lock().unwrap(), vec!["1", "9"]);
    }

    #[test]
    fn runaway_cycle_is_cut_off() {
        let value = Observable::new("value", 0u64);
        let v = value.clone();
        let _d = autorun("runaway", move || {
            let current = v.get();
            v.set(current + 1);
        });
        // Not subscribed yet during the first run, so it settles at 1.
        assert_eq!(value.peek(), 1);

        value.set(10);
        let after = value.peek();
        assert!(after > 10);
        assert!(after <= 10 + crate::MAX_REACTION_ITERATIONS as u64 + 1);
    }
}
