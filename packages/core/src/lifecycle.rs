//! Lifecycle state machine and one-shot completion signals.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::sync::{Arc, Mutex};

use mom_reactive::{batch, Observable};
use mom_scope::{BoxError, BoxFuture};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::error::{HookCause, Result, StoreError};
use crate::lock;

/// Lifecycle state of a store.
///
/// States only ever move forward:
/// `Initializing -> Ready -> Disposing -> Disposed`. A store disposed while
/// its asynchronous init is still pending goes straight from `Initializing`
/// to `Disposing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Initializing,
    Ready,
    Disposing,
    Disposed,
}

impl LifecycleState {
    /// States are ordered; only later states are reachable.
    pub fn can_advance_to(self, next: LifecycleState) -> bool {
        next > self
    }

    /// Disposal has started or finished.
    pub fn is_disposing(self) -> bool {
        self >= LifecycleState::Disposing
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Initializing => "INITIALIZING",
            LifecycleState::Ready => "READY",
            LifecycleState::Disposing => "DISPOSING",
            LifecycleState::Disposed => "DISPOSED",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two phases that run controller hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    Dispose,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Init => f.write_str("INIT"),
            Phase::Dispose => f.write_str("DISPOSE"),
        }
    }
}

/// What a lifecycle hook returned.
pub enum HookOutcome {
    /// The hook finished synchronously.
    Ready,
    /// The hook continues asynchronously; the phase completes when the
    /// future settles.
    Pending(BoxFuture<'static, std::result::Result<(), BoxError>>),
}

impl HookOutcome {
    /// Box `future` as an asynchronous completion.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        HookOutcome::Pending(Box::pin(future))
    }
}

impl fmt::Debug for HookOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookOutcome::Ready => f.write_str("Ready"),
            HookOutcome::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// How a phase settled.
pub type Outcome = std::result::Result<(), Arc<StoreError>>;

/// A one-shot signal: settles exactly once, observable from any number of
/// clones.
///
/// `Completion` implements [`IntoFuture`], so `store.init_complete().await`
/// works directly.
#[derive(Clone)]
pub struct Completion {
    store: Arc<str>,
    rx: watch::Receiver<Option<Outcome>>,
}

/// The resolving side of a [`Completion`]. Never leaves the runtime.
pub(crate) struct Resolver {
    tx: watch::Sender<Option<Outcome>>,
}

pub(crate) fn signal(store: &str) -> (Resolver, Completion) {
    let (tx, rx) = watch::channel(None);
    (
        Resolver { tx },
        Completion {
            store: Arc::from(store),
            rx,
        },
    )
}

impl Resolver {
    /// Settle the signal. Returns `false` if it had already settled.
    pub(crate) fn resolve(&self, outcome: Outcome) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }
}

impl Completion {
    /// Wait for the signal to settle.
    ///
    /// If the store is dropped before the signal settles the wait fails with
    /// [`StoreError::Detached`].
    pub async fn wait(&self) -> Outcome {
        let mut rx = self.rx.clone();
        let settled = rx.wait_for(Option::is_some).await.map(|slot| slot.clone());
        match settled {
            Ok(Some(outcome)) => outcome,
            Ok(None) | Err(_) => Err(Arc::new(StoreError::Detached {
                store: self.store.to_string(),
            })),
        }
    }

    /// Whether the phase has finished, successfully or not.
    pub fn is_settled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// The outcome, if the signal has settled.
    pub fn outcome(&self) -> Option<Outcome> {
        self.rx.borrow().clone()
    }
}

impl IntoFuture for Completion {
    type Output = Outcome;
    type IntoFuture = BoxFuture<'static, Outcome>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("store", &self.store)
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Per-store lifecycle: the observable state, the `ready` flag and both
/// completion signals.
pub(crate) struct Lifecycle {
    store: String,
    state: Observable<LifecycleState>,
    ready: Observable<bool>,
    /// Serializes `state` and `ready` updates across threads.
    transition: Mutex<()>,
    init: Resolver,
    dispose: Resolver,
    init_complete: Completion,
    dispose_complete: Completion,
}

impl Lifecycle {
    pub(crate) fn new(store: &str) -> Arc<Self> {
        let (init, init_complete) = signal(store);
        let (dispose, dispose_complete) = signal(store);
        Arc::new(Lifecycle {
            store: store.to_string(),
            state: Observable::new(format!("{}.state", store), LifecycleState::Initializing),
            ready: Observable::new(format!("{}.ready", store), false),
            transition: Mutex::new(()),
            init,
            dispose,
            init_complete,
            dispose_complete,
        })
    }

    pub(crate) fn state(&self) -> LifecycleState {
        self.state.peek()
    }

    pub(crate) fn state_cell(&self) -> &Observable<LifecycleState> {
        &self.state
    }

    pub(crate) fn ready_cell(&self) -> &Observable<bool> {
        &self.ready
    }

    pub(crate) fn init_complete(&self) -> &Completion {
        &self.init_complete
    }

    pub(crate) fn dispose_complete(&self) -> &Completion {
        &self.dispose_complete
    }

    /// Move to `next` if that is a forward transition. The check and the
    /// write happen under `transition`, so a late INIT continuation
    /// on another thread cannot undo a disposal. Observers run once the
    /// batch closes, after `transition` is released.
    pub(crate) fn advance(&self, next: LifecycleState) -> bool {
        let previous = batch(|| {
            let _transition = lock(&self.transition);
            let previous = self
                .state
                .replace_if(|current| current.can_advance_to(next).then_some(next))?;
            self.ready.set(next == LifecycleState::Ready);
            Some(previous)
        });
        match previous {
            Some(current) => {
                debug!(store = %self.store, from = %current, to = %next, "lifecycle transition");
                true
            }
            None => {
                trace!(store = %self.store, to = %next, "ignoring backward transition");
                false
            }
        }
    }

    /// Finish `phase`: advance the state and settle its signal.
    pub(crate) fn complete(&self, phase: Phase, outcome: Outcome) {
        match phase {
            Phase::Init => {
                if self.state() == LifecycleState::Initializing {
                    self.advance(LifecycleState::Ready);
                }
                self.init.resolve(outcome);
            }
            Phase::Dispose => {
                self.advance(LifecycleState::Disposed);
                self.dispose.resolve(outcome);
            }
        }
    }

    fn failure(&self, phase: Phase, cause: HookCause) -> StoreError {
        StoreError::lifecycle(&self.store, phase, cause)
    }

    /// Apply the settlement rule to what a hook returned.
    ///
    /// A synchronous result completes the phase before returning. A pending
    /// future is spawned on the current tokio runtime and completes the phase
    /// when it settles; its failure is only visible through the phase's
    /// completion signal. A failed hook still completes its phase, with an
    /// error outcome.
    pub(crate) fn settle(
        self: &Arc<Self>,
        phase: Phase,
        returned: std::result::Result<HookOutcome, BoxError>,
    ) -> Result<()> {
        match returned {
            Ok(HookOutcome::Ready) => {
                self.complete(phase, Ok(()));
                Ok(())
            }
            Ok(HookOutcome::Pending(future)) => {
                let handle = match tokio::runtime::Handle::try_current() {
                    Ok(handle) => handle,
                    Err(_) => {
                        let err = || StoreError::NoAsyncRuntime {
                            store: self.store.clone(),
                            phase,
                        };
                        self.complete(phase, Err(Arc::new(err())));
                        return Err(err());
                    }
                };
                trace!(store = %self.store, %phase, "hook pending");
                let lifecycle = self.clone();
                handle.spawn(async move {
                    let outcome = future.await.map_err(|e| {
                        warn!(store = %lifecycle.store, %phase, error = %e, "async hook failed");
                        Arc::new(lifecycle.failure(phase, Arc::from(e)))
                    });
                    lifecycle.complete(phase, outcome);
                });
                Ok(())
            }
            Err(e) => {
                let cause: HookCause = Arc::from(e);
                warn!(store = %self.store, %phase, error = %cause, "hook failed");
                self.complete(phase, Err(Arc::new(self.failure(phase, cause.clone()))));
                Err(self.failure(phase, cause))
            }
        }
    }

    /// Tear down a store whose construction failed: no hook runs, both
    /// signals settle.
    pub(crate) fn abort(&self, reason: &StoreError) {
        self.init.resolve(Err(Arc::new(StoreError::Detached {
            store: self.store.clone(),
        })));
        self.advance(LifecycleState::Disposing);
        self.advance(LifecycleState::Disposed);
        self.dispose.resolve(Ok(()));
        debug!(store = %self.store, error = %reason, "construction aborted");
    }
}
