//! Per-thread dependency tracking, batching and the reaction flush loop.

use std::cell::RefCell;
use std::sync::Arc;

use crate::atom::Atom;
use crate::reaction::ReactionCore;

/// Maximum number of flush rounds before a reaction cycle is considered runaway.
pub const MAX_REACTION_ITERATIONS: usize = 100;

#[derive(Default)]
struct ThreadState {
    /// Stack of tracking frames; reads are recorded in the innermost one.
    frames: Vec<Vec<Atom>>,
    batch_depth: usize,
    flushing: bool,
    pending: Vec<Arc<ReactionCore>>,
}

thread_local! {
    static STATE: RefCell<ThreadState> = RefCell::new(ThreadState::default());
}

/// Record that `atom` was read by the current derivation, if any.
pub(crate) fn report_observed(atom: &Atom) {
    STATE.with(|state| {
        let mut state = state.borrow_mut();
        if let Some(frame) = state.frames.last_mut() {
            if !frame.iter().any(|a| a.id() == atom.id()) {
                frame.push(atom.clone());
            }
        }
    });
}

struct FrameGuard;

impl FrameGuard {
    fn push() -> Self {
        STATE.with(|state| state.borrow_mut().frames.push(Vec::new()));
        FrameGuard
    }

    fn pop(self) -> Vec<Atom> {
        let observed = STATE.with(|state| state.borrow_mut().frames.pop().unwrap_or_default());
        std::mem::forget(self);
        observed
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        // Only reached when the tracked closure panicked.
        STATE.with(|state| {
            state.borrow_mut().frames.pop();
        });
    }
}

/// Run `f`, returning its result and every atom it read.
pub(crate) fn track<R>(f: impl FnOnce() -> R) -> (R, Vec<Atom>) {
    let guard = FrameGuard::push();
    let result = f();
    (result, guard.pop())
}

/// Run `f` without recording any of its reads in the enclosing derivation.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    track(f).0
}

struct BatchGuard;

impl BatchGuard {
    fn enter() -> Self {
        STATE.with(|state| state.borrow_mut().batch_depth += 1);
        BatchGuard
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        STATE.with(|state| {
            let mut state = state.borrow_mut();
            state.batch_depth = state.batch_depth.saturating_sub(1);
        });
    }
}

/// Run `f` as one transaction.
///
/// Reactions invalidated by writes inside `f` run once, after the outermost
/// batch returns, and observe only the final values.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let guard = BatchGuard::enter();
    let result = f();
    drop(guard);
    if !in_batch() {
        flush();
    }
    result
}

/// Whether the current thread is inside a [`batch`].
pub fn in_batch() -> bool {
    STATE.with(|state| state.borrow().batch_depth > 0)
}

/// Queue a reaction and flush right away when no batch or flush is active.
pub(crate) fn schedule(reaction: Arc<ReactionCore>) {
    let flush_now = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if !state.pending.iter().any(|r| r.id() == reaction.id()) {
            state.pending.push(reaction);
        }
        state.batch_depth == 0 && !state.flushing
    });
    if flush_now {
        flush();
    }
}

struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        STATE.with(|state| state.borrow_mut().flushing = false);
    }
}

fn flush() {
    let started = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if state.flushing {
            false
        } else {
            state.flushing = true;
            true
        }
    });
    if !started {
        return;
    }
    let _guard = FlushGuard;

    let mut rounds = 0;
    loop {
        let pending = STATE.with(|state| std::mem::take(&mut state.borrow_mut().pending));
        if pending.is_empty() {
            break;
        }
        rounds += 1;
        if rounds > MAX_REACTION_ITERATIONS {
            tracing::error!(
                reactions = ?pending.iter().map(|r| r.name().to_string()).collect::<Vec<_>>(),
                "reaction did not converge after {} iterations; dropping pending runs",
                MAX_REACTION_ITERATIONS
            );
            break;
        }
        for reaction in pending {
            reaction.run();
        }
    }
}
