//! Internal store nodes: the store tree, the reaction registry and the
//! INIT/DISPOSE sequences.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};

use mom_reactive::{batch, Disposer};
use mom_scope::{BoxError, Scope};
use tracing::{debug, trace, warn};

use crate::controller::{Controller, Hook, Hooks};
use crate::error::{Result, StoreError};
use crate::lifecycle::{HookOutcome, Lifecycle, LifecycleState, Phase};
use crate::model::Model;
use crate::runtime::Roots;
use crate::store::StoreId;
use crate::{lock, read};

/// One store's private half. Owned by its parent's child map, or by the root
/// registry for roots; never reachable from the public store.
pub(crate) struct Node {
    pub(crate) id: StoreId,
    pub(crate) namespace: String,
    parent: Weak<Node>,
    pub(crate) roots: Option<Weak<Roots>>,
    /// The scope the store was created in: the parent's, or the one passed
    /// at root creation. Stamped on the model and never forked.
    pub(crate) resolved_scope: Scope,
    /// Where children are built and services resolved; replaced by
    /// `create_child_context`.
    pub(crate) scope: RwLock<Scope>,
    pub(crate) lifecycle: Arc<Lifecycle>,
    pub(crate) model: OnceLock<Model>,
    pub(crate) controller: OnceLock<Controller>,
    pub(crate) hooks: Mutex<Hooks>,
    children: Mutex<BTreeMap<StoreId, Arc<Node>>>,
    reactions: Mutex<Vec<Disposer>>,
    reaction_seq: AtomicU64,
}

impl Node {
    pub(crate) fn new(
        namespace: &str,
        parent: Weak<Node>,
        roots: Option<Weak<Roots>>,
        scope: Scope,
    ) -> Arc<Self> {
        let id = StoreId::next(namespace);
        trace!(store = %id, scope = %scope.path(), "node created");
        Arc::new(Node {
            lifecycle: Lifecycle::new(id.as_str()),
            id,
            namespace: namespace.to_string(),
            parent,
            roots,
            resolved_scope: scope.clone(),
            scope: RwLock::new(scope),
            model: OnceLock::new(),
            controller: OnceLock::new(),
            hooks: Mutex::new(Hooks::default()),
            children: Mutex::new(BTreeMap::new()),
            reactions: Mutex::new(Vec::new()),
            reaction_seq: AtomicU64::new(1),
        })
    }

    pub(crate) fn scope(&self) -> Scope {
        read(&self.scope).clone()
    }

    pub(crate) fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub(crate) fn add_child(&self, child: Arc<Node>) {
        lock(&self.children).insert(child.id.clone(), child);
    }

    pub(crate) fn remove_child(&self, id: &StoreId) -> Option<Arc<Node>> {
        lock(&self.children).remove(id)
    }

    pub(crate) fn child_count(&self) -> usize {
        lock(&self.children).len()
    }

    pub(crate) fn add_reaction(&self, disposer: Disposer) {
        lock(&self.reactions).push(disposer);
    }

    /// Name for an unnamed reaction: `<store>:<kind>:<n>`.
    pub(crate) fn reaction_name(&self, kind: &str) -> String {
        let seq = self.reaction_seq.fetch_add(1, Ordering::Relaxed);
        format!("{}:{}:{}", self.id, kind, seq)
    }

    /// Run the INIT phase.
    pub(crate) fn initialize(self: &Arc<Self>) -> Result<()> {
        let hook = lock(&self.hooks).init.take();
        let returned = self.run_hook(hook);
        self.lifecycle.settle(Phase::Init, returned)
    }

    /// Run the DISPOSE sequence. Returns `Ok(false)` if disposal had already
    /// started.
    ///
    /// Children are disposed depth-first before this store's own hook runs.
    /// A child's failure is logged and left to its own completion signal.
    pub(crate) fn terminate(self: &Arc<Self>) -> Result<bool> {
        if !self.lifecycle.advance(LifecycleState::Disposing) {
            trace!(store = %self.id, "already disposing");
            return Ok(false);
        }
        self.teardown();
        let hook = lock(&self.hooks).dispose.take();
        let returned = self.run_hook(hook);
        self.lifecycle.settle(Phase::Dispose, returned)?;
        debug!(store = %self.id, "disposed");
        Ok(true)
    }

    /// Dispose a store whose construction failed. Its own dispose hook does
    /// not run.
    pub(crate) fn abort(self: &Arc<Self>, reason: &StoreError) {
        if self.state().is_disposing() {
            return;
        }
        self.teardown();
        self.lifecycle.abort(reason);
    }

    /// Drop this node from whoever owns it.
    pub(crate) fn detach(&self) {
        if let Some(parent) = self.parent.upgrade() {
            parent.remove_child(&self.id);
        } else if let Some(roots) = self.roots.as_ref().and_then(Weak::upgrade) {
            roots.remove(&self.id);
        }
    }

    fn teardown(&self) {
        let reactions = std::mem::take(&mut *lock(&self.reactions));
        for disposer in &reactions {
            disposer.dispose();
        }

        let children: Vec<Arc<Node>> = lock(&self.children).values().cloned().collect();
        for child in children {
            if let Err(err) = child.terminate() {
                warn!(store = %self.id, child = %child.id, error = %err, "child dispose failed");
            }
        }
        lock(&self.children).clear();
    }

    fn run_hook(&self, hook: Option<Hook>) -> std::result::Result<HookOutcome, BoxError> {
        match (hook, self.controller.get()) {
            (Some(hook), Some(controller)) => batch(|| hook(controller)),
            _ => Ok(HookOutcome::Ready),
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        trace!(store = %self.id, state = %self.lifecycle.state(), "node released");
    }
}
