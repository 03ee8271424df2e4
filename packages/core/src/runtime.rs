//! The runtime: root creation and the root registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use mom_scope::Scope;
use tracing::{debug, info};

use crate::error::Result;
use crate::lock;
use crate::node::Node;
use crate::params::StoreParams;
use crate::store::{Store, StoreId};

/// Configuration for a [`Runtime`].
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Scope for roots created without one. Defaults to [`Scope::root`].
    pub default_scope: Option<Scope>,
}

/// Root nodes by id. The registry owns the roots' private halves; it never
/// holds public stores.
#[derive(Default)]
pub(crate) struct Roots {
    nodes: Mutex<BTreeMap<StoreId, Arc<Node>>>,
}

impl Roots {
    fn insert(&self, node: Arc<Node>) {
        lock(&self.nodes).insert(node.id.clone(), node);
    }

    pub(crate) fn remove(&self, id: &StoreId) -> Option<Arc<Node>> {
        lock(&self.nodes).remove(id)
    }

    /// Dispose and evict a root. Unknown ids are a no-op returning `false`.
    pub(crate) fn dispose(&self, id: &StoreId) -> Result<bool> {
        match self.remove(id) {
            Some(node) => node.terminate(),
            None => Ok(false),
        }
    }

    fn contains(&self, id: &StoreId) -> bool {
        lock(&self.nodes).contains_key(id)
    }

    fn len(&self) -> usize {
        lock(&self.nodes).len()
    }

    fn drain(&self) -> Vec<Arc<Node>> {
        std::mem::take(&mut *lock(&self.nodes)).into_values().collect()
    }
}

/// Creates root stores and keeps them alive until they are disposed.
pub struct Runtime {
    config: RuntimeConfig,
    roots: Arc<Roots>,
}

lazy_static::lazy_static! {
    static ref GLOBAL: Runtime = Runtime::new(RuntimeConfig::default());
}

impl Runtime {
    /// A runtime with its own, empty root registry.
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            roots: Arc::new(Roots::default()),
        }
    }

    /// The process-wide runtime behind [`create`] and [`dispose`].
    pub fn global() -> &'static Runtime {
        &GLOBAL
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn default_scope(&self) -> Scope {
        self.config.default_scope.clone().unwrap_or_else(Scope::root)
    }

    /// Build a root store.
    ///
    /// Uses the scope in `params`, or the runtime's default scope. The
    /// store is registered as a root only if construction succeeds.
    pub fn create(&self, params: impl Into<StoreParams>) -> Result<Store> {
        let params = params.into();
        let scope = params.scope.clone().unwrap_or_else(|| self.default_scope());
        let node = Node::new(
            params.factory.namespace(),
            Weak::new(),
            Some(Arc::downgrade(&self.roots)),
            scope,
        );
        let store = params.factory.instantiate(&node, &params.params)?;
        // A store that terminated itself during construction is never
        // registered.
        if node.state().is_disposing() {
            debug!(store = %store.id(), "root disposed during construction");
            return Ok(store);
        }
        self.roots.insert(node);
        debug!(store = %store.id(), roots = self.roots.len(), "root created");
        Ok(store)
    }

    /// Dispose a root created by this runtime.
    ///
    /// The registry entry is removed whatever the outcome. Returns
    /// `Ok(false)` for stores that are not live roots of this runtime.
    pub fn dispose(&self, store: &Store) -> Result<bool> {
        self.roots.dispose(store.id())
    }

    /// Whether `store` is a live root of this runtime.
    pub fn is_root(&self, store: &Store) -> bool {
        self.roots.contains(store.id())
    }

    /// Number of live roots.
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Dispose every remaining root. Returns the number of roots disposed.
    pub fn shutdown(&self) -> usize {
        let nodes = self.roots.drain();
        let count = nodes.len();
        for node in nodes {
            if let Err(err) = node.terminate() {
                tracing::warn!(store = %node.id, error = %err, "root dispose failed during shutdown");
            }
        }
        info!(count, "runtime shut down");
        count
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("roots", &self.roots.len())
            .finish()
    }
}

/// Build a root store on the global runtime.
pub fn create(params: impl Into<StoreParams>) -> Result<Store> {
    Runtime::global().create(params)
}

/// Dispose a root store, whichever runtime created it.
///
/// Returns `Ok(true)` the first time and `Ok(false)` afterwards, and for
/// stores that are not roots.
pub fn dispose(store: &Store) -> Result<bool> {
    store.dispose()
}
