//! The internal context handed to factory bodies.

use std::fmt;
use std::sync::{Arc, Weak};

use mom_reactive::{batch, Disposer};
use mom_scope::Scope;
use tracing::{debug, trace, warn};

use crate::controller::{Controller, ControllerDef};
use crate::error::{Result, StoreError};
use crate::lifecycle::LifecycleState;
use crate::model::{Metadata, Model, ModelDef};
use crate::node::Node;
use crate::params::StoreParams;
use crate::store::{Store, StoreId};
use crate::value::Value;
use crate::{lock, write};

/// Options for [`StoreContext::autorun`] and [`StoreContext::reaction`].
#[derive(Debug, Clone, Default)]
pub struct ReactionOptions {
    /// Diagnostic name; defaults to `<store id>:<autorun|reaction>:<n>`.
    pub name: Option<String>,
    /// Run the reaction effect with the initial selection. Defaults to
    /// `true`. Ignored by autoruns, which always run immediately.
    pub fire_immediately: Option<bool>,
}

impl ReactionOptions {
    /// Options with an explicit diagnostic name instead of the generated
    /// `<store id>:<kind>:<n>`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            fire_immediately: None,
        }
    }

    /// Whether a reaction runs its effect at registration. Defaults to
    /// `true`; autoruns always run immediately.
    pub fn fire_immediately(mut self, fire: bool) -> Self {
        self.fire_immediately = Some(fire);
        self
    }
}

/// The private builder passed to a factory body.
///
/// A context is a cheap, non-owning handle: clones may be captured by
/// actions and hooks to mount or unmount children later. Once the store has
/// been disposed and released, operations fail with
/// [`StoreError::Detached`].
#[derive(Clone)]
pub struct StoreContext {
    id: StoreId,
    node: Weak<Node>,
}

impl StoreContext {
    pub(crate) fn new(node: &Arc<Node>) -> Self {
        Self {
            id: node.id.clone(),
            node: Arc::downgrade(node),
        }
    }

    /// The id the store will have. Allocated before `make_model`.
    pub fn id(&self) -> &StoreId {
        &self.id
    }

    /// The namespace of the factory that built this store.
    pub fn namespace(&self) -> Result<String> {
        Ok(self.node()?.namespace.clone())
    }

    /// Current lifecycle state, read without tracking.
    pub fn state(&self) -> Result<LifecycleState> {
        Ok(self.node()?.state())
    }

    /// Build the store's model. Must be called exactly once per factory
    /// invocation.
    pub fn make_model(&self, def: ModelDef) -> Result<Model> {
        let node = self.node()?;
        if node.model.get().is_some() {
            return Err(StoreError::ModelAlreadyCreated {
                namespace: node.namespace.clone(),
            });
        }
        if def.is_empty() {
            return Err(StoreError::EmptyModel {
                namespace: node.namespace.clone(),
            });
        }
        def.validate(&node.namespace)?;

        let lifecycle = &node.lifecycle;
        let meta = Metadata {
            id: node.id.clone(),
            namespace: node.namespace.clone(),
            scope: node.resolved_scope.clone(),
            state: lifecycle.state_cell().clone(),
            ready: lifecycle.ready_cell().clone(),
            init_complete: lifecycle.init_complete().clone(),
            dispose_complete: lifecycle.dispose_complete().clone(),
            roots: node.roots.clone(),
        };
        let model = Model::build(meta, def);
        node.model
            .set(model.clone())
            .map_err(|_| StoreError::ModelAlreadyCreated {
                namespace: node.namespace.clone(),
            })?;
        trace!(store = %node.id, "model created");
        Ok(model)
    }

    /// Build the store's controller and capture its hooks. At most once per
    /// factory invocation.
    pub fn make_controller(&self, def: ControllerDef) -> Result<Controller> {
        let node = self.node()?;
        let already = || StoreError::ControllerAlreadyCreated {
            namespace: node.namespace.clone(),
        };
        if node.controller.get().is_some() {
            return Err(already());
        }
        def.validate(&node.namespace)?;

        let (controller, hooks) = Controller::build(node.id.as_str(), def);
        node.controller.set(controller.clone()).map_err(|_| already())?;
        *lock(&node.hooks) = hooks;
        trace!(store = %node.id, "controller created");
        Ok(controller)
    }

    /// The model, once `make_model` has run.
    pub fn model(&self) -> Result<Model> {
        let node = self.node()?;
        let model = node.model.get().cloned();
        model.ok_or_else(|| self.model_required("model"))
    }

    /// The live controller, if `make_controller` has run.
    pub fn controller(&self) -> Option<Controller> {
        self.node().ok()?.controller.get().cloned()
    }

    /// The public view of this store.
    pub fn store(&self) -> Result<Store> {
        Ok(self.model()?.store())
    }

    /// The scope children are built in and services are resolved from.
    pub fn scope(&self) -> Result<Scope> {
        Ok(self.node()?.scope())
    }

    /// Build a child store in this store's scope and attach it to the tree.
    ///
    /// A scope set on `params` is ignored: children inherit.
    pub fn mount(&self, params: impl Into<StoreParams>) -> Result<Store> {
        let params = params.into();
        let node = self.node()?;
        if node.state().is_disposing() {
            return Err(StoreError::Disposed {
                store: node.id.to_string(),
            });
        }
        if params.scope.is_some() {
            warn!(store = %node.id, "scope passed to mount() is ignored; children use the parent's scope");
        }

        let child = Node::new(
            params.factory.namespace(),
            Arc::downgrade(&node),
            None,
            node.scope(),
        );
        let store = params.factory.instantiate(&child, &params.params)?;
        node.add_child(child);
        debug!(store = %node.id, child = %store.id(), "mounted");
        Ok(store)
    }

    /// Dispose a child store and detach it from the tree.
    ///
    /// Always returns `Value::Null`, so a field can be cleared in one step:
    /// `model.set("child", ctx.unmount(&model.get("child")?))`. Values that
    /// are not children of this store are ignored.
    pub fn unmount(&self, target: &Value) -> Value {
        if let Value::Store(store) = target {
            self.unmount_store(store);
        }
        Value::Null
    }

    /// Like [`unmount`](Self::unmount) for a store handle. Returns whether it
    /// was a child of this store.
    pub fn unmount_store(&self, store: &Store) -> bool {
        let Ok(node) = self.node() else {
            return false;
        };
        let Some(child) = node.remove_child(store.id()) else {
            trace!(store = %node.id, child = %store.id(), "unmount of unknown child ignored");
            return false;
        };
        if let Err(err) = child.terminate() {
            warn!(store = %node.id, child = %child.id, error = %err, "child dispose failed");
        }
        debug!(store = %node.id, child = %child.id, "unmounted");
        true
    }

    /// Number of mounted children.
    pub fn child_count(&self) -> usize {
        self.node().map(|n| n.child_count()).unwrap_or(0)
    }

    /// Replace this store's scope with a child scope named after the store
    /// id. Later mounts and lookups use the new scope; registrations made in
    /// it stay invisible to the parent scope.
    pub fn create_child_context(&self) -> Result<Scope> {
        let node = self.node()?;
        let mut scope = write(&node.scope);
        let child = scope.create_child_scope(node.id.as_str());
        *scope = child.clone();
        debug!(store = %node.id, scope = %child.path(), "scope forked");
        Ok(child)
    }

    /// Run `effect` now and whenever what it reads changes, until the store
    /// is disposed. Writes in one run are batched.
    pub fn autorun<F>(&self, mut effect: F, options: ReactionOptions) -> Result<Disposer>
    where
        F: FnMut() + Send + 'static,
    {
        let node = self.subscribable("autorun")?;
        let name = options
            .name
            .unwrap_or_else(|| node.reaction_name("autorun"));
        let disposer = mom_reactive::autorun(name, move || batch(&mut effect));
        node.add_reaction(disposer.clone());
        Ok(disposer)
    }

    /// Run `effect` whenever the value picked by `selector` changes, until the
    /// store is disposed. Unless `fire_immediately` is `false`, `effect` also
    /// runs right away with the initial selection.
    pub fn reaction<T, S, E>(
        &self,
        selector: S,
        mut effect: E,
        options: ReactionOptions,
    ) -> Result<Disposer>
    where
        T: PartialEq + Send + 'static,
        S: FnMut() -> T + Send + 'static,
        E: FnMut(&T) + Send + 'static,
    {
        let node = self.subscribable("reaction")?;
        let name = options
            .name
            .unwrap_or_else(|| node.reaction_name("reaction"));
        let fire_immediately = options.fire_immediately.unwrap_or(true);
        let disposer = mom_reactive::reaction(
            name,
            selector,
            move |value: &T| batch(|| effect(value)),
            fire_immediately,
        );
        node.add_reaction(disposer.clone());
        Ok(disposer)
    }

    /// Dispose this store from inside, e.g. from an action, and detach it
    /// from its parent or the root registry.
    pub fn terminate(&self) -> Result<bool> {
        let node = self.node()?;
        let result = node.terminate();
        node.detach();
        result
    }

    fn node(&self) -> Result<Arc<Node>> {
        self.node.upgrade().ok_or_else(|| StoreError::Detached {
            store: self.id.to_string(),
        })
    }

    fn subscribable(&self, operation: &'static str) -> Result<Arc<Node>> {
        let node = self.node()?;
        if node.model.get().is_none() {
            return Err(self.model_required(operation));
        }
        if node.state().is_disposing() {
            return Err(StoreError::Disposed {
                store: node.id.to_string(),
            });
        }
        Ok(node)
    }

    fn model_required(&self, operation: &'static str) -> StoreError {
        StoreError::ModelRequired {
            store: self.id.to_string(),
            operation,
        }
    }
}

impl fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("id", &self.id)
            .field("attached", &(self.node.strong_count() > 0))
            .finish()
    }
}
