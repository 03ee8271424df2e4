//! Controllers: private state and lifecycle hooks.

use std::fmt;
use std::sync::{Arc, Weak};

use mom_scope::BoxError;

use crate::error::Result;
use crate::lifecycle::HookOutcome;
use crate::object::{Access, Member, Members, ObjectCore};
use crate::value::Value;

/// A lifecycle hook, called once with the live controller.
pub(crate) type Hook =
    Box<dyn FnOnce(&Controller) -> std::result::Result<HookOutcome, BoxError> + Send>;

/// Hooks captured from a controller definition.
#[derive(Default)]
pub(crate) struct Hooks {
    pub(crate) init: Option<Hook>,
    pub(crate) dispose: Option<Hook>,
}

/// Declares a controller: state only the factory can see, plus optional
/// `init` and `dispose` hooks.
///
/// Hooks return [`HookOutcome::Ready`] when they finish synchronously or
/// [`HookOutcome::Pending`] with a future to await.
#[derive(Default)]
pub struct ControllerDef {
    members: Members<Controller>,
    hooks: Hooks,
}

impl ControllerDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// A private observable field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.members.push(
            name.into(),
            Member::Field {
                value: value.into(),
                writable: true,
            },
        );
        self
    }

    /// A memoized value derived from other members.
    pub fn computed<F>(mut self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&Controller) -> Value + Send + Sync + 'static,
    {
        self.members
            .push(name.into(), Member::Computed(Arc::new(getter)));
        self
    }

    /// A method run inside `batch`.
    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&Controller, &[Value]) -> std::result::Result<Value, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.members.push(name.into(), Member::Action(Arc::new(action)));
        self
    }

    /// Runs right after the factory body; the store is ready once it
    /// completes.
    pub fn on_init<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&Controller) -> std::result::Result<HookOutcome, BoxError> + Send + 'static,
    {
        self.hooks.init = Some(Box::new(hook));
        self
    }

    /// Runs during disposal, after every child has been disposed.
    pub fn on_dispose<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&Controller) -> std::result::Result<HookOutcome, BoxError> + Send + 'static,
    {
        self.hooks.dispose = Some(Box::new(hook));
        self
    }

    pub(crate) fn validate(&self, namespace: &str) -> Result<()> {
        self.members.validate(namespace, |_, _| None)
    }
}

struct ControllerCore {
    object: ObjectCore<Controller>,
}

/// The live controller. Clones refer to the same controller.
#[derive(Clone)]
pub struct Controller {
    core: Arc<ControllerCore>,
}

impl Controller {
    pub(crate) fn build(store: &str, def: ControllerDef) -> (Self, Hooks) {
        let members = def.members;
        let core = Arc::new_cyclic(|me: &Weak<ControllerCore>| {
            let me = me.clone();
            ControllerCore {
                object: ObjectCore::build(
                    store,
                    members,
                    Arc::new(move || me.upgrade().map(|core| Controller { core })),
                ),
            }
        });
        (Controller { core }, def.hooks)
    }

    /// Tracked read of a field or computed value.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.core.object.get(name)
    }

    /// Write a field. Returns whether the value changed.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<bool> {
        self.core.object.set(name, value.into(), Access::Internal)
    }

    /// Mutate a field in place and notify its observers.
    pub fn update<R>(&self, name: &str, f: impl FnOnce(&mut Value) -> R) -> Result<R> {
        self.core.object.update(name, f, Access::Internal)
    }

    /// Call an action.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.core.object.call(self, name, args)
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller").finish_non_exhaustive()
    }
}
