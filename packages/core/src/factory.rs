//! Store factories.

use std::fmt;
use std::sync::Arc;

use mom_scope::{InterfaceId, Scope};
use tracing::{debug, trace};

use crate::context::StoreContext;
use crate::error::{Result, StoreError};
use crate::node::Node;
use crate::params::{Params, StoreParams};
use crate::store::Store;

type Body = Box<dyn Fn(&StoreContext, &Params) -> Result<()> + Send + Sync>;

struct FactoryInner {
    namespace: String,
    interface: Option<InterfaceId<StoreFactory>>,
    body: Body,
}

/// A factory body wrapped into something the runtime can instantiate.
///
/// The body receives the [`StoreContext`] and the leaf [`Params`]. It must
/// call [`StoreContext::make_model`] exactly once and may call
/// [`StoreContext::make_controller`] once. Clones share the body.
#[derive(Clone)]
pub struct StoreFactory {
    inner: Arc<FactoryInner>,
}

/// Wrap an anonymous factory body. Stores it builds have an empty namespace.
pub fn store_factory<F>(body: F) -> StoreFactory
where
    F: Fn(&StoreContext, &Params) -> Result<()> + Send + Sync + 'static,
{
    StoreFactory {
        inner: Arc::new(FactoryInner {
            namespace: String::new(),
            interface: None,
            body: Box::new(body),
        }),
    }
}

/// Wrap a factory body under an interface id and register it in the root
/// scope, so other stores can resolve it.
pub fn named_store_factory<F>(id: InterfaceId<StoreFactory>, body: F) -> StoreFactory
where
    F: Fn(&StoreContext, &Params) -> Result<()> + Send + Sync + 'static,
{
    let factory = StoreFactory {
        inner: Arc::new(FactoryInner {
            namespace: id.ns().to_string(),
            interface: Some(id),
            body: Box::new(body),
        }),
    };
    factory.register(&Scope::root(), id);
    factory
}

impl StoreFactory {
    /// Start a factory whose namespace and body are set separately.
    pub fn builder() -> StoreFactoryBuilder {
        StoreFactoryBuilder::default()
    }

    /// The namespace stores built by this factory carry; empty if anonymous.
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// The interface id this factory was registered under, if any.
    pub fn interface(&self) -> Option<InterfaceId<StoreFactory>> {
        self.inner.interface
    }

    /// Start building parameters for this factory.
    pub fn params(&self) -> StoreParams {
        StoreParams::new(self)
    }

    /// Whether both handles are the same factory.
    pub fn ptr_eq(&self, other: &StoreFactory) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn register(&self, scope: &Scope, id: InterfaceId<StoreFactory>) {
        let factory = self.clone();
        scope.register_factory(&id, move |_| Arc::new(factory.clone()));
        debug!(interface = %id, scope = %scope.path(), "store factory registered");
    }

    /// Run the body against a fresh node, then the INIT phase.
    ///
    /// On any failure the half-built node is torn down and the error is
    /// returned; no store escapes.
    pub(crate) fn instantiate(&self, node: &Arc<Node>, params: &Params) -> Result<Store> {
        let ctx = StoreContext::new(node);
        trace!(store = %node.id, "running factory body");
        let built = (self.inner.body)(&ctx, params).and_then(|()| {
            node.model
                .get()
                .cloned()
                .ok_or_else(|| StoreError::ModelNotCreated {
                    namespace: self.inner.namespace.clone(),
                })
        });
        let model = match built {
            Ok(model) => model,
            Err(err) => {
                node.abort(&err);
                return Err(err);
            }
        };
        if let Err(err) = node.initialize() {
            node.abort(&err);
            return Err(err);
        }
        debug!(store = %node.id, state = %node.state(), "store created");
        Ok(model.store())
    }
}

impl fmt::Debug for StoreFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreFactory")
            .field("namespace", &self.inner.namespace)
            .finish()
    }
}

/// Builder for [`StoreFactory`].
///
/// ```rust
/// use mom_core::{InterfaceId, ModelDef, StoreFactory};
///
/// const GREETER: InterfaceId<StoreFactory> = InterfaceId::new("demo.Greeter");
///
/// let factory = StoreFactory::builder()
///     .interface(GREETER)
///     .body(|ctx, _params| {
///         ctx.make_model(ModelDef::new().field("greeting", "hello"))?;
///         Ok(())
///     })
///     .build()
///     .unwrap();
/// assert_eq!(factory.namespace(), "demo.Greeter");
/// ```
#[derive(Default)]
pub struct StoreFactoryBuilder {
    interface: Option<InterfaceId<StoreFactory>>,
    scope: Option<Scope>,
    body: Option<Body>,
}

impl StoreFactoryBuilder {
    /// Name the factory and publish it under `id`.
    pub fn interface(mut self, id: InterfaceId<StoreFactory>) -> Self {
        self.interface = Some(id);
        self
    }

    /// Register in `scope` instead of the root scope.
    pub fn register_in(mut self, scope: &Scope) -> Self {
        self.scope = Some(scope.clone());
        self
    }

    /// The factory body. Required.
    pub fn body<F>(mut self, body: F) -> Self
    where
        F: Fn(&StoreContext, &Params) -> Result<()> + Send + Sync + 'static,
    {
        self.body = Some(Box::new(body));
        self
    }

    /// Fails with `MissingFactory` when no body was given.
    pub fn build(self) -> Result<StoreFactory> {
        let namespace = self.interface.map(|id| id.ns().to_string()).unwrap_or_default();
        let body = self
            .body
            .ok_or_else(|| StoreError::MissingFactory {
                namespace: namespace.clone(),
            })?;
        let factory = StoreFactory {
            inner: Arc::new(FactoryInner {
                namespace,
                interface: self.interface,
                body,
            }),
        };
        if let Some(id) = self.interface {
            factory.register(&self.scope.unwrap_or_else(Scope::root), id);
        }
        Ok(factory)
    }
}
