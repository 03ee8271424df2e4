//! Hierarchical registries.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use tracing::{debug, trace};

use crate::{BoxError, BoxFuture, InterfaceId, ScopeError};

/// A registered value: always an `Arc<T>` behind the `Any`.
type Instance = Arc<dyn Any + Send + Sync>;
type SyncFactory = Arc<dyn Fn(&Scope) -> Instance + Send + Sync>;
type AsyncFactory = Arc<dyn Fn(Scope) -> BoxFuture<'static, Result<Instance, BoxError>> + Send + Sync>;

#[derive(Clone)]
enum Entry {
    Object(Instance),
    /// Called on every lookup.
    Factory(SyncFactory),
    /// Called on first lookup, then cached.
    Service {
        factory: SyncFactory,
        instance: Arc<Mutex<Option<Instance>>>,
    },
    Async(AsyncFactory),
}

struct ScopeInner {
    name: String,
    path: String,
    parent: Option<Scope>,
    entries: RwLock<HashMap<&'static str, Entry>>,
}

/// A node in the dependency-injection tree.
///
/// Clones refer to the same scope.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

lazy_static::lazy_static! {
    static ref ROOT: Scope = Scope::new_root("root");
}

impl Scope {
    /// Create a detached root scope. Its path is `/<name>`.
    pub fn new_root(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            inner: Arc::new(ScopeInner {
                path: format!("/{}", name),
                name,
                parent: None,
                entries: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// The process-wide default scope (`/root`).
    pub fn root() -> Self {
        ROOT.clone()
    }

    /// The last segment of [`path`](Self::path).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Slash-separated names from the root, e.g. `/root/counter#7`.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// The enclosing scope, `None` for a root.
    pub fn parent(&self) -> Option<&Scope> {
        self.inner.parent.as_ref()
    }

    /// Create a scope whose registrations are invisible to `self` but which
    /// falls back to `self` for lookups.
    pub fn create_child_scope(&self, name: impl Into<String>) -> Scope {
        let name = name.into();
        let child = Scope {
            inner: Arc::new(ScopeInner {
                path: format!("{}/{}", self.inner.path, name),
                name,
                parent: Some(self.clone()),
                entries: RwLock::new(HashMap::new()),
            }),
        };
        trace!(scope = %child.path(), "child scope created");
        child
    }

    /// Whether both handles refer to the same scope.
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register a ready-made instance. Replaces any earlier registration of
    /// `id` in this scope.
    pub fn register_object<T>(&self, id: &InterfaceId<T>, value: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.insert(id.ns(), Entry::Object(Arc::new(value)));
    }

    /// Register a factory called on every lookup.
    pub fn register_factory<T, F>(&self, id: &InterfaceId<T>, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Scope) -> Arc<T> + Send + Sync + 'static,
    {
        let factory: SyncFactory = Arc::new(move |scope| Arc::new(factory(scope)) as Instance);
        self.insert(id.ns(), Entry::Factory(factory));
    }

    /// Register a factory called once, on first lookup.
    pub fn register_service<T, F>(&self, id: &InterfaceId<T>, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Scope) -> Arc<T> + Send + Sync + 'static,
    {
        let factory: SyncFactory = Arc::new(move |scope| Arc::new(factory(scope)) as Instance);
        self.insert(
            id.ns(),
            Entry::Service {
                factory,
                instance: Arc::new(Mutex::new(None)),
            },
        );
    }

    /// Register a factory that can only be reached through [`resolve`](Scope::resolve).
    pub fn register_async_factory<T, F, Fut>(&self, id: &InterfaceId<T>, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<T>, BoxError>> + Send + 'static,
    {
        let factory: AsyncFactory = Arc::new(move |scope| {
            let fut = factory(scope);
            Box::pin(async move { fut.await.map(|value| Arc::new(value) as Instance) })
        });
        self.insert(id.ns(), Entry::Async(factory));
    }

    /// Look up an interface synchronously.
    pub fn get<T>(&self, id: &InterfaceId<T>) -> Result<Arc<T>, ScopeError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let (owner, entry) = self.lookup(id.ns())?;
        let instance = match entry {
            Entry::Object(instance) => instance,
            Entry::Factory(factory) => factory(&owner),
            Entry::Service { factory, instance } => service_instance(&owner, &factory, &instance),
            Entry::Async(_) => {
                return Err(ScopeError::AsyncOnly {
                    id: id.ns().to_string(),
                })
            }
        };
        downcast(id, instance)
    }

    /// Like [`get`](Scope::get), but `None` when the lookup fails.
    pub fn fetch<T>(&self, id: &InterfaceId<T>) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get(id).ok()
    }

    /// Look up an interface, awaiting asynchronous factories.
    pub async fn resolve<T>(&self, id: &InterfaceId<T>) -> Result<Arc<T>, ScopeError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let (owner, entry) = self.lookup(id.ns())?;
        let instance = match entry {
            Entry::Object(instance) => instance,
            Entry::Factory(factory) => factory(&owner),
            Entry::Service { factory, instance } => service_instance(&owner, &factory, &instance),
            Entry::Async(factory) => factory(owner).await.map_err(|e| ScopeError::Factory {
                id: id.ns().to_string(),
                source: Arc::from(e),
            })?,
        };
        downcast(id, instance)
    }

    /// Whether the id is registered here or in an ancestor.
    pub fn contains<T: ?Sized>(&self, id: &InterfaceId<T>) -> bool {
        self.lookup(id.ns()).is_ok()
    }

    /// Whether the id is registered in this scope itself.
    pub fn contains_local<T: ?Sized>(&self, id: &InterfaceId<T>) -> bool {
        read(&self.inner.entries).contains_key(id.ns())
    }

    fn insert(&self, ns: &'static str, entry: Entry) {
        trace!(scope = %self.path(), interface = ns, "registered");
        write(&self.inner.entries).insert(ns, entry);
    }

    /// Find the entry and the scope that owns it. No lock is held on return.
    fn lookup(&self, ns: &str) -> Result<(Scope, Entry), ScopeError> {
        let mut current = Some(self);
        while let Some(scope) = current {
            let entry = read(&scope.inner.entries).get(ns).cloned();
            if let Some(entry) = entry {
                return Ok((scope.clone(), entry));
            }
            current = scope.parent();
        }
        debug!(scope = %self.path(), interface = ns, "interface not found");
        Err(ScopeError::InterfaceNotFound {
            id: ns.to_string(),
            path: self.path().to_string(),
        })
    }
}

fn service_instance(
    owner: &Scope,
    factory: &SyncFactory,
    cache: &Mutex<Option<Instance>>,
) -> Instance {
    let mut cache = lock(cache);
    cache.get_or_insert_with(|| factory(owner)).clone()
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T: ?Sized>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T: ?Sized>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn downcast<T>(id: &InterfaceId<T>, instance: Instance) -> Result<Arc<T>, ScopeError>
where
    T: ?Sized + Send + Sync + 'static,
{
    instance
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or_else(|| ScopeError::TypeMismatch {
            id: id.ns().to_string(),
        })
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("path", &self.path()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    const GREETER: InterfaceId<dyn Greeter> = InterfaceId::new("test.Greeter");
    const DEPTH: InterfaceId<u32> = InterfaceId::new("test.Depth");

    #[test]
    fn poisoned_registry_keeps_working() {
        let scope = Scope::new_root("poisoned");
        scope.register_object(&DEPTH, Arc::new(1));
        let held = scope.clone();
        let _ = std::thread::spawn(move || {
            let _entries = write(&held.inner.entries);
            panic!("poison the registry");
        })
        .join();
        assert!(scope.inner.entries.is_poisoned());

        assert_eq!(*scope.get(&DEPTH).unwrap(), 1);
        scope.register_object(&DEPTH, Arc::new(2));
        assert!(scope.contains_local(&DEPTH));
        assert_eq!(*scope.get(&DEPTH).unwrap(), 2);
    }

    #[test]
    fn trait_objects_can_be_registered() {
        let scope = Scope::new_root("t");
        scope.register_object(&GREETER, Arc::new(English) as Arc<dyn Greeter>);
        assert_eq!(scope.get(&GREETER).unwrap().greet(), "hello");
    }

    #[test]
    fn child_sees_parent_but_not_the_reverse() {
        let parent = Scope::new_root("p");
        let child = parent.create_child_scope("c");

        parent.register_object(&DEPTH, Arc::new(1));
        assert_eq!(*child.get(&DEPTH).unwrap(), 1);

        child.register_object(&DEPTH, Arc::new(2));
        assert_eq!(*child.get(&DEPTH).unwrap(), 2);
        assert_eq!(*parent.get(&DEPTH).unwrap(), 1);
        assert!(child.contains_local(&DEPTH));
    }

    #[test]
    fn missing_interface_is_reported() {
        let scope = Scope::new_root("t").create_child_scope("x");
        match scope.get(&DEPTH) {
            Err(ScopeError::InterfaceNotFound { id, path }) => {
                assert_eq!(id, "test.Depth");
                assert_eq!(path, "/t/x");
            }
            other => panic!("unexpected: {:?}", other.map(|v| *v)),
        }
        assert!(scope.fetch(&DEPTH).is_none());
        assert!(!scope.contains(&DEPTH));
    }

    #[test]
    fn mismatched_type_is_reported() {
        let scope = Scope::new_root("t");
        scope.register_object(&DEPTH, Arc::new(1));
        let wrong: InterfaceId<String> = InterfaceId::new("test.Depth");
        assert!(matches!(
            scope.get(&wrong),
            Err(ScopeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn factories_run_per_lookup_and_services_once() {
        let scope = Scope::new_root("t");
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        scope.register_factory(&DEPTH, move |_| Arc::new(c.fetch_add(1, Ordering::SeqCst) as u32));
        assert_eq!(*scope.get(&DEPTH).unwrap(), 0);
        assert_eq!(*scope.get(&DEPTH).unwrap(), 1);

        let svc: InterfaceId<u32> = InterfaceId::new("test.Service");
        let c = calls.clone();
        scope.register_service(&svc, move |_| Arc::new(c.fetch_add(1, Ordering::SeqCst) as u32));
        let first = scope.get(&svc).unwrap();
        let second = scope.get(&svc).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn paths_nest() {
        let root = Scope::root();
        assert_eq!(root.path(), "/root");
        let child = root.create_child_scope("counter#3");
        assert_eq!(child.path(), "/root/counter#3");
        assert!(child.parent().unwrap().ptr_eq(&root));
    }

    #[tokio::test]
    async fn async_factories_resolve_only() {
        let scope = Scope::new_root("t");
        scope.register_async_factory(&DEPTH, |_| async { Ok(Arc::new(42u32)) });

        assert!(matches!(scope.get(&DEPTH), Err(ScopeError::AsyncOnly { .. })));
        assert_eq!(*scope.resolve(&DEPTH).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn resolve_reports_missing_interfaces() {
        let scope = Scope::new_root("t");
        let err = scope.resolve(&DEPTH).await.unwrap_err();
        assert!(matches!(err, ScopeError::InterfaceNotFound { .. }));
    }
}
