//! Model definitions and the model handle given to factories.

use std::fmt;
use std::sync::{Arc, Weak};

use mom_reactive::Observable;
use mom_scope::{BoxError, Scope};

use crate::error::Result;
use crate::lifecycle::{Completion, LifecycleState};
use crate::object::{Access, Member, Members, ObjectCore};
use crate::runtime::Roots;
use crate::store::{Store, StoreId};
use crate::value::Value;

/// Declares the members of a store's model.
///
/// Two disjoint sets of data members exist:
///
/// - `field`s are read-only outside the store
/// - `prop`s are writable through the public [`Store`] and must be named with
///   exactly one leading `$`
///
/// Computed values and actions see the live [`Model`].
///
/// ```rust
/// use mom_core::{ModelDef, Value};
///
/// let def = ModelDef::new()
///     .field("value", 1)
///     .prop("$step", 1)
///     .computed("double", |m| {
///         Value::from(m.get("value").ok().and_then(|v| v.as_i64()).unwrap_or(0) * 2)
///     })
///     .action("increment", |m, _args| {
///         let step = m.get("$step")?.to_i64()?;
///         let value = m.get("value")?.to_i64()?;
///         m.set("value", value + step)?;
///         Ok(Value::Null)
///     });
/// assert!(!def.is_empty());
/// ```
#[derive(Default)]
pub struct ModelDef {
    members: Members<Model>,
}

impl ModelDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// A field the store can change and outside code can only read.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.members.push(
            name.into(),
            Member::Field {
                value: value.into(),
                writable: false,
            },
        );
        self
    }

    /// An externally writable field. The name must start with one `$`.
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.members.push(
            name.into(),
            Member::Field {
                value: value.into(),
                writable: true,
            },
        );
        self
    }

    /// A memoized derived value.
    pub fn computed<F>(mut self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&Model) -> Value + Send + Sync + 'static,
    {
        self.members
            .push(name.into(), Member::Computed(Arc::new(getter)));
        self
    }

    /// A method. Writes made while it runs are batched into one notification.
    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&Model, &[Value]) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.members.push(name.into(), Member::Action(Arc::new(action)));
        self
    }

    /// No member declared. `make_model` rejects empty models.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn validate(&self, namespace: &str) -> Result<()> {
        self.members.validate(namespace, |name, member| match member {
            Member::Field { writable: true, .. } if !is_prop_name(name) => {
                Some("props must start with exactly one '$'")
            }
            Member::Field { writable: true, .. } => None,
            _ if name.starts_with('$') => Some("only props may start with '$'"),
            _ => None,
        })
    }
}

/// `$name`, but not `$` or `$$name`.
fn is_prop_name(name: &str) -> bool {
    match name.strip_prefix('$') {
        Some(rest) => !rest.is_empty() && !rest.starts_with('$'),
        None => false,
    }
}

/// Store metadata, shared by every handle to the model.
pub(crate) struct Metadata {
    pub(crate) id: StoreId,
    pub(crate) namespace: String,
    pub(crate) scope: Scope,
    pub(crate) state: Observable<LifecycleState>,
    pub(crate) ready: Observable<bool>,
    pub(crate) init_complete: Completion,
    pub(crate) dispose_complete: Completion,
    /// Set for roots only.
    pub(crate) roots: Option<Weak<Roots>>,
}

pub(crate) struct ModelCore {
    pub(crate) meta: Metadata,
    pub(crate) object: ObjectCore<Model>,
}

/// The model as seen from inside the store.
///
/// Unlike the public [`Store`], a `Model` can write every field. Clones refer
/// to the same model.
#[derive(Clone)]
pub struct Model {
    pub(crate) core: Arc<ModelCore>,
}

impl Model {
    pub(crate) fn build(meta: Metadata, def: ModelDef) -> Self {
        let label = meta.id.to_string();
        let core = Arc::new_cyclic(|me: &Weak<ModelCore>| {
            let me = me.clone();
            ModelCore {
                object: ObjectCore::build(
                    &label,
                    def.members,
                    Arc::new(move || me.upgrade().map(|core| Model { core })),
                ),
                meta,
            }
        });
        Model { core }
    }

    /// The store id, `<namespace>#<n>`.
    pub fn id(&self) -> &StoreId {
        &self.core.meta.id
    }

    /// The namespace of the factory that built the store.
    pub fn namespace(&self) -> &str {
        &self.core.meta.namespace
    }

    /// The DI scope the store was created in. Forks made with
    /// `StoreContext::create_child_context` are not reflected here.
    pub fn scope(&self) -> Scope {
        self.core.meta.scope.clone()
    }

    /// Tracked read of a field, prop or computed value.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.core.object.get(name)
    }

    /// Write any field or prop. Returns whether the value changed.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<bool> {
        self.core.object.set(name, value.into(), Access::Internal)
    }

    /// Mutate a field in place, e.g. push onto an array.
    pub fn update<R>(&self, name: &str, f: impl FnOnce(&mut Value) -> R) -> Result<R> {
        self.core.object.update(name, f, Access::Internal)
    }

    /// Call an action inside `batch`.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.core.object.call(self, name, args)
    }

    /// The public view of this model.
    pub fn store(&self) -> Store {
        Store::from_core(self.core.clone())
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model").field("id", &self.core.meta.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn prop_names_need_one_sigil() {
        assert!(is_prop_name("$value"));
        assert!(!is_prop_name("value"));
        assert!(!is_prop_name("$"));
        assert!(!is_prop_name("$$value"));
    }

    #[test]
    fn validation_separates_fields_from_props() {
        assert!(ModelDef::new()
            .field("value", 1)
            .prop("$value", 2)
            .validate("demo")
            .is_ok());

        let err = ModelDef::new().prop("value", 1).validate("demo").unwrap_err();
        assert!(matches!(err, StoreError::InvalidFieldName { ref name, .. } if name == "value"));

        let err = ModelDef::new().field("$value", 1).validate("demo").unwrap_err();
        assert!(matches!(err, StoreError::InvalidFieldName { .. }));

        let err = ModelDef::new()
            .action("$go", |_, _| Ok(Value::Null))
            .validate("demo")
            .unwrap_err();
        assert!(err.to_string().contains("only props may start with '$'"));
    }
}
