//! Stores and DI scopes.

use std::sync::Arc;

use mom_core::{
    create, store_factory, BoxError, ControllerDef, HookOutcome, InterfaceId, ModelDef, Runtime,
    RuntimeConfig, Scope, ScopeError, StoreError, StoreFactory, Value,
};

const GREETING: InterfaceId<String> = InterfaceId::new("test.scope.Greeting");

/// Reads the greeting from its scope into a field.
fn reader() -> StoreFactory {
    store_factory(|ctx, _| {
        let greeting = ctx.scope()?.get(&GREETING)?;
        ctx.make_model(ModelDef::new().field("greeting", greeting.as_str()))?;
        Ok(())
    })
}

#[test]
fn roots_use_the_scope_they_are_given() {
    let scope = Scope::new_root("app");
    scope.register_object(&GREETING, Arc::new("hello".to_string()));

    let store = create(reader().params().in_scope(&scope)).unwrap();
    assert_eq!(store.get("greeting").unwrap(), Value::from("hello"));
    assert!(store.scope().ptr_eq(&scope));
    store.dispose().unwrap();
}

#[test]
fn runtime_default_scope_applies() {
    let scope = Scope::new_root("configured");
    scope.register_object(&GREETING, Arc::new("configured".to_string()));
    let runtime = Runtime::new(RuntimeConfig {
        default_scope: Some(scope.clone()),
    });

    let store = runtime.create(&reader()).unwrap();
    assert_eq!(store.get("greeting").unwrap(), Value::from("configured"));
    runtime.dispose(&store).unwrap();
}

#[test]
fn missing_interfaces_abort_construction() {
    let scope = Scope::new_root("empty");
    let err = create(reader().params().in_scope(&scope)).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Scope(ScopeError::InterfaceNotFound { .. })
    ));
}

#[test]
fn child_context_isolates_registrations() {
    let scope = Scope::new_root("shop");
    scope.register_object(&GREETING, Arc::new("from parent".to_string()));

    let child_factory = reader();
    let factory = store_factory(move |ctx, _| {
        let own = ctx.create_child_context()?;
        own.register_object(&GREETING, Arc::new("from store".to_string()));
        let child = ctx.mount(&child_factory)?;
        ctx.make_model(ModelDef::new().field("child", child))?;
        Ok(())
    });

    let store = create(factory.params().in_scope(&scope)).unwrap();
    // The store keeps the scope it was created in; the fork is only used
    // for its children.
    assert!(store.scope().ptr_eq(&scope));
    assert_eq!(store.scope().path(), "/shop");

    // The child resolves from the forked scope.
    assert_eq!(store.read("child/greeting").unwrap(), Value::from("from store"));
    let child = store.read("child").unwrap().to_store().unwrap();
    assert_eq!(child.scope().path(), format!("/shop/{}", store.id()));
    assert_eq!(child.scope().name(), store.id().as_str());

    // The parent scope never sees the store's registration.
    assert_eq!(*scope.get(&GREETING).unwrap(), "from parent");
    store.dispose().unwrap();
}

#[test]
fn forked_scope_inherits_lookups() {
    let scope = Scope::new_root("inherit");
    scope.register_object(&GREETING, Arc::new("inherited".to_string()));

    let factory = store_factory(|ctx, _| {
        ctx.create_child_context()?;
        let greeting = ctx.scope()?.get(&GREETING)?;
        ctx.make_model(ModelDef::new().field("greeting", greeting.as_str()))?;
        Ok(())
    });
    let store = create(factory.params().in_scope(&scope)).unwrap();
    assert_eq!(store.get("greeting").unwrap(), Value::from("inherited"));
    store.dispose().unwrap();
}

#[test]
fn mount_ignores_a_passed_scope() {
    let outer = Scope::new_root("outer");
    outer.register_object(&GREETING, Arc::new("outer".to_string()));
    let elsewhere = Scope::new_root("elsewhere");
    elsewhere.register_object(&GREETING, Arc::new("elsewhere".to_string()));

    let child_factory = reader();
    let factory = store_factory(move |ctx, _| {
        let child = ctx.mount(child_factory.params().in_scope(&elsewhere))?;
        ctx.make_model(ModelDef::new().field("child", child))?;
        Ok(())
    });
    let store = create(factory.params().in_scope(&outer)).unwrap();
    assert_eq!(store.read("child/greeting").unwrap(), Value::from("outer"));
    store.dispose().unwrap();
}

#[tokio::test]
async fn async_init_resolution_failure_rejects_init_complete() {
    const MISSING: InterfaceId<String> = InterfaceId::new("test.scope.Missing");
    let scope = Scope::new_root("async");

    let factory = store_factory(|ctx, _| {
        let model = ctx.make_model(ModelDef::new().field("value", Value::Null))?;
        let scope = ctx.scope()?;
        ctx.make_controller(ControllerDef::new().on_init(move |_| {
            Ok(HookOutcome::pending(async move {
                let value = scope.resolve(&MISSING).await?;
                model.set("value", value.as_str())?;
                Ok::<(), BoxError>(())
            }))
        }))?;
        Ok(())
    });

    let store = create(factory.params().in_scope(&scope)).unwrap();
    let err = store.init_complete().await.unwrap_err();
    assert!(err.to_string().contains("test.scope.Missing"));
    store.dispose().unwrap();
}

#[test]
fn forking_after_creation_keeps_the_store_scope() {
    let scope = Scope::new_root("asm");
    let factory = store_factory(|ctx, _| {
        ctx.make_model(ModelDef::new().field("value", 1))?;
        ctx.create_child_context()?;
        Ok(())
    });
    let store = create(factory.params().in_scope(&scope)).unwrap();
    assert_eq!(store.scope().path(), "/asm");
    store.dispose().unwrap();
}
