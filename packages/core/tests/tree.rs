//! Store construction, the public/private split and the store tree.

use std::sync::{Arc, Mutex};

use mom_core::{
    create, store_factory, ControllerDef, HookOutcome, LifecycleState, ModelDef, Scope,
    StoreContext, StoreError, StoreFactory, Value,
};
use serde_json::json;

fn counter() -> StoreFactory {
    store_factory(|ctx, params| {
        let initial = params.i64_or("value", 1)?;
        ctx.make_model(
            ModelDef::new()
                .field("value", initial)
                .prop("$step", 1)
                .computed("double", |m| {
                    Value::from(m.get("value").ok().and_then(|v| v.as_i64()).unwrap_or(0) * 2)
                })
                .action("increment", |m, args| {
                    let by = match args.first() {
                        Some(v) => v.to_i64()?,
                        None => m.get("$step")?.to_i64()?,
                    };
                    let value = m.get("value")?.to_i64()?;
                    m.set("value", value + by)?;
                    Ok(Value::Null)
                }),
        )?;
        Ok(())
    })
}

#[test]
fn counter_scenario() {
    let store = create(&counter()).unwrap();
    assert_eq!(store.get("value").unwrap(), Value::from(1));

    store.call("increment", &[Value::from(4)]).unwrap();
    assert_eq!(store.get("value").unwrap(), Value::from(5));

    store.call("increment", &[]).unwrap();
    assert_eq!(store.get("value").unwrap(), Value::from(6));
    assert_eq!(store.get("double").unwrap(), Value::from(12));
    store.dispose().unwrap();
}

#[test]
fn public_view_writes_props_only() {
    let store = create(counter().params().with("value", 10)).unwrap();

    assert!(matches!(
        store.set("value", 0),
        Err(StoreError::ReadOnlyField { .. })
    ));
    assert!(matches!(
        store.set("double", 0),
        Err(StoreError::ReadOnlyField { .. })
    ));
    assert!(matches!(
        store.set("missing", 0),
        Err(StoreError::UnknownField { .. })
    ));

    assert!(store.set("$step", 5).unwrap());
    store.call("increment", &[]).unwrap();
    assert_eq!(store.get("value").unwrap(), Value::from(15));

    let err = store.call("increment", &[Value::from("x")]).unwrap_err();
    assert!(matches!(err, StoreError::Action { ref name, .. } if name == "increment"));
    assert!(matches!(
        store.call("decrement", &[]),
        Err(StoreError::UnknownAction { .. })
    ));
    store.dispose().unwrap();
}

#[test]
fn metadata_is_stamped() {
    let factory = StoreFactory::builder()
        .interface(mom_core::InterfaceId::new("test.tree.Named"))
        .register_in(&Scope::new_root("unused"))
        .body(|ctx, _| {
            ctx.make_model(ModelDef::new().field("value", 1))?;
            Ok(())
        })
        .build()
        .unwrap();
    let store = create(&factory).unwrap();
    assert_eq!(store.namespace(), "test.tree.Named");
    assert!(store.id().as_str().starts_with("test.tree.Named#"));
    assert!(store.is_root());
    assert!(store.scope().ptr_eq(&Scope::root()));
    store.dispose().unwrap();
}

#[test]
fn snapshot_serializes_child_stores_by_id() {
    let child_factory = counter();
    let factory = store_factory(move |ctx, _| {
        let child = ctx.mount(child_factory.params().with("value", 3))?;
        ctx.make_model(ModelDef::new().field("title", "parent").field("child", child))?;
        Ok(())
    });
    let store = create(&factory).unwrap();
    let child = store.get("child").unwrap().to_store().unwrap();

    let encoded = serde_json::to_value(store.snapshot()).unwrap();
    assert_eq!(
        encoded,
        json!({ "title": "parent", "child": { "$store": child.id().as_str() } })
    );
    assert_eq!(store.read("child/double").unwrap(), Value::from(6));
    assert!(matches!(
        store.read("child/nope"),
        Err(StoreError::UnknownField { .. })
    ));
    store.dispose().unwrap();
}

#[test]
fn model_must_be_created_exactly_once() {
    let twice = store_factory(|ctx, _| {
        ctx.make_model(ModelDef::new().field("a", 1))?;
        ctx.make_model(ModelDef::new().field("b", 2))?;
        Ok(())
    });
    let err = create(&twice).unwrap_err();
    assert!(matches!(err, StoreError::ModelAlreadyCreated { .. }));
    assert!(err.is_configuration());

    let never = StoreFactory::builder()
        .interface(mom_core::InterfaceId::new("test.tree.NoModel"))
        .register_in(&Scope::new_root("unused"))
        .body(|_, _| Ok(()))
        .build()
        .unwrap();
    let err = create(&never).unwrap_err();
    assert!(
        matches!(err, StoreError::ModelNotCreated { ref namespace } if namespace == "test.tree.NoModel")
    );

    let empty = store_factory(|ctx, _| {
        ctx.make_model(ModelDef::new())?;
        Ok(())
    });
    assert!(matches!(
        create(&empty),
        Err(StoreError::EmptyModel { .. })
    ));
}

#[test]
fn controller_at_most_once() {
    let factory = store_factory(|ctx, _| {
        ctx.make_model(ModelDef::new().field("a", 1))?;
        ctx.make_controller(ControllerDef::new())?;
        ctx.make_controller(ControllerDef::new())?;
        Ok(())
    });
    assert!(matches!(
        create(&factory),
        Err(StoreError::ControllerAlreadyCreated { .. })
    ));
}

#[test]
fn controller_state_stays_private() {
    let factory = store_factory(|ctx, _| {
        let model = ctx.make_model(ModelDef::new().field("visible", 0))?;
        let controller = ctx.make_controller(
            ControllerDef::new()
                .field("hidden", 41)
                .action("bump", |c, _| {
                    let hidden = c.get("hidden")?.to_i64()?;
                    c.set("hidden", hidden + 1)?;
                    Ok(Value::Null)
                })
                .on_init(move |c| {
                    c.call("bump", &[])?;
                    model.set("visible", c.get("hidden")?)?;
                    Ok(HookOutcome::Ready)
                }),
        )?;
        assert_eq!(controller.get("hidden")?, Value::from(41));
        Ok(())
    });
    let store = create(&factory).unwrap();
    assert_eq!(store.get("visible").unwrap(), Value::from(42));
    assert!(!store.has("hidden"));
    assert!(store.get("hidden").is_err());
    store.dispose().unwrap();
}

#[test]
fn mount_and_unmount_scenario() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let child_factory = store_factory(move |ctx, params| {
        ctx.make_model(ModelDef::new().field("x", params.value("x")))?;
        let s = s.clone();
        ctx.make_controller(ControllerDef::new().on_dispose(move |_| {
            s.lock().unwrap().push("child disposed");
            Ok(HookOutcome::Ready)
        }))?;
        Ok(())
    });

    let parent_factory = store_factory(move |ctx, _| {
        let child = ctx.mount(child_factory.params().with("x", 1))?;
        let handle = ctx.clone();
        ctx.make_model(ModelDef::new().field("child", child).action(
            "drop_child",
            move |m, _| {
                let child = m.get("child")?;
                m.set("child", handle.unmount(&child))?;
                Ok(Value::Null)
            },
        ))?;
        Ok(())
    });

    let parent = create(&parent_factory).unwrap();
    let child = parent.get("child").unwrap().to_store().unwrap();
    assert_eq!(child.get("x").unwrap(), Value::from(1));
    assert_eq!(child.state(), LifecycleState::Ready);

    parent.call("drop_child", &[]).unwrap();
    assert_eq!(child.state(), LifecycleState::Disposed);
    assert_eq!(parent.state(), LifecycleState::Ready);
    assert!(parent.get("child").unwrap().is_null());
    assert_eq!(*seen.lock().unwrap(), vec!["child disposed"]);

    // Already gone: nothing happens.
    parent.call("drop_child", &[]).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
    parent.dispose().unwrap();
}

#[test]
fn lazy_children_are_mounted_from_actions() {
    let child_factory = counter();
    let factory = store_factory(move |ctx, _| {
        let (handle, child_factory) = (ctx.clone(), child_factory.clone());
        ctx.make_model(ModelDef::new().field("items", Value::array()).action(
            "add",
            move |m, _| {
                let item = handle.mount(&child_factory)?;
                m.update("items", |items| {
                    if let Value::Array(list) = items {
                        list.push(Value::Store(item));
                    }
                })?;
                Ok(Value::Null)
            },
        ))?;
        Ok(())
    });

    let store = create(&factory).unwrap();
    store.call("add", &[]).unwrap();
    store.call("add", &[]).unwrap();
    let first = store.read("items/0").unwrap().to_store().unwrap();
    assert_eq!(store.read("items/1/value").unwrap(), Value::from(1));

    store.dispose().unwrap();
    assert!(first.is_disposed());
}

#[test]
fn unmount_ignores_strangers() {
    let other = create(&counter()).unwrap();
    let probe: Arc<Mutex<Option<StoreContext>>> = Arc::new(Mutex::new(None));
    let p = probe.clone();
    let factory = store_factory(move |ctx, _| {
        *p.lock().unwrap() = Some(ctx.clone());
        ctx.make_model(ModelDef::new().field("a", 1))?;
        Ok(())
    });
    let store = create(&factory).unwrap();
    let ctx = probe.lock().unwrap().clone().unwrap();

    assert!(ctx.unmount(&Value::Store(other.clone())).is_null());
    assert!(!ctx.unmount_store(&other));
    assert!(ctx.unmount(&Value::from(3)).is_null());
    assert_eq!(other.state(), LifecycleState::Ready);

    store.dispose().unwrap();
    assert!(matches!(
        ctx.mount(&counter()),
        Err(StoreError::Disposed { .. }) | Err(StoreError::Detached { .. })
    ));
    other.dispose().unwrap();
}

#[test]
fn terminate_disposes_from_inside() {
    let runtime = mom_core::Runtime::new(mom_core::RuntimeConfig::default());
    let factory = store_factory(|ctx, _| {
        let handle = ctx.clone();
        ctx.make_model(ModelDef::new().field("a", 1).action("close", move |_, _| {
            Ok(Value::Bool(handle.terminate()?))
        }))?;
        Ok(())
    });
    let store = runtime.create(&factory).unwrap();
    assert_eq!(runtime.root_count(), 1);

    assert_eq!(store.call("close", &[]).unwrap(), Value::Bool(true));
    assert!(store.is_disposed());
    assert_eq!(runtime.root_count(), 0);
    assert!(!runtime.dispose(&store).unwrap());
}

#[test]
fn weak_handles_upgrade_while_the_store_lives() {
    let store = create(&counter()).unwrap();
    let weak = store.downgrade();
    assert_eq!(weak.upgrade(), Some(store.clone()));
    assert!(mom_core::WeakStore::default().upgrade().is_none());
    store.dispose().unwrap();
}

#[test]
fn roots_terminated_during_init_are_not_registered() {
    let runtime = mom_core::Runtime::new(mom_core::RuntimeConfig::default());
    let factory = store_factory(|ctx, _| {
        let handle = ctx.clone();
        ctx.make_model(ModelDef::new().field("a", 1))?;
        ctx.make_controller(ControllerDef::new().on_init(move |_| {
            handle.terminate()?;
            Ok(HookOutcome::Ready)
        }))?;
        Ok(())
    });
    let store = runtime.create(&factory).unwrap();
    assert!(store.is_disposed());
    assert_eq!(runtime.root_count(), 0);
    assert!(!runtime.dispose(&store).unwrap());
}
