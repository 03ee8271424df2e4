//! A list of counters mounted as children.

use lazy_static::lazy_static;
use mom_core::{
    named_store_factory, ControllerDef, HookOutcome, InterfaceId, ModelDef, Params, Result,
    StoreContext, StoreFactory, Value,
};

use crate::counter::COUNTER;

pub const COUNTER_LIST_ID: InterfaceId<StoreFactory> =
    InterfaceId::new("mom.examples.counterList");

lazy_static! {
    /// Params: `size`, the number of counters created at init (default 0).
    ///
    /// Model: prop `$default_value` (initial value of new counters, default
    /// 1), field `counters`, computed `total`, actions `add_counter()`,
    /// `remove_counter(counter)`, `reset()`.
    pub static ref COUNTER_LIST: StoreFactory = named_store_factory(COUNTER_LIST_ID, build);
}

fn build(ctx: &StoreContext, params: &Params) -> Result<()> {
    let size = params.i64_or("size", 0)?;

    let (adder, remover) = (ctx.clone(), ctx.clone());
    let model = ctx.make_model(
        ModelDef::new()
            .prop("$default_value", 1)
            .field("counters", Value::array())
            .computed("total", |m| {
                let counters = m.get("counters").unwrap_or_default();
                let total: i64 = counters
                    .as_array()
                    .unwrap_or_default()
                    .iter()
                    .filter_map(Value::as_store)
                    .filter_map(|c| c.get("$value").ok()?.as_i64())
                    .sum();
                Value::from(total)
            })
            .action("add_counter", move |m, _| {
                let value = m.get("$default_value")?;
                let counter = adder.mount(COUNTER.params().with("value", value))?;
                m.update("counters", |counters| {
                    if let Value::Array(list) = counters {
                        list.push(Value::Store(counter));
                    }
                })?;
                Ok(Value::Null)
            })
            .action("remove_counter", move |m, args| {
                let target = args.first().cloned().unwrap_or_default().to_store()?;
                let removed = m.update("counters", |counters| match counters {
                    Value::Array(list) => list
                        .iter()
                        .position(|c| c.as_store() == Some(&target))
                        .map(|at| list.remove(at)),
                    _ => None,
                })?;
                // Unmount outside the update: disposal may read the list.
                if let Some(counter) = &removed {
                    remover.unmount(counter);
                }
                Ok(Value::Bool(removed.is_some()))
            })
            .action("reset", |m, _| {
                let counters = m.get("counters")?;
                for counter in counters.as_array().unwrap_or_default() {
                    counter.to_store()?.call("reset", &[])?;
                }
                Ok(Value::Null)
            }),
    )?;

    ctx.make_controller(ControllerDef::new().on_init(move |_| {
        for _ in 0..size {
            model.call("add_counter", &[])?;
        }
        Ok(HookOutcome::Ready)
    }))?;
    Ok(())
}
