//! Headless counter.

use lazy_static::lazy_static;
use mom_core::{
    named_store_factory, BoxError, InterfaceId, Model, ModelDef, Params, Result, StoreContext,
    StoreFactory, Value,
};

pub const COUNTER_ID: InterfaceId<StoreFactory> = InterfaceId::new("mom.examples.counter");

lazy_static! {
    /// Params: `value` (default 0), `min_format_digits` (default 2).
    ///
    /// Model: prop `$value`, field `changes` (number of effective value
    /// changes), computed `formatted_value` (zero-padded), actions
    /// `increment(n = 1)`, `set_value(v)`, `reset(v = initial value)`.
    pub static ref COUNTER: StoreFactory = named_store_factory(COUNTER_ID, build);
}

fn build(ctx: &StoreContext, params: &Params) -> Result<()> {
    let initial = params.i64_or("value", 0)?;
    let digits = usize::try_from(params.i64_or("min_format_digits", 2)?).unwrap_or(0);

    ctx.make_model(
        ModelDef::new()
            .prop("$value", initial)
            .field("changes", 0)
            .computed("formatted_value", move |m| {
                let value = m.get("$value").ok().and_then(|v| v.as_i64()).unwrap_or(0);
                Value::from(format!("{:0width$}", value, width = digits))
            })
            .action("increment", |m, args| {
                let by = crate::int_arg(args, 1)?;
                let value = m.get("$value")?.to_i64()?;
                set_value(m, value + by)
            })
            .action("set_value", |m, args| {
                let value = args.first().cloned().unwrap_or_default().to_i64()?;
                set_value(m, value)
            })
            .action("reset", move |m, args| {
                let value = crate::int_arg(args, initial)?;
                set_value(m, value)
            }),
    )?;
    Ok(())
}

fn set_value(m: &Model, value: i64) -> std::result::Result<Value, BoxError> {
    if m.set("$value", value)? {
        m.update("changes", |changes| {
            *changes = Value::from(changes.as_i64().unwrap_or(0) + 1);
        })?;
    }
    Ok(Value::Null)
}
