//! Countdown timer driven by the scope's time service.

use std::sync::{Arc, Mutex, PoisonError};

use lazy_static::lazy_static;
use mom_core::{
    batch, named_store_factory, ControllerDef, HookOutcome, InterfaceId, Model, ModelDef, Params,
    Result, StoreContext, StoreError, StoreFactory, Value,
};
use mom_time::{TimeService, TimerId, TIME_SERVICE};

pub const COUNTDOWN_ID: InterfaceId<StoreFactory> = InterfaceId::new("mom.examples.countdown");

lazy_static! {
    /// Params: `init_value` (default 10), `interval_ms` (default 1000),
    /// `auto_start` (default false).
    ///
    /// Model: field `value`, computed `is_running`, actions `start()`,
    /// `stop()`, `reset()`. The timer comes from the [`TIME_SERVICE`]
    /// registered in the store's scope and is stopped on dispose.
    pub static ref COUNTDOWN: StoreFactory = named_store_factory(COUNTDOWN_ID, build);
}

/// The running interval, mirrored into the controller's `running` field so
/// `is_running` can observe it.
#[derive(Clone)]
struct Ticker {
    ctx: StoreContext,
    time: Arc<dyn TimeService>,
    interval_ms: u64,
    timer: Arc<Mutex<Option<TimerId>>>,
}

impl Ticker {
    fn is_running(&self) -> bool {
        self.ctx
            .controller()
            .and_then(|c| c.get("running").ok())
            .and_then(|running| running.as_bool())
            .unwrap_or(false)
    }

    fn start(&self, model: &Model) -> Result<()> {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if timer.is_some() {
            return Ok(());
        }
        let (ticker, model) = (self.clone(), model.clone());
        let id = self.time.set_interval(
            Box::new(move || {
                if let Err(err) = batch(|| ticker.tick(&model)) {
                    tracing::warn!(store = %ticker.ctx.id(), error = %err, "countdown tick failed");
                }
            }),
            self.interval_ms,
        );
        *timer = Some(id);
        drop(timer);
        self.mirror(true)
    }

    fn stop(&self) -> Result<()> {
        let stopped = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match stopped {
            Some(id) => {
                self.time.clear_interval(id);
                self.mirror(false)
            }
            None => Ok(()),
        }
    }

    fn tick(&self, model: &Model) -> Result<()> {
        let value = model.get("value")?.to_i64()?;
        if value > 0 {
            model.set("value", value - 1)?;
        }
        if value <= 1 {
            self.stop()?;
        }
        Ok(())
    }

    fn mirror(&self, running: bool) -> Result<()> {
        let controller = self.ctx.controller().ok_or_else(|| StoreError::Detached {
            store: self.ctx.id().to_string(),
        })?;
        controller.set("running", running)?;
        Ok(())
    }
}

fn build(ctx: &StoreContext, params: &Params) -> Result<()> {
    let init_value = params.i64_or("init_value", 10)?;
    let interval_ms = u64::try_from(params.i64_or("interval_ms", 1000)?).unwrap_or(0);
    let auto_start = params.bool_or("auto_start", false)?;

    let ticker = Ticker {
        ctx: ctx.clone(),
        time: ctx.scope()?.get(&TIME_SERVICE)?,
        interval_ms,
        timer: Arc::new(Mutex::new(None)),
    };

    let (running, starter, stopper) = (ticker.clone(), ticker.clone(), ticker.clone());
    let model = ctx.make_model(
        ModelDef::new()
            .field("value", init_value)
            .computed("is_running", move |_| Value::from(running.is_running()))
            .action("start", move |m, _| {
                starter.start(m)?;
                Ok(Value::Null)
            })
            .action("stop", move |_, _| {
                stopper.stop()?;
                Ok(Value::Null)
            })
            .action("reset", move |m, _| {
                m.set("value", init_value)?;
                Ok(Value::Null)
            }),
    )?;

    let init = ticker.clone();
    ctx.make_controller(
        ControllerDef::new()
            .field("running", false)
            .on_init(move |_| {
                if auto_start {
                    init.start(&model)?;
                }
                Ok(HookOutcome::Ready)
            })
            .on_dispose(move |_| {
                ticker.stop()?;
                Ok(HookOutcome::Ready)
            }),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mom_core::{create, LifecycleState, Scope, Store};
    use mom_time::{install_fake_time_service, FakeTimeService, DEFAULT_START_MS};

    struct Setup {
        scope: Scope,
        clock: Arc<FakeTimeService>,
    }

    fn setup(name: &str) -> Setup {
        let scope = Scope::root().create_child_scope(name);
        let clock = install_fake_time_service(&scope, DEFAULT_START_MS);
        Setup { scope, clock }
    }

    fn value(store: &Store) -> i64 {
        store.get("value").unwrap().as_i64().unwrap()
    }

    fn running(store: &Store) -> bool {
        store.get("is_running").unwrap().as_bool().unwrap()
    }

    #[test]
    fn defaults() {
        let t = setup("test:countdown-defaults");
        let store = create(COUNTDOWN.params().in_scope(&t.scope)).unwrap();
        assert!(store.is_ready());
        assert_eq!(value(&store), 10);
        assert!(!running(&store));

        t.clock.move_time(5_000);
        assert_eq!(value(&store), 10);
        store.dispose().unwrap();
    }

    #[test]
    fn auto_start_counts_down() {
        let t = setup("test:countdown-auto");
        let store = create(
            COUNTDOWN
                .params()
                .in_scope(&t.scope)
                .with("init_value", 5)
                .with("interval_ms", 5)
                .with("auto_start", true),
        )
        .unwrap();
        assert!(running(&store));
        assert_eq!(t.clock.active_intervals(), 1);

        t.clock.move_time(8);
        assert_eq!(value(&store), 4);
        assert!(running(&store));
        store.dispose().unwrap();
    }

    #[test]
    fn start_and_stop() {
        let t = setup("test:countdown-start-stop");
        let store = create(
            COUNTDOWN
                .params()
                .in_scope(&t.scope)
                .with("interval_ms", 5),
        )
        .unwrap();

        store.call("start", &[]).unwrap();
        assert!(running(&store));
        t.clock.move_time(7);
        assert_eq!(value(&store), 9);
        t.clock.move_time(5);
        assert_eq!(value(&store), 8);

        store.call("stop", &[]).unwrap();
        assert!(!running(&store));
        assert_eq!(t.clock.active_intervals(), 0);
        t.clock.move_time(10);
        assert_eq!(value(&store), 8);

        // Starting twice keeps a single timer.
        store.call("start", &[]).unwrap();
        store.call("start", &[]).unwrap();
        assert_eq!(t.clock.active_intervals(), 1);
        t.clock.move_time(7);
        assert_eq!(value(&store), 7);

        store.call("reset", &[]).unwrap();
        assert_eq!(value(&store), 10);
        assert!(running(&store));
        store.dispose().unwrap();
    }

    #[test]
    fn stops_by_itself_at_zero() {
        let t = setup("test:countdown-zero");
        let store = create(
            COUNTDOWN
                .params()
                .in_scope(&t.scope)
                .with("init_value", 3)
                .with("auto_start", true),
        )
        .unwrap();

        t.clock.move_time(10_000);
        assert_eq!(value(&store), 0);
        assert!(!running(&store));
        assert_eq!(t.clock.active_intervals(), 0);
        store.dispose().unwrap();
    }

    #[test]
    fn dispose_stops_the_timer() {
        let t = setup("test:countdown-dispose");
        let store = create(
            COUNTDOWN
                .params()
                .in_scope(&t.scope)
                .with("interval_ms", 5)
                .with("auto_start", true),
        )
        .unwrap();
        assert_eq!(t.clock.active_intervals(), 1);

        store.dispose().unwrap();
        assert_eq!(store.state(), LifecycleState::Disposed);
        assert!(!running(&store));
        assert_eq!(t.clock.active_intervals(), 0);
        t.clock.move_time(100);
        assert_eq!(value(&store), 10);
    }

    #[test]
    fn needs_a_time_service() {
        let scope = Scope::new_root("test:countdown-no-time");
        let err = create(COUNTDOWN.params().in_scope(&scope)).unwrap_err();
        assert!(matches!(err, StoreError::Scope(_)));
    }
}
