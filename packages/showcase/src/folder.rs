//! Folder tree with on-demand loading of sub-folders.

use lazy_static::lazy_static;
use mom_core::{
    named_store_factory, Controller, ControllerDef, HookOutcome, InterfaceId, Model, ModelDef,
    Params, Result, StoreContext, StoreError, StoreFactory, Value, WeakStore,
};

pub const FOLDER_ID: InterfaceId<StoreFactory> = InterfaceId::new("mom.examples.Folder");

const UNNAMED: &str = "[Unnamed folder]";

lazy_static! {
    /// Params: `data` (`{ name?, files?, folders? }`, typically built from
    /// JSON), `parent` (the parent folder store, or null for a root),
    /// `expanded` (default false).
    ///
    /// Model: fields `name`, `is_expanded`, `files`, `folders`, computed
    /// `path`, actions `expand(bool)`, `expand_all(bool)`, `set_name(str)`.
    /// Sub-folders are mounted the first time the folder is expanded.
    pub static ref FOLDER: StoreFactory = named_store_factory(FOLDER_ID, build);
}

fn build(ctx: &StoreContext, params: &Params) -> Result<()> {
    let data = params.value("data");
    let parent = params.store("parent")?.map(|store| store.downgrade());
    let expanded = params.bool_or("expanded", false)?;

    let name = data.get("name").and_then(Value::as_str).unwrap_or(UNNAMED);
    let files = data.get("files").cloned().unwrap_or_else(Value::array);
    let sub_folders: Vec<Value> = data
        .get("folders")
        .and_then(Value::as_array)
        .map(<[Value]>::to_vec)
        .unwrap_or_default();

    let loader = Loader {
        ctx: ctx.clone(),
        sub_folders,
    };
    let (expander, all) = (loader.clone(), loader.clone());
    let model = ctx.make_model(
        ModelDef::new()
            .field("name", name)
            .field("is_expanded", expanded)
            .field("files", files)
            .field("folders", Value::array())
            .computed("path", move |m| Value::from(path(m, &parent)))
            .action("expand", move |m, args| {
                m.set("is_expanded", crate::bool_arg(args, true)?)?;
                expander.load(m)?;
                Ok(Value::Null)
            })
            .action("expand_all", move |m, args| {
                let expanded = crate::bool_arg(args, true)?;
                m.call("expand", &[Value::from(expanded)])?;
                // Folders loaded from now on start in the same state.
                all.controller()?.set("child_expanded", expanded)?;
                for folder in m.get("folders")?.as_array().unwrap_or_default() {
                    folder.to_store()?.call("expand_all", &[Value::from(expanded)])?;
                }
                Ok(Value::Null)
            })
            .action("set_name", |m, args| {
                let name = args.first().and_then(Value::as_str).ok_or_else(|| {
                    StoreError::TypeMismatch {
                        expected: "string",
                        found: args.first().map_or("null", Value::kind),
                    }
                })?;
                m.set("name", name)?;
                Ok(Value::Null)
            }),
    )?;

    ctx.make_controller(
        ControllerDef::new()
            .field("loaded", false)
            .field("child_expanded", false)
            .on_init(move |_| {
                loader.load(&model)?;
                Ok(HookOutcome::Ready)
            }),
    )?;
    Ok(())
}

/// `/` for a root, `/<name>` under a root, `<parent path>/<name>` below.
fn path(model: &Model, parent: &Option<WeakStore>) -> String {
    let Some(parent) = parent.as_ref().and_then(WeakStore::upgrade) else {
        return "/".to_string();
    };
    let name = model.get("name").unwrap_or_default();
    let name = name.as_str().unwrap_or(UNNAMED);
    let parent_path = parent.get("path").unwrap_or_default();
    match parent_path.as_str() {
        Some("/") | None => format!("/{}", name),
        Some(parent_path) => format!("{}/{}", parent_path, name),
    }
}

#[derive(Clone)]
struct Loader {
    ctx: StoreContext,
    sub_folders: Vec<Value>,
}

impl Loader {
    fn controller(&self) -> Result<Controller> {
        self.ctx.controller().ok_or_else(|| StoreError::Detached {
            store: self.ctx.id().to_string(),
        })
    }

    /// Mount the sub-folders once, the first time the folder is expanded.
    fn load(&self, model: &Model) -> Result<()> {
        let controller = self.controller()?;
        if controller.get("loaded")?.to_bool()? || !model.get("is_expanded")?.to_bool()? {
            return Ok(());
        }
        controller.set("loaded", true)?;

        let expanded = controller.get("child_expanded")?;
        let parent = model.store();
        for data in &self.sub_folders {
            let folder = self.ctx.mount(
                FOLDER
                    .params()
                    .with("data", data.clone())
                    .with("parent", parent.clone())
                    .with("expanded", expanded.clone()),
            )?;
            model.update("folders", |folders| {
                if let Value::Array(list) = folders {
                    list.push(Value::Store(folder));
                }
            })?;
        }
        tracing::debug!(
            store = %self.ctx.id(),
            count = self.sub_folders.len(),
            "sub-folders loaded"
        );
        Ok(())
    }
}
