//! Folder tree: lazy sub-folder mounting, recursive expansion and paths.

use mom_core::{create, LifecycleState, Store, Value};
use mom_showcase::FOLDER;
use serde_json::json;

fn data() -> Value {
    Value::from(json!({
        "name": "root",
        "files": ["file1", "file2"],
        "folders": [
            {
                "name": "folderA",
                "folders": [{ "name": "folderA.A" }, { "name": "folderA.B", "files": ["file3"] }]
            },
            {
                "name": "folderB",
                "folders": [{ "name": "folderB.A", "files": ["file4"] }]
            }
        ]
    }))
}

fn root(expanded: bool) -> Store {
    create(
        FOLDER
            .params()
            .with("data", data())
            .with("parent", Value::Null)
            .with("expanded", expanded),
    )
    .unwrap()
}

fn folders(folder: &Store) -> Vec<Store> {
    folder
        .get("folders")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f.to_store().unwrap())
        .collect()
}

fn text(folder: &Store, name: &str) -> String {
    folder.get(name).unwrap().as_str().unwrap().to_string()
}

fn is_expanded(folder: &Store) -> bool {
    folder.get("is_expanded").unwrap().as_bool().unwrap()
}

#[test]
fn empty_root_folder() {
    let store = create(FOLDER.params().with("data", Value::map())).unwrap();
    assert!(store.is_ready());
    assert!(!is_expanded(&store));
    assert_eq!(text(&store, "name"), "[Unnamed folder]");
    assert_eq!(text(&store, "path"), "/");
    assert_eq!(store.get("files").unwrap(), Value::array());
    assert!(folders(&store).is_empty());
    store.dispose().unwrap();
}

#[test]
fn collapsed_folders_load_on_demand() {
    let store = root(false);
    assert_eq!(text(&store, "name"), "root");
    assert_eq!(text(&store, "path"), "/");
    assert_eq!(store.read("files/1").unwrap(), Value::from("file2"));
    assert!(folders(&store).is_empty());

    store.call("expand", &[Value::Bool(true)]).unwrap();
    let subs = folders(&store);
    assert_eq!(subs.len(), 2);
    let a = &subs[0];
    assert_eq!(text(a, "name"), "folderA");
    assert_eq!(text(a, "path"), "/folderA");
    assert!(!is_expanded(a));
    assert!(folders(a).is_empty());

    a.call("expand", &[Value::Bool(true)]).unwrap();
    let a_subs = folders(a);
    assert_eq!(a_subs.len(), 2);
    assert_eq!(text(&a_subs[0], "path"), "/folderA/folderA.A");
    assert_eq!(a_subs[1].read("files/0").unwrap(), Value::from("file3"));

    // Collapsing and expanding again reuses the loaded folders.
    store.call("expand", &[Value::Bool(false)]).unwrap();
    store.call("expand", &[Value::Bool(true)]).unwrap();
    assert_eq!(folders(&store), subs);
    store.dispose().unwrap();
}

#[test]
fn expanded_root_loads_one_level() {
    let store = root(true);
    assert!(is_expanded(&store));
    let subs = folders(&store);
    assert_eq!(subs.len(), 2);
    assert!(!is_expanded(&subs[0]));
    assert!(folders(&subs[0]).is_empty());
    store.dispose().unwrap();
}

#[test]
fn expand_all_and_collapse_all() {
    let store = root(false);
    store.call("expand_all", &[Value::Bool(true)]).unwrap();

    let subs = folders(&store);
    let everything: Vec<Store> = subs
        .iter()
        .flat_map(|f| std::iter::once(f.clone()).chain(folders(f)))
        .collect();
    assert_eq!(everything.len(), 5);
    assert!(is_expanded(&store));
    assert!(everything.iter().all(is_expanded));

    store.call("expand_all", &[Value::Bool(false)]).unwrap();
    assert!(!is_expanded(&store));
    assert!(everything.iter().all(|f| !is_expanded(f)));
    store.dispose().unwrap();
}

#[test]
fn paths_follow_renames() {
    let store = root(false);
    store.call("expand_all", &[Value::Bool(true)]).unwrap();
    let a = folders(&store)[0].clone();
    let ab = folders(&a)[1].clone();
    assert_eq!(text(&ab, "path"), "/folderA/folderA.B");

    ab.call("set_name", &[Value::from("NAME01")]).unwrap();
    assert_eq!(text(&ab, "path"), "/folderA/NAME01");

    a.call("set_name", &[Value::from("NAME0")]).unwrap();
    assert_eq!(text(&ab, "path"), "/NAME0/NAME01");
    assert!(ab.call("set_name", &[Value::from(3)]).is_err());
    store.dispose().unwrap();
}

#[test]
fn sub_folders_are_children_of_the_tree() {
    let store = root(false);
    store.call("expand_all", &[Value::Bool(true)]).unwrap();
    let a = folders(&store)[0].clone();
    let leaf = folders(&a)[0].clone();
    assert!(!a.is_root());
    assert!(!a.dispose().unwrap());
    assert_eq!(a.namespace(), "mom.examples.Folder");

    store.dispose().unwrap();
    assert_eq!(a.state(), LifecycleState::Disposed);
    assert_eq!(leaf.state(), LifecycleState::Disposed);
}
