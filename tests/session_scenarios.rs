use pretty_assertions::assert_eq;
use prompt_hierarchy::projection::ProjectedNode;
use prompt_hierarchy::settings::{JsonFileStore, MemoryStore, SettingsStore};
use prompt_hierarchy::{Core, HierarchyError, HierarchyTree, HostEvent, ItemDescriptor, Settings};

fn items(ids: &[&str]) -> Vec<ItemDescriptor> {
    ids.iter()
        .map(|id| ItemDescriptor::new(*id, format!("Prompt {}", id)))
        .collect()
}

fn rows(projection: &[ProjectedNode]) -> Vec<(&str, usize, bool)> {
    projection
        .iter()
        .map(|n| (n.identifier.as_str(), n.depth, n.visible))
        .collect()
}

fn fresh_core() -> Core {
    Core::load(&MemoryStore::new()).unwrap()
}

#[test]
fn test_drag_then_collapse() {
    let core = fresh_core();
    core.activate("alice", &items(&["p1", "p2", "p3"]));

    core.move_node("alice", "p2", 1, 0, Some("p1")).unwrap();
    assert_eq!(
        rows(&core.project("alice")),
        vec![("p1", 0, true), ("p2", 1, true), ("p3", 0, true)]
    );

    assert!(core.toggle_collapse("alice", "p1").unwrap());
    assert_eq!(
        rows(&core.project("alice")),
        vec![("p1", 0, true), ("p2", 1, false), ("p3", 0, true)]
    );
}

#[test]
fn test_host_deletes_parent() {
    let core = fresh_core();
    core.activate("alice", &items(&["p1", "p2", "p3"]));
    core.move_node("alice", "p2", 1, 0, Some("p1")).unwrap();

    let report = core.handle(HostEvent::ListChanged {
        context: "alice".into(),
        items: items(&["p2", "p3"]),
    });

    assert_eq!(report.removed, vec!["p1"]);
    assert_eq!(core.tree("alice"), HierarchyTree::flat(["p2", "p3"]));
}

#[test]
fn test_removing_group_promotes_all_children() {
    let core = fresh_core();
    core.sync("c", &items(&["a", "b", "c"]));
    core.move_node("c", "b", 1, 0, Some("a")).unwrap();
    core.move_node("c", "c", 1, 1, Some("a")).unwrap();

    core.sync("c", &items(&["b", "c"]));

    assert_eq!(core.tree("c"), HierarchyTree::flat(["b", "c"]));
}

#[test]
fn test_new_host_items_append_at_top_level() {
    let core = fresh_core();
    core.sync("c", &items(&["a", "b"]));
    core.nest_node("c", "b", "a").unwrap();

    let report = core.sync("c", &items(&["new", "a", "b"]));

    assert_eq!(report.added, vec!["new"]);
    let tree = core.tree("c");
    assert_eq!(tree.root, vec!["a", "new"]);
    assert_eq!(tree.children("a"), ["b".to_string()]);
}

#[test]
fn test_contexts_keep_separate_trees() {
    let core = fresh_core();
    core.activate("alice", &items(&["p1", "p2"]));
    core.nest_node("alice", "p2", "p1").unwrap();

    core.activate("bob", &items(&["p1", "p2"]));
    assert_eq!(core.tree("bob"), HierarchyTree::flat(["p1", "p2"]));

    core.activate("alice", &items(&["p1", "p2"]));
    assert_eq!(core.tree("alice").children("p1"), ["p2".to_string()]);
    assert_eq!(core.active_context().as_deref(), Some("alice"));
}

#[test]
fn test_rejected_move_keeps_tree() {
    let core = fresh_core();
    core.sync("c", &items(&["a", "b"]));
    core.nest_node("c", "b", "a").unwrap();
    let before = core.tree("c");

    let err = core.move_node("c", "a", 0, 0, Some("b")).unwrap_err();

    assert_eq!(
        err,
        HierarchyError::Cycle {
            node: "a".into(),
            parent: "b".into()
        }
    );
    assert_eq!(core.tree("c"), before);
}

#[test]
fn test_malformed_stored_tree_is_reseeded_from_host() {
    let mut settings = Settings::default();
    settings.prompt_hierarchy.insert(
        "alice".into(),
        serde_json::json!({ "root": ["x"], "x": { "children": ["x"], "collapsed": true } }),
    );
    let core = Core::load(&MemoryStore::with_settings(settings)).unwrap();

    core.activate("alice", &items(&["x", "y"]));

    assert_eq!(core.tree("alice"), HierarchyTree::flat(["x", "y"]));
    assert_eq!(
        core.settings().prompt_hierarchy["alice"],
        serde_json::json!({ "root": ["x", "y"] })
    );
}

#[test]
fn test_bad_record_beside_good_one_still_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{
            "promptHierarchy": {
                "alice": { "root": ["p1", "p3"], "p1": { "children": ["p2"], "collapsed": true } },
                "bob": { "children": [], "level": 1 }
            }
        }"#,
    )
    .unwrap();
    let store = JsonFileStore::new(&path);

    let core = Core::load(&store).unwrap();
    core.activate("bob", &items(&["b1", "b2"]));
    core.activate("alice", &items(&["p1", "p2", "p3"]));

    assert_eq!(core.tree("bob"), HierarchyTree::flat(["b1", "b2"]));
    assert_eq!(
        rows(&core.project("alice")),
        vec![("p1", 0, true), ("p2", 1, false), ("p3", 0, true)]
    );
    assert!(core
        .history()
        .iter()
        .any(|entry| entry.action == "discard_malformed"));

    core.flush_to(&store).unwrap();
    let saved = store.load().unwrap();
    assert_eq!(
        saved.prompt_hierarchy["bob"],
        serde_json::json!({ "root": ["b1", "b2"] })
    );
}

#[test]
fn test_unknown_contexts_are_not_created_by_reads() {
    let core = fresh_core();
    core.sync("alice", &items(&["p1"]));
    let before = core.contexts();

    assert!(core.project("typo-1").is_empty());
    assert_eq!(core.tree("typo-2"), HierarchyTree::new());

    assert_eq!(core.contexts(), before);
    assert_eq!(before, vec!["alice", "global"]);
}

#[test]
fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("settings.json"));

    let core = Core::load(&store).unwrap();
    core.activate("alice", &items(&["p1", "p2", "p3"]));
    core.move_node("alice", "p3", 2, 0, Some("p1")).unwrap();
    core.toggle_collapse("alice", "p1").unwrap();
    core.flush_to(&store).unwrap();
    core.teardown();

    let restarted = Core::load(&store).unwrap();
    restarted.activate("alice", &items(&["p1", "p2", "p3"]));

    assert_eq!(
        rows(&restarted.project("alice")),
        vec![("p1", 0, true), ("p3", 1, false), ("p2", 0, true)]
    );

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(
        raw["promptHierarchy"]["alice"],
        serde_json::json!({
            "root": ["p1", "p2"],
            "p1": { "children": ["p3"], "collapsed": true }
        })
    );
}

#[test]
fn test_projection_ignores_collapse_when_disabled() {
    let mut settings = Settings::default();
    settings.enabled = false;
    let core = Core::load(&MemoryStore::with_settings(settings)).unwrap();

    core.sync("c", &items(&["a", "b"]));
    core.nest_node("c", "b", "a").unwrap();

    assert_eq!(rows(&core.project("c")), vec![("a", 0, true), ("b", 1, true)]);
}

#[test]
fn test_arrange_uses_host_descriptors() {
    let core = fresh_core();
    core.sync("c", &items(&["a", "b", "c"]));
    core.move_node("c", "c", 2, 0, None).unwrap();

    let arranged = core.arrange("c", &items(&["a", "b", "c"]));
    let names: Vec<&str> = arranged.iter().map(|a| a.item.name.as_str()).collect();

    assert_eq!(names, vec!["Prompt c", "Prompt a", "Prompt b"]);
}
