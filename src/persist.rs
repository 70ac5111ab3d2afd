//! Persisted tree records
//!
//! Converts a [`HierarchyTree`] to and from the record stored in the settings
//! blob. The JSON shape keeps the top-level order under `root` and each node's
//! meta under its own identifier:
//!
//! ```json
//! { "root": ["p1", "p3"], "p1": { "children": ["p2"], "collapsed": true } }
//! ```
//!
//! Only non-default meta is written. Loading is tolerant of missing fields but
//! refuses records that break the tree invariants.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::hierarchy;
use crate::models::{HierarchyError, HierarchyTree, MalformedReason, NodeId, NodeMeta};

/// Meta for one node as stored on disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedMeta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub collapsed: bool,
}

/// The stored form of one context's tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTree {
    #[serde(default)]
    pub root: Vec<NodeId>,
    #[serde(flatten)]
    pub nodes: BTreeMap<NodeId, PersistedMeta>,
}

/// Produces the minimal stored record for `tree`
pub fn to_persisted(tree: &HierarchyTree) -> PersistedTree {
    let nodes = tree
        .nodes
        .iter()
        .filter(|(_, meta)| !meta.is_default())
        .map(|(id, meta)| {
            (
                id.clone(),
                PersistedMeta {
                    children: meta.children.clone(),
                    collapsed: meta.collapsed,
                },
            )
        })
        .collect();

    PersistedTree {
        root: tree.root.clone(),
        nodes,
    }
}

/// Encodes `tree` as the JSON value kept in the settings blob
pub fn encode_record(tree: &HierarchyTree) -> Value {
    let record = to_persisted(tree);
    let mut map = Map::new();
    map.insert(
        "root".to_string(),
        Value::Array(record.root.into_iter().map(Value::String).collect()),
    );

    for (id, meta) in record.nodes {
        let mut entry = Map::new();
        if !meta.children.is_empty() {
            entry.insert(
                "children".to_string(),
                Value::Array(meta.children.into_iter().map(Value::String).collect()),
            );
        }
        if meta.collapsed {
            entry.insert("collapsed".to_string(), Value::Bool(true));
        }
        map.insert(id, Value::Object(entry));
    }
    Value::Object(map)
}

/// Decodes one context's stored JSON value into a tree.
///
/// A value that is not a tree record at all fails with [`MalformedReason::Shape`];
/// otherwise this behaves like [`from_persisted`].
pub fn decode_record(value: &Value) -> Result<HierarchyTree, HierarchyError> {
    let record = PersistedTree::deserialize(value)
        .map_err(|e| MalformedReason::Shape(e.to_string()))?;
    from_persisted(&record)
}

/// Rebuilds a tree from its stored record.
///
/// Entries that only carry defaults are dropped. A record whose tree would contain
/// a duplicate, a cycle or unreachable meta fails with
/// [`HierarchyError::MalformedTree`]; nothing is repaired.
pub fn from_persisted(record: &PersistedTree) -> Result<HierarchyTree, HierarchyError> {
    let nodes = record
        .nodes
        .iter()
        .map(|(id, meta)| {
            (
                id.clone(),
                NodeMeta {
                    children: meta.children.clone(),
                    collapsed: meta.collapsed,
                },
            )
        })
        .filter(|(_, meta)| !meta.is_default())
        .collect();

    let tree = HierarchyTree {
        root: record.root.clone(),
        nodes,
    };
    hierarchy::validate(&tree)?;
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MalformedReason;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn nested() -> HierarchyTree {
        let mut tree = HierarchyTree::flat(["p1", "p3"]);
        tree.nodes.insert(
            "p1".into(),
            NodeMeta {
                children: vec!["p2".into()],
                collapsed: true,
            },
        );
        tree.nodes.insert(
            "p3".into(),
            NodeMeta {
                children: Vec::new(),
                collapsed: true,
            },
        );
        tree
    }

    #[test]
    fn test_json_shape_omits_defaults() {
        let mut tree = nested();
        tree.nodes.get_mut("p1").unwrap().collapsed = false;

        let value = serde_json::to_value(to_persisted(&tree)).unwrap();
        assert_eq!(
            value,
            json!({
                "root": ["p1", "p3"],
                "p1": { "children": ["p2"] },
                "p3": { "collapsed": true }
            })
        );
    }

    #[test]
    fn test_round_trip() {
        let tree = nested();
        let restored = from_persisted(&to_persisted(&tree)).unwrap();
        assert_eq!(restored, tree);
    }

    #[test]
    fn test_loading_tolerates_missing_fields() {
        let record: PersistedTree = serde_json::from_value(json!({
            "root": ["a", "b"],
            "a": { "children": ["c"] },
            "b": {}
        }))
        .unwrap();

        let tree = from_persisted(&record).unwrap();
        assert_eq!(tree.children("a"), ["c".to_string()]);
        assert!(!tree.is_collapsed("a"));
        assert!(!tree.nodes.contains_key("b"));
    }

    #[test]
    fn test_loading_rejects_duplicates_and_cycles() {
        let duplicate: PersistedTree = serde_json::from_value(json!({
            "root": ["a", "b"],
            "a": { "children": ["b"] }
        }))
        .unwrap();
        assert_eq!(
            from_persisted(&duplicate),
            Err(HierarchyError::MalformedTree(MalformedReason::DuplicateNode(
                "b".into()
            )))
        );

        let self_parent: PersistedTree = serde_json::from_value(json!({
            "root": ["a"],
            "a": { "children": ["a"] }
        }))
        .unwrap();
        assert!(matches!(
            from_persisted(&self_parent),
            Err(HierarchyError::MalformedTree(_))
        ));

        let cycle: PersistedTree = serde_json::from_value(json!({
            "root": [],
            "x": { "children": ["y"] },
            "y": { "children": ["x"] }
        }))
        .unwrap();
        assert_eq!(
            from_persisted(&cycle),
            Err(HierarchyError::MalformedTree(MalformedReason::Cycle(
                "x".into()
            )))
        );
    }

    #[test]
    fn test_encoded_record_matches_stored_shape() {
        let tree = nested();
        let value = encode_record(&tree);

        assert_eq!(value, serde_json::to_value(to_persisted(&tree)).unwrap());
        assert_eq!(decode_record(&value).unwrap(), tree);
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        // Older writers stored a numeric `level` next to the meta entries.
        let value = json!({ "children": [], "level": 1 });
        assert!(matches!(
            decode_record(&value),
            Err(HierarchyError::MalformedTree(MalformedReason::Shape(_)))
        ));

        assert!(matches!(
            decode_record(&json!("root")),
            Err(HierarchyError::MalformedTree(MalformedReason::Shape(_)))
        ));
    }

    #[test]
    fn test_missing_root_loads_as_empty() {
        let record: PersistedTree = serde_json::from_value(json!({})).unwrap();
        assert_eq!(from_persisted(&record).unwrap(), HierarchyTree::new());
    }
}
