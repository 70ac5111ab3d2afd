//! Hierarchy engine
//!
//! Read and write operations over a single [`HierarchyTree`]. Every mutation is
//! validated up front; when validation fails the tree is left untouched. Parent
//! links are never stored, they are derived by scanning `root` and the children
//! lists, and every walk is an explicit loop bounded by a visited set.

use std::collections::{HashMap, HashSet};

use crate::models::{
    HierarchyError, HierarchyResult, HierarchyTree, MalformedReason, NodeId, RESERVED_ROOT_KEY,
};

/// Where a node currently sits: its parent (`None` for root) and its index there
type Slot = (Option<NodeId>, usize);

/// Returns true when `id` appears in `root` or in any children list
pub fn contains(tree: &HierarchyTree, id: &str) -> bool {
    tree.root.iter().any(|n| n == id)
        || tree
            .nodes
            .values()
            .any(|meta| meta.children.iter().any(|n| n == id))
}

/// Finds the parent of `id` by linear scan.
///
/// Returns `None` both for root entries and for unknown ids.
pub fn find_parent<'a>(tree: &'a HierarchyTree, id: &str) -> Option<&'a str> {
    if tree.root.iter().any(|n| n == id) {
        return None;
    }
    tree.nodes
        .iter()
        .find(|(_, meta)| meta.children.iter().any(|n| n == id))
        .map(|(parent, _)| parent.as_str())
}

/// Maps each child to its parent. The first parent in key order wins, matching [`find_parent`].
fn parent_links(tree: &HierarchyTree) -> HashMap<&str, &str> {
    let mut links = HashMap::new();
    for (parent, meta) in &tree.nodes {
        for child in &meta.children {
            links.entry(child.as_str()).or_insert(parent.as_str());
        }
    }
    links
}

/// Computes the depth of `id`, reporting a cycle as [`HierarchyError::CorruptionDetected`]
pub fn try_depth(tree: &HierarchyTree, id: &str) -> HierarchyResult<usize> {
    if !contains(tree, id) {
        return Err(HierarchyError::NotFound(id.to_string()));
    }

    let roots: HashSet<&str> = tree.root.iter().map(String::as_str).collect();
    let links = parent_links(tree);
    let mut visited = HashSet::from([id]);
    let mut current = id;
    let mut depth = 0;

    while !roots.contains(current) {
        let Some(&parent) = links.get(current) else {
            break;
        };
        if !visited.insert(parent) {
            return Err(HierarchyError::CorruptionDetected(id.to_string()));
        }
        depth += 1;
        current = parent;
    }

    Ok(depth)
}

/// Depth of `id` for rendering purposes. Never fails: unknown ids and corrupt
/// trees both yield 0, the latter with a warning.
pub fn compute_depth(tree: &HierarchyTree, id: &str) -> usize {
    match try_depth(tree, id) {
        Ok(depth) => depth,
        Err(HierarchyError::CorruptionDetected(node)) => {
            tracing::warn!("Cycle detected while computing depth of '{}', using 0", node);
            0
        }
        Err(_) => 0,
    }
}

/// All descendants of `id` in pre-order, excluding `id` itself
pub fn descendants(tree: &HierarchyTree, id: &str) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut visited = HashSet::from([id.to_string()]);
    let mut stack: Vec<&str> = tree.children(id).iter().rev().map(String::as_str).collect();

    while let Some(current) = stack.pop() {
        if !visited.insert(current.to_string()) {
            continue;
        }
        out.push(current.to_string());
        stack.extend(tree.children(current).iter().rev().map(String::as_str));
    }

    out
}

/// Number of levels below `id` (0 for a leaf)
pub fn subtree_height(tree: &HierarchyTree, id: &str) -> usize {
    let mut height = 0;
    let mut visited = HashSet::from([id]);
    let mut stack = vec![(id, 0usize)];

    while let Some((current, level)) = stack.pop() {
        height = height.max(level);
        for child in tree.children(current) {
            if visited.insert(child.as_str()) {
                stack.push((child.as_str(), level + 1));
            }
        }
    }

    height
}

fn locate(tree: &HierarchyTree, id: &str) -> Option<Slot> {
    if let Some(pos) = tree.root.iter().position(|n| n == id) {
        return Some((None, pos));
    }
    tree.nodes.iter().find_map(|(parent, meta)| {
        meta.children
            .iter()
            .position(|n| n == id)
            .map(|pos| (Some(parent.clone()), pos))
    })
}

fn container<'a>(tree: &'a HierarchyTree, parent: Option<&str>) -> &'a [NodeId] {
    match parent {
        None => &tree.root,
        Some(p) => tree.children(p),
    }
}

fn container_mut<'a>(tree: &'a mut HierarchyTree, parent: Option<&str>) -> &'a mut Vec<NodeId> {
    match parent {
        None => &mut tree.root,
        Some(p) => &mut tree.nodes.entry(p.to_string()).or_default().children,
    }
}

/// Checks that `parent` may receive `node` as a child
fn check_new_parent(tree: &HierarchyTree, node: &str, parent: &str) -> HierarchyResult<()> {
    if parent == node {
        return Err(HierarchyError::Cycle {
            node: node.to_string(),
            parent: parent.to_string(),
        });
    }
    if !contains(tree, parent) {
        return Err(HierarchyError::NotFound(parent.to_string()));
    }
    if parent == RESERVED_ROOT_KEY {
        return Err(HierarchyError::ReservedIdentifier(parent.to_string()));
    }
    if descendants(tree, node).iter().any(|d| d == parent) {
        return Err(HierarchyError::Cycle {
            node: node.to_string(),
            parent: parent.to_string(),
        });
    }
    Ok(())
}

/// Moves `node` to `to_index` under `new_parent` (root when `None`).
///
/// `from_index` is a hint for the node's current position; when it does not point
/// at `node` the actual position is used. `to_index` is applied after the node has
/// been detached and is clamped to the destination length.
pub fn move_node(
    tree: &mut HierarchyTree,
    node: &str,
    from_index: usize,
    to_index: usize,
    new_parent: Option<&str>,
) -> HierarchyResult<()> {
    let (old_parent, actual) =
        locate(tree, node).ok_or_else(|| HierarchyError::NotFound(node.to_string()))?;
    if let Some(parent) = new_parent {
        check_new_parent(tree, node, parent)?;
    }

    let position = match container(tree, old_parent.as_deref()).get(from_index) {
        Some(at) if at == node => from_index,
        _ => {
            tracing::debug!(
                "Index {} does not hold '{}', using its position {}",
                from_index,
                node,
                actual
            );
            actual
        }
    };

    container_mut(tree, old_parent.as_deref()).remove(position);
    if let Some(parent) = &old_parent {
        tree.tidy_meta(parent);
    }

    let destination = container_mut(tree, new_parent);
    let index = to_index.min(destination.len());
    destination.insert(index, node.to_string());

    tracing::debug!(
        "Moved '{}' from {:?}[{}] to {:?}[{}]",
        node,
        old_parent,
        position,
        new_parent,
        index
    );
    Ok(())
}

/// Makes `node` the last child of `target`
pub fn nest_node(tree: &mut HierarchyTree, node: &str, target: &str) -> HierarchyResult<()> {
    let (_, from) =
        locate(tree, node).ok_or_else(|| HierarchyError::NotFound(node.to_string()))?;
    let to = tree.children(target).len();
    move_node(tree, node, from, to, Some(target))
}

/// Inserts a node that is not yet part of the tree
pub fn insert_node(
    tree: &mut HierarchyTree,
    node: &str,
    parent: Option<&str>,
    index: usize,
) -> HierarchyResult<()> {
    if contains(tree, node) {
        return Err(HierarchyError::Duplicate(node.to_string()));
    }
    if let Some(parent) = parent {
        if !contains(tree, parent) {
            return Err(HierarchyError::NotFound(parent.to_string()));
        }
        if parent == RESERVED_ROOT_KEY {
            return Err(HierarchyError::ReservedIdentifier(parent.to_string()));
        }
    }

    let destination = container_mut(tree, parent);
    let index = index.min(destination.len());
    destination.insert(index, node.to_string());
    Ok(())
}

/// Detaches `node` and splices its children into the slot it occupied
pub fn remove_node(tree: &mut HierarchyTree, node: &str) -> HierarchyResult<()> {
    let (parent, position) =
        locate(tree, node).ok_or_else(|| HierarchyError::NotFound(node.to_string()))?;
    if parent.as_deref() == Some(node) {
        return Err(HierarchyError::CorruptionDetected(node.to_string()));
    }

    let promoted = tree
        .nodes
        .remove(node)
        .map(|meta| meta.children)
        .unwrap_or_default();
    let promoted_count = promoted.len();

    container_mut(tree, parent.as_deref()).splice(position..position + 1, promoted);
    if let Some(parent) = &parent {
        tree.tidy_meta(parent);
    }

    tracing::debug!(
        "Removed '{}', promoted {} children into {:?}",
        node,
        promoted_count,
        parent
    );
    Ok(())
}

/// Flips the collapsed flag of `node`, returning the new state
pub fn toggle_collapse(tree: &mut HierarchyTree, node: &str) -> HierarchyResult<bool> {
    if !contains(tree, node) {
        return Err(HierarchyError::NotFound(node.to_string()));
    }
    if node == RESERVED_ROOT_KEY {
        return Err(HierarchyError::ReservedIdentifier(node.to_string()));
    }

    let meta = tree.nodes.entry(node.to_string()).or_default();
    meta.collapsed = !meta.collapsed;
    let collapsed = meta.collapsed;
    tree.tidy_meta(node);

    Ok(collapsed)
}

/// Checks uniqueness of parentage, absence of cycles and reachability of all meta
pub fn validate(tree: &HierarchyTree) -> HierarchyResult<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    let appearances = tree
        .root
        .iter()
        .chain(tree.nodes.values().flat_map(|meta| meta.children.iter()));
    for id in appearances {
        if !seen.insert(id.as_str()) {
            return Err(MalformedReason::DuplicateNode(id.clone()).into());
        }
    }

    // With unique appearances, everything reachable from root forms a proper tree.
    let mut reachable: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = tree.root.iter().map(String::as_str).collect();
    while let Some(current) = stack.pop() {
        if reachable.insert(current) {
            stack.extend(tree.children(current).iter().map(String::as_str));
        }
    }

    let links = parent_links(tree);
    for key in tree.nodes.keys() {
        if reachable.contains(key.as_str()) {
            continue;
        }
        let mut visited = HashSet::from([key.as_str()]);
        let mut current = key.as_str();
        while let Some(&parent) = links.get(current) {
            if !visited.insert(parent) {
                return Err(MalformedReason::Cycle(key.clone()).into());
            }
            current = parent;
        }
        return Err(MalformedReason::Detached(key.clone()).into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeMeta;
    use pretty_assertions::assert_eq;

    fn meta(children: &[&str]) -> NodeMeta {
        NodeMeta {
            children: children.iter().map(|c| c.to_string()).collect(),
            collapsed: false,
        }
    }

    /// a
    /// ├─ b
    /// │  └─ d
    /// └─ c
    /// e
    fn sample() -> HierarchyTree {
        let mut tree = HierarchyTree::flat(["a", "e"]);
        tree.nodes.insert("a".into(), meta(&["b", "c"]));
        tree.nodes.insert("b".into(), meta(&["d"]));
        tree
    }

    #[test]
    fn test_find_parent_and_depth() {
        let tree = sample();
        assert_eq!(find_parent(&tree, "a"), None);
        assert_eq!(find_parent(&tree, "b"), Some("a"));
        assert_eq!(find_parent(&tree, "d"), Some("b"));
        assert_eq!(find_parent(&tree, "zzz"), None);

        assert_eq!(compute_depth(&tree, "a"), 0);
        assert_eq!(compute_depth(&tree, "c"), 1);
        assert_eq!(compute_depth(&tree, "d"), 2);
        assert_eq!(compute_depth(&tree, "zzz"), 0);
    }

    #[test]
    fn test_depth_on_cycle_falls_back_to_zero() {
        let mut tree = HierarchyTree::flat(["a"]);
        tree.nodes.insert("x".into(), meta(&["y"]));
        tree.nodes.insert("y".into(), meta(&["x"]));

        assert_eq!(
            try_depth(&tree, "x"),
            Err(HierarchyError::CorruptionDetected("x".into()))
        );
        assert_eq!(compute_depth(&tree, "x"), 0);
    }

    #[test]
    fn test_descendants_and_height() {
        let tree = sample();
        assert_eq!(descendants(&tree, "a"), vec!["b", "d", "c"]);
        assert!(descendants(&tree, "e").is_empty());
        assert_eq!(subtree_height(&tree, "a"), 2);
        assert_eq!(subtree_height(&tree, "b"), 1);
        assert_eq!(subtree_height(&tree, "e"), 0);
    }

    #[test]
    fn test_move_under_new_parent() {
        let mut tree = HierarchyTree::flat(["p1", "p2", "p3"]);
        move_node(&mut tree, "p2", 1, 0, Some("p1")).unwrap();

        assert_eq!(tree.root, vec!["p1", "p3"]);
        assert_eq!(tree.children("p1"), ["p2".to_string()]);
        assert_eq!(compute_depth(&tree, "p2"), 1);
    }

    #[test]
    fn test_move_back_to_root_drops_empty_meta() {
        let mut tree = HierarchyTree::flat(["p1", "p2"]);
        move_node(&mut tree, "p2", 1, 0, Some("p1")).unwrap();
        move_node(&mut tree, "p2", 0, 5, None).unwrap();

        assert_eq!(tree, HierarchyTree::flat(["p1", "p2"]));
    }

    #[test]
    fn test_move_reorders_within_root_with_stale_from_index() {
        let mut tree = HierarchyTree::flat(["a", "b", "c"]);
        // index 0 holds "a", so the real position of "c" is used
        move_node(&mut tree, "c", 0, 0, None).unwrap();
        assert_eq!(tree.root, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_move_rejects_self_and_descendant_parents() {
        let mut tree = sample();
        let before = tree.clone();

        assert!(matches!(
            move_node(&mut tree, "a", 0, 0, Some("a")),
            Err(HierarchyError::Cycle { .. })
        ));
        assert!(matches!(
            move_node(&mut tree, "a", 0, 0, Some("d")),
            Err(HierarchyError::Cycle { .. })
        ));
        assert_eq!(tree, before);
    }

    #[test]
    fn test_move_rejects_unknown_ids() {
        let mut tree = sample();
        let before = tree.clone();

        assert_eq!(
            move_node(&mut tree, "ghost", 0, 0, None),
            Err(HierarchyError::NotFound("ghost".into()))
        );
        assert_eq!(
            move_node(&mut tree, "e", 1, 0, Some("ghost")),
            Err(HierarchyError::NotFound("ghost".into()))
        );
        assert_eq!(tree, before);
    }

    #[test]
    fn test_move_under_reserved_root_key_is_rejected() {
        let mut tree = HierarchyTree::flat(["root", "a"]);
        assert_eq!(
            move_node(&mut tree, "a", 1, 0, Some("root")),
            Err(HierarchyError::ReservedIdentifier("root".into()))
        );
        assert_eq!(tree, HierarchyTree::flat(["root", "a"]));
    }

    #[test]
    fn test_nest_node_appends_last_child() {
        let mut tree = sample();
        nest_node(&mut tree, "e", "a").unwrap();
        assert_eq!(tree.children("a"), ["b", "c", "e"].map(String::from));

        // nesting an existing child again keeps it last
        nest_node(&mut tree, "b", "a").unwrap();
        assert_eq!(tree.children("a"), ["c", "e", "b"].map(String::from));
    }

    #[test]
    fn test_insert_node() {
        let mut tree = sample();
        insert_node(&mut tree, "f", Some("b"), 0).unwrap();
        assert_eq!(tree.children("b"), ["f", "d"].map(String::from));

        assert_eq!(
            insert_node(&mut tree, "f", None, 0),
            Err(HierarchyError::Duplicate("f".into()))
        );
        assert_eq!(
            insert_node(&mut tree, "g", Some("ghost"), 0),
            Err(HierarchyError::NotFound("ghost".into()))
        );
    }

    #[test]
    fn test_remove_promotes_children_in_place() {
        let mut tree = HierarchyTree::flat(["A"]);
        tree.nodes.insert("A".into(), meta(&["B", "C"]));

        remove_node(&mut tree, "A").unwrap();
        assert_eq!(tree, HierarchyTree::flat(["B", "C"]));
    }

    #[test]
    fn test_remove_nested_node_promotes_into_parent() {
        let mut tree = sample();
        remove_node(&mut tree, "b").unwrap();

        assert_eq!(tree.children("a"), ["d", "c"].map(String::from));
        assert!(!tree.nodes.contains_key("b"));
        validate(&tree).unwrap();
    }

    #[test]
    fn test_remove_last_child_drops_parent_meta() {
        let mut tree = HierarchyTree::flat(["a"]);
        tree.nodes.insert("a".into(), meta(&["b"]));
        remove_node(&mut tree, "b").unwrap();
        assert_eq!(tree, HierarchyTree::flat(["a"]));
    }

    #[test]
    fn test_toggle_collapse_is_an_involution() {
        let mut tree = sample();
        let before = tree.clone();

        assert_eq!(toggle_collapse(&mut tree, "e"), Ok(true));
        assert!(tree.is_collapsed("e"));
        assert_eq!(toggle_collapse(&mut tree, "e"), Ok(false));
        assert_eq!(tree, before);

        assert_eq!(
            toggle_collapse(&mut tree, "ghost"),
            Err(HierarchyError::NotFound("ghost".into()))
        );
    }

    #[test]
    fn test_validate_reports_each_violation() {
        validate(&sample()).unwrap();

        let mut duplicate = sample();
        duplicate.root.push("d".into());
        assert_eq!(
            validate(&duplicate),
            Err(HierarchyError::MalformedTree(MalformedReason::DuplicateNode("d".into())))
        );

        let mut cycle = HierarchyTree::flat(["a"]);
        cycle.nodes.insert("x".into(), meta(&["y"]));
        cycle.nodes.insert("y".into(), meta(&["x"]));
        assert_eq!(
            validate(&cycle),
            Err(HierarchyError::MalformedTree(MalformedReason::Cycle("x".into())))
        );

        let mut detached = HierarchyTree::flat(["a"]);
        detached.nodes.insert("x".into(), meta(&["y"]));
        assert_eq!(
            validate(&detached),
            Err(HierarchyError::MalformedTree(MalformedReason::Detached("x".into())))
        );
    }
}
