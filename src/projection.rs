//! Projection
//!
//! Flattens a tree into the depth-annotated sequence a rendering layer draws.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{HierarchyTree, ItemDescriptor, NodeId};

/// One row of the rendered hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedNode {
    pub identifier: NodeId,
    pub depth: usize,
    /// False when some ancestor is collapsed
    pub visible: bool,
    pub collapsed: bool,
    pub has_children: bool,
}

impl ProjectedNode {
    /// Left indent in pixels for the given per-level indent size
    pub fn indent(&self, indent_size: u32) -> u32 {
        (self.depth as u32).saturating_mul(indent_size)
    }
}

/// Pre-order walk of `tree` starting from `root`.
///
/// Every node is emitted exactly once, hidden ones included. Sibling order is
/// array order.
pub fn project(tree: &HierarchyTree) -> Vec<ProjectedNode> {
    let mut out = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    // (id, depth, hidden by an ancestor)
    let mut stack: Vec<(&str, usize, bool)> = tree
        .root
        .iter()
        .rev()
        .map(|id| (id.as_str(), 0, false))
        .collect();

    while let Some((id, depth, hidden)) = stack.pop() {
        if !seen.insert(id) {
            tracing::warn!("Node '{}' reached twice while projecting, skipping", id);
            continue;
        }

        let children = tree.children(id);
        let collapsed = tree.is_collapsed(id);
        out.push(ProjectedNode {
            identifier: id.to_string(),
            depth,
            visible: !hidden,
            collapsed,
            has_children: !children.is_empty(),
        });

        let hide_children = hidden || collapsed;
        stack.extend(
            children
                .iter()
                .rev()
                .map(|child| (child.as_str(), depth + 1, hide_children)),
        );
    }

    out
}

/// Like [`project`], but every node is visible. Used when collapsing is turned off.
pub fn project_expanded(tree: &HierarchyTree) -> Vec<ProjectedNode> {
    project(tree)
        .into_iter()
        .map(|node| ProjectedNode {
            visible: true,
            ..node
        })
        .collect()
}

/// A host item placed in hierarchy order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrangedItem {
    pub item: ItemDescriptor,
    pub depth: usize,
    pub visible: bool,
    pub collapsed: bool,
    pub has_children: bool,
}

/// Orders the host's items by the hierarchy.
///
/// Tree ids the host no longer reports are skipped; host items the tree has not
/// seen yet follow at depth 0, in host order.
pub fn arrange(projection: &[ProjectedNode], items: &[ItemDescriptor]) -> Vec<ArrangedItem> {
    let by_id: HashMap<&str, &ItemDescriptor> = items
        .iter()
        .map(|item| (item.identifier.as_str(), item))
        .collect();

    let mut placed: HashSet<&str> = HashSet::new();
    let mut out: Vec<ArrangedItem> = projection
        .iter()
        .filter_map(|node| {
            let item = by_id.get(node.identifier.as_str()).copied()?;
            placed.insert(item.identifier.as_str());
            Some(ArrangedItem {
                item: item.clone(),
                depth: node.depth,
                visible: node.visible,
                collapsed: node.collapsed,
                has_children: node.has_children,
            })
        })
        .collect();

    for item in items {
        if placed.insert(item.identifier.as_str()) {
            out.push(ArrangedItem {
                item: item.clone(),
                depth: 0,
                visible: true,
                collapsed: false,
                has_children: false,
            });
        }
    }

    out
}
