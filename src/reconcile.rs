//! Reconciler
//!
//! Keeps a tree's membership in line with the host's flat item list. The host
//! decides which items exist; the tree decides their order and nesting.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::hierarchy;
use crate::models::{HierarchyTree, NodeId};

/// What a reconcile pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Every id reachable from `root`, in pre-order
fn reachable_ids(tree: &HierarchyTree) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut stack: Vec<&str> = tree.root.iter().rev().map(String::as_str).collect();

    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        out.push(current.to_string());
        stack.extend(tree.children(current).iter().rev().map(String::as_str));
    }

    out
}

/// Synchronizes `tree` with `host_ids`.
///
/// Ids the host no longer reports are removed with their children promoted; ids
/// the tree has not seen are appended to `root` in host order. Existing entries
/// keep their relative order. Calling this twice with the same ids is a no-op the
/// second time.
pub fn reconcile(tree: &mut HierarchyTree, host_ids: &[NodeId]) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let host: HashSet<&str> = host_ids.iter().map(String::as_str).collect();

    // Meta that root cannot reach would never be rendered or pruned otherwise.
    let reachable: HashSet<NodeId> = reachable_ids(tree).into_iter().collect();
    tree.nodes.retain(|id, _| {
        let keep = reachable.contains(id);
        if !keep {
            tracing::debug!("Dropping unreachable meta for '{}'", id);
        }
        keep
    });

    for id in reachable_ids(tree) {
        if host.contains(id.as_str()) {
            continue;
        }
        match hierarchy::remove_node(tree, &id) {
            Ok(()) => report.removed.push(id),
            Err(e) => tracing::warn!("Could not prune '{}' during reconcile: {}", id, e),
        }
    }

    let mut known: HashSet<NodeId> = reachable_ids(tree).into_iter().collect();
    for id in host_ids {
        if known.insert(id.clone()) {
            tree.root.push(id.clone());
            report.added.push(id.clone());
        }
    }

    if !report.is_empty() {
        tracing::debug!(
            "Reconciled hierarchy: {} added, {} removed",
            report.added.len(),
            report.removed.len()
        );
    }
    report
}
