//! Core models for the prompt-hierarchy library
//!
//! This module contains the tree shape shared by every other component, the
//! host-facing item descriptor, and the error type returned by tree operations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a prompt item, unique within one context's item list
pub type NodeId = String;

/// Identifier of a host context (e.g. the active character)
pub type ContextId = String;

/// Key under which the top-level order is persisted. No node may store meta under it.
pub const RESERVED_ROOT_KEY: &str = "root";

/// Per-node metadata. Absent meta means "no children, expanded".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub children: Vec<NodeId>,
    pub collapsed: bool,
}

impl NodeMeta {
    /// True when this entry carries nothing beyond the implicit defaults
    pub fn is_default(&self) -> bool {
        self.children.is_empty() && !self.collapsed
    }
}

/// The nesting structure imposed on one context's flat item list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyTree {
    pub root: Vec<NodeId>,
    pub nodes: BTreeMap<NodeId, NodeMeta>,
}

impl HierarchyTree {
    /// Creates an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tree where every id is a top-level leaf, in the given order
    pub fn flat<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        Self {
            root: ids.into_iter().map(Into::into).collect(),
            nodes: BTreeMap::new(),
        }
    }

    /// Children of `id`, empty when the node has no meta
    pub fn children(&self, id: &str) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|meta| meta.children.as_slice())
            .unwrap_or(&[])
    }

    /// Whether `id` is marked collapsed
    pub fn is_collapsed(&self, id: &str) -> bool {
        self.nodes.get(id).map(|meta| meta.collapsed).unwrap_or(false)
    }

    /// Returns true when the tree references no nodes at all
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Drops the meta entry for `id` if it only holds defaults
    pub(crate) fn tidy_meta(&mut self, id: &str) {
        if self.nodes.get(id).is_some_and(NodeMeta::is_default) {
            self.nodes.remove(id);
        }
    }
}

/// An item as reported by the host's flat list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    pub identifier: NodeId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ItemDescriptor {
    pub fn new(identifier: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            enabled: true,
        }
    }
}

/// Extracts the identifiers of a host item list, preserving order
pub fn identifiers(items: &[ItemDescriptor]) -> Vec<NodeId> {
    items.iter().map(|item| item.identifier.clone()).collect()
}

/// Why a persisted record could not be turned back into a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum MalformedReason {
    #[error("record has the wrong shape: {0}")]
    Shape(String),

    #[error("node '{0}' appears more than once")]
    DuplicateNode(NodeId),

    #[error("node '{0}' is part of a cycle")]
    Cycle(NodeId),

    #[error("node '{0}' carries metadata but is not reachable from root")]
    Detached(NodeId),
}

/// Errors returned by tree operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
    #[error("node '{0}' not found in hierarchy")]
    NotFound(NodeId),

    #[error("moving '{node}' under '{parent}' would create a cycle")]
    Cycle { node: NodeId, parent: NodeId },

    #[error("node '{0}' is already in the hierarchy")]
    Duplicate(NodeId),

    #[error("'{0}' is reserved and cannot hold children or a collapsed flag")]
    ReservedIdentifier(NodeId),

    #[error("moving '{node}' would nest it {depth} levels deep (max {max})")]
    NestingTooDeep {
        node: NodeId,
        depth: usize,
        max: usize,
    },

    #[error("malformed hierarchy: {0}")]
    MalformedTree(#[from] MalformedReason),

    #[error("corrupt hierarchy: cycle detected while walking from '{0}'")]
    CorruptionDetected(NodeId),
}

pub type HierarchyResult<T> = Result<T, HierarchyError>;
