//! Tree store
//!
//! A plain container mapping context ids to their hierarchy trees. It performs no
//! validation; the engine and reconciler are responsible for keeping trees sound.

use std::collections::HashMap;

use crate::models::{ContextId, HierarchyTree};

#[derive(Debug, Clone, Default)]
pub struct TreeStore {
    trees: HashMap<ContextId, HierarchyTree>,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the tree for `context`, creating an empty one if none exists yet
    pub fn get(&mut self, context: &str) -> &mut HierarchyTree {
        self.trees.entry(context.to_string()).or_default()
    }

    /// Returns the tree for `context` without creating it
    pub fn peek(&self, context: &str) -> Option<&HierarchyTree> {
        self.trees.get(context)
    }

    pub fn set(&mut self, context: &str, tree: HierarchyTree) {
        self.trees.insert(context.to_string(), tree);
    }

    pub fn has(&self, context: &str) -> bool {
        self.trees.contains_key(context)
    }

    /// Evicts a single context, returning its tree
    pub fn remove(&mut self, context: &str) -> Option<HierarchyTree> {
        self.trees.remove(context)
    }

    /// Drops every tree (teardown)
    pub fn clear(&mut self) {
        self.trees.clear();
    }

    /// Context ids currently held, sorted for stable output
    pub fn contexts(&self) -> Vec<ContextId> {
        let mut ids: Vec<ContextId> = self.trees.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}
