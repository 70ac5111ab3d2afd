//! Session and core
//!
//! [`Session`] owns the tree store and the settings blob and turns each host event
//! or UI command into one synchronous reconcile, mutate and persist step.
//! [`Core`] shares a session between tasks: every call takes the lock once, so
//! two operations never interleave, and successful changes are broadcast.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hierarchy;
use crate::models::{
    identifiers, ContextId, HierarchyError, HierarchyResult, HierarchyTree, ItemDescriptor,
};
use crate::persist::{decode_record, encode_record, to_persisted, PersistedTree};
use crate::projection::{self, ArrangedItem, ProjectedNode};
use crate::reconcile::{reconcile, ReconcileReport};
use crate::settings::{Settings, SettingsError, SettingsStore};
use crate::store::TreeStore;

/// Notifications delivered by the host application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// The active context changed; `items` is the new context's flat list
    ContextSwitched {
        context: ContextId,
        items: Vec<ItemDescriptor>,
    },
    /// The flat list of `context` was mutated
    ListChanged {
        context: ContextId,
        items: Vec<ItemDescriptor>,
    },
}

impl HostEvent {
    pub fn context(&self) -> &str {
        match self {
            HostEvent::ContextSwitched { context, .. } | HostEvent::ListChanged { context, .. } => {
                context
            }
        }
    }
}

/// Represents a single processed operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub details: Option<String>,
}

impl TransitionLogEntry {
    pub fn new(action: String, details: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            details,
        }
    }
}

// Define the maximum size for the history buffer
const MAX_HISTORY_SIZE: usize = 20;

/// Hierarchy state for every context the host has shown us
pub struct Session {
    store: TreeStore,
    settings: Settings,
    active: Option<ContextId>,
    history: VecDeque<TransitionLogEntry>,
}

impl Session {
    /// Creates a session over previously persisted settings. Trees are loaded lazily.
    pub fn new(settings: Settings) -> Self {
        Self {
            store: TreeStore::new(),
            settings,
            active: None,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    /// Settings with every touched tree written back into `prompt_hierarchy`
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn active_context(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn history(&self) -> Vec<TransitionLogEntry> {
        self.history.iter().cloned().collect()
    }

    /// Context ids that are loaded or persisted
    pub fn contexts(&self) -> Vec<ContextId> {
        let mut ids = self.store.contexts();
        ids.extend(self.settings.prompt_hierarchy.keys().cloned());
        ids.sort();
        ids.dedup();
        ids
    }

    /// Logs an operation, maintaining the history buffer size.
    fn log_transition(&mut self, action: &str, details: Option<String>) {
        if self.history.len() == MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history
            .push_back(TransitionLogEntry::new(action.to_string(), details));
    }

    /// Brings the persisted tree for `context` into the store on first access.
    ///
    /// A malformed record is dropped from the settings; the next reconcile reseeds
    /// the context and writes a fresh record.
    fn ensure_loaded(&mut self, context: &str) {
        if self.store.has(context) {
            return;
        }

        let tree = match self.settings.prompt_hierarchy.get(context).map(decode_record) {
            Some(Ok(tree)) => tree,
            Some(Err(e)) => {
                tracing::warn!(
                    "Discarding stored hierarchy for context '{}': {}",
                    context,
                    e
                );
                self.log_transition(
                    "discard_malformed",
                    Some(format!("context '{}': {}", context, e)),
                );
                self.settings.prompt_hierarchy.remove(context);
                HierarchyTree::new()
            }
            None => HierarchyTree::new(),
        };
        self.store.set(context, tree);
    }

    /// Tree of a context that is loaded or persisted. Unknown contexts stay unknown.
    fn loaded(&mut self, context: &str) -> Option<&HierarchyTree> {
        if !self.store.has(context) && self.settings.prompt_hierarchy.contains_key(context) {
            self.ensure_loaded(context);
        }
        self.store.peek(context)
    }

    fn persist(&mut self, context: &str) {
        if let Some(tree) = self.store.peek(context) {
            self.settings
                .prompt_hierarchy
                .insert(context.to_string(), encode_record(tree));
        }
    }

    /// Processes one host event
    pub fn handle(&mut self, event: HostEvent) -> ReconcileReport {
        match event {
            HostEvent::ContextSwitched { context, items } => self.activate(&context, &items),
            HostEvent::ListChanged { context, items } => self.sync(&context, &items),
        }
    }

    /// Makes `context` the active one and reconciles it against `items`
    pub fn activate(&mut self, context: &str, items: &[ItemDescriptor]) -> ReconcileReport {
        if self.active.as_deref() != Some(context) {
            tracing::debug!("Switching active context to '{}'", context);
            self.active = Some(context.to_string());
        }
        let report = self.sync(context, items);
        self.log_transition("activate", Some(format!("context '{}'", context)));
        report
    }

    /// Reconciles `context` against the host's current `items`
    pub fn sync(&mut self, context: &str, items: &[ItemDescriptor]) -> ReconcileReport {
        self.ensure_loaded(context);
        let host_ids = identifiers(items);
        let report = reconcile(self.store.get(context), &host_ids);

        // A context seen for the first time is persisted even if it is empty.
        if !report.is_empty() || !self.settings.prompt_hierarchy.contains_key(context) {
            self.persist(context);
        }
        if !report.is_empty() {
            self.log_transition(
                "sync",
                Some(format!(
                    "context '{}': added {:?}, removed {:?}",
                    context, report.added, report.removed
                )),
            );
        }
        report
    }

    /// Rejects a candidate tree that nests `node`'s subtree past the configured limit.
    ///
    /// Moves that do not make the subtree deeper than it already was are allowed,
    /// so a lowered limit never blocks reordering.
    fn check_nesting(
        &self,
        before: &HierarchyTree,
        after: &HierarchyTree,
        node: &str,
    ) -> HierarchyResult<()> {
        let max = self.settings.max_nesting_level;
        let height = hierarchy::subtree_height(after, node);
        let deepest = hierarchy::compute_depth(after, node) + height;
        let previous = hierarchy::compute_depth(before, node) + height;

        if deepest > max && deepest > previous {
            return Err(HierarchyError::NestingTooDeep {
                node: node.to_string(),
                depth: deepest,
                max,
            });
        }
        Ok(())
    }

    /// Applies `mutate` to a copy of the tree and commits it only if it succeeds
    /// and respects the nesting limit
    fn commit_move<F>(&mut self, context: &str, node: &str, mutate: F) -> HierarchyResult<()>
    where
        F: FnOnce(&mut HierarchyTree) -> HierarchyResult<()>,
    {
        let before = self.loaded(context).cloned().unwrap_or_default();
        let mut candidate = before.clone();

        mutate(&mut candidate)?;
        self.check_nesting(&before, &candidate, node)?;

        self.store.set(context, candidate);
        self.persist(context);
        Ok(())
    }

    /// Moves `node` to `to_index` under `parent` (root when `None`)
    pub fn move_node(
        &mut self,
        context: &str,
        node: &str,
        from_index: usize,
        to_index: usize,
        parent: Option<&str>,
    ) -> HierarchyResult<()> {
        let result = self.commit_move(context, node, |tree| {
            hierarchy::move_node(tree, node, from_index, to_index, parent)
        });

        match &result {
            Ok(()) => self.log_transition(
                "move_node",
                Some(format!(
                    "context '{}': '{}' to {:?}[{}]",
                    context, node, parent, to_index
                )),
            ),
            Err(e) => {
                tracing::warn!("Rejected move of '{}' in '{}': {}", node, context, e);
                self.log_transition("move_node_failed", Some(e.to_string()));
            }
        }
        result
    }

    /// Drops `node` onto `target`, making it the target's last child.
    ///
    /// With `auto_collapse` on, a target that becomes a group with this move starts
    /// collapsed.
    pub fn nest_node(&mut self, context: &str, node: &str, target: &str) -> HierarchyResult<()> {
        let auto_collapse = self.settings.auto_collapse;
        let result = self.commit_move(context, node, |tree| {
            let was_group = !tree.children(target).is_empty();
            hierarchy::nest_node(tree, node, target)?;
            if auto_collapse && !was_group {
                tree.nodes.entry(target.to_string()).or_default().collapsed = true;
            }
            Ok(())
        });

        match &result {
            Ok(()) => self.log_transition(
                "nest_node",
                Some(format!("context '{}': '{}' under '{}'", context, node, target)),
            ),
            Err(e) => {
                tracing::warn!("Rejected nesting of '{}' in '{}': {}", node, context, e);
                self.log_transition("nest_node_failed", Some(e.to_string()));
            }
        }
        result
    }

    /// Flips the collapsed flag of `node`, returning the new state
    pub fn toggle_collapse(&mut self, context: &str, node: &str) -> HierarchyResult<bool> {
        let result = if self.loaded(context).is_some() {
            hierarchy::toggle_collapse(self.store.get(context), node)
        } else {
            Err(HierarchyError::NotFound(node.to_string()))
        };

        match &result {
            Ok(collapsed) => {
                self.persist(context);
                self.log_transition(
                    "toggle_collapse",
                    Some(format!(
                        "context '{}': '{}' collapsed={}",
                        context, node, collapsed
                    )),
                );
            }
            Err(e) => {
                tracing::warn!("Rejected toggle of '{}' in '{}': {}", node, context, e);
                self.log_transition("toggle_collapse_failed", Some(e.to_string()));
            }
        }
        result
    }

    /// Current tree of `context`, empty for a context never seen
    pub fn tree(&mut self, context: &str) -> HierarchyTree {
        self.loaded(context).cloned().unwrap_or_default()
    }

    /// Projection of `context`; every node is visible while the feature is disabled
    pub fn project(&mut self, context: &str) -> Vec<ProjectedNode> {
        let enabled = self.settings.enabled;
        match self.loaded(context) {
            Some(tree) if enabled => projection::project(tree),
            Some(tree) => projection::project_expanded(tree),
            None => Vec::new(),
        }
    }

    /// Host items of `context` ordered by the hierarchy
    pub fn arrange(&mut self, context: &str, items: &[ItemDescriptor]) -> Vec<ArrangedItem> {
        let projected = self.project(context);
        projection::arrange(&projected, items)
    }

    /// Forgets `context` entirely, in memory and in the persisted settings
    pub fn evict(&mut self, context: &str) -> bool {
        let in_memory = self.store.remove(context).is_some();
        let persisted = self.settings.prompt_hierarchy.remove(context).is_some();
        if self.active.as_deref() == Some(context) {
            self.active = None;
        }
        if in_memory || persisted {
            self.log_transition("evict", Some(format!("context '{}'", context)));
        }
        in_memory || persisted
    }

    /// Drops every in-memory tree. Persisted settings are kept.
    pub fn teardown(&mut self) {
        self.store.clear();
        self.active = None;
        self.log_transition("teardown", None);
    }
}

/// Thread-safe handle to a [`Session`]
#[derive(Clone)]
pub struct Core {
    inner: Arc<Mutex<Session>>,
    update_tx: Arc<tokio::sync::broadcast::Sender<ContextId>>,
}

impl Core {
    pub fn new(session: Session) -> Self {
        // Create a broadcast channel with capacity for 100 messages
        let (tx, _rx) = tokio::sync::broadcast::channel(100);

        Self {
            inner: Arc::new(Mutex::new(session)),
            update_tx: Arc::new(tx),
        }
    }

    /// Builds a core from whatever `store` currently holds
    pub fn load(store: &dyn SettingsStore) -> Result<Self, SettingsError> {
        Ok(Self::new(Session::new(store.load()?)))
    }

    // Runs one operation under the lock
    fn with_session<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut session = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut session)
    }

    fn notify(&self, context: &str) {
        // No receivers is fine
        let _ = self.update_tx.send(context.to_string());
    }

    /// Subscribe to change notifications; each carries the changed context id
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ContextId> {
        self.update_tx.subscribe()
    }

    pub fn handle(&self, event: HostEvent) -> ReconcileReport {
        let context = event.context().to_string();
        let switched = matches!(event, HostEvent::ContextSwitched { .. });
        let (report, first_seen) = self.with_session(|session| {
            let known = session.settings.prompt_hierarchy.contains_key(&context);
            let report = session.handle(event);
            let stored = session.settings.prompt_hierarchy.contains_key(&context);
            (report, !known && stored)
        });
        // A switch or a newly stored record is news even when the list was in sync
        if switched || first_seen || !report.is_empty() {
            self.notify(&context);
        }
        report
    }

    pub fn activate(&self, context: &str, items: &[ItemDescriptor]) -> ReconcileReport {
        self.handle(HostEvent::ContextSwitched {
            context: context.to_string(),
            items: items.to_vec(),
        })
    }

    pub fn sync(&self, context: &str, items: &[ItemDescriptor]) -> ReconcileReport {
        self.handle(HostEvent::ListChanged {
            context: context.to_string(),
            items: items.to_vec(),
        })
    }

    pub fn move_node(
        &self,
        context: &str,
        node: &str,
        from_index: usize,
        to_index: usize,
        parent: Option<&str>,
    ) -> HierarchyResult<PersistedTree> {
        let record = self.with_session(|session| {
            session.move_node(context, node, from_index, to_index, parent)?;
            Ok::<_, HierarchyError>(to_persisted(&session.tree(context)))
        })?;
        self.notify(context);
        Ok(record)
    }

    /// Nests `node` under `target`, returning the resulting stored tree
    pub fn nest_node(
        &self,
        context: &str,
        node: &str,
        target: &str,
    ) -> HierarchyResult<PersistedTree> {
        let record = self.with_session(|session| {
            session.nest_node(context, node, target)?;
            Ok::<_, HierarchyError>(to_persisted(&session.tree(context)))
        })?;
        self.notify(context);
        Ok(record)
    }

    pub fn toggle_collapse(&self, context: &str, node: &str) -> HierarchyResult<bool> {
        let collapsed = self.with_session(|session| session.toggle_collapse(context, node))?;
        self.notify(context);
        Ok(collapsed)
    }

    pub fn project(&self, context: &str) -> Vec<ProjectedNode> {
        self.with_session(|session| session.project(context))
    }

    pub fn arrange(&self, context: &str, items: &[ItemDescriptor]) -> Vec<ArrangedItem> {
        self.with_session(|session| session.arrange(context, items))
    }

    pub fn tree(&self, context: &str) -> HierarchyTree {
        self.with_session(|session| session.tree(context))
    }

    /// Stored form of the tree for `context`
    pub fn persisted(&self, context: &str) -> PersistedTree {
        to_persisted(&self.tree(context))
    }

    pub fn contexts(&self) -> Vec<ContextId> {
        self.with_session(|session| session.contexts())
    }

    pub fn active_context(&self) -> Option<ContextId> {
        self.with_session(|session| session.active_context().map(str::to_string))
    }

    pub fn evict(&self, context: &str) -> bool {
        let evicted = self.with_session(|session| session.evict(context));
        if evicted {
            self.notify(context);
        }
        evicted
    }

    pub fn teardown(&self) {
        self.with_session(|session| session.teardown());
    }

    pub fn settings(&self) -> Settings {
        self.with_session(|session| session.settings().clone())
    }

    pub fn history(&self) -> Vec<TransitionLogEntry> {
        self.with_session(|session| session.history())
    }

    /// Writes the current settings to `store` right away
    pub fn flush_to(&self, store: &dyn SettingsStore) -> Result<(), SettingsError> {
        store.save(&self.settings())
    }
}
