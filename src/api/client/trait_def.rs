//! Client trait definition
//!
//! This module defines the `Client` trait that abstracts over different client implementations.

use super::ClientError;
use crate::api::server::{ContextsResponse, ToggleResponse};
use crate::models::{ItemDescriptor, NodeId};
use crate::persist::PersistedTree;
use crate::projection::ProjectedNode;
use crate::reconcile::ReconcileReport;
use crate::session::TransitionLogEntry;
use crate::settings::Settings;

/// Trait defining the API client interface for the hierarchy service
#[async_trait::async_trait]
pub trait Client {
    /// List known contexts and the active one
    async fn list_contexts(&self) -> Result<ContextsResponse, ClientError>;

    /// Switch to `context` and reconcile it against `items`
    async fn activate(
        &self,
        context: &str,
        items: Vec<ItemDescriptor>,
    ) -> Result<ReconcileReport, ClientError>;

    /// Reconcile `context` against `items`
    async fn sync(
        &self,
        context: &str,
        items: Vec<ItemDescriptor>,
    ) -> Result<ReconcileReport, ClientError>;

    /// Get the stored form of a context's tree
    async fn tree(&self, context: &str) -> Result<PersistedTree, ClientError>;

    /// Get the rendered rows of a context
    async fn projection(&self, context: &str) -> Result<Vec<ProjectedNode>, ClientError>;

    /// Move a node; returns the updated tree
    async fn move_node(
        &self,
        context: &str,
        node: &str,
        from_index: usize,
        to_index: usize,
        parent: Option<NodeId>,
    ) -> Result<PersistedTree, ClientError>;

    /// Nest a node under a target; returns the updated tree
    async fn nest_node(
        &self,
        context: &str,
        node: &str,
        target: &str,
    ) -> Result<PersistedTree, ClientError>;

    /// Flip a node's collapsed flag
    async fn toggle_collapse(
        &self,
        context: &str,
        node: &str,
    ) -> Result<ToggleResponse, ClientError>;

    /// Forget a context
    async fn evict(&self, context: &str) -> Result<(), ClientError>;

    async fn settings(&self) -> Result<Settings, ClientError>;

    async fn history(&self) -> Result<Vec<TransitionLogEntry>, ClientError>;
}
