//! Core client implementation
//!
//! This module provides a client implementation that wraps Core directly,
//! providing the same interface as HttpClientImpl but without HTTP overhead.

use super::{Client, ClientError};
use crate::api::server::{ContextsResponse, ToggleResponse};
use crate::models::{ItemDescriptor, NodeId};
use crate::persist::PersistedTree;
use crate::projection::ProjectedNode;
use crate::reconcile::ReconcileReport;
use crate::session::{Core, TransitionLogEntry};
use crate::settings::Settings;

/// A client implementation that wraps Core directly
#[derive(Clone)]
pub struct CoreClient {
    core: Core,
}

impl CoreClient {
    /// Create a new CoreClient with the given Core instance
    pub fn new(core: Core) -> Self {
        Self { core }
    }
}

#[async_trait::async_trait]
impl Client for CoreClient {
    async fn list_contexts(&self) -> Result<ContextsResponse, ClientError> {
        Ok(ContextsResponse {
            active: self.core.active_context(),
            contexts: self.core.contexts(),
        })
    }

    async fn activate(
        &self,
        context: &str,
        items: Vec<ItemDescriptor>,
    ) -> Result<ReconcileReport, ClientError> {
        Ok(self.core.activate(context, &items))
    }

    async fn sync(
        &self,
        context: &str,
        items: Vec<ItemDescriptor>,
    ) -> Result<ReconcileReport, ClientError> {
        Ok(self.core.sync(context, &items))
    }

    async fn tree(&self, context: &str) -> Result<PersistedTree, ClientError> {
        Ok(self.core.persisted(context))
    }

    async fn projection(&self, context: &str) -> Result<Vec<ProjectedNode>, ClientError> {
        Ok(self.core.project(context))
    }

    async fn move_node(
        &self,
        context: &str,
        node: &str,
        from_index: usize,
        to_index: usize,
        parent: Option<NodeId>,
    ) -> Result<PersistedTree, ClientError> {
        Ok(self
            .core
            .move_node(context, node, from_index, to_index, parent.as_deref())?)
    }

    async fn nest_node(
        &self,
        context: &str,
        node: &str,
        target: &str,
    ) -> Result<PersistedTree, ClientError> {
        Ok(self.core.nest_node(context, node, target)?)
    }

    async fn toggle_collapse(
        &self,
        context: &str,
        node: &str,
    ) -> Result<ToggleResponse, ClientError> {
        let collapsed = self.core.toggle_collapse(context, node)?;
        Ok(ToggleResponse {
            node: node.to_string(),
            collapsed,
        })
    }

    async fn evict(&self, context: &str) -> Result<(), ClientError> {
        if self.core.evict(context) {
            Ok(())
        } else {
            Err(ClientError::Api(format!("Context '{}' not found", context)))
        }
    }

    async fn settings(&self) -> Result<Settings, ClientError> {
        Ok(self.core.settings())
    }

    async fn history(&self) -> Result<Vec<TransitionLogEntry>, ClientError> {
        Ok(self.core.history())
    }
}
