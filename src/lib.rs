//! Prompt-hierarchy library crate
//!
//! Adds nesting and collapsing on top of a host application's flat, ordered list
//! of prompt items. The host stays the source of truth for which items exist; this
//! crate keeps one [`HierarchyTree`] per host context, reconciles it against the
//! host's list, applies drag-and-drop operations, persists the result and projects
//! it back into a depth-annotated sequence for rendering.

pub mod api;
pub mod cli;
pub mod debounce;
pub mod hierarchy;
pub mod models;
pub mod persist;
pub mod projection;
pub mod reconcile;
pub mod session;
pub mod settings;
pub mod store;

pub use models::{
    ContextId, HierarchyError, HierarchyResult, HierarchyTree, ItemDescriptor, NodeId, NodeMeta,
};
pub use session::{Core, HostEvent, Session};
pub use settings::Settings;
