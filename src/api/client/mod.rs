//! Client module
//!
//! Clients for driving a [`Core`](crate::Core), either over HTTP or in process.

mod core;
mod http;
mod trait_def;

// Re-export the trait and types
pub use core::CoreClient;
pub use http::{ClientConfig, ClientError, HttpClientImpl};
pub use trait_def::Client;
