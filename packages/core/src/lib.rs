//! Collaborator Tree Core
//!
//! Maintains a parent-child hierarchy over numeric entity ids using a
//! materialized path stored on every node instead of recursive parent
//! lookups.
//!
//! # Architecture
//!
//! - **Materialized Path**: each row stores `{root}...{parent}`; descendant
//!   queries are a level range plus a path-prefix match
//! - **Advisory Locks**: mutations pre-check the locks of every affected
//!   ancestor and fail fast
//! - **Optimistic Versions**: leaf deletion and flag reconciliation are
//!   conditioned on the row version
//! - **Injected Collaborators**: storage, locks and configuration are traits
//!
//! # Modules
//!
//! - [`models`] - `TreeNode`, `NodeLock`
//! - [`utils`] - ancestor path codec
//! - [`db`] - `NodeStore` trait, in-memory store, domain events
//! - [`services`] - `TreeOperator`, lock coordination, root id resolution
//! - [`operations`] - retry helpers and subtree audit/repair
//! - [`config`] - `TreeConfig`
//! - [`logging`] - tracing subscriber bootstrap

pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod operations;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::TreeConfig;
pub use models::*;
pub use services::*;
