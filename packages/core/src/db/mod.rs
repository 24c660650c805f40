//! Storage Layer
//!
//! - `NodeStore` - async persistence seam for tree rows
//! - `InMemoryNodeStore` - process-local adapter used by tests and embedders
//! - `TreeEvent` - domain events published after structural changes

mod error;
pub mod events;
mod memory_store;
mod node_store;

pub use error::StoreError;
pub use events::TreeEvent;
pub use memory_store::InMemoryNodeStore;
pub use node_store::NodeStore;
