//! Data Models
//!
//! - `TreeNode` - one materialized-path row of the collaborator tree
//! - `NodeLock` - an advisory lock held on a node id

mod lock;
mod node;

pub use lock::{NodeLock, RequesterId};
pub use node::{NodeId, TreeNode, ValidationError, INITIAL_VERSION, ROOT_LEVEL};
