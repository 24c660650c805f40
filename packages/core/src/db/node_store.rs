//! NodeStore Trait - Persistence Abstraction Layer
//!
//! This module defines the `NodeStore` trait that abstracts persistence of
//! tree rows. The tree operator only talks to this trait, so a relational
//! table, a key-value store or the bundled in-memory adapter can back it.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: all methods are async so network backends fit
//! 2. **Ownership Semantics**: writes take rows by value and return the
//!    persisted state (new version, row id)
//! 3. **Error Handling**: `anyhow::Result` for flexible backend context
//! 4. **Write Validation**: implementations call `TreeNode::validate` on every
//!    row before persisting; malformed paths never reach storage
//!
//! # Examples
//!
//! ```rust
//! use collab_tree_core::db::{InMemoryNodeStore, NodeStore};
//! use collab_tree_core::models::TreeNode;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let store = InMemoryNodeStore::new();
//! let root = store.save(TreeNode::root(1)).await?;
//! store.save(TreeNode::child_of(&root, 10)).await?;
//!
//! let children = store
//!     .find_by_level_range_and_path_prefix(1, Some(1), "{1}")
//!     .await?;
//! assert_eq!(children.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::models::{NodeId, TreeNode};
use anyhow::Result;
use async_trait::async_trait;

/// Abstraction layer for tree row persistence
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the operator holds them behind
/// `Arc<dyn NodeStore>` across tasks.
///
/// # Versioning
///
/// Every persisted mutation of a row increments its `version`. Only
/// `delete_by_external_id_and_version` and `update_has_children_by_version`
/// are conditioned on it; `save` and `save_all` overwrite unconditionally.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Point lookup by external id
    ///
    /// Returns `Ok(None)` when no row exists (not an error).
    async fn get_by_external_id(&self, external_id: NodeId) -> Result<Option<TreeNode>>;

    /// Insert (no row id yet) or overwrite (row id present) a single row
    ///
    /// # Errors
    ///
    /// - row fails `TreeNode::validate`
    /// - insert of an external id that already exists
    /// - update of a row that no longer exists
    async fn save(&self, node: TreeNode) -> Result<TreeNode>;

    /// Persist a batch of rows all-or-nothing
    ///
    /// Either every row is written or none is; a single invalid row fails
    /// the whole batch.
    async fn save_all(&self, nodes: Vec<TreeNode>) -> Result<Vec<TreeNode>>;

    /// Delete a row iff its stored version still equals `version`
    ///
    /// Returns the number of rows removed (0 or 1).
    async fn delete_by_external_id_and_version(
        &self,
        external_id: NodeId,
        version: i64,
    ) -> Result<u64>;

    /// Set `has_children` iff the stored version still equals `version`
    ///
    /// Returns the number of rows updated (0 or 1).
    async fn update_has_children_by_version(
        &self,
        external_id: NodeId,
        version: i64,
        has_children: bool,
    ) -> Result<u64>;

    /// Rows with `min_level <= tree_level <= max_level` whose path starts with `prefix`
    ///
    /// `max_level = None` leaves the range unbounded above. Results are
    /// ordered by `(tree_level, external_id)`.
    async fn find_by_level_range_and_path_prefix(
        &self,
        min_level: u32,
        max_level: Option<u32>,
        prefix: &str,
    ) -> Result<Vec<TreeNode>>;
}
