//! Tree Node Data Structures
//!
//! This module defines `TreeNode`, the row that carries one entity's position
//! in the collaborator tree.
//!
//! # Architecture
//!
//! - **Materialized Path**: each row stores its full ancestor chain, so
//!   descendant queries are a prefix match instead of a recursive walk
//! - **Cached Child Flag**: `has_children` is derived state, reconciled on demand
//! - **Optimistic Versioning**: `version` is bumped by the store on every write
//!
//! # Examples
//!
//! ```rust
//! use collab_tree_core::models::TreeNode;
//!
//! let root = TreeNode::root(1);
//! let child = TreeNode::child_of(&root, 10);
//!
//! assert!(root.is_root());
//! assert_eq!(child.ancestor_path.as_deref(), Some("{1}"));
//! assert_eq!(child.tree_level, 1);
//! ```

use crate::utils::path_codec::{self, PathError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// External id of a tree node (e.g. a customer id)
pub type NodeId = i64;

/// Version assigned by a store when a row is first inserted
pub const INITIAL_VERSION: i64 = 1;

/// Level of a root node
pub const ROOT_LEVEL: u32 = 0;

fn default_version() -> i64 {
    INITIAL_VERSION
}

/// Validation errors for TreeNode rows
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid ancestor path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("Node {node_id} is at level {tree_level} but its path holds {path_len} ancestors")]
    LevelMismatch {
        node_id: NodeId,
        tree_level: u32,
        path_len: usize,
    },

    #[error("Node id must be non-negative: {0}")]
    NegativeId(NodeId),
}

/// One row of the collaborator tree
///
/// # Fields
///
/// - `external_id`: the domain id callers address the node by (unique)
/// - `ancestor_path`: `None` for a root, otherwise `{root}...{parent}`
/// - `tree_level`: depth, equal to the number of tokens in `ancestor_path`
/// - `has_children`: cached flag, true iff some node has this one as parent
/// - `version`: optimistic concurrency token maintained by the store
///
/// The surrogate row id is owned by the store and never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    #[serde(skip)]
    row_id: Option<i64>,

    pub external_id: NodeId,

    pub ancestor_path: Option<String>,

    pub tree_level: u32,

    pub has_children: bool,

    #[serde(default = "default_version")]
    pub version: i64,
}

impl TreeNode {
    /// Create an unsaved root node
    pub fn root(external_id: NodeId) -> Self {
        Self {
            row_id: None,
            external_id,
            ancestor_path: None,
            tree_level: ROOT_LEVEL,
            has_children: false,
            version: INITIAL_VERSION,
        }
    }

    /// Create an unsaved leaf positioned directly under `father`
    pub fn child_of(father: &TreeNode, external_id: NodeId) -> Self {
        Self {
            row_id: None,
            external_id,
            ancestor_path: Some(father.descendant_prefix()),
            tree_level: father.tree_level + 1,
            has_children: false,
            version: INITIAL_VERSION,
        }
    }

    /// Surrogate row id, `None` until the row has been persisted
    pub fn row_id(&self) -> Option<i64> {
        self.row_id
    }

    /// Attach the surrogate row id (for `NodeStore` implementations)
    pub fn set_row_id(&mut self, row_id: i64) {
        self.row_id = Some(row_id);
    }

    /// True iff the path is absent (or empty) and the level is zero
    pub fn is_root(&self) -> bool {
        self.ancestor_path.as_deref().map_or(true, str::is_empty) && self.tree_level == ROOT_LEVEL
    }

    /// Decoded ancestor chain, root first, immediate parent last
    pub fn ancestor_ids(&self) -> Result<Vec<NodeId>, PathError> {
        path_codec::decode(self.ancestor_path.as_deref())
    }

    /// Path prefix shared by every descendant of this node
    pub fn descendant_prefix(&self) -> String {
        path_codec::append(self.ancestor_path.as_deref(), self.external_id)
    }

    /// Check the row invariants that must hold before any write
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.external_id < 0 {
            return Err(ValidationError::NegativeId(self.external_id));
        }

        let ancestors = self.ancestor_ids()?;
        if ancestors.len() != self.tree_level as usize {
            return Err(ValidationError::LevelMismatch {
                node_id: self.external_id,
                tree_level: self.tree_level,
                path_len: ancestors.len(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_node_shape() {
        let root = TreeNode::root(1);
        assert!(root.is_root());
        assert_eq!(root.row_id(), None);
        assert_eq!(root.ancestor_ids().unwrap(), Vec::<NodeId>::new());
        assert!(root.validate().is_ok());
    }

    #[test]
    fn test_child_of_extends_path_and_level() {
        let root = TreeNode::root(1);
        let child = TreeNode::child_of(&root, 10);
        let grandchild = TreeNode::child_of(&child, 20);

        assert_eq!(grandchild.ancestor_path.as_deref(), Some("{1}{10}"));
        assert_eq!(grandchild.tree_level, 2);
        assert_eq!(grandchild.ancestor_ids().unwrap(), vec![1, 10]);
        assert!(!grandchild.is_root());
        assert!(grandchild.validate().is_ok());
    }

    #[test]
    fn test_is_root_requires_level_zero() {
        let mut node = TreeNode::root(1);
        node.tree_level = 2;
        assert!(!node.is_root());
    }

    #[test]
    fn test_is_root_false_for_path_with_level_mismatch() {
        let mut node = TreeNode::root(5);
        node.ancestor_path = Some("{1}".to_string());
        assert!(!node.is_root());
    }

    #[test]
    fn test_validate_rejects_level_mismatch() {
        let mut node = TreeNode::child_of(&TreeNode::root(1), 10);
        node.tree_level = 3;
        assert_eq!(
            node.validate(),
            Err(ValidationError::LevelMismatch {
                node_id: 10,
                tree_level: 3,
                path_len: 1
            })
        );
    }

    #[test]
    fn test_validate_rejects_empty_present_path() {
        let mut node = TreeNode::root(1);
        node.ancestor_path = Some(String::new());
        assert!(matches!(
            node.validate(),
            Err(ValidationError::InvalidPath(PathError::InvalidFormat { .. }))
        ));
    }

    #[test]
    fn test_validate_rejects_negative_id() {
        assert_eq!(
            TreeNode::root(-3).validate(),
            Err(ValidationError::NegativeId(-3))
        );
    }

    #[test]
    fn test_serializes_camel_case_without_row_id() {
        let mut node = TreeNode::child_of(&TreeNode::root(1), 10);
        node.set_row_id(99);

        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["externalId"], 10);
        assert_eq!(json["ancestorPath"], "{1}");
        assert_eq!(json["treeLevel"], 1);
        assert!(json.get("rowId").is_none());

        let back: TreeNode = serde_json::from_value(json).unwrap();
        assert_eq!(back.row_id(), None);
        assert_eq!(back.external_id, 10);
    }
}
