//! Domain Events for the Collaborator Tree
//!
//! `TreeOperator` publishes these on a tokio broadcast channel after each
//! structural change, so monitors can follow the tree without polling the
//! store. A failed subtree rewrite is only visible to callers through the
//! returned report and through `SubtreeRewriteFailed` here.

use crate::models::{NodeId, RequesterId, TreeNode};

/// Domain events emitted by `TreeOperator`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// A leaf was inserted under `father_id`
    LeafAdded { father_id: NodeId, node: TreeNode },

    /// A leaf row was deleted
    LeafCut { node_id: NodeId },

    /// A node's `has_children` flag was recomputed and persisted
    NodeReconciled(TreeNode),

    /// The descendants of `old_father_id` now live under `new_father_id`
    SubtreeMoved {
        old_father_id: NodeId,
        new_father_id: NodeId,
        requester_id: RequesterId,
        moved: usize,
    },

    /// The bulk rewrite of a re-parenting attempt did not persist
    SubtreeRewriteFailed {
        old_father_id: NodeId,
        new_father_id: NodeId,
        requester_id: RequesterId,
        reason: String,
    },
}

impl TreeEvent {
    /// Short name of the event type, for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            TreeEvent::LeafAdded { .. } => "leaf_added",
            TreeEvent::LeafCut { .. } => "leaf_cut",
            TreeEvent::NodeReconciled(_) => "node_reconciled",
            TreeEvent::SubtreeMoved { .. } => "subtree_moved",
            TreeEvent::SubtreeRewriteFailed { .. } => "subtree_rewrite_failed",
        }
    }
}
