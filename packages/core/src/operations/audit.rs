//! Subtree integrity audit and repair
//!
//! Re-parenting rewrites descendants without per-row locks, and
//! `has_children` is a cached flag that leaf deletion does not clear. The
//! auditor walks a subtree, reports rows that break the tree invariants and
//! can reconcile stale child flags.

use crate::models::{NodeId, TreeNode};
use crate::services::{TreeError, TreeOperator};
use crate::utils::path_codec;
use std::collections::HashSet;
use std::sync::Arc;

/// One integrity problem found in a subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeIssue {
    /// Stored path fails the grammar
    MalformedPath {
        node_id: NodeId,
        path: Option<String>,
    },

    /// `tree_level` differs from the number of path tokens
    LevelMismatch {
        node_id: NodeId,
        tree_level: u32,
        path_len: usize,
    },

    /// Cached `has_children` disagrees with the rows actually below the node
    StaleChildFlag {
        node_id: NodeId,
        expected: bool,
        actual: bool,
    },
}

impl TreeIssue {
    /// Node the issue was found on
    pub fn node_id(&self) -> NodeId {
        match self {
            TreeIssue::MalformedPath { node_id, .. }
            | TreeIssue::LevelMismatch { node_id, .. }
            | TreeIssue::StaleChildFlag { node_id, .. } => *node_id,
        }
    }
}

/// Result of auditing one subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    pub root_id: NodeId,

    /// Rows examined, the subtree root included
    pub scanned: usize,

    pub issues: Vec<TreeIssue>,
}

impl AuditReport {
    /// No issue was found
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Audits and repairs subtrees through a `TreeOperator`
pub struct TreeAuditor {
    operator: Arc<TreeOperator>,
}

impl TreeAuditor {
    pub fn new(operator: Arc<TreeOperator>) -> Self {
        Self { operator }
    }

    /// Check `root_id` and all of its descendants
    pub async fn audit_subtree(&self, root_id: NodeId) -> Result<AuditReport, TreeError> {
        let root = self.operator.get_node(root_id).await?;
        let descendants = self.operator.get_all_children(root_id, -1).await?;

        let mut issues = Vec::new();
        let mut fathers: HashSet<NodeId> = HashSet::new();

        for node in &descendants {
            match path_codec::decode(node.ancestor_path.as_deref()) {
                Err(_) => issues.push(TreeIssue::MalformedPath {
                    node_id: node.external_id,
                    path: node.ancestor_path.clone(),
                }),
                Ok(ancestors) => {
                    if ancestors.len() != node.tree_level as usize {
                        issues.push(TreeIssue::LevelMismatch {
                            node_id: node.external_id,
                            tree_level: node.tree_level,
                            path_len: ancestors.len(),
                        });
                    }
                    if let Some(father_id) = ancestors.last() {
                        fathers.insert(*father_id);
                    }
                }
            }
        }

        for node in std::iter::once(&root).chain(descendants.iter()) {
            let expected = fathers.contains(&node.external_id);
            if node.has_children != expected {
                issues.push(TreeIssue::StaleChildFlag {
                    node_id: node.external_id,
                    expected,
                    actual: node.has_children,
                });
            }
        }

        if !issues.is_empty() {
            tracing::warn!(
                "Audit of subtree {} found {} issue(s) in {} row(s)",
                root_id,
                issues.len(),
                descendants.len() + 1
            );
        }

        Ok(AuditReport {
            root_id,
            scanned: descendants.len() + 1,
            issues,
        })
    }

    /// Reconcile every stale `has_children` flag in the subtree
    ///
    /// Goes through `update_node`, so locked rows fail the repair and
    /// concurrent writers are detected by version. Returns the number of
    /// rows repaired.
    pub async fn repair_child_flags(&self, root_id: NodeId) -> Result<usize, TreeError> {
        let report = self.audit_subtree(root_id).await?;
        let mut repaired = 0;

        for issue in &report.issues {
            if let TreeIssue::StaleChildFlag { node_id, .. } = issue {
                let node: TreeNode = self.operator.get_node(*node_id).await?;
                self.operator.update_node(*node_id, node.version).await?;
                repaired += 1;
            }
        }

        if repaired > 0 {
            tracing::info!("Repaired {} child flag(s) under {}", repaired, root_id);
        }

        Ok(repaired)
    }
}
