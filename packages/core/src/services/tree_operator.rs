//! Tree Operator
//!
//! Structural operations on the materialized-path collaborator tree: leaf
//! insertion and deletion, subtree re-parenting, lineage queries,
//! `has_children` reconciliation and lock delegation.
//!
//! # Concurrency
//!
//! Two layers guard the shared node table:
//!
//! - **Advisory pre-checks**: before mutating, an operation asks the
//!   `LockCoordinator` whether any id in its affected-ancestor set is locked
//!   and fails fast with `NodeLocked`. A check does not hold anything.
//! - **Row versions**: `cut_leaf` and `update_node` write conditioned on the
//!   version they read.
//!
//! Only `change_father` holds explicit locks, on its two pivot ids. The
//! descendant batch it rewrites is not locked row by row; it is persisted
//! through `NodeStore::save_all`, which writes all rows or none, and the
//! outcome is reported back to the caller. `TreeAuditor` can repair flags
//! left stale by a failed or raced rewrite.

use crate::config::TreeConfig;
use crate::db::{NodeStore, TreeEvent};
use crate::models::{NodeId, RequesterId, TreeNode};
use crate::services::configuration::RootIdResolver;
use crate::services::error::{ErrorKind, TreeError};
use crate::services::lock_coordinator::LockCoordinator;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Outcome of the bulk descendant rewrite inside `change_father`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtreeRewrite {
    /// Every descendant was rewritten and persisted
    Completed { moved: usize },

    /// Nothing was persisted; descendants still sit under the old father
    Failed { attempted: usize, reason: String },
}

/// Result of a `change_father` call whose pre-checks passed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReparentReport {
    pub old_father_id: NodeId,
    pub new_father_id: NodeId,
    pub rewrite: SubtreeRewrite,

    /// Set when releasing the pivots or writing father flags failed after the
    /// rewrite; the flags can then be repaired with `TreeAuditor`
    pub cleanup_error: Option<String>,
}

impl ReparentReport {
    /// Whether the descendants were actually moved
    pub fn is_complete(&self) -> bool {
        matches!(self.rewrite, SubtreeRewrite::Completed { .. })
    }

    /// Whether the pivots were released and father flags reconciled
    pub fn is_clean(&self) -> bool {
        self.cleanup_error.is_none()
    }
}

/// Structural operations over a `NodeStore`
pub struct TreeOperator {
    store: Arc<dyn NodeStore>,

    locks: Arc<dyn LockCoordinator>,

    root_resolver: Arc<RootIdResolver>,

    config: TreeConfig,

    event_tx: broadcast::Sender<TreeEvent>,
}

impl TreeOperator {
    /// Create an operator over the given collaborators
    ///
    /// # Errors
    ///
    /// `Configuration` if `config` fails validation.
    pub fn new(
        store: Arc<dyn NodeStore>,
        locks: Arc<dyn LockCoordinator>,
        root_resolver: Arc<RootIdResolver>,
        config: TreeConfig,
    ) -> Result<Self, TreeError> {
        config.validate().map_err(TreeError::configuration)?;
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);

        Ok(Self {
            store,
            locks,
            root_resolver,
            config,
            event_tx,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Receiver of every `TreeEvent` emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.event_tx.subscribe()
    }

    /// Ignores the error when nobody is subscribed.
    fn emit_event(&self, event: TreeEvent) {
        tracing::trace!("Emitting {} event", event.event_type());
        let _ = self.event_tx.send(event);
    }

    //
    // LOOKUPS
    //

    /// Resolve a node by external id
    ///
    /// # Errors
    ///
    /// `NodeNotExist` when no row exists.
    pub async fn get_node(&self, node_id: NodeId) -> Result<TreeNode, TreeError> {
        self.store
            .get_by_external_id(node_id)
            .await
            .map_err(TreeError::store_failed)?
            .ok_or_else(|| TreeError::node_not_exist(node_id))
    }

    /// Whether the node is a root (no path, level zero)
    pub async fn is_root_node(&self, node_id: NodeId) -> Result<bool, TreeError> {
        Ok(self.get_node(node_id).await?.is_root())
    }

    /// Whether `candidate_id` is an ancestor of `node`
    pub fn test_child_node(&self, candidate_id: NodeId, node: &TreeNode) -> Result<bool, TreeError> {
        Ok(node.ancestor_ids()?.contains(&candidate_id))
    }

    /// External id of the node's immediate parent
    ///
    /// # Errors
    ///
    /// `NodeInvalid` for a root; check `is_root_node` first.
    pub fn get_parent_id(&self, node: &TreeNode) -> Result<NodeId, TreeError> {
        node.ancestor_ids()?
            .last()
            .copied()
            .ok_or_else(|| TreeError::node_invalid(node.external_id, "root node has no parent"))
    }

    /// The node's immediate parent
    pub async fn get_parent(&self, node: &TreeNode) -> Result<TreeNode, TreeError> {
        let parent_id = self.get_parent_id(node)?;
        self.get_node(parent_id).await
    }

    /// Descendants of `father_id`
    ///
    /// - `sub_level_limit == 0`: empty, without looking the father up
    /// - `sub_level_limit < 0`: every descendant, any depth
    /// - `sub_level_limit > 0`: descendants at most that many levels below
    ///
    /// Results are ordered by level, then external id.
    pub async fn get_all_children(
        &self,
        father_id: NodeId,
        sub_level_limit: i32,
    ) -> Result<Vec<TreeNode>, TreeError> {
        if sub_level_limit == 0 {
            return Ok(Vec::new());
        }

        let father = self.get_node(father_id).await?;
        let min_level = father.tree_level + 1;
        let max_level = (sub_level_limit > 0)
            .then(|| father.tree_level.saturating_add(sub_level_limit.unsigned_abs()));

        self.store
            .find_by_level_range_and_path_prefix(min_level, max_level, &father.descendant_prefix())
            .await
            .map_err(TreeError::store_failed)
    }

    //
    // LEAF MUTATIONS
    //

    /// Insert `child_id` as a new leaf under `father_id`
    ///
    /// The father and its whole ancestor chain must be unlocked. The father's
    /// `has_children` flag is set if it was clear.
    ///
    /// # Errors
    ///
    /// - `NodeNotExist` if the father is missing
    /// - `NodeLocked` if the father or an ancestor is locked
    /// - `NodeInvalid` if `child_id` is negative or already in the tree
    pub async fn add_leaf(&self, father_id: NodeId, child_id: NodeId) -> Result<TreeNode, TreeError> {
        let father = self.get_node(father_id).await?;

        let mut locked_ids = father.ancestor_ids()?;
        locked_ids.push(father_id);
        self.ensure_unlocked(&locked_ids).await?;

        if child_id < 0 {
            return Err(TreeError::node_invalid(child_id, "node id must be non-negative"));
        }
        if self
            .store
            .get_by_external_id(child_id)
            .await
            .map_err(TreeError::store_failed)?
            .is_some()
        {
            return Err(TreeError::node_invalid(child_id, "node is already in the tree"));
        }

        let child = TreeNode::child_of(&father, child_id);
        child.validate()?;

        if !father.has_children {
            let mut father = father;
            father.has_children = true;
            self.store
                .save(father)
                .await
                .map_err(TreeError::store_failed)?;
        }

        let child = self
            .store
            .save(child)
            .await
            .map_err(TreeError::store_failed)?;

        tracing::info!(
            "Added leaf {} under {} at level {}",
            child_id,
            father_id,
            child.tree_level
        );
        self.emit_event(TreeEvent::LeafAdded {
            father_id,
            node: child.clone(),
        });

        Ok(child)
    }

    /// Insert `child_id` under `father_id`, provisioning a missing father
    ///
    /// When the father does not exist it is first attached as a leaf under
    /// the configured root, then the insert is retried once. Every other
    /// failure propagates unchanged.
    pub async fn add_leaf_or_attach_to_root(
        &self,
        father_id: NodeId,
        child_id: NodeId,
    ) -> Result<TreeNode, TreeError> {
        match self.add_leaf(father_id, child_id).await {
            Err(e) if e.kind() == ErrorKind::NodeNotExist => {
                let root_id = self.root_resolver.root_id().await?;
                tracing::warn!(
                    "Father {} does not exist, attaching it under root {}",
                    father_id,
                    root_id
                );

                let father = self.add_leaf(root_id, father_id).await?;
                self.add_leaf(father.external_id, child_id).await
            }
            result => result,
        }
    }

    /// Delete a leaf
    ///
    /// Returns `Ok(false)` when the row changed between read and delete (a
    /// lost race on its version), `Ok(true)` when exactly one row was removed.
    ///
    /// # Errors
    ///
    /// - `NodeNotExist` if the node is missing
    /// - `NodeLocked` if an ancestor is locked
    /// - `NodeInvalid` if the node has children
    pub async fn cut_leaf(&self, child_id: NodeId) -> Result<bool, TreeError> {
        let node = self.get_node(child_id).await?;
        self.ensure_unlocked(&node.ancestor_ids()?).await?;

        if node.has_children {
            return Err(TreeError::node_invalid(child_id, "current node is not a leaf"));
        }

        let removed = self
            .store
            .delete_by_external_id_and_version(child_id, node.version)
            .await
            .map_err(TreeError::store_failed)?;

        if removed == 1 {
            tracing::info!("Cut leaf {}", child_id);
            self.emit_event(TreeEvent::LeafCut { node_id: child_id });
        } else {
            tracing::debug!(
                "Cut of leaf {} lost a race on version {}",
                child_id,
                node.version
            );
        }

        Ok(removed == 1)
    }

    /// Recompute and persist `has_children`, conditioned on `expected_version`
    ///
    /// # Errors
    ///
    /// - `NodeLocked` if the node is locked
    /// - `NodeNotExist` if the node is missing
    /// - `VersionConflict` if the stored version moved on
    pub async fn update_node(
        &self,
        node_id: NodeId,
        expected_version: i64,
    ) -> Result<TreeNode, TreeError> {
        self.ensure_unlocked(&[node_id]).await?;

        let has_children = !self.get_all_children(node_id, 1).await?.is_empty();
        let updated = self
            .store
            .update_has_children_by_version(node_id, expected_version, has_children)
            .await
            .map_err(TreeError::store_failed)?;

        let node = self.get_node(node_id).await?;
        if updated == 0 {
            return Err(TreeError::version_conflict(
                node_id,
                expected_version,
                node.version,
            ));
        }

        tracing::debug!("Reconciled node {}: has_children={}", node_id, has_children);
        self.emit_event(TreeEvent::NodeReconciled(node.clone()));

        Ok(node)
    }

    //
    // RE-PARENTING
    //

    /// Move every descendant of `old_father_id` under `new_father_id`
    ///
    /// 1. Both fathers must exist and neither they nor their ancestors may be locked
    /// 2. `new_father_id` must not be `old_father_id` or one of its descendants
    /// 3. The two pivot ids are locked for `requester_id`
    /// 4. Each descendant's leading `old` prefix is replaced by the `new` prefix
    ///    and its level shifted; the batch is persisted all-or-nothing
    /// 5. The pivots are unlocked and father flags reconciled, whatever step 4 did
    ///
    /// A failed rewrite is not an `Err`: it is reported in the returned
    /// `ReparentReport` and as a `SubtreeRewriteFailed` event. Neither is a
    /// failed cleanup once the rewrite ran; it lands in
    /// `ReparentReport::cleanup_error`.
    ///
    /// # Errors
    ///
    /// - `NodeNotExist` if a father is missing
    /// - `NodeLocked` if a pre-check or the pivot lock fails
    /// - `RuleViolation` if the move would create a cycle
    pub async fn change_father(
        &self,
        old_father_id: NodeId,
        new_father_id: NodeId,
        requester_id: RequesterId,
    ) -> Result<ReparentReport, TreeError> {
        tracing::info!(
            "Change father: old {}, new {}, requester {}",
            old_father_id,
            new_father_id,
            requester_id
        );

        let old_father = self.get_node(old_father_id).await?;
        let new_father = self.get_node(new_father_id).await?;
        let new_chain = new_father.ancestor_ids()?;

        let check_ids: BTreeSet<NodeId> = [old_father_id, new_father_id]
            .into_iter()
            .chain(old_father.ancestor_ids()?)
            .chain(new_chain.iter().copied())
            .collect();
        self.ensure_unlocked(&check_ids.into_iter().collect::<Vec<_>>())
            .await?;

        if old_father_id == new_father_id {
            return Err(TreeError::rule_violation(format!(
                "cannot move the subtree of {} under itself",
                old_father_id
            )));
        }
        if new_chain.contains(&old_father_id) {
            return Err(TreeError::rule_violation(format!(
                "new father {} is a descendant of {}",
                new_father_id, old_father_id
            )));
        }

        let pivots = [old_father_id, new_father_id];
        let expires_at = self.config.reparent_lock_ttl().map(|ttl| Utc::now() + ttl);
        self.locks
            .lock_nodes(
                &pivots,
                requester_id,
                expires_at,
                Some(format!("change father {} -> {}", old_father_id, new_father_id)),
            )
            .await?;

        let rewrite = self.rewrite_subtree(&old_father, &new_father).await;

        let mut cleanup_errors = Vec::new();
        if let Err(e) = self.locks.unlock_nodes(&pivots).await {
            tracing::error!("Failed to release pivot locks {:?}: {}", pivots, e);
            cleanup_errors.push(format!("unlock: {}", e));
        }

        match &rewrite {
            SubtreeRewrite::Completed { moved } => {
                if let Err(e) = self.reconcile_fathers(old_father, new_father, *moved).await {
                    tracing::error!(
                        "Moved descendants of {} but failed to reconcile father flags: {}",
                        old_father_id,
                        e
                    );
                    cleanup_errors.push(format!("reconcile flags: {}", e));
                }
                tracing::info!(
                    "Moved {} descendant(s) from {} to {}",
                    moved,
                    old_father_id,
                    new_father_id
                );
                self.emit_event(TreeEvent::SubtreeMoved {
                    old_father_id,
                    new_father_id,
                    requester_id,
                    moved: *moved,
                });
            }
            SubtreeRewrite::Failed { attempted, reason } => {
                tracing::error!(
                    "Rewrite of {} descendant(s) from {} to {} failed: {}",
                    attempted,
                    old_father_id,
                    new_father_id,
                    reason
                );
                if let Err(e) = self.recount_child_flags(&pivots).await {
                    tracing::error!(
                        "Failed to recount father flags of {:?}: {}",
                        pivots,
                        e
                    );
                    cleanup_errors.push(format!("recount flags: {}", e));
                }
                self.emit_event(TreeEvent::SubtreeRewriteFailed {
                    old_father_id,
                    new_father_id,
                    requester_id,
                    reason: reason.clone(),
                });
            }
        }

        Ok(ReparentReport {
            old_father_id,
            new_father_id,
            rewrite,
            cleanup_error: (!cleanup_errors.is_empty()).then(|| cleanup_errors.join("; ")),
        })
    }

    /// Rewrite and persist the descendants of `old_father`; never returns early with `Err`
    async fn rewrite_subtree(&self, old_father: &TreeNode, new_father: &TreeNode) -> SubtreeRewrite {
        let descendants = match self.get_all_children(old_father.external_id, -1).await {
            Ok(descendants) => descendants,
            Err(e) => {
                return SubtreeRewrite::Failed {
                    attempted: 0,
                    reason: e.to_string(),
                }
            }
        };

        let attempted = descendants.len();
        if attempted == 0 {
            return SubtreeRewrite::Completed { moved: 0 };
        }

        let level_diff = i64::from(new_father.tree_level) - i64::from(old_father.tree_level);
        let old_prefix = old_father.descendant_prefix();
        let new_prefix = new_father.descendant_prefix();

        let batch = match descendants
            .into_iter()
            .map(|node| relocate(node, &old_prefix, &new_prefix, level_diff))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(batch) => batch,
            Err(e) => {
                return SubtreeRewrite::Failed {
                    attempted,
                    reason: e.to_string(),
                }
            }
        };

        match self.store.save_all(batch).await {
            Ok(saved) => SubtreeRewrite::Completed { moved: saved.len() },
            Err(e) => SubtreeRewrite::Failed {
                attempted,
                reason: format!("{:#}", e),
            },
        }
    }

    /// Father flags after a completed move
    async fn reconcile_fathers(
        &self,
        mut old_father: TreeNode,
        mut new_father: TreeNode,
        moved: usize,
    ) -> Result<(), TreeError> {
        old_father.has_children = false;

        if moved == 0 || new_father.has_children {
            self.store
                .save(old_father)
                .await
                .map_err(TreeError::store_failed)?;
        } else {
            new_father.has_children = true;
            self.store
                .save_all(vec![old_father, new_father])
                .await
                .map_err(TreeError::store_failed)?;
        }

        Ok(())
    }

    /// Recompute `has_children` from the store for each id, writing only changed flags
    async fn recount_child_flags(&self, node_ids: &[NodeId]) -> Result<(), TreeError> {
        for &node_id in node_ids {
            let mut node = self.get_node(node_id).await?;
            let has_children = !self.get_all_children(node_id, 1).await?.is_empty();
            if node.has_children != has_children {
                node.has_children = has_children;
                self.store
                    .save(node)
                    .await
                    .map_err(TreeError::store_failed)?;
            }
        }

        Ok(())
    }

    //
    // LOCKS
    //

    /// Lock a single node on behalf of `requester_id`
    pub async fn lock_node(
        &self,
        node_id: NodeId,
        requester_id: RequesterId,
        expires_at: Option<DateTime<Utc>>,
        description: Option<String>,
    ) -> Result<(), TreeError> {
        self.locks
            .lock_nodes(&[node_id], requester_id, expires_at, description)
            .await?;
        Ok(())
    }

    /// Release the lock on a single node
    pub async fn unlock_node(&self, node_id: NodeId) -> Result<(), TreeError> {
        self.locks.unlock_nodes(&[node_id]).await?;
        Ok(())
    }

    async fn ensure_unlocked(&self, node_ids: &[NodeId]) -> Result<(), TreeError> {
        if self.locks.is_locked(node_ids).await? {
            tracing::debug!("Lock pre-check failed for {:?}", node_ids);
            return Err(TreeError::node_locked(node_ids));
        }
        Ok(())
    }
}

/// Re-anchor a descendant from `old_prefix` to `new_prefix`
fn relocate(
    mut node: TreeNode,
    old_prefix: &str,
    new_prefix: &str,
    level_diff: i64,
) -> Result<TreeNode, TreeError> {
    let path = node.ancestor_path.as_deref().unwrap_or_default();
    let rest = path.strip_prefix(old_prefix).ok_or_else(|| {
        TreeError::node_invalid(
            node.external_id,
            format!("path '{}' does not start with '{}'", path, old_prefix),
        )
    })?;

    let tree_level = u32::try_from(i64::from(node.tree_level) + level_diff).map_err(|_| {
        TreeError::node_invalid(node.external_id, "relocated level would be negative")
    })?;

    node.ancestor_path = Some(format!("{}{}", new_prefix, rest));
    node.tree_level = tree_level;
    node.validate()?;

    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relocate_replaces_leading_prefix_only() {
        let mut node = TreeNode::root(30);
        node.ancestor_path = Some("{1}{10}{20}".to_string());
        node.tree_level = 3;

        let moved = relocate(node, "{1}{10}", "{1}{5}{6}", 1).unwrap();
        assert_eq!(moved.ancestor_path.as_deref(), Some("{1}{5}{6}{20}"));
        assert_eq!(moved.tree_level, 4);
    }

    #[test]
    fn test_relocate_ignores_inner_occurrences() {
        let mut node = TreeNode::root(30);
        node.ancestor_path = Some("{2}{1}{10}".to_string());
        node.tree_level = 3;

        let err = relocate(node, "{1}{10}", "{7}", -1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NodeInvalid);
    }

    #[test]
    fn test_relocate_shallower() {
        let mut node = TreeNode::root(30);
        node.ancestor_path = Some("{1}{2}{3}{4}".to_string());
        node.tree_level = 4;

        let moved = relocate(node, "{1}{2}{3}", "{9}", -2).unwrap();
        assert_eq!(moved.ancestor_path.as_deref(), Some("{9}{4}"));
        assert_eq!(moved.tree_level, 2);
    }

    #[test]
    fn test_report_completion() {
        let report = ReparentReport {
            old_father_id: 1,
            new_father_id: 2,
            rewrite: SubtreeRewrite::Failed {
                attempted: 3,
                reason: "boom".to_string(),
            },
            cleanup_error: None,
        };
        assert!(!report.is_complete());
        assert!(report.is_clean());
    }
}
