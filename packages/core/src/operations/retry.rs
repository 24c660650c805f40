//! Retry wrapper for optimistic version conflicts
//!
//! `update_node` and `cut_leaf` write conditioned on the row version they
//! read. Under contention that write can lose; callers are expected to
//! re-read and retry rather than block. This queue does exactly that with
//! exponential backoff.
//!
//! # Example
//!
//! ```rust,no_run
//! use collab_tree_core::operations::TreeRetryQueue;
//! use collab_tree_core::TreeOperator;
//! use std::sync::Arc;
//!
//! # async fn example(operator: Arc<TreeOperator>) -> Result<(), Box<dyn std::error::Error>> {
//! let queue = TreeRetryQueue::new(operator);
//!
//! // Retry up to 3 times with exponential backoff (10ms, 20ms, 40ms)
//! let node = queue.update_node_with_retry(42, 3).await?;
//! println!("node 42 has children: {}", node.has_children);
//! # Ok(())
//! # }
//! ```

use crate::models::{NodeId, TreeNode};
use crate::services::{TreeError, TreeOperator};
use std::sync::Arc;
use tokio::time::Duration;

/// Base delay of the exponential backoff
const BASE_BACKOFF_MS: u64 = 10;

fn backoff(attempt: usize) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS << attempt.min(16))
}

/// Retries version-conditioned tree writes
pub struct TreeRetryQueue {
    operator: Arc<TreeOperator>,
}

impl TreeRetryQueue {
    /// Create a queue over the given operator
    pub fn new(operator: Arc<TreeOperator>) -> Self {
        Self { operator }
    }

    /// Reconcile `has_children`, retrying on version conflicts
    ///
    /// Each attempt re-reads the current version. `max_retries = 0` means a
    /// single attempt.
    ///
    /// # Returns
    ///
    /// - `Ok(node)` - reconciled (possibly after retries)
    /// - `Err(TreeError::VersionConflict)` - max retries exceeded
    /// - `Err(_)` - non-retriable error, returned at once
    pub async fn update_node_with_retry(
        &self,
        node_id: NodeId,
        max_retries: usize,
    ) -> Result<TreeNode, TreeError> {
        let mut attempt = 0;

        loop {
            let node = self.operator.get_node(node_id).await?;

            match self.operator.update_node(node_id, node.version).await {
                Ok(node) => {
                    if attempt > 0 {
                        tracing::debug!(
                            "Reconcile of node {} succeeded after {} retry(ies)",
                            node_id,
                            attempt
                        );
                    }
                    return Ok(node);
                }

                Err(TreeError::VersionConflict {
                    expected_version,
                    actual_version,
                    ..
                }) if attempt < max_retries => {
                    tracing::debug!(
                        "Version conflict on attempt {}/{} for node {}: expected v{}, got v{}. Retrying...",
                        attempt + 1,
                        max_retries + 1,
                        node_id,
                        expected_version,
                        actual_version
                    );
                    tokio::time::sleep(backoff(attempt)).await;
                    attempt += 1;
                }

                Err(e) => {
                    if matches!(e, TreeError::VersionConflict { .. }) {
                        tracing::warn!(
                            "Max retries ({}) exceeded reconciling node {}",
                            max_retries,
                            node_id
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Delete a leaf, retrying when the delete loses a version race
    ///
    /// Returns `Ok(false)` only once `max_retries` is exhausted. If the
    /// node disappears or gains children between attempts, that error is
    /// returned instead.
    pub async fn cut_leaf_with_retry(
        &self,
        node_id: NodeId,
        max_retries: usize,
    ) -> Result<bool, TreeError> {
        let mut attempt = 0;

        loop {
            if self.operator.cut_leaf(node_id).await? {
                return Ok(true);
            }

            if attempt >= max_retries {
                tracing::warn!(
                    "Max retries ({}) exceeded cutting leaf {}",
                    max_retries,
                    node_id
                );
                return Ok(false);
            }

            tokio::time::sleep(backoff(attempt)).await;
            attempt += 1;
        }
    }
}
