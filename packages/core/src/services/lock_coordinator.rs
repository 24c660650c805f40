//! Advisory Lock Coordination
//!
//! Structural mutations check the lock state of every node id they affect
//! before writing, and re-parenting holds an explicit lock on its two pivot
//! ids. The `LockCoordinator` trait is the contract a lock service must
//! honour; `InMemoryLockCoordinator` is the process-local implementation.
//!
//! # Semantics
//!
//! - A check is a read of lock state, never a hold
//! - Locks may carry an expiry; expired locks count as released
//! - Acquiring several ids is all-or-nothing
//! - Re-acquiring an id already held by the same requester refreshes it

use crate::models::{NodeId, NodeLock, RequesterId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Lock service errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Some of the requested ids are held by another requester
    #[error("Nodes already locked by another requester: {node_ids:?}")]
    AlreadyLocked { node_ids: Vec<NodeId> },

    /// The lock service itself failed
    #[error("Lock service failure: {0}")]
    Backend(String),
}

/// Contract of the external lock service
#[async_trait]
pub trait LockCoordinator: Send + Sync {
    /// Whether any of `node_ids` is currently locked
    async fn is_locked(&self, node_ids: &[NodeId]) -> Result<bool, LockError>;

    /// Lock every id in `node_ids` for `requester_id`, or none of them
    async fn lock_nodes(
        &self,
        node_ids: &[NodeId],
        requester_id: RequesterId,
        expires_at: Option<DateTime<Utc>>,
        description: Option<String>,
    ) -> Result<(), LockError>;

    /// Release the locks on `node_ids`; unknown ids are ignored
    async fn unlock_nodes(&self, node_ids: &[NodeId]) -> Result<(), LockError>;
}

/// Process-local lock table
#[derive(Debug, Default)]
pub struct InMemoryLockCoordinator {
    locks: RwLock<HashMap<NodeId, NodeLock>>,
}

impl InMemoryLockCoordinator {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Unexpired locks, ordered by node id
    pub async fn active_locks(&self) -> Vec<NodeLock> {
        let now = Utc::now();
        let locks = self.locks.read().await;
        let mut active: Vec<NodeLock> = locks
            .values()
            .filter(|lock| !lock.is_expired_at(now))
            .cloned()
            .collect();
        active.sort_by_key(|lock| lock.node_id);
        active
    }

    /// Drop expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut locks = self.locks.write().await;
        let before = locks.len();
        locks.retain(|_, lock| !lock.is_expired_at(now));
        before - locks.len()
    }
}

#[async_trait]
impl LockCoordinator for InMemoryLockCoordinator {
    async fn is_locked(&self, node_ids: &[NodeId]) -> Result<bool, LockError> {
        let now = Utc::now();
        let locks = self.locks.read().await;
        Ok(node_ids.iter().any(|id| {
            locks
                .get(id)
                .is_some_and(|lock| !lock.is_expired_at(now))
        }))
    }

    async fn lock_nodes(
        &self,
        node_ids: &[NodeId],
        requester_id: RequesterId,
        expires_at: Option<DateTime<Utc>>,
        description: Option<String>,
    ) -> Result<(), LockError> {
        let now = Utc::now();
        let mut locks = self.locks.write().await;

        let mut conflicting: Vec<NodeId> = node_ids
            .iter()
            .copied()
            .filter(|id| {
                locks.get(id).is_some_and(|lock| {
                    !lock.is_expired_at(now) && lock.requester_id != requester_id
                })
            })
            .collect();
        if !conflicting.is_empty() {
            conflicting.sort_unstable();
            conflicting.dedup();
            return Err(LockError::AlreadyLocked {
                node_ids: conflicting,
            });
        }

        for &node_id in node_ids {
            locks.insert(
                node_id,
                NodeLock {
                    node_id,
                    requester_id,
                    locked_at: now,
                    expires_at,
                    description: description.clone(),
                },
            );
        }

        tracing::debug!("Requester {} locked nodes {:?}", requester_id, node_ids);
        Ok(())
    }

    async fn unlock_nodes(&self, node_ids: &[NodeId]) -> Result<(), LockError> {
        let mut locks = self.locks.write().await;
        for node_id in node_ids {
            locks.remove(node_id);
        }
        tracing::debug!("Unlocked nodes {:?}", node_ids);
        Ok(())
    }
}
