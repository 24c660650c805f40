//! In-memory `NodeStore`
//!
//! Keeps every row in a `BTreeMap` keyed by external id behind a tokio
//! `RwLock`. Used for tests and for embedding the tree in a single process.

use super::error::StoreError;
use super::node_store::NodeStore;
use crate::models::{NodeId, TreeNode, INITIAL_VERSION};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct StoreState {
    rows: BTreeMap<NodeId, TreeNode>,
    next_row_id: i64,
}

impl StoreState {
    /// Check that `node` could be written without touching any state
    fn check_write(&self, node: &TreeNode, inserted: &mut HashSet<NodeId>) -> Result<(), StoreError> {
        node.validate()
            .map_err(|e| StoreError::invalid_row(node.external_id, e))?;

        match node.row_id() {
            None => {
                if self.rows.contains_key(&node.external_id) || !inserted.insert(node.external_id) {
                    return Err(StoreError::duplicate_external_id(node.external_id));
                }
            }
            Some(row_id) => {
                let stored = self
                    .rows
                    .get(&node.external_id)
                    .ok_or_else(|| StoreError::missing_row(node.external_id))?;
                if stored.row_id() != Some(row_id) {
                    return Err(StoreError::row_id_mismatch(node.external_id, row_id));
                }
            }
        }

        Ok(())
    }

    /// Write a row that already passed `check_write`
    fn apply_write(&mut self, mut node: TreeNode) -> TreeNode {
        match self.rows.get(&node.external_id) {
            Some(stored) => node.version = stored.version + 1,
            None => {
                self.next_row_id += 1;
                node.set_row_id(self.next_row_id);
                node.version = INITIAL_VERSION;
            }
        }

        self.rows.insert(node.external_id, node.clone());
        node
    }
}

/// In-memory node store
#[derive(Debug, Default)]
pub struct InMemoryNodeStore {
    state: RwLock<StoreState>,
}

impl InMemoryNodeStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows
    pub async fn len(&self) -> usize {
        self.state.read().await.rows.len()
    }

    /// Whether the store holds no rows
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.rows.is_empty()
    }

    /// Snapshot of every stored row, ordered by external id
    pub async fn all_nodes(&self) -> Vec<TreeNode> {
        self.state.read().await.rows.values().cloned().collect()
    }
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn get_by_external_id(&self, external_id: NodeId) -> Result<Option<TreeNode>> {
        Ok(self.state.read().await.rows.get(&external_id).cloned())
    }

    async fn save(&self, node: TreeNode) -> Result<TreeNode> {
        let mut state = self.state.write().await;
        state.check_write(&node, &mut HashSet::new())?;
        Ok(state.apply_write(node))
    }

    async fn save_all(&self, nodes: Vec<TreeNode>) -> Result<Vec<TreeNode>> {
        let mut state = self.state.write().await;

        let mut inserted = HashSet::new();
        let mut updated = HashSet::new();
        for node in &nodes {
            state.check_write(node, &mut inserted)?;
            if node.row_id().is_some() && !updated.insert(node.external_id) {
                anyhow::bail!("Node {} appears twice in one batch", node.external_id);
            }
        }

        Ok(nodes
            .into_iter()
            .map(|node| state.apply_write(node))
            .collect())
    }

    async fn delete_by_external_id_and_version(
        &self,
        external_id: NodeId,
        version: i64,
    ) -> Result<u64> {
        let mut state = self.state.write().await;
        match state.rows.get(&external_id) {
            Some(stored) if stored.version == version => {
                state.rows.remove(&external_id);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn update_has_children_by_version(
        &self,
        external_id: NodeId,
        version: i64,
        has_children: bool,
    ) -> Result<u64> {
        let mut state = self.state.write().await;
        match state.rows.get_mut(&external_id) {
            Some(stored) if stored.version == version => {
                stored.has_children = has_children;
                stored.version += 1;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn find_by_level_range_and_path_prefix(
        &self,
        min_level: u32,
        max_level: Option<u32>,
        prefix: &str,
    ) -> Result<Vec<TreeNode>> {
        let state = self.state.read().await;
        let mut found: Vec<TreeNode> = state
            .rows
            .values()
            .filter(|node| node.tree_level >= min_level)
            .filter(|node| max_level.map_or(true, |max| node.tree_level <= max))
            .filter(|node| {
                node.ancestor_path
                    .as_deref()
                    .is_some_and(|path| path.starts_with(prefix))
            })
            .cloned()
            .collect();

        found.sort_by_key(|node| (node.tree_level, node.external_id));
        Ok(found)
    }
}
