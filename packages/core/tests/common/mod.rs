//! Shared fixtures for the collaborator tree integration tests

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use collab_tree_core::db::{InMemoryNodeStore, NodeStore};
use collab_tree_core::{
    InMemoryLockCoordinator, NodeId, RootIdResolver, StaticConfiguration, TreeConfig, TreeNode,
    TreeOperator,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const ROOT_ID: NodeId = 1;

/// `InMemoryNodeStore` with switchable faults
///
/// - `fail_next_batch`: the next `save_all` errors without writing
/// - `fail_next_save`: the next single-row `save` errors without writing
/// - `interfere_with_updates(n)`: the next `n` version-conditioned flag
///   updates find the row already bumped by a "concurrent writer"
/// - `interfere_with_deletes(n)`: same for version-conditioned deletes
/// - `corrupt(node)`: serve `node` from reads as if it were stored, bypassing
///   write validation
#[derive(Default)]
pub struct FaultyStore {
    inner: InMemoryNodeStore,
    fail_next_batch: AtomicBool,
    fail_next_save: AtomicBool,
    stale_updates: AtomicUsize,
    stale_deletes: AtomicUsize,
    overlay: Mutex<HashMap<NodeId, TreeNode>>,
}

impl FaultyStore {
    pub fn fail_next_batch(&self) {
        self.fail_next_batch.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    pub fn interfere_with_updates(&self, times: usize) {
        self.stale_updates.store(times, Ordering::SeqCst);
    }

    pub fn interfere_with_deletes(&self, times: usize) {
        self.stale_deletes.store(times, Ordering::SeqCst);
    }

    pub fn corrupt(&self, node: TreeNode) {
        self.overlay.lock().unwrap().insert(node.external_id, node);
    }

    pub async fn all_nodes(&self) -> Vec<TreeNode> {
        self.inner.all_nodes().await
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Rewrite the stored row unchanged, bumping its version
    async fn bump_version(&self, external_id: NodeId) -> Result<()> {
        if let Some(node) = self.inner.get_by_external_id(external_id).await? {
            self.inner.save(node).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl NodeStore for FaultyStore {
    async fn get_by_external_id(&self, external_id: NodeId) -> Result<Option<TreeNode>> {
        if let Some(node) = self.overlay.lock().unwrap().get(&external_id) {
            return Ok(Some(node.clone()));
        }
        self.inner.get_by_external_id(external_id).await
    }

    async fn save(&self, node: TreeNode) -> Result<TreeNode> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            anyhow::bail!("injected save failure");
        }
        self.inner.save(node).await
    }

    async fn save_all(&self, nodes: Vec<TreeNode>) -> Result<Vec<TreeNode>> {
        if self.fail_next_batch.swap(false, Ordering::SeqCst) {
            anyhow::bail!("injected batch failure");
        }
        self.inner.save_all(nodes).await
    }

    async fn delete_by_external_id_and_version(
        &self,
        external_id: NodeId,
        version: i64,
    ) -> Result<u64> {
        if Self::take_one(&self.stale_deletes) {
            self.bump_version(external_id).await?;
        }
        self.inner
            .delete_by_external_id_and_version(external_id, version)
            .await
    }

    async fn update_has_children_by_version(
        &self,
        external_id: NodeId,
        version: i64,
        has_children: bool,
    ) -> Result<u64> {
        if Self::take_one(&self.stale_updates) {
            self.bump_version(external_id).await?;
        }
        self.inner
            .update_has_children_by_version(external_id, version, has_children)
            .await
    }

    async fn find_by_level_range_and_path_prefix(
        &self,
        min_level: u32,
        max_level: Option<u32>,
        prefix: &str,
    ) -> Result<Vec<TreeNode>> {
        let mut found = self
            .inner
            .find_by_level_range_and_path_prefix(min_level, max_level, prefix)
            .await?;

        let overlay = self.overlay.lock().unwrap();
        found.retain(|node| !overlay.contains_key(&node.external_id));
        found.extend(
            overlay
                .values()
                .filter(|node| node.tree_level >= min_level)
                .filter(|node| max_level.map_or(true, |max| node.tree_level <= max))
                .filter(|node| {
                    node.ancestor_path
                        .as_deref()
                        .is_some_and(|path| path.starts_with(prefix))
                })
                .cloned(),
        );
        found.sort_by_key(|node| (node.tree_level, node.external_id));
        Ok(found)
    }
}

/// Operator over a seeded store holding a single root `ROOT_ID`
pub struct Harness {
    pub operator: Arc<TreeOperator>,
    pub store: Arc<FaultyStore>,
    pub locks: Arc<InMemoryLockCoordinator>,
    pub configuration: Arc<StaticConfiguration>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(TreeConfig::default()).await
    }

    pub async fn with_config(config: TreeConfig) -> Self {
        collab_tree_core::logging::init_tracing("warn");

        let store = Arc::new(FaultyStore::default());
        store.save(TreeNode::root(ROOT_ID)).await.unwrap();

        let locks = Arc::new(InMemoryLockCoordinator::new());
        let configuration = Arc::new(StaticConfiguration::with_value(
            &config.config_group,
            &config.root_id_key,
            ROOT_ID.to_string(),
        ));
        let resolver = Arc::new(RootIdResolver::from_config(configuration.clone(), &config));

        let operator = Arc::new(
            TreeOperator::new(store.clone(), locks.clone(), resolver, config).unwrap(),
        );

        Self {
            operator,
            store,
            locks,
            configuration,
        }
    }

    /// Insert each `(father, child)` pair in order
    pub async fn grow(&self, edges: &[(NodeId, NodeId)]) {
        for &(father, child) in edges {
            self.operator.add_leaf(father, child).await.unwrap();
        }
    }

    pub async fn node(&self, node_id: NodeId) -> TreeNode {
        self.operator.get_node(node_id).await.unwrap()
    }

    pub async fn ids_under(&self, father_id: NodeId, sub_level_limit: i32) -> Vec<NodeId> {
        self.operator
            .get_all_children(father_id, sub_level_limit)
            .await
            .unwrap()
            .iter()
            .map(|node| node.external_id)
            .collect()
    }
}
