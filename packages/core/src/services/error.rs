//! Tree Operation Error Types
//!
//! `TreeError` is what every `TreeOperator` operation returns. `ErrorKind`
//! is its closed, copyable classification, used wherever a caller recovers
//! from one kind of failure and propagates the rest.

use crate::models::{NodeId, ValidationError};
use crate::services::lock_coordinator::LockError;
use crate::utils::PathError;
use thiserror::Error;

/// Classification of a `TreeError`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NodeNotExist,
    NodeLocked,
    NodeInvalid,
    RuleViolation,
    InvalidFormat,
    VersionConflict,
    Configuration,
    BackendFailed,
}

/// Tree operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Lookup by external id found no row
    #[error("Node {node_id} does not exist")]
    NodeNotExist { node_id: NodeId },

    /// A lock pre-check or lock acquisition hit a held lock
    #[error("One or more nodes being locked by another process: {node_ids:?}")]
    NodeLocked { node_ids: Vec<NodeId> },

    /// Structural precondition violated (e.g. deleting a non-leaf)
    #[error("Node {node_id} is invalid for this operation: {reason}")]
    NodeInvalid { node_id: NodeId, reason: String },

    /// Re-parenting would break the tree (cycle or self move)
    #[error("Tree rule violated: {reason}")]
    RuleViolation { reason: String },

    /// Stored ancestor path fails the grammar
    #[error("Ancestor path has invalid format: '{path}'")]
    InvalidFormat { path: String },

    /// Version-conditioned write lost against a concurrent change
    #[error("Version conflict for node {node_id}: expected version {expected_version}, found {actual_version}")]
    VersionConflict {
        node_id: NodeId,
        expected_version: i64,
        actual_version: i64,
    },

    /// Root id could not be resolved from configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Node store or lock service failed
    #[error("{backend} operation failed: {message}")]
    BackendFailed {
        backend: &'static str,
        message: String,
    },
}

impl TreeError {
    /// Closed classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            TreeError::NodeNotExist { .. } => ErrorKind::NodeNotExist,
            TreeError::NodeLocked { .. } => ErrorKind::NodeLocked,
            TreeError::NodeInvalid { .. } => ErrorKind::NodeInvalid,
            TreeError::RuleViolation { .. } => ErrorKind::RuleViolation,
            TreeError::InvalidFormat { .. } => ErrorKind::InvalidFormat,
            TreeError::VersionConflict { .. } => ErrorKind::VersionConflict,
            TreeError::Configuration(_) => ErrorKind::Configuration,
            TreeError::BackendFailed { .. } => ErrorKind::BackendFailed,
        }
    }

    /// Create a node not exist error
    pub fn node_not_exist(node_id: NodeId) -> Self {
        Self::NodeNotExist { node_id }
    }

    /// Create a node locked error
    pub fn node_locked(node_ids: impl Into<Vec<NodeId>>) -> Self {
        Self::NodeLocked {
            node_ids: node_ids.into(),
        }
    }

    /// Create a node invalid error
    pub fn node_invalid(node_id: NodeId, reason: impl Into<String>) -> Self {
        Self::NodeInvalid {
            node_id,
            reason: reason.into(),
        }
    }

    /// Create a rule violation error
    pub fn rule_violation(reason: impl Into<String>) -> Self {
        Self::RuleViolation {
            reason: reason.into(),
        }
    }

    /// Create a version conflict error
    pub fn version_conflict(node_id: NodeId, expected_version: i64, actual_version: i64) -> Self {
        Self::VersionConflict {
            node_id,
            expected_version,
            actual_version,
        }
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Wrap a node store failure
    pub fn store_failed(err: anyhow::Error) -> Self {
        Self::BackendFailed {
            backend: "Node store",
            message: format!("{:#}", err),
        }
    }

    /// Wrap a lock service failure
    pub fn lock_failed(msg: impl Into<String>) -> Self {
        Self::BackendFailed {
            backend: "Lock service",
            message: msg.into(),
        }
    }
}

impl From<PathError> for TreeError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::InvalidFormat { path } => TreeError::InvalidFormat { path },
        }
    }
}

impl From<ValidationError> for TreeError {
    fn from(err: ValidationError) -> Self {
        let reason = err.to_string();
        match err {
            ValidationError::InvalidPath(path_err) => path_err.into(),
            ValidationError::LevelMismatch { node_id, .. } => {
                TreeError::node_invalid(node_id, reason)
            }
            ValidationError::NegativeId(node_id) => TreeError::node_invalid(node_id, reason),
        }
    }
}

impl From<LockError> for TreeError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::AlreadyLocked { node_ids } => TreeError::node_locked(node_ids),
            LockError::Backend(msg) => TreeError::lock_failed(msg),
        }
    }
}
