//! Store Error Types
//!
//! Errors raised by the bundled `NodeStore` adapters. Store trait methods
//! return `anyhow::Result`, so these travel as the error's root cause.

use crate::models::{NodeId, ValidationError};
use thiserror::Error;

/// Node store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Row rejected by the write-boundary validation
    #[error("Refusing to persist node {node_id}: {source}")]
    InvalidRow {
        node_id: NodeId,
        source: ValidationError,
    },

    /// Insert of an external id that already has a row
    #[error("Node {node_id} already exists")]
    DuplicateExternalId { node_id: NodeId },

    /// Update of a row that is no longer stored
    #[error("Node {node_id} is not stored")]
    MissingRow { node_id: NodeId },

    /// Update carrying a row id that belongs to a different row
    #[error("Node {node_id} carries row id {row_id} but the stored row differs")]
    RowIdMismatch { node_id: NodeId, row_id: i64 },
}

impl StoreError {
    /// Create an invalid row error
    pub fn invalid_row(node_id: NodeId, source: ValidationError) -> Self {
        Self::InvalidRow { node_id, source }
    }

    /// Create a duplicate external id error
    pub fn duplicate_external_id(node_id: NodeId) -> Self {
        Self::DuplicateExternalId { node_id }
    }

    /// Create a missing row error
    pub fn missing_row(node_id: NodeId) -> Self {
        Self::MissingRow { node_id }
    }

    /// Create a row id mismatch error
    pub fn row_id_mismatch(node_id: NodeId, row_id: i64) -> Self {
        Self::RowIdMismatch { node_id, row_id }
    }
}
