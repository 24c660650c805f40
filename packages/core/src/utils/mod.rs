//! Utility functions for the collaborator tree
//!
//! This module provides the stateless helpers shared by the store adapters
//! and the tree operator.

pub mod path_codec;

pub use path_codec::PathError;
