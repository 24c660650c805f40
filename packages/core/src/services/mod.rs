//! Tree Services
//!
//! - `TreeOperator` - structural operations on the collaborator tree
//! - `LockCoordinator` - contract of the advisory lock service
//! - `RootIdResolver` - cached lookup of the configured default root
//!
//! Services coordinate between the storage layer and callers, enforcing the
//! lock, version and path invariants of the tree.

pub mod configuration;
pub mod error;
pub mod lock_coordinator;
pub mod tree_operator;

pub use configuration::{ConfigurationSource, RootIdResolver, StaticConfiguration};
pub use error::{ErrorKind, TreeError};
pub use lock_coordinator::{InMemoryLockCoordinator, LockCoordinator, LockError};
pub use tree_operator::{ReparentReport, SubtreeRewrite, TreeOperator};
