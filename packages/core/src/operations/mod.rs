//! Tree Maintenance Operations
//!
//! Helpers layered on top of `TreeOperator`:
//!
//! - `TreeRetryQueue` - retries version-conditioned writes that lost a race
//! - `TreeAuditor` - detects and repairs inconsistent rows in a subtree

pub mod audit;
pub mod retry;

pub use audit::{AuditReport, TreeAuditor, TreeIssue};
pub use retry::TreeRetryQueue;
