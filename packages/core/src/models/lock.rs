//! Advisory node locks

use super::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Id of the user or process requesting a lock
pub type RequesterId = i64;

/// An advisory lock held on one tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeLock {
    pub node_id: NodeId,

    pub requester_id: RequesterId,

    pub locked_at: DateTime<Utc>,

    /// `None` holds the lock until it is explicitly released
    pub expires_at: Option<DateTime<Utc>>,

    /// Free-text reason shown to whoever hits the lock
    pub description: Option<String>,
}

impl NodeLock {
    /// Whether the lock no longer applies at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn lock_expiring(expires_at: Option<DateTime<Utc>>) -> NodeLock {
        NodeLock {
            node_id: 1,
            requester_id: 7,
            locked_at: Utc::now(),
            expires_at,
            description: None,
        }
    }

    #[test]
    fn test_lock_without_expiry_never_expires() {
        let lock = lock_expiring(None);
        assert!(!lock.is_expired_at(Utc::now() + Duration::days(365)));
    }

    #[test]
    fn test_lock_expires_at_deadline() {
        let now = Utc::now();
        let lock = lock_expiring(Some(now + Duration::seconds(30)));

        assert!(!lock.is_expired_at(now));
        assert!(lock.is_expired_at(now + Duration::seconds(30)));
    }
}
