//! Message envelope shared by every command and query.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use cloudlift_core::UserId;

/// Metadata every dispatched message carries. Assigned at construction, not
/// at dispatch, so retries keep the same id.
#[derive(Debug, Clone)]
pub struct MessageInfo {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Actor on whose behalf the message runs, when known.
    pub user_id: Option<UserId>,
    /// Ties messages belonging to one logical operation together.
    pub correlation_id: Option<Uuid>,
    pub metadata: BTreeMap<String, String>,
}

impl MessageInfo {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            user_id: None,
            correlation_id: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::new()
        }
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

impl Default for MessageInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// A state-changing message. Handlers return no value.
pub trait Command: Send + 'static {
    fn info(&self) -> &MessageInfo;
}

/// A read-only message with a typed result.
pub trait Query: Send + 'static {
    type Output: Send + 'static;

    fn info(&self) -> &MessageInfo;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_is_assigned_at_construction() {
        let a = MessageInfo::new();
        let b = MessageInfo::new();
        assert_ne!(a.id, b.id);
        assert!(a.user_id.is_none());
    }

    #[test]
    fn correlation_chains() {
        let root = Uuid::now_v7();
        let info = MessageInfo::for_user(UserId::new()).with_correlation(root);
        assert_eq!(info.correlation_id, Some(root));
        assert!(info.user_id.is_some());
    }
}
