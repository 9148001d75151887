//! Audit trail for credential lifecycle events
//!
//! Records are written synchronously on the request path. Sinks absorb
//! their own failures: an audit write never changes the outcome of the
//! operation it describes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

mod sinks;

pub use sinks::{MemoryAuditSink, PgAuditSink, TracingAuditSink};

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Login,
    Refresh,
    ReuseDetected,
    Logout,
    LogoutAll,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "login",
            AuditAction::Refresh => "refresh",
            AuditAction::ReuseDetected => "reuse_detected",
            AuditAction::Logout => "logout",
            AuditAction::LogoutAll => "logout_all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "failure",
        }
    }
}

/// A single audit record
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    pub user_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub token_family_id: Option<Uuid>,
    pub address: Option<String>,
    /// Free-form structured context; never holds secrets
    pub detail: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(action: AuditAction, outcome: AuditOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            outcome,
            user_id: None,
            session_id: None,
            token_family_id: None,
            address: None,
            detail: serde_json::Value::Object(Default::default()),
            occurred_at: Utc::now(),
        }
    }

    pub fn success(action: AuditAction) -> Self {
        Self::new(action, AuditOutcome::Success)
    }

    pub fn failure(action: AuditAction) -> Self {
        Self::new(action, AuditOutcome::Failure)
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn family(mut self, family_id: Uuid) -> Self {
        self.token_family_id = Some(family_id);
        self
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let user_id = Uuid::new_v4();
        let family_id = Uuid::new_v4();
        let record = AuditRecord::failure(AuditAction::ReuseDetected)
            .user(user_id)
            .family(family_id)
            .detail(serde_json::json!({ "revoked_sessions": 1 }));

        assert_eq!(record.outcome, AuditOutcome::Failure);
        assert_eq!(record.user_id, Some(user_id));
        assert_eq!(record.token_family_id, Some(family_id));
        assert_eq!(record.session_id, None);
        assert_eq!(record.detail["revoked_sessions"], 1);
    }

    #[test]
    fn test_record_serializes_snake_case() {
        let record = AuditRecord::success(AuditAction::LogoutAll);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["action"], "logout_all");
        assert_eq!(json["outcome"], "success");
    }
}
