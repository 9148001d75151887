//! Audit sink implementations

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::Mutex;

use super::{AuditOutcome, AuditRecord, AuditSink};

/// Emits audit records as structured `tracing` events under the `audit` target
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) {
        match record.outcome {
            AuditOutcome::Success => tracing::info!(
                target: "audit",
                audit_id = %record.id,
                action = record.action.as_str(),
                outcome = record.outcome.as_str(),
                user_id = ?record.user_id,
                session_id = ?record.session_id,
                token_family_id = ?record.token_family_id,
                address = ?record.address,
                detail = %record.detail,
                "audit"
            ),
            AuditOutcome::Failure => tracing::warn!(
                target: "audit",
                audit_id = %record.id,
                action = record.action.as_str(),
                outcome = record.outcome.as_str(),
                user_id = ?record.user_id,
                session_id = ?record.session_id,
                token_family_id = ?record.token_family_id,
                address = ?record.address,
                detail = %record.detail,
                "audit"
            ),
        }
    }
}

/// Persists audit records to `auth_audit_log`
#[derive(Clone)]
pub struct PgAuditSink {
    db_pool: PgPool,
}

impl PgAuditSink {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, record: AuditRecord) {
        let result = sqlx::query(
            r#"
            INSERT INTO auth_audit_log (id, action, outcome, user_id, session_id, token_family_id, address, detail, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(record.action.as_str())
        .bind(record.outcome.as_str())
        .bind(record.user_id)
        .bind(record.session_id)
        .bind(record.token_family_id)
        .bind(&record.address)
        .bind(&record.detail)
        .bind(record.occurred_at)
        .execute(&self.db_pool)
        .await;

        if let Err(e) = result {
            tracing::error!(
                target: "audit",
                audit_id = %record.id,
                error = %e,
                "Failed to persist audit record"
            );
            // Fall back to the log stream
            TracingAuditSink.record(record).await;
        }
    }
}

/// Collects records in memory
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: AuditRecord) {
        self.records.lock().await.push(record);
    }
}
