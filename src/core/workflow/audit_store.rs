// Audit trail port - classification results, moderator decisions and
// statistics snapshots. Records here outlive the queue items they came from.

use super::workflow_models::ModerationDecision;
use crate::core::moderation::{FlaggingStatistics, ModerationResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Storage error: {0}")]
    StorageError(String),
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append a classification result.
    async fn save_result(&self, result: &ModerationResult) -> Result<(), AuditError>;

    /// Most recent classification result for the content.
    async fn latest_result(&self, content_id: &str)
        -> Result<Option<ModerationResult>, AuditError>;

    async fn record_decision(&self, decision: &ModerationDecision) -> Result<(), AuditError>;

    async fn get_decision(&self, decision_id: &str)
        -> Result<Option<ModerationDecision>, AuditError>;

    async fn latest_decision_for_content(
        &self,
        content_id: &str,
    ) -> Result<Option<ModerationDecision>, AuditError>;

    /// Decisions made between `start` and `end`, inclusive, oldest first.
    async fn decisions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ModerationDecision>, AuditError>;

    /// Flag a decision as overturned. Returns false if it does not exist or
    /// was already overturned.
    async fn mark_overturned(&self, decision_id: &str) -> Result<bool, AuditError>;

    async fn save_statistics(&self, stats: &FlaggingStatistics) -> Result<(), AuditError>;

    async fn load_statistics(&self) -> Result<Option<FlaggingStatistics>, AuditError>;
}
