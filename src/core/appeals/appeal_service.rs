// Appeal service - users contest decisions, moderators rule on them.
//
// An approved appeal reverses the penalties tied to the appealed decision or
// content, marks the decision overturned and makes the content visible again.
// A decided appeal is final: reviewing it again fails with "Already resolved".
//
// Penalties are reversed before the appeal is stored as approved. If the
// reversal fails the appeal stays pending and can be reviewed again.

use super::appeal_models::{Appeal, AppealDecision, AppealStatus};
use crate::core::penalties::{PenaltyError, PenaltyLedger};
use crate::core::workflow::{ModeratorWorkflow, WorkflowError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum AppealError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Already resolved: {0}")]
    AlreadyResolved(String),

    #[error("{0}")]
    Workflow(#[from] WorkflowError),

    #[error("Penalty error: {0}")]
    Penalty(#[from] PenaltyError),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait AppealStore: Send + Sync {
    async fn insert_appeal(&self, appeal: &Appeal) -> Result<(), AppealError>;

    async fn get_appeal(&self, appeal_id: &str) -> Result<Option<Appeal>, AppealError>;

    /// Store the reviewed appeal only if the stored one is still pending.
    /// Returns whether it was stored.
    async fn update_if_pending(&self, appeal: &Appeal) -> Result<bool, AppealError>;

    /// Appeals with the given status (all when `None`), oldest first.
    async fn list_appeals(&self, status: Option<AppealStatus>) -> Result<Vec<Appeal>, AppealError>;

    async fn appeals_for_user(&self, user_id: &str) -> Result<Vec<Appeal>, AppealError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct AppealService {
    store: Arc<dyn AppealStore>,
    ledger: Arc<PenaltyLedger>,
    workflow: Arc<ModeratorWorkflow>,
    review_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AppealService {
    pub fn new(
        store: Arc<dyn AppealStore>,
        ledger: Arc<PenaltyLedger>,
        workflow: Arc<ModeratorWorkflow>,
    ) -> Self {
        Self {
            store,
            ledger,
            workflow,
            review_locks: DashMap::new(),
        }
    }

    /// File an appeal. It always starts out pending.
    pub async fn submit_appeal(
        &self,
        user_id: &str,
        content_id: &str,
        moderation_action_id: &str,
        reason: &str,
        evidence: Option<String>,
    ) -> Result<Appeal, AppealError> {
        let appeal = Appeal::new(user_id, content_id, moderation_action_id, reason, evidence);
        self.store.insert_appeal(&appeal).await?;

        info!(
            appeal_id = %appeal.id,
            user_id = %user_id,
            content_id = %content_id,
            "Appeal submitted"
        );
        Ok(appeal)
    }

    /// Rule on an appeal.
    ///
    /// Returns `Ok(false)` for an unknown appeal id without touching anything.
    /// Fails with a permission error for inactive moderators and with
    /// `AlreadyResolved` if the appeal was decided before.
    pub async fn review_appeal(
        &self,
        appeal_id: &str,
        moderator_id: &str,
        decision: AppealDecision,
        reason: &str,
    ) -> Result<bool, AppealError> {
        let guard = self.lock_review(appeal_id).await;
        let reviewed = self
            .apply_review(appeal_id, moderator_id, decision, reason)
            .await;
        drop(guard);
        self.review_locks
            .remove_if(appeal_id, |_, lock| Arc::strong_count(lock) == 1);
        reviewed
    }

    async fn lock_review(&self, appeal_id: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(
            self.review_locks
                .entry(appeal_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        lock.lock_owned().await
    }

    async fn apply_review(
        &self,
        appeal_id: &str,
        moderator_id: &str,
        decision: AppealDecision,
        reason: &str,
    ) -> Result<bool, AppealError> {
        let Some(appeal) = self.store.get_appeal(appeal_id).await? else {
            return Ok(false);
        };
        self.workflow.ensure_active_moderator(moderator_id)?;

        let mut reviewed = appeal.clone();
        reviewed
            .review(moderator_id, decision, reason)
            .map_err(|_| already_resolved(&appeal))?;

        // Reversal is idempotent, so a failure here leaves the appeal pending
        // and a later review finishes the job.
        let reversed = if decision == AppealDecision::Approved {
            self.ledger
                .reverse_for_appeal(
                    &appeal.user_id,
                    &appeal.content_id,
                    &appeal.moderation_action_id,
                    moderator_id,
                    &format!("Appeal approved: {}", reason),
                )
                .await?
                .len()
        } else {
            0
        };

        // Another process may have decided it since we read it.
        if !self.store.update_if_pending(&reviewed).await? {
            let current = self.store.get_appeal(appeal_id).await?.unwrap_or(appeal);
            return Err(already_resolved(&current));
        }

        info!(
            appeal_id = %appeal_id,
            moderator_id = %moderator_id,
            decision = reviewed.status.as_str(),
            "Appeal reviewed"
        );

        if decision == AppealDecision::Approved {
            self.overturn(&reviewed, reversed).await;
        }
        Ok(true)
    }

    async fn overturn(&self, appeal: &Appeal, penalties_reversed: usize) {
        match self.workflow.overturn_decision(&appeal.moderation_action_id).await {
            Ok(true) => {}
            Ok(false) => self.workflow.restore_visibility(&appeal.content_id).await,
            Err(e) => {
                warn!(appeal_id = %appeal.id, error = %e, "Failed to mark decision overturned");
                self.workflow.restore_visibility(&appeal.content_id).await;
            }
        }

        info!(
            appeal_id = %appeal.id,
            user_id = %appeal.user_id,
            penalties_reversed,
            "Appeal approved, decision reversed"
        );
    }

    pub async fn get_appeal(&self, appeal_id: &str) -> Result<Option<Appeal>, AppealError> {
        self.store.get_appeal(appeal_id).await
    }

    pub async fn list_appeals(&self, status: Option<AppealStatus>) -> Result<Vec<Appeal>, AppealError> {
        self.store.list_appeals(status).await
    }

    pub async fn appeals_for_user(&self, user_id: &str) -> Result<Vec<Appeal>, AppealError> {
        self.store.appeals_for_user(user_id).await
    }
}

fn already_resolved(appeal: &Appeal) -> AppealError {
    AppealError::AlreadyResolved(format!(
        "appeal {} was already {}",
        appeal.id,
        appeal.status.as_str()
    ))
}

// ============================================================================
// TESTS
// ============================================================================
