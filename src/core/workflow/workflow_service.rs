// Moderator workflow - who may moderate, and what a human decision does.
//
// A decision touches four places: content visibility, the penalty ledger, the
// audit trail and the review queue. Decisions on the same content are
// serialized so a double submit cannot apply two penalties.
//
// The penalty is stored last. Until the queue item is resolved a failed
// decision can be retried, and nothing has been charged to the author yet.

use super::audit_store::{AuditError, AuditStore};
use super::penalty_policy::{PenaltyContext, PenaltyPolicy};
use super::workflow_models::{
    average_handling_minutes, AutomationAccuracy, DecisionOutcome, DecisionRequest,
    ModerationDecision, ModerationMetrics, Moderator, ModeratorAction, ModeratorWorkload,
    SystemModerationStats, TimeRange,
};
use crate::core::collaborators::{CollaboratorError, ContentStore, ReputationDirectory, Role};
use crate::core::moderation::{AutomaticAction, FlaggingStatistics, Severity};
use crate::core::penalties::{NewPenalty, PenaltyError, PenaltyLedger, UserPenalty};
use crate::core::review_queue::{QueueError, ReviewQueue};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Penalty error: {0}")]
    Penalty(#[from] PenaltyError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),
}

impl WorkflowError {
    pub fn not_a_moderator(moderator_id: &str) -> Self {
        WorkflowError::PermissionDenied(format!(
            "{} does not have active moderator permission",
            moderator_id
        ))
    }
}

/// Everything the workflow needs, passed in explicitly.
pub struct WorkflowDeps {
    pub queue: Arc<ReviewQueue>,
    pub ledger: Arc<PenaltyLedger>,
    pub audit: Arc<dyn AuditStore>,
    pub content: Arc<dyn ContentStore>,
    pub reputation: Arc<dyn ReputationDirectory>,
    pub policy: PenaltyPolicy,
}

/// Facts gathered about the content before a decision is applied.
struct DecisionSubject {
    author_id: String,
    severity: Severity,
    report_count: u32,
    automatic_action: Option<AutomaticAction>,
    assigned_at: Option<DateTime<Utc>>,
    queued: bool,
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct ModeratorWorkflow {
    queue: Arc<ReviewQueue>,
    ledger: Arc<PenaltyLedger>,
    audit: Arc<dyn AuditStore>,
    content: Arc<dyn ContentStore>,
    reputation: Arc<dyn ReputationDirectory>,
    policy: PenaltyPolicy,
    moderators: DashMap<String, Moderator>,
    decision_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ModeratorWorkflow {
    pub fn new(deps: WorkflowDeps) -> Self {
        Self {
            queue: deps.queue,
            ledger: deps.ledger,
            audit: deps.audit,
            content: deps.content,
            reputation: deps.reputation,
            policy: deps.policy,
            moderators: DashMap::new(),
            decision_locks: DashMap::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Moderator registry
    // ------------------------------------------------------------------------

    /// Register (or reactivate) a moderator. The reputation directory must
    /// grant the user a moderation role.
    pub async fn register_moderator(&self, moderator_id: &str) -> Result<Moderator, WorkflowError> {
        let allowed = self.reputation.has_role(moderator_id, Role::Moderator).await?
            || self.reputation.has_role(moderator_id, Role::Admin).await?;
        if !allowed {
            return Err(WorkflowError::not_a_moderator(moderator_id));
        }

        let moderator = Moderator::new(moderator_id);
        self.moderators
            .insert(moderator_id.to_string(), moderator.clone());
        info!(moderator_id = %moderator_id, "Moderator registered");
        Ok(moderator)
    }

    /// Returns false for unknown moderators.
    pub fn deactivate_moderator(&self, moderator_id: &str) -> bool {
        match self.moderators.get_mut(moderator_id) {
            Some(mut moderator) => {
                moderator.is_active = false;
                moderator.deactivated_at = Some(Utc::now());
                info!(moderator_id = %moderator_id, "Moderator deactivated");
                true
            }
            None => false,
        }
    }

    pub fn is_active_moderator(&self, moderator_id: &str) -> bool {
        self.moderators
            .get(moderator_id)
            .map(|m| m.is_active)
            .unwrap_or(false)
    }

    pub fn ensure_active_moderator(&self, moderator_id: &str) -> Result<(), WorkflowError> {
        if self.is_active_moderator(moderator_id) {
            Ok(())
        } else {
            Err(WorkflowError::not_a_moderator(moderator_id))
        }
    }

    pub fn list_moderators(&self) -> Vec<Moderator> {
        let mut moderators: Vec<Moderator> =
            self.moderators.iter().map(|m| m.value().clone()).collect();
        moderators.sort_by(|a, b| a.id.cmp(&b.id));
        moderators
    }

    // ------------------------------------------------------------------------
    // Assignment and decisions
    // ------------------------------------------------------------------------

    /// Assign queued content to a moderator. False if the moderator is unknown
    /// or inactive, or the content is not queued; nothing changes in that case.
    pub async fn assign_moderator(
        &self,
        content_id: &str,
        moderator_id: &str,
    ) -> Result<bool, WorkflowError> {
        if !self.is_active_moderator(moderator_id) {
            warn!(
                content_id = %content_id,
                moderator_id = %moderator_id,
                "Assignment refused: not an active moderator"
            );
            return Ok(false);
        }

        let assigned = self.queue.assign(content_id, moderator_id).await?.is_some();
        if assigned {
            info!(content_id = %content_id, moderator_id = %moderator_id, "Moderator assigned");
        }
        Ok(assigned)
    }

    async fn lock_decision(&self, content_id: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(
            self.decision_locks
                .entry(content_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        lock.lock_owned().await
    }

    /// Apply a moderator decision. Never returns a Rust error: failures are
    /// reported in the outcome with a "Permission denied" or "Not found"
    /// prefix. Deciding already-resolved content is a successful no-op.
    pub async fn process_content_approval(
        &self,
        request: DecisionRequest,
        reports_threshold: u32,
    ) -> DecisionOutcome {
        let content_id = request.content_id.clone();
        let guard = self.lock_decision(&content_id).await;
        let outcome = match self.apply_decision(request, reports_threshold).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(content_id = %content_id, error = %e, "Moderator decision failed");
                DecisionOutcome::failed(e.to_string())
            }
        };
        drop(guard);
        self.decision_locks
            .remove_if(&content_id, |_, lock| Arc::strong_count(lock) == 1);
        outcome
    }

    async fn apply_decision(
        &self,
        request: DecisionRequest,
        reports_threshold: u32,
    ) -> Result<DecisionOutcome, WorkflowError> {
        self.ensure_active_moderator(&request.moderator_id)?;

        let subject = match self.decision_subject(&request.content_id).await? {
            Ok(subject) => subject,
            Err(previous) => {
                info!(
                    content_id = %request.content_id,
                    decision_id = %previous.id,
                    "Content already resolved, decision ignored"
                );
                return Ok(DecisionOutcome::already_resolved(previous.id));
            }
        };

        let decision_id = ModerationDecision::new_id();
        let penalty = self
            .plan_penalty(&request, &subject, &decision_id, reports_threshold)
            .await?;

        let decision = ModerationDecision {
            id: decision_id.clone(),
            content_id: request.content_id.clone(),
            author_id: subject.author_id.clone(),
            moderator_id: request.moderator_id.clone(),
            action: request.action,
            reason: request.reason.clone(),
            notes: request.notes.clone(),
            automatic_action: subject.automatic_action.clone(),
            severity: subject.severity,
            report_count: subject.report_count,
            penalty_id: penalty.as_ref().map(|p| p.id.clone()),
            assigned_at: subject.assigned_at,
            decided_at: Utc::now(),
            overturned: false,
        };
        self.audit.record_decision(&decision).await?;

        if subject.queued {
            if request.action.resolves_item() {
                self.queue.resolve(&request.content_id).await?;
            } else {
                self.queue.mark_flagged(&request.content_id).await?;
            }
        }

        if let Some(visible) = request.action.visibility() {
            if let Err(e) = self.content.set_visibility(&request.content_id, visible).await {
                warn!(content_id = %request.content_id, error = %e, "Failed to update visibility");
            }
        }

        let penalty = match penalty {
            Some(penalty) => Some(self.ledger.record_penalty(penalty).await?),
            None => None,
        };

        info!(
            content_id = %request.content_id,
            moderator_id = %request.moderator_id,
            action = request.action.as_str(),
            penalty = penalty.as_ref().map(|p| p.penalty_type.as_str()).unwrap_or("none"),
            "Moderator decision applied"
        );
        Ok(DecisionOutcome::applied(decision_id, penalty))
    }

    /// Gather what a decision needs to know about the content. `Err` carries
    /// the earlier decision when the content has already been resolved.
    async fn decision_subject(
        &self,
        content_id: &str,
    ) -> Result<Result<DecisionSubject, ModerationDecision>, WorkflowError> {
        if let Some(item) = self.queue.get(content_id).await? {
            return Ok(Ok(DecisionSubject {
                author_id: item.author_id.clone(),
                severity: item.moderation_result.effective_severity(),
                report_count: item.report_count,
                automatic_action: Some(item.automatic_action.clone()),
                assigned_at: item.assigned_at,
                queued: true,
            }));
        }

        let previous = self.audit.latest_decision_for_content(content_id).await?;
        if let Some(previous) = previous.filter(|d| d.is_final()) {
            return Ok(Err(previous));
        }

        let snapshot = self
            .content
            .get_content(content_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("content {}", content_id)))?;
        let result = self.audit.latest_result(content_id).await?;

        Ok(Ok(DecisionSubject {
            author_id: snapshot.author_id,
            severity: result
                .as_ref()
                .map(|r| r.effective_severity())
                .unwrap_or(Severity::Low),
            report_count: 0,
            automatic_action: None,
            assigned_at: None,
            queued: false,
        }))
    }

    /// The penalty the policy calls for, built but not yet stored.
    async fn plan_penalty(
        &self,
        request: &DecisionRequest,
        subject: &DecisionSubject,
        decision_id: &str,
        reports_threshold: u32,
    ) -> Result<Option<UserPenalty>, WorkflowError> {
        let active_warnings = if request.action == ModeratorAction::Reject {
            self.ledger.active_warning_count(&subject.author_id).await?
        } else {
            0
        };

        let context = PenaltyContext {
            severity: subject.severity,
            report_count: subject.report_count,
            reports_threshold,
            active_warnings,
        };
        let Some(penalty_type) = self.policy.evaluate(request.action, &context) else {
            return Ok(None);
        };

        Ok(Some(UserPenalty::new(
            NewPenalty {
                user_id: subject.author_id.clone(),
                moderator_id: request.moderator_id.clone(),
                penalty_type,
                reason: request.reason.clone(),
                content_id: Some(request.content_id.clone()),
                moderation_action_id: Some(decision_id.to_string()),
            },
            Utc::now(),
        )))
    }

    /// Mark a decision overturned and make its content visible again.
    pub async fn overturn_decision(&self, decision_id: &str) -> Result<bool, WorkflowError> {
        let Some(decision) = self.audit.get_decision(decision_id).await? else {
            return Ok(false);
        };
        let changed = self.audit.mark_overturned(decision_id).await?;
        if changed {
            self.restore_visibility(&decision.content_id).await;
            info!(decision_id = %decision_id, content_id = %decision.content_id, "Decision overturned");
        }
        Ok(changed)
    }

    /// Make content visible again. Failures are logged, not returned.
    pub async fn restore_visibility(&self, content_id: &str) {
        if let Err(e) = self.content.set_visibility(content_id, true).await {
            warn!(content_id = %content_id, error = %e, "Failed to restore visibility");
        }
    }

    // ------------------------------------------------------------------------
    // Read-only aggregations
    // ------------------------------------------------------------------------

    /// `None` for moderators that were never registered.
    pub async fn get_moderator_workload(
        &self,
        moderator_id: &str,
    ) -> Result<Option<ModeratorWorkload>, WorkflowError> {
        let Some(is_active) = self.moderators.get(moderator_id).map(|m| m.is_active) else {
            return Ok(None);
        };

        let (start, end) = TimeRange::Today.bounds(Utc::now());
        let today: Vec<ModerationDecision> = self
            .audit
            .decisions_between(start, end)
            .await?
            .into_iter()
            .filter(|d| d.moderator_id == moderator_id)
            .collect();

        Ok(Some(ModeratorWorkload {
            moderator_id: moderator_id.to_string(),
            is_active,
            assigned_items: self.queue.assigned_to(moderator_id).await?,
            completed_today: today.iter().filter(|d| d.action.resolves_item()).count(),
            average_time_per_item_minutes: average_handling_minutes(&today),
        }))
    }

    pub async fn get_moderation_metrics(
        &self,
        moderator_id: &str,
        time_range: TimeRange,
    ) -> Result<ModerationMetrics, WorkflowError> {
        let (start, end) = time_range.bounds(Utc::now());
        let decisions: Vec<ModerationDecision> = self
            .audit
            .decisions_between(start, end)
            .await?
            .into_iter()
            .filter(|d| d.moderator_id == moderator_id)
            .collect();

        Ok(ModerationMetrics::from_decisions(
            moderator_id,
            time_range,
            &decisions,
        ))
    }

    /// System-wide view. Engine counters are owned by the flagging engine and
    /// passed in.
    pub async fn get_system_moderation_stats(
        &self,
        time_range: TimeRange,
        flagging: FlaggingStatistics,
    ) -> Result<SystemModerationStats, WorkflowError> {
        let (start, end) = time_range.bounds(Utc::now());
        let decisions = self.audit.decisions_between(start, end).await?;
        let penalties = self.ledger.penalties_between(start, end).await?;
        let accuracy = AutomationAccuracy::from_decisions(&decisions);

        Ok(SystemModerationStats {
            time_range,
            flagging,
            auto_approval_rate: flagging.auto_approval_rate(),
            human_review_rate: flagging.human_review_rate(),
            queue: self.queue.statistics().await?,
            human_decisions: decisions.len(),
            overturned_decisions: decisions.iter().filter(|d| d.overturned).count(),
            penalties_issued: penalties.len(),
            active_moderators: self.moderators.iter().filter(|m| m.is_active).count(),
            ai_accuracy: accuracy.ai_accuracy,
            false_positive_rate: accuracy.false_positive_rate,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
