// Moderation pipeline - the single entry point the gateway talks to.
//
// Owns the wiring between the flagging engine, the review queue, the
// moderator workflow, the penalty ledger and appeals. Every collaborator is
// passed in through `PipelineDeps`; nothing here is process-global.

use crate::core::appeals::{Appeal, AppealDecision, AppealError, AppealService, AppealStatus, AppealStore};
use crate::core::collaborators::{ContentStore, ReputationDirectory};
use crate::core::moderation::{
    AutomaticAction, Classifier, ContentSubmission, FlaggingEngine, FlaggingRulesConfiguration,
    FlaggingStatistics, ModerationResult,
};
use crate::core::penalties::{NewPenalty, PenaltyError, PenaltyLedger, PenaltyStore, UserPenalty};
use crate::core::review_queue::{
    ModerationQueueItem, QueueError, QueueFilter, QueueStatistics, QueueStore, ReviewQueue,
};
use crate::core::workflow::{
    AuditError, AuditStore, DecisionOutcome, DecisionRequest, ModerationMetrics, Moderator,
    ModeratorWorkflow, ModeratorWorkload, PenaltyPolicy, SystemModerationStats, TimeRange,
    WorkflowDeps, WorkflowError,
};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Workflow(#[from] WorkflowError),

    #[error("{0}")]
    Appeal(#[from] AppealError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Penalty error: {0}")]
    Penalty(#[from] PenaltyError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),
}

// ============================================================================
// CONFIG & DEPENDENCIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSettings {
    /// Queue auto-rejected content so moderators can audit it.
    pub audit_auto_rejections: bool,
    /// Classifications running at once inside `process_batch`.
    pub batch_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            audit_auto_rejections: true,
            batch_concurrency: 8,
        }
    }
}

pub struct PipelineDeps {
    pub queue_store: Arc<dyn QueueStore>,
    pub penalty_store: Arc<dyn PenaltyStore>,
    pub appeal_store: Arc<dyn AppealStore>,
    pub audit: Arc<dyn AuditStore>,
    pub content: Arc<dyn ContentStore>,
    pub reputation: Arc<dyn ReputationDirectory>,
    pub rules: FlaggingRulesConfiguration,
    pub policy: PenaltyPolicy,
    pub settings: PipelineSettings,
}

/// What happened to one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationOutcome {
    pub result: ModerationResult,
    pub action: AutomaticAction,
    /// The queue entry created for human review, if any.
    pub queue_item: Option<ModerationQueueItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Committed outcomes, in input order.
    pub results: Vec<ClassificationOutcome>,
    /// True if the batch stopped before every item was committed.
    pub cancelled: bool,
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct ModerationPipeline {
    engine: Arc<FlaggingEngine>,
    queue: Arc<ReviewQueue>,
    ledger: Arc<PenaltyLedger>,
    workflow: Arc<ModeratorWorkflow>,
    appeals: AppealService,
    audit: Arc<dyn AuditStore>,
    content: Arc<dyn ContentStore>,
    settings: PipelineSettings,
}

impl ModerationPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        let engine = Arc::new(FlaggingEngine::new(Arc::new(Classifier::new()), deps.rules));
        let queue = Arc::new(ReviewQueue::new(deps.queue_store));
        let ledger = Arc::new(PenaltyLedger::new(deps.penalty_store, deps.reputation.clone()));
        let workflow = Arc::new(ModeratorWorkflow::new(WorkflowDeps {
            queue: queue.clone(),
            ledger: ledger.clone(),
            audit: deps.audit.clone(),
            content: deps.content.clone(),
            reputation: deps.reputation,
            policy: deps.policy,
        }));
        let appeals = AppealService::new(deps.appeal_store, ledger.clone(), workflow.clone());

        Self {
            engine,
            queue,
            ledger,
            workflow,
            appeals,
            audit: deps.audit,
            content: deps.content,
            settings: deps.settings,
        }
    }

    /// Restore persisted statistics and rebuild the queue order.
    /// Returns the number of queued items.
    pub async fn initialize(&self) -> Result<usize, PipelineError> {
        if let Some(stats) = self.audit.load_statistics().await? {
            self.engine.restore_statistics(stats);
            info!(total_processed = stats.total_processed, "Flagging statistics restored");
        }
        let queued = self.queue.load().await?;
        info!(queued, "Review queue loaded");
        Ok(queued)
    }

    pub async fn persist_statistics(&self) -> Result<(), PipelineError> {
        let stats = self.engine.statistics();
        self.audit.save_statistics(&stats).await?;
        debug!(total_processed = stats.total_processed, "Flagging statistics saved");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Classification
    // ------------------------------------------------------------------------

    /// Classify one submission, decide automatically and commit the outcome.
    pub async fn classify_and_flag(
        &self,
        submission: &ContentSubmission,
    ) -> Result<ClassificationOutcome, PipelineError> {
        let result = self.engine.classifier().classify(submission);
        self.commit(submission, result).await
    }

    /// Classify many submissions. Classification runs on the blocking pool
    /// with bounded concurrency; outcomes are committed one by one in input
    /// order. Once `cancel` turns true no further item is committed.
    pub async fn process_batch(
        &self,
        items: Vec<ContentSubmission>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<BatchReport, PipelineError> {
        let mut cancel = cancel;
        let classifier = self.engine.classifier();
        let concurrency = self.settings.batch_concurrency.max(1);

        let mut classified = stream::iter(items.clone())
            .map(|submission| {
                let classifier = classifier.clone();
                async move {
                    let content_id = submission.content_id.clone();
                    let content_type = submission.content_type;
                    match tokio::task::spawn_blocking(move || classifier.classify(&submission)).await {
                        Ok(result) => result,
                        Err(e) => {
                            warn!(content_id = %content_id, error = %e, "Classification task failed");
                            ModerationResult::no_signal(content_id, content_type)
                        }
                    }
                }
            })
            .buffered(concurrency);

        let mut report = BatchReport {
            results: Vec::with_capacity(items.len()),
            cancelled: false,
        };

        for submission in &items {
            let result = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => {
                    report.cancelled = true;
                    break;
                }
                next = classified.next() => match next {
                    Some(result) => result,
                    None => break,
                },
            };
            report.results.push(self.commit(submission, result).await?);
        }

        info!(
            committed = report.results.len(),
            requested = items.len(),
            cancelled = report.cancelled,
            "Batch processed"
        );
        Ok(report)
    }

    async fn commit(
        &self,
        submission: &ContentSubmission,
        result: ModerationResult,
    ) -> Result<ClassificationOutcome, PipelineError> {
        let action = self.engine.evaluate(&result, submission.author_is_new).await;
        self.audit.save_result(&result).await?;
        self.engine.record_outcome(&action);

        let visible = matches!(action, AutomaticAction::AutoApprove);
        if let Err(e) = self.content.set_visibility(&submission.content_id, visible).await {
            warn!(content_id = %submission.content_id, error = %e, "Failed to update visibility");
        }

        let enqueue = match action {
            AutomaticAction::AutoApprove => false,
            AutomaticAction::AutoFlag { .. } => true,
            AutomaticAction::AutoReject { .. } => self.settings.audit_auto_rejections,
        };

        let queue_item = if enqueue {
            let item = ModerationQueueItem::from_classification(submission, &result, &action);
            let queued = self.queue.enqueue(item).await?;
            if matches!(action, AutomaticAction::AutoFlag { .. }) {
                self.engine.record_human_review();
            }
            Some(queued)
        } else {
            // A resubmission that no longer needs review leaves the queue.
            if self.queue.resolve(&submission.content_id).await?.is_some() {
                debug!(content_id = %submission.content_id, "Stale queue item dropped");
            }
            None
        };

        info!(
            content_id = %submission.content_id,
            action = action.as_str(),
            confidence = result.confidence,
            queued = queue_item.is_some(),
            "Content classified"
        );
        Ok(ClassificationOutcome {
            result,
            action,
            queue_item,
        })
    }

    // ------------------------------------------------------------------------
    // Rules & statistics
    // ------------------------------------------------------------------------

    pub async fn get_flagging_rules(&self) -> FlaggingRulesConfiguration {
        self.engine.rules_snapshot().await.as_ref().clone()
    }

    /// Swap the rules. Content classified afterwards uses the new set.
    pub async fn update_flagging_rules(&self, rules: FlaggingRulesConfiguration) {
        self.engine.update_rules(rules).await;
    }

    pub fn flagging_statistics(&self) -> FlaggingStatistics {
        self.engine.statistics()
    }

    // ------------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------------

    pub async fn list_queue(&self, filter: &QueueFilter) -> Result<Vec<ModerationQueueItem>, PipelineError> {
        Ok(self.queue.list(filter).await?)
    }

    pub async fn queue_statistics(&self) -> Result<QueueStatistics, PipelineError> {
        Ok(self.queue.statistics().await?)
    }

    /// Claim the next item for an active moderator.
    pub async fn dequeue_next(
        &self,
        filter: &QueueFilter,
        moderator_id: &str,
    ) -> Result<Option<ModerationQueueItem>, PipelineError> {
        self.workflow.ensure_active_moderator(moderator_id)?;
        Ok(self.queue.dequeue_next(filter, moderator_id).await?)
    }

    pub async fn release(&self, content_id: &str) -> Result<bool, PipelineError> {
        Ok(self.queue.release(content_id).await?)
    }

    /// Record user reports against queued content. `None` if the content is
    /// not queued.
    pub async fn report_content(
        &self,
        content_id: &str,
        delta: i64,
    ) -> Result<Option<ModerationQueueItem>, PipelineError> {
        let threshold = self.engine.rules_snapshot().await.multiple_reports_threshold();
        Ok(self
            .queue
            .update_report_count(content_id, delta, threshold)
            .await?)
    }

    // ------------------------------------------------------------------------
    // Moderators & decisions
    // ------------------------------------------------------------------------

    pub async fn register_moderator(&self, moderator_id: &str) -> Result<Moderator, PipelineError> {
        Ok(self.workflow.register_moderator(moderator_id).await?)
    }

    pub fn deactivate_moderator(&self, moderator_id: &str) -> bool {
        self.workflow.deactivate_moderator(moderator_id)
    }

    pub fn list_moderators(&self) -> Vec<Moderator> {
        self.workflow.list_moderators()
    }

    pub async fn assign_moderator(&self, content_id: &str, moderator_id: &str) -> Result<bool, PipelineError> {
        Ok(self.workflow.assign_moderator(content_id, moderator_id).await?)
    }

    pub async fn decide(&self, request: DecisionRequest) -> DecisionOutcome {
        let threshold = self.engine.rules_snapshot().await.multiple_reports_threshold();
        self.workflow.process_content_approval(request, threshold).await
    }

    pub async fn get_moderator_workload(
        &self,
        moderator_id: &str,
    ) -> Result<Option<ModeratorWorkload>, PipelineError> {
        Ok(self.workflow.get_moderator_workload(moderator_id).await?)
    }

    pub async fn get_moderation_metrics(
        &self,
        moderator_id: &str,
        time_range: TimeRange,
    ) -> Result<ModerationMetrics, PipelineError> {
        Ok(self
            .workflow
            .get_moderation_metrics(moderator_id, time_range)
            .await?)
    }

    pub async fn get_system_moderation_stats(
        &self,
        time_range: TimeRange,
    ) -> Result<SystemModerationStats, PipelineError> {
        Ok(self
            .workflow
            .get_system_moderation_stats(time_range, self.engine.statistics())
            .await?)
    }

    // ------------------------------------------------------------------------
    // Penalties
    // ------------------------------------------------------------------------

    /// Apply a penalty by hand. The issuing moderator must be active.
    pub async fn apply_penalty(&self, params: NewPenalty) -> Result<UserPenalty, PipelineError> {
        self.workflow.ensure_active_moderator(&params.moderator_id)?;
        Ok(self.ledger.apply_user_penalty(params).await?)
    }

    pub async fn remove_penalty(
        &self,
        penalty_id: &str,
        removed_by: &str,
        reason: &str,
    ) -> Result<bool, PipelineError> {
        self.workflow.ensure_active_moderator(removed_by)?;
        Ok(self.ledger.remove_penalty(penalty_id, removed_by, reason).await?)
    }

    pub async fn get_active_penalties(&self, user_id: &str) -> Result<Vec<UserPenalty>, PipelineError> {
        Ok(self.ledger.get_active_penalties(user_id).await?)
    }

    pub async fn get_penalty_history(&self, user_id: &str) -> Result<Vec<UserPenalty>, PipelineError> {
        Ok(self.ledger.get_penalty_history(user_id).await?)
    }

    // ------------------------------------------------------------------------
    // Appeals
    // ------------------------------------------------------------------------

    pub async fn submit_appeal(
        &self,
        user_id: &str,
        content_id: &str,
        moderation_action_id: &str,
        reason: &str,
        evidence: Option<String>,
    ) -> Result<Appeal, PipelineError> {
        Ok(self
            .appeals
            .submit_appeal(user_id, content_id, moderation_action_id, reason, evidence)
            .await?)
    }

    pub async fn review_appeal(
        &self,
        appeal_id: &str,
        moderator_id: &str,
        decision: AppealDecision,
        reason: &str,
    ) -> Result<bool, PipelineError> {
        Ok(self
            .appeals
            .review_appeal(appeal_id, moderator_id, decision, reason)
            .await?)
    }

    pub async fn get_appeal(&self, appeal_id: &str) -> Result<Option<Appeal>, PipelineError> {
        Ok(self.appeals.get_appeal(appeal_id).await?)
    }

    pub async fn list_appeals(&self, status: Option<AppealStatus>) -> Result<Vec<Appeal>, PipelineError> {
        Ok(self.appeals.list_appeals(status).await?)
    }

    pub async fn appeals_for_user(&self, user_id: &str) -> Result<Vec<Appeal>, PipelineError> {
        Ok(self.appeals.appeals_for_user(user_id).await?)
    }
}

/// Resolves once the flag turns true. Never resolves without a receiver or
/// after the sender is gone.
async fn cancelled(cancel: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = cancel else {
        return std::future::pending().await;
    };
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collaborators::{ContentSnapshot, Role};
    use crate::core::moderation::{ContentType, ModerationFlag, ModerationStatus};
    use crate::core::workflow::{ModerationDecision, ModeratorAction};
    use crate::infra::collaborators::{InMemoryContentStore, InMemoryReputation};
    use crate::infra::moderation::{
        InMemoryAppealStore, InMemoryAuditStore, InMemoryPenaltyStore, InMemoryQueueStore,
    };
    use chrono::{DateTime, Utc};

    /// Audit store that cannot save classification results.
    #[derive(Default)]
    struct ReadOnlyAuditStore {
        inner: InMemoryAuditStore,
    }

    #[async_trait::async_trait]
    impl AuditStore for ReadOnlyAuditStore {
        async fn save_result(&self, _result: &ModerationResult) -> Result<(), AuditError> {
            Err(AuditError::StorageError("attempt to write a readonly database".to_string()))
        }

        async fn latest_result(
            &self,
            content_id: &str,
        ) -> Result<Option<ModerationResult>, AuditError> {
            self.inner.latest_result(content_id).await
        }

        async fn record_decision(&self, decision: &ModerationDecision) -> Result<(), AuditError> {
            self.inner.record_decision(decision).await
        }

        async fn get_decision(
            &self,
            decision_id: &str,
        ) -> Result<Option<ModerationDecision>, AuditError> {
            self.inner.get_decision(decision_id).await
        }

        async fn latest_decision_for_content(
            &self,
            content_id: &str,
        ) -> Result<Option<ModerationDecision>, AuditError> {
            self.inner.latest_decision_for_content(content_id).await
        }

        async fn decisions_between(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<ModerationDecision>, AuditError> {
            self.inner.decisions_between(start, end).await
        }

        async fn mark_overturned(&self, decision_id: &str) -> Result<bool, AuditError> {
            self.inner.mark_overturned(decision_id).await
        }

        async fn save_statistics(&self, stats: &FlaggingStatistics) -> Result<(), AuditError> {
            self.inner.save_statistics(stats).await
        }

        async fn load_statistics(&self) -> Result<Option<FlaggingStatistics>, AuditError> {
            self.inner.load_statistics().await
        }
    }

    const PHONE_TEXT: &str = "Contact me at 555-123-4567";
    const SPAM_TEXT: &str = "CLICK HERE NOW!!! BUY NOW LIMITED TIME OFFER!!!";
    const CLEAN_TEXT: &str = "Lovely weather for a picnic today.";

    #[derive(Clone)]
    struct Stores {
        queue: Arc<InMemoryQueueStore>,
        penalties: Arc<InMemoryPenaltyStore>,
        appeals: Arc<InMemoryAppealStore>,
        audit: Arc<InMemoryAuditStore>,
        content: Arc<InMemoryContentStore>,
        reputation: Arc<InMemoryReputation>,
    }

    impl Stores {
        fn new() -> Self {
            let reputation = Arc::new(InMemoryReputation::new());
            reputation.grant_role("mod-1", Role::Moderator);
            Self {
                queue: Arc::new(InMemoryQueueStore::new()),
                penalties: Arc::new(InMemoryPenaltyStore::new()),
                appeals: Arc::new(InMemoryAppealStore::new()),
                audit: Arc::new(InMemoryAuditStore::new()),
                content: Arc::new(InMemoryContentStore::new()),
                reputation,
            }
        }

        fn pipeline(&self) -> ModerationPipeline {
            ModerationPipeline::new(PipelineDeps {
                queue_store: self.queue.clone(),
                penalty_store: self.penalties.clone(),
                appeal_store: self.appeals.clone(),
                audit: self.audit.clone(),
                content: self.content.clone(),
                reputation: self.reputation.clone(),
                rules: FlaggingRulesConfiguration::default(),
                policy: PenaltyPolicy::default(),
                settings: PipelineSettings::default(),
            })
        }
    }

    async fn setup() -> (Stores, ModerationPipeline) {
        let stores = Stores::new();
        let pipeline = stores.pipeline();
        pipeline.register_moderator("mod-1").await.unwrap();
        (stores, pipeline)
    }

    fn submit(stores: &Stores, content_id: &str, text: &str) -> ContentSubmission {
        let submission = ContentSubmission::text(content_id, ContentType::Post, "author-1", text);
        stores.content.upsert(ContentSnapshot::from_submission(&submission));
        submission
    }

    #[tokio::test]
    async fn test_personal_information_is_rejected_and_queued_for_audit() {
        let (stores, pipeline) = setup().await;
        let submission = submit(&stores, "c1", PHONE_TEXT);

        let outcome = pipeline.classify_and_flag(&submission).await.unwrap();

        assert!(!outcome.result.detected_pii.is_empty());
        assert!(outcome.action.reason().unwrap().contains("Personal information"));
        let item = outcome.queue_item.unwrap();
        assert_eq!(item.status, ModerationStatus::Pending);
        assert_eq!(stores.content.visibility("c1"), Some(false));
        assert_eq!(pipeline.flagging_statistics().auto_rejected, 1);
        assert!(stores.audit.latest_result("c1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_spam_is_flagged_for_human_review() {
        let (stores, pipeline) = setup().await;
        let submission = submit(&stores, "c2", SPAM_TEXT);

        let outcome = pipeline.classify_and_flag(&submission).await.unwrap();

        assert!(outcome.result.has_flag(ModerationFlag::Spam));
        assert!(outcome.action.reason().unwrap().contains("spam"));
        assert_eq!(outcome.queue_item.unwrap().status, ModerationStatus::Flagged);
        assert_eq!(stores.content.visibility("c2"), Some(false));

        let stats = pipeline.flagging_statistics();
        assert_eq!(stats.auto_flagged, 1);
        assert_eq!(stats.sent_to_human_review, 1);
    }

    #[tokio::test]
    async fn test_clean_content_is_approved_without_queueing() {
        let (stores, pipeline) = setup().await;
        let submission = submit(&stores, "c3", CLEAN_TEXT);

        let outcome = pipeline.classify_and_flag(&submission).await.unwrap();

        assert_eq!(outcome.action, AutomaticAction::AutoApprove);
        assert!(outcome.queue_item.is_none());
        assert_eq!(stores.content.visibility("c3"), Some(true));
        assert_eq!(pipeline.queue_statistics().await.unwrap().total_items, 0);
    }

    #[tokio::test]
    async fn test_auto_rejections_can_skip_the_queue() {
        let stores = Stores::new();
        let pipeline = ModerationPipeline::new(PipelineDeps {
            queue_store: stores.queue.clone(),
            penalty_store: stores.penalties.clone(),
            appeal_store: stores.appeals.clone(),
            audit: stores.audit.clone(),
            content: stores.content.clone(),
            reputation: stores.reputation.clone(),
            rules: FlaggingRulesConfiguration::default(),
            policy: PenaltyPolicy::default(),
            settings: PipelineSettings {
                audit_auto_rejections: false,
                batch_concurrency: 2,
            },
        });

        let outcome = pipeline
            .classify_and_flag(&submit(&stores, "c1", PHONE_TEXT))
            .await
            .unwrap();
        assert!(matches!(outcome.action, AutomaticAction::AutoReject { .. }));
        assert!(outcome.queue_item.is_none());
    }

    #[tokio::test]
    async fn test_clean_resubmission_leaves_the_queue() {
        let (stores, pipeline) = setup().await;
        let flagged = pipeline
            .classify_and_flag(&submit(&stores, "c4", SPAM_TEXT))
            .await
            .unwrap();
        assert!(flagged.queue_item.is_some());

        let edited = pipeline
            .classify_and_flag(&submit(&stores, "c4", CLEAN_TEXT))
            .await
            .unwrap();
        assert_eq!(edited.action, AutomaticAction::AutoApprove);
        assert!(edited.queue_item.is_none());
        assert!(pipeline.list_queue(&QueueFilter::default()).await.unwrap().is_empty());
        assert_eq!(stores.content.visibility("c4"), Some(true));
    }

    #[tokio::test]
    async fn test_failed_audit_save_is_not_counted() {
        let stores = Stores::new();
        let pipeline = ModerationPipeline::new(PipelineDeps {
            queue_store: stores.queue.clone(),
            penalty_store: stores.penalties.clone(),
            appeal_store: stores.appeals.clone(),
            audit: Arc::new(ReadOnlyAuditStore::default()),
            content: stores.content.clone(),
            reputation: stores.reputation.clone(),
            rules: FlaggingRulesConfiguration::default(),
            policy: PenaltyPolicy::default(),
            settings: PipelineSettings::default(),
        });

        let err = pipeline
            .classify_and_flag(&submit(&stores, "c1", SPAM_TEXT))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("readonly"));

        let stats = pipeline.flagging_statistics();
        assert_eq!(stats.total_processed, 0);
        assert_eq!(stats.auto_flagged, 0);
        assert_eq!(stats.sent_to_human_review, 0);
        assert_eq!(pipeline.queue_statistics().await.unwrap().total_items, 0);
    }

    #[tokio::test]
    async fn test_batch_results_keep_input_order() {
        let (stores, pipeline) = setup().await;
        let texts = [CLEAN_TEXT, PHONE_TEXT, SPAM_TEXT, CLEAN_TEXT, SPAM_TEXT, PHONE_TEXT];
        let items: Vec<ContentSubmission> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| submit(&stores, &format!("b{}", i), text))
            .collect();

        let report = pipeline.process_batch(items, None).await.unwrap();

        assert!(!report.cancelled);
        let ids: Vec<&str> = report
            .results
            .iter()
            .map(|o| o.result.content_id.as_str())
            .collect();
        assert_eq!(ids, vec!["b0", "b1", "b2", "b3", "b4", "b5"]);
        assert_eq!(report.results[0].action, AutomaticAction::AutoApprove);
        assert!(matches!(report.results[1].action, AutomaticAction::AutoReject { .. }));
        assert!(matches!(report.results[2].action, AutomaticAction::AutoFlag { .. }));
        assert_eq!(pipeline.flagging_statistics().total_processed, 6);
    }

    #[tokio::test]
    async fn test_cancelled_batch_commits_nothing_further() {
        let (stores, pipeline) = setup().await;
        let items = vec![submit(&stores, "x1", SPAM_TEXT), submit(&stores, "x2", SPAM_TEXT)];
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let report = pipeline.process_batch(items, Some(rx)).await.unwrap();

        assert!(report.cancelled);
        assert!(report.results.is_empty());
        assert_eq!(pipeline.flagging_statistics().total_processed, 0);
        assert_eq!(pipeline.queue_statistics().await.unwrap().total_items, 0);
    }

    #[tokio::test]
    async fn test_rule_swap_applies_to_later_content() {
        let (stores, pipeline) = setup().await;
        let before = pipeline
            .classify_and_flag(&submit(&stores, "r1", SPAM_TEXT))
            .await
            .unwrap();
        assert!(matches!(before.action, AutomaticAction::AutoFlag { .. }));

        let mut rules = pipeline.get_flagging_rules().await;
        rules.spam_auto_flag = false;
        pipeline.update_flagging_rules(rules).await;

        let after = pipeline
            .classify_and_flag(&submit(&stores, "r2", SPAM_TEXT))
            .await
            .unwrap();
        assert_eq!(after.action, AutomaticAction::AutoApprove);
        assert!(!pipeline.get_flagging_rules().await.spam_auto_flag);
        // The earlier item keeps its original outcome.
        assert!(pipeline
            .list_queue(&QueueFilter::default())
            .await
            .unwrap()
            .iter()
            .any(|item| item.content_id == "r1"));
    }

    #[tokio::test]
    async fn test_reports_reach_threshold_and_reject_penalizes_author() {
        let (stores, pipeline) = setup().await;
        let queued = pipeline
            .classify_and_flag(&submit(&stores, "c9", SPAM_TEXT))
            .await
            .unwrap()
            .queue_item
            .unwrap();

        let reported = pipeline.report_content("c9", 3).await.unwrap().unwrap();
        assert_eq!(reported.report_count, 3);
        assert!(reported.priority > queued.priority);
        assert!(pipeline.report_content("missing", 1).await.unwrap().is_none());

        let outcome = pipeline
            .decide(DecisionRequest {
                content_id: "c9".to_string(),
                moderator_id: "mod-1".to_string(),
                action: ModeratorAction::Reject,
                reason: "spam".to_string(),
                notes: None,
            })
            .await;
        assert!(outcome.success);
        assert!(outcome.penalty.is_some());
        assert_eq!(pipeline.get_active_penalties("author-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_appeal_round_trip_clears_penalty_and_restores_content() {
        let (stores, pipeline) = setup().await;
        pipeline
            .classify_and_flag(&submit(&stores, "c5", SPAM_TEXT))
            .await
            .unwrap();
        pipeline.report_content("c5", 3).await.unwrap();

        let outcome = pipeline
            .decide(DecisionRequest {
                content_id: "c5".to_string(),
                moderator_id: "mod-1".to_string(),
                action: ModeratorAction::Reject,
                reason: "spam".to_string(),
                notes: None,
            })
            .await;
        let decision_id = outcome.decision_id.unwrap();
        assert_eq!(stores.content.visibility("c5"), Some(false));

        let appeal = pipeline
            .submit_appeal("author-1", "c5", &decision_id, "It was a joke", None)
            .await
            .unwrap();
        assert_eq!(appeal.status, AppealStatus::Pending);

        let reviewed = pipeline
            .review_appeal(&appeal.id, "mod-1", AppealDecision::Approved, "fair point")
            .await
            .unwrap();
        assert!(reviewed);
        assert!(pipeline.get_active_penalties("author-1").await.unwrap().is_empty());
        assert_eq!(pipeline.get_penalty_history("author-1").await.unwrap().len(), 1);
        assert_eq!(stores.content.visibility("c5"), Some(true));
        assert_eq!(
            pipeline.list_appeals(Some(AppealStatus::Approved)).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_claim_requires_active_moderator() {
        let (stores, pipeline) = setup().await;
        pipeline
            .classify_and_flag(&submit(&stores, "c6", SPAM_TEXT))
            .await
            .unwrap();

        let err = pipeline
            .dequeue_next(&QueueFilter::default(), "stranger")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("permission"));

        let claimed = pipeline
            .dequeue_next(&QueueFilter::default(), "mod-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.status, ModerationStatus::UnderReview);
        assert!(pipeline.release("c6").await.unwrap());
    }

    #[tokio::test]
    async fn test_manual_penalty_requires_active_moderator() {
        let (_stores, pipeline) = setup().await;
        let params = |moderator: &str| NewPenalty {
            user_id: "u1".to_string(),
            moderator_id: moderator.to_string(),
            penalty_type: crate::core::penalties::PenaltyType::Warning,
            reason: "rude".to_string(),
            content_id: None,
            moderation_action_id: None,
        };

        assert!(pipeline.apply_penalty(params("stranger")).await.is_err());
        let penalty = pipeline.apply_penalty(params("mod-1")).await.unwrap();
        assert!(pipeline
            .remove_penalty(&penalty.id, "mod-1", "mistake")
            .await
            .unwrap());
        assert!(pipeline.get_active_penalties("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_statistics_survive_restart() {
        let (stores, pipeline) = setup().await;
        pipeline
            .classify_and_flag(&submit(&stores, "s1", SPAM_TEXT))
            .await
            .unwrap();
        pipeline
            .classify_and_flag(&submit(&stores, "s2", CLEAN_TEXT))
            .await
            .unwrap();
        pipeline.persist_statistics().await.unwrap();

        let restarted = stores.pipeline();
        let queued = restarted.initialize().await.unwrap();

        assert_eq!(queued, 1);
        let stats = restarted.flagging_statistics();
        assert_eq!(stats.total_processed, 2);
        assert_eq!(stats.auto_approved, 1);
        assert_eq!(stats.auto_flagged, 1);
    }

    #[tokio::test]
    async fn test_system_stats_include_engine_counters() {
        let (stores, pipeline) = setup().await;
        pipeline
            .classify_and_flag(&submit(&stores, "s1", CLEAN_TEXT))
            .await
            .unwrap();

        let stats = pipeline
            .get_system_moderation_stats(TimeRange::AllTime)
            .await
            .unwrap();
        assert_eq!(stats.flagging.total_processed, 1);
        assert!((stats.auto_approval_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(stats.active_moderators, 1);
    }
}
