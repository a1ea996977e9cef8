// Flagging engine - turns a classification into an automatic action.
//
// The decision itself is a pure function (`decide_action`). The engine wraps it
// with the shared, hot-swappable rules and the running statistics, both owned
// by the engine instance rather than living in globals.

use super::classifier::Classifier;
use super::flagging_rules::{FlaggingCounters, FlaggingRulesConfiguration, FlaggingStatistics};
use super::moderation_models::{
    AutomaticAction, ContentSubmission, ModerationFlag, ModerationResult,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Apply the rules to a result. First matching rule wins.
pub fn decide_action(result: &ModerationResult, rules: &FlaggingRulesConfiguration) -> AutomaticAction {
    if rules.pii_auto_reject && !result.detected_pii.is_empty() {
        return AutomaticAction::AutoReject {
            reason: "Personal information detected".to_string(),
        };
    }

    if rules.harassment_auto_reject && result.has_flag(ModerationFlag::Harassment) {
        return AutomaticAction::AutoReject {
            reason: "Harassment detected".to_string(),
        };
    }

    if rules.hate_speech_auto_reject && result.has_flag(ModerationFlag::HateSpeech) {
        return AutomaticAction::AutoReject {
            reason: "Hate speech detected".to_string(),
        };
    }

    if result.confidence >= rules.auto_reject_threshold() {
        return AutomaticAction::AutoReject {
            reason: "Confidence exceeds threshold".to_string(),
        };
    }

    let spam_flagged = rules.spam_auto_flag && result.has_flag(ModerationFlag::Spam);
    if spam_flagged || result.confidence >= rules.auto_flag_threshold() {
        let reason = if result.flags.is_empty() {
            format!(
                "Flagged for review: confidence {:.2} at or above threshold",
                result.confidence
            )
        } else {
            format!("Flagged for review: {}", result.flag_labels())
        };
        return AutomaticAction::AutoFlag { reason };
    }

    AutomaticAction::AutoApprove
}

/// Classifier plus rules plus statistics.
pub struct FlaggingEngine {
    classifier: Arc<Classifier>,
    rules: RwLock<Arc<FlaggingRulesConfiguration>>,
    counters: FlaggingCounters,
}

impl FlaggingEngine {
    pub fn new(classifier: Arc<Classifier>, rules: FlaggingRulesConfiguration) -> Self {
        Self {
            classifier,
            rules: RwLock::new(Arc::new(rules)),
            counters: FlaggingCounters::new(),
        }
    }

    pub fn classifier(&self) -> Arc<Classifier> {
        Arc::clone(&self.classifier)
    }

    /// The rules in force right now. Callers keep a consistent view even if
    /// the rules are swapped while they hold it.
    pub async fn rules_snapshot(&self) -> Arc<FlaggingRulesConfiguration> {
        Arc::clone(&*self.rules.read().await)
    }

    /// Replace the rules. Only content decided afterwards sees the new values.
    pub async fn update_rules(&self, rules: FlaggingRulesConfiguration) {
        let mut guard = self.rules.write().await;
        info!(
            auto_reject = rules.auto_reject_threshold(),
            auto_flag = rules.auto_flag_threshold(),
            reports_threshold = rules.multiple_reports_threshold(),
            "Flagging rules updated"
        );
        *guard = Arc::new(rules);
    }

    /// Decide with an explicit rules snapshot and record the outcome.
    pub fn decide_with(
        &self,
        result: &ModerationResult,
        rules: &FlaggingRulesConfiguration,
        author_is_new: bool,
    ) -> AutomaticAction {
        let effective = rules.effective_for(author_is_new);
        let action = decide_action(result, &effective);
        self.counters.record(&action);

        debug!(
            content_id = %result.content_id,
            action = action.as_str(),
            confidence = result.confidence,
            "Automatic decision"
        );
        action
    }

    /// Decide with the current rules without counting the outcome. Pair with
    /// `record_outcome` once the decision is committed.
    pub async fn evaluate(&self, result: &ModerationResult, author_is_new: bool) -> AutomaticAction {
        let rules = self.rules_snapshot().await;
        decide_action(result, &rules.effective_for(author_is_new))
    }

    pub fn record_outcome(&self, action: &AutomaticAction) {
        self.counters.record(action);
    }

    /// Decide with the current rules and record the outcome.
    pub async fn decide(&self, result: &ModerationResult, author_is_new: bool) -> AutomaticAction {
        let rules = self.rules_snapshot().await;
        self.decide_with(result, &rules, author_is_new)
    }

    /// Classify and decide in one step.
    pub async fn process(&self, submission: &ContentSubmission) -> (ModerationResult, AutomaticAction) {
        let result = self.classifier.classify(submission);
        let action = self.decide(&result, submission.author_is_new).await;
        (result, action)
    }

    pub fn record_human_review(&self) {
        self.counters.record_human_review();
    }

    pub fn statistics(&self) -> FlaggingStatistics {
        self.counters.snapshot()
    }

    pub fn restore_statistics(&self, stats: FlaggingStatistics) {
        self.counters.restore(stats);
    }
}

// ============================================================================
// TESTS
// ============================================================================
