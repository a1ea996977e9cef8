// Flagging thresholds and running statistics.

use super::moderation_models::AutomaticAction;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Largest amount both thresholds are lowered by for new authors.
const NEW_USER_THRESHOLD_OFFSET: f32 = 0.1;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RulesError {
    #[error(
        "Invalid thresholds: autoFlagThreshold ({flag}) must be below autoRejectThreshold ({reject})"
    )]
    ThresholdOrder { flag: f32, reject: f32 },

    #[error("Threshold out of range [0, 1]: {0}")]
    OutOfRange(f32),

    #[error("multipleReportsThreshold must be at least 1")]
    ReportThreshold,
}

/// Tunable thresholds for the automatic decision.
///
/// The thresholds are private so the `autoFlagThreshold < autoRejectThreshold`
/// invariant holds for every value of this type, including deserialized ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawRules")]
pub struct FlaggingRulesConfiguration {
    auto_reject_threshold: f32,
    auto_flag_threshold: f32,
    pub pii_auto_reject: bool,
    pub harassment_auto_reject: bool,
    pub hate_speech_auto_reject: bool,
    pub spam_auto_flag: bool,
    multiple_reports_threshold: u32,
    pub new_user_stricter_rules: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRules {
    auto_reject_threshold: f32,
    auto_flag_threshold: f32,
    #[serde(default = "enabled")]
    pii_auto_reject: bool,
    #[serde(default = "enabled")]
    harassment_auto_reject: bool,
    #[serde(default = "enabled")]
    hate_speech_auto_reject: bool,
    #[serde(default = "enabled")]
    spam_auto_flag: bool,
    #[serde(default = "default_reports_threshold")]
    multiple_reports_threshold: u32,
    #[serde(default = "enabled")]
    new_user_stricter_rules: bool,
}

fn enabled() -> bool {
    true
}

fn default_reports_threshold() -> u32 {
    3
}

impl TryFrom<RawRules> for FlaggingRulesConfiguration {
    type Error = RulesError;

    fn try_from(raw: RawRules) -> Result<Self, Self::Error> {
        let mut rules = Self::new(raw.auto_reject_threshold, raw.auto_flag_threshold)?
            .with_multiple_reports_threshold(raw.multiple_reports_threshold)?;
        rules.pii_auto_reject = raw.pii_auto_reject;
        rules.harassment_auto_reject = raw.harassment_auto_reject;
        rules.hate_speech_auto_reject = raw.hate_speech_auto_reject;
        rules.spam_auto_flag = raw.spam_auto_flag;
        rules.new_user_stricter_rules = raw.new_user_stricter_rules;
        Ok(rules)
    }
}

impl Default for FlaggingRulesConfiguration {
    fn default() -> Self {
        Self {
            auto_reject_threshold: 0.9,
            auto_flag_threshold: 0.7,
            pii_auto_reject: true,
            harassment_auto_reject: true,
            hate_speech_auto_reject: true,
            spam_auto_flag: true,
            multiple_reports_threshold: default_reports_threshold(),
            new_user_stricter_rules: true,
        }
    }
}

impl FlaggingRulesConfiguration {
    /// Build a configuration with the given thresholds and default gates.
    pub fn new(auto_reject_threshold: f32, auto_flag_threshold: f32) -> Result<Self, RulesError> {
        for value in [auto_reject_threshold, auto_flag_threshold] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RulesError::OutOfRange(value));
            }
        }
        if auto_flag_threshold >= auto_reject_threshold {
            return Err(RulesError::ThresholdOrder {
                flag: auto_flag_threshold,
                reject: auto_reject_threshold,
            });
        }

        Ok(Self {
            auto_reject_threshold,
            auto_flag_threshold,
            ..Default::default()
        })
    }

    pub fn with_multiple_reports_threshold(mut self, threshold: u32) -> Result<Self, RulesError> {
        if threshold == 0 {
            return Err(RulesError::ReportThreshold);
        }
        self.multiple_reports_threshold = threshold;
        Ok(self)
    }

    pub fn auto_reject_threshold(&self) -> f32 {
        self.auto_reject_threshold
    }

    pub fn auto_flag_threshold(&self) -> f32 {
        self.auto_flag_threshold
    }

    pub fn multiple_reports_threshold(&self) -> u32 {
        self.multiple_reports_threshold
    }

    /// Rules to apply to a particular author.
    ///
    /// New authors get both thresholds shifted down by the same offset, so the
    /// ordering between them is preserved.
    pub fn effective_for(&self, author_is_new: bool) -> Self {
        if !(author_is_new && self.new_user_stricter_rules) {
            return self.clone();
        }

        let offset = NEW_USER_THRESHOLD_OFFSET.min(self.auto_flag_threshold);
        Self {
            auto_reject_threshold: self.auto_reject_threshold - offset,
            auto_flag_threshold: self.auto_flag_threshold - offset,
            ..self.clone()
        }
    }
}

/// Point-in-time view of the engine's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggingStatistics {
    pub total_processed: u64,
    pub auto_approved: u64,
    pub auto_flagged: u64,
    pub auto_rejected: u64,
    pub sent_to_human_review: u64,
}

impl FlaggingStatistics {
    fn rate(count: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    }

    pub fn auto_approval_rate(&self) -> f64 {
        Self::rate(self.auto_approved, self.total_processed)
    }

    pub fn auto_rejection_rate(&self) -> f64 {
        Self::rate(self.auto_rejected, self.total_processed)
    }

    pub fn human_review_rate(&self) -> f64 {
        Self::rate(self.sent_to_human_review, self.total_processed)
    }
}

/// Lock-free counters behind `FlaggingStatistics`.
///
/// `total_processed` is always bumped before the outcome counter, and
/// `snapshot` reads outcome counters before the total, so every snapshot
/// satisfies `approved + flagged + rejected <= total`.
#[derive(Debug, Default)]
pub struct FlaggingCounters {
    total_processed: AtomicU64,
    auto_approved: AtomicU64,
    auto_flagged: AtomicU64,
    auto_rejected: AtomicU64,
    sent_to_human_review: AtomicU64,
}

impl FlaggingCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, action: &AutomaticAction) {
        self.total_processed.fetch_add(1, Ordering::SeqCst);
        let counter = match action {
            AutomaticAction::AutoApprove => &self.auto_approved,
            AutomaticAction::AutoFlag { .. } => &self.auto_flagged,
            AutomaticAction::AutoReject { .. } => &self.auto_rejected,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_human_review(&self) {
        self.sent_to_human_review.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> FlaggingStatistics {
        let auto_approved = self.auto_approved.load(Ordering::SeqCst);
        let auto_flagged = self.auto_flagged.load(Ordering::SeqCst);
        let auto_rejected = self.auto_rejected.load(Ordering::SeqCst);
        let sent_to_human_review = self.sent_to_human_review.load(Ordering::SeqCst);
        let total_processed = self.total_processed.load(Ordering::SeqCst);

        FlaggingStatistics {
            total_processed,
            auto_approved,
            auto_flagged,
            auto_rejected,
            sent_to_human_review,
        }
    }

    /// Seed the counters from a persisted snapshot. Used once at startup.
    pub fn restore(&self, stats: FlaggingStatistics) {
        self.auto_approved.store(stats.auto_approved, Ordering::SeqCst);
        self.auto_flagged.store(stats.auto_flagged, Ordering::SeqCst);
        self.auto_rejected.store(stats.auto_rejected, Ordering::SeqCst);
        self.sent_to_human_review
            .store(stats.sent_to_human_review, Ordering::SeqCst);
        self.total_processed
            .store(stats.total_processed, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_default_rules_are_valid() {
        let rules = FlaggingRulesConfiguration::default();
        assert!(rules.auto_flag_threshold() < rules.auto_reject_threshold());
        assert_eq!(rules.multiple_reports_threshold(), 3);
    }

    #[test]
    fn test_threshold_order_enforced_at_construction() {
        let err = FlaggingRulesConfiguration::new(0.5, 0.5).unwrap_err();
        assert!(matches!(err, RulesError::ThresholdOrder { .. }));

        let err = FlaggingRulesConfiguration::new(0.4, 0.6).unwrap_err();
        assert!(matches!(err, RulesError::ThresholdOrder { .. }));

        let err = FlaggingRulesConfiguration::new(1.5, 0.6).unwrap_err();
        assert_eq!(err, RulesError::OutOfRange(1.5));

        assert!(FlaggingRulesConfiguration::new(0.8, 0.6).is_ok());
    }

    #[test]
    fn test_deserialization_validates() {
        let bad = r#"{"autoRejectThreshold":0.5,"autoFlagThreshold":0.9}"#;
        assert!(serde_json::from_str::<FlaggingRulesConfiguration>(bad).is_err());

        let good = r#"{"autoRejectThreshold":0.95,"autoFlagThreshold":0.5,"spamAutoFlag":false}"#;
        let rules: FlaggingRulesConfiguration = serde_json::from_str(good).unwrap();
        assert_eq!(rules.auto_flag_threshold(), 0.5);
        assert!(!rules.spam_auto_flag);
        assert!(rules.pii_auto_reject);
    }

    #[test]
    fn test_zero_report_threshold_rejected() {
        let result = FlaggingRulesConfiguration::default().with_multiple_reports_threshold(0);
        assert_eq!(result.unwrap_err(), RulesError::ReportThreshold);
    }

    #[test]
    fn test_new_user_rules_keep_ordering() {
        let rules = FlaggingRulesConfiguration::new(0.2, 0.05).unwrap();
        let strict = rules.effective_for(true);
        assert!(strict.auto_flag_threshold() < strict.auto_reject_threshold());
        assert!(strict.auto_flag_threshold() >= 0.0);

        let default_rules = FlaggingRulesConfiguration::default();
        let strict = default_rules.effective_for(true);
        assert!(strict.auto_reject_threshold() < default_rules.auto_reject_threshold());
        assert_eq!(default_rules.effective_for(false), default_rules);
    }

    #[test]
    fn test_rates_without_traffic_are_zero() {
        let stats = FlaggingStatistics::default();
        assert_eq!(stats.auto_approval_rate(), 0.0);
        assert_eq!(stats.human_review_rate(), 0.0);
    }

    #[test]
    fn test_counters_track_outcomes() {
        let counters = FlaggingCounters::new();
        counters.record(&AutomaticAction::AutoApprove);
        counters.record(&AutomaticAction::AutoApprove);
        counters.record(&AutomaticAction::AutoFlag {
            reason: "spam".to_string(),
        });
        counters.record_human_review();

        let stats = counters.snapshot();
        assert_eq!(stats.total_processed, 3);
        assert_eq!(stats.auto_approved, 2);
        assert_eq!(stats.auto_flagged, 1);
        assert!((stats.auto_approval_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let counters = Arc::new(FlaggingCounters::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let counters = Arc::clone(&counters);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        let action = if i % 2 == 0 {
                            AutomaticAction::AutoApprove
                        } else {
                            AutomaticAction::AutoReject {
                                reason: "test".to_string(),
                            }
                        };
                        counters.record(&action);
                        let snap = counters.snapshot();
                        assert!(
                            snap.auto_approved + snap.auto_flagged + snap.auto_rejected
                                <= snap.total_processed
                        );
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = counters.snapshot();
        assert_eq!(stats.total_processed, 8_000);
        assert_eq!(stats.auto_approved, 4_000);
        assert_eq!(stats.auto_rejected, 4_000);
    }
}
