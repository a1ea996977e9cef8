// Moderator workflow models - moderators, their decisions and the
// aggregations built over the decision audit trail.

use crate::core::moderation::{AutomaticAction, FlaggingStatistics, Severity};
use crate::core::penalties::UserPenalty;
use crate::core::review_queue::QueueStatistics;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Moderator {
    pub id: String,
    pub is_active: bool,
    pub registered_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl Moderator {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_active: true,
            registered_at: Utc::now(),
            deactivated_at: None,
        }
    }
}

/// Derived on request from the queue and the audit trail; never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeratorWorkload {
    pub moderator_id: String,
    pub is_active: bool,
    pub assigned_items: usize,
    pub completed_today: usize,
    pub average_time_per_item_minutes: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModeratorAction {
    Approve,
    Reject,
    Flag,
    Edit,
    Warn,
    Ban,
}

impl ModeratorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeratorAction::Approve => "approve",
            ModeratorAction::Reject => "reject",
            ModeratorAction::Flag => "flag",
            ModeratorAction::Edit => "edit",
            ModeratorAction::Warn => "warn",
            ModeratorAction::Ban => "ban",
        }
    }

    /// Whether the action takes the content out of the review queue.
    pub fn resolves_item(&self) -> bool {
        !matches!(self, ModeratorAction::Flag)
    }

    /// Visibility to push to the content store, if the action changes it.
    pub fn visibility(&self) -> Option<bool> {
        match self {
            ModeratorAction::Approve | ModeratorAction::Edit => Some(true),
            ModeratorAction::Reject | ModeratorAction::Flag | ModeratorAction::Ban => Some(false),
            ModeratorAction::Warn => None,
        }
    }

    /// Whether the moderator judged the content to violate policy.
    pub fn upholds_violation(&self) -> bool {
        matches!(
            self,
            ModeratorAction::Reject | ModeratorAction::Warn | ModeratorAction::Ban
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub content_id: String,
    pub moderator_id: String,
    pub action: ModeratorAction,
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One moderator decision, as kept in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationDecision {
    pub id: String,
    pub content_id: String,
    pub author_id: String,
    pub moderator_id: String,
    pub action: ModeratorAction,
    pub reason: String,
    pub notes: Option<String>,
    /// What the engine had decided before a human looked at it.
    pub automatic_action: Option<AutomaticAction>,
    pub severity: Severity,
    pub report_count: u32,
    pub penalty_id: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub decided_at: DateTime<Utc>,
    /// Set when an appeal against this decision is approved.
    pub overturned: bool,
}

impl ModerationDecision {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Resolving decisions that still stand.
    pub fn is_final(&self) -> bool {
        self.action.resolves_item() && !self.overturned
    }

    /// Minutes between assignment and decision, if the item was assigned.
    pub fn handling_minutes(&self) -> Option<f64> {
        self.assigned_at
            .map(|assigned| (self.decided_at - assigned).num_seconds().max(0) as f64 / 60.0)
    }
}

/// Result of `process_content_approval`. Failures are reported in `error`
/// rather than as a Rust error so callers can branch on the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub decision_id: Option<String>,
    pub penalty: Option<UserPenalty>,
    /// The content had already been resolved; nothing was changed.
    pub already_resolved: bool,
}

impl DecisionOutcome {
    pub fn applied(decision_id: String, penalty: Option<UserPenalty>) -> Self {
        Self {
            success: true,
            error: None,
            decision_id: Some(decision_id),
            penalty,
            already_resolved: false,
        }
    }

    pub fn already_resolved(decision_id: String) -> Self {
        Self {
            success: true,
            error: None,
            decision_id: Some(decision_id),
            penalty: None,
            already_resolved: true,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            decision_id: None,
            penalty: None,
            already_resolved: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "range")]
pub enum TimeRange {
    #[default]
    Today,
    Week,
    Month,
    AllTime,
    Custom {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl TimeRange {
    /// Inclusive `(start, end)` bounds relative to `now`.
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            TimeRange::Today => {
                let midnight = now
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .map(|t| t.and_utc())
                    .unwrap_or(now);
                (midnight, now)
            }
            TimeRange::Week => (now - Duration::days(7), now),
            TimeRange::Month => (now - Duration::days(30), now),
            TimeRange::AllTime => (DateTime::<Utc>::default(), now),
            TimeRange::Custom { start, end } => (*start, *end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationMetrics {
    pub moderator_id: String,
    pub time_range: TimeRange,
    pub total_decisions: usize,
    pub approvals: usize,
    pub rejections: usize,
    pub flags: usize,
    pub edits: usize,
    pub warnings: usize,
    pub bans: usize,
    pub overturned: usize,
    /// `1 - overturned / total`, in `[0, 1]`; 0 without decisions.
    pub accuracy_score: f64,
    pub average_time_per_item_minutes: f64,
}

impl ModerationMetrics {
    pub fn from_decisions(
        moderator_id: &str,
        time_range: TimeRange,
        decisions: &[ModerationDecision],
    ) -> Self {
        let count = |action: ModeratorAction| decisions.iter().filter(|d| d.action == action).count();
        let total = decisions.len();
        let overturned = decisions.iter().filter(|d| d.overturned).count();

        let accuracy_score = if total == 0 {
            0.0
        } else {
            (1.0 - overturned as f64 / total as f64).clamp(0.0, 1.0)
        };

        Self {
            moderator_id: moderator_id.to_string(),
            time_range,
            total_decisions: total,
            approvals: count(ModeratorAction::Approve),
            rejections: count(ModeratorAction::Reject),
            flags: count(ModeratorAction::Flag),
            edits: count(ModeratorAction::Edit),
            warnings: count(ModeratorAction::Warn),
            bans: count(ModeratorAction::Ban),
            overturned,
            accuracy_score,
            average_time_per_item_minutes: average_handling_minutes(decisions),
        }
    }
}

pub fn average_handling_minutes(decisions: &[ModerationDecision]) -> f64 {
    let timed: Vec<f64> = decisions.iter().filter_map(|d| d.handling_minutes()).collect();
    if timed.is_empty() {
        0.0
    } else {
        timed.iter().sum::<f64>() / timed.len() as f64
    }
}

/// How often the automatic decision agreed with the human one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationAccuracy {
    /// Share of human decisions on auto-flagged/rejected content that upheld
    /// a violation. In `[0, 1]`.
    pub ai_accuracy: f64,
    /// Share of auto-flagged/rejected content a human approved. In `[0, 1]`.
    pub false_positive_rate: f64,
}

impl AutomationAccuracy {
    pub fn from_decisions(decisions: &[ModerationDecision]) -> Self {
        let judged: Vec<&ModerationDecision> = decisions
            .iter()
            .filter(|d| {
                matches!(
                    d.automatic_action,
                    Some(AutomaticAction::AutoFlag { .. }) | Some(AutomaticAction::AutoReject { .. })
                )
            })
            .filter(|d| d.action != ModeratorAction::Flag)
            .collect();
        if judged.is_empty() {
            return Self::default();
        }

        let total = judged.len() as f64;
        let upheld = judged.iter().filter(|d| d.action.upholds_violation()).count() as f64;
        let cleared = judged
            .iter()
            .filter(|d| matches!(d.action, ModeratorAction::Approve | ModeratorAction::Edit))
            .count() as f64;

        Self {
            ai_accuracy: (upheld / total).clamp(0.0, 1.0),
            false_positive_rate: (cleared / total).clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemModerationStats {
    pub time_range: TimeRange,
    pub flagging: FlaggingStatistics,
    pub auto_approval_rate: f64,
    pub human_review_rate: f64,
    pub queue: QueueStatistics,
    pub human_decisions: usize,
    pub overturned_decisions: usize,
    pub penalties_issued: usize,
    pub active_moderators: usize,
    pub ai_accuracy: f64,
    pub false_positive_rate: f64,
}
