// Review queue models - pending human work and the order it is handed out in.

use crate::core::moderation::{
    AutomaticAction, ContentSubmission, ContentType, ModerationResult, ModerationStatus, Severity,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// Queue urgency. Declaration order is the ordering: `Low < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// One level up, saturating at `Critical`.
    pub fn escalate(self) -> Self {
        match self {
            Priority::Low => Priority::Medium,
            Priority::Medium => Priority::High,
            Priority::High | Priority::Critical => Priority::Critical,
        }
    }
}

impl From<Severity> for Priority {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => Priority::Low,
            Severity::Medium => Priority::Medium,
            Severity::High => Priority::High,
            Severity::Critical => Priority::Critical,
        }
    }
}

/// A unit of pending human-review work.
///
/// `content` and `image_urls` are copied at enqueue time and are not
/// refreshed if the author edits the content later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationQueueItem {
    pub id: String,
    pub content_id: String,
    pub content_type: ContentType,
    pub author_id: String,
    pub content: Option<String>,
    pub image_urls: Vec<String>,
    pub moderation_result: ModerationResult,
    pub automatic_action: AutomaticAction,
    pub report_count: u32,
    pub priority: Priority,
    pub status: ModerationStatus,
    pub assigned_moderator: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModerationQueueItem {
    /// Build a queue entry for freshly classified content.
    pub fn from_classification(
        submission: &ContentSubmission,
        result: &ModerationResult,
        action: &AutomaticAction,
    ) -> Self {
        let now = Utc::now();
        let status = match action {
            AutomaticAction::AutoFlag { .. } => ModerationStatus::Flagged,
            _ => ModerationStatus::Pending,
        };

        Self {
            id: Uuid::new_v4().to_string(),
            content_id: submission.content_id.clone(),
            content_type: submission.content_type,
            author_id: submission.author_id.clone(),
            content: submission.text.clone(),
            image_urls: submission.images.iter().map(|i| i.url.clone()).collect(),
            moderation_result: result.clone(),
            automatic_action: action.clone(),
            report_count: 0,
            priority: result.effective_severity().into(),
            status,
            assigned_moderator: None,
            assigned_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> QueueKey {
        QueueKey {
            priority: self.priority,
            created_at: self.created_at,
            id: self.id.clone(),
        }
    }

    /// Waiting (not claimed by a moderator) and therefore dispatchable.
    pub fn is_waiting(&self) -> bool {
        matches!(
            self.status,
            ModerationStatus::Pending | ModerationStatus::Flagged
        )
    }
}

/// Dispatch order: higher priority first, then oldest first, then by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKey {
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub id: String,
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Read-side filter. Every field is optional; an empty filter matches all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueFilter {
    pub status: Option<ModerationStatus>,
    pub content_type: Option<ContentType>,
    pub priority: Option<Priority>,
    /// Case-insensitive substring of the content snapshot or the reason.
    pub search: Option<String>,
    pub assigned_to: Option<String>,
}

impl QueueFilter {
    pub fn matches(&self, item: &ModerationQueueItem) -> bool {
        if self.status.is_some_and(|s| s != item.status) {
            return false;
        }
        if self.content_type.is_some_and(|t| t != item.content_type) {
            return false;
        }
        if self.priority.is_some_and(|p| p != item.priority) {
            return false;
        }
        if let Some(moderator) = &self.assigned_to {
            if item.assigned_moderator.as_deref() != Some(moderator.as_str()) {
                return false;
            }
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let in_content = item
                .content
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains(&needle));
            let in_reason = item
                .moderation_result
                .reason
                .to_lowercase()
                .contains(&needle)
                || item
                    .automatic_action
                    .reason()
                    .is_some_and(|r| r.to_lowercase().contains(&needle));
            if !(in_content || in_reason) {
                return false;
            }
        }
        true
    }
}

/// Aggregate view of the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatistics {
    pub total_items: usize,
    /// Items at high or critical priority.
    pub high_priority_items: usize,
    pub under_review_items: usize,
    pub average_wait_time_minutes: f64,
}
