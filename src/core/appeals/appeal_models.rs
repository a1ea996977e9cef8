// Appeal models - a user's request to reverse a moderation decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AppealStatus {
    Pending,
    Approved,
    Rejected,
}

impl AppealStatus {
    /// `pending` may move to a decision; decisions are terminal.
    pub fn can_transition_to(&self, new_status: AppealStatus) -> bool {
        matches!(
            (self, new_status),
            (AppealStatus::Pending, AppealStatus::Approved)
                | (AppealStatus::Pending, AppealStatus::Rejected)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppealStatus::Pending => "pending",
            AppealStatus::Approved => "approved",
            AppealStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AppealDecision {
    Approved,
    Rejected,
}

impl AppealDecision {
    pub fn status(&self) -> AppealStatus {
        match self {
            AppealDecision::Approved => AppealStatus::Approved,
            AppealDecision::Rejected => AppealStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appeal {
    pub id: String,
    pub user_id: String,
    pub content_id: String,
    pub moderation_action_id: String,
    pub reason: String,
    pub evidence: Option<String>,
    pub status: AppealStatus,
    pub decision: Option<AppealDecision>,
    pub decision_reason: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Appeal {
    pub fn new(
        user_id: impl Into<String>,
        content_id: impl Into<String>,
        moderation_action_id: impl Into<String>,
        reason: impl Into<String>,
        evidence: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            content_id: content_id.into(),
            moderation_action_id: moderation_action_id.into(),
            reason: reason.into(),
            evidence,
            status: AppealStatus::Pending,
            decision: None,
            decision_reason: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Apply a decision. Fails if the appeal was already decided.
    pub fn review(
        &mut self,
        moderator_id: &str,
        decision: AppealDecision,
        reason: &str,
    ) -> Result<(), String> {
        if !self.status.can_transition_to(decision.status()) {
            return Err(format!(
                "Invalid transition: {} -> {}",
                self.status.as_str(),
                decision.status().as_str()
            ));
        }

        self.status = decision.status();
        self.decision = Some(decision);
        self.decision_reason = Some(reason.to_string());
        self.reviewed_by = Some(moderator_id.to_string());
        self.reviewed_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appeal_status_transitions() {
        assert!(AppealStatus::Pending.can_transition_to(AppealStatus::Approved));
        assert!(AppealStatus::Pending.can_transition_to(AppealStatus::Rejected));
        assert!(!AppealStatus::Approved.can_transition_to(AppealStatus::Pending));
        assert!(!AppealStatus::Approved.can_transition_to(AppealStatus::Rejected));
        assert!(!AppealStatus::Rejected.can_transition_to(AppealStatus::Approved));
    }

    #[test]
    fn test_new_appeal_is_pending() {
        let appeal = Appeal::new("u1", "c1", "d1", "I was quoting someone", None);
        assert_eq!(appeal.status, AppealStatus::Pending);
        assert!(appeal.decision.is_none());
        assert!(appeal.reviewed_by.is_none());
    }

    #[test]
    fn test_review_is_final() {
        let mut appeal = Appeal::new("u1", "c1", "d1", "context", Some("screenshot".to_string()));
        appeal
            .review("mod-1", AppealDecision::Rejected, "rule applies")
            .unwrap();
        assert_eq!(appeal.status, AppealStatus::Rejected);
        assert_eq!(appeal.reviewed_by.as_deref(), Some("mod-1"));

        let second = appeal.review("mod-2", AppealDecision::Approved, "changed my mind");
        assert!(second.is_err());
        assert_eq!(appeal.decision, Some(AppealDecision::Rejected));
        assert_eq!(appeal.reviewed_by.as_deref(), Some("mod-1"));
    }
}
