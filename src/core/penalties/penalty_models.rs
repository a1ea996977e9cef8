// Penalty models - sanctions applied to users.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum PenaltyType {
    Warning,
    TemporaryBan { days: i64 },
    PermanentBan,
}

impl PenaltyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PenaltyType::Warning => "warning",
            PenaltyType::TemporaryBan { .. } => "temporaryBan",
            PenaltyType::PermanentBan => "permanentBan",
        }
    }

    /// Expiry for a penalty applied at `applied_at`.
    ///
    /// Warnings and permanent bans never expire. A temporary ban of zero or
    /// negative days expires the moment it is applied. A ban too long to
    /// represent is treated as never expiring.
    pub fn expiry_from(&self, applied_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            PenaltyType::TemporaryBan { days } if *days <= 0 => Some(applied_at),
            PenaltyType::TemporaryBan { days } => Duration::try_days(*days)
                .and_then(|d| applied_at.checked_add_signed(d)),
            PenaltyType::Warning | PenaltyType::PermanentBan => None,
        }
    }
}

/// Parameters for recording a penalty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPenalty {
    pub user_id: String,
    pub moderator_id: String,
    pub penalty_type: PenaltyType,
    pub reason: String,
    #[serde(default)]
    pub content_id: Option<String>,
    /// Moderator decision that caused this penalty, if any.
    #[serde(default)]
    pub moderation_action_id: Option<String>,
}

/// A recorded sanction. Records are never deleted; reversal sets the
/// `removed_*` fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPenalty {
    pub id: String,
    pub user_id: String,
    pub moderator_id: String,
    pub content_id: Option<String>,
    pub moderation_action_id: Option<String>,
    pub penalty_type: PenaltyType,
    pub reason: String,
    pub applied_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub removed_at: Option<DateTime<Utc>>,
    pub removed_by: Option<String>,
    pub removal_reason: Option<String>,
    /// Bumped on every change; guards compare-and-swap updates.
    pub version: u64,
}

impl UserPenalty {
    pub fn new(params: NewPenalty, applied_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: params.user_id,
            moderator_id: params.moderator_id,
            content_id: params.content_id,
            moderation_action_id: params.moderation_action_id,
            expires_at: params.penalty_type.expiry_from(applied_at),
            penalty_type: params.penalty_type,
            reason: params.reason,
            applied_at,
            removed_at: None,
            removed_by: None,
            removal_reason: None,
            version: 0,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }

    /// Active = not reversed and not yet expired at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_removed() && self.expires_at.map_or(true, |expires| expires > now)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    /// Whether this penalty belongs to the given decision. Penalties issued
    /// without a decision id fall back to matching on content.
    pub fn is_tied_to(&self, content_id: &str, moderation_action_id: &str) -> bool {
        match self.moderation_action_id.as_deref() {
            Some(action_id) => action_id == moderation_action_id,
            None => self.content_id.as_deref() == Some(content_id),
        }
    }
}

/// Penalty plus its derived state, as handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyView {
    #[serde(flatten)]
    pub penalty: UserPenalty,
    pub is_active: bool,
}

impl From<UserPenalty> for PenaltyView {
    fn from(penalty: UserPenalty) -> Self {
        let is_active = penalty.is_active();
        Self { penalty, is_active }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(penalty_type: PenaltyType) -> NewPenalty {
        NewPenalty {
            user_id: "u1".to_string(),
            moderator_id: "m1".to_string(),
            penalty_type,
            reason: "test".to_string(),
            content_id: Some("c1".to_string()),
            moderation_action_id: None,
        }
    }

    #[test]
    fn test_negative_temporary_ban_is_inactive_immediately() {
        let penalty = UserPenalty::new(params(PenaltyType::TemporaryBan { days: -1 }), Utc::now());
        assert!(!penalty.is_active());

        let zero = UserPenalty::new(params(PenaltyType::TemporaryBan { days: 0 }), Utc::now());
        assert!(!zero.is_active());
    }

    #[test]
    fn test_temporary_ban_expires_after_days() {
        let now = Utc::now();
        let penalty = UserPenalty::new(params(PenaltyType::TemporaryBan { days: 3 }), now);
        assert_eq!(penalty.expires_at, Some(now + Duration::days(3)));
        assert!(penalty.is_active_at(now + Duration::days(2)));
        assert!(!penalty.is_active_at(now + Duration::days(3)));
    }

    #[test]
    fn test_huge_ban_does_not_overflow() {
        let penalty = UserPenalty::new(
            params(PenaltyType::TemporaryBan { days: i64::MAX }),
            Utc::now(),
        );
        assert!(penalty.expires_at.is_none());
        assert!(penalty.is_active());
    }

    #[test]
    fn test_warning_and_permanent_never_expire() {
        let warning = UserPenalty::new(params(PenaltyType::Warning), Utc::now());
        let ban = UserPenalty::new(params(PenaltyType::PermanentBan), Utc::now());
        assert!(warning.expires_at.is_none() && warning.is_active());
        assert!(ban.expires_at.is_none() && ban.is_active());
    }

    #[test]
    fn test_penalty_type_serializes_with_tag() {
        let json = serde_json::to_value(PenaltyType::TemporaryBan { days: 7 }).unwrap();
        assert_eq!(json["type"], "temporaryBan");
        assert_eq!(json["days"], 7);
    }

    #[test]
    fn test_tied_to_prefers_decision_id() {
        let mut tied = params(PenaltyType::Warning);
        tied.moderation_action_id = Some("d1".to_string());
        let penalty = UserPenalty::new(tied, Utc::now());
        assert!(penalty.is_tied_to("c1", "d1"));
        assert!(!penalty.is_tied_to("c1", "d2"));

        let manual = UserPenalty::new(params(PenaltyType::Warning), Utc::now());
        assert!(manual.is_tied_to("c1", "d2"));
        assert!(!manual.is_tied_to("c2", "d2"));
    }
}
