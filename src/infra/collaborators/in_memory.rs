// In-memory content store and reputation directory.
//
// The host application owns the real versions of both. These keep enough
// state for the gateway and tests: content snapshots with a visibility bit,
// role grants, and a reputation balance moved by penalty effects.

use crate::core::collaborators::{
    CollaboratorError, ContentSnapshot, ContentStore, ReputationDirectory, Role,
};
use crate::core::penalties::{PenaltyType, UserPenalty};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::debug;

// ============================================================================
// CONTENT
// ============================================================================

#[derive(Default)]
pub struct InMemoryContentStore {
    content: DashMap<String, ContentSnapshot>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a snapshot.
    pub fn upsert(&self, snapshot: ContentSnapshot) {
        self.content.insert(snapshot.content_id.clone(), snapshot);
    }

    pub fn visibility(&self, content_id: &str) -> Option<bool> {
        self.content.get(content_id).map(|c| c.visible)
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn get_content(&self, content_id: &str) -> Result<Option<ContentSnapshot>, CollaboratorError> {
        Ok(self.content.get(content_id).map(|c| c.clone()))
    }

    async fn set_visibility(&self, content_id: &str, visible: bool) -> Result<(), CollaboratorError> {
        let mut snapshot = self
            .content
            .get_mut(content_id)
            .ok_or_else(|| CollaboratorError::ContentNotFound(content_id.to_string()))?;
        snapshot.visible = visible;
        debug!(content_id = %content_id, visible, "Visibility updated");
        Ok(())
    }
}

// ============================================================================
// REPUTATION
// ============================================================================

/// Reputation points a penalty costs.
fn penalty_cost(penalty_type: &PenaltyType) -> i64 {
    match penalty_type {
        PenaltyType::Warning => 10,
        PenaltyType::TemporaryBan { .. } => 25,
        PenaltyType::PermanentBan => 100,
    }
}

#[derive(Default)]
pub struct InMemoryReputation {
    roles: DashMap<String, HashSet<Role>>,
    points: DashMap<String, i64>,
}

impl InMemoryReputation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_role(&self, user_id: &str, role: Role) {
        self.roles.entry(user_id.to_string()).or_default().insert(role);
    }

    /// Current balance; users start at zero.
    pub fn reputation(&self, user_id: &str) -> i64 {
        self.points.get(user_id).map(|p| *p).unwrap_or(0)
    }

    fn adjust(&self, user_id: &str, delta: i64) {
        *self.points.entry(user_id.to_string()).or_insert(0) += delta;
    }
}

#[async_trait]
impl ReputationDirectory for InMemoryReputation {
    async fn has_role(&self, user_id: &str, role: Role) -> Result<bool, CollaboratorError> {
        Ok(self
            .roles
            .get(user_id)
            .map_or(false, |roles| roles.contains(&role)))
    }

    async fn apply_penalty_effect(
        &self,
        user_id: &str,
        penalty: &UserPenalty,
    ) -> Result<(), CollaboratorError> {
        self.adjust(user_id, -penalty_cost(&penalty.penalty_type));
        Ok(())
    }

    async fn revert_penalty_effect(
        &self,
        user_id: &str,
        penalty: &UserPenalty,
    ) -> Result<(), CollaboratorError> {
        self.adjust(user_id, penalty_cost(&penalty.penalty_type));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{ContentSubmission, ContentType};
    use crate::core::penalties::NewPenalty;
    use chrono::Utc;

    #[tokio::test]
    async fn test_visibility_of_unknown_content_is_an_error() {
        let store = InMemoryContentStore::new();
        let err = store.set_visibility("nope", false).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::ContentNotFound(_)));

        let submission = ContentSubmission::text("c1", ContentType::Review, "u1", "great");
        store.upsert(ContentSnapshot::from_submission(&submission));
        store.set_visibility("c1", false).await.unwrap();
        assert_eq!(store.visibility("c1"), Some(false));
    }

    #[tokio::test]
    async fn test_penalty_effects_move_reputation_both_ways() {
        let reputation = InMemoryReputation::new();
        let penalty = UserPenalty::new(
            NewPenalty {
                user_id: "u1".to_string(),
                moderator_id: "mod-1".to_string(),
                penalty_type: PenaltyType::TemporaryBan { days: 1 },
                reason: "spam".to_string(),
                content_id: None,
                moderation_action_id: None,
            },
            Utc::now(),
        );

        reputation.apply_penalty_effect("u1", &penalty).await.unwrap();
        assert_eq!(reputation.reputation("u1"), -25);
        reputation.revert_penalty_effect("u1", &penalty).await.unwrap();
        assert_eq!(reputation.reputation("u1"), 0);
    }

    #[tokio::test]
    async fn test_roles() {
        let reputation = InMemoryReputation::new();
        reputation.grant_role("admin-1", Role::Admin);

        assert!(reputation.has_role("admin-1", Role::Admin).await.unwrap());
        assert!(!reputation.has_role("admin-1", Role::Moderator).await.unwrap());
        assert!(!reputation.has_role("nobody", Role::Moderator).await.unwrap());
    }
}
