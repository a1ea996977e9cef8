// Penalty ledger - append-only record of user sanctions.
//
// Reversal is the only mutation and goes through compare-and-swap on the
// record's version, so two concurrent reversals of the same penalty cannot
// both succeed.

use super::penalty_models::{NewPenalty, PenaltyType, UserPenalty};
use crate::core::collaborators::ReputationDirectory;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum PenaltyError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Concurrent update conflict on penalty {0}")]
    Conflict(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait PenaltyStore: Send + Sync {
    async fn insert_penalty(&self, penalty: &UserPenalty) -> Result<(), PenaltyError>;

    async fn get_penalty(&self, penalty_id: &str) -> Result<Option<UserPenalty>, PenaltyError>;

    /// Every penalty for a user, oldest first.
    async fn penalties_for_user(&self, user_id: &str) -> Result<Vec<UserPenalty>, PenaltyError>;

    /// Penalties applied between `start` and `end`, inclusive.
    async fn penalties_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UserPenalty>, PenaltyError>;

    /// Store `penalty` only if the stored version still equals
    /// `expected_version`. Returns whether the swap happened.
    async fn compare_and_swap(
        &self,
        penalty: &UserPenalty,
        expected_version: u64,
    ) -> Result<bool, PenaltyError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

const DEFAULT_MAX_ATTEMPTS: usize = 3;

pub struct PenaltyLedger {
    store: Arc<dyn PenaltyStore>,
    reputation: Arc<dyn ReputationDirectory>,
    max_attempts: usize,
}

impl PenaltyLedger {
    pub fn new(store: Arc<dyn PenaltyStore>, reputation: Arc<dyn ReputationDirectory>) -> Self {
        Self {
            store,
            reputation,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Record a penalty and push its effect to the reputation directory.
    pub async fn apply_user_penalty(&self, params: NewPenalty) -> Result<UserPenalty, PenaltyError> {
        self.record_penalty(UserPenalty::new(params, Utc::now())).await
    }

    /// Store a penalty built ahead of time, so callers can reference its id
    /// before it takes effect.
    pub async fn record_penalty(&self, penalty: UserPenalty) -> Result<UserPenalty, PenaltyError> {
        self.store.insert_penalty(&penalty).await?;

        info!(
            penalty_id = %penalty.id,
            user_id = %penalty.user_id,
            moderator_id = %penalty.moderator_id,
            penalty_type = penalty.penalty_type.as_str(),
            "Penalty applied"
        );

        if let Err(e) = self
            .reputation
            .apply_penalty_effect(&penalty.user_id, &penalty)
            .await
        {
            warn!(penalty_id = %penalty.id, error = %e, "Failed to apply penalty effect");
        }

        Ok(penalty)
    }

    pub async fn get_penalty(&self, penalty_id: &str) -> Result<Option<UserPenalty>, PenaltyError> {
        self.store.get_penalty(penalty_id).await
    }

    /// Penalties in force right now. Evaluated on every call.
    pub async fn get_active_penalties(&self, user_id: &str) -> Result<Vec<UserPenalty>, PenaltyError> {
        let now = Utc::now();
        Ok(self
            .store
            .penalties_for_user(user_id)
            .await?
            .into_iter()
            .filter(|p| p.is_active_at(now))
            .collect())
    }

    /// Every penalty ever recorded for the user, including reversed and
    /// expired ones.
    pub async fn get_penalty_history(&self, user_id: &str) -> Result<Vec<UserPenalty>, PenaltyError> {
        self.store.penalties_for_user(user_id).await
    }

    pub async fn active_warning_count(&self, user_id: &str) -> Result<usize, PenaltyError> {
        Ok(self
            .get_active_penalties(user_id)
            .await?
            .iter()
            .filter(|p| p.penalty_type == PenaltyType::Warning)
            .count())
    }

    pub async fn penalties_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UserPenalty>, PenaltyError> {
        self.store.penalties_between(start, end).await
    }

    /// Reverse a penalty. Returns `false` if it does not exist or was already
    /// reversed; the record itself is kept.
    pub async fn remove_penalty(
        &self,
        penalty_id: &str,
        removed_by: &str,
        reason: &str,
    ) -> Result<bool, PenaltyError> {
        for attempt in 1..=self.max_attempts {
            let Some(current) = self.store.get_penalty(penalty_id).await? else {
                return Ok(false);
            };
            if current.is_removed() {
                return Ok(false);
            }

            let mut updated = current.clone();
            updated.removed_at = Some(Utc::now());
            updated.removed_by = Some(removed_by.to_string());
            updated.removal_reason = Some(reason.to_string());
            updated.version = current.version + 1;

            if self.store.compare_and_swap(&updated, current.version).await? {
                info!(
                    penalty_id = %penalty_id,
                    user_id = %updated.user_id,
                    removed_by = %removed_by,
                    "Penalty removed"
                );

                if let Err(e) = self
                    .reputation
                    .revert_penalty_effect(&updated.user_id, &updated)
                    .await
                {
                    warn!(penalty_id = %penalty_id, error = %e, "Failed to revert penalty effect");
                }
                return Ok(true);
            }

            warn!(penalty_id = %penalty_id, attempt, "Penalty changed concurrently, retrying");
        }

        Err(PenaltyError::Conflict(penalty_id.to_string()))
    }

    /// Reverse every unreversed penalty of `user_id` issued for the decision,
    /// plus manual ones on the content that carry no decision id. Returns the
    /// penalties this call reversed.
    pub async fn reverse_for_appeal(
        &self,
        user_id: &str,
        content_id: &str,
        moderation_action_id: &str,
        removed_by: &str,
        reason: &str,
    ) -> Result<Vec<UserPenalty>, PenaltyError> {
        let candidates: Vec<UserPenalty> = self
            .store
            .penalties_for_user(user_id)
            .await?
            .into_iter()
            .filter(|p| !p.is_removed() && p.is_tied_to(content_id, moderation_action_id))
            .collect();

        let mut reversed = Vec::new();
        for penalty in candidates {
            if self.remove_penalty(&penalty.id, removed_by, reason).await? {
                reversed.push(penalty);
            }
        }
        Ok(reversed)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collaborators::{CollaboratorError, Role};
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock store for testing
    struct MockPenaltyStore {
        penalties: DashMap<String, UserPenalty>,
    }

    impl MockPenaltyStore {
        fn new() -> Self {
            Self {
                penalties: DashMap::new(),
            }
        }
    }

    #[async_trait]
    impl PenaltyStore for MockPenaltyStore {
        async fn insert_penalty(&self, penalty: &UserPenalty) -> Result<(), PenaltyError> {
            self.penalties.insert(penalty.id.clone(), penalty.clone());
            Ok(())
        }

        async fn get_penalty(&self, penalty_id: &str) -> Result<Option<UserPenalty>, PenaltyError> {
            Ok(self.penalties.get(penalty_id).map(|p| p.clone()))
        }

        async fn penalties_for_user(
            &self,
            user_id: &str,
        ) -> Result<Vec<UserPenalty>, PenaltyError> {
            let mut found: Vec<UserPenalty> = self
                .penalties
                .iter()
                .filter(|p| p.user_id == user_id)
                .map(|p| p.value().clone())
                .collect();
            found.sort_by_key(|p| p.applied_at);
            Ok(found)
        }

        async fn penalties_between(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<UserPenalty>, PenaltyError> {
            Ok(self
                .penalties
                .iter()
                .filter(|p| p.applied_at >= start && p.applied_at <= end)
                .map(|p| p.value().clone())
                .collect())
        }

        async fn compare_and_swap(
            &self,
            penalty: &UserPenalty,
            expected_version: u64,
        ) -> Result<bool, PenaltyError> {
            match self.penalties.get_mut(&penalty.id) {
                Some(mut stored) if stored.version == expected_version => {
                    *stored = penalty.clone();
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }

    /// Counts effects so tests can check they fire exactly once.
    #[derive(Default)]
    struct CountingReputation {
        applied: AtomicUsize,
        reverted: AtomicUsize,
    }

    #[async_trait]
    impl ReputationDirectory for CountingReputation {
        async fn has_role(&self, _user_id: &str, _role: Role) -> Result<bool, CollaboratorError> {
            Ok(true)
        }

        async fn apply_penalty_effect(
            &self,
            _user_id: &str,
            _penalty: &UserPenalty,
        ) -> Result<(), CollaboratorError> {
            self.applied.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn revert_penalty_effect(
            &self,
            _user_id: &str,
            _penalty: &UserPenalty,
        ) -> Result<(), CollaboratorError> {
            self.reverted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn ledger() -> (PenaltyLedger, Arc<CountingReputation>) {
        let reputation = Arc::new(CountingReputation::default());
        let ledger = PenaltyLedger::new(Arc::new(MockPenaltyStore::new()), reputation.clone());
        (ledger, reputation)
    }

    fn warning(user_id: &str, content_id: &str) -> NewPenalty {
        NewPenalty {
            user_id: user_id.to_string(),
            moderator_id: "mod-1".to_string(),
            penalty_type: PenaltyType::Warning,
            reason: "harassment".to_string(),
            content_id: Some(content_id.to_string()),
            moderation_action_id: Some(format!("decision-{}", content_id)),
        }
    }

    #[tokio::test]
    async fn test_apply_fires_reputation_effect() {
        let (ledger, reputation) = ledger();
        let penalty = ledger.apply_user_penalty(warning("u1", "c1")).await.unwrap();

        assert!(penalty.is_active());
        assert_eq!(reputation.applied.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.get_active_penalties("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_ban_is_kept_but_not_active() {
        let (ledger, _) = ledger();
        let mut params = warning("u1", "c1");
        params.penalty_type = PenaltyType::TemporaryBan { days: -1 };
        ledger.apply_user_penalty(params).await.unwrap();

        assert!(ledger.get_active_penalties("u1").await.unwrap().is_empty());
        assert_eq!(ledger.get_penalty_history("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_keeps_history() {
        let (ledger, reputation) = ledger();
        let penalty = ledger.apply_user_penalty(warning("u1", "c1")).await.unwrap();

        assert!(ledger
            .remove_penalty(&penalty.id, "mod-2", "mistake")
            .await
            .unwrap());
        assert!(!ledger
            .remove_penalty(&penalty.id, "mod-2", "mistake")
            .await
            .unwrap());
        assert!(!ledger.remove_penalty("missing", "mod-2", "x").await.unwrap());

        let history = ledger.get_penalty_history("u1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].removal_reason.as_deref(), Some("mistake"));
        assert!(ledger.get_active_penalties("u1").await.unwrap().is_empty());
        assert_eq!(reputation.reverted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_removals_succeed_once() {
        let reputation = Arc::new(CountingReputation::default());
        let ledger = Arc::new(PenaltyLedger::new(
            Arc::new(MockPenaltyStore::new()),
            reputation.clone(),
        ));
        let penalty = ledger.apply_user_penalty(warning("u1", "c1")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let ledger = Arc::clone(&ledger);
            let id = penalty.id.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .remove_penalty(&id, &format!("mod-{}", i), "race")
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            // A loser either sees the reversal (false) or runs out of retries.
            if let Ok(true) = handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(reputation.reverted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reverse_for_appeal_only_touches_tied_penalties() {
        let (ledger, _) = ledger();
        ledger.apply_user_penalty(warning("u1", "c1")).await.unwrap();
        ledger.apply_user_penalty(warning("u1", "c2")).await.unwrap();

        let reversed = ledger
            .reverse_for_appeal("u1", "c1", "decision-c1", "mod-2", "appeal approved")
            .await
            .unwrap();
        assert_eq!(reversed.len(), 1);

        let active = ledger.get_active_penalties("u1").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].content_id.as_deref(), Some("c2"));
        assert_eq!(ledger.active_warning_count("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reverse_for_appeal_spares_other_decisions_on_same_content() {
        let (ledger, _) = ledger();
        let mut first = warning("u1", "c1");
        first.moderation_action_id = Some("d1".to_string());
        let mut second = warning("u1", "c1");
        second.moderation_action_id = Some("d2".to_string());
        ledger.apply_user_penalty(first).await.unwrap();
        ledger.apply_user_penalty(second).await.unwrap();

        let reversed = ledger
            .reverse_for_appeal("u1", "c1", "d1", "mod-2", "appeal approved")
            .await
            .unwrap();
        assert_eq!(reversed.len(), 1);

        let active = ledger.get_active_penalties("u1").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].moderation_action_id.as_deref(), Some("d2"));
    }
}
