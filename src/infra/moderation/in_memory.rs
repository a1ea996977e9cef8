// In-memory implementations of the moderation storage ports.
//
// Used by tests and by `STORAGE_BACKEND=memory`. Everything lives in
// DashMaps, so concurrent requests never share a global lock; nothing
// survives a restart.

use crate::core::appeals::{Appeal, AppealError, AppealStatus, AppealStore};
use crate::core::moderation::{FlaggingStatistics, ModerationResult};
use crate::core::penalties::{PenaltyError, PenaltyStore, UserPenalty};
use crate::core::review_queue::{ModerationQueueItem, QueueError, QueueStore};
use crate::core::workflow::{AuditError, AuditStore, ModerationDecision};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;

// ============================================================================
// QUEUE
// ============================================================================

/// Queue items keyed by content id.
#[derive(Default)]
pub struct InMemoryQueueStore {
    items: DashMap<String, ModerationQueueItem>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn save_item(&self, item: &ModerationQueueItem) -> Result<(), QueueError> {
        self.items.insert(item.content_id.clone(), item.clone());
        Ok(())
    }

    async fn get_item(&self, content_id: &str) -> Result<Option<ModerationQueueItem>, QueueError> {
        Ok(self.items.get(content_id).map(|item| item.clone()))
    }

    async fn remove_item(&self, content_id: &str) -> Result<Option<ModerationQueueItem>, QueueError> {
        Ok(self.items.remove(content_id).map(|(_, item)| item))
    }

    async fn list_items(&self) -> Result<Vec<ModerationQueueItem>, QueueError> {
        Ok(self.items.iter().map(|item| item.value().clone()).collect())
    }
}

// ============================================================================
// PENALTIES
// ============================================================================

#[derive(Default)]
pub struct InMemoryPenaltyStore {
    penalties: DashMap<String, UserPenalty>,
}

impl InMemoryPenaltyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_sorted(&self, keep: impl Fn(&UserPenalty) -> bool) -> Vec<UserPenalty> {
        let mut found: Vec<UserPenalty> = self
            .penalties
            .iter()
            .filter(|p| keep(p.value()))
            .map(|p| p.value().clone())
            .collect();
        found.sort_by(|a, b| a.applied_at.cmp(&b.applied_at).then_with(|| a.id.cmp(&b.id)));
        found
    }
}

#[async_trait]
impl PenaltyStore for InMemoryPenaltyStore {
    async fn insert_penalty(&self, penalty: &UserPenalty) -> Result<(), PenaltyError> {
        self.penalties.insert(penalty.id.clone(), penalty.clone());
        Ok(())
    }

    async fn get_penalty(&self, penalty_id: &str) -> Result<Option<UserPenalty>, PenaltyError> {
        Ok(self.penalties.get(penalty_id).map(|p| p.clone()))
    }

    async fn penalties_for_user(&self, user_id: &str) -> Result<Vec<UserPenalty>, PenaltyError> {
        Ok(self.collect_sorted(|p| p.user_id == user_id))
    }

    async fn penalties_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UserPenalty>, PenaltyError> {
        Ok(self.collect_sorted(|p| p.applied_at >= start && p.applied_at <= end))
    }

    async fn compare_and_swap(
        &self,
        penalty: &UserPenalty,
        expected_version: u64,
    ) -> Result<bool, PenaltyError> {
        // The entry guard holds the shard lock for the check and the write.
        match self.penalties.get_mut(&penalty.id) {
            Some(mut stored) if stored.version == expected_version => {
                *stored = penalty.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ============================================================================
// APPEALS
// ============================================================================

#[derive(Default)]
pub struct InMemoryAppealStore {
    appeals: DashMap<String, Appeal>,
}

impl InMemoryAppealStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_sorted(&self, keep: impl Fn(&Appeal) -> bool) -> Vec<Appeal> {
        let mut found: Vec<Appeal> = self
            .appeals
            .iter()
            .filter(|a| keep(a.value()))
            .map(|a| a.value().clone())
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        found
    }
}

#[async_trait]
impl AppealStore for InMemoryAppealStore {
    async fn insert_appeal(&self, appeal: &Appeal) -> Result<(), AppealError> {
        self.appeals.insert(appeal.id.clone(), appeal.clone());
        Ok(())
    }

    async fn get_appeal(&self, appeal_id: &str) -> Result<Option<Appeal>, AppealError> {
        Ok(self.appeals.get(appeal_id).map(|a| a.clone()))
    }

    async fn update_if_pending(&self, appeal: &Appeal) -> Result<bool, AppealError> {
        match self.appeals.get_mut(&appeal.id) {
            Some(mut stored) if stored.status == AppealStatus::Pending => {
                *stored = appeal.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_appeals(&self, status: Option<AppealStatus>) -> Result<Vec<Appeal>, AppealError> {
        Ok(self.collect_sorted(|a| status.map_or(true, |s| a.status == s)))
    }

    async fn appeals_for_user(&self, user_id: &str) -> Result<Vec<Appeal>, AppealError> {
        Ok(self.collect_sorted(|a| a.user_id == user_id))
    }
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

#[derive(Default)]
pub struct InMemoryAuditStore {
    /// Every classification per content id, in the order they were saved.
    results: DashMap<String, Vec<ModerationResult>>,
    decisions: DashMap<String, ModerationDecision>,
    statistics: RwLock<Option<FlaggingStatistics>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn save_result(&self, result: &ModerationResult) -> Result<(), AuditError> {
        self.results
            .entry(result.content_id.clone())
            .or_default()
            .push(result.clone());
        Ok(())
    }

    async fn latest_result(&self, content_id: &str) -> Result<Option<ModerationResult>, AuditError> {
        Ok(self
            .results
            .get(content_id)
            .and_then(|results| results.last().cloned()))
    }

    async fn record_decision(&self, decision: &ModerationDecision) -> Result<(), AuditError> {
        self.decisions.insert(decision.id.clone(), decision.clone());
        Ok(())
    }

    async fn get_decision(&self, decision_id: &str) -> Result<Option<ModerationDecision>, AuditError> {
        Ok(self.decisions.get(decision_id).map(|d| d.clone()))
    }

    async fn latest_decision_for_content(
        &self,
        content_id: &str,
    ) -> Result<Option<ModerationDecision>, AuditError> {
        Ok(self
            .decisions
            .iter()
            .filter(|d| d.content_id == content_id)
            .max_by(|a, b| a.decided_at.cmp(&b.decided_at).then_with(|| a.id.cmp(&b.id)))
            .map(|d| d.value().clone()))
    }

    async fn decisions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ModerationDecision>, AuditError> {
        let mut found: Vec<ModerationDecision> = self
            .decisions
            .iter()
            .filter(|d| d.decided_at >= start && d.decided_at <= end)
            .map(|d| d.value().clone())
            .collect();
        found.sort_by(|a, b| a.decided_at.cmp(&b.decided_at).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn mark_overturned(&self, decision_id: &str) -> Result<bool, AuditError> {
        match self.decisions.get_mut(decision_id) {
            Some(mut decision) if !decision.overturned => {
                decision.overturned = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn save_statistics(&self, stats: &FlaggingStatistics) -> Result<(), AuditError> {
        *self.statistics.write().await = Some(*stats);
        Ok(())
    }

    async fn load_statistics(&self) -> Result<Option<FlaggingStatistics>, AuditError> {
        Ok(*self.statistics.read().await)
    }
}

// ============================================================================
// TESTS
// ============================================================================
