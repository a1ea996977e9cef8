// Review queue service - priority-ordered human review work.
//
// The durable store holds the items; this service keeps an in-memory ordering
// index next to it. Mutations are serialized per content id, never across the
// whole queue. The index lock only guards the ordered set itself and is never
// held across store I/O.

use super::queue_models::{ModerationQueueItem, Priority, QueueFilter, QueueKey, QueueStatistics};
use crate::core::moderation::ModerationStatus;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Storage error: {0}")]
    StorageError(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Durable storage for queue items, keyed by content id.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert or replace the item for `item.content_id`.
    async fn save_item(&self, item: &ModerationQueueItem) -> Result<(), QueueError>;

    async fn get_item(&self, content_id: &str) -> Result<Option<ModerationQueueItem>, QueueError>;

    /// Remove and return the item, if any.
    async fn remove_item(&self, content_id: &str)
        -> Result<Option<ModerationQueueItem>, QueueError>;

    async fn list_items(&self) -> Result<Vec<ModerationQueueItem>, QueueError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct ReviewQueue {
    store: Arc<dyn QueueStore>,
    /// Dispatch order of waiting items, mapped to their content id.
    index: Mutex<BTreeMap<QueueKey, String>>,
    item_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ReviewQueue {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            index: Mutex::new(BTreeMap::new()),
            item_locks: DashMap::new(),
        }
    }

    async fn lock_item(&self, content_id: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(
            self.item_locks
                .entry(content_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        lock.lock_owned().await
    }

    /// Drop the per-item lock once nobody else holds or waits on it.
    fn release_item_lock(&self, content_id: &str, guard: OwnedMutexGuard<()>) {
        drop(guard);
        self.item_locks
            .remove_if(content_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Rebuild the ordering index from the store. Returns the number of
    /// dispatchable items.
    pub async fn load(&self) -> Result<usize, QueueError> {
        let items = self.store.list_items().await?;
        let mut index = self.index.lock().await;
        index.clear();
        for item in items.iter().filter(|i| i.is_waiting()) {
            index.insert(item.key(), item.content_id.clone());
        }

        info!(
            total = items.len(),
            waiting = index.len(),
            "Review queue index rebuilt"
        );
        Ok(index.len())
    }

    /// Add an item. If the content is already queued, the new snapshot replaces
    /// it but keeps the queue identity, the higher priority, the report count
    /// and any moderator claim.
    pub async fn enqueue(
        &self,
        mut item: ModerationQueueItem,
    ) -> Result<ModerationQueueItem, QueueError> {
        let content_id = item.content_id.clone();
        let guard = self.lock_item(&content_id).await;

        let existing = self.store.get_item(&content_id).await?;
        if let Some(existing) = &existing {
            item.id = existing.id.clone();
            item.created_at = existing.created_at;
            item.priority = item.priority.max(existing.priority);
            item.report_count = existing.report_count;
            if existing.status == ModerationStatus::UnderReview {
                item.status = ModerationStatus::UnderReview;
                item.assigned_moderator = existing.assigned_moderator.clone();
                item.assigned_at = existing.assigned_at;
            } else if item.assigned_moderator.is_none() {
                item.assigned_moderator = existing.assigned_moderator.clone();
                item.assigned_at = existing.assigned_at;
            }
        }
        item.updated_at = Utc::now();

        self.store.save_item(&item).await?;
        self.reindex(existing.as_ref(), &item).await;
        self.release_item_lock(&content_id, guard);

        info!(
            content_id = %item.content_id,
            priority = item.priority.as_str(),
            status = item.status.as_str(),
            replaced = existing.is_some(),
            "Content enqueued for review"
        );
        Ok(item)
    }

    /// Move an item's index entry from its old key to its new one.
    async fn reindex(&self, old: Option<&ModerationQueueItem>, new: &ModerationQueueItem) {
        let mut index = self.index.lock().await;
        if let Some(old) = old {
            index.remove(&old.key());
        }
        if new.is_waiting() {
            index.insert(new.key(), new.content_id.clone());
        }
    }

    pub async fn get(&self, content_id: &str) -> Result<Option<ModerationQueueItem>, QueueError> {
        self.store.get_item(content_id).await
    }

    /// Every queued item matching the filter, in dispatch order. Does not touch
    /// the queue.
    pub async fn list(&self, filter: &QueueFilter) -> Result<Vec<ModerationQueueItem>, QueueError> {
        let mut items: Vec<ModerationQueueItem> = self
            .store
            .list_items()
            .await?
            .into_iter()
            .filter(|item| filter.matches(item))
            .collect();
        items.sort_by_key(|item| item.key());
        Ok(items)
    }

    /// Claim the highest-ordered waiting item matching the filter for a
    /// moderator. The item stays queued as `underReview` until it is resolved
    /// or released.
    pub async fn dequeue_next(
        &self,
        filter: &QueueFilter,
        moderator_id: &str,
    ) -> Result<Option<ModerationQueueItem>, QueueError> {
        // Walk the index one entry at a time, resuming after the last key seen.
        let mut cursor: Option<QueueKey> = None;
        loop {
            let next = {
                let index = self.index.lock().await;
                let lower = cursor.as_ref().map_or(Unbounded, Excluded);
                index
                    .range((lower, Unbounded))
                    .next()
                    .map(|(key, content_id)| (key.clone(), content_id.clone()))
            };
            let Some((key, content_id)) = next else {
                break;
            };
            cursor = Some(key.clone());

            let guard = self.lock_item(&content_id).await;
            let Some(mut item) = self.store.get_item(&content_id).await? else {
                self.release_item_lock(&content_id, guard);
                continue;
            };
            if item.key() != key || !item.is_waiting() || !filter.matches(&item) {
                self.release_item_lock(&content_id, guard);
                continue;
            }

            // Another claimer may have removed the key between the index read
            // and the item lock.
            if self.index.lock().await.remove(&key).is_none() {
                self.release_item_lock(&content_id, guard);
                continue;
            }

            let now = Utc::now();
            item.status = ModerationStatus::UnderReview;
            item.assigned_moderator = Some(moderator_id.to_string());
            item.assigned_at = Some(now);
            item.updated_at = now;

            if let Err(e) = self.store.save_item(&item).await {
                self.index.lock().await.insert(key, content_id.clone());
                self.release_item_lock(&content_id, guard);
                return Err(e);
            }
            self.release_item_lock(&content_id, guard);

            debug!(
                content_id = %item.content_id,
                moderator_id = %moderator_id,
                "Queue item claimed"
            );
            return Ok(Some(item));
        }

        Ok(None)
    }

    /// Return a claimed item to the waiting order. False if the item is not
    /// queued or not claimed.
    pub async fn release(&self, content_id: &str) -> Result<bool, QueueError> {
        let guard = self.lock_item(content_id).await;
        let Some(mut item) = self.store.get_item(content_id).await? else {
            self.release_item_lock(content_id, guard);
            return Ok(false);
        };
        if item.status != ModerationStatus::UnderReview {
            self.release_item_lock(content_id, guard);
            return Ok(false);
        }

        item.status = ModerationStatus::Pending;
        item.assigned_moderator = None;
        item.assigned_at = None;
        item.updated_at = Utc::now();
        self.store.save_item(&item).await?;
        self.reindex(None, &item).await;
        self.release_item_lock(content_id, guard);

        debug!(content_id = %content_id, "Queue item released");
        Ok(true)
    }

    /// Apply a report delta. Crossing `threshold` from below escalates the
    /// priority one level; priority is never lowered here.
    pub async fn update_report_count(
        &self,
        content_id: &str,
        delta: i64,
        threshold: u32,
    ) -> Result<Option<ModerationQueueItem>, QueueError> {
        let guard = self.lock_item(content_id).await;
        let Some(mut item) = self.store.get_item(content_id).await? else {
            self.release_item_lock(content_id, guard);
            return Ok(None);
        };
        let before = item.clone();

        let count = (i64::from(item.report_count) + delta).clamp(0, i64::from(u32::MAX));
        item.report_count = count as u32;
        let crossed = before.report_count < threshold && item.report_count >= threshold;
        if crossed {
            item.priority = item.priority.escalate();
        }
        item.updated_at = Utc::now();

        self.store.save_item(&item).await?;
        self.reindex(Some(&before), &item).await;
        self.release_item_lock(content_id, guard);

        if crossed {
            info!(
                content_id = %content_id,
                reports = item.report_count,
                priority = item.priority.as_str(),
                "Report threshold crossed, priority escalated"
            );
        }
        Ok(Some(item))
    }

    /// Set the moderator responsible for an item without claiming it.
    pub async fn assign(
        &self,
        content_id: &str,
        moderator_id: &str,
    ) -> Result<Option<ModerationQueueItem>, QueueError> {
        let guard = self.lock_item(content_id).await;
        let Some(mut item) = self.store.get_item(content_id).await? else {
            self.release_item_lock(content_id, guard);
            return Ok(None);
        };

        let now = Utc::now();
        item.assigned_moderator = Some(moderator_id.to_string());
        item.assigned_at = Some(now);
        item.updated_at = now;
        self.store.save_item(&item).await?;
        self.release_item_lock(content_id, guard);
        Ok(Some(item))
    }

    /// Keep the item queued as flagged and put it back in the waiting order.
    pub async fn mark_flagged(
        &self,
        content_id: &str,
    ) -> Result<Option<ModerationQueueItem>, QueueError> {
        let guard = self.lock_item(content_id).await;
        let Some(mut item) = self.store.get_item(content_id).await? else {
            self.release_item_lock(content_id, guard);
            return Ok(None);
        };
        let before = item.clone();

        item.status = ModerationStatus::Flagged;
        item.updated_at = Utc::now();
        self.store.save_item(&item).await?;
        self.reindex(Some(&before), &item).await;
        self.release_item_lock(content_id, guard);
        Ok(Some(item))
    }

    /// Remove a resolved item. Resolving something that is not queued is a
    /// no-op returning `None`.
    pub async fn resolve(
        &self,
        content_id: &str,
    ) -> Result<Option<ModerationQueueItem>, QueueError> {
        let guard = self.lock_item(content_id).await;
        let removed = self.store.remove_item(content_id).await?;
        if let Some(item) = &removed {
            self.index.lock().await.remove(&item.key());
            info!(content_id = %content_id, "Queue item resolved");
        }
        self.release_item_lock(content_id, guard);
        Ok(removed)
    }

    pub async fn statistics(&self) -> Result<QueueStatistics, QueueError> {
        let items = self.store.list_items().await?;
        if items.is_empty() {
            return Ok(QueueStatistics::default());
        }

        let now = Utc::now();
        let total_wait_minutes: f64 = items
            .iter()
            .map(|i| (now - i.created_at).num_seconds().max(0) as f64 / 60.0)
            .sum();

        Ok(QueueStatistics {
            total_items: items.len(),
            high_priority_items: items
                .iter()
                .filter(|i| i.priority >= Priority::High)
                .count(),
            under_review_items: items
                .iter()
                .filter(|i| i.status == ModerationStatus::UnderReview)
                .count(),
            average_wait_time_minutes: total_wait_minutes / items.len() as f64,
        })
    }

    /// Items currently assigned to or claimed by a moderator.
    pub async fn assigned_to(&self, moderator_id: &str) -> Result<usize, QueueError> {
        let filter = QueueFilter {
            assigned_to: Some(moderator_id.to_string()),
            ..Default::default()
        };
        Ok(self.list(&filter).await?.len())
    }
}

// ============================================================================
// TESTS
// ============================================================================
