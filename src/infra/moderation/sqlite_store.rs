// SQLite-backed moderation storage. One pool implements every port.
//
// Tables:
// - moderation_queue: open queue items, one row per content id
// - user_penalties: penalty ledger, `version` guards compare-and-swap updates
// - appeals: appeals, `status` guards the single decision
// - moderation_results: every classification result (audit trail)
// - moderation_decisions: every moderator decision (audit trail)
// - flagging_statistics: single-row snapshot of the engine counters
//
// Records are stored as JSON payloads next to the columns queries filter on.
// Timestamps are fixed-width RFC3339 (microseconds, `Z`) so they compare
// correctly as text.

use crate::core::appeals::{Appeal, AppealError, AppealStatus, AppealStore};
use crate::core::moderation::{FlaggingStatistics, ModerationResult};
use crate::core::penalties::{PenaltyError, PenaltyStore, UserPenalty};
use crate::core::review_queue::{ModerationQueueItem, QueueError, QueueStore};
use crate::core::workflow::{AuditError, AuditStore, ModerationDecision};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS moderation_queue (
        content_id TEXT PRIMARY KEY,
        id TEXT NOT NULL,
        priority TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        payload TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_penalties (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        applied_at TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 0,
        payload TEXT NOT NULL
    );
    "#,
    "CREATE INDEX IF NOT EXISTS idx_user_penalties_user ON user_penalties(user_id, applied_at);",
    r#"
    CREATE TABLE IF NOT EXISTS appeals (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        created_at TEXT NOT NULL,
        payload TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS moderation_results (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        content_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        payload TEXT NOT NULL
    );
    "#,
    "CREATE INDEX IF NOT EXISTS idx_moderation_results_content ON moderation_results(content_id, seq);",
    r#"
    CREATE TABLE IF NOT EXISTS moderation_decisions (
        id TEXT PRIMARY KEY,
        content_id TEXT NOT NULL,
        moderator_id TEXT NOT NULL,
        decided_at TEXT NOT NULL,
        overturned BOOLEAN NOT NULL DEFAULT 0,
        payload TEXT NOT NULL
    );
    "#,
    "CREATE INDEX IF NOT EXISTS idx_moderation_decisions_time ON moderation_decisions(decided_at);",
    r#"
    CREATE TABLE IF NOT EXISTS flagging_statistics (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        total_processed INTEGER NOT NULL DEFAULT 0,
        auto_approved INTEGER NOT NULL DEFAULT 0,
        auto_flagged INTEGER NOT NULL DEFAULT 0,
        auto_rejected INTEGER NOT NULL DEFAULT 0,
        sent_to_human_review INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL
    );
    "#,
];

pub struct SqliteModerationStore {
    pool: Pool<Sqlite>,
}

impl SqliteModerationStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure the file exists if it's a file path
        let path_str = database_url.trim_start_matches("sqlite://");
        if !database_url.contains(":memory:") && !Path::new(path_str).exists() {
            if let Some(parent) = Path::new(path_str).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path_str)?;
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        let pool = SqlitePoolOptions::new().connect(&conn_str).await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        for statement in MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn encode<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| e.to_string())
}

fn decode<T: DeserializeOwned>(row: &SqliteRow) -> Result<T, String> {
    let payload: String = row.try_get("payload").map_err(|e| e.to_string())?;
    serde_json::from_str(&payload).map_err(|e| e.to_string())
}

fn decode_all<T: DeserializeOwned>(rows: &[SqliteRow]) -> Result<Vec<T>, String> {
    rows.iter().map(decode::<T>).collect()
}

// ============================================================================
// QUEUE
// ============================================================================

#[async_trait]
impl QueueStore for SqliteModerationStore {
    async fn save_item(&self, item: &ModerationQueueItem) -> Result<(), QueueError> {
        let payload = encode(item).map_err(QueueError::StorageError)?;
        sqlx::query(
            r#"
            INSERT INTO moderation_queue (content_id, id, priority, status, created_at, updated_at, payload)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_id) DO UPDATE SET
                id = excluded.id,
                priority = excluded.priority,
                status = excluded.status,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                payload = excluded.payload
            "#,
        )
        .bind(&item.content_id)
        .bind(&item.id)
        .bind(item.priority.as_str())
        .bind(item.status.as_str())
        .bind(timestamp(item.created_at))
        .bind(timestamp(item.updated_at))
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn get_item(&self, content_id: &str) -> Result<Option<ModerationQueueItem>, QueueError> {
        let row = sqlx::query("SELECT payload FROM moderation_queue WHERE content_id = ?")
            .bind(content_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QueueError::StorageError(e.to_string()))?;

        row.map(|row| decode(&row))
            .transpose()
            .map_err(QueueError::StorageError)
    }

    async fn remove_item(&self, content_id: &str) -> Result<Option<ModerationQueueItem>, QueueError> {
        let row = sqlx::query("DELETE FROM moderation_queue WHERE content_id = ? RETURNING payload")
            .bind(content_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QueueError::StorageError(e.to_string()))?;

        row.map(|row| decode(&row))
            .transpose()
            .map_err(QueueError::StorageError)
    }

    async fn list_items(&self) -> Result<Vec<ModerationQueueItem>, QueueError> {
        let rows = sqlx::query("SELECT payload FROM moderation_queue ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QueueError::StorageError(e.to_string()))?;

        decode_all(&rows).map_err(QueueError::StorageError)
    }
}

// ============================================================================
// PENALTIES
// ============================================================================

#[async_trait]
impl PenaltyStore for SqliteModerationStore {
    async fn insert_penalty(&self, penalty: &UserPenalty) -> Result<(), PenaltyError> {
        let payload = encode(penalty).map_err(PenaltyError::StorageError)?;
        sqlx::query(
            r#"
            INSERT INTO user_penalties (id, user_id, applied_at, version, payload)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&penalty.id)
        .bind(&penalty.user_id)
        .bind(timestamp(penalty.applied_at))
        .bind(penalty.version as i64)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| PenaltyError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn get_penalty(&self, penalty_id: &str) -> Result<Option<UserPenalty>, PenaltyError> {
        let row = sqlx::query("SELECT payload FROM user_penalties WHERE id = ?")
            .bind(penalty_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PenaltyError::StorageError(e.to_string()))?;

        row.map(|row| decode(&row))
            .transpose()
            .map_err(PenaltyError::StorageError)
    }

    async fn penalties_for_user(&self, user_id: &str) -> Result<Vec<UserPenalty>, PenaltyError> {
        let rows = sqlx::query(
            "SELECT payload FROM user_penalties WHERE user_id = ? ORDER BY applied_at, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PenaltyError::StorageError(e.to_string()))?;

        decode_all(&rows).map_err(PenaltyError::StorageError)
    }

    async fn penalties_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UserPenalty>, PenaltyError> {
        let rows = sqlx::query(
            r#"
            SELECT payload FROM user_penalties
            WHERE applied_at >= ? AND applied_at <= ?
            ORDER BY applied_at, id
            "#,
        )
        .bind(timestamp(start))
        .bind(timestamp(end))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PenaltyError::StorageError(e.to_string()))?;

        decode_all(&rows).map_err(PenaltyError::StorageError)
    }

    async fn compare_and_swap(
        &self,
        penalty: &UserPenalty,
        expected_version: u64,
    ) -> Result<bool, PenaltyError> {
        let payload = encode(penalty).map_err(PenaltyError::StorageError)?;
        let result = sqlx::query(
            "UPDATE user_penalties SET version = ?, payload = ? WHERE id = ? AND version = ?",
        )
        .bind(penalty.version as i64)
        .bind(payload)
        .bind(&penalty.id)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| PenaltyError::StorageError(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }
}

// ============================================================================
// APPEALS
// ============================================================================

#[async_trait]
impl AppealStore for SqliteModerationStore {
    async fn insert_appeal(&self, appeal: &Appeal) -> Result<(), AppealError> {
        let payload = encode(appeal).map_err(AppealError::StorageError)?;
        sqlx::query(
            r#"
            INSERT INTO appeals (id, user_id, status, created_at, payload)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&appeal.id)
        .bind(&appeal.user_id)
        .bind(appeal.status.as_str())
        .bind(timestamp(appeal.created_at))
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| AppealError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn get_appeal(&self, appeal_id: &str) -> Result<Option<Appeal>, AppealError> {
        let row = sqlx::query("SELECT payload FROM appeals WHERE id = ?")
            .bind(appeal_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppealError::StorageError(e.to_string()))?;

        row.map(|row| decode(&row))
            .transpose()
            .map_err(AppealError::StorageError)
    }

    async fn update_if_pending(&self, appeal: &Appeal) -> Result<bool, AppealError> {
        let payload = encode(appeal).map_err(AppealError::StorageError)?;
        let result = sqlx::query(
            "UPDATE appeals SET status = ?, payload = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(appeal.status.as_str())
        .bind(payload)
        .bind(&appeal.id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppealError::StorageError(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_appeals(&self, status: Option<AppealStatus>) -> Result<Vec<Appeal>, AppealError> {
        let rows = match status {
            Some(status) => {
                sqlx::query("SELECT payload FROM appeals WHERE status = ? ORDER BY created_at, id")
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT payload FROM appeals ORDER BY created_at, id")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| AppealError::StorageError(e.to_string()))?;

        decode_all(&rows).map_err(AppealError::StorageError)
    }

    async fn appeals_for_user(&self, user_id: &str) -> Result<Vec<Appeal>, AppealError> {
        let rows =
            sqlx::query("SELECT payload FROM appeals WHERE user_id = ? ORDER BY created_at, id")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| AppealError::StorageError(e.to_string()))?;

        decode_all(&rows).map_err(AppealError::StorageError)
    }
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

#[async_trait]
impl AuditStore for SqliteModerationStore {
    async fn save_result(&self, result: &ModerationResult) -> Result<(), AuditError> {
        let payload = encode(result).map_err(AuditError::StorageError)?;
        sqlx::query(
            "INSERT INTO moderation_results (content_id, created_at, payload) VALUES (?, ?, ?)",
        )
        .bind(&result.content_id)
        .bind(timestamp(result.created_at))
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn latest_result(&self, content_id: &str) -> Result<Option<ModerationResult>, AuditError> {
        let row = sqlx::query(
            "SELECT payload FROM moderation_results WHERE content_id = ? ORDER BY seq DESC LIMIT 1",
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuditError::StorageError(e.to_string()))?;

        row.map(|row| decode(&row))
            .transpose()
            .map_err(AuditError::StorageError)
    }

    async fn record_decision(&self, decision: &ModerationDecision) -> Result<(), AuditError> {
        let payload = encode(decision).map_err(AuditError::StorageError)?;
        sqlx::query(
            r#"
            INSERT INTO moderation_decisions (id, content_id, moderator_id, decided_at, overturned, payload)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&decision.id)
        .bind(&decision.content_id)
        .bind(&decision.moderator_id)
        .bind(timestamp(decision.decided_at))
        .bind(decision.overturned)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn get_decision(&self, decision_id: &str) -> Result<Option<ModerationDecision>, AuditError> {
        let row = sqlx::query("SELECT payload FROM moderation_decisions WHERE id = ?")
            .bind(decision_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuditError::StorageError(e.to_string()))?;

        row.map(|row| decode(&row))
            .transpose()
            .map_err(AuditError::StorageError)
    }

    async fn latest_decision_for_content(
        &self,
        content_id: &str,
    ) -> Result<Option<ModerationDecision>, AuditError> {
        let row = sqlx::query(
            r#"
            SELECT payload FROM moderation_decisions
            WHERE content_id = ?
            ORDER BY decided_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuditError::StorageError(e.to_string()))?;

        row.map(|row| decode(&row))
            .transpose()
            .map_err(AuditError::StorageError)
    }

    async fn decisions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ModerationDecision>, AuditError> {
        let rows = sqlx::query(
            r#"
            SELECT payload FROM moderation_decisions
            WHERE decided_at >= ? AND decided_at <= ?
            ORDER BY decided_at, id
            "#,
        )
        .bind(timestamp(start))
        .bind(timestamp(end))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuditError::StorageError(e.to_string()))?;

        decode_all(&rows).map_err(AuditError::StorageError)
    }

    async fn mark_overturned(&self, decision_id: &str) -> Result<bool, AuditError> {
        let Some(mut decision) = self.get_decision(decision_id).await? else {
            return Ok(false);
        };
        if decision.overturned {
            return Ok(false);
        }
        decision.overturned = true;
        let payload = encode(&decision).map_err(AuditError::StorageError)?;

        let result = sqlx::query(
            "UPDATE moderation_decisions SET overturned = 1, payload = ? WHERE id = ? AND overturned = 0",
        )
        .bind(payload)
        .bind(decision_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::StorageError(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn save_statistics(&self, stats: &FlaggingStatistics) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO flagging_statistics
                (id, total_processed, auto_approved, auto_flagged, auto_rejected, sent_to_human_review, updated_at)
            VALUES (1, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                total_processed = excluded.total_processed,
                auto_approved = excluded.auto_approved,
                auto_flagged = excluded.auto_flagged,
                auto_rejected = excluded.auto_rejected,
                sent_to_human_review = excluded.sent_to_human_review,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(stats.total_processed as i64)
        .bind(stats.auto_approved as i64)
        .bind(stats.auto_flagged as i64)
        .bind(stats.auto_rejected as i64)
        .bind(stats.sent_to_human_review as i64)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn load_statistics(&self) -> Result<Option<FlaggingStatistics>, AuditError> {
        let row = sqlx::query("SELECT * FROM flagging_statistics WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuditError::StorageError(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let count = |column: &str| -> Result<u64, AuditError> {
            let value: i64 = row
                .try_get(column)
                .map_err(|e| AuditError::StorageError(e.to_string()))?;
            Ok(value.max(0) as u64)
        };
        Ok(Some(FlaggingStatistics {
            total_processed: count("total_processed")?,
            auto_approved: count("auto_approved")?,
            auto_flagged: count("auto_flagged")?,
            auto_rejected: count("auto_rejected")?,
            sent_to_human_review: count("sent_to_human_review")?,
        }))
    }
}

// ============================================================================
// TESTS
// ============================================================================
