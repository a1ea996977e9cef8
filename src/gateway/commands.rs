// Request and response shapes of the gateway protocol.
//
// Requests are tagged by `op` (snake_case); their fields are camelCase.
//   {"op":"classify","contentId":"c1","contentType":"post","authorId":"u1","text":"hi"}
//   {"op":"decide","contentId":"c1","moderatorId":"m1","action":"reject","reason":"spam"}
// Responses are {"ok":true,"data":...} or {"ok":false,"error":"..."}.

use crate::core::appeals::{AppealDecision, AppealStatus};
use crate::core::moderation::{ContentSubmission, FlaggingRulesConfiguration};
use crate::core::penalties::NewPenalty;
use crate::core::review_queue::QueueFilter;
use crate::core::workflow::{DecisionRequest, TimeRange};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Request {
    // Classification
    Classify(ContentSubmission),
    ProcessBatch {
        items: Vec<ContentSubmission>,
    },

    // Queue
    ListQueue {
        #[serde(default)]
        filter: QueueFilter,
    },
    QueueStats,
    DequeueNext {
        moderator_id: String,
        #[serde(default)]
        filter: QueueFilter,
    },
    Release {
        content_id: String,
    },
    Report {
        content_id: String,
        #[serde(default = "one_report")]
        delta: i64,
    },

    // Moderators
    RegisterModerator {
        moderator_id: String,
    },
    DeactivateModerator {
        moderator_id: String,
    },
    ListModerators,
    AssignModerator {
        content_id: String,
        moderator_id: String,
    },
    Decide(DecisionRequest),
    Workload {
        moderator_id: String,
    },
    Metrics {
        moderator_id: String,
        #[serde(default)]
        time_range: TimeRange,
    },
    SystemStats {
        #[serde(default)]
        time_range: TimeRange,
    },

    // Appeals
    SubmitAppeal {
        user_id: String,
        content_id: String,
        moderation_action_id: String,
        reason: String,
        #[serde(default)]
        evidence: Option<String>,
    },
    ReviewAppeal {
        appeal_id: String,
        moderator_id: String,
        decision: AppealDecision,
        reason: String,
    },
    GetAppeal {
        appeal_id: String,
    },
    ListAppeals {
        #[serde(default)]
        status: Option<AppealStatus>,
    },

    // Penalties
    ApplyPenalty(NewPenalty),
    RemovePenalty {
        penalty_id: String,
        removed_by: String,
        reason: String,
    },
    ActivePenalties {
        user_id: String,
    },
    PenaltyHistory {
        user_id: String,
    },

    // Rules & statistics
    GetRules,
    UpdateRules {
        rules: FlaggingRulesConfiguration,
    },
    FlaggingStats,
    DescribeFlags,
}

fn one_report() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok<T: Serialize>(data: T) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                ok: true,
                data: Some(data),
                error: None,
            },
            Err(e) => Self::error(format!("Failed to encode response: {}", e)),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// One output line. Falls back to a fixed error line if encoding fails.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"ok":false,"error":"Failed to encode response"}"#.to_string()
        })
    }
}
