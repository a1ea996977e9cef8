// Penalty policy - which sanction, if any, follows from a moderator action.
//
// Kept apart from the workflow so the rule can be tested without stores.

use super::workflow_models::ModeratorAction;
use crate::core::moderation::Severity;
use crate::core::penalties::PenaltyType;
use serde::{Deserialize, Serialize};

/// Facts about the content and its author at decision time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PenaltyContext {
    /// Highest of the aggregate and per-flag severities.
    pub severity: Severity,
    pub report_count: u32,
    pub reports_threshold: u32,
    /// Warnings the author currently holds.
    pub active_warnings: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyPolicy {
    pub critical_ban_days: i64,
    pub repeat_offender_ban_days: i64,
    /// Active warnings (including the new one) that turn a warning into a ban.
    pub warnings_before_ban: u32,
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            critical_ban_days: 7,
            repeat_offender_ban_days: 3,
            warnings_before_ban: 3,
        }
    }
}

impl PenaltyPolicy {
    pub fn evaluate(&self, action: ModeratorAction, context: &PenaltyContext) -> Option<PenaltyType> {
        match action {
            ModeratorAction::Reject => self.for_rejection(context),
            ModeratorAction::Warn => Some(PenaltyType::Warning),
            ModeratorAction::Ban => Some(PenaltyType::PermanentBan),
            ModeratorAction::Approve | ModeratorAction::Flag | ModeratorAction::Edit => None,
        }
    }

    fn for_rejection(&self, context: &PenaltyContext) -> Option<PenaltyType> {
        if context.severity == Severity::Critical {
            return Some(PenaltyType::TemporaryBan {
                days: self.critical_ban_days,
            });
        }

        let reported = context.report_count >= context.reports_threshold;
        if !(context.severity.is_high_or_above() || reported) {
            return None;
        }

        let repeat_limit = self.warnings_before_ban.saturating_sub(1) as usize;
        if context.active_warnings >= repeat_limit {
            Some(PenaltyType::TemporaryBan {
                days: self.repeat_offender_ban_days,
            })
        } else {
            Some(PenaltyType::Warning)
        }
    }
}
