// Presentation helpers. Everything shown about a flag comes from
// `ModerationFlag::info()`, never from a local table.

use crate::core::moderation::{AutomaticAction, ModerationFlag, ModerationResult, Severity};
use crate::core::pipeline::ClassificationOutcome;
use crate::core::review_queue::ModerationQueueItem;
use serde::Serialize;

/// A flag ready to render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagBadge {
    pub flag: ModerationFlag,
    pub label: &'static str,
    pub description: &'static str,
    pub severity: Severity,
    pub icon: &'static str,
    pub color: &'static str,
}

impl From<ModerationFlag> for FlagBadge {
    fn from(flag: ModerationFlag) -> Self {
        let info = flag.info();
        Self {
            flag,
            label: info.label,
            description: info.description,
            severity: info.severity,
            icon: info.icon,
            color: info.color,
        }
    }
}

/// Every flag, in catalog order.
pub fn flag_catalog() -> Vec<FlagBadge> {
    ModerationFlag::ALL.iter().copied().map(FlagBadge::from).collect()
}

/// Badges for the flags on a result, most severe first.
pub fn badges_for(result: &ModerationResult) -> Vec<FlagBadge> {
    let mut badges: Vec<FlagBadge> = result.flags.iter().copied().map(FlagBadge::from).collect();
    badges.sort_by(|a, b| b.severity.cmp(&a.severity));
    badges
}

fn action_marker(action: &AutomaticAction) -> &'static str {
    match action {
        AutomaticAction::AutoApprove => "✅",
        AutomaticAction::AutoFlag { .. } => "🚩",
        AutomaticAction::AutoReject { .. } => "⛔",
    }
}

/// One-line summary of a classification, e.g. for a toast.
pub fn summarize_outcome(outcome: &ClassificationOutcome) -> String {
    let mut line = format!(
        "{} {} {} (confidence {:.2}, severity {})",
        action_marker(&outcome.action),
        outcome.action.as_str(),
        outcome.result.content_id,
        outcome.result.confidence,
        outcome.result.severity.as_str()
    );
    if let Some(reason) = outcome.action.reason() {
        line.push_str(": ");
        line.push_str(reason);
    }
    line
}

pub fn summarize_queue_item(item: &ModerationQueueItem) -> String {
    let labels = item.moderation_result.flag_labels();
    format!(
        "[{}] {} by {} - {} report(s){}",
        item.priority.as_str(),
        item.content_id,
        item.author_id,
        item.report_count,
        if labels.is_empty() {
            String::new()
        } else {
            format!(" - {}", labels)
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::ContentType;

    #[test]
    fn test_catalog_covers_every_flag() {
        let catalog = flag_catalog();
        assert_eq!(catalog.len(), ModerationFlag::ALL.len());
        let hate = catalog
            .iter()
            .find(|b| b.flag == ModerationFlag::HateSpeech)
            .unwrap();
        assert_eq!(hate.severity, ModerationFlag::HateSpeech.severity());
        assert_eq!(hate.label, ModerationFlag::HateSpeech.label());
    }

    #[test]
    fn test_badges_sorted_by_severity() {
        let mut result = ModerationResult::no_signal("c1", ContentType::Post);
        result.flags = [ModerationFlag::Spam, ModerationFlag::HateSpeech]
            .into_iter()
            .collect();

        let badges = badges_for(&result);
        assert_eq!(badges[0].flag, ModerationFlag::HateSpeech);
        assert_eq!(badges[1].flag, ModerationFlag::Spam);
    }

    #[test]
    fn test_summary_includes_reason() {
        let outcome = ClassificationOutcome {
            result: ModerationResult::no_signal("c7", ContentType::Comment),
            action: AutomaticAction::AutoFlag {
                reason: "Flagged for review: spam".to_string(),
            },
            queue_item: None,
        };
        let line = summarize_outcome(&outcome);
        assert!(line.contains("c7"));
        assert!(line.ends_with("Flagged for review: spam"));
    }
}
