// Moderation domain models - classification snapshots and their vocabulary.
//
// These are pure domain types with no storage or transport dependencies.
// The per-flag metadata table (`ModerationFlag::info`) is the single source of
// severity and display data for the engine, the penalty policy and the gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of user-generated content being moderated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentType {
    Post,
    Review,
    Comment,
    Image,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Post => "post",
            ContentType::Review => "review",
            ContentType::Comment => "comment",
            ContentType::Image => "image",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a piece of content in the moderation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
    Flagged,
    UnderReview,
    Appealed,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "pending",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
            ModerationStatus::Flagged => "flagged",
            ModerationStatus::UnderReview => "underReview",
            ModerationStatus::Appealed => "appealed",
        }
    }

    /// Statuses that keep an item in the review queue.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ModerationStatus::Pending | ModerationStatus::Flagged | ModerationStatus::UnderReview
        )
    }
}

/// Ordinal urgency. Declaration order is the ordering: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// One level up, saturating at `Critical`.
    pub fn escalate(self) -> Self {
        match self {
            Severity::Low => Severity::Medium,
            Severity::Medium => Severity::High,
            Severity::High | Severity::Critical => Severity::Critical,
        }
    }

    pub fn is_high_or_above(&self) -> bool {
        *self >= Severity::High
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A categorical violation signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModerationFlag {
    Harassment,
    HateSpeech,
    Spam,
    InappropriateContent,
    PersonalInformation,
    ViolentContent,
    SexualContent,
    Misinformation,
    CopyrightViolation,
    Other,
}

/// Static metadata for a flag. Presentation code reads icon/color from here
/// instead of re-deriving them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagInfo {
    pub severity: Severity,
    pub label: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
}

impl ModerationFlag {
    pub const ALL: [ModerationFlag; 10] = [
        ModerationFlag::Harassment,
        ModerationFlag::HateSpeech,
        ModerationFlag::Spam,
        ModerationFlag::InappropriateContent,
        ModerationFlag::PersonalInformation,
        ModerationFlag::ViolentContent,
        ModerationFlag::SexualContent,
        ModerationFlag::Misinformation,
        ModerationFlag::CopyrightViolation,
        ModerationFlag::Other,
    ];

    pub fn info(&self) -> FlagInfo {
        match self {
            ModerationFlag::Harassment => FlagInfo {
                severity: Severity::High,
                label: "harassment",
                description: "Targeted insults or intimidation of a person",
                icon: "person.fill.xmark",
                color: "#E5484D",
            },
            ModerationFlag::HateSpeech => FlagInfo {
                severity: Severity::Critical,
                label: "hate speech",
                description: "Attacks on people based on a protected attribute",
                icon: "exclamationmark.octagon.fill",
                color: "#B4232A",
            },
            ModerationFlag::Spam => FlagInfo {
                severity: Severity::Low,
                label: "spam",
                description: "Unsolicited promotion, link stuffing or shouting",
                icon: "envelope.badge.fill",
                color: "#F5A524",
            },
            ModerationFlag::InappropriateContent => FlagInfo {
                severity: Severity::Medium,
                label: "inappropriate content",
                description: "Profanity or content unsuitable for a general audience",
                icon: "eye.slash.fill",
                color: "#F76B15",
            },
            ModerationFlag::PersonalInformation => FlagInfo {
                severity: Severity::High,
                label: "personal information",
                description: "Phone numbers, emails, addresses or other identifiers",
                icon: "lock.shield.fill",
                color: "#8E4EC6",
            },
            ModerationFlag::ViolentContent => FlagInfo {
                severity: Severity::High,
                label: "violent content",
                description: "Threats or depictions of violence",
                icon: "bolt.trianglebadge.exclamationmark.fill",
                color: "#CE2C31",
            },
            ModerationFlag::SexualContent => FlagInfo {
                severity: Severity::High,
                label: "sexual content",
                description: "Sexually explicit text or imagery",
                icon: "18.circle.fill",
                color: "#D6409F",
            },
            ModerationFlag::Misinformation => FlagInfo {
                severity: Severity::Medium,
                label: "misinformation",
                description: "Claims known to be false or misleading",
                icon: "questionmark.diamond.fill",
                color: "#0090FF",
            },
            ModerationFlag::CopyrightViolation => FlagInfo {
                severity: Severity::Medium,
                label: "copyright violation",
                description: "Distribution of material the author does not own",
                icon: "c.circle.fill",
                color: "#12A594",
            },
            ModerationFlag::Other => FlagInfo {
                severity: Severity::Low,
                label: "other",
                description: "Signals that do not fit another category",
                icon: "flag.fill",
                color: "#8B8D98",
            },
        }
    }

    pub fn severity(&self) -> Severity {
        self.info().severity
    }

    pub fn label(&self) -> &'static str {
        self.info().label
    }
}

impl fmt::Display for ModerationFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of personally identifying information found in content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PiiType {
    PhoneNumber,
    Email,
    Address,
    CreditCard,
    SocialSecurityNumber,
}

/// Which part of a submission a PII match was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "field", content = "index")]
pub enum PiiField {
    Body,
    ImageText(usize),
}

/// Byte span of a match within its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PiiLocation {
    pub field: PiiField,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedPii {
    #[serde(rename = "type")]
    pub pii_type: PiiType,
    pub location: PiiLocation,
    pub confidence: f32,
    pub text: String,
}

/// Signals produced by an external image feature extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDescriptor {
    pub url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub nsfw_score: Option<f32>,
    #[serde(default)]
    pub violence_score: Option<f32>,
    #[serde(default)]
    pub ocr_text: Option<String>,
}

/// Raw content handed to the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSubmission {
    pub content_id: String,
    pub content_type: ContentType,
    pub author_id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageDescriptor>,
    /// Authors with young accounts get stricter thresholds when enabled.
    #[serde(default)]
    pub author_is_new: bool,
}

impl ContentSubmission {
    pub fn text(
        content_id: impl Into<String>,
        content_type: ContentType,
        author_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            content_id: content_id.into(),
            content_type,
            author_id: author_id.into(),
            text: Some(text.into()),
            images: Vec::new(),
            author_is_new: false,
        }
    }
}

/// Immutable analysis snapshot produced by the classifier.
///
/// Review outcomes are recorded on the queue item and in the decision audit
/// trail; this record is never edited after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationResult {
    pub content_id: String,
    pub content_type: ContentType,
    pub status: ModerationStatus,
    pub flags: BTreeSet<ModerationFlag>,
    pub confidence: f32,
    pub severity: Severity,
    pub reason: String,
    pub detected_pii: Vec<DetectedPii>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reviewed_by: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ModerationResult {
    /// A result carrying no signal at all.
    pub fn no_signal(content_id: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            content_id: content_id.into(),
            content_type,
            status: ModerationStatus::Approved,
            flags: BTreeSet::new(),
            confidence: 0.0,
            severity: Severity::Low,
            reason: "No policy violations detected".to_string(),
            detected_pii: Vec::new(),
            created_at: Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
            notes: None,
        }
    }

    pub fn has_flag(&self, flag: ModerationFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Highest of the aggregate severity and every flag's intrinsic severity.
    pub fn effective_severity(&self) -> Severity {
        self.flags
            .iter()
            .map(|f| f.severity())
            .fold(self.severity, Severity::max)
    }

    /// Comma-separated flag labels, in flag order.
    pub fn flag_labels(&self) -> String {
        self.flags
            .iter()
            .map(|f| f.label())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// What the engine decided without human involvement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "action")]
pub enum AutomaticAction {
    AutoApprove,
    AutoFlag { reason: String },
    AutoReject { reason: String },
}

impl AutomaticAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomaticAction::AutoApprove => "autoApprove",
            AutomaticAction::AutoFlag { .. } => "autoFlag",
            AutomaticAction::AutoReject { .. } => "autoReject",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            AutomaticAction::AutoApprove => None,
            AutomaticAction::AutoFlag { reason } | AutomaticAction::AutoReject { reason } => {
                Some(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering_and_escalation() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::Low.escalate(), Severity::Medium);
        assert_eq!(Severity::Critical.escalate(), Severity::Critical);
    }

    #[test]
    fn test_every_flag_has_metadata() {
        for flag in ModerationFlag::ALL {
            let info = flag.info();
            assert!(!info.label.is_empty());
            assert!(info.color.starts_with('#'));
        }
        assert_eq!(ModerationFlag::HateSpeech.severity(), Severity::Critical);
        assert_eq!(ModerationFlag::Spam.label(), "spam");
    }

    #[test]
    fn test_effective_severity_uses_flag_table() {
        let mut result = ModerationResult::no_signal("c1", ContentType::Post);
        result.flags.insert(ModerationFlag::Spam);
        assert_eq!(result.effective_severity(), Severity::Low);

        result.flags.insert(ModerationFlag::Harassment);
        assert_eq!(result.effective_severity(), Severity::High);
    }

    #[test]
    fn test_automatic_action_serializes_with_tag() {
        let action = AutomaticAction::AutoFlag {
            reason: "Flagged for review: spam".to_string(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "autoFlag");
        assert_eq!(json["reason"], "Flagged for review: spam");
    }
}
