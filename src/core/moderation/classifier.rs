// Rule-based content classifier.
//
// Turns text and image signals into a `ModerationResult`. Everything here is a
// pure function of the input and the static tables below: no I/O, no clock
// except the result timestamp. All patterns go through the `regex` crate, which
// matches in linear time, so arbitrarily long input still finishes.

use super::moderation_models::{
    ContentSubmission, DetectedPii, ImageDescriptor, ModerationFlag, ModerationResult,
    ModerationStatus, PiiField, PiiLocation, PiiType, Severity,
};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// Distinct flags needed before the aggregate severity is bumped one level.
const SEVERITY_ESCALATION_FLAG_COUNT: usize = 3;

/// One lexicon category: matches add `weight` each, up to `cap`.
struct LexiconRule {
    flag: ModerationFlag,
    weight: f32,
    cap: f32,
    pattern: &'static Lazy<Regex>,
}

fn lexicon(words: &[&str]) -> Regex {
    let alternation = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).expect("Invalid lexicon regex")
}

static HARASSMENT: Lazy<Regex> = Lazy::new(|| {
    lexicon(&[
        "idiot",
        "moron",
        "loser",
        "stupid",
        "pathetic",
        "worthless",
        "shut up",
        "nobody likes you",
        "kill yourself",
        "you are trash",
        "ugly",
    ])
});

static HATE_SPEECH: Lazy<Regex> = Lazy::new(|| {
    lexicon(&[
        "subhuman",
        "vermin",
        "inferior race",
        "go back to your country",
        "those people are animals",
        "ethnic cleansing",
        "racial purity",
    ])
});

static SPAM_PHRASES: Lazy<Regex> = Lazy::new(|| {
    lexicon(&[
        "click here",
        "buy now",
        "limited time",
        "act now",
        "free money",
        "make money fast",
        "work from home",
        "100% guaranteed",
        "risk free",
        "order now",
        "dm me",
        "follow for follow",
    ])
});

static PROFANITY: Lazy<Regex> = Lazy::new(|| {
    lexicon(&["damn", "crap", "wtf", "shit", "fuck", "fucking", "bastard", "bitch"])
});

static VIOLENCE: Lazy<Regex> = Lazy::new(|| {
    lexicon(&[
        "kill you",
        "shoot you",
        "stab you",
        "beat you up",
        "bomb",
        "i will hurt you",
        "burn it down",
    ])
});

static SEXUAL: Lazy<Regex> = Lazy::new(|| lexicon(&["nsfw", "nude", "nudes", "porn", "xxx", "onlyfans"]));

static MISINFORMATION: Lazy<Regex> = Lazy::new(|| {
    lexicon(&[
        "miracle cure",
        "vaccines cause autism",
        "the earth is flat",
        "5g causes",
        "doctors don't want you to know",
    ])
});

static COPYRIGHT: Lazy<Regex> = Lazy::new(|| {
    lexicon(&[
        "full movie download",
        "free download",
        "cracked version",
        "torrent link",
        "pirated",
    ])
});

static LEXICON_RULES: [LexiconRule; 8] = [
    LexiconRule {
        flag: ModerationFlag::Harassment,
        weight: 0.35,
        cap: 0.9,
        pattern: &HARASSMENT,
    },
    LexiconRule {
        flag: ModerationFlag::HateSpeech,
        weight: 0.5,
        cap: 0.95,
        pattern: &HATE_SPEECH,
    },
    LexiconRule {
        flag: ModerationFlag::Spam,
        weight: 0.2,
        cap: SPAM_SCORE_CAP,
        pattern: &SPAM_PHRASES,
    },
    LexiconRule {
        flag: ModerationFlag::InappropriateContent,
        weight: 0.2,
        cap: 0.6,
        pattern: &PROFANITY,
    },
    LexiconRule {
        flag: ModerationFlag::ViolentContent,
        weight: 0.35,
        cap: 0.9,
        pattern: &VIOLENCE,
    },
    LexiconRule {
        flag: ModerationFlag::SexualContent,
        weight: 0.35,
        cap: 0.9,
        pattern: &SEXUAL,
    },
    LexiconRule {
        flag: ModerationFlag::Misinformation,
        weight: 0.3,
        cap: 0.7,
        pattern: &MISINFORMATION,
    },
    LexiconRule {
        flag: ModerationFlag::CopyrightViolation,
        weight: 0.3,
        cap: 0.7,
        pattern: &COPYRIGHT,
    },
];

/// Spam alone never reaches the reject threshold; it goes to human review.
const SPAM_SCORE_CAP: f32 = 0.6;
const PII_WEIGHT: f32 = 0.3;
const PII_CAP: f32 = 0.8;

static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("Invalid URL regex"));
static REPEATED_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[!?]{3,}").expect("Invalid punctuation regex"));

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
        .expect("Invalid email regex")
});
static CREDIT_CARD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b").expect("Invalid credit card regex")
});
static SSN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("Invalid SSN regex"));
static PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?1[-.\s]?)?(?:\(\d{3}\)|\b\d{3})[-.\s]?\d{3}[-.\s]?\d{4}\b")
        .expect("Invalid phone regex")
});
static ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b\d{1,5}\s+(?:[A-Za-z]+\s+){1,3}(?:street|st|avenue|ave|road|rd|boulevard|blvd|lane|ln|drive|dr|court|ct)\b",
    )
    .expect("Invalid address regex")
});

/// Deterministic, explainable classifier.
#[derive(Debug, Clone)]
pub struct Classifier {
    /// Images with either side below this (in pixels) look like tracking pixels.
    pub min_image_dimension: u32,
    /// Extractor score at or above which an image counts as sexual content.
    pub nsfw_threshold: f32,
    /// Extractor score at or above which an image counts as violent content.
    pub violence_threshold: f32,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            min_image_dimension: 50,
            nsfw_threshold: 0.8,
            violence_threshold: 0.7,
        }
    }
}

/// Per-flag scores accumulated while scanning.
#[derive(Default)]
struct Signals {
    scores: BTreeMap<ModerationFlag, f32>,
    pii: Vec<DetectedPii>,
}

impl Signals {
    fn add(&mut self, flag: ModerationFlag, amount: f32, cap: f32) {
        let score = self.scores.entry(flag).or_insert(0.0);
        *score = (*score + amount).min(cap);
    }

    fn raise_to(&mut self, flag: ModerationFlag, value: f32) {
        let score = self.scores.entry(flag).or_insert(0.0);
        *score = (*score).max(value.clamp(0.0, 1.0));
    }
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a submission.
    ///
    /// Empty text with no images yields an approved result with no flags.
    pub fn classify(&self, submission: &ContentSubmission) -> ModerationResult {
        let mut signals = Signals::default();

        if let Some(text) = submission.text.as_deref() {
            self.scan_text(text, PiiField::Body, &mut signals);
        }

        for (index, image) in submission.images.iter().enumerate() {
            self.scan_image(index, image, &mut signals);
        }

        self.build_result(submission, signals)
    }

    fn scan_text(&self, text: &str, field: PiiField, signals: &mut Signals) {
        if text.trim().is_empty() {
            return;
        }

        for rule in LEXICON_RULES.iter() {
            let hits = rule.pattern.find_iter(text).count();
            if hits > 0 {
                signals.add(rule.flag, rule.weight * hits as f32, rule.cap);
            }
        }

        if has_excessive_caps(text) {
            signals.add(ModerationFlag::Spam, 0.1, SPAM_SCORE_CAP);
        }
        if REPEATED_PUNCTUATION.is_match(text) {
            signals.add(ModerationFlag::Spam, 0.1, SPAM_SCORE_CAP);
        }
        let links = URL.find_iter(text).count();
        if links > 2 {
            signals.add(
                ModerationFlag::Spam,
                0.15 * (links - 2) as f32,
                SPAM_SCORE_CAP,
            );
        }

        let found = detect_pii(text, field);
        if !found.is_empty() {
            signals.add(
                ModerationFlag::PersonalInformation,
                PII_WEIGHT * found.len() as f32,
                PII_CAP,
            );
            signals.pii.extend(found);
        }
    }

    fn scan_image(&self, index: usize, image: &ImageDescriptor, signals: &mut Signals) {
        let has_dimensions = image.width > 0 && image.height > 0;
        if has_dimensions
            && (image.width < self.min_image_dimension || image.height < self.min_image_dimension)
        {
            signals.add(ModerationFlag::Spam, 0.3, SPAM_SCORE_CAP);
        }

        if let Some(score) = image.nsfw_score.filter(|s| s.is_finite()) {
            if score >= self.nsfw_threshold {
                signals.raise_to(ModerationFlag::SexualContent, score);
            } else if score >= self.nsfw_threshold / 2.0 {
                signals.raise_to(ModerationFlag::InappropriateContent, score);
            }
        }

        if let Some(score) = image.violence_score.filter(|s| s.is_finite()) {
            if score >= self.violence_threshold {
                signals.raise_to(ModerationFlag::ViolentContent, score);
            }
        }

        if let Some(ocr) = image.ocr_text.as_deref() {
            self.scan_text(ocr, PiiField::ImageText(index), signals);
        }
    }

    fn build_result(&self, submission: &ContentSubmission, signals: Signals) -> ModerationResult {
        let Signals { scores, mut pii } = signals;
        let flags: BTreeSet<ModerationFlag> = scores
            .iter()
            .filter(|(_, score)| **score > 0.0)
            .map(|(flag, _)| *flag)
            .collect();

        if flags.is_empty() {
            return ModerationResult::no_signal(&submission.content_id, submission.content_type);
        }

        let confidence = 1.0
            - scores
                .values()
                .fold(1.0_f32, |remaining, score| remaining * (1.0 - score));

        let mut severity = flags
            .iter()
            .map(|f| f.severity())
            .max()
            .unwrap_or(Severity::Low);
        if flags.len() >= SEVERITY_ESCALATION_FLAG_COUNT {
            severity = severity.escalate();
        }

        pii.sort_by_key(|p| (p.location.field, p.location.start));

        let labels = flags
            .iter()
            .map(|f| f.label())
            .collect::<Vec<_>>()
            .join(", ");

        ModerationResult {
            content_id: submission.content_id.clone(),
            content_type: submission.content_type,
            status: ModerationStatus::Pending,
            flags,
            confidence: confidence.clamp(0.0, 1.0),
            severity,
            reason: format!("Detected: {}", labels),
            detected_pii: pii,
            created_at: Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
            notes: None,
        }
    }
}

/// More than 70% uppercase among at least 10 letters.
fn has_excessive_caps(text: &str) -> bool {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < 10 {
        return false;
    }

    let caps = letters.iter().filter(|c| c.is_uppercase()).count();
    caps as f32 / letters.len() as f32 > 0.7
}

fn luhn_valid(digits: &str) -> bool {
    let digits: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 13 {
        return false;
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                *d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Find PII spans. More specific detectors run first; later detectors skip
/// spans that overlap an earlier match.
fn detect_pii(text: &str, field: PiiField) -> Vec<DetectedPii> {
    let mut found: Vec<DetectedPii> = Vec::new();

    let detectors: [(PiiType, &Lazy<Regex>); 5] = [
        (PiiType::Email, &EMAIL),
        (PiiType::CreditCard, &CREDIT_CARD),
        (PiiType::SocialSecurityNumber, &SSN),
        (PiiType::PhoneNumber, &PHONE),
        (PiiType::Address, &ADDRESS),
    ];

    for (pii_type, pattern) in detectors {
        for m in pattern.find_iter(text) {
            let overlaps = found.iter().any(|p| {
                p.location.field == field && m.start() < p.location.end && p.location.start < m.end()
            });
            if overlaps {
                continue;
            }

            let confidence = match pii_type {
                PiiType::Email => 0.95,
                PiiType::CreditCard if luhn_valid(m.as_str()) => 0.95,
                PiiType::CreditCard => 0.6,
                PiiType::SocialSecurityNumber => 0.9,
                PiiType::PhoneNumber => 0.85,
                PiiType::Address => 0.7,
            };

            found.push(DetectedPii {
                pii_type,
                location: PiiLocation {
                    field,
                    start: m.start(),
                    end: m.end(),
                },
                confidence,
                text: m.as_str().to_string(),
            });
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::ContentType;

    fn text(body: &str) -> ContentSubmission {
        ContentSubmission::text("content-1", ContentType::Post, "author-1", body)
    }

    #[test]
    fn test_empty_content_is_approved() {
        let classifier = Classifier::new();

        let mut submission = text("");
        submission.text = None;
        let result = classifier.classify(&submission);
        assert_eq!(result.status, ModerationStatus::Approved);
        assert!(result.flags.is_empty());
        assert_eq!(result.confidence, 0.0);

        let result = classifier.classify(&text("   \n\t "));
        assert_eq!(result.status, ModerationStatus::Approved);
        assert!(result.flags.is_empty());
    }

    #[test]
    fn test_clean_text_has_no_flags() {
        let result = Classifier::new().classify(&text("Lovely weather for a picnic today."));
        assert!(result.flags.is_empty());
        assert!(result.detected_pii.is_empty());
    }

    #[test]
    fn test_phone_number_is_detected() {
        let result = Classifier::new().classify(&text("Contact me at 555-123-4567"));
        assert!(!result.detected_pii.is_empty());
        assert_eq!(result.detected_pii[0].pii_type, PiiType::PhoneNumber);
        assert_eq!(result.detected_pii[0].text, "555-123-4567");
        assert!(result.has_flag(ModerationFlag::PersonalInformation));
        assert_eq!(result.status, ModerationStatus::Pending);
    }

    #[test]
    fn test_pii_types_and_order() {
        let body = "Mail jane.doe@example.com or visit 221 Baker Street, ssn 123-45-6789";
        let result = Classifier::new().classify(&text(body));
        let types: Vec<PiiType> = result.detected_pii.iter().map(|p| p.pii_type).collect();
        assert_eq!(
            types,
            vec![
                PiiType::Email,
                PiiType::Address,
                PiiType::SocialSecurityNumber
            ]
        );
    }

    #[test]
    fn test_credit_card_confidence_uses_luhn() {
        let valid = Classifier::new().classify(&text("card 4111 1111 1111 1111"));
        let card = &valid.detected_pii[0];
        assert_eq!(card.pii_type, PiiType::CreditCard);
        assert_eq!(card.confidence, 0.95);

        let invalid = Classifier::new().classify(&text("card 4111 1111 1111 1112"));
        assert_eq!(invalid.detected_pii[0].confidence, 0.6);
    }

    #[test]
    fn test_spam_shouting_is_flagged_below_reject_range() {
        let result =
            Classifier::new().classify(&text("CLICK HERE NOW!!! BUY NOW LIMITED TIME OFFER!!!"));
        assert!(result.has_flag(ModerationFlag::Spam));
        assert_eq!(result.flags.len(), 1);
        assert!(result.confidence <= SPAM_SCORE_CAP + f32::EPSILON);
        assert_eq!(result.severity, Severity::Low);
    }

    #[test]
    fn test_harassment_and_hate_speech() {
        let result = Classifier::new().classify(&text(
            "You are a worthless idiot, subhuman vermin like you should go back to your country",
        ));
        assert!(result.has_flag(ModerationFlag::Harassment));
        assert!(result.has_flag(ModerationFlag::HateSpeech));
        assert_eq!(result.severity, Severity::Critical);
        assert!(result.confidence > 0.9);
    }

    #[test]
    fn test_three_flags_escalate_severity() {
        let result = Classifier::new().classify(&text(
            "what a damn idiot, buy now at the miracle cure shop",
        ));
        assert!(result.flags.len() >= 3);
        // Harassment is high on its own; three flags push it to critical.
        assert_eq!(result.severity, Severity::Critical);
    }

    #[test]
    fn test_word_boundaries_avoid_false_positives() {
        // "Scunthorpe"-style substrings should not trip the lexicons.
        let result = Classifier::new().classify(&text("The bombastic crapshoot of a classic"));
        assert!(!result.has_flag(ModerationFlag::ViolentContent));
        assert!(!result.has_flag(ModerationFlag::InappropriateContent));
    }

    #[test]
    fn test_small_image_counts_as_spam() {
        let mut submission = text("");
        submission.text = None;
        submission.images.push(ImageDescriptor {
            url: "https://cdn.example.com/pixel.gif".to_string(),
            width: 1,
            height: 1,
            ..Default::default()
        });

        let result = Classifier::new().classify(&submission);
        assert!(result.has_flag(ModerationFlag::Spam));
    }

    #[test]
    fn test_image_signals_and_ocr_text() {
        let mut submission = text("");
        submission.text = None;
        submission.images.push(ImageDescriptor {
            url: "https://cdn.example.com/a.jpg".to_string(),
            width: 800,
            height: 600,
            nsfw_score: Some(0.92),
            violence_score: None,
            ocr_text: Some("call 555 123 4567".to_string()),
        });

        let result = Classifier::new().classify(&submission);
        assert!(result.has_flag(ModerationFlag::SexualContent));
        assert!(result.has_flag(ModerationFlag::PersonalInformation));
        assert_eq!(result.detected_pii[0].location.field, PiiField::ImageText(0));
    }

    #[test]
    fn test_long_input_terminates() {
        let body = "a".repeat(200_000) + &"!".repeat(50_000) + "idiot";
        let result = Classifier::new().classify(&text(&body));
        assert!(result.has_flag(ModerationFlag::Harassment));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = Classifier::new();
        let submission = text("buy now, you idiot! email me at a@b.io");
        let first = classifier.classify(&submission);
        let second = classifier.classify(&submission);
        assert_eq!(first.flags, second.flags);
        assert_eq!(first.confidence, second.confidence);
        assert_eq!(first.detected_pii, second.detected_pii);
    }
}
