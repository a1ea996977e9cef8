// Runtime configuration, read from the environment (and `.env` via dotenv).

use crate::core::moderation::{FlaggingRulesConfiguration, RulesError};
use crate::core::pipeline::PipelineSettings;
use crate::core::workflow::PenaltyPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub storage: StorageBackend,
    pub rules: FlaggingRulesConfiguration,
    pub policy: PenaltyPolicy,
    pub pipeline: PipelineSettings,
    pub stats_snapshot_interval: Duration,
    /// Users registered as moderators at startup.
    pub moderator_ids: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, RulesError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Unparsable values fall
    /// back to their defaults; inconsistent thresholds are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RulesError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = FlaggingRulesConfiguration::default();
        let mut rules = FlaggingRulesConfiguration::new(
            parse_or(&lookup, "AUTO_REJECT_THRESHOLD", defaults.auto_reject_threshold()),
            parse_or(&lookup, "AUTO_FLAG_THRESHOLD", defaults.auto_flag_threshold()),
        )?
        .with_multiple_reports_threshold(parse_or(
            &lookup,
            "MULTIPLE_REPORTS_THRESHOLD",
            defaults.multiple_reports_threshold(),
        ))?;
        rules.pii_auto_reject = parse_or(&lookup, "PII_AUTO_REJECT", defaults.pii_auto_reject);
        rules.harassment_auto_reject =
            parse_or(&lookup, "HARASSMENT_AUTO_REJECT", defaults.harassment_auto_reject);
        rules.hate_speech_auto_reject =
            parse_or(&lookup, "HATE_SPEECH_AUTO_REJECT", defaults.hate_speech_auto_reject);
        rules.spam_auto_flag = parse_or(&lookup, "SPAM_AUTO_FLAG", defaults.spam_auto_flag);
        rules.new_user_stricter_rules =
            parse_or(&lookup, "NEW_USER_STRICTER_RULES", defaults.new_user_stricter_rules);

        let default_policy = PenaltyPolicy::default();
        let policy = PenaltyPolicy {
            critical_ban_days: parse_or(&lookup, "CRITICAL_BAN_DAYS", default_policy.critical_ban_days),
            repeat_offender_ban_days: parse_or(
                &lookup,
                "REPEAT_OFFENDER_BAN_DAYS",
                default_policy.repeat_offender_ban_days,
            ),
            warnings_before_ban: parse_or(
                &lookup,
                "WARNINGS_BEFORE_BAN",
                default_policy.warnings_before_ban,
            ),
        };

        let default_pipeline = PipelineSettings::default();
        let pipeline = PipelineSettings {
            audit_auto_rejections: parse_or(
                &lookup,
                "AUDIT_AUTO_REJECTIONS",
                default_pipeline.audit_auto_rejections,
            ),
            batch_concurrency: parse_or(&lookup, "BATCH_CONCURRENCY", default_pipeline.batch_concurrency)
                .max(1),
        };

        let storage = match lookup("STORAGE_BACKEND").as_deref().map(str::trim) {
            None | Some("") | Some("sqlite") => StorageBackend::Sqlite,
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                warn!(value = %other, "Unknown STORAGE_BACKEND, using sqlite");
                StorageBackend::Sqlite
            }
        };

        let moderator_ids = lookup("MODERATOR_IDS")
            .map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://data/moderation.db".to_string()),
            storage,
            rules,
            policy,
            pipeline,
            stats_snapshot_interval: Duration::from_secs(
                parse_or(&lookup, "STATS_SNAPSHOT_SECS", 60u64).max(1),
            ),
            moderator_ids,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key = %key, value = %raw, "Unparsable setting, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, RulesError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite://data/moderation.db");
        assert_eq!(config.storage, StorageBackend::Sqlite);
        assert_eq!(config.rules, FlaggingRulesConfiguration::default());
        assert_eq!(config.policy, PenaltyPolicy::default());
        assert_eq!(config.pipeline, PipelineSettings::default());
        assert_eq!(config.stats_snapshot_interval, Duration::from_secs(60));
        assert!(config.moderator_ids.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("STORAGE_BACKEND", "memory"),
            ("AUTO_REJECT_THRESHOLD", "0.95"),
            ("AUTO_FLAG_THRESHOLD", "0.5"),
            ("SPAM_AUTO_FLAG", "false"),
            ("MULTIPLE_REPORTS_THRESHOLD", "5"),
            ("CRITICAL_BAN_DAYS", "14"),
            ("BATCH_CONCURRENCY", "0"),
            ("MODERATOR_IDS", "alice, bob,,"),
        ])
        .unwrap();

        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.rules.auto_reject_threshold(), 0.95);
        assert_eq!(config.rules.auto_flag_threshold(), 0.5);
        assert!(!config.rules.spam_auto_flag);
        assert_eq!(config.rules.multiple_reports_threshold(), 5);
        assert_eq!(config.policy.critical_ban_days, 14);
        assert_eq!(config.pipeline.batch_concurrency, 1);
        assert_eq!(config.moderator_ids, vec!["alice", "bob"]);
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = config(&[("AUTO_FLAG_THRESHOLD", "lots"), ("PII_AUTO_REJECT", "maybe")]).unwrap();
        assert_eq!(config.rules.auto_flag_threshold(), 0.7);
        assert!(config.rules.pii_auto_reject);
    }

    #[test]
    fn test_inverted_thresholds_fail() {
        let err = config(&[("AUTO_REJECT_THRESHOLD", "0.6"), ("AUTO_FLAG_THRESHOLD", "0.8")])
            .unwrap_err();
        assert!(matches!(err, RulesError::ThresholdOrder { .. }));
    }
}
