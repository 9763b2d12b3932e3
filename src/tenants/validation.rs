//! Input validation for tenant identifiers and config documents.
//!
//! Everything that reaches the tenant store from the outside passes
//! through here first. Failures never mutate state, and the resulting
//! error bodies stay generic.

use std::path::{Component, Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::engine::tiers;

use super::TenantConfig;

lazy_static! {
    /// Platform guild ids: 17-19 decimal digits.
    static ref TENANT_ID_RE: Regex = Regex::new(r"^[0-9]{17,19}$").unwrap();
    /// Channel/role identifiers: a snowflake or a short name.
    static ref ID_OR_NAME_RE: Regex = Regex::new(r"^([0-9]{17,19}|[a-zA-Z0-9_-]{1,100})$").unwrap();
    /// External chat tokens: base64-urlsafe-ish, 50-70 chars.
    static ref EXTERNAL_TOKEN_RE: Regex = Regex::new(r"^[A-Za-z0-9_\.\-]{50,70}$").unwrap();
}

/// Hostnames alert webhooks are allowed to point at.
const WEBHOOK_HOSTS: [&str; 2] = ["discord.com", "discordapp.com"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid tenant id")]
    InvalidTenantId,
    #[error("invalid channel identifier")]
    InvalidChannel,
    #[error("invalid role identifier")]
    InvalidRole,
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid webhook url")]
    InvalidWebhook,
    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),
    #[error("path escapes config root")]
    PathEscape,
}

pub fn validate_tenant_id(id: &str) -> Result<(), ValidationError> {
    if TENANT_ID_RE.is_match(id) {
        Ok(())
    } else {
        Err(ValidationError::InvalidTenantId)
    }
}

pub fn validate_external_token(token: &str) -> Result<(), ValidationError> {
    if EXTERNAL_TOKEN_RE.is_match(token) {
        Ok(())
    } else {
        Err(ValidationError::InvalidToken)
    }
}

pub fn validate_webhook_url(url: &str) -> Result<(), ValidationError> {
    let parsed = reqwest::Url::parse(url).map_err(|_| ValidationError::InvalidWebhook)?;
    if parsed.scheme() != "https" {
        return Err(ValidationError::InvalidWebhook);
    }
    match parsed.host_str() {
        Some(host) if WEBHOOK_HOSTS.iter().any(|h| host == *h) => Ok(()),
        _ => Err(ValidationError::InvalidWebhook),
    }
}

/// Full document validation, applied on every write.
pub fn validate_config(config: &TenantConfig) -> Result<(), ValidationError> {
    for channel in config.channels.values() {
        if !ID_OR_NAME_RE.is_match(channel) {
            return Err(ValidationError::InvalidChannel);
        }
    }

    for role in config.roles.values() {
        if !ID_OR_NAME_RE.is_match(role) {
            return Err(ValidationError::InvalidRole);
        }
    }

    for (tier_name, tier_role) in &config.tier_roles {
        if !tiers::is_known_tier(tier_name) {
            return Err(ValidationError::InvalidThresholds(format!(
                "unknown tier {tier_name}"
            )));
        }
        if let Some(role_id) = &tier_role.role_id {
            if !ID_OR_NAME_RE.is_match(role_id) {
                return Err(ValidationError::InvalidRole);
            }
        }
    }

    if let Some(min_tier) = &config.min_tier_name {
        if !tiers::is_known_tier(min_tier) {
            return Err(ValidationError::InvalidThresholds(format!(
                "unknown min tier {min_tier}"
            )));
        }
    }

    let t = &config.alert_thresholds;
    if t.min_margin_gp < 0 {
        return Err(ValidationError::InvalidThresholds(
            "min_margin_gp must be non-negative".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&t.min_score) {
        return Err(ValidationError::InvalidThresholds(
            "min_score must be within [0, 100]".to_string(),
        ));
    }
    if !(1..=10).contains(&t.max_alerts_per_interval) {
        return Err(ValidationError::InvalidThresholds(
            "max_alerts_per_interval must be within [1, 10]".to_string(),
        ));
    }
    for tier_name in &t.enabled_tiers {
        if !tiers::is_known_tier(tier_name) {
            return Err(ValidationError::InvalidThresholds(format!(
                "unknown enabled tier {tier_name}"
            )));
        }
    }

    let b = &config.price_brackets;
    if b.cheap_max <= 0 || b.medium_max < b.cheap_max || b.expensive_max < b.medium_max {
        return Err(ValidationError::InvalidThresholds(
            "price brackets must be non-decreasing positives".to_string(),
        ));
    }

    if let Some(webhook) = &config.webhook_url {
        validate_webhook_url(webhook)?;
    }

    Ok(())
}

/// Resolve the on-disk document path for a tenant, guaranteeing it
/// stays inside the config root.
pub fn tenant_path(root: &Path, tenant_id: &str) -> Result<PathBuf, ValidationError> {
    validate_tenant_id(tenant_id)?;

    let path = root.join(format!("{tenant_id}.json"));
    // The id grammar already forbids separators; keep an explicit
    // normalization check so the grammar is not load-bearing alone.
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir))
        || path.parent() != Some(root)
    {
        return Err(ValidationError::PathEscape);
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_id_grammar() {
        assert!(validate_tenant_id("12345678901234567").is_ok()); // 17
        assert!(validate_tenant_id("1234567890123456789").is_ok()); // 19
        assert!(validate_tenant_id("1234567890123456").is_err()); // 16
        assert!(validate_tenant_id("12345678901234567890").is_err()); // 20
        assert!(validate_tenant_id("../etc").is_err());
        assert!(validate_tenant_id("12345678901234567a").is_err());
        assert!(validate_tenant_id("").is_err());
    }

    #[test]
    fn channel_grammar_accepts_ids_and_names() {
        let mut config = TenantConfig::default();
        config
            .channels
            .insert(super::super::ChannelKind::Dumps, "12345678901234567".into());
        assert!(validate_config(&config).is_ok());

        config
            .channels
            .insert(super::super::ChannelKind::Spikes, "market-alerts_01".into());
        assert!(validate_config(&config).is_ok());

        config
            .channels
            .insert(super::super::ChannelKind::Flips, "bad channel!".into());
        assert_eq!(validate_config(&config), Err(ValidationError::InvalidChannel));
    }

    #[test]
    fn threshold_ranges_enforced() {
        let mut config = TenantConfig::default();
        config.alert_thresholds.max_alerts_per_interval = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::InvalidThresholds(_))
        ));

        config.alert_thresholds.max_alerts_per_interval = 11;
        assert!(validate_config(&config).is_err());

        config.alert_thresholds.max_alerts_per_interval = 10;
        config.alert_thresholds.min_score = 101.0;
        assert!(validate_config(&config).is_err());

        config.alert_thresholds.min_score = 100.0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn enabled_tiers_must_be_known() {
        let mut config = TenantConfig::default();
        config
            .alert_thresholds
            .enabled_tiers
            .insert("adamantium".to_string());
        assert!(validate_config(&config).is_err());

        config.alert_thresholds.enabled_tiers.clear();
        config
            .alert_thresholds
            .enabled_tiers
            .insert("diamond".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn brackets_must_be_non_decreasing() {
        let mut config = TenantConfig::default();
        config.price_brackets.medium_max = config.price_brackets.cheap_max - 1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn webhook_host_allowlist() {
        assert!(validate_webhook_url("https://discord.com/api/webhooks/1/abc").is_ok());
        assert!(validate_webhook_url("https://discordapp.com/api/webhooks/1/abc").is_ok());
        assert!(validate_webhook_url("https://evil.example.com/hook").is_err());
        assert!(validate_webhook_url("http://discord.com/api/webhooks/1/abc").is_err());
        assert!(validate_webhook_url("not a url").is_err());
    }

    #[test]
    fn external_token_grammar() {
        let token = "A".repeat(55);
        assert!(validate_external_token(&token).is_ok());
        assert!(validate_external_token("short").is_err());
        assert!(validate_external_token(&"A".repeat(80)).is_err());
        assert!(validate_external_token(&format!("{}!", "A".repeat(54))).is_err());
    }

    #[test]
    fn tenant_path_stays_in_root() {
        let root = Path::new("/data/tenants");
        let path = tenant_path(root, "12345678901234567").unwrap();
        assert_eq!(path, root.join("12345678901234567.json"));

        assert_eq!(tenant_path(root, "../etc"), Err(ValidationError::InvalidTenantId));
    }
}
