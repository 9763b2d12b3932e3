//! Per-tenant configuration.
//!
//! One JSON document per tenant under the config root, created lazily
//! with secure defaults, mutated only through the validated write path
//! in [`store`], and mirrored into the guild settings tables so tier
//! and alert state survives restarts.

pub mod store;
pub mod validation;

pub use store::{TenantStore, TenantStoreError};
pub use validation::ValidationError;

use std::collections::{BTreeMap, BTreeSet};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::engine::tiers;

/// Channel slots a tenant can map to platform channel identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    CheapFlips,
    MediumFlips,
    ExpensiveFlips,
    BillionaireFlips,
    RecipeItems,
    HighAlchMargins,
    HighLimitItems,
    Dumps,
    Spikes,
    Flips,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::CheapFlips => "cheap_flips",
            ChannelKind::MediumFlips => "medium_flips",
            ChannelKind::ExpensiveFlips => "expensive_flips",
            ChannelKind::BillionaireFlips => "billionaire_flips",
            ChannelKind::RecipeItems => "recipe_items",
            ChannelKind::HighAlchMargins => "high_alch_margins",
            ChannelKind::HighLimitItems => "high_limit_items",
            ChannelKind::Dumps => "dumps",
            ChannelKind::Spikes => "spikes",
            ChannelKind::Flips => "flips",
        }
    }
}

/// Role slots used when composing alert mentions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    RiskLow,
    RiskMedium,
    RiskHigh,
    RiskVeryHigh,
    QualityDeal,
    QualityGood,
    QualityPremium,
    QualityElite,
    QualityGodTier,
    QualityNuclear,
    Dumps,
    Spikes,
    Flips,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRole {
    #[serde(default)]
    pub role_id: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub min_margin_gp: i64,
    pub min_score: f64,
    /// Empty means every tier is allowed.
    pub enabled_tiers: BTreeSet<String>,
    pub max_alerts_per_interval: u32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            min_margin_gp: 0,
            min_score: 0.0,
            enabled_tiers: BTreeSet::new(),
            max_alerts_per_interval: 3,
        }
    }
}

/// Margin brackets classifying flips into channel slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceBrackets {
    pub cheap_max: i64,
    pub medium_max: i64,
    pub expensive_max: i64,
}

impl Default for PriceBrackets {
    fn default() -> Self {
        Self {
            cheap_max: 100_000,
            medium_max: 1_000_000,
            expensive_max: 100_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    /// Opaque per-tenant secret; generated on first reference.
    pub admin_token: String,
    pub channels: BTreeMap<ChannelKind, String>,
    pub roles: BTreeMap<RoleKind, String>,
    /// Tier name -> role toggle.
    pub tier_roles: BTreeMap<String, TierRole>,
    /// Alerts for dump tiers strictly below this are suppressed.
    pub min_tier_name: Option<String>,
    pub alert_thresholds: AlertThresholds,
    pub price_brackets: PriceBrackets,
    /// Optional per-tenant webhook override for alert delivery.
    pub webhook_url: Option<String>,
    pub banned: bool,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            admin_token: generate_admin_token(),
            channels: BTreeMap::new(),
            roles: BTreeMap::new(),
            tier_roles: BTreeMap::new(),
            min_tier_name: None,
            alert_thresholds: AlertThresholds::default(),
            price_brackets: PriceBrackets::default(),
            webhook_url: None,
            banned: false,
        }
    }
}

impl TenantConfig {
    /// True when `tier` passes the enabled-tiers set (empty set allows
    /// everything).
    pub fn tier_allowed(&self, tier: &str) -> bool {
        self.alert_thresholds.enabled_tiers.is_empty()
            || self.alert_thresholds.enabled_tiers.contains(tier)
    }

    /// True when `tier` clears the configured minimum tier, if any.
    pub fn tier_clears_minimum(&self, tier: &str) -> bool {
        match &self.min_tier_name {
            None => true,
            Some(min) => match (tiers::tier_order(tier), tiers::tier_order(min)) {
                (Some(t), Some(m)) => t >= m,
                _ => false,
            },
        }
    }

    /// Copy safe to return from read endpoints: the admin token is
    /// blanked.
    pub fn redacted(&self) -> Self {
        Self {
            admin_token: String::new(),
            ..self.clone()
        }
    }
}

/// 32 random bytes, URL-safe base64 without padding.
pub fn generate_admin_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_a_strong_token() {
        let a = TenantConfig::default();
        let b = TenantConfig::default();
        // 32 bytes -> 43 base64 chars, and tokens never repeat
        assert_eq!(a.admin_token.len(), 43);
        assert_ne!(a.admin_token, b.admin_token);
    }

    #[test]
    fn empty_enabled_tiers_allows_all() {
        let config = TenantConfig::default();
        assert!(config.tier_allowed("iron"));
        assert!(config.tier_allowed("diamond"));

        let mut restricted = config.clone();
        restricted
            .alert_thresholds
            .enabled_tiers
            .insert("gold".to_string());
        assert!(restricted.tier_allowed("gold"));
        assert!(!restricted.tier_allowed("iron"));
    }

    #[test]
    fn min_tier_comparison_uses_ladder_order() {
        let mut config = TenantConfig::default();
        config.min_tier_name = Some("platinum".to_string());
        assert!(config.tier_clears_minimum("platinum"));
        assert!(config.tier_clears_minimum("diamond"));
        assert!(!config.tier_clears_minimum("gold"));
    }

    #[test]
    fn channel_kinds_serialize_snake_case() {
        let mut config = TenantConfig::default();
        config
            .channels
            .insert(ChannelKind::BillionaireFlips, "12345678901234567".to_string());
        let json = serde_json::to_value(&config).unwrap();
        assert!(json["channels"]["billionaire_flips"].is_string());
    }

    #[test]
    fn redacted_blanks_the_token_only() {
        let mut config = TenantConfig::default();
        config.banned = true;
        let red = config.redacted();
        assert!(red.admin_token.is_empty());
        assert!(red.banned);
    }
}
