//! Core market data types shared across the pipeline.

use serde::{Deserialize, Serialize};

use crate::engine::tiers::TierGroup;

/// Upstream-assigned item identifier. Positive, stable across runs.
pub type ItemId = u32;

/// Item metadata from the upstream `/mapping` endpoint.
///
/// Items without a positive `buy_limit` are excluded from event
/// detection entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemMeta {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub members: bool,
    #[serde(default, alias = "limit")]
    pub buy_limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examine: Option<String>,
    /// High-alchemy value; the upstream mapping includes it for most
    /// tradeable items and we use it to route alch-margin flips.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highalch: Option<u64>,
}

/// One observation of (low, high, volume) for an item at an
/// upstream-reported timestamp. Primary key is `(item_id, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub item_id: ItemId,
    /// Unix seconds.
    pub timestamp: i64,
    /// Most recent instant-sell price in the window.
    pub low: Option<u64>,
    /// Most recent instant-buy price in the window.
    pub high: Option<u64>,
    /// Per-window trade count.
    pub volume: Option<u64>,
}

/// Flags attached to a dump event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpFlags {
    /// Buy speed below 50% of the buy limit for the window.
    pub slow_buy: bool,
    /// Current low crashed all the way to 1 gp.
    pub one_gp_dump: bool,
    /// Platinum tier or above (score >= 51).
    #[serde(rename = "super")]
    pub super_dump: bool,
}

impl DumpFlags {
    pub fn names(&self) -> Vec<&'static str> {
        let mut out = Vec::with_capacity(3);
        if self.slow_buy {
            out.push("slow_buy");
        }
        if self.one_gp_dump {
            out.push("one_gp_dump");
        }
        if self.super_dump {
            out.push("super");
        }
        out
    }
}

/// A price drop with an oversupply signature, recomputed each poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpEvent {
    pub item_id: ItemId,
    pub item_name: String,
    pub timestamp: i64,
    pub prev_low: u64,
    pub cur_low: u64,
    pub drop_pct: f64,
    pub vol_spike_pct: f64,
    pub oversupply_pct: f64,
    pub buy_speed_pct: f64,
    /// Bounded to [0, 100].
    pub score: f64,
    /// Tier name from the seeded tier table.
    pub tier: String,
    pub tier_group: TierGroup,
    pub flags: DumpFlags,
}

/// A price rise satisfying rise-percentage and volume thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpikeEvent {
    pub item_id: ItemId,
    pub item_name: String,
    pub timestamp: i64,
    pub prev_high: u64,
    pub cur_high: u64,
    pub rise_pct: f64,
    pub volume: u64,
}

/// Risk buckets for flip candidates, mapped at 20/40/60.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 20.0 {
            RiskLevel::Low
        } else if score < 40.0 {
            RiskLevel::Medium
        } else if score < 60.0 {
            RiskLevel::High
        } else {
            RiskLevel::VeryHigh
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::VeryHigh => "very_high",
        }
    }
}

/// A (low, high) pair whose margin and volume exceed thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlipCandidate {
    pub item_id: ItemId,
    pub item_name: String,
    pub timestamp: i64,
    /// Price you buy at (the instant-sell side).
    pub buy: u64,
    /// Price you sell at (the instant-buy side).
    pub sell: u64,
    pub insta_buy: u64,
    pub insta_sell: u64,
    pub margin_gp: i64,
    pub roi_pct: f64,
    pub volume: u64,
    pub buy_limit: u32,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    /// `volume / buy_limit`, clamped to [0, 100].
    pub liquidity_score: f64,
}

/// Joined item + latest snapshot row for the `all_items` view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemTicker {
    pub item_id: ItemId,
    pub name: String,
    pub members: bool,
    pub buy_limit: u32,
    pub low: Option<u64>,
    pub high: Option<u64>,
    pub volume: Option<u64>,
    pub timestamp: i64,
}

/// Quality labels derived from the dump score, used for role mentions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLabel {
    Deal,
    Good,
    Premium,
    Elite,
    GodTier,
    Nuclear,
}

impl QualityLabel {
    pub fn from_score(score: f64) -> Self {
        if score >= 96.0 {
            QualityLabel::Nuclear
        } else if score >= 86.0 {
            QualityLabel::GodTier
        } else if score >= 76.0 {
            QualityLabel::Elite
        } else if score >= 61.0 {
            QualityLabel::Premium
        } else if score >= 41.0 {
            QualityLabel::Good
        } else {
            QualityLabel::Deal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLabel::Deal => "deal",
            QualityLabel::Good => "good",
            QualityLabel::Premium => "premium",
            QualityLabel::Elite => "elite",
            QualityLabel::GodTier => "god_tier",
            QualityLabel::Nuclear => "nuclear",
        }
    }
}

/// Watchlist row: a user following one item in one guild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub id: Option<i64>,
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub item_id: ItemId,
    pub item_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_buckets_at_20_40_60() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(19.9), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(20.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(39.9), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(40.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(60.0), RiskLevel::VeryHigh);
        assert_eq!(RiskLevel::from_score(100.0), RiskLevel::VeryHigh);
    }

    #[test]
    fn dump_flags_serialize_super_keyword() {
        let flags = DumpFlags {
            slow_buy: false,
            one_gp_dump: true,
            super_dump: true,
        };
        let json = serde_json::to_value(flags).unwrap();
        assert_eq!(json["super"], serde_json::Value::Bool(true));
        assert_eq!(flags.names(), vec!["one_gp_dump", "super"]);
    }

    #[test]
    fn quality_labels_cover_score_domain() {
        assert_eq!(QualityLabel::from_score(0.0), QualityLabel::Deal);
        assert_eq!(QualityLabel::from_score(41.0), QualityLabel::Good);
        assert_eq!(QualityLabel::from_score(61.0), QualityLabel::Premium);
        assert_eq!(QualityLabel::from_score(76.0), QualityLabel::Elite);
        assert_eq!(QualityLabel::from_score(86.0), QualityLabel::GodTier);
        assert_eq!(QualityLabel::from_score(100.0), QualityLabel::Nuclear);
    }
}
