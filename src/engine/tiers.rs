//! The ten-tier quality ladder partitioning the score domain [0, 100].
//!
//! Seeded into the `tiers` table at startup; the constant table here is
//! the source of truth for tier lookups in the engine and the router.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierGroup {
    Metals,
    Gems,
}

impl TierGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierGroup::Metals => "metals",
            TierGroup::Gems => "gems",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "metals" => Some(TierGroup::Metals),
            "gems" => Some(TierGroup::Gems),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Tier {
    pub name: &'static str,
    pub emoji: &'static str,
    pub min_score: u8,
    pub max_score: u8,
    pub group: TierGroup,
}

/// Ten disjoint ranges covering [0, 100]. Order matters: index is the
/// tier ordinal used for min-tier comparisons.
pub const TIERS: [Tier; 10] = [
    Tier { name: "iron", emoji: "⚙️", min_score: 0, max_score: 10, group: TierGroup::Metals },
    Tier { name: "copper", emoji: "🟤", min_score: 11, max_score: 20, group: TierGroup::Metals },
    Tier { name: "bronze", emoji: "🥉", min_score: 21, max_score: 30, group: TierGroup::Metals },
    Tier { name: "silver", emoji: "🥈", min_score: 31, max_score: 40, group: TierGroup::Metals },
    Tier { name: "gold", emoji: "🥇", min_score: 41, max_score: 50, group: TierGroup::Metals },
    Tier { name: "platinum", emoji: "🪙", min_score: 51, max_score: 60, group: TierGroup::Metals },
    Tier { name: "ruby", emoji: "🔴", min_score: 61, max_score: 70, group: TierGroup::Gems },
    Tier { name: "sapphire", emoji: "🔵", min_score: 71, max_score: 80, group: TierGroup::Gems },
    Tier { name: "emerald", emoji: "🟢", min_score: 81, max_score: 90, group: TierGroup::Gems },
    Tier { name: "diamond", emoji: "💎", min_score: 91, max_score: 100, group: TierGroup::Gems },
];

/// Resolve the tier containing `score`. The score is clamped to
/// [0, 100] and truncated to an integer before the range lookup, so
/// fractional scores between two ranges land in the lower tier.
pub fn tier_of(score: f64) -> &'static Tier {
    let s = score.clamp(0.0, 100.0) as u8;
    TIERS
        .iter()
        .find(|t| s >= t.min_score && s <= t.max_score)
        .unwrap_or(&TIERS[0])
}

/// Ordinal of a tier name in the ladder (iron = 0 .. diamond = 9).
pub fn tier_order(name: &str) -> Option<usize> {
    TIERS.iter().position(|t| t.name == name)
}

pub fn tier_by_name(name: &str) -> Option<&'static Tier> {
    TIERS.iter().find(|t| t.name == name)
}

pub fn is_known_tier(name: &str) -> bool {
    tier_order(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_disjoint_and_cover_domain() {
        let mut next = 0u16;
        for tier in &TIERS {
            assert_eq!(tier.min_score as u16, next);
            assert!(tier.max_score >= tier.min_score);
            next = tier.max_score as u16 + 1;
        }
        assert_eq!(next, 101);
    }

    #[test]
    fn boundary_scores() {
        assert_eq!(tier_of(0.0).name, "iron");
        assert_eq!(tier_of(10.0).name, "iron");
        assert_eq!(tier_of(11.0).name, "copper");
        assert_eq!(tier_of(100.0).name, "diamond");
        // fractional score between ranges stays in the lower tier
        assert_eq!(tier_of(10.7).name, "iron");
        // out-of-range input clamps
        assert_eq!(tier_of(-5.0).name, "iron");
        assert_eq!(tier_of(250.0).name, "diamond");
    }

    #[test]
    fn tier_order_is_monotone_in_score() {
        let mut prev = None;
        for s in 0..=100 {
            let ord = tier_order(tier_of(s as f64).name).unwrap();
            if let Some(p) = prev {
                assert!(ord >= p);
            }
            prev = Some(ord);
        }
    }

    #[test]
    fn groups_split_at_platinum_ruby() {
        assert_eq!(tier_by_name("platinum").unwrap().group, TierGroup::Metals);
        assert_eq!(tier_by_name("ruby").unwrap().group, TierGroup::Gems);
    }
}
