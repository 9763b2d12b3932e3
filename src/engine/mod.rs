//! Event detection engine.
//!
//! Consumes pairs of successive snapshots per item and produces the
//! transient event set for the tick: dumps (price drops with an
//! oversupply signature), spikes (price rises), and flip candidates
//! (margin opportunities). Outputs are deterministic for equal inputs:
//! pure arithmetic, stable sort keys, no clocks.

pub mod tiers;

use crate::config::Thresholds;
use crate::models::{
    DumpEvent, DumpFlags, FlipCandidate, ItemMeta, RiskLevel, Snapshot, SpikeEvent,
};

/// Everything the engine needs to know about one item for one tick.
///
/// Requiring `prev` and `cur` makes the two-snapshot minimum structural:
/// items with a single observation never reach the engine.
#[derive(Debug, Clone)]
pub struct TickItem {
    pub meta: ItemMeta,
    pub prev: Snapshot,
    pub cur: Snapshot,
    /// Total traded volume over the trailing 24h, used for the
    /// expected-per-window baseline.
    pub avg_daily_volume: f64,
    /// Trailing 24h of snapshots for volatility; may be empty, in which
    /// case volatility contributes zero to the risk score.
    pub history_24h: Vec<Snapshot>,
}

#[derive(Debug, Default)]
pub struct EngineOutput {
    pub dumps: Vec<DumpEvent>,
    pub spikes: Vec<SpikeEvent>,
    pub flips: Vec<FlipCandidate>,
}

pub struct EventEngine {
    thresholds: Thresholds,
}

impl EventEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Detect all events for the tick. Items with `buy_limit == 0` are
    /// skipped entirely.
    pub fn detect_all(&self, items: &[TickItem]) -> EngineOutput {
        let mut out = EngineOutput {
            dumps: Vec::with_capacity(items.len() / 8),
            spikes: Vec::with_capacity(items.len() / 8),
            flips: Vec::with_capacity(items.len() / 4),
        };

        for item in items {
            if item.meta.buy_limit == 0 {
                continue;
            }
            if let Some(dump) = self.detect_dump(item) {
                out.dumps.push(dump);
            }
            if let Some(spike) = self.detect_spike(item) {
                out.spikes.push(spike);
            }
            if let Some(flip) = self.detect_flip(item) {
                out.flips.push(flip);
            }
        }

        // Highest score first; margin then item id break ties so equal
        // inputs always produce the same ordering.
        out.dumps.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.item_id.cmp(&b.item_id))
        });
        out.spikes.sort_by(|a, b| {
            b.rise_pct
                .partial_cmp(&a.rise_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.item_id.cmp(&b.item_id))
        });
        out.flips.sort_by(|a, b| {
            b.margin_gp
                .cmp(&a.margin_gp)
                .then(a.item_id.cmp(&b.item_id))
        });

        out
    }

    fn detect_dump(&self, item: &TickItem) -> Option<DumpEvent> {
        let prev_low = item.prev.low.filter(|&p| p > 0)?;
        let cur_low = item.cur.low?;
        if cur_low >= prev_low {
            return None;
        }

        let drop_pct = (prev_low - cur_low) as f64 / prev_low as f64 * 100.0;
        if drop_pct < self.thresholds.dump_drop_pct {
            return None;
        }

        let limit = item.meta.buy_limit as f64;
        let cur_vol = item.cur.volume.unwrap_or(0) as f64;

        let expected_5m = item.avg_daily_volume / 288.0;
        let vol_spike_pct = if expected_5m > 0.0 {
            ((cur_vol - expected_5m) / expected_5m * 100.0).max(0.0)
        } else {
            0.0
        };

        let oversupply_pct = cur_vol / limit * 100.0;
        // Same measurement as oversupply, weighted separately.
        let buy_speed_pct = oversupply_pct;

        let score = (clamp(2.0 * drop_pct, 0.0, 40.0)
            + clamp(0.3 * vol_spike_pct, 0.0, 30.0)
            + clamp(0.2 * oversupply_pct, 0.0, 20.0)
            + clamp(0.1 * buy_speed_pct, 0.0, 10.0))
        .clamp(0.0, 100.0);

        let tier = tiers::tier_of(score);

        Some(DumpEvent {
            item_id: item.meta.id,
            item_name: item.meta.name.clone(),
            timestamp: item.cur.timestamp,
            prev_low,
            cur_low,
            drop_pct,
            vol_spike_pct,
            oversupply_pct,
            buy_speed_pct,
            score,
            tier: tier.name.to_string(),
            tier_group: tier.group,
            flags: DumpFlags {
                slow_buy: buy_speed_pct < 50.0,
                one_gp_dump: cur_low == 1,
                super_dump: score >= 51.0,
            },
        })
    }

    fn detect_spike(&self, item: &TickItem) -> Option<SpikeEvent> {
        let prev_high = item.prev.high.filter(|&p| p > 0)?;
        let cur_high = item.cur.high?;
        if cur_high <= prev_high {
            return None;
        }

        let rise_pct = (cur_high - prev_high) as f64 / prev_high as f64 * 100.0;
        let volume = item.cur.volume.unwrap_or(0);
        if rise_pct < self.thresholds.spike_rise_pct || volume < self.thresholds.min_volume {
            return None;
        }

        Some(SpikeEvent {
            item_id: item.meta.id,
            item_name: item.meta.name.clone(),
            timestamp: item.cur.timestamp,
            prev_high,
            cur_high,
            rise_pct,
            volume,
        })
    }

    fn detect_flip(&self, item: &TickItem) -> Option<FlipCandidate> {
        let low = item.cur.low.filter(|&p| p > 0)?;
        let high = item.cur.high?;
        let volume = item.cur.volume.unwrap_or(0);

        let margin_gp = high as i64 - low as i64;
        if margin_gp < self.thresholds.margin_min || volume < self.thresholds.min_volume {
            return None;
        }

        let roi_pct = margin_gp as f64 / low as f64 * 100.0;
        let liquidity_score = clamp(
            volume as f64 / item.meta.buy_limit as f64 * 100.0,
            0.0,
            100.0,
        );

        let volatility = volatility_pct(&item.history_24h);
        // Thin books are risky: penalty decays as volume clears the
        // configured floor.
        let volume_penalty =
            100.0 * (self.thresholds.min_volume as f64 / volume.max(1) as f64).min(1.0);
        let risk_score = clamp(
            0.5 * volatility + 0.3 * volume_penalty + 0.2 * (100.0 - liquidity_score),
            0.0,
            100.0,
        );

        Some(FlipCandidate {
            item_id: item.meta.id,
            item_name: item.meta.name.clone(),
            timestamp: item.cur.timestamp,
            buy: low,
            sell: high,
            insta_buy: high,
            insta_sell: low,
            margin_gp,
            roi_pct,
            volume,
            buy_limit: item.meta.buy_limit,
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
            liquidity_score,
        })
    }

    /// Cheap pre-check used by the scheduler to decide which items are
    /// worth loading 24h history for before calling `detect_all`.
    pub fn flip_eligible(&self, meta: &ItemMeta, cur: &Snapshot) -> bool {
        if meta.buy_limit == 0 {
            return false;
        }
        let (Some(low), Some(high)) = (cur.low, cur.high) else {
            return false;
        };
        high as i64 - low as i64 >= self.thresholds.margin_min
            && cur.volume.unwrap_or(0) >= self.thresholds.min_volume
    }
}

/// Relative standard deviation of mid prices over a window, in percent.
/// Fewer than two usable samples yields 0.
pub fn volatility_pct(history: &[Snapshot]) -> f64 {
    let mids: Vec<f64> = history
        .iter()
        .filter_map(|s| match (s.low, s.high) {
            (Some(l), Some(h)) => Some((l as f64 + h as f64) / 2.0),
            _ => None,
        })
        .collect();
    if mids.len() < 2 {
        return 0.0;
    }
    let mean = mids.iter().sum::<f64>() / mids.len() as f64;
    if mean <= 0.0 {
        return 0.0;
    }
    let var = mids.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / (mids.len() - 1) as f64;
    var.sqrt() / mean * 100.0
}

#[inline]
fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: u32, buy_limit: u32) -> ItemMeta {
        ItemMeta {
            id,
            name: format!("Item {id}"),
            members: true,
            buy_limit,
            examine: None,
            highalch: None,
        }
    }

    fn snap(item_id: u32, ts: i64, low: u64, high: u64, vol: u64) -> Snapshot {
        Snapshot {
            item_id,
            timestamp: ts,
            low: Some(low),
            high: Some(high),
            volume: Some(vol),
        }
    }

    fn engine() -> EventEngine {
        EventEngine::new(Thresholds::default())
    }

    #[test]
    fn dump_score_matches_worked_example() {
        // item 42, buy_limit 5000, avg daily volume 50 000:
        // drop 30% -> 40, vol spike ~187% -> 30, oversupply 10% -> 2,
        // buy speed 10% -> 1; total 73 -> sapphire.
        let item = TickItem {
            meta: meta(42, 5000),
            prev: snap(42, 0, 3000, 3100, 500),
            cur: snap(42, 300, 2100, 2200, 500),
            avg_daily_volume: 50_000.0,
            history_24h: vec![],
        };
        let dump = engine().detect_dump(&item).expect("dump expected");
        assert!((dump.drop_pct - 30.0).abs() < 1e-9);
        assert!((dump.score - 73.0).abs() < 0.5, "score was {}", dump.score);
        assert_eq!(dump.tier, "sapphire");
        assert!(dump.flags.super_dump);
        assert!(dump.flags.slow_buy);
        assert!(!dump.flags.one_gp_dump);
    }

    #[test]
    fn dump_requires_price_drop() {
        let item = TickItem {
            meta: meta(1, 100),
            prev: snap(1, 0, 1000, 1100, 500),
            cur: snap(1, 300, 1000, 1100, 500),
            avg_daily_volume: 10_000.0,
            history_24h: vec![],
        };
        assert!(engine().detect_dump(&item).is_none());
    }

    #[test]
    fn dump_below_drop_threshold_is_suppressed() {
        // 2% drop with the 5% default threshold
        let item = TickItem {
            meta: meta(1, 100),
            prev: snap(1, 0, 1000, 1100, 500),
            cur: snap(1, 300, 980, 1100, 500),
            avg_daily_volume: 10_000.0,
            history_24h: vec![],
        };
        assert!(engine().detect_dump(&item).is_none());
    }

    #[test]
    fn zero_buy_limit_excluded_everywhere() {
        let item = TickItem {
            meta: meta(7, 0),
            prev: snap(7, 0, 1000, 2_000_000, 500),
            cur: snap(7, 300, 100, 2_000_000, 500),
            avg_daily_volume: 10_000.0,
            history_24h: vec![],
        };
        let out = engine().detect_all(&[item]);
        assert!(out.dumps.is_empty());
        assert!(out.spikes.is_empty());
        assert!(out.flips.is_empty());
    }

    #[test]
    fn one_gp_dump_flag_follows_cur_low() {
        let item = TickItem {
            meta: meta(3, 1000),
            prev: snap(3, 0, 100, 110, 2000),
            cur: snap(3, 300, 1, 90, 2000),
            avg_daily_volume: 5_000.0,
            history_24h: vec![],
        };
        let dump = engine().detect_dump(&item).unwrap();
        assert!(dump.flags.one_gp_dump);
    }

    #[test]
    fn spike_respects_rise_and_volume_thresholds() {
        let base = TickItem {
            meta: meta(4, 1000),
            prev: snap(4, 0, 900, 1000, 500),
            cur: snap(4, 300, 900, 1100, 500),
            avg_daily_volume: 5_000.0,
            history_24h: vec![],
        };
        // 10% rise, volume 500 -> emitted
        assert!(engine().detect_spike(&base).is_some());

        // 10% rise but volume below floor -> suppressed
        let mut thin = base.clone();
        thin.cur.volume = Some(50);
        assert!(engine().detect_spike(&thin).is_none());

        // 2% rise -> suppressed
        let mut flat = base.clone();
        flat.cur.high = Some(1020);
        assert!(engine().detect_spike(&flat).is_none());
    }

    #[test]
    fn flip_margin_and_roi() {
        let item = TickItem {
            meta: meta(5, 100),
            prev: snap(5, 0, 1_000_000, 1_200_000, 500),
            cur: snap(5, 300, 1_000_000, 1_200_000, 500),
            avg_daily_volume: 5_000.0,
            history_24h: vec![],
        };
        let flip = engine().detect_flip(&item).expect("flip expected");
        assert_eq!(flip.margin_gp, 200_000);
        assert!((flip.roi_pct - 20.0).abs() < 1e-9);
        assert_eq!(flip.buy, 1_000_000);
        assert_eq!(flip.sell, 1_200_000);
    }

    #[test]
    fn flip_below_margin_floor_is_suppressed() {
        let item = TickItem {
            meta: meta(5, 100),
            prev: snap(5, 0, 1_000_000, 1_050_000, 500),
            cur: snap(5, 300, 1_000_000, 1_050_000, 500),
            avg_daily_volume: 5_000.0,
            history_24h: vec![],
        };
        assert!(engine().detect_flip(&item).is_none());
    }

    #[test]
    fn outputs_are_deterministic_and_sorted() {
        let items: Vec<TickItem> = (1..=4)
            .map(|i| TickItem {
                meta: meta(i, 1000),
                prev: snap(i, 0, 1000 * i as u64, 1100 * i as u64, 1000),
                cur: snap(i, 300, 800 * i as u64, 1100 * i as u64, 1000),
                avg_daily_volume: 20_000.0,
                history_24h: vec![],
            })
            .collect();

        let eng = engine();
        let a = eng.detect_all(&items);
        let b = eng.detect_all(&items);
        assert_eq!(
            serde_json::to_string(&a.dumps).unwrap(),
            serde_json::to_string(&b.dumps).unwrap()
        );

        // identical drop_pct/volume profile: score ties break on item id
        for pair in a.dumps.windows(2) {
            assert!(
                pair[0].score > pair[1].score
                    || (pair[0].score == pair[1].score && pair[0].item_id < pair[1].item_id)
            );
        }
    }

    #[test]
    fn volatility_needs_two_samples() {
        assert_eq!(volatility_pct(&[]), 0.0);
        assert_eq!(volatility_pct(&[snap(1, 0, 100, 110, 5)]), 0.0);
        let hist = vec![snap(1, 0, 100, 110, 5), snap(1, 300, 200, 210, 5)];
        assert!(volatility_pct(&hist) > 0.0);
    }
}
