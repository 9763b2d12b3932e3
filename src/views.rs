//! Materialized market views.
//!
//! One immutable generation per ingest tick, published by atomic
//! pointer swap. Readers hold a frozen `ViewData`; the writer prepares
//! the next generation off-line and swaps it in whole, so a reader can
//! never observe a half-built view.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::models::{DumpEvent, FlipCandidate, ItemTicker, SpikeEvent};

#[derive(Debug, Default, Serialize)]
pub struct ViewData {
    /// Monotonic generation counter; +1 on every successful tick.
    pub generation: u64,
    pub built_at: i64,
    pub top_flips: Vec<FlipCandidate>,
    pub dumps: Vec<DumpEvent>,
    pub spikes: Vec<SpikeEvent>,
    pub all_items: Vec<ItemTicker>,
}

pub struct MarketViews {
    current: ArcSwap<ViewData>,
    generation: AtomicU64,
}

impl MarketViews {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(ViewData::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Publish a new generation. The previous view stays valid for any
    /// reader still holding it.
    pub fn publish(
        &self,
        built_at: i64,
        top_flips: Vec<FlipCandidate>,
        dumps: Vec<DumpEvent>,
        spikes: Vec<SpikeEvent>,
        all_items: Vec<ItemTicker>,
    ) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.current.store(Arc::new(ViewData {
            generation,
            built_at,
            top_flips,
            dumps,
            spikes,
            all_items,
        }));
        generation
    }

    /// Frozen handle to the current generation.
    pub fn load(&self) -> Arc<ViewData> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl Default for MarketViews {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_increments_generation_by_one() {
        let views = MarketViews::new();
        assert_eq!(views.load().generation, 0);

        let g1 = views.publish(100, vec![], vec![], vec![], vec![]);
        let g2 = views.publish(200, vec![], vec![], vec![], vec![]);
        assert_eq!(g1, 1);
        assert_eq!(g2, 2);
        assert_eq!(views.load().generation, 2);
        assert_eq!(views.load().built_at, 200);
    }

    #[test]
    fn readers_keep_their_generation_across_a_swap() {
        let views = MarketViews::new();
        views.publish(100, vec![], vec![], vec![], vec![]);

        let held = views.load();
        views.publish(200, vec![], vec![], vec![], vec![]);

        assert_eq!(held.generation, 1);
        assert_eq!(held.built_at, 100);
        assert_eq!(views.load().generation, 2);
    }
}
