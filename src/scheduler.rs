//! Poller and background loops.
//!
//! One ingest loop drives fetch -> store -> detect -> publish -> fan
//! out; the catalog refresh and prune loops run on their own timers.
//! Every loop watches the shutdown channel and exits cleanly. Upstream
//! outages never kill the loop: the tick is skipped, the previous view
//! generation stays published, and after five consecutive failures the
//! loop backs off exponentially (capped at five minutes) until the
//! feed recovers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::alerts::egress::{AlertPayload, ChatEgress};
use crate::alerts::AlertRouter;
use crate::catalog::ItemCatalog;
use crate::config::SharedConfig;
use crate::engine::{EventEngine, TickItem};
use crate::feeds::{FeedError, PriceFeedClient};
use crate::models::{ItemId, ItemTicker, Snapshot};
use crate::store::{PriceStore, SnapshotKind};
use crate::tenants::{TenantConfig, TenantStore};
use crate::views::MarketViews;

const BACKOFF_THRESHOLD: u32 = 5;
const BACKOFF_CAP: Duration = Duration::from_secs(300);
const FIVE_MINUTES: i64 = 300;

/// Shared ingest health surfaced by `/api/health`.
pub struct PipelineHealth {
    consecutive_errors: AtomicU32,
    last_success_ts: AtomicI64,
}

impl PipelineHealth {
    pub fn new() -> Self {
        Self {
            consecutive_errors: AtomicU32::new(0),
            last_success_ts: AtomicI64::new(0),
        }
    }

    pub fn record_success(&self) {
        self.consecutive_errors.store(0, Ordering::Relaxed);
        self.last_success_ts
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn record_failure(&self) -> u32 {
        self.consecutive_errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::Relaxed)
    }

    pub fn last_success_ts(&self) -> i64 {
        self.last_success_ts.load(Ordering::Relaxed)
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

enum TickError {
    Feed(FeedError),
    Store(anyhow::Error),
}

/// Window state carried across ticks. The scheduler samples faster
/// than the upstream refreshes, so most ticks re-run the engine on the
/// held pair instead of fetching a new window.
#[derive(Default)]
struct IngestState {
    prev_windows: HashMap<ItemId, Snapshot>,
    cur_windows: HashMap<ItemId, Snapshot>,
    last_5m_fetch: i64,
    hourly_volumes: HashMap<ItemId, u64>,
    last_1h_fetch: i64,
}

/// Everything the loops need, bundled once at startup.
pub struct Pipeline {
    pub config: SharedConfig,
    pub feed: Arc<PriceFeedClient>,
    pub store: Arc<PriceStore>,
    pub catalog: Arc<ItemCatalog>,
    pub views: Arc<MarketViews>,
    pub tenants: Arc<TenantStore>,
    pub router: Arc<AlertRouter>,
    pub egress: Arc<dyn ChatEgress>,
    pub health: Arc<PipelineHealth>,
}

impl Pipeline {
    /// L1: the ingest loop.
    pub async fn run_ingest_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("ingest loop started");

        // seed the current-window state so the first fresh window after
        // a restart already has a predecessor to pair with
        let mut state = IngestState {
            cur_windows: self
                .store
                .latest_per_item(SnapshotKind::FiveMinute)
                .unwrap_or_default(),
            ..Default::default()
        };

        loop {
            match self.tick(&mut state).await {
                Ok(()) => {
                    self.health.record_success();
                }
                Err(TickError::Feed(e)) => {
                    let failures = self.health.record_failure();
                    warn!(failures, error = %e, "tick skipped, upstream unavailable");
                    if failures >= BACKOFF_THRESHOLD {
                        let exp = (failures - BACKOFF_THRESHOLD).min(8);
                        let base = self.config.load().ingest_period_secs;
                        let backoff =
                            Duration::from_secs(base.saturating_mul(1u64 << exp)).min(BACKOFF_CAP);
                        warn!(backoff_secs = backoff.as_secs(), "backing off upstream polling");
                        tokio::select! {
                            _ = sleep(backoff) => {}
                            _ = shutdown.changed() => break,
                        }
                        continue;
                    }
                }
                Err(TickError::Store(e)) => {
                    self.health.record_failure();
                    warn!(error = %e, "tick abandoned on store failure, previous view kept");
                    self.notify_admin_webhook(&format!("store failure: tick abandoned ({e:#})"))
                        .await;
                }
            }

            let period = Duration::from_secs(self.config.load().ingest_period_secs);
            tokio::select! {
                _ = sleep(period) => {}
                _ = shutdown.changed() => break,
            }
        }
        info!("ingest loop stopped");
    }

    async fn tick(&self, state: &mut IngestState) -> Result<(), TickError> {
        let thresholds = self.config.load().thresholds;
        let now = Utc::now().timestamp();

        // 1. latest instant prices, sampled every tick
        let (latest, latest_ts) = self.feed.fetch_latest().await.map_err(TickError::Feed)?;
        let latest_batch: Vec<Snapshot> = latest
            .iter()
            .map(|(&item_id, price)| Snapshot {
                item_id,
                timestamp: latest_ts,
                low: price.low,
                high: price.high,
                volume: None,
            })
            .collect();
        self.store
            .put_snapshots(SnapshotKind::Latest, &latest_batch)
            .map_err(TickError::Store)?;

        // 2. the 5m window feed refreshes on its own cadence; a new
        // window rotates the held pair, other ticks reuse it
        if now - state.last_5m_fetch >= FIVE_MINUTES {
            let (data, window_ts) = self.feed.fetch_5m().await.map_err(TickError::Feed)?;
            let batch: Vec<Snapshot> = data
                .iter()
                .map(|(&item_id, stats)| Snapshot {
                    item_id,
                    timestamp: window_ts,
                    low: stats.avg_low,
                    high: stats.avg_high,
                    volume: Some(stats.volume),
                })
                .collect();
            self.store
                .put_snapshots(SnapshotKind::FiveMinute, &batch)
                .map_err(TickError::Store)?;

            let newest_held = state
                .cur_windows
                .values()
                .map(|s| s.timestamp)
                .max()
                .unwrap_or(0);
            if window_ts > newest_held {
                state.prev_windows = std::mem::take(&mut state.cur_windows);
                state.cur_windows = batch.into_iter().map(|s| (s.item_id, s)).collect();
            }
            state.last_5m_fetch = now;
        }

        // 3. hourly windows back the daily-volume estimate for items
        // without enough 5m history
        if now - state.last_1h_fetch >= 3600 {
            match self.feed.fetch_1h().await {
                Ok((data, _)) => {
                    state.hourly_volumes = data.iter().map(|(&id, s)| (id, s.volume)).collect();
                    state.last_1h_fetch = now;
                }
                Err(e) => debug!(error = %e, "1h window fetch failed, keeping previous estimates"),
            }
        }

        // 4. pair windows and run the engine
        let daily_volumes = self
            .store
            .volume_sums_since(SnapshotKind::FiveMinute, now - 86_400)
            .map_err(TickError::Store)?;

        let engine = EventEngine::new(thresholds);
        let catalog = self.catalog.snapshot();
        let mut tick_items: Vec<TickItem> = Vec::with_capacity(state.cur_windows.len());

        for cur in state.cur_windows.values() {
            let Some(meta) = catalog.get(&cur.item_id) else {
                continue;
            };
            if meta.buy_limit == 0 {
                continue;
            }
            let Some(prev) = state.prev_windows.get(&cur.item_id) else {
                continue;
            };
            if prev.timestamp >= cur.timestamp {
                continue;
            }

            let avg_daily_volume = daily_volumes
                .get(&cur.item_id)
                .map(|&v| v as f64)
                .filter(|&v| v > 0.0)
                .or_else(|| {
                    state
                        .hourly_volumes
                        .get(&cur.item_id)
                        .map(|&v| v as f64 * 24.0)
                })
                .unwrap_or(0.0);

            let history_24h = if engine.flip_eligible(meta, cur) {
                self.store
                    .range(SnapshotKind::FiveMinute, cur.item_id, now - 86_400)
                    .map_err(TickError::Store)?
            } else {
                Vec::new()
            };

            tick_items.push(TickItem {
                meta: meta.clone(),
                prev: prev.clone(),
                cur: cur.clone(),
                avg_daily_volume,
                history_24h,
            });
        }

        let output = engine.detect_all(&tick_items);

        // 5. publish the next view generation
        let all_items: Vec<ItemTicker> = latest
            .iter()
            .filter_map(|(&item_id, price)| {
                let meta = catalog.get(&item_id)?;
                Some(ItemTicker {
                    item_id,
                    name: meta.name.clone(),
                    members: meta.members,
                    buy_limit: meta.buy_limit,
                    low: price.low,
                    high: price.high,
                    volume: state
                        .cur_windows
                        .get(&item_id)
                        .and_then(|s| s.volume),
                    timestamp: latest_ts,
                })
            })
            .collect();

        let generation = self.views.publish(
            now,
            output.flips,
            output.dumps,
            output.spikes,
            all_items,
        );

        // 6. fan alerts out to every known tenant
        let tenants = self.load_tenants();
        let views = self.views.load();
        let report = self.router.fan_out(&views, &tenants).await;
        debug!(
            generation,
            items = tick_items.len(),
            dumps = views.dumps.len(),
            spikes = views.spikes.len(),
            flips = views.top_flips.len(),
            emitted = report.emitted,
            "tick complete"
        );

        Ok(())
    }

    fn load_tenants(&self) -> Vec<(String, Arc<TenantConfig>)> {
        let ids = match self.tenants.list() {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "failed to list tenants, skipping fan-out");
                return Vec::new();
            }
        };
        ids.into_iter()
            .filter_map(|id| match self.tenants.get(&id, false) {
                Ok(config) => Some((id, config)),
                Err(e) => {
                    warn!(tenant = %id, error = %e, "skipping unreadable tenant config");
                    None
                }
            })
            .collect()
    }

    async fn notify_admin_webhook(&self, message: &str) {
        let Some(url) = self.config.load().admin_webhook_url.clone() else {
            return;
        };
        let payload = AlertPayload {
            title: "flipwatch pipeline alert".to_string(),
            description: message.to_string(),
            fields: vec![],
            thumbnail_url: None,
            color: 0xE67E22,
            mentions: vec![],
        };
        if let Err(e) = self.egress.post_webhook(&url, &payload).await {
            warn!(error = %e, "admin webhook notification failed");
        }
    }

    /// L2: catalog refresh loop.
    pub async fn run_catalog_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("catalog refresh loop started");
        loop {
            if self.catalog.is_empty() {
                self.refresh_catalog().await;
            }

            let period = Duration::from_secs(self.config.load().catalog_period_secs);
            tokio::select! {
                _ = sleep(period) => self.refresh_catalog().await,
                _ = shutdown.changed() => break,
            }
        }
        info!("catalog refresh loop stopped");
    }

    async fn refresh_catalog(&self) {
        match self.feed.fetch_mapping().await {
            Ok(metas) => {
                if let Err(e) = self.catalog.refresh(metas) {
                    warn!(error = %e, "catalog refresh rejected");
                }
            }
            Err(e) => warn!(error = %e, "catalog mapping fetch failed"),
        }
    }

    /// L3: retention prune loop.
    pub async fn run_prune_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("prune loop started");
        loop {
            let config = self.config.load();
            let period = Duration::from_secs(config.prune_period_secs);
            let retention = config.retention_seconds();
            drop(config);

            tokio::select! {
                _ = sleep(period) => {
                    if let Err(e) = self.store.prune(retention) {
                        warn!(error = %e, "scheduled prune failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("prune loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_counts_failures_until_success() {
        let health = PipelineHealth::new();
        assert_eq!(health.consecutive_errors(), 0);

        assert_eq!(health.record_failure(), 1);
        assert_eq!(health.record_failure(), 2);
        assert_eq!(health.record_failure(), 3);
        assert_eq!(health.consecutive_errors(), 3);

        health.record_success();
        assert_eq!(health.consecutive_errors(), 0);
        assert!(health.last_success_ts() > 0);
    }
}
