//! Multi-tenant alert fan-out.
//!
//! Each tick the router walks the current view generation once per
//! tenant, applies the tenant's filter chain, classifies the target
//! channel, composes mentions, and emits through the chat egress.
//! Delivery records keyed on `(tenant, item, kind, bucket)` suppress
//! duplicate emissions within a tick, and a per-tenant budget caps how
//! many alerts one tenant receives per interval. Events are processed
//! in descending score order so the most relevant alerts win the
//! budget.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::ItemCatalog;
use crate::models::{
    DumpEvent, FlipCandidate, ItemId, QualityLabel, RiskLevel, SpikeEvent, WatchlistEntry,
};
use crate::store::PriceStore;
use crate::tenants::{ChannelKind, RoleKind, TenantConfig};
use crate::views::ViewData;

use super::egress::{AlertPayload, ChatEgress, EgressError, EmbedField};

const COLOR_DUMP: u32 = 0xE74C3C;
const COLOR_SPIKE: u32 = 0x2ECC71;
const COLOR_FLIP: u32 = 0xF1C40F;

/// Flips on items with at least this buy limit route to the
/// high-limit channel when one is configured.
const HIGH_LIMIT_FLOOR: u32 = 10_000;

/// How many ingest buckets a delivery record outlives its event by
/// before eviction. Covers an upstream window spanning several ticks.
const DEDUP_HORIZON_BUCKETS: i64 = 8;

#[derive(Debug, Default, Clone, Copy)]
pub struct FanOutReport {
    pub tenants: usize,
    pub considered: usize,
    pub emitted: usize,
    pub deduped: usize,
    pub rate_capped: usize,
    pub broken_channels: usize,
}

#[derive(Debug, Clone, Copy)]
enum Event<'a> {
    Dump(&'a DumpEvent),
    Spike(&'a SpikeEvent),
    Flip(&'a FlipCandidate),
}

impl<'a> Event<'a> {
    fn kind(&self) -> &'static str {
        match self {
            Event::Dump(_) => "dump",
            Event::Spike(_) => "spike",
            Event::Flip(_) => "flip",
        }
    }

    fn item_id(&self) -> ItemId {
        match self {
            Event::Dump(e) => e.item_id,
            Event::Spike(e) => e.item_id,
            Event::Flip(e) => e.item_id,
        }
    }

    fn timestamp(&self) -> i64 {
        match self {
            Event::Dump(e) => e.timestamp,
            Event::Spike(e) => e.timestamp,
            Event::Flip(e) => e.timestamp,
        }
    }

    fn score(&self) -> f64 {
        match self {
            Event::Dump(e) => e.score,
            _ => 0.0,
        }
    }

    fn margin_gp(&self) -> i64 {
        match self {
            Event::Flip(e) => e.margin_gp,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DeliveryKey {
    tenant: String,
    item_id: ItemId,
    kind: &'static str,
}

pub struct AlertRouter {
    egress: Arc<dyn ChatEgress>,
    catalog: Arc<ItemCatalog>,
    price_store: Arc<PriceStore>,
    /// Delivery records: key -> bucket they were emitted in. Evicted
    /// once the bucket advances.
    delivered: Mutex<HashMap<DeliveryKey, i64>>,
    ingest_period: i64,
}

impl AlertRouter {
    pub fn new(
        egress: Arc<dyn ChatEgress>,
        catalog: Arc<ItemCatalog>,
        price_store: Arc<PriceStore>,
        ingest_period_secs: u64,
    ) -> Self {
        Self {
            egress,
            catalog,
            price_store,
            delivered: Mutex::new(HashMap::new()),
            ingest_period: ingest_period_secs.max(1) as i64,
        }
    }

    /// Fan the current generation out to every known tenant.
    pub async fn fan_out(
        &self,
        views: &ViewData,
        tenants: &[(String, Arc<TenantConfig>)],
    ) -> FanOutReport {
        // Records are keyed on the event's own time bucket, so an event
        // spanning several ticks stays suppressed. Evict once a record
        // is old enough that its event can no longer reappear.
        let bucket_now = views.built_at / self.ingest_period;
        self.delivered
            .lock()
            .retain(|_, b| *b >= bucket_now - DEDUP_HORIZON_BUCKETS);

        let mut events: Vec<Event<'_>> = views
            .dumps
            .iter()
            .map(Event::Dump)
            .chain(views.spikes.iter().map(Event::Spike))
            .chain(views.top_flips.iter().map(Event::Flip))
            .collect();
        events.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.margin_gp().cmp(&a.margin_gp()))
                .then(a.item_id().cmp(&b.item_id()))
        });

        let mut report = FanOutReport {
            tenants: tenants.len(),
            ..Default::default()
        };

        for (tenant_id, config) in tenants {
            if config.banned {
                continue;
            }

            let mut budget = config.alert_thresholds.max_alerts_per_interval;
            let mut broken: HashSet<String> = HashSet::new();
            let mut watchlist: Option<Vec<WatchlistEntry>> = None;

            for event in &events {
                report.considered += 1;

                if !self.passes_filters(event, config) {
                    continue;
                }
                let Some(channel) = self.classify_channel(event, config) else {
                    continue;
                };
                if broken.contains(&channel) {
                    continue;
                }

                if matches!(event, Event::Dump(_)) && watchlist.is_none() {
                    watchlist = Some(
                        self.price_store
                            .watchlist_for_tenant(tenant_id)
                            .unwrap_or_default(),
                    );
                }
                let mentions = self.mentions(event, config, watchlist.as_deref());

                let bucket = event.timestamp() / self.ingest_period;
                let key = DeliveryKey {
                    tenant: tenant_id.clone(),
                    item_id: event.item_id(),
                    kind: event.kind(),
                };
                if self.delivered.lock().get(&key) == Some(&bucket) {
                    report.deduped += 1;
                    continue;
                }

                if budget == 0 {
                    report.rate_capped += 1;
                    continue;
                }

                let payload = build_payload(event, mentions);
                let result = match &config.webhook_url {
                    Some(url) => self.egress.post_webhook(url, &payload).await,
                    None => self.egress.post(&channel, &payload).await,
                };

                match result {
                    Ok(_) => {
                        self.delivered.lock().insert(key, bucket);
                        budget -= 1;
                        report.emitted += 1;
                    }
                    Err(EgressError::Permanent(reason)) => {
                        warn!(
                            tenant = %tenant_id,
                            channel = %channel,
                            %reason,
                            "channel marked broken for this tick"
                        );
                        broken.insert(channel);
                        report.broken_channels += 1;
                    }
                    Err(EgressError::Transient(reason)) => {
                        debug!(tenant = %tenant_id, channel = %channel, %reason, "alert post failed transiently");
                    }
                }
            }
        }

        if report.emitted > 0 {
            info!(
                generation = views.generation,
                tenants = report.tenants,
                emitted = report.emitted,
                deduped = report.deduped,
                rate_capped = report.rate_capped,
                "alert fan-out complete"
            );
        }
        report
    }

    /// Steps 1-4 of the filter chain. Tier filters only apply to dumps
    /// (the only tiered events); the margin floor only applies to
    /// flips.
    fn passes_filters(&self, event: &Event<'_>, config: &TenantConfig) -> bool {
        match event {
            Event::Dump(dump) => {
                if !config.tier_clears_minimum(&dump.tier) {
                    return false;
                }
                if !config.tier_allowed(&dump.tier) {
                    return false;
                }
                dump.score >= config.alert_thresholds.min_score
            }
            Event::Flip(flip) => flip.margin_gp >= config.alert_thresholds.min_margin_gp,
            Event::Spike(_) => true,
        }
    }

    /// Step 5: pick the target channel, or nothing if the tenant has
    /// no slot configured for this event.
    fn classify_channel(&self, event: &Event<'_>, config: &TenantConfig) -> Option<String> {
        let channels = &config.channels;
        match event {
            Event::Dump(_) => channels.get(&ChannelKind::Dumps).cloned(),
            Event::Spike(_) => channels.get(&ChannelKind::Spikes).cloned(),
            Event::Flip(flip) => {
                if channels.contains_key(&ChannelKind::HighAlchMargins) {
                    let alch_viable = self
                        .catalog
                        .get(flip.item_id)
                        .and_then(|m| m.highalch)
                        .is_some_and(|alch| alch > flip.buy);
                    if alch_viable {
                        return channels.get(&ChannelKind::HighAlchMargins).cloned();
                    }
                }
                if flip.buy_limit >= HIGH_LIMIT_FLOOR {
                    if let Some(channel) = channels.get(&ChannelKind::HighLimitItems) {
                        return Some(channel.clone());
                    }
                }

                let b = &config.price_brackets;
                let bracket = if flip.margin_gp <= b.cheap_max {
                    ChannelKind::CheapFlips
                } else if flip.margin_gp <= b.medium_max {
                    ChannelKind::MediumFlips
                } else if flip.margin_gp <= b.expensive_max {
                    ChannelKind::ExpensiveFlips
                } else {
                    ChannelKind::BillionaireFlips
                };
                channels
                    .get(&bracket)
                    .or_else(|| channels.get(&ChannelKind::Flips))
                    .cloned()
            }
        }
    }

    /// Step 6: tier role, risk role, quality role, event-kind role,
    /// plus watchers of the item for dumps.
    fn mentions(
        &self,
        event: &Event<'_>,
        config: &TenantConfig,
        watchlist: Option<&[WatchlistEntry]>,
    ) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut push_role = |role_id: &str| {
            let mention = format!("<@&{role_id}>");
            if !out.contains(&mention) {
                out.push(mention);
            }
        };

        match event {
            Event::Dump(dump) => {
                if let Some(tier_role) = config.tier_roles.get(&dump.tier) {
                    if tier_role.enabled {
                        if let Some(role_id) = &tier_role.role_id {
                            push_role(role_id);
                        }
                    }
                }
                let quality = match QualityLabel::from_score(dump.score) {
                    QualityLabel::Deal => RoleKind::QualityDeal,
                    QualityLabel::Good => RoleKind::QualityGood,
                    QualityLabel::Premium => RoleKind::QualityPremium,
                    QualityLabel::Elite => RoleKind::QualityElite,
                    QualityLabel::GodTier => RoleKind::QualityGodTier,
                    QualityLabel::Nuclear => RoleKind::QualityNuclear,
                };
                if let Some(role_id) = config.roles.get(&quality) {
                    push_role(role_id);
                }
                if let Some(role_id) = config.roles.get(&RoleKind::Dumps) {
                    push_role(role_id);
                }
                if let Some(watchlist) = watchlist {
                    for entry in watchlist {
                        if entry.item_id == dump.item_id {
                            if let Some(user_id) = &entry.user_id {
                                let mention = format!("<@{user_id}>");
                                if !out.contains(&mention) {
                                    out.push(mention);
                                }
                            }
                        }
                    }
                }
            }
            Event::Spike(_) => {
                if let Some(role_id) = config.roles.get(&RoleKind::Spikes) {
                    push_role(role_id);
                }
            }
            Event::Flip(flip) => {
                let risk = match flip.risk_level {
                    RiskLevel::Low => RoleKind::RiskLow,
                    RiskLevel::Medium => RoleKind::RiskMedium,
                    RiskLevel::High => RoleKind::RiskHigh,
                    RiskLevel::VeryHigh => RoleKind::RiskVeryHigh,
                };
                if let Some(role_id) = config.roles.get(&risk) {
                    push_role(role_id);
                }
                if let Some(role_id) = config.roles.get(&RoleKind::Flips) {
                    push_role(role_id);
                }
            }
        }

        out
    }
}

fn thumbnail_url(item_id: ItemId) -> String {
    format!("https://secure.runescape.com/m=itemdb_oldschool/obj_sprite.gif?id={item_id}")
}

fn build_payload(event: &Event<'_>, mentions: Vec<String>) -> AlertPayload {
    fn field(name: &str, value: String) -> EmbedField {
        EmbedField {
            name: name.to_string(),
            value,
            inline: true,
        }
    }

    match event {
        Event::Dump(dump) => {
            let tier = crate::engine::tiers::tier_by_name(&dump.tier);
            let emoji = tier.map(|t| t.emoji).unwrap_or("📉");
            let mut fields = vec![
                field("Score", format!("{:.0} ({})", dump.score, dump.tier)),
                field("Drop", format!("{:.1}%", dump.drop_pct)),
                field("Volume spike", format!("{:.0}%", dump.vol_spike_pct)),
                field("Oversupply", format!("{:.0}%", dump.oversupply_pct)),
            ];
            let flags = dump.flags.names();
            if !flags.is_empty() {
                fields.push(field("Flags", flags.join(", ")));
            }
            AlertPayload {
                title: format!("{emoji} Dump: {}", dump.item_name),
                description: format!(
                    "Price dropped {:.1}% ({} → {} gp)",
                    dump.drop_pct, dump.prev_low, dump.cur_low
                ),
                fields,
                thumbnail_url: Some(thumbnail_url(dump.item_id)),
                color: COLOR_DUMP,
                mentions,
            }
        }
        Event::Spike(spike) => AlertPayload {
            title: format!("📈 Spike: {}", spike.item_name),
            description: format!(
                "Price rose {:.1}% ({} → {} gp)",
                spike.rise_pct, spike.prev_high, spike.cur_high
            ),
            fields: vec![field("Volume", spike.volume.to_string())],
            thumbnail_url: Some(thumbnail_url(spike.item_id)),
            color: COLOR_SPIKE,
            mentions,
        },
        Event::Flip(flip) => AlertPayload {
            title: format!("💰 Flip: {}", flip.item_name),
            description: format!(
                "Margin {} gp ({:.1}% ROI)",
                flip.margin_gp, flip.roi_pct
            ),
            fields: vec![
                field("Buy", format!("{} gp", flip.buy)),
                field("Sell", format!("{} gp", flip.sell)),
                field("Risk", flip.risk_level.as_str().to_string()),
                field("Buy limit", flip.buy_limit.to_string()),
            ],
            thumbnail_url: Some(thumbnail_url(flip.item_id)),
            color: COLOR_FLIP,
            mentions,
        },
    }
}
