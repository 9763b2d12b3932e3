//! Upstream price feed client.
//!
//! Thin REST client over the public pricing API: `/latest`, `/5m`,
//! `/1h`, `/mapping`. Responses are parsed strictly; any body that
//! fails to parse is a fetch failure, never a partial result. Each
//! endpoint is paced so we stay at or under the upstream's published
//! refresh cadence, and transient failures retry with exponential
//! backoff (1s base, 30s cap, 3 attempts). 4xx is surfaced without
//! retry.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::models::{ItemId, ItemMeta};

/// Prices above this are treated as upstream garbage and dropped.
pub const MAX_SANE_VALUE: i64 = 1 << 48;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Minimum inter-call gaps per endpoint, slightly under the upstream
/// refresh cadence so a drifting timer never skips a window.
const GAP_LATEST: Duration = Duration::from_secs(30);
const GAP_WINDOW: Duration = Duration::from_secs(270);
const GAP_MAPPING: Duration = Duration::from_secs(600);
/// Historical windows are cheap cache hits upstream; pace politely.
const GAP_BACKFILL: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
    #[error("upstream response malformed: {0}")]
    Malformed(String),
    #[error("upstream rate limited")]
    RateLimited,
}

/// Latest instant-buy / instant-sell observation for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatestPrice {
    pub low: Option<u64>,
    pub low_time: Option<i64>,
    pub high: Option<u64>,
    pub high_time: Option<i64>,
}

/// Averaged prices and trade counts for one 5m or 1h window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStats {
    pub avg_low: Option<u64>,
    pub avg_high: Option<u64>,
    pub volume: u64,
}

#[derive(Debug, Deserialize)]
struct RawLatestEntry {
    #[serde(default)]
    high: Option<i64>,
    #[serde(default, rename = "highTime")]
    high_time: Option<i64>,
    #[serde(default)]
    low: Option<i64>,
    #[serde(default, rename = "lowTime")]
    low_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawWindowEntry {
    #[serde(default, rename = "avgHighPrice")]
    avg_high_price: Option<i64>,
    #[serde(default, rename = "highPriceVolume")]
    high_price_volume: i64,
    #[serde(default, rename = "avgLowPrice")]
    avg_low_price: Option<i64>,
    #[serde(default, rename = "lowPriceVolume")]
    low_price_volume: i64,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    data: HashMap<String, RawLatestEntry>,
}

#[derive(Debug, Deserialize)]
struct WindowResponse {
    data: HashMap<String, RawWindowEntry>,
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawMappingEntry {
    id: i64,
    name: String,
    #[serde(default)]
    members: bool,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    examine: Option<String>,
    #[serde(default)]
    highalch: Option<i64>,
}

pub struct PriceFeedClient {
    client: Client,
    base_url: String,
    last_call: Mutex<HashMap<&'static str, Instant>>,
}

impl PriceFeedClient {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(user_agent)
            .pool_max_idle_per_host(4)
            .build()
            .context("failed to build price feed HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            last_call: Mutex::new(HashMap::new()),
        })
    }

    /// Latest instant prices for every item. The endpoint carries no
    /// timestamp of its own, so the local clock stamps the batch.
    pub async fn fetch_latest(&self) -> Result<(HashMap<ItemId, LatestPrice>, i64), FeedError> {
        let resp: LatestResponse = self.get_json("/latest", "/latest", GAP_LATEST).await?;
        let data = resp
            .data
            .into_iter()
            .filter_map(|(k, v)| {
                let id: ItemId = k.parse().ok()?;
                Some((
                    id,
                    LatestPrice {
                        low: sanitize(v.low),
                        low_time: v.low_time,
                        high: sanitize(v.high),
                        high_time: v.high_time,
                    },
                ))
            })
            .collect();
        Ok((data, Utc::now().timestamp()))
    }

    pub async fn fetch_5m(&self) -> Result<(HashMap<ItemId, WindowStats>, i64), FeedError> {
        self.fetch_window("/5m", "/5m", GAP_WINDOW).await
    }

    pub async fn fetch_1h(&self) -> Result<(HashMap<ItemId, WindowStats>, i64), FeedError> {
        self.fetch_window("/1h", "/1h", GAP_WINDOW).await
    }

    /// Historical 5m window ending at `timestamp` (unix seconds,
    /// aligned by the upstream). Used by the admin backfill path.
    pub async fn fetch_5m_at(
        &self,
        timestamp: i64,
    ) -> Result<(HashMap<ItemId, WindowStats>, i64), FeedError> {
        let path = format!("/5m?timestamp={timestamp}");
        let resp: WindowResponse = self.get_json(&path, "/5m-backfill", GAP_BACKFILL).await?;
        Ok(window_payload(resp, timestamp))
    }

    pub async fn fetch_mapping(&self) -> Result<Vec<ItemMeta>, FeedError> {
        let raw: Vec<RawMappingEntry> = self.get_json("/mapping", "/mapping", GAP_MAPPING).await?;
        let items = raw
            .into_iter()
            .filter_map(|m| {
                let id: ItemId = u32::try_from(m.id).ok().filter(|&id| id > 0)?;
                Some(ItemMeta {
                    id,
                    name: m.name,
                    members: m.members,
                    buy_limit: m
                        .limit
                        .and_then(|l| u32::try_from(l).ok())
                        .unwrap_or(0),
                    examine: m.examine,
                    highalch: sanitize(m.highalch),
                })
            })
            .collect();
        Ok(items)
    }

    async fn fetch_window(
        &self,
        path: &str,
        pace_key: &'static str,
        gap: Duration,
    ) -> Result<(HashMap<ItemId, WindowStats>, i64), FeedError> {
        let resp: WindowResponse = self.get_json(path, pace_key, gap).await?;
        let fallback_ts = Utc::now().timestamp();
        Ok(window_payload(resp, fallback_ts))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        pace_key: &'static str,
        gap: Duration,
    ) -> Result<T, FeedError> {
        self.pace(pace_key, gap).await;

        let url = format!("{}{}", self.base_url, path);
        let mut delay = BACKOFF_BASE;
        let mut last_err = FeedError::Unavailable("no attempts made".to_string());

        for attempt in 1..=MAX_ATTEMPTS {
            match self.client.get(&url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.json::<T>().await.map_err(|e| {
                            FeedError::Malformed(format!("GET {path}: {e}"))
                        });
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        return Err(FeedError::RateLimited);
                    }
                    if status.is_client_error() {
                        return Err(FeedError::Unavailable(format!(
                            "GET {path} returned {status}"
                        )));
                    }
                    last_err =
                        FeedError::Unavailable(format!("GET {path} returned {status}"));
                }
                Err(e) => {
                    last_err = FeedError::Unavailable(format!("GET {path}: {e}"));
                }
            }

            if attempt < MAX_ATTEMPTS {
                debug!(path, attempt, delay_ms = delay.as_millis() as u64, "retrying upstream fetch");
                sleep(delay).await;
                delay = (delay * 2).min(BACKOFF_CAP);
            }
        }

        warn!(path, "upstream fetch exhausted retries");
        Err(last_err)
    }

    /// Sleep long enough that calls to `key` stay `gap` apart.
    async fn pace(&self, key: &'static str, gap: Duration) {
        let wait = {
            let last = self.last_call.lock();
            last.get(key).and_then(|t| gap.checked_sub(t.elapsed()))
        };
        if let Some(wait) = wait {
            debug!(endpoint = key, wait_ms = wait.as_millis() as u64, "pacing upstream call");
            sleep(wait).await;
        }
        self.last_call.lock().insert(key, Instant::now());
    }
}

fn window_payload(
    resp: WindowResponse,
    fallback_ts: i64,
) -> (HashMap<ItemId, WindowStats>, i64) {
    let ts = resp.timestamp.unwrap_or(fallback_ts);
    let data = resp
        .data
        .into_iter()
        .filter_map(|(k, v)| {
            let id: ItemId = k.parse().ok()?;
            let volume = v.high_price_volume.max(0) as u64 + v.low_price_volume.max(0) as u64;
            Some((
                id,
                WindowStats {
                    avg_low: sanitize(v.avg_low_price),
                    avg_high: sanitize(v.avg_high_price),
                    volume,
                },
            ))
        })
        .collect();
    (data, ts)
}

/// Truncate absurd values (non-positive or beyond 2^48) to absent.
fn sanitize(v: Option<i64>) -> Option<u64> {
    v.filter(|&x| x > 0 && x <= MAX_SANE_VALUE).map(|x| x as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_drops_absurd_values() {
        assert_eq!(sanitize(Some(100)), Some(100));
        assert_eq!(sanitize(Some(0)), None);
        assert_eq!(sanitize(Some(-5)), None);
        assert_eq!(sanitize(Some(MAX_SANE_VALUE)), Some(MAX_SANE_VALUE as u64));
        assert_eq!(sanitize(Some(MAX_SANE_VALUE + 1)), None);
        assert_eq!(sanitize(None), None);
    }

    #[test]
    fn latest_response_parses_documented_shape() {
        let raw = r#"{
            "data": {
                "2": {"high": 166, "highTime": 1700000000, "low": 160, "lowTime": 1700000050},
                "6": {"high": null, "highTime": null, "low": 190, "lowTime": 1700000010},
                "junk": {"high": 1, "highTime": 1, "low": 1, "lowTime": 1}
            }
        }"#;
        let resp: LatestResponse = serde_json::from_str(raw).unwrap();
        let parsed: HashMap<ItemId, LatestPrice> = resp
            .data
            .into_iter()
            .filter_map(|(k, v)| {
                let id: ItemId = k.parse().ok()?;
                Some((
                    id,
                    LatestPrice {
                        low: sanitize(v.low),
                        low_time: v.low_time,
                        high: sanitize(v.high),
                        high_time: v.high_time,
                    },
                ))
            })
            .collect();
        // the non-numeric key is skipped, not fatal
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[&2].high, Some(166));
        assert_eq!(parsed[&6].high, None);
        assert_eq!(parsed[&6].low, Some(190));
    }

    #[test]
    fn window_response_sums_both_volume_sides() {
        let raw = r#"{
            "data": {
                "4151": {"avgHighPrice": 2200000, "highPriceVolume": 30, "avgLowPrice": 2100000, "lowPriceVolume": 70}
            },
            "timestamp": 1700000100
        }"#;
        let resp: WindowResponse = serde_json::from_str(raw).unwrap();
        let (data, ts) = window_payload(resp, 0);
        assert_eq!(ts, 1_700_000_100);
        assert_eq!(data[&4151].volume, 100);
        assert_eq!(data[&4151].avg_high, Some(2_200_000));
    }

    #[test]
    fn mapping_defaults_missing_limit_to_zero() {
        let raw = r#"[
            {"id": 4151, "name": "Abyssal whip", "members": true, "limit": 70, "examine": "A weapon from the Abyss.", "highalch": 72000},
            {"id": 617, "name": "Coins", "members": false}
        ]"#;
        let entries: Vec<RawMappingEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(entries[0].limit, Some(70));
        assert_eq!(entries[1].limit, None);
    }

    #[test]
    fn malformed_body_is_an_error_not_a_partial_parse() {
        let raw = r#"{"data": "not a map"}"#;
        assert!(serde_json::from_str::<LatestResponse>(raw).is_err());
    }
}
