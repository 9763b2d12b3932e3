//! Process configuration.
//!
//! Defaults are built in, an optional JSON document at `CONFIG_PATH`
//! overlays them, and environment variables win over both. The loaded
//! value is published behind an `ArcSwap` so a reload replaces the
//! whole document atomically; nothing mutates a live `Config` in place.

use std::{env, fs, sync::Arc};

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

/// Global event-detection thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum flip margin in gp.
    pub margin_min: i64,
    /// Minimum price drop (percent) for a dump to be emitted.
    pub dump_drop_pct: f64,
    /// Minimum price rise (percent) for a spike to be emitted.
    pub spike_rise_pct: f64,
    /// Minimum per-window trade count for spikes and flips.
    pub min_volume: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            margin_min: 100_000,
            dump_drop_pct: 5.0,
            spike_rise_pct: 5.0,
            min_volume: 100,
        }
    }
}

/// Per-IP request quota for one router group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteQuota {
    pub max_requests: u32,
    pub window_secs: u64,
    pub burst: u32,
}

impl Default for RouteQuota {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 60,
            burst: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    /// Path to the embedded price store.
    pub db_path: String,
    /// Directory holding per-tenant JSON documents.
    pub config_root: String,
    /// Directory holding the item catalog cache file.
    pub cache_root: String,
    pub upstream_base_url: String,
    pub user_agent: String,
    pub ingest_period_secs: u64,
    pub catalog_period_secs: u64,
    pub prune_period_secs: u64,
    pub retention_days: u64,
    pub thresholds: Thresholds,
    pub public_quota: RouteQuota,
    pub admin_quota: RouteQuota,
    pub cors_origins: Vec<String>,
    #[serde(skip_serializing)]
    pub admin_key: Option<String>,
    /// Allow admin routes from non-private addresses. Off by default.
    pub admin_allow_public: bool,
    /// Bot token for the chat platform; alerts are disabled without it.
    #[serde(skip_serializing)]
    pub chat_bot_token: Option<String>,
    pub chat_api_base: String,
    /// Optional webhook pinged on store failures.
    #[serde(skip_serializing)]
    pub admin_webhook_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8088,
            db_path: "./flipwatch.db".to_string(),
            config_root: "./tenants".to_string(),
            cache_root: "./cache".to_string(),
            upstream_base_url: "https://prices.runescape.wiki/api/v1/osrs".to_string(),
            user_agent: format!(
                "flipwatch-backend/{} (market event alerts)",
                env!("CARGO_PKG_VERSION")
            ),
            ingest_period_secs: 60,
            catalog_period_secs: 6 * 3600,
            prune_period_secs: 3600,
            retention_days: 7,
            thresholds: Thresholds::default(),
            public_quota: RouteQuota::default(),
            admin_quota: RouteQuota {
                max_requests: 20,
                window_secs: 60,
                burst: 5,
            },
            cors_origins: Vec::new(),
            admin_key: None,
            admin_allow_public: false,
            chat_bot_token: None,
            chat_api_base: "https://discord.com/api/v10".to_string(),
            admin_webhook_url: None,
        }
    }
}

impl Config {
    /// Load the effective configuration: defaults <- CONFIG_PATH JSON
    /// <- environment variables.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match env::var("CONFIG_PATH") {
            Ok(path) if !path.trim().is_empty() => {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file {path}"))?;
                serde_json::from_str::<Config>(&raw)
                    .with_context(|| format!("invalid config JSON in {path}"))?
            }
            _ => Config::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = env::var("PORT") {
            if let Ok(p) = v.parse() {
                self.port = p;
            }
        }
        // DB_URL takes priority when it points at an embedded store;
        // anything else falls back to DB_PATH.
        if let Ok(url) = env::var("DB_URL") {
            if let Some(path) = url.strip_prefix("sqlite://") {
                self.db_path = path.to_string();
            } else if !url.contains("://") && !url.trim().is_empty() {
                self.db_path = url;
            }
        } else if let Ok(path) = env::var("DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(v) = env::var("TENANT_CONFIG_ROOT") {
            if !v.trim().is_empty() {
                self.config_root = v;
            }
        }
        if let Ok(v) = env::var("CACHE_ROOT") {
            if !v.trim().is_empty() {
                self.cache_root = v;
            }
        }
        if let Ok(v) = env::var("UPSTREAM_BASE_URL") {
            if !v.trim().is_empty() {
                self.upstream_base_url = v.trim_end_matches('/').to_string();
            }
        }
        if let Ok(v) = env::var("INGEST_PERIOD_SECONDS") {
            if let Ok(n) = v.parse() {
                self.ingest_period_secs = n;
            }
        }
        if let Ok(v) = env::var("CATALOG_PERIOD_SECONDS") {
            if let Ok(n) = v.parse() {
                self.catalog_period_secs = n;
            }
        }
        if let Ok(v) = env::var("RETENTION_DAYS") {
            if let Ok(n) = v.parse() {
                self.retention_days = n;
            }
        }
        if let Ok(v) = env::var("ADMIN_KEY") {
            if !v.trim().is_empty() {
                self.admin_key = Some(v);
            }
        }
        if let Ok(v) = env::var("ADMIN_ALLOW_PUBLIC") {
            self.admin_allow_public = matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON");
        }
        if let Ok(v) = env::var("CORS_ORIGINS") {
            self.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(v) = env::var("CHAT_BOT_TOKEN") {
            if !v.trim().is_empty() {
                self.chat_bot_token = Some(v);
            }
        }
        if let Ok(v) = env::var("ADMIN_WEBHOOK_URL") {
            if !v.trim().is_empty() {
                self.admin_webhook_url = Some(v);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.ingest_period_secs == 0 {
            anyhow::bail!("ingest_period_secs must be positive");
        }
        if self.catalog_period_secs < 3600 {
            anyhow::bail!("catalog_period_secs must be at least one hour");
        }
        if self.retention_days == 0 {
            anyhow::bail!("retention_days must be positive");
        }
        if self.thresholds.margin_min < 0 {
            anyhow::bail!("thresholds.margin_min must be non-negative");
        }
        Ok(())
    }

    pub fn retention_seconds(&self) -> i64 {
        self.retention_days as i64 * 86_400
    }
}

/// Handle the rest of the process reads configuration through.
pub type SharedConfig = Arc<ArcSwap<Config>>;

pub fn shared(config: Config) -> SharedConfig {
    Arc::new(ArcSwap::from_pointee(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let t = Thresholds::default();
        assert_eq!(t.margin_min, 100_000);
        assert_eq!(t.dump_drop_pct, 5.0);
        assert_eq!(t.spike_rise_pct, 5.0);
        assert_eq!(t.min_volume, 100);
    }

    #[test]
    fn config_json_overlay_keeps_unset_defaults() {
        let raw = r#"{ "port": 9000, "thresholds": { "margin_min": 50000 } }"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.thresholds.margin_min, 50_000);
        // untouched fields keep their defaults
        assert_eq!(config.thresholds.min_volume, 100);
        assert_eq!(config.retention_days, 7);
    }

    #[test]
    fn validate_rejects_zero_ingest_period() {
        let config = Config {
            ingest_period_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn secrets_do_not_serialize() {
        let config = Config {
            admin_key: Some("k".into()),
            chat_bot_token: Some("t".into()),
            ..Config::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("admin_key").is_none());
        assert!(json.get("chat_bot_token").is_none());
    }
}
