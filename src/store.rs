//! Embedded price store.
//!
//! SQLite in WAL mode behind a single connection: the ingest loop is
//! the only writer, API readers share the handle, and WAL keeps reads
//! from blocking on the write path. Batch inserts run in transactions
//! of 1000 rows; duplicate `(item_id, timestamp)` pairs are no-ops so
//! re-applying an upstream response is idempotent.

use std::collections::HashMap;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::tiers::TIERS;
use crate::models::{ItemId, Snapshot, WatchlistEntry};

const BATCH_SIZE: usize = 1000;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -32000;
PRAGMA temp_store = MEMORY;

CREATE TABLE IF NOT EXISTS prices (
    item_id INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    low INTEGER,
    high INTEGER,
    volume INTEGER,
    PRIMARY KEY (item_id, timestamp)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_prices_timestamp ON prices(timestamp);

CREATE TABLE IF NOT EXISTS ge_prices_5m (
    item_id INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    low INTEGER,
    high INTEGER,
    volume INTEGER,
    PRIMARY KEY (item_id, timestamp)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_ge_prices_5m_timestamp ON ge_prices_5m(timestamp);

CREATE TABLE IF NOT EXISTS watchlists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id TEXT NOT NULL,
    user_id TEXT,
    item_id INTEGER NOT NULL,
    item_name TEXT NOT NULL,
    UNIQUE (tenant_id, user_id, item_id)
);

CREATE TABLE IF NOT EXISTS tiers (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    emoji TEXT NOT NULL,
    min_score INTEGER NOT NULL,
    max_score INTEGER NOT NULL,
    tier_group TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS guild_tier_settings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id TEXT NOT NULL,
    tier_name TEXT NOT NULL,
    role_id TEXT,
    enabled INTEGER NOT NULL DEFAULT 1,
    UNIQUE (tenant_id, tier_name)
);

CREATE TABLE IF NOT EXISTS guild_config (
    tenant_id TEXT PRIMARY KEY,
    min_tier_name TEXT,
    alert_channel_id TEXT
);

CREATE TABLE IF NOT EXISTS guild_alert_settings (
    tenant_id TEXT PRIMARY KEY,
    min_margin_gp INTEGER NOT NULL DEFAULT 0,
    min_score INTEGER NOT NULL DEFAULT 0,
    enabled_tiers TEXT NOT NULL DEFAULT '',
    max_alerts_per_interval INTEGER NOT NULL DEFAULT 3
);
"#;

/// Which snapshot table a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// Sampled from `/latest` at the ingest cadence.
    Latest,
    /// Upstream-aligned 5-minute windows.
    FiveMinute,
}

impl SnapshotKind {
    fn table(self) -> &'static str {
        match self {
            SnapshotKind::Latest => "prices",
            SnapshotKind::FiveMinute => "ge_prices_5m",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreCounts {
    pub prices: i64,
    pub ge_prices_5m: i64,
    pub watchlists: i64,
    pub guild_tier_settings: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DbHealth {
    pub journal_mode: String,
    pub integrity_ok: bool,
    pub counts: StoreCounts,
}

/// Persisted tier-role toggle for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSettingRow {
    pub tier_name: String,
    pub role_id: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuildConfigRow {
    pub min_tier_name: Option<String>,
    pub alert_channel_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSettingsRow {
    pub min_margin_gp: i64,
    pub min_score: i64,
    /// Comma-separated tier names; empty means all tiers allowed.
    pub enabled_tiers: String,
    pub max_alerts_per_interval: u32,
}

pub struct PriceStore {
    conn: Mutex<Connection>,
}

impl PriceStore {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open price store at {path}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to apply price store schema")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.seed_tiers()?;
        info!(path, "price store ready");
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.seed_tiers()?;
        Ok(store)
    }

    fn seed_tiers(&self) -> Result<()> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO tiers (id, name, emoji, min_score, max_score, tier_group)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (idx, tier) in TIERS.iter().enumerate() {
            stmt.execute(params![
                idx as i64 + 1,
                tier.name,
                tier.emoji,
                tier.min_score as i64,
                tier.max_score as i64,
                tier.group.as_str(),
            ])?;
        }
        Ok(())
    }

    /// Transactional bulk insert. Returns the number of rows that were
    /// actually new; replays of the same batch insert nothing.
    pub fn put_snapshots(&self, kind: SnapshotKind, batch: &[Snapshot]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();
        let mut inserted = 0usize;

        for chunk in batch.chunks(BATCH_SIZE) {
            let tx = conn.transaction().context("failed to begin transaction")?;
            {
                let sql = format!(
                    "INSERT INTO {} (item_id, timestamp, low, high, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(item_id, timestamp) DO NOTHING",
                    kind.table()
                );
                let mut stmt = tx.prepare_cached(&sql)?;
                for snap in chunk {
                    inserted += stmt.execute(params![
                        snap.item_id as i64,
                        snap.timestamp,
                        snap.low.map(|v| v as i64),
                        snap.high.map(|v| v as i64),
                        snap.volume.map(|v| v as i64),
                    ])?;
                }
            }
            tx.commit().context("failed to commit snapshot batch")?;
        }

        debug!(
            table = kind.table(),
            total = batch.len(),
            inserted,
            "snapshot batch stored"
        );
        Ok(inserted)
    }

    /// Last `n` snapshots for an item, newest first.
    pub fn recent(&self, kind: SnapshotKind, item_id: ItemId, n: usize) -> Result<Vec<Snapshot>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT item_id, timestamp, low, high, volume FROM {}
             WHERE item_id = ?1 ORDER BY timestamp DESC LIMIT ?2",
            kind.table()
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![item_id as i64, n as i64], row_to_snapshot)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Snapshots with `timestamp >= since_ts`, oldest first.
    pub fn range(&self, kind: SnapshotKind, item_id: ItemId, since_ts: i64) -> Result<Vec<Snapshot>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT item_id, timestamp, low, high, volume FROM {}
             WHERE item_id = ?1 AND timestamp >= ?2 ORDER BY timestamp ASC",
            kind.table()
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![item_id as i64, since_ts], row_to_snapshot)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Most recent snapshot for every item in one pass. Seeds the
    /// scheduler's previous-window state after a restart.
    pub fn latest_per_item(&self, kind: SnapshotKind) -> Result<HashMap<ItemId, Snapshot>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT p.item_id, p.timestamp, p.low, p.high, p.volume
             FROM {t} p
             JOIN (SELECT item_id, MAX(timestamp) AS ts FROM {t} GROUP BY item_id) m
               ON p.item_id = m.item_id AND p.timestamp = m.ts",
            t = kind.table()
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map([], row_to_snapshot)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().map(|s| (s.item_id, s)).collect())
    }

    /// Summed trade volume per item since `since_ts`.
    pub fn volume_sums_since(
        &self,
        kind: SnapshotKind,
        since_ts: i64,
    ) -> Result<HashMap<ItemId, u64>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT item_id, SUM(COALESCE(volume, 0)) FROM {}
             WHERE timestamp >= ?1 GROUP BY item_id",
            kind.table()
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![since_ts], |row| {
                Ok((row.get::<_, i64>(0)? as ItemId, row.get::<_, i64>(1)?.max(0) as u64))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().collect())
    }

    /// Delete rows older than `now - retention_seconds` from both
    /// snapshot tables. Returns rows removed.
    pub fn prune(&self, retention_seconds: i64) -> Result<usize> {
        let cutoff = chrono::Utc::now().timestamp() - retention_seconds;
        let conn = self.conn.lock();
        let mut removed = 0usize;
        for table in ["prices", "ge_prices_5m"] {
            let sql = format!("DELETE FROM {table} WHERE timestamp < ?1");
            removed += conn.execute(&sql, params![cutoff])?;
        }
        if removed > 0 {
            info!(removed, cutoff, "pruned expired snapshots");
        }
        Ok(removed)
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let conn = self.conn.lock();
        let count = |table: &str| -> Result<i64> {
            let sql = format!("SELECT COUNT(*) FROM {table}");
            conn.query_row(&sql, [], |row| row.get(0))
                .with_context(|| format!("failed counting {table}"))
        };
        Ok(StoreCounts {
            prices: count("prices")?,
            ge_prices_5m: count("ge_prices_5m")?,
            watchlists: count("watchlists")?,
            guild_tier_settings: count("guild_tier_settings")?,
        })
    }

    pub fn db_health(&self) -> Result<DbHealth> {
        let (journal_mode, integrity_ok) = {
            let conn = self.conn.lock();
            let journal_mode: String =
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
            let check: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
            (journal_mode, check == "ok")
        };
        Ok(DbHealth {
            journal_mode,
            integrity_ok,
            counts: self.counts()?,
        })
    }

    // ------------------------------------------------------------------
    // Watchlists
    // ------------------------------------------------------------------

    /// Insert or refresh a watchlist row. Duplicate
    /// `(tenant, user, item)` entries update the stored item name.
    pub fn watchlist_add(&self, entry: &WatchlistEntry) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO watchlists (tenant_id, user_id, item_id, item_name)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(tenant_id, user_id, item_id)
             DO UPDATE SET item_name = excluded.item_name",
            params![
                entry.tenant_id,
                entry.user_id,
                entry.item_id as i64,
                entry.item_name
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn watchlist_remove(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        item_id: ItemId,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM watchlists
             WHERE tenant_id = ?1 AND user_id IS ?2 AND item_id = ?3",
            params![tenant_id, user_id, item_id as i64],
        )?;
        Ok(removed > 0)
    }

    pub fn watchlist_for_tenant(&self, tenant_id: &str) -> Result<Vec<WatchlistEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, tenant_id, user_id, item_id, item_name
             FROM watchlists WHERE tenant_id = ?1 ORDER BY item_id",
        )?;
        let rows = stmt
            .query_map(params![tenant_id], |row| {
                Ok(WatchlistEntry {
                    id: Some(row.get(0)?),
                    tenant_id: row.get(1)?,
                    user_id: row.get(2)?,
                    item_id: row.get::<_, i64>(3)? as ItemId,
                    item_name: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Guild settings (write-through from the tenant store)
    // ------------------------------------------------------------------

    pub fn tier_settings_upsert(
        &self,
        tenant_id: &str,
        tier_name: &str,
        role_id: Option<&str>,
        enabled: bool,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO guild_tier_settings (tenant_id, tier_name, role_id, enabled)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(tenant_id, tier_name)
             DO UPDATE SET role_id = excluded.role_id, enabled = excluded.enabled",
            params![tenant_id, tier_name, role_id, enabled as i64],
        )?;
        Ok(())
    }

    pub fn tier_settings_for(&self, tenant_id: &str) -> Result<Vec<TierSettingRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT tier_name, role_id, enabled FROM guild_tier_settings
             WHERE tenant_id = ?1 ORDER BY tier_name",
        )?;
        let rows = stmt
            .query_map(params![tenant_id], |row| {
                Ok(TierSettingRow {
                    tier_name: row.get(0)?,
                    role_id: row.get(1)?,
                    enabled: row.get::<_, i64>(2)? != 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn guild_config_upsert(&self, tenant_id: &str, row: &GuildConfigRow) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO guild_config (tenant_id, min_tier_name, alert_channel_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(tenant_id)
             DO UPDATE SET min_tier_name = excluded.min_tier_name,
                           alert_channel_id = excluded.alert_channel_id",
            params![tenant_id, row.min_tier_name, row.alert_channel_id],
        )?;
        Ok(())
    }

    pub fn alert_settings_upsert(&self, tenant_id: &str, row: &AlertSettingsRow) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO guild_alert_settings
             (tenant_id, min_margin_gp, min_score, enabled_tiers, max_alerts_per_interval)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(tenant_id)
             DO UPDATE SET min_margin_gp = excluded.min_margin_gp,
                           min_score = excluded.min_score,
                           enabled_tiers = excluded.enabled_tiers,
                           max_alerts_per_interval = excluded.max_alerts_per_interval",
            params![
                tenant_id,
                row.min_margin_gp,
                row.min_score,
                row.enabled_tiers,
                row.max_alerts_per_interval as i64,
            ],
        )?;
        Ok(())
    }

    pub fn delete_tenant_rows(&self, tenant_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        for table in [
            "guild_tier_settings",
            "guild_config",
            "guild_alert_settings",
            "watchlists",
        ] {
            let sql = format!("DELETE FROM {table} WHERE tenant_id = ?1");
            conn.execute(&sql, params![tenant_id])?;
        }
        Ok(())
    }
}

fn row_to_snapshot(row: &rusqlite::Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        item_id: row.get::<_, i64>(0)? as ItemId,
        timestamp: row.get(1)?,
        low: row.get::<_, Option<i64>>(2)?.map(|v| v as u64),
        high: row.get::<_, Option<i64>>(3)?.map(|v| v as u64),
        volume: row.get::<_, Option<i64>>(4)?.map(|v| v as u64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(item_id: ItemId, ts: i64, low: u64, high: u64, vol: u64) -> Snapshot {
        Snapshot {
            item_id,
            timestamp: ts,
            low: Some(low),
            high: Some(high),
            volume: Some(vol),
        }
    }

    #[test]
    fn put_snapshots_is_idempotent() {
        let store = PriceStore::open_in_memory().unwrap();
        let batch = vec![snap(1, 100, 10, 20, 5), snap(1, 200, 11, 21, 6)];

        assert_eq!(
            store.put_snapshots(SnapshotKind::FiveMinute, &batch).unwrap(),
            2
        );
        // same batch again: nothing new
        assert_eq!(
            store.put_snapshots(SnapshotKind::FiveMinute, &batch).unwrap(),
            0
        );
        assert_eq!(store.counts().unwrap().ge_prices_5m, 2);
    }

    #[test]
    fn recent_returns_newest_first() {
        let store = PriceStore::open_in_memory().unwrap();
        let batch: Vec<Snapshot> = (0..5).map(|i| snap(7, i * 300, 10, 20, 5)).collect();
        store.put_snapshots(SnapshotKind::FiveMinute, &batch).unwrap();

        let recent = store.recent(SnapshotKind::FiveMinute, 7, 3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].timestamp, 1200);
        assert_eq!(recent[2].timestamp, 600);
    }

    #[test]
    fn range_is_inclusive_and_ascending() {
        let store = PriceStore::open_in_memory().unwrap();
        let batch: Vec<Snapshot> = (0..5).map(|i| snap(7, i * 300, 10, 20, 5)).collect();
        store.put_snapshots(SnapshotKind::FiveMinute, &batch).unwrap();

        let rows = store.range(SnapshotKind::FiveMinute, 7, 600).unwrap();
        assert_eq!(
            rows.iter().map(|s| s.timestamp).collect::<Vec<_>>(),
            vec![600, 900, 1200]
        );
    }

    #[test]
    fn round_trip_contains_written_snapshot() {
        let store = PriceStore::open_in_memory().unwrap();
        let written = snap(42, 1234, 100, 200, 50);
        store
            .put_snapshots(SnapshotKind::FiveMinute, &[written.clone()])
            .unwrap();
        let rows = store.recent(SnapshotKind::FiveMinute, 42, usize::MAX).unwrap();
        assert!(rows.contains(&written));
    }

    #[test]
    fn prune_removes_only_expired_rows() {
        let store = PriceStore::open_in_memory().unwrap();
        let now = chrono::Utc::now().timestamp();
        let batch = vec![
            snap(1, now - 10 * 86_400, 10, 20, 5),
            snap(1, now - 60, 10, 20, 5),
        ];
        store.put_snapshots(SnapshotKind::FiveMinute, &batch).unwrap();

        let removed = store.prune(7 * 86_400).unwrap();
        assert_eq!(removed, 1);
        let remaining = store.recent(SnapshotKind::FiveMinute, 1, 10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].timestamp, now - 60);
    }

    #[test]
    fn volume_sums_since_groups_by_item() {
        let store = PriceStore::open_in_memory().unwrap();
        let batch = vec![
            snap(1, 100, 10, 20, 50),
            snap(1, 400, 10, 20, 70),
            snap(2, 400, 10, 20, 30),
        ];
        store.put_snapshots(SnapshotKind::FiveMinute, &batch).unwrap();

        let sums = store.volume_sums_since(SnapshotKind::FiveMinute, 0).unwrap();
        assert_eq!(sums[&1], 120);
        assert_eq!(sums[&2], 30);

        let sums = store.volume_sums_since(SnapshotKind::FiveMinute, 200).unwrap();
        assert_eq!(sums[&1], 70);
    }

    #[test]
    fn latest_per_item_picks_max_timestamp() {
        let store = PriceStore::open_in_memory().unwrap();
        let batch = vec![snap(1, 100, 10, 20, 5), snap(1, 400, 99, 20, 5)];
        store.put_snapshots(SnapshotKind::FiveMinute, &batch).unwrap();

        let latest = store.latest_per_item(SnapshotKind::FiveMinute).unwrap();
        assert_eq!(latest[&1].low, Some(99));
    }

    #[test]
    fn tiers_are_seeded_once() {
        let store = PriceStore::open_in_memory().unwrap();
        store.seed_tiers().unwrap(); // second call is a no-op
        let conn = store.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tiers", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 10);
        let diamond: (i64, i64) = conn
            .query_row(
                "SELECT min_score, max_score FROM tiers WHERE name = 'diamond'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(diamond, (91, 100));
    }

    #[test]
    fn watchlist_unique_per_tenant_user_item() {
        let store = PriceStore::open_in_memory().unwrap();
        let entry = WatchlistEntry {
            id: None,
            tenant_id: "12345678901234567".to_string(),
            user_id: Some("98765432109876543".to_string()),
            item_id: 4151,
            item_name: "Abyssal whip".to_string(),
        };
        store.watchlist_add(&entry).unwrap();
        store.watchlist_add(&entry).unwrap();

        let rows = store.watchlist_for_tenant("12345678901234567").unwrap();
        assert_eq!(rows.len(), 1);

        assert!(store
            .watchlist_remove("12345678901234567", Some("98765432109876543"), 4151)
            .unwrap());
        assert!(store.watchlist_for_tenant("12345678901234567").unwrap().is_empty());
    }

    #[test]
    fn guild_settings_round_trip() {
        let store = PriceStore::open_in_memory().unwrap();
        let tenant = "12345678901234567";

        store
            .tier_settings_upsert(tenant, "sapphire", Some("11111111111111111"), true)
            .unwrap();
        store.tier_settings_upsert(tenant, "sapphire", None, false).unwrap();

        let rows = store.tier_settings_for(tenant).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tier_name, "sapphire");
        assert!(!rows[0].enabled);
        assert!(rows[0].role_id.is_none());

        store
            .alert_settings_upsert(
                tenant,
                &AlertSettingsRow {
                    min_margin_gp: 50_000,
                    min_score: 30,
                    enabled_tiers: "gold,platinum".to_string(),
                    max_alerts_per_interval: 5,
                },
            )
            .unwrap();

        store.delete_tenant_rows(tenant).unwrap();
        assert!(store.tier_settings_for(tenant).unwrap().is_empty());
    }
}
