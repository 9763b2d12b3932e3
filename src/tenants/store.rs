//! File-backed tenant config store.
//!
//! One JSON document per tenant. Writes go to a temp file then rename
//! into place, a per-tenant lock serializes concurrent writers, and a
//! bounded in-memory cache keeps the hot path off disk. Tier, alert,
//! and channel state is mirrored into the guild settings tables after
//! every successful write.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use crate::store::{AlertSettingsRow, GuildConfigRow, PriceStore};

use super::validation::{self, ValidationError};
use super::{ChannelKind, TenantConfig};

/// Tenants are typically O(100-1000); the cache holds all of them in
/// practice and only evicts under abuse.
const CACHE_CAP: usize = 1024;

#[derive(Debug, Error)]
pub enum TenantStoreError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("tenant not found")]
    NotFound,
    #[error("tenant store io failure")]
    Io(#[from] std::io::Error),
    #[error("tenant document corrupt")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Default)]
struct Cache {
    map: HashMap<String, Arc<TenantConfig>>,
    order: VecDeque<String>,
}

impl Cache {
    fn touch(&mut self, tenant_id: &str) {
        if let Some(pos) = self.order.iter().position(|t| t == tenant_id) {
            self.order.remove(pos);
        }
        self.order.push_back(tenant_id.to_string());
    }

    fn insert(&mut self, tenant_id: &str, config: Arc<TenantConfig>) {
        self.map.insert(tenant_id.to_string(), config);
        self.touch(tenant_id);
        while self.map.len() > CACHE_CAP {
            if let Some(evicted) = self.order.pop_front() {
                self.map.remove(&evicted);
            } else {
                break;
            }
        }
    }

    fn remove(&mut self, tenant_id: &str) {
        self.map.remove(tenant_id);
        if let Some(pos) = self.order.iter().position(|t| t == tenant_id) {
            self.order.remove(pos);
        }
    }
}

pub struct TenantStore {
    root: PathBuf,
    price_store: Arc<PriceStore>,
    cache: Mutex<Cache>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TenantStore {
    pub fn new(root: &str, price_store: Arc<PriceStore>) -> std::io::Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: PathBuf::from(root),
            price_store,
            cache: Mutex::new(Cache::default()),
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn write_lock(&self, tenant_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Fetch a tenant config. With `create_if_missing` the first
    /// reference creates the document with secure defaults.
    pub fn get(
        &self,
        tenant_id: &str,
        create_if_missing: bool,
    ) -> Result<Arc<TenantConfig>, TenantStoreError> {
        let path = validation::tenant_path(&self.root, tenant_id)?;

        {
            let mut cache = self.cache.lock();
            if let Some(config) = cache.map.get(tenant_id).cloned() {
                cache.touch(tenant_id);
                return Ok(config);
            }
        }

        match fs::read_to_string(&path) {
            Ok(raw) => {
                let config: TenantConfig = serde_json::from_str(&raw)?;
                let config = Arc::new(config);
                self.cache.lock().insert(tenant_id, config.clone());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if !create_if_missing {
                    return Err(TenantStoreError::NotFound);
                }
                info!(tenant = tenant_id, "creating tenant config with defaults");
                self.put(tenant_id, TenantConfig::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Validated, atomic write. The document on disk is either the old
    /// or the new version, never a partial one.
    pub fn put(
        &self,
        tenant_id: &str,
        config: TenantConfig,
    ) -> Result<Arc<TenantConfig>, TenantStoreError> {
        let path = validation::tenant_path(&self.root, tenant_id)?;
        validation::validate_config(&config)?;

        let lock = self.write_lock(tenant_id);
        let _guard = lock.lock();

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&config)?)?;
        fs::rename(&tmp, &path)?;

        let config = Arc::new(config);
        self.cache.lock().insert(tenant_id, config.clone());
        self.mirror_guild_tables(tenant_id, &config);
        Ok(config)
    }

    /// Tenant ids with a document on disk, in directory order.
    pub fn list(&self) -> std::io::Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(stem) = name.strip_suffix(".json") {
                if validation::validate_tenant_id(stem).is_ok() {
                    out.push(stem.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    pub fn ban(&self, tenant_id: &str) -> Result<Arc<TenantConfig>, TenantStoreError> {
        self.set_banned(tenant_id, true)
    }

    pub fn unban(&self, tenant_id: &str) -> Result<Arc<TenantConfig>, TenantStoreError> {
        self.set_banned(tenant_id, false)
    }

    fn set_banned(
        &self,
        tenant_id: &str,
        banned: bool,
    ) -> Result<Arc<TenantConfig>, TenantStoreError> {
        let current = self.get(tenant_id, true)?;
        let mut updated = (*current).clone();
        updated.banned = banned;
        self.put(tenant_id, updated)
    }

    /// Remove the document, cached copy, and mirrored rows.
    pub fn delete(&self, tenant_id: &str) -> Result<bool, TenantStoreError> {
        let path = validation::tenant_path(&self.root, tenant_id)?;
        let lock = self.write_lock(tenant_id);
        let _guard = lock.lock();

        self.cache.lock().remove(tenant_id);
        if let Err(e) = self.price_store.delete_tenant_rows(tenant_id) {
            warn!(tenant = tenant_id, error = %e, "failed to clear mirrored tenant rows");
        }

        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort mirror of tier/alert/channel state into the guild
    /// tables; the JSON document stays the source of truth.
    fn mirror_guild_tables(&self, tenant_id: &str, config: &TenantConfig) {
        for (tier_name, tier_role) in &config.tier_roles {
            if let Err(e) = self.price_store.tier_settings_upsert(
                tenant_id,
                tier_name,
                tier_role.role_id.as_deref(),
                tier_role.enabled,
            ) {
                warn!(tenant = tenant_id, error = %e, "tier settings mirror failed");
                return;
            }
        }

        let alert_channel = config
            .channels
            .get(&ChannelKind::Dumps)
            .or_else(|| config.channels.get(&ChannelKind::Flips))
            .cloned();
        if let Err(e) = self.price_store.guild_config_upsert(
            tenant_id,
            &GuildConfigRow {
                min_tier_name: config.min_tier_name.clone(),
                alert_channel_id: alert_channel,
            },
        ) {
            warn!(tenant = tenant_id, error = %e, "guild config mirror failed");
            return;
        }

        let t = &config.alert_thresholds;
        let enabled_tiers: Vec<&str> = t.enabled_tiers.iter().map(|s| s.as_str()).collect();
        if let Err(e) = self.price_store.alert_settings_upsert(
            tenant_id,
            &AlertSettingsRow {
                min_margin_gp: t.min_margin_gp,
                min_score: t.min_score as i64,
                enabled_tiers: enabled_tiers.join(","),
                max_alerts_per_interval: t.max_alerts_per_interval,
            },
        ) {
            warn!(tenant = tenant_id, error = %e, "alert settings mirror failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TENANT: &str = "12345678901234567";

    fn fixture() -> (TempDir, TenantStore) {
        let dir = TempDir::new().unwrap();
        let price_store = Arc::new(PriceStore::open_in_memory().unwrap());
        let store = TenantStore::new(dir.path().to_str().unwrap(), price_store).unwrap();
        (dir, store)
    }

    #[test]
    fn get_without_create_is_not_found() {
        let (_dir, store) = fixture();
        assert!(matches!(
            store.get(TENANT, false),
            Err(TenantStoreError::NotFound)
        ));
    }

    #[test]
    fn lazy_create_persists_defaults() {
        let (dir, store) = fixture();
        let created = store.get(TENANT, true).unwrap();
        assert!(!created.admin_token.is_empty());
        assert!(dir.path().join(format!("{TENANT}.json")).exists());

        // second read returns the same document, not a regenerated one
        let again = store.get(TENANT, false).unwrap();
        assert_eq!(created.admin_token, again.admin_token);
    }

    #[test]
    fn invalid_tenant_id_creates_nothing() {
        let (dir, store) = fixture();
        let err = store.get("../etc", true).unwrap_err();
        assert!(matches!(
            err,
            TenantStoreError::Invalid(ValidationError::InvalidTenantId)
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn invalid_write_leaves_existing_document_untouched() {
        let (_dir, store) = fixture();
        let original = store.get(TENANT, true).unwrap();

        let mut bad = (*original).clone();
        bad.alert_thresholds.max_alerts_per_interval = 0;
        assert!(store.put(TENANT, bad).is_err());

        let after = store.get(TENANT, false).unwrap();
        assert_eq!(*after, *original);
    }

    #[test]
    fn put_round_trips_and_mirrors_tier_settings() {
        let (_dir, store) = fixture();
        let mut config = TenantConfig::default();
        config.min_tier_name = Some("silver".to_string());
        config.tier_roles.insert(
            "sapphire".to_string(),
            super::super::TierRole {
                role_id: Some("11111111111111111".to_string()),
                enabled: true,
            },
        );
        store.put(TENANT, config.clone()).unwrap();

        let read = store.get(TENANT, false).unwrap();
        assert_eq!(read.min_tier_name.as_deref(), Some("silver"));

        let mirrored = store.price_store.tier_settings_for(TENANT).unwrap();
        assert_eq!(mirrored.len(), 1);
        assert_eq!(mirrored[0].tier_name, "sapphire");
    }

    #[test]
    fn ban_unban_and_delete() {
        let (_dir, store) = fixture();
        store.get(TENANT, true).unwrap();

        assert!(store.ban(TENANT).unwrap().banned);
        assert!(!store.unban(TENANT).unwrap().banned);

        assert!(store.delete(TENANT).unwrap());
        assert!(!store.delete(TENANT).unwrap());
        assert!(matches!(
            store.get(TENANT, false),
            Err(TenantStoreError::NotFound)
        ));
    }

    #[test]
    fn list_only_returns_valid_tenant_documents() {
        let (dir, store) = fixture();
        store.get(TENANT, true).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join("bad.json"), "{}").unwrap();

        assert_eq!(store.list().unwrap(), vec![TENANT.to_string()]);
    }
}
