//! Item catalog cache.
//!
//! Process-wide map of item metadata refreshed on its own cadence.
//! Refreshes build the next map off to the side and swap it atomically,
//! so lookups during a refresh keep seeing the previous snapshot. The
//! last successful refresh is persisted to disk for cold starts.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::{ItemId, ItemMeta};

const CACHE_FILE: &str = "item_cache.json";

#[derive(Serialize, Deserialize)]
struct CacheFile {
    refreshed_at: i64,
    items: Vec<ItemMeta>,
}

pub struct ItemCatalog {
    items: ArcSwap<HashMap<ItemId, ItemMeta>>,
    cache_path: PathBuf,
}

impl ItemCatalog {
    /// Create the catalog, warm from the on-disk cache when present.
    pub fn new(cache_root: &str) -> Result<Self> {
        fs::create_dir_all(cache_root)
            .with_context(|| format!("failed to create cache dir {cache_root}"))?;
        let cache_path = Path::new(cache_root).join(CACHE_FILE);

        let catalog = Self {
            items: ArcSwap::from_pointee(HashMap::new()),
            cache_path,
        };

        match catalog.load_from_disk() {
            Ok(Some(count)) => info!(count, "item catalog warmed from disk cache"),
            Ok(None) => info!("no item catalog cache on disk, waiting for first refresh"),
            Err(e) => warn!(error = %e, "failed to read item catalog cache, starting empty"),
        }

        Ok(catalog)
    }

    fn load_from_disk(&self) -> Result<Option<usize>> {
        if !self.cache_path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.cache_path)?;
        let cache: CacheFile = serde_json::from_str(&raw)?;
        let map: HashMap<ItemId, ItemMeta> =
            cache.items.into_iter().map(|m| (m.id, m)).collect();
        let count = map.len();
        self.items.store(Arc::new(map));
        Ok(Some(count))
    }

    /// Swap in a fresh mapping and persist it. An empty refresh is
    /// rejected so a bad upstream response can't wipe the catalog.
    pub fn refresh(&self, metas: Vec<ItemMeta>) -> Result<usize> {
        if metas.is_empty() {
            anyhow::bail!("refusing to refresh catalog from empty mapping");
        }

        let cache = CacheFile {
            refreshed_at: chrono::Utc::now().timestamp(),
            items: metas.clone(),
        };
        let tmp = self.cache_path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&cache)?)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.cache_path).context("failed to swap catalog cache file")?;

        let map: HashMap<ItemId, ItemMeta> = metas.into_iter().map(|m| (m.id, m)).collect();
        let count = map.len();
        self.items.store(Arc::new(map));
        info!(count, "item catalog refreshed");
        Ok(count)
    }

    pub fn get(&self, id: ItemId) -> Option<ItemMeta> {
        self.items.load().get(&id).cloned()
    }

    /// Unknown items behave as untradeable.
    pub fn buy_limit(&self, id: ItemId) -> u32 {
        self.items.load().get(&id).map(|m| m.buy_limit).unwrap_or(0)
    }

    /// Frozen handle to the current mapping.
    pub fn snapshot(&self) -> Arc<HashMap<ItemId, ItemMeta>> {
        self.items.load_full()
    }

    pub fn len(&self) -> usize {
        self.items.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.load().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta(id: ItemId, buy_limit: u32) -> ItemMeta {
        ItemMeta {
            id,
            name: format!("Item {id}"),
            members: false,
            buy_limit,
            examine: None,
            highalch: None,
        }
    }

    #[test]
    fn refresh_swaps_and_persists() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_str().unwrap();

        let catalog = ItemCatalog::new(root).unwrap();
        assert!(catalog.is_empty());
        assert_eq!(catalog.buy_limit(4151), 0);

        catalog.refresh(vec![meta(4151, 70), meta(2, 0)]).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.buy_limit(4151), 70);
        assert_eq!(catalog.buy_limit(2), 0);

        // a new instance warms from the persisted cache
        let reloaded = ItemCatalog::new(root).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get(4151).unwrap().buy_limit, 70);
    }

    #[test]
    fn empty_refresh_is_rejected() {
        let dir = TempDir::new().unwrap();
        let catalog = ItemCatalog::new(dir.path().to_str().unwrap()).unwrap();
        catalog.refresh(vec![meta(1, 10)]).unwrap();
        assert!(catalog.refresh(vec![]).is_err());
        // previous snapshot still visible
        assert_eq!(catalog.len(), 1);
    }
}
