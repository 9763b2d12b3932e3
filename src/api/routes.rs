//! Public read endpoints plus the tenant config and watchlist
//! read/write pair.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::engine::tiers::{self, Tier, TierGroup, TIERS};
use crate::models::{DumpEvent, FlipCandidate, ItemId, ItemTicker, Snapshot, SpikeEvent, WatchlistEntry};
use crate::store::{SnapshotKind, StoreCounts, TierSettingRow};
use crate::tenants::TenantConfig;

use super::{authorize_tenant_write, ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct TopResponse {
    pub generation: u64,
    pub built_at: i64,
    pub count: usize,
    pub top_flips: Vec<FlipCandidate>,
}

pub async fn get_top(State(state): State<AppState>) -> Json<TopResponse> {
    let views = state.views.load();
    Json(TopResponse {
        generation: views.generation,
        built_at: views.built_at,
        count: views.top_flips.len(),
        top_flips: views.top_flips.clone(),
    })
}

#[derive(Debug, Deserialize)]
pub struct DumpsQuery {
    pub tier: Option<String>,
    pub group: Option<String>,
    pub special: Option<String>,
    pub limit: Option<usize>,
    pub guild_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DumpsResponse {
    pub generation: u64,
    pub built_at: i64,
    pub count: usize,
    pub dumps: Vec<DumpEvent>,
}

pub async fn get_dumps(
    Query(params): Query<DumpsQuery>,
    State(state): State<AppState>,
) -> Result<Json<DumpsResponse>, ApiError> {
    let views = state.views.load();

    let tier_filter = match &params.tier {
        Some(t) if !tiers::is_known_tier(t) => {
            return Err(ApiError::BadRequest("unknown tier".to_string()))
        }
        other => other.clone(),
    };

    let group_filter: Option<TierGroup> = match &params.group {
        Some(g) => Some(
            TierGroup::parse(g).ok_or_else(|| ApiError::BadRequest("unknown group".to_string()))?,
        ),
        None => None,
    };

    let special = params.special.as_deref();
    if let Some(s) = special {
        if !matches!(s, "slow_buy" | "one_gp_dump" | "super") {
            return Err(ApiError::BadRequest("unknown special flag".to_string()));
        }
    }

    // guild filters apply the tenant's tier settings on top
    let tenant = match &params.guild_id {
        Some(guild_id) => Some(state.tenants.get(guild_id, false)?),
        None => None,
    };

    let mut dumps: Vec<DumpEvent> = views
        .dumps
        .iter()
        .filter(|d| tier_filter.as_deref().map_or(true, |t| d.tier == t))
        .filter(|d| group_filter.map_or(true, |g| d.tier_group == g))
        .filter(|d| match special {
            Some("slow_buy") => d.flags.slow_buy,
            Some("one_gp_dump") => d.flags.one_gp_dump,
            Some("super") => d.flags.super_dump,
            _ => true,
        })
        .filter(|d| {
            tenant
                .as_ref()
                .map_or(true, |t| t.tier_allowed(&d.tier) && t.tier_clears_minimum(&d.tier))
        })
        .cloned()
        .collect();

    if let Some(limit) = params.limit {
        dumps.truncate(limit);
    }

    Ok(Json(DumpsResponse {
        generation: views.generation,
        built_at: views.built_at,
        count: dumps.len(),
        dumps,
    }))
}

#[derive(Debug, Serialize)]
pub struct DumpDetailResponse {
    pub item_id: ItemId,
    pub item_name: String,
    pub dump: Option<DumpEvent>,
    pub snapshots: Vec<Snapshot>,
}

pub async fn get_dump_item(
    Path(item_id): Path<ItemId>,
    State(state): State<AppState>,
) -> Result<Json<DumpDetailResponse>, ApiError> {
    let Some(meta) = state.catalog.get(item_id) else {
        return Err(ApiError::NotFound);
    };

    let views = state.views.load();
    let dump = views.dumps.iter().find(|d| d.item_id == item_id).cloned();

    let since = Utc::now().timestamp() - 86_400;
    let snapshots = state
        .store
        .range(SnapshotKind::FiveMinute, item_id, since)
        .map_err(|_| ApiError::Internal)?;

    Ok(Json(DumpDetailResponse {
        item_id,
        item_name: meta.name,
        dump,
        snapshots,
    }))
}

#[derive(Debug, Serialize)]
pub struct SpikesResponse {
    pub generation: u64,
    pub built_at: i64,
    pub count: usize,
    pub spikes: Vec<SpikeEvent>,
}

pub async fn get_spikes(State(state): State<AppState>) -> Json<SpikesResponse> {
    let views = state.views.load();
    Json(SpikesResponse {
        generation: views.generation,
        built_at: views.built_at,
        count: views.spikes.len(),
        spikes: views.spikes.clone(),
    })
}

#[derive(Debug, Deserialize)]
pub struct AllItemsQuery {
    pub time_window: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AllItemsResponse {
    pub generation: u64,
    pub count: usize,
    pub items: Vec<ItemTicker>,
}

pub async fn get_all_items(
    Query(params): Query<AllItemsQuery>,
    State(state): State<AppState>,
) -> Result<Json<AllItemsResponse>, ApiError> {
    let window = params.time_window.unwrap_or(300);
    if !(1..=7 * 86_400).contains(&window) {
        return Err(ApiError::BadRequest("invalid time window".to_string()));
    }

    let cutoff = Utc::now().timestamp() - window;
    let views = state.views.load();
    let items: Vec<ItemTicker> = views
        .all_items
        .iter()
        .filter(|i| i.timestamp >= cutoff)
        .cloned()
        .collect();

    Ok(Json(AllItemsResponse {
        generation: views.generation,
        count: items.len(),
        items,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TiersQuery {
    pub guild_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TiersResponse {
    pub tiers: Vec<Tier>,
    pub min_tier_name: Option<String>,
    pub settings: Option<Vec<TierSettingRow>>,
}

pub async fn get_tiers(
    Query(params): Query<TiersQuery>,
    State(state): State<AppState>,
) -> Result<Json<TiersResponse>, ApiError> {
    let (min_tier_name, settings) = match &params.guild_id {
        Some(guild_id) => {
            let config = state.tenants.get(guild_id, false)?;
            let rows = state
                .store
                .tier_settings_for(guild_id)
                .map_err(|_| ApiError::Internal)?;
            (config.min_tier_name.clone(), Some(rows))
        }
        None => (None, None),
    };

    Ok(Json(TiersResponse {
        tiers: TIERS.to_vec(),
        min_tier_name,
        settings,
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub upstream: &'static str,
    pub consecutive_errors: u32,
    pub last_success_ts: i64,
    pub generation: u64,
    pub built_at: i64,
    pub catalog_items: usize,
    pub counts: StoreCounts,
}

pub async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let views = state.views.load();
    let consecutive_errors = state.health.consecutive_errors();
    let counts = state.store.counts().unwrap_or_default();

    Json(HealthResponse {
        status: "ok",
        upstream: if consecutive_errors == 0 { "ok" } else { "degraded" },
        consecutive_errors,
        last_success_ts: state.health.last_success_ts(),
        generation: views.generation,
        built_at: views.built_at,
        catalog_items: state.catalog.len(),
        counts,
    })
}

pub async fn get_tenant_config(
    Path(tenant_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TenantConfig>, ApiError> {
    let config = state.tenants.get(&tenant_id, true)?;
    Ok(Json(config.redacted()))
}

pub async fn put_tenant_config(
    Path(tenant_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TenantConfig>, JsonRejection>,
) -> Result<Json<TenantConfig>, ApiError> {
    crate::tenants::validation::validate_tenant_id(&tenant_id)?;
    authorize_tenant_write(&state, &headers, &tenant_id)?;

    let Json(mut incoming) =
        payload.map_err(|_| ApiError::BadRequest("invalid request body".to_string()))?;

    // the admin token is never settable over the wire: keep the
    // existing one, or mint a fresh one for a new document
    incoming.admin_token = match state.tenants.get(&tenant_id, false) {
        Ok(existing) => existing.admin_token.clone(),
        Err(_) => TenantConfig::default().admin_token,
    };

    let stored = state.tenants.put(&tenant_id, incoming)?;
    Ok(Json(stored.redacted()))
}

#[derive(Debug, Serialize)]
pub struct WatchlistResponse {
    pub tenant_id: String,
    pub count: usize,
    pub entries: Vec<WatchlistEntry>,
}

pub async fn get_watchlist(
    Path(tenant_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<WatchlistResponse>, ApiError> {
    crate::tenants::validation::validate_tenant_id(&tenant_id)?;
    let entries = state
        .store
        .watchlist_for_tenant(&tenant_id)
        .map_err(|_| ApiError::Internal)?;
    Ok(Json(WatchlistResponse {
        count: entries.len(),
        tenant_id,
        entries,
    }))
}

#[derive(Debug, Deserialize)]
pub struct WatchlistAdd {
    pub user_id: Option<String>,
    pub item_id: ItemId,
}

fn validate_user_id(user_id: &Option<String>) -> Result<(), ApiError> {
    if let Some(user_id) = user_id {
        let ok = (17..=19).contains(&user_id.len())
            && user_id.chars().all(|c| c.is_ascii_digit());
        if !ok {
            return Err(ApiError::BadRequest("invalid user id".to_string()));
        }
    }
    Ok(())
}

pub async fn post_watchlist(
    Path(tenant_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<WatchlistAdd>, JsonRejection>,
) -> Result<Json<WatchlistEntry>, ApiError> {
    crate::tenants::validation::validate_tenant_id(&tenant_id)?;
    authorize_tenant_write(&state, &headers, &tenant_id)?;

    let Json(body) =
        payload.map_err(|_| ApiError::BadRequest("invalid request body".to_string()))?;
    validate_user_id(&body.user_id)?;

    let Some(meta) = state.catalog.get(body.item_id) else {
        return Err(ApiError::NotFound);
    };

    let entry = WatchlistEntry {
        id: None,
        tenant_id,
        user_id: body.user_id,
        item_id: body.item_id,
        item_name: meta.name,
    };
    state
        .store
        .watchlist_add(&entry)
        .map_err(|_| ApiError::Internal)?;
    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
pub struct WatchlistRemove {
    pub user_id: Option<String>,
    pub item_id: ItemId,
}

pub async fn delete_watchlist(
    Path(tenant_id): Path<String>,
    Query(params): Query<WatchlistRemove>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    crate::tenants::validation::validate_tenant_id(&tenant_id)?;
    authorize_tenant_write(&state, &headers, &tenant_id)?;
    validate_user_id(&params.user_id)?;

    let removed = state
        .store
        .watchlist_remove(&tenant_id, params.user_id.as_deref(), params.item_id)
        .map_err(|_| ApiError::Internal)?;
    if !removed {
        return Err(ApiError::NotFound);
    }
    Ok(Json(serde_json::json!({ "removed": true })))
}
