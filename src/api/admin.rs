//! Admin endpoints. Everything here sits behind the admin gate.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::models::Snapshot;
use crate::store::{DbHealth, SnapshotKind};

use super::{ApiError, AppState};

const FIVE_MINUTES: i64 = 300;
const MAX_BACKFILL_HOURS: u32 = 24;

#[derive(Debug, Deserialize)]
pub struct FetchRecentRequest {
    pub hours: u32,
}

#[derive(Debug, Serialize)]
pub struct FetchRecentResponse {
    pub scheduled_windows: usize,
}

/// Backfill recent 5m windows from the upstream archive. The fetch
/// loop runs in the background; this returns once it is scheduled.
pub async fn fetch_recent(
    State(state): State<AppState>,
    payload: Result<Json<FetchRecentRequest>, JsonRejection>,
) -> Result<Json<FetchRecentResponse>, ApiError> {
    let Json(req) =
        payload.map_err(|_| ApiError::BadRequest("invalid request body".to_string()))?;
    if req.hours == 0 || req.hours > MAX_BACKFILL_HOURS {
        return Err(ApiError::BadRequest("hours must be within [1, 24]".to_string()));
    }

    let now = Utc::now().timestamp();
    let aligned_now = now - now.rem_euclid(FIVE_MINUTES);
    let windows: Vec<i64> = (1..=(req.hours as i64 * 12))
        .map(|i| aligned_now - i * FIVE_MINUTES)
        .collect();
    let scheduled = windows.len();

    let feed = state.feed.clone();
    let store = state.store.clone();
    tokio::spawn(async move {
        let mut inserted = 0usize;
        let mut failed = 0usize;
        for ts in windows {
            match feed.fetch_5m_at(ts).await {
                Ok((data, window_ts)) => {
                    let batch: Vec<Snapshot> = data
                        .into_iter()
                        .map(|(item_id, stats)| Snapshot {
                            item_id,
                            timestamp: window_ts,
                            low: stats.avg_low,
                            high: stats.avg_high,
                            volume: Some(stats.volume),
                        })
                        .collect();
                    match store.put_snapshots(SnapshotKind::FiveMinute, &batch) {
                        Ok(n) => inserted += n,
                        Err(e) => {
                            warn!(error = %e, "backfill store write failed");
                            failed += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(window_ts = ts, error = %e, "backfill window fetch failed");
                    failed += 1;
                }
            }
        }
        info!(inserted, failed, "backfill complete");
    });

    Ok(Json(FetchRecentResponse {
        scheduled_windows: scheduled,
    }))
}

#[derive(Debug, Serialize)]
pub struct PruneResponse {
    pub removed: usize,
}

pub async fn db_prune(State(state): State<AppState>) -> Result<Json<PruneResponse>, ApiError> {
    let retention = state.config.load().retention_seconds();
    let removed = state.store.prune(retention).map_err(|e| {
        warn!(error = %e, "manual prune failed");
        ApiError::Internal
    })?;
    Ok(Json(PruneResponse { removed }))
}

pub async fn db_health(State(state): State<AppState>) -> Result<Json<DbHealth>, ApiError> {
    state.store.db_health().map(Json).map_err(|e| {
        warn!(error = %e, "db health check failed");
        ApiError::Internal
    })
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub reloaded: bool,
}

/// Re-read configuration from disk/env and swap it in atomically.
/// Running loops pick the new thresholds up on their next tick.
pub async fn config_reload(
    State(state): State<AppState>,
) -> Result<Json<ReloadResponse>, ApiError> {
    let fresh = Config::load().map_err(|e| {
        warn!(error = %e, "config reload rejected");
        ApiError::BadRequest("config reload failed validation".to_string())
    })?;
    state.config.store(std::sync::Arc::new(fresh));
    info!("configuration reloaded");
    Ok(Json(ReloadResponse { reloaded: true }))
}

#[derive(Debug, Serialize)]
pub struct TenantListResponse {
    pub count: usize,
    pub tenants: Vec<String>,
}

pub async fn list_tenants(
    State(state): State<AppState>,
) -> Result<Json<TenantListResponse>, ApiError> {
    let tenants = state.tenants.list().map_err(|_| ApiError::Internal)?;
    Ok(Json(TenantListResponse {
        count: tenants.len(),
        tenants,
    }))
}

#[derive(Debug, Serialize)]
pub struct TenantActionResponse {
    pub tenant_id: String,
    pub banned: bool,
}

pub async fn ban_tenant(
    Path(tenant_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TenantActionResponse>, ApiError> {
    let config = state.tenants.ban(&tenant_id)?;
    Ok(Json(TenantActionResponse {
        tenant_id,
        banned: config.banned,
    }))
}

pub async fn unban_tenant(
    Path(tenant_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TenantActionResponse>, ApiError> {
    let config = state.tenants.unban(&tenant_id)?;
    Ok(Json(TenantActionResponse {
        tenant_id,
        banned: config.banned,
    }))
}

pub async fn delete_tenant(
    Path(tenant_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state.tenants.delete(&tenant_id)?;
    if !deleted {
        return Err(ApiError::NotFound);
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
