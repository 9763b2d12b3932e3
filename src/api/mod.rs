//! Read API and admin surface.
//!
//! Public routes serve frozen view generations and tenant-scoped
//! reads; admin routes are gated by a constant-time key check plus a
//! private-network source check. Every error maps to a short, generic
//! body: no stack traces, no secrets, no paths.

pub mod admin;
pub mod routes;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, DefaultBodyLimit, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use subtle::ConstantTimeEq;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::catalog::ItemCatalog;
use crate::config::SharedConfig;
use crate::feeds::PriceFeedClient;
use crate::middleware::{rate_limit_middleware, request_logging, IpRateLimiter};
use crate::scheduler::PipelineHealth;
use crate::store::PriceStore;
use crate::tenants::{TenantStore, TenantStoreError, ValidationError};
use crate::views::MarketViews;

/// Writes larger than this are rejected outright.
const MAX_WRITE_BODY_BYTES: usize = 10 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: SharedConfig,
    pub store: Arc<PriceStore>,
    pub catalog: Arc<ItemCatalog>,
    pub views: Arc<MarketViews>,
    pub tenants: Arc<TenantStore>,
    pub feed: Arc<PriceFeedClient>,
    pub health: Arc<PipelineHealth>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound,
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<TenantStoreError> for ApiError {
    fn from(err: TenantStoreError) -> Self {
        match err {
            TenantStoreError::Invalid(v) => ApiError::BadRequest(v.to_string()),
            TenantStoreError::NotFound => ApiError::NotFound,
            TenantStoreError::Io(_) | TenantStoreError::Corrupt(_) => {
                warn!(error = %err, "tenant store failure");
                ApiError::Internal
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

/// Constant-time comparison; length mismatch fails without branching
/// on content.
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

fn is_private_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private(),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

/// Gate for `/api/admin/*`: private source address (unless explicitly
/// opened) and a constant-time admin key match. An unset key denies
/// everything.
async fn admin_gate(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let config = state.config.load();

    if !config.admin_allow_public && !is_private_address(addr.ip()) {
        return Err(ApiError::Forbidden);
    }

    let Some(expected) = config.admin_key.clone() else {
        return Err(ApiError::Unauthorized);
    };
    let provided = request
        .headers()
        .get("X-Admin-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !constant_time_eq(provided, &expected) {
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Authorize a tenant-scoped write: the global admin key or the
/// tenant's own token.
pub(crate) fn authorize_tenant_write(
    state: &AppState,
    headers: &axum::http::HeaderMap,
    tenant_id: &str,
) -> Result<(), ApiError> {
    let config = state.config.load();

    if let Some(expected) = config.admin_key.as_deref() {
        let provided = headers
            .get("X-Admin-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !provided.is_empty() && constant_time_eq(provided, expected) {
            return Ok(());
        }
    }

    let provided = headers
        .get("X-Tenant-Token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !provided.is_empty() {
        if let Ok(existing) = state.tenants.get(tenant_id, false) {
            if constant_time_eq(provided, &existing.admin_token) {
                return Ok(());
            }
        }
    }

    Err(ApiError::Unauthorized)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    if parsed.is_empty() {
        CorsLayer::new()
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(parsed))
    }
}

/// Assemble the full HTTP surface.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.load();
    let public_limiter = IpRateLimiter::new(config.public_quota);
    let admin_limiter = IpRateLimiter::new(config.admin_quota);
    spawn_limiter_cleanup(vec![public_limiter.clone(), admin_limiter.clone()]);

    let admin_routes = Router::new()
        .route("/cache/fetch_recent", post(admin::fetch_recent))
        .route("/db_prune", post(admin::db_prune))
        .route("/db_health", get(admin::db_health))
        .route("/config/reload", post(admin::config_reload))
        .route("/tenants", get(admin::list_tenants))
        .route("/tenants/:tenant/ban", post(admin::ban_tenant))
        .route("/tenants/:tenant/unban", post(admin::unban_tenant))
        .route("/tenants/:tenant", delete(admin::delete_tenant))
        .layer(middleware::from_fn_with_state(state.clone(), admin_gate))
        .layer(middleware::from_fn_with_state(
            admin_limiter,
            rate_limit_middleware,
        ));

    let public_routes = Router::new()
        .route("/top", get(routes::get_top))
        .route("/dumps", get(routes::get_dumps))
        .route("/dumps/:item_id", get(routes::get_dump_item))
        .route("/spikes", get(routes::get_spikes))
        .route("/all_items", get(routes::get_all_items))
        .route("/tiers", get(routes::get_tiers))
        .route("/health", get(routes::get_health))
        .route(
            "/config/:tenant",
            get(routes::get_tenant_config).post(routes::put_tenant_config),
        )
        .route(
            "/watchlist/:tenant",
            get(routes::get_watchlist)
                .post(routes::post_watchlist)
                .delete(routes::delete_watchlist),
        )
        .layer(middleware::from_fn_with_state(
            public_limiter,
            rate_limit_middleware,
        ));

    Router::new()
        .nest("/api/admin", admin_routes)
        .nest("/api", public_routes)
        .layer(DefaultBodyLimit::max(MAX_WRITE_BODY_BYTES))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&config.cors_origins))
        .with_state(state)
}

/// Background sweep keeping the limiter maps bounded.
fn spawn_limiter_cleanup(limiters: Vec<IpRateLimiter>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            for limiter in &limiters {
                limiter.cleanup();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq("secret", "secret"));
        assert!(!constant_time_eq("secret", "secrets"));
        assert!(!constant_time_eq("secret", "secreT"));
        assert!(!constant_time_eq("", "x"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn private_address_ranges() {
        let cases = [
            ("127.0.0.1", true),
            ("10.1.2.3", true),
            ("172.16.0.1", true),
            ("172.31.255.255", true),
            ("192.168.1.1", true),
            ("8.8.8.8", false),
            ("172.32.0.1", false),
            ("::1", true),
            ("2001:db8::1", false),
        ];
        for (ip, expected) in cases {
            assert_eq!(
                is_private_address(ip.parse().unwrap()),
                expected,
                "case {ip}"
            );
        }
    }
}
