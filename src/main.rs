//! flipwatch - market event detector and alert router.
//!
//! Wires the pipeline together: price feed client, embedded store,
//! item catalog, event engine views, tenant store, alert router, and
//! the read API. Exit codes: 0 normal shutdown, 2 fatal config error,
//! 3 unrecoverable store error.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flipwatch_backend::{
    alerts::{egress::ChatEgress, AlertRouter, DiscordEgress, LogEgress},
    api::{build_router, AppState},
    catalog::ItemCatalog,
    config::{self, Config},
    feeds::PriceFeedClient,
    scheduler::{Pipeline, PipelineHealth},
    store::PriceStore,
    tenants::TenantStore,
    views::MarketViews,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    init_tracing();
    std::process::exit(run().await);
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run() -> i32 {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "fatal configuration error");
            return 2;
        }
    };
    info!(
        port = config.port,
        upstream = %config.upstream_base_url,
        ingest_period_secs = config.ingest_period_secs,
        "flipwatch starting"
    );

    let feed = match PriceFeedClient::new(&config.upstream_base_url, &config.user_agent) {
        Ok(feed) => Arc::new(feed),
        Err(e) => {
            error!(error = %e, "failed to build price feed client");
            return 2;
        }
    };

    let store = match PriceStore::new(&config.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "unrecoverable store error");
            return 3;
        }
    };

    let catalog = match ItemCatalog::new(&config.cache_root) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            error!(error = %e, "failed to initialize item catalog");
            return 2;
        }
    };

    let tenants = match TenantStore::new(&config.config_root, store.clone()) {
        Ok(tenants) => Arc::new(tenants),
        Err(e) => {
            error!(error = %e, "failed to initialize tenant store");
            return 2;
        }
    };

    let egress: Arc<dyn ChatEgress> = match &config.chat_bot_token {
        Some(token) => match DiscordEgress::new(&config.chat_api_base, token) {
            Ok(egress) => {
                info!("chat egress enabled");
                Arc::new(egress)
            }
            Err(e) => {
                error!(error = %e, "chat bot token rejected");
                return 2;
            }
        },
        None => {
            warn!("no chat bot token configured, alert delivery disabled");
            Arc::new(LogEgress)
        }
    };

    let views = Arc::new(MarketViews::new());
    let health = Arc::new(PipelineHealth::new());
    let router = Arc::new(AlertRouter::new(
        egress.clone(),
        catalog.clone(),
        store.clone(),
        config.ingest_period_secs,
    ));

    let port = config.port;
    let shared_config = config::shared(config);

    let pipeline = Arc::new(Pipeline {
        config: shared_config.clone(),
        feed: feed.clone(),
        store: store.clone(),
        catalog: catalog.clone(),
        views: views.clone(),
        tenants: tenants.clone(),
        router,
        egress: egress.clone(),
        health: health.clone(),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ingest = tokio::spawn(pipeline.clone().run_ingest_loop(shutdown_rx.clone()));
    let catalog_loop = tokio::spawn(pipeline.clone().run_catalog_loop(shutdown_rx.clone()));
    let prune_loop = tokio::spawn(pipeline.clone().run_prune_loop(shutdown_rx.clone()));

    let app_state = AppState {
        config: shared_config,
        store,
        catalog,
        views,
        tenants,
        feed,
        health,
    };
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, %addr, "failed to bind API listener");
            return 2;
        }
    };
    info!(%addr, "read API listening");

    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        let service = app.into_make_service_with_connect_info::<SocketAddr>();
        if let Err(e) = axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await
        {
            error!(error = %e, "API server exited with error");
        }
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }

    let _ = shutdown_tx.send(true);
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = tokio::join!(ingest, catalog_loop, prune_loop, server);
    })
    .await;
    if drained.is_err() {
        warn!("shutdown grace period elapsed, exiting with tasks in flight");
    }

    info!("flipwatch stopped");
    0
}
