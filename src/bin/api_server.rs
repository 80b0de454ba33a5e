// src/bin/api_server.rs

use std::sync::Arc;
use swarms_settlement::infra::launch::LaunchApiClient;
use swarms_settlement::infra::logging::setup_tracing;
use swarms_settlement::solana::{Ledger, RpcLedger};
use swarms_settlement::storage::Stores;
use swarms_settlement::transport;
use swarms_settlement::{
    Config, LaunchService, MarketplaceService, MemoryStore, NotificationManager, PgStore, Reconciler,
    SettlementService, WalletCipher,
};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    let config = Config::from_env()?;

    // --- Store Initialization ---
    let stores = match config.database_url.as_deref() {
        Some(url) => {
            tracing::info!("connecting to Postgres");
            Stores::from_backend(Arc::new(PgStore::connect(url).await?))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store (data is lost on restart)");
            Stores::from_backend(Arc::new(MemoryStore::new()))
        }
    };

    let ledger: Arc<dyn Ledger> = Arc::new(RpcLedger::new(config.solana_rpc_url.clone()));

    let cipher = match config.wallet_encryption_key.as_deref() {
        Some(key) => Some(WalletCipher::from_base64_key(key)?),
        None => {
            tracing::warn!("WALLET_ENCRYPTION_KEY not set; token transfers will fail");
            None
        }
    };

    // --- Service Initialization ---
    let notifications = Arc::new(NotificationManager::new(
        stores.notifications.clone(),
        config.notification_batch_delay,
        config.notification_max_batch_size,
    ));
    let flush_task = notifications.clone().start_background_flush_task();

    let reconciler = Arc::new(Reconciler::new(
        stores.agents.clone(),
        ledger.clone(),
        config.reconcile_interval,
        config.reconcile_expiry,
    ));
    let reconcile_task = reconciler.clone().start_background_task();

    let settlement = Arc::new(SettlementService::new(
        stores.agents.clone(),
        ledger,
        cipher,
        config.token_mint,
        config.treasury,
        config.confirm_poll_interval,
    ));
    let launch = Arc::new(LaunchService::new(LaunchApiClient::new(
        config.launch_api_base_url.clone(),
    )?));
    let marketplace = Arc::new(MarketplaceService::new(
        stores.marketplace.clone(),
        notifications.clone(),
    ));

    let app_state = transport::http::AppState {
        health: stores.health.clone(),
        settlement,
        launch,
        marketplace,
        notifications: notifications.clone(),
        treasury: config.treasury.to_string(),
    };

    // --- API Server Initialization ---
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let app = transport::http::create_router(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", transport::http::ApiDoc::openapi()))
        .layer(cors);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "API server listening");
    tracing::info!("Swagger UI available at /swagger-ui");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, flushing pending notifications");
            let delivered = notifications.flush().await;
            tracing::info!(delivered, "notification queue flushed");
            notifications.shutdown();
            reconciler.shutdown();
            let _ = tokio::join!(flush_task, reconcile_task);
            tracing::info!("graceful shutdown complete");
        }
    }

    Ok(())
}
