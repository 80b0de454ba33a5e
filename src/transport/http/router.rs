use crate::app::launch_service::{LaunchOutcome, LaunchStage, LaunchTokenParams};
use crate::app::marketplace_service::{
    CommissionReport, DateRange, MarketplaceStats, RecentTransaction, RecordPurchase,
    ReportBreakdown, ReportBucket, ReportSummary,
};
use crate::app::notification_manager::QueueStatus;
use crate::app::settlement_service::{TransferDetails, TransferReceipt};
use crate::domain::commission::{Commission, CommissionBreakdown, RawBreakdown};
use crate::domain::marketplace::{ItemType, MarketplaceTransaction, TransactionFilter, TransactionStatus};
use crate::transport::http::handlers::{health, launch, marketplace, tokens};
use crate::transport::http::types::{
    ApiResponse, AppState, ErrorBody, SendTokensBody, SendTokensResponse,
};
use axum::routing::{get, post};
use axum::Router;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck_handler,
        tokens::send_tokens_handler,
        launch::launch_token_handler,
        marketplace::commission_handler,
        marketplace::record_purchase_handler,
        marketplace::list_transactions_handler,
        marketplace::check_purchase_handler,
        marketplace::stats_handler,
        marketplace::commission_report_handler,
        marketplace::notification_queue_handler
    ),
    components(schemas(
        ApiResponse,
        ErrorBody,
        SendTokensBody,
        SendTokensResponse,
        TransferReceipt,
        TransferDetails,
        LaunchTokenParams,
        LaunchOutcome,
        LaunchStage,
        Commission,
        CommissionBreakdown,
        RawBreakdown,
        RecordPurchase,
        ItemType,
        TransactionStatus,
        TransactionFilter,
        MarketplaceTransaction,
        MarketplaceStats,
        CommissionReport,
        DateRange,
        ReportSummary,
        ReportBreakdown,
        ReportBucket,
        RecentTransaction,
        QueueStatus
    ))
)]
pub struct ApiDoc;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::healthcheck_handler))
        .route("/api/solana/send-tokens", post(tokens::send_tokens_handler))
        .route("/api/tokens/launch", post(launch::launch_token_handler))
        .route("/api/marketplace/commission", get(marketplace::commission_handler))
        .route(
            "/api/marketplace/transactions",
            post(marketplace::record_purchase_handler).get(marketplace::list_transactions_handler),
        )
        .route("/api/marketplace/purchases", get(marketplace::check_purchase_handler))
        .route("/api/marketplace/stats", get(marketplace::stats_handler))
        .route(
            "/api/admin/commission-report",
            get(marketplace::commission_report_handler),
        )
        .route(
            "/api/admin/notification-queue",
            get(marketplace::notification_queue_handler),
        )
        .with_state(app_state)
}
