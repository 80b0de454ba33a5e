use crate::app::marketplace_service::{MarketplaceError, RecordPurchase, DEFAULT_REPORT_PERIOD_DAYS};
use crate::domain::commission::{calculate_commission, commission_breakdown};
use crate::transport::http::handlers::common::{error_response, header_str, USER_ID_HEADER};
use crate::transport::http::types::{
    ApiResponse, AppState, CommissionQuery, CommissionReportQuery, PurchaseCheckQuery, TransactionsQuery,
};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde_json::json;

fn invalid_input(message: impl Into<String>) -> Response {
    error_response(StatusCode::BAD_REQUEST, "BAD_REQUEST", "BAD_REQUEST", message, None)
}

#[utoipa::path(
    get,
    path = "/api/marketplace/commission",
    params(CommissionQuery),
    responses(
        (status = 200, description = "Commission split and display breakdown", body = ApiResponse),
        (status = 400, description = "Missing or invalid amount", body = ErrorBody)
    )
)]
pub async fn commission_handler(query: Result<Query<CommissionQuery>, QueryRejection>) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return invalid_input(e.body_text()),
    };
    if !query.amount.is_finite() || query.amount < 0.0 {
        return invalid_input("amount must be a non-negative number");
    }

    let data = json!({
        "commission": calculate_commission(query.amount),
        "breakdown": commission_breakdown(query.amount),
    });
    (StatusCode::OK, Json(ApiResponse::ok(data))).into_response()
}

#[utoipa::path(
    post,
    path = "/api/marketplace/transactions",
    request_body = RecordPurchase,
    params(
        ("x-user-id" = String, Header, description = "Authenticated buyer id")
    ),
    responses(
        (status = 201, description = "Purchase recorded", body = MarketplaceTransaction),
        (status = 400, description = "Invalid purchase", body = ErrorBody),
        (status = 401, description = "No authenticated user", body = ErrorBody),
        (status = 409, description = "Signature already recorded", body = ErrorBody),
        (status = 429, description = "Too many purchase attempts", body = ErrorBody)
    )
)]
pub async fn record_purchase_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<RecordPurchase>, JsonRejection>,
) -> Response {
    let buyer = header_str(&headers, USER_ID_HEADER);
    if buyer.is_none() {
        return MarketplaceError::Unauthorized.into_response();
    }
    let Json(input) = match body {
        Ok(b) => b,
        Err(e) => return invalid_input(format!("Invalid JSON body: {}", e.body_text())),
    };

    match state.marketplace.record_purchase(buyer, input).await {
        Ok(tx) => (StatusCode::CREATED, Json(tx)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/marketplace/transactions",
    params(
        TransactionsQuery,
        ("x-user-id" = String, Header, description = "Authenticated user id")
    ),
    responses(
        (status = 200, description = "User transactions, newest first", body = [MarketplaceTransaction]),
        (status = 401, description = "No authenticated user", body = ErrorBody)
    )
)]
pub async fn list_transactions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<TransactionsQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return invalid_input(e.body_text()),
    };
    match state
        .marketplace
        .user_transactions(header_str(&headers, USER_ID_HEADER), query.filter)
        .await
    {
        Ok(txs) => (StatusCode::OK, Json(txs)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/marketplace/purchases",
    params(
        PurchaseCheckQuery,
        ("x-user-id" = Option<String>, Header, description = "Authenticated user id")
    ),
    responses(
        (status = 200, description = "Whether the caller owns the item", body = ApiResponse),
        (status = 400, description = "Missing itemId or itemType", body = ErrorBody)
    )
)]
pub async fn check_purchase_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<PurchaseCheckQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return invalid_input(e.body_text()),
    };
    match state
        .marketplace
        .has_purchased(header_str(&headers, USER_ID_HEADER), &query.item_id, query.item_type)
        .await
    {
        Ok(purchased) => (
            StatusCode::OK,
            Json(ApiResponse::ok(json!({ "hasPurchased": purchased }))),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/marketplace/stats",
    responses(
        (status = 200, description = "Totals over completed transactions", body = MarketplaceStats)
    )
)]
pub async fn stats_handler(State(state): State<AppState>) -> Response {
    match state.marketplace.stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/commission-report",
    params(CommissionReportQuery),
    responses(
        (status = 200, description = "Commission report as JSON, or HTML with format=html", body = CommissionReport),
        (status = 400, description = "Invalid period", body = ErrorBody)
    )
)]
pub async fn commission_report_handler(
    State(state): State<AppState>,
    query: Result<Query<CommissionReportQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return invalid_input(e.body_text()),
    };
    let period = match query.period.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_REPORT_PERIOD_DAYS,
        Some(raw) => match raw.parse::<i64>() {
            Ok(days) => days,
            Err(_) => return invalid_input(format!("Invalid period: {}", raw)),
        },
    };

    let report = match state.marketplace.commission_report(period).await {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };
    tracing::info!(
        period_days = period,
        transactions = report.summary.transaction_count,
        "commission report generated"
    );

    match query.format.as_deref() {
        Some("html") => Html(report.to_html(&state.treasury)).into_response(),
        _ => (StatusCode::OK, Json(report)).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/notification-queue",
    responses(
        (status = 200, description = "Pending notification batches", body = QueueStatus)
    )
)]
pub async fn notification_queue_handler(State(state): State<AppState>) -> Response {
    let status = state.notifications.queue_status().await;
    (StatusCode::OK, Json(status)).into_response()
}
