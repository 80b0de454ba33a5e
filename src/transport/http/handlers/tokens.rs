use crate::app::settlement_service::SendTokensRequest;
use crate::transport::http::handlers::common::{header_str, API_KEY_HEADER};
use crate::transport::http::types::{AppState, SendTokensResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value as JsonValue;

#[utoipa::path(
    post,
    path = "/api/solana/send-tokens",
    request_body = SendTokensBody,
    params(
        ("x-api-key" = String, Header, description = "Agent API key")
    ),
    responses(
        (status = 200, description = "Transfer confirmed", body = SendTokensResponse),
        (status = 400, description = "Missing parameters or insufficient balance", body = ErrorBody),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 404, description = "Agent has no active wallet", body = ErrorBody),
        (status = 500, description = "Transfer failed", body = ErrorBody)
    )
)]
pub async fn send_tokens_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> impl IntoResponse {
    // Authentication comes first so an unauthenticated caller learns nothing about the body.
    let agent = match state
        .settlement
        .authenticate(header_str(&headers, API_KEY_HEADER))
        .await
    {
        Ok(agent) => agent,
        Err(e) => return e.into_response(),
    };

    let body = body.ok().map(|Json(v)| v);
    let request = match SendTokensRequest::from_json(body.as_ref()) {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    match state.settlement.send_tokens(&agent, &request).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(SendTokensResponse {
                success: true,
                code: "SUCCESS_001".to_string(),
                data: receipt,
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
