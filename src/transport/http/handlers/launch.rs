use crate::app::launch_service::{LaunchOutcome, LaunchStage, LaunchTokenParams};
use crate::transport::http::types::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

/// Client mistakes (bad input, wrong key) are 400; failures of the launch API are 502.
fn outcome_status(outcome: &LaunchOutcome) -> StatusCode {
    match outcome.stage {
        None => StatusCode::OK,
        Some(LaunchStage::Validate) | Some(LaunchStage::Sign) => StatusCode::BAD_REQUEST,
        Some(_) => StatusCode::BAD_GATEWAY,
    }
}

#[utoipa::path(
    post,
    path = "/api/tokens/launch",
    request_body = LaunchTokenParams,
    responses(
        (status = 200, description = "Token launched", body = LaunchOutcome),
        (status = 400, description = "Invalid parameters or signing key", body = LaunchOutcome),
        (status = 502, description = "Launch API step failed", body = LaunchOutcome)
    )
)]
pub async fn launch_token_handler(
    State(state): State<AppState>,
    params: Result<Json<LaunchTokenParams>, JsonRejection>,
) -> impl IntoResponse {
    let outcome = match params {
        Ok(Json(params)) => state.launch.launch_coin(params).await,
        Err(e) => LaunchOutcome {
            success: false,
            mint: None,
            pool_id: None,
            error: Some(format!("Invalid JSON body: {}", e)),
            stage: Some(LaunchStage::Validate),
        },
    };
    (outcome_status(&outcome), Json(outcome))
}
