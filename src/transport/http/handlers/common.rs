use crate::app::marketplace_service::MarketplaceError;
use crate::app::settlement_service::SettlementError;
use crate::transport::http::types::ErrorBody;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

pub const API_KEY_HEADER: &str = "x-api-key";
/// Identity forwarded by the session layer in front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn error_response(
    status: StatusCode,
    error: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            code: code.to_string(),
            message: message.into(),
            details,
        }),
    )
        .into_response()
}

pub fn settlement_status(err: &SettlementError) -> StatusCode {
    match err {
        SettlementError::MissingApiKey | SettlementError::InvalidApiKey => StatusCode::UNAUTHORIZED,
        SettlementError::MissingParameters
        | SettlementError::InvalidRecipient
        | SettlementError::InsufficientBalance { .. }
        | SettlementError::InsufficientTokens { .. } => StatusCode::BAD_REQUEST,
        SettlementError::WalletNotFound => StatusCode::NOT_FOUND,
        SettlementError::TransactionFailed(_) | SettlementError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for SettlementError {
    fn into_response(self) -> Response {
        if matches!(self, SettlementError::TransactionFailed(_) | SettlementError::Internal(_)) {
            tracing::error!(error = %self, "send tokens failed");
        }
        error_response(
            settlement_status(&self),
            self.kind(),
            self.code(),
            self.message(),
            self.details(),
        )
    }
}

impl IntoResponse for MarketplaceError {
    fn into_response(self) -> Response {
        let status = match &self {
            MarketplaceError::Unauthorized => StatusCode::UNAUTHORIZED,
            MarketplaceError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            MarketplaceError::Conflict => StatusCode::CONFLICT,
            MarketplaceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            MarketplaceError::Internal(e) => {
                tracing::error!(error = %e, "marketplace request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &self {
            MarketplaceError::Internal(_) => "Marketplace request failed".to_string(),
            other => other.to_string(),
        };
        error_response(status, self.code(), self.code(), message, None)
    }
}
