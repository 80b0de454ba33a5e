use crate::app::launch_service::LaunchService;
use crate::app::marketplace_service::MarketplaceService;
use crate::app::notification_manager::NotificationManager;
use crate::app::settlement_service::{SettlementService, TransferReceipt};
use crate::domain::marketplace::{ItemType, TransactionFilter};
use crate::storage::HealthProbe;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

#[derive(Clone)]
pub struct AppState {
    pub health: Arc<dyn HealthProbe>,
    pub settlement: Arc<SettlementService>,
    pub launch: Arc<LaunchService>,
    pub marketplace: Arc<MarketplaceService>,
    pub notifications: Arc<NotificationManager>,
    /// Treasury owner address, shown in reports.
    pub treasury: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn ok(data: JsonValue) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Error body shared by the settlement and marketplace routes.
#[derive(Serialize, Debug, ToSchema)]
pub struct ErrorBody {
    /// Error kind, e.g. `UNAUTHORIZED`.
    pub error: String,
    /// Stable machine code, e.g. `AUTH_001`.
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub details: Option<JsonValue>,
}

/// Body of `POST /api/solana/send-tokens`. `amount` and `solanaFee` may be numbers or numeric
/// strings.
#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct SendTokensBody {
    pub recipient_address: String,
    #[schema(value_type = f64)]
    pub amount: JsonValue,
    #[schema(value_type = Option<f64>)]
    pub solana_fee: Option<JsonValue>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct SendTokensResponse {
    pub success: bool,
    pub code: String,
    pub data: TransferReceipt,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CommissionQuery {
    /// Sale amount in SOL.
    pub amount: f64,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionsQuery {
    /// `purchases`, `sales` or `all` (default).
    #[serde(default, rename = "type")]
    #[param(value_type = Option<String>)]
    pub filter: TransactionFilter,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseCheckQuery {
    pub item_id: String,
    #[param(value_type = String)]
    pub item_type: ItemType,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CommissionReportQuery {
    /// Days to look back; defaults to 7.
    pub period: Option<String>,
    /// `json` (default) or `html`.
    pub format: Option<String>,
}
