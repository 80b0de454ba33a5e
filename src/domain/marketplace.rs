use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Prompt,
    Agent,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Prompt => "prompt",
            ItemType::Agent => "agent",
        }
    }
}

impl FromStr for ItemType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prompt" => Ok(ItemType::Prompt),
            "agent" => Ok(ItemType::Agent),
            other => Err(anyhow::anyhow!("unknown item type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            other => Err(anyhow::anyhow!("unknown transaction status '{}'", other)),
        }
    }
}

/// Which side of a trade to list for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionFilter {
    Purchases,
    Sales,
    #[default]
    All,
}

impl TransactionFilter {
    pub fn matches(&self, user_id: &str, tx: &MarketplaceTransaction) -> bool {
        match self {
            TransactionFilter::Purchases => tx.buyer_id == user_id,
            TransactionFilter::Sales => tx.seller_id == user_id,
            TransactionFilter::All => tx.buyer_id == user_id || tx.seller_id == user_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewMarketplaceTransaction {
    pub buyer_id: String,
    pub seller_id: String,
    pub item_id: String,
    pub item_type: ItemType,
    pub amount: f64,
    pub platform_fee: f64,
    pub seller_amount: f64,
    pub usd_amount: Option<f64>,
    pub status: TransactionStatus,
    pub transaction_signature: String,
    pub buyer_wallet_address: String,
    pub seller_wallet_address: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceTransaction {
    pub id: i64,
    pub buyer_id: String,
    pub seller_id: String,
    pub item_id: String,
    pub item_type: ItemType,
    pub amount: f64,
    pub platform_fee: f64,
    pub seller_amount: f64,
    pub usd_amount: Option<f64>,
    pub status: TransactionStatus,
    pub transaction_signature: String,
    pub buyer_wallet_address: String,
    pub seller_wallet_address: String,
    pub created_at: DateTime<Utc>,
}

impl MarketplaceTransaction {
    pub fn from_new(id: i64, new: NewMarketplaceTransaction, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            buyer_id: new.buyer_id,
            seller_id: new.seller_id,
            item_id: new.item_id,
            item_type: new.item_type,
            amount: new.amount,
            platform_fee: new.platform_fee,
            seller_amount: new.seller_amount,
            usd_amount: new.usd_amount,
            status: new.status,
            transaction_signature: new.transaction_signature,
            buyer_wallet_address: new.buyer_wallet_address,
            seller_wallet_address: new.seller_wallet_address,
            created_at,
        }
    }
}
