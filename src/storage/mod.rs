//! Persistence seams. Services hold these as trait objects so the same code runs against
//! Postgres and the in-memory store.

pub mod memory;
pub mod postgres;

use crate::domain::marketplace::{
    ItemType, MarketplaceTransaction, NewMarketplaceTransaction, TransactionFilter,
};
use crate::domain::notification::{NewNotification, Notification, NotificationPreferences};
use crate::domain::settlement::{
    AgentRecord, AgentWallet, NewSettlement, SettlementRecord, SettlementStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Raised when a marketplace transaction signature is already recorded.
#[derive(Debug, thiserror::Error)]
#[error("transaction signature already recorded")]
pub struct DuplicateSignature;

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn ping(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Looks up an active agent by its API key.
    async fn find_active_agent(&self, api_key: &str) -> anyhow::Result<Option<AgentRecord>>;

    async fn find_active_wallet(&self, agent_id: &str) -> anyhow::Result<Option<AgentWallet>>;

    async fn insert_settlement(&self, entry: &NewSettlement) -> anyhow::Result<i64>;

    async fn update_settlement_status(
        &self,
        transaction_hash: &str,
        status: SettlementStatus,
        error: Option<&str>,
    ) -> anyhow::Result<()>;

    async fn find_settlement(&self, transaction_hash: &str) -> anyhow::Result<Option<SettlementRecord>>;

    async fn pending_settlements(&self) -> anyhow::Result<Vec<SettlementRecord>>;
}

#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    async fn find_transaction_by_signature(
        &self,
        signature: &str,
    ) -> anyhow::Result<Option<MarketplaceTransaction>>;

    /// Writes the transaction row and the buyer's purchase row together.
    ///
    /// Fails if the signature was already recorded.
    async fn insert_transaction_with_purchase(
        &self,
        tx: NewMarketplaceTransaction,
    ) -> anyhow::Result<MarketplaceTransaction>;

    /// Newest first.
    async fn list_transactions(
        &self,
        user_id: &str,
        filter: TransactionFilter,
    ) -> anyhow::Result<Vec<MarketplaceTransaction>>;

    /// Completed transactions created in `[since, until]`, newest first. `None` bounds are open.
    async fn completed_transactions(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<MarketplaceTransaction>>;

    async fn has_purchased(&self, user_id: &str, item_id: &str, item_type: ItemType) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn preferences(&self, user_id: &str) -> anyhow::Result<Option<NotificationPreferences>>;

    /// Inserts the batch as `unread`.
    async fn insert_notifications(
        &self,
        user_id: &str,
        notifications: &[NewNotification],
    ) -> anyhow::Result<()>;

    /// Newest first.
    async fn list_notifications(&self, user_id: &str, limit: i64) -> anyhow::Result<Vec<Notification>>;
}

/// One backend seen through every persistence seam.
#[derive(Clone)]
pub struct Stores {
    pub health: Arc<dyn HealthProbe>,
    pub agents: Arc<dyn AgentStore>,
    pub marketplace: Arc<dyn MarketplaceStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Stores {
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: HealthProbe + AgentStore + MarketplaceStore + NotificationStore + 'static,
    {
        Self {
            health: backend.clone(),
            agents: backend.clone(),
            marketplace: backend.clone(),
            notifications: backend,
        }
    }
}
