//! In-process store used when no `DATABASE_URL` is configured, and by the test suites.
//!
//! State is lost on restart.

use crate::domain::marketplace::{
    ItemType, MarketplaceTransaction, NewMarketplaceTransaction, TransactionFilter,
};
use crate::domain::notification::{
    NewNotification, Notification, NotificationPreferences, NotificationStatus,
};
use crate::domain::settlement::{
    AgentRecord, AgentWallet, NewSettlement, SettlementRecord, SettlementStatus,
};
use crate::storage::{
    AgentStore, DuplicateSignature, HealthProbe, MarketplaceStore, NotificationStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    agents: HashMap<String, AgentRecord>,
    wallets: HashMap<String, AgentWallet>,
    settlements: Vec<SettlementRecord>,
    transactions: Vec<MarketplaceTransaction>,
    purchases: Vec<(String, String, ItemType, i64)>,
    notifications: Vec<Notification>,
    preferences: HashMap<String, NotificationPreferences>,
    next_id: i64,
    failing_notification_writes: usize,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an active agent reachable through `api_key`.
    pub async fn add_agent(&self, api_key: &str, agent_id: &str) {
        self.inner.lock().await.agents.insert(
            api_key.to_string(),
            AgentRecord {
                id: agent_id.to_string(),
            },
        );
    }

    pub async fn add_wallet(&self, wallet: AgentWallet) {
        self.inner
            .lock()
            .await
            .wallets
            .insert(wallet.agent_id.clone(), wallet);
    }

    pub async fn set_preferences(&self, user_id: &str, preferences: NotificationPreferences) {
        self.inner
            .lock()
            .await
            .preferences
            .insert(user_id.to_string(), preferences);
    }

    /// Makes the next `count` notification inserts fail.
    pub async fn fail_notification_writes(&self, count: usize) {
        self.inner.lock().await.failing_notification_writes = count;
    }

    /// Backdates a marketplace transaction; used to exercise reporting windows.
    pub async fn set_transaction_created_at(&self, signature: &str, created_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        if let Some(tx) = inner
            .transactions
            .iter_mut()
            .find(|tx| tx.transaction_signature == signature)
        {
            tx.created_at = created_at;
        }
    }

    /// Backdates a settlement row so it falls past the reconciliation expiry.
    pub async fn set_settlement_created_at(&self, transaction_hash: &str, created_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        if let Some(row) = inner
            .settlements
            .iter_mut()
            .find(|row| row.transaction_hash == transaction_hash)
        {
            row.created_at = created_at;
        }
    }

    pub async fn settlements(&self) -> Vec<SettlementRecord> {
        self.inner.lock().await.settlements.clone()
    }

    pub async fn notification_count(&self) -> usize {
        self.inner.lock().await.notifications.len()
    }
}

#[async_trait]
impl HealthProbe for MemoryStore {
    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn find_active_agent(&self, api_key: &str) -> anyhow::Result<Option<AgentRecord>> {
        Ok(self.inner.lock().await.agents.get(api_key).cloned())
    }

    async fn find_active_wallet(&self, agent_id: &str) -> anyhow::Result<Option<AgentWallet>> {
        Ok(self.inner.lock().await.wallets.get(agent_id).cloned())
    }

    async fn insert_settlement(&self, entry: &NewSettlement) -> anyhow::Result<i64> {
        let mut inner = self.inner.lock().await;
        if inner
            .settlements
            .iter()
            .any(|row| row.transaction_hash == entry.transaction_hash)
        {
            anyhow::bail!("settlement {} already recorded", entry.transaction_hash);
        }
        let id = inner.next_id();
        inner.settlements.push(SettlementRecord {
            id,
            agent_id: entry.agent_id.clone(),
            transaction_hash: entry.transaction_hash.clone(),
            amount: entry.amount,
            recipient: entry.recipient.clone(),
            status: entry.status,
            error: None,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn update_settlement_status(
        &self,
        transaction_hash: &str,
        status: SettlementStatus,
        error: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(row) = inner
            .settlements
            .iter_mut()
            .find(|row| row.transaction_hash == transaction_hash)
        {
            row.status = status;
            row.error = error.map(str::to_string);
        }
        Ok(())
    }

    async fn find_settlement(&self, transaction_hash: &str) -> anyhow::Result<Option<SettlementRecord>> {
        Ok(self
            .inner
            .lock()
            .await
            .settlements
            .iter()
            .find(|row| row.transaction_hash == transaction_hash)
            .cloned())
    }

    async fn pending_settlements(&self) -> anyhow::Result<Vec<SettlementRecord>> {
        Ok(self
            .inner
            .lock()
            .await
            .settlements
            .iter()
            .filter(|row| row.status == SettlementStatus::Pending)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MarketplaceStore for MemoryStore {
    async fn find_transaction_by_signature(
        &self,
        signature: &str,
    ) -> anyhow::Result<Option<MarketplaceTransaction>> {
        Ok(self
            .inner
            .lock()
            .await
            .transactions
            .iter()
            .find(|tx| tx.transaction_signature == signature)
            .cloned())
    }

    async fn insert_transaction_with_purchase(
        &self,
        new: NewMarketplaceTransaction,
    ) -> anyhow::Result<MarketplaceTransaction> {
        let mut inner = self.inner.lock().await;
        if inner
            .transactions
            .iter()
            .any(|tx| tx.transaction_signature == new.transaction_signature)
        {
            return Err(DuplicateSignature.into());
        }

        let id = inner.next_id();
        let transaction = MarketplaceTransaction::from_new(id, new, Utc::now());
        inner.purchases.push((
            transaction.buyer_id.clone(),
            transaction.item_id.clone(),
            transaction.item_type,
            transaction.id,
        ));
        inner.transactions.push(transaction.clone());
        Ok(transaction)
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        filter: TransactionFilter,
    ) -> anyhow::Result<Vec<MarketplaceTransaction>> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<_> = inner
            .transactions
            .iter()
            .filter(|tx| filter.matches(user_id, tx))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn completed_transactions(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<MarketplaceTransaction>> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<_> = inner
            .transactions
            .iter()
            .filter(|tx| tx.status == crate::domain::marketplace::TransactionStatus::Completed)
            .filter(|tx| since.map_or(true, |s| tx.created_at >= s))
            .filter(|tx| until.map_or(true, |u| tx.created_at <= u))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn has_purchased(&self, user_id: &str, item_id: &str, item_type: ItemType) -> anyhow::Result<bool> {
        Ok(self
            .inner
            .lock()
            .await
            .purchases
            .iter()
            .any(|(u, i, t, _)| u == user_id && i == item_id && *t == item_type))
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn preferences(&self, user_id: &str) -> anyhow::Result<Option<NotificationPreferences>> {
        Ok(self.inner.lock().await.preferences.get(user_id).cloned())
    }

    async fn insert_notifications(
        &self,
        user_id: &str,
        notifications: &[NewNotification],
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.failing_notification_writes > 0 {
            inner.failing_notification_writes -= 1;
            anyhow::bail!("notification write rejected");
        }

        let now = Utc::now();
        for n in notifications {
            let id = inner.next_id();
            inner.notifications.push(Notification {
                id,
                user_id: user_id.to_string(),
                notification_type: n.notification_type,
                title: n.title.clone(),
                message: n.message.clone(),
                data: n.data.clone(),
                status: NotificationStatus::Unread,
                action_url: n.action_url.clone(),
                related_type: n.related_type.clone(),
                related_id: n.related_id.clone(),
                actor_id: n.actor_id.clone(),
                created_at: now,
            });
        }
        Ok(())
    }

    async fn list_notifications(&self, user_id: &str, limit: i64) -> anyhow::Result<Vec<Notification>> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<_> = inner
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::marketplace::TransactionStatus;
    use crate::domain::notification::NotificationType;

    fn purchase(signature: &str, buyer: &str, seller: &str) -> NewMarketplaceTransaction {
        NewMarketplaceTransaction {
            buyer_id: buyer.to_string(),
            seller_id: seller.to_string(),
            item_id: "item-1".to_string(),
            item_type: ItemType::Prompt,
            amount: 1.0,
            platform_fee: 0.1,
            seller_amount: 0.9,
            usd_amount: None,
            status: TransactionStatus::Completed,
            transaction_signature: signature.to_string(),
            buyer_wallet_address: "buyer-wallet".to_string(),
            seller_wallet_address: "seller-wallet".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_signature_is_rejected_with_typed_error() {
        let store = MemoryStore::new();
        store
            .insert_transaction_with_purchase(purchase("sig-1", "alice", "bob"))
            .await
            .unwrap();
        let err = store
            .insert_transaction_with_purchase(purchase("sig-1", "carol", "bob"))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<DuplicateSignature>().is_some());
    }

    #[tokio::test]
    async fn purchase_row_follows_transaction() {
        let store = MemoryStore::new();
        store
            .insert_transaction_with_purchase(purchase("sig-1", "alice", "bob"))
            .await
            .unwrap();
        assert!(store.has_purchased("alice", "item-1", ItemType::Prompt).await.unwrap());
        assert!(!store.has_purchased("bob", "item-1", ItemType::Prompt).await.unwrap());
        assert!(!store.has_purchased("alice", "item-1", ItemType::Agent).await.unwrap());
    }

    #[tokio::test]
    async fn listing_filters_by_side() {
        let store = MemoryStore::new();
        store
            .insert_transaction_with_purchase(purchase("sig-1", "alice", "bob"))
            .await
            .unwrap();
        store
            .insert_transaction_with_purchase(purchase("sig-2", "bob", "carol"))
            .await
            .unwrap();

        let sales = store.list_transactions("bob", TransactionFilter::Sales).await.unwrap();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].transaction_signature, "sig-1");

        let all = store.list_transactions("bob", TransactionFilter::All).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].transaction_signature, "sig-2");
    }

    #[tokio::test]
    async fn failed_notification_writes_are_counted_down() {
        let store = MemoryStore::new();
        store.fail_notification_writes(1).await;
        let batch = vec![NewNotification::new(NotificationType::AccountUpdate, "t", "m")];
        assert!(store.insert_notifications("u", &batch).await.is_err());
        store.insert_notifications("u", &batch).await.unwrap();
        assert_eq!(store.notification_count().await, 1);
    }
}
