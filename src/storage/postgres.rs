//! Postgres-backed store.
//!
//! Tables are created on connect (`CREATE TABLE IF NOT EXISTS`), so a fresh database is usable
//! without a separate migration step.

use crate::domain::marketplace::{
    ItemType, MarketplaceTransaction, NewMarketplaceTransaction, TransactionFilter,
};
use crate::domain::notification::{NewNotification, Notification, NotificationPreferences};
use crate::domain::settlement::{
    AgentRecord, AgentWallet, NewSettlement, SettlementRecord, SettlementStatus,
};
use crate::storage::{
    AgentStore, DuplicateSignature, HealthProbe, MarketplaceStore, NotificationStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS ai_agents (
        id TEXT PRIMARY KEY,
        api_key TEXT NOT NULL UNIQUE,
        status TEXT NOT NULL DEFAULT 'active'
    )",
    "CREATE TABLE IF NOT EXISTS ai_agent_wallets (
        agent_id TEXT NOT NULL REFERENCES ai_agents(id),
        public_key TEXT NOT NULL,
        private_key TEXT NOT NULL,
        iv TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active'
    )",
    "CREATE TABLE IF NOT EXISTS ai_agent_transactions (
        id BIGSERIAL PRIMARY KEY,
        agent_id TEXT NOT NULL,
        transaction_hash TEXT NOT NULL UNIQUE,
        amount DOUBLE PRECISION NOT NULL,
        recipient TEXT NOT NULL,
        status TEXT NOT NULL,
        error TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS marketplace_transactions (
        id BIGSERIAL PRIMARY KEY,
        buyer_id TEXT NOT NULL,
        seller_id TEXT NOT NULL,
        item_id TEXT NOT NULL,
        item_type TEXT NOT NULL,
        amount DOUBLE PRECISION NOT NULL,
        platform_fee DOUBLE PRECISION NOT NULL,
        seller_amount DOUBLE PRECISION NOT NULL,
        usd_amount DOUBLE PRECISION,
        status TEXT NOT NULL,
        transaction_signature TEXT NOT NULL UNIQUE,
        buyer_wallet_address TEXT NOT NULL,
        seller_wallet_address TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS marketplace_user_purchases (
        id BIGSERIAL PRIMARY KEY,
        user_id TEXT NOT NULL,
        item_id TEXT NOT NULL,
        item_type TEXT NOT NULL,
        transaction_id BIGINT NOT NULL REFERENCES marketplace_transactions(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS swarms_notifications (
        id BIGSERIAL PRIMARY KEY,
        user_id TEXT NOT NULL,
        type TEXT NOT NULL,
        title TEXT NOT NULL,
        message TEXT NOT NULL,
        data JSONB NOT NULL DEFAULT '{}'::jsonb,
        status TEXT NOT NULL DEFAULT 'unread',
        action_url TEXT,
        related_type TEXT,
        related_id TEXT,
        actor_id TEXT,
        read_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS swarms_notification_preferences (
        user_id TEXT PRIMARY KEY,
        notifications_enabled BOOLEAN NOT NULL DEFAULT true,
        social_notifications BOOLEAN NOT NULL DEFAULT true,
        system_notifications BOOLEAN NOT NULL DEFAULT true,
        marketplace_notifications BOOLEAN NOT NULL DEFAULT true,
        referral_notifications BOOLEAN NOT NULL DEFAULT true,
        quiet_hours_enabled BOOLEAN NOT NULL DEFAULT false,
        quiet_hours_start TEXT,
        quiet_hours_end TEXT,
        timezone TEXT NOT NULL DEFAULT 'UTC'
    )",
];

const MARKETPLACE_COLUMNS: &str = "id, buyer_id, seller_id, item_id, item_type, amount, platform_fee, \
     seller_amount, usd_amount, status, transaction_signature, buyer_wallet_address, \
     seller_wallet_address, created_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Connects and makes sure every table exists.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        tracing::info!("postgres store ready");
        Ok(Self { pool })
    }
}

fn settlement_from_row(row: &PgRow) -> anyhow::Result<SettlementRecord> {
    let status: String = row.try_get("status")?;
    Ok(SettlementRecord {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        transaction_hash: row.try_get("transaction_hash")?,
        amount: row.try_get("amount")?,
        recipient: row.try_get("recipient")?,
        status: status.parse()?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
    })
}

fn marketplace_from_row(row: &PgRow) -> anyhow::Result<MarketplaceTransaction> {
    let item_type: String = row.try_get("item_type")?;
    let status: String = row.try_get("status")?;
    Ok(MarketplaceTransaction {
        id: row.try_get("id")?,
        buyer_id: row.try_get("buyer_id")?,
        seller_id: row.try_get("seller_id")?,
        item_id: row.try_get("item_id")?,
        item_type: item_type.parse()?,
        amount: row.try_get("amount")?,
        platform_fee: row.try_get("platform_fee")?,
        seller_amount: row.try_get("seller_amount")?,
        usd_amount: row.try_get("usd_amount")?,
        status: status.parse()?,
        transaction_signature: row.try_get("transaction_signature")?,
        buyer_wallet_address: row.try_get("buyer_wallet_address")?,
        seller_wallet_address: row.try_get("seller_wallet_address")?,
        created_at: row.try_get("created_at")?,
    })
}

fn notification_from_row(row: &PgRow) -> anyhow::Result<Notification> {
    let kind: String = row.try_get("type")?;
    let status: String = row.try_get("status")?;
    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        notification_type: kind.parse()?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        data: row.try_get("data")?,
        status: status.parse()?,
        action_url: row.try_get("action_url")?,
        related_type: row.try_get("related_type")?,
        related_id: row.try_get("related_id")?,
        actor_id: row.try_get("actor_id")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl HealthProbe for PgStore {
    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AgentStore for PgStore {
    async fn find_active_agent(&self, api_key: &str) -> anyhow::Result<Option<AgentRecord>> {
        let row = sqlx::query("SELECT id FROM ai_agents WHERE api_key = $1 AND status = 'active'")
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(AgentRecord {
                id: row.try_get("id")?,
            }),
            None => None,
        })
    }

    async fn find_active_wallet(&self, agent_id: &str) -> anyhow::Result<Option<AgentWallet>> {
        let row = sqlx::query(
            "SELECT agent_id, public_key, private_key, iv FROM ai_agent_wallets
             WHERE agent_id = $1 AND status = 'active' LIMIT 1",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            Some(row) => Some(AgentWallet {
                agent_id: row.try_get("agent_id")?,
                public_key: row.try_get("public_key")?,
                encrypted_private_key: row.try_get("private_key")?,
                iv: row.try_get("iv")?,
            }),
            None => None,
        })
    }

    async fn insert_settlement(&self, entry: &NewSettlement) -> anyhow::Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO ai_agent_transactions (agent_id, transaction_hash, amount, recipient, status)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(&entry.agent_id)
        .bind(&entry.transaction_hash)
        .bind(entry.amount)
        .bind(&entry.recipient)
        .bind(entry.status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn update_settlement_status(
        &self,
        transaction_hash: &str,
        status: SettlementStatus,
        error: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE ai_agent_transactions SET status = $2, error = $3, updated_at = now()
             WHERE transaction_hash = $1",
        )
        .bind(transaction_hash)
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_settlement(&self, transaction_hash: &str) -> anyhow::Result<Option<SettlementRecord>> {
        let row = sqlx::query(
            "SELECT id, agent_id, transaction_hash, amount, recipient, status, error, created_at
             FROM ai_agent_transactions WHERE transaction_hash = $1",
        )
        .bind(transaction_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(settlement_from_row).transpose()
    }

    async fn pending_settlements(&self) -> anyhow::Result<Vec<SettlementRecord>> {
        let rows = sqlx::query(
            "SELECT id, agent_id, transaction_hash, amount, recipient, status, error, created_at
             FROM ai_agent_transactions WHERE status = 'pending' ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(settlement_from_row).collect()
    }
}

#[async_trait]
impl MarketplaceStore for PgStore {
    async fn find_transaction_by_signature(
        &self,
        signature: &str,
    ) -> anyhow::Result<Option<MarketplaceTransaction>> {
        let sql = format!(
            "SELECT {} FROM marketplace_transactions WHERE transaction_signature = $1",
            MARKETPLACE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(signature)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(marketplace_from_row).transpose()
    }

    async fn insert_transaction_with_purchase(
        &self,
        new: NewMarketplaceTransaction,
    ) -> anyhow::Result<MarketplaceTransaction> {
        let mut db_tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO marketplace_transactions (buyer_id, seller_id, item_id, item_type, amount,
                platform_fee, seller_amount, usd_amount, status, transaction_signature,
                buyer_wallet_address, seller_wallet_address)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {}",
            MARKETPLACE_COLUMNS
        );
        let inserted = sqlx::query(&sql)
            .bind(&new.buyer_id)
            .bind(&new.seller_id)
            .bind(&new.item_id)
            .bind(new.item_type.as_str())
            .bind(new.amount)
            .bind(new.platform_fee)
            .bind(new.seller_amount)
            .bind(new.usd_amount)
            .bind(new.status.as_str())
            .bind(&new.transaction_signature)
            .bind(&new.buyer_wallet_address)
            .bind(&new.seller_wallet_address)
            .fetch_one(&mut *db_tx)
            .await;

        let row = match inserted {
            Ok(row) => row,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(DuplicateSignature.into());
            }
            Err(e) => return Err(e.into()),
        };
        let transaction = marketplace_from_row(&row)?;

        sqlx::query(
            "INSERT INTO marketplace_user_purchases (user_id, item_id, item_type, transaction_id)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&transaction.buyer_id)
        .bind(&transaction.item_id)
        .bind(transaction.item_type.as_str())
        .bind(transaction.id)
        .execute(&mut *db_tx)
        .await?;

        db_tx.commit().await?;
        Ok(transaction)
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        filter: TransactionFilter,
    ) -> anyhow::Result<Vec<MarketplaceTransaction>> {
        let predicate = match filter {
            TransactionFilter::Purchases => "buyer_id = $1",
            TransactionFilter::Sales => "seller_id = $1",
            TransactionFilter::All => "(buyer_id = $1 OR seller_id = $1)",
        };
        let sql = format!(
            "SELECT {} FROM marketplace_transactions WHERE {} ORDER BY created_at DESC, id DESC",
            MARKETPLACE_COLUMNS, predicate
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.pool).await?;
        rows.iter().map(marketplace_from_row).collect()
    }

    async fn completed_transactions(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<MarketplaceTransaction>> {
        let sql = format!(
            "SELECT {} FROM marketplace_transactions
             WHERE status = 'completed'
               AND ($1::timestamptz IS NULL OR created_at >= $1)
               AND ($2::timestamptz IS NULL OR created_at <= $2)
             ORDER BY created_at DESC",
            MARKETPLACE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(since)
            .bind(until)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(marketplace_from_row).collect()
    }

    async fn has_purchased(&self, user_id: &str, item_id: &str, item_type: ItemType) -> anyhow::Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM marketplace_user_purchases
             WHERE user_id = $1 AND item_id = $2 AND item_type = $3 LIMIT 1",
        )
        .bind(user_id)
        .bind(item_id)
        .bind(item_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn preferences(&self, user_id: &str) -> anyhow::Result<Option<NotificationPreferences>> {
        let row = sqlx::query(
            "SELECT notifications_enabled, social_notifications, system_notifications,
                    marketplace_notifications, referral_notifications, quiet_hours_enabled,
                    quiet_hours_start, quiet_hours_end, timezone
             FROM swarms_notification_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(NotificationPreferences {
            notifications_enabled: row.try_get("notifications_enabled")?,
            social_notifications: row.try_get("social_notifications")?,
            system_notifications: row.try_get("system_notifications")?,
            marketplace_notifications: row.try_get("marketplace_notifications")?,
            referral_notifications: row.try_get("referral_notifications")?,
            quiet_hours_enabled: row.try_get("quiet_hours_enabled")?,
            quiet_hours_start: row.try_get("quiet_hours_start")?,
            quiet_hours_end: row.try_get("quiet_hours_end")?,
            timezone: row.try_get("timezone")?,
        }))
    }

    async fn insert_notifications(
        &self,
        user_id: &str,
        notifications: &[NewNotification],
    ) -> anyhow::Result<()> {
        if notifications.is_empty() {
            return Ok(());
        }

        let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "INSERT INTO swarms_notifications
                (user_id, type, title, message, data, status, action_url, related_type, related_id, actor_id) ",
        );
        builder.push_values(notifications, |mut b, n| {
            b.push_bind(user_id)
                .push_bind(n.notification_type.as_str())
                .push_bind(&n.title)
                .push_bind(&n.message)
                .push_bind(&n.data)
                .push_bind("unread")
                .push_bind(&n.action_url)
                .push_bind(&n.related_type)
                .push_bind(&n.related_id)
                .push_bind(&n.actor_id);
        });
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn list_notifications(&self, user_id: &str, limit: i64) -> anyhow::Result<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT id, user_id, type, title, message, data, status, action_url, related_type,
                    related_id, actor_id, created_at
             FROM swarms_notifications WHERE user_id = $1
             ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(notification_from_row).collect()
    }
}
