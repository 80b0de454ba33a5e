//! Marketplace purchase records, stats and the commission report.

use crate::app::notification_manager::NotificationManager;
use crate::domain::commission::{
    calculate_commission, format_sol_amount, validate_commission_calculation,
};
use crate::domain::marketplace::{
    ItemType, MarketplaceTransaction, NewMarketplaceTransaction, TransactionFilter,
    TransactionStatus,
};
use crate::domain::notification::{NewNotification, NotificationType};
use crate::storage::{DuplicateSignature, MarketplaceStore};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use html_escape::encode_text;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use utoipa::ToSchema;

pub const PURCHASE_RATE_LIMIT: u32 = 5;
pub const PURCHASE_RATE_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_REPORT_PERIOD_DAYS: i64 = 7;
pub const MAX_REPORT_PERIOD_DAYS: i64 = 365;
const RECENT_TRANSACTIONS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum MarketplaceError {
    #[error("User not authenticated")]
    Unauthorized,
    #[error("Too many transaction attempts. Please wait before trying again.")]
    TooManyRequests,
    #[error("Transaction already recorded")]
    Conflict,
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl MarketplaceError {
    pub fn code(&self) -> &'static str {
        match self {
            MarketplaceError::Unauthorized => "UNAUTHORIZED",
            MarketplaceError::TooManyRequests => "TOO_MANY_REQUESTS",
            MarketplaceError::Conflict => "CONFLICT",
            MarketplaceError::InvalidInput(_) => "BAD_REQUEST",
            MarketplaceError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

/// Fixed-window limiter keyed by user: `points` attempts per `window`, counted from the first
/// attempt in the window.
pub struct RateLimiter {
    points: u32,
    window: Duration,
    windows: Mutex<HashMap<String, (Instant, u32)>>,
}

impl RateLimiter {
    pub fn new(points: u32, window: Duration) -> Self {
        Self {
            points,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Spends one point for `key`; `false` when the window is exhausted.
    pub async fn consume(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        windows.retain(|_, (started, _)| now.duration_since(*started) < self.window);

        let (_, used) = windows.entry(key.to_string()).or_insert((now, 0));
        if *used >= self.points {
            return false;
        }
        *used += 1;
        true
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordPurchase {
    pub seller_id: String,
    pub item_id: String,
    pub item_type: ItemType,
    /// Price in SOL.
    pub amount: f64,
    pub transaction_signature: String,
    pub buyer_wallet_address: String,
    pub seller_wallet_address: String,
    #[serde(default)]
    pub usd_amount: Option<f64>,
}

impl RecordPurchase {
    fn validate(&self) -> Result<(), MarketplaceError> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(MarketplaceError::InvalidInput("amount must be a positive number".into()));
        }
        let required = [
            ("sellerId", &self.seller_id),
            ("itemId", &self.item_id),
            ("transactionSignature", &self.transaction_signature),
            ("buyerWalletAddress", &self.buyer_wallet_address),
            ("sellerWalletAddress", &self.seller_wallet_address),
        ];
        if let Some((name, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(MarketplaceError::InvalidInput(format!("{} is required", name)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceStats {
    pub total_transactions: usize,
    pub total_volume: f64,
    pub total_platform_fees: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
pub struct ReportBucket {
    pub count: usize,
    pub volume: f64,
    pub commission: f64,
}

impl ReportBucket {
    fn add(&mut self, tx: &MarketplaceTransaction) {
        self.count += 1;
        self.volume += tx.amount;
        self.commission += tx.platform_fee;
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_commissions: f64,
    pub total_volume: f64,
    pub transaction_count: usize,
    pub average_commission_per_transaction: f64,
    /// Effective commission as a percentage of volume.
    pub commission_rate: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportBreakdown {
    pub by_item_type: BTreeMap<String, ReportBucket>,
    /// Keyed by UTC date, `YYYY-MM-DD`.
    pub daily: BTreeMap<String, ReportBucket>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecentTransaction {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub item_type: ItemType,
    pub amount: f64,
    pub commission: f64,
    pub buyer: String,
    pub seller: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommissionReport {
    pub period: String,
    pub date_range: DateRange,
    pub summary: ReportSummary,
    pub breakdown: ReportBreakdown,
    pub recent_transactions: Vec<RecentTransaction>,
}

impl CommissionReport {
    /// Builds the report from completed transactions, newest first.
    pub fn from_transactions(
        period_days: i64,
        date_range: DateRange,
        transactions: &[MarketplaceTransaction],
    ) -> Self {
        let total_commissions: f64 = transactions.iter().map(|tx| tx.platform_fee).sum();
        let total_volume: f64 = transactions.iter().map(|tx| tx.amount).sum();
        let transaction_count = transactions.len();

        let mut by_item_type: BTreeMap<String, ReportBucket> = BTreeMap::new();
        let mut daily: BTreeMap<String, ReportBucket> = BTreeMap::new();
        for tx in transactions {
            by_item_type
                .entry(tx.item_type.as_str().to_string())
                .or_default()
                .add(tx);
            daily
                .entry(tx.created_at.format("%Y-%m-%d").to_string())
                .or_default()
                .add(tx);
        }

        Self {
            period: format!("{} days", period_days),
            date_range,
            summary: ReportSummary {
                total_commissions,
                total_volume,
                transaction_count,
                average_commission_per_transaction: if transaction_count > 0 {
                    total_commissions / transaction_count as f64
                } else {
                    0.0
                },
                commission_rate: if total_volume > 0.0 {
                    total_commissions / total_volume * 100.0
                } else {
                    0.0
                },
            },
            breakdown: ReportBreakdown { by_item_type, daily },
            recent_transactions: transactions
                .iter()
                .take(RECENT_TRANSACTIONS)
                .map(|tx| RecentTransaction {
                    id: tx.id,
                    date: tx.created_at,
                    item_type: tx.item_type,
                    amount: tx.amount,
                    commission: tx.platform_fee,
                    buyer: tx.buyer_id.clone(),
                    seller: tx.seller_id.clone(),
                    signature: tx.transaction_signature.clone(),
                })
                .collect(),
        }
    }

    /// Printable HTML rendering of the report.
    pub fn to_html(&self, treasury: &str) -> String {
        let mut item_rows = String::new();
        for (item_type, bucket) in &self.breakdown.by_item_type {
            item_rows.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                encode_text(item_type),
                bucket.count,
                format_sol_amount(bucket.volume, None),
                format_sol_amount(bucket.commission, None)
            ));
        }
        let mut recent_rows = String::new();
        for tx in &self.recent_transactions {
            recent_rows.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                tx.date.format("%Y-%m-%d"),
                tx.item_type.as_str(),
                format_sol_amount(tx.amount, None),
                format_sol_amount(tx.commission, None),
                encode_text(&tx.buyer),
                encode_text(&tx.seller)
            ));
        }

        format!(
            "<!DOCTYPE html><html><head><title>Commission Report - Swarms Platform</title></head><body>\
             <h1>Commission Report</h1><p>Period: {} ({} - {})</p>\
             <ul><li>Total Commissions: {}</li><li>Total Volume: {}</li><li>Transactions: {}</li>\
             <li>Avg Commission: {}</li></ul>\
             <h2>Breakdown by Item Type</h2><table><thead><tr><th>Type</th><th>Transactions</th>\
             <th>Volume</th><th>Commission</th></tr></thead><tbody>{}</tbody></table>\
             <h2>Recent Transactions</h2><table><thead><tr><th>Date</th><th>Type</th><th>Amount</th>\
             <th>Commission</th><th>Buyer</th><th>Seller</th></tr></thead><tbody>{}</tbody></table>\
             <p>Platform Wallet: {}</p></body></html>",
            encode_text(&self.period),
            self.date_range.start.format("%Y-%m-%d"),
            self.date_range.end.format("%Y-%m-%d"),
            format_sol_amount(self.summary.total_commissions, None),
            format_sol_amount(self.summary.total_volume, None),
            self.summary.transaction_count,
            format_sol_amount(self.summary.average_commission_per_transaction, None),
            item_rows,
            recent_rows,
            encode_text(treasury)
        )
    }
}

pub struct MarketplaceService {
    store: Arc<dyn MarketplaceStore>,
    notifications: Arc<NotificationManager>,
    limiter: RateLimiter,
}

impl MarketplaceService {
    pub fn new(store: Arc<dyn MarketplaceStore>, notifications: Arc<NotificationManager>) -> Self {
        Self {
            store,
            notifications,
            limiter: RateLimiter::new(PURCHASE_RATE_LIMIT, PURCHASE_RATE_WINDOW),
        }
    }

    /// Records a completed on-chain purchase for `buyer_id`, keyed by its signature, and
    /// notifies both parties.
    pub async fn record_purchase(
        &self,
        buyer_id: Option<&str>,
        input: RecordPurchase,
    ) -> Result<MarketplaceTransaction, MarketplaceError> {
        let buyer_id = buyer_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(MarketplaceError::Unauthorized)?;
        input.validate()?;

        if !self.limiter.consume(buyer_id).await {
            tracing::warn!(buyer_id, "marketplace purchase rate limited");
            return Err(MarketplaceError::TooManyRequests);
        }

        if self
            .store
            .find_transaction_by_signature(&input.transaction_signature)
            .await?
            .is_some()
        {
            return Err(MarketplaceError::Conflict);
        }

        let commission = calculate_commission(input.amount);
        if !validate_commission_calculation(input.amount, commission.platform_fee, commission.seller_amount) {
            return Err(MarketplaceError::InvalidInput(format!(
                "amount {} cannot be split exactly",
                input.amount
            )));
        }

        tracing::info!(
            signature = %input.transaction_signature,
            buyer_id,
            seller_id = %input.seller_id,
            item_id = %input.item_id,
            amount = input.amount,
            platform_fee = commission.platform_fee,
            "recording marketplace transaction"
        );

        let new = NewMarketplaceTransaction {
            buyer_id: buyer_id.to_string(),
            seller_id: input.seller_id,
            item_id: input.item_id,
            item_type: input.item_type,
            amount: input.amount,
            platform_fee: commission.platform_fee,
            seller_amount: commission.seller_amount,
            usd_amount: input.usd_amount,
            status: TransactionStatus::Completed,
            transaction_signature: input.transaction_signature,
            buyer_wallet_address: input.buyer_wallet_address,
            seller_wallet_address: input.seller_wallet_address,
        };
        let transaction = match self.store.insert_transaction_with_purchase(new).await {
            Ok(tx) => tx,
            Err(e) if e.downcast_ref::<DuplicateSignature>().is_some() => {
                return Err(MarketplaceError::Conflict)
            }
            Err(e) => return Err(MarketplaceError::Internal(e)),
        };

        self.notify_parties(&transaction).await;
        Ok(transaction)
    }

    async fn notify_parties(&self, tx: &MarketplaceTransaction) {
        let related_id = tx.id.to_string();
        let data = json!({
            "transactionId": tx.id,
            "itemId": tx.item_id,
            "itemType": tx.item_type,
            "amount": tx.amount,
            "platformFee": tx.platform_fee,
            "sellerAmount": tx.seller_amount,
            "transactionSignature": tx.transaction_signature,
        });

        let purchase = NewNotification::new(
            NotificationType::MarketplacePurchase,
            "Purchase Successful",
            format!(
                "You purchased a {} for {}",
                tx.item_type.as_str(),
                format_sol_amount(tx.amount, None)
            ),
        )
        .with_data(data.clone())
        .with_related("marketplace_transaction", related_id.clone())
        .with_actor(tx.seller_id.clone());
        self.notifications.queue_notification(&tx.buyer_id, purchase).await;

        let sale = NewNotification::new(
            NotificationType::MarketplaceSale,
            "New Sale",
            format!(
                "Your {} sold for {}. You earned {} (90%)",
                tx.item_type.as_str(),
                format_sol_amount(tx.amount, None),
                format_sol_amount(tx.seller_amount, None)
            ),
        )
        .with_data(data)
        .with_related("marketplace_transaction", related_id)
        .with_actor(tx.buyer_id.clone());
        self.notifications.queue_notification(&tx.seller_id, sale).await;
    }

    pub async fn user_transactions(
        &self,
        user_id: Option<&str>,
        filter: TransactionFilter,
    ) -> Result<Vec<MarketplaceTransaction>, MarketplaceError> {
        let user_id = user_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(MarketplaceError::Unauthorized)?;
        Ok(self.store.list_transactions(user_id, filter).await?)
    }

    /// Anonymous callers have purchased nothing.
    pub async fn has_purchased(
        &self,
        user_id: Option<&str>,
        item_id: &str,
        item_type: ItemType,
    ) -> Result<bool, MarketplaceError> {
        match user_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(user_id) => Ok(self.store.has_purchased(user_id, item_id, item_type).await?),
            None => Ok(false),
        }
    }

    pub async fn stats(&self) -> Result<MarketplaceStats, MarketplaceError> {
        let completed = self.store.completed_transactions(None, None).await?;
        Ok(MarketplaceStats {
            total_transactions: completed.len(),
            total_volume: completed.iter().map(|tx| tx.amount).sum(),
            total_platform_fees: completed.iter().map(|tx| tx.platform_fee).sum(),
        })
    }

    /// Commission report over the last `period_days` days.
    pub async fn commission_report(&self, period_days: i64) -> Result<CommissionReport, MarketplaceError> {
        if !(1..=MAX_REPORT_PERIOD_DAYS).contains(&period_days) {
            return Err(MarketplaceError::InvalidInput(format!(
                "period must be between 1 and {} days",
                MAX_REPORT_PERIOD_DAYS
            )));
        }

        let end = Utc::now();
        let start = end - ChronoDuration::days(period_days);
        let transactions = self.store.completed_transactions(Some(start), Some(end)).await?;
        Ok(CommissionReport::from_transactions(
            period_days,
            DateRange { start, end },
            &transactions,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use crate::storage::NotificationStore;
    use chrono::TimeZone;

    fn service(store: &Arc<MemoryStore>) -> MarketplaceService {
        let notifications = Arc::new(NotificationManager::with_defaults(store.clone()));
        MarketplaceService::new(store.clone(), notifications)
    }

    fn purchase(signature: &str, amount: f64, item_type: ItemType) -> RecordPurchase {
        RecordPurchase {
            seller_id: "seller".to_string(),
            item_id: "item-1".to_string(),
            item_type,
            amount,
            transaction_signature: signature.to_string(),
            buyer_wallet_address: "buyer-wallet".to_string(),
            seller_wallet_address: "seller-wallet".to_string(),
            usd_amount: None,
        }
    }

    #[tokio::test]
    async fn records_split_and_purchase() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);

        let tx = svc
            .record_purchase(Some("buyer"), purchase("sig-1", 2.5, ItemType::Agent))
            .await
            .unwrap();
        assert_eq!(tx.platform_fee, 0.25);
        assert_eq!(tx.seller_amount, 2.25);
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert!(svc.has_purchased(Some("buyer"), "item-1", ItemType::Agent).await.unwrap());
        assert!(!svc.has_purchased(None, "item-1", ItemType::Agent).await.unwrap());
    }

    #[tokio::test]
    async fn both_parties_are_notified() {
        let store = Arc::new(MemoryStore::new());
        let notifications = Arc::new(NotificationManager::with_defaults(store.clone()));
        let svc = MarketplaceService::new(store.clone(), notifications.clone());

        svc.record_purchase(Some("buyer"), purchase("sig-1", 1.0, ItemType::Prompt))
            .await
            .unwrap();
        assert_eq!(notifications.queue_status().await.batch_count, 2);

        notifications.flush().await;
        let seller = store.list_notifications("seller", 10).await.unwrap();
        assert_eq!(seller[0].notification_type, NotificationType::MarketplaceSale);
        let buyer = store.list_notifications("buyer", 10).await.unwrap();
        assert_eq!(buyer[0].notification_type, NotificationType::MarketplacePurchase);
    }

    #[tokio::test]
    async fn duplicate_signature_conflicts() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        svc.record_purchase(Some("buyer"), purchase("sig-1", 1.0, ItemType::Prompt))
            .await
            .unwrap();
        let err = svc
            .record_purchase(Some("other"), purchase("sig-1", 1.0, ItemType::Prompt))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketplaceError::Conflict));
    }

    #[tokio::test]
    async fn anonymous_and_invalid_requests_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        assert!(matches!(
            svc.record_purchase(None, purchase("sig-1", 1.0, ItemType::Prompt)).await,
            Err(MarketplaceError::Unauthorized)
        ));
        assert!(matches!(
            svc.record_purchase(Some("buyer"), purchase("sig-1", -1.0, ItemType::Prompt)).await,
            Err(MarketplaceError::InvalidInput(_))
        ));
        assert!(matches!(
            svc.user_transactions(Some("  "), TransactionFilter::All).await,
            Err(MarketplaceError::Unauthorized)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_attempt_in_a_minute_is_limited() {
        let limiter = RateLimiter::new(PURCHASE_RATE_LIMIT, PURCHASE_RATE_WINDOW);
        for _ in 0..5 {
            assert!(limiter.consume("buyer").await);
        }
        assert!(!limiter.consume("buyer").await);
        assert!(limiter.consume("someone-else").await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.consume("buyer").await);
    }

    #[tokio::test]
    async fn stats_sum_completed_transactions() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        svc.record_purchase(Some("b1"), purchase("sig-1", 1.0, ItemType::Prompt))
            .await
            .unwrap();
        svc.record_purchase(Some("b2"), purchase("sig-2", 3.0, ItemType::Agent))
            .await
            .unwrap();

        let stats = svc.stats().await.unwrap();
        assert_eq!(stats.total_transactions, 2);
        assert_eq!(stats.total_volume, 4.0);
        assert!((stats.total_platform_fees - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn report_excludes_transactions_outside_the_period() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        svc.record_purchase(Some("b1"), purchase("sig-1", 1.0, ItemType::Prompt))
            .await
            .unwrap();
        svc.record_purchase(Some("b2"), purchase("sig-2", 2.0, ItemType::Agent))
            .await
            .unwrap();
        store
            .set_transaction_created_at("sig-2", Utc::now() - ChronoDuration::days(30))
            .await;

        let report = svc.commission_report(7).await.unwrap();
        assert_eq!(report.period, "7 days");
        assert_eq!(report.summary.transaction_count, 1);
        assert_eq!(report.summary.total_volume, 1.0);
        assert!(report.breakdown.by_item_type.contains_key("prompt"));
        assert!(!report.breakdown.by_item_type.contains_key("agent"));
        assert_eq!(report.recent_transactions[0].signature, "sig-1");

        assert!(matches!(
            svc.commission_report(0).await,
            Err(MarketplaceError::InvalidInput(_))
        ));
    }

    #[test]
    fn report_aggregates_by_type_and_day() {
        let day = |d: u32| Utc.with_ymd_and_hms(2024, 5, d, 12, 0, 0).unwrap();
        let tx = |id: i64, amount: f64, item_type: ItemType, created_at| MarketplaceTransaction {
            id,
            buyer_id: "b".into(),
            seller_id: "s".into(),
            item_id: "i".into(),
            item_type,
            amount,
            platform_fee: amount / 10.0,
            seller_amount: amount - amount / 10.0,
            usd_amount: None,
            status: TransactionStatus::Completed,
            transaction_signature: format!("sig-{}", id),
            buyer_wallet_address: "bw".into(),
            seller_wallet_address: "sw".into(),
            created_at,
        };
        let txs = vec![
            tx(3, 4.0, ItemType::Agent, day(3)),
            tx(2, 2.0, ItemType::Prompt, day(2)),
            tx(1, 2.0, ItemType::Prompt, day(2)),
        ];
        let report = CommissionReport::from_transactions(
            7,
            DateRange {
                start: day(1),
                end: day(8),
            },
            &txs,
        );

        assert_eq!(report.summary.transaction_count, 3);
        assert_eq!(report.summary.total_volume, 8.0);
        assert!((report.summary.commission_rate - 10.0).abs() < 1e-9);
        assert_eq!(report.breakdown.by_item_type["prompt"].count, 2);
        assert_eq!(report.breakdown.daily["2024-05-02"].volume, 4.0);
        assert_eq!(report.recent_transactions.len(), 3);
        assert!(report.to_html("treasury").contains("Commission Report"));
    }

    #[tokio::test]
    async fn report_html_escapes_user_supplied_ids() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        let mut tainted = purchase("sig-1", 1.0, ItemType::Prompt);
        tainted.seller_id = "<script>alert(1)</script>".to_string();
        svc.record_purchase(Some("b&b"), tainted).await.unwrap();

        let html = svc.commission_report(7).await.unwrap().to_html("treasury");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("b&amp;b"));
    }
}
