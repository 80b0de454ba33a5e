//! Settles transfer log rows left `pending` when confirmation polling gave up.

use crate::domain::settlement::SettlementStatus;
use crate::infra::solana::{Ledger, SignatureState};
use crate::storage::AgentStore;
use chrono::Utc;
use solana_sdk::signature::Signature;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::interval;

pub const EXPIRED_REASON: &str = "expired";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub completed: usize,
    pub failed: usize,
    pub still_pending: usize,
}

pub struct Reconciler {
    agents: Arc<dyn AgentStore>,
    ledger: Arc<dyn Ledger>,
    interval: Duration,
    expiry: Duration,
    shutdown: Arc<Notify>,
}

impl Reconciler {
    pub fn new(agents: Arc<dyn AgentStore>, ledger: Arc<dyn Ledger>, interval: Duration, expiry: Duration) -> Self {
        Self {
            agents,
            ledger,
            interval,
            expiry,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// One pass over every pending row.
    pub async fn reconcile_once(&self) -> anyhow::Result<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();
        let expiry = chrono::Duration::from_std(self.expiry)?;

        for row in self.agents.pending_settlements().await? {
            let state = match Signature::from_str(&row.transaction_hash) {
                Ok(signature) => match self.ledger.signature_state(&signature).await {
                    Ok(state) => state,
                    Err(e) => {
                        tracing::warn!(signature = %row.transaction_hash, error = %e, "signature status lookup failed");
                        summary.still_pending += 1;
                        continue;
                    }
                },
                Err(_) => SignatureState::Failed(format!("malformed signature {}", row.transaction_hash)),
            };

            match state {
                SignatureState::Confirmed => {
                    self.agents
                        .update_settlement_status(&row.transaction_hash, SettlementStatus::Completed, None)
                        .await?;
                    tracing::info!(signature = %row.transaction_hash, "pending transfer confirmed");
                    summary.completed += 1;
                }
                SignatureState::Failed(reason) => {
                    self.agents
                        .update_settlement_status(&row.transaction_hash, SettlementStatus::Failed, Some(&reason))
                        .await?;
                    tracing::warn!(signature = %row.transaction_hash, error = %reason, "pending transfer failed");
                    summary.failed += 1;
                }
                SignatureState::Unknown if Utc::now() - row.created_at > expiry => {
                    self.agents
                        .update_settlement_status(
                            &row.transaction_hash,
                            SettlementStatus::Failed,
                            Some(EXPIRED_REASON),
                        )
                        .await?;
                    tracing::warn!(signature = %row.transaction_hash, "pending transfer expired");
                    summary.failed += 1;
                }
                SignatureState::Unknown => summary.still_pending += 1,
            }
        }

        Ok(summary)
    }

    pub fn start_background_task(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(self.interval);
            let shutdown = self.shutdown.clone();
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        match self.reconcile_once().await {
                            Ok(summary) if summary != ReconcileSummary::default() => {
                                tracing::info!(?summary, "reconciliation pass finished");
                            }
                            Ok(_) => {}
                            Err(e) => tracing::error!(error = %e, "reconciliation pass failed"),
                        }
                    }
                    _ = shutdown.notified() => {
                        tracing::info!("reconciler shutting down");
                        break;
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}
