//! Settlement arithmetic and records for agent token transfers.
//!
//! Every transfer is taxed twice: 2% is charged on top of the requested amount (paid by the
//! sender) and 2% is withheld from what the recipient receives. Both taxes go to the treasury.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decimals of the settlement token mint.
pub const TOKEN_DECIMALS: u8 = 6;

pub const SENDER_TAX_RATE: f64 = 0.02;
pub const RECIPIENT_TAX_RATE: f64 = 0.02;

pub const COMPUTE_UNIT_LIMIT: u32 = 600_000;

/// SOL budget used for the priority fee when the caller does not provide one.
pub const DEFAULT_SOLANA_FEE: f64 = 0.009;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

pub const SENDER_FEE_MEMO: &str = "Sender Fee (2%)";
pub const RECEIVER_FEE_MEMO: &str = "Receiver Fee (2%)";
pub const TAX_BREAKDOWN: &str = "2% extra from account + 2% from sent amount";

/// Raw (base unit) amounts for one taxed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxPlan {
    pub raw_amount: u64,
    pub account_tax: u64,
    pub received_tax: u64,
    pub total_needed: u64,
    pub recipient_amount: u64,
}

impl TaxPlan {
    /// Returns `None` when the amount is negative or the taxed total does not fit in a
    /// `u64` of base units.
    pub fn for_amount(amount: f64) -> Option<Self> {
        let scaled = (amount * 10f64.powi(TOKEN_DECIMALS as i32)).floor();
        if !scaled.is_finite() || scaled < 0.0 || scaled >= u64::MAX as f64 {
            return None;
        }
        let raw_amount = scaled as u64;
        let account_tax = (raw_amount as f64 * SENDER_TAX_RATE).floor() as u64;
        let received_tax = (raw_amount as f64 * RECIPIENT_TAX_RATE).floor() as u64;

        Some(Self {
            raw_amount,
            account_tax,
            received_tax,
            total_needed: raw_amount.checked_add(account_tax)?,
            recipient_amount: raw_amount.checked_sub(received_tax)?,
        })
    }

    /// What the treasury collects from this transfer.
    pub fn treasury_total(&self) -> u64 {
        self.account_tax + self.received_tax
    }
}

/// Converts base units of the settlement token back to a UI amount.
pub fn to_ui_amount(raw: u64) -> f64 {
    raw as f64 / 10f64.powi(TOKEN_DECIMALS as i32)
}

pub fn sol_to_lamports(sol: f64) -> u64 {
    (sol * LAMPORTS_PER_SOL as f64).floor() as u64
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Spreads the SOL fee budget over the compute unit limit, in micro-lamports per unit.
pub fn priority_fee_micro_lamports(sol_fee: f64) -> u64 {
    let total_lamports = sol_to_lamports(sol_fee) as u128;
    (total_lamports * 1_000_000 / COMPUTE_UNIT_LIMIT as u128) as u64
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRecord {
    pub id: String,
}

/// Agent wallet as persisted; the private key is encrypted at rest.
#[derive(Debug, Clone)]
pub struct AgentWallet {
    pub agent_id: String,
    pub public_key: String,
    pub encrypted_private_key: String,
    pub iv: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Completed,
    Failed,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Completed => "completed",
            SettlementStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SettlementStatus::Pending),
            "completed" => Ok(SettlementStatus::Completed),
            "failed" => Ok(SettlementStatus::Failed),
            other => Err(anyhow::anyhow!("unknown settlement status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewSettlement {
    pub agent_id: String,
    pub transaction_hash: String,
    pub amount: f64,
    pub recipient: String,
    pub status: SettlementStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementRecord {
    pub id: i64,
    pub agent_id: String,
    pub transaction_hash: String,
    pub amount: f64,
    pub recipient: String,
    pub status: SettlementStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hundred_tokens_are_taxed_both_ways() {
        let plan = TaxPlan::for_amount(100.0).unwrap();
        assert_eq!(plan.raw_amount, 100_000_000);
        assert_eq!(plan.account_tax, 2_000_000);
        assert_eq!(plan.received_tax, 2_000_000);
        assert_eq!(plan.total_needed, 102_000_000);
        assert_eq!(plan.recipient_amount, 98_000_000);
        assert_eq!(plan.treasury_total(), 4_000_000);
    }

    #[test]
    fn fractional_amounts_floor_each_step() {
        let plan = TaxPlan::for_amount(0.015_625).unwrap();
        assert_eq!(plan.raw_amount, 15_625);
        // floor(15_625 * 0.02) = floor(312.5)
        assert_eq!(plan.account_tax, 312);
        assert_eq!(plan.received_tax, 312);
        assert_eq!(plan.total_needed, 15_937);
        assert_eq!(plan.recipient_amount, 15_313);
    }

    #[test]
    fn tiny_amounts_pay_no_tax() {
        // 2^-15 tokens is 30.5 base units
        let plan = TaxPlan::for_amount(0.000_030_517_578_125).unwrap();
        assert_eq!(plan.raw_amount, 30);
        assert_eq!(plan.account_tax, 0);
        assert_eq!(plan.recipient_amount, 30);
    }

    #[test]
    fn amounts_beyond_u64_base_units_have_no_plan() {
        assert!(TaxPlan::for_amount(1e14).is_none());
        assert!(TaxPlan::for_amount(f64::MAX).is_none());
        assert!(TaxPlan::for_amount(f64::NAN).is_none());
        // fits as raw units, but the 2% on top does not
        assert!(TaxPlan::for_amount(18_400_000_000_000.0).is_none());
        assert!(TaxPlan::for_amount(1e12).is_some());
    }

    #[test]
    fn ui_amount_inverts_raw_amount() {
        assert_eq!(to_ui_amount(12_500_000), 12.5);
    }

    #[test]
    fn priority_fee_spreads_budget_over_compute_units() {
        // 0.006 SOL = 6_000_000 lamports; * 1e6 / 600_000 = 10_000_000 micro-lamports per unit
        assert_eq!(priority_fee_micro_lamports(0.006), 10_000_000);
        assert_eq!(priority_fee_micro_lamports(0.0), 0);
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            SettlementStatus::Pending,
            SettlementStatus::Completed,
            SettlementStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SettlementStatus>().unwrap(), status);
        }
        assert!("done".parse::<SettlementStatus>().is_err());
    }
}
