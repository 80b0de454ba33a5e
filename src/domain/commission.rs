//! Marketplace commission math.
//!
//! All SOL amounts are carried as `f64` and rounded to 6 decimals, which is the precision the
//! marketplace records and displays.

use serde::Serialize;
use utoipa::ToSchema;

/// The platform keeps a fixed 10% of every marketplace sale.
pub const PLATFORM_COMMISSION_RATE: f64 = 0.1;

/// Maximum drift tolerated between a recorded split and the recomputed one.
pub const COMMISSION_EPSILON: f64 = 0.000_001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    pub platform_fee: f64,
    pub seller_amount: f64,
    pub total_amount: f64,
    pub commission_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommissionBreakdown {
    pub total: String,
    pub platform_fee: String,
    pub seller_amount: String,
    pub commission_percentage: String,
    pub raw: RawBreakdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawBreakdown {
    pub total: f64,
    pub platform_fee: f64,
    pub seller_amount: f64,
}

/// Rounds to 6 decimal places, half away from zero.
pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Splits a SOL amount into the platform fee and the seller's share.
pub fn calculate_commission(amount: f64) -> Commission {
    let platform_fee = round6(amount * PLATFORM_COMMISSION_RATE);
    let seller_amount = round6(amount - platform_fee);

    Commission {
        platform_fee,
        seller_amount,
        total_amount: amount,
        commission_rate: PLATFORM_COMMISSION_RATE,
    }
}

/// Re-derives the expected split for `amount` and checks a recorded one against it.
pub fn validate_commission_calculation(amount: f64, platform_fee: f64, seller_amount: f64) -> bool {
    let expected = calculate_commission(amount);

    let fee_match = (platform_fee - expected.platform_fee).abs() < COMMISSION_EPSILON;
    let seller_match = (seller_amount - expected.seller_amount).abs() < COMMISSION_EPSILON;
    let total_match = ((platform_fee + seller_amount) - amount).abs() < COMMISSION_EPSILON;

    fee_match && seller_match && total_match
}

/// Formats a SOL amount, picking more decimals for smaller values unless `force_decimals` is set.
pub fn format_sol_amount(amount: f64, force_decimals: Option<usize>) -> String {
    if amount == 0.0 {
        return "0 SOL".to_string();
    }

    let decimals = force_decimals.unwrap_or(if amount < 0.0001 {
        8
    } else if amount < 0.01 {
        6
    } else {
        4
    });

    format!("{:.*} SOL", decimals, amount)
}

pub fn commission_breakdown(amount: f64) -> CommissionBreakdown {
    let Commission {
        platform_fee,
        seller_amount,
        ..
    } = calculate_commission(amount);

    CommissionBreakdown {
        total: format_sol_amount(amount, None),
        platform_fee: format_sol_amount(platform_fee, None),
        seller_amount: format_sol_amount(seller_amount, None),
        commission_percentage: format!("{:.1}%", PLATFORM_COMMISSION_RATE * 100.0),
        raw: RawBreakdown {
            total: amount,
            platform_fee,
            seller_amount,
        },
    }
}
