//! Commission split applied when a task is completed.

use serde::{Deserialize, Serialize};

/// Commission percentage for verified freelancers.
pub const VERIFIED_COMMISSION_PCT: i64 = 10;
/// Commission percentage for freelancers who have not completed verification.
pub const UNVERIFIED_COMMISSION_PCT: i64 = 50;
/// Largest budget a task may carry, in minor units.
pub const MAX_BUDGET: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentBreakdown {
    pub total: i64,
    pub commission_rate: i64,
    pub commission_amount: i64,
    pub freelancer_amount: i64,
}

pub fn commission_rate(is_verified: bool) -> i64 {
    if is_verified {
        VERIFIED_COMMISSION_PCT
    } else {
        UNVERIFIED_COMMISSION_PCT
    }
}

/// Split `total` (minor units). The commission rounds down, so the freelancer
/// never receives less than their exact share.
pub fn breakdown(total: i64, commission_rate: i64) -> PaymentBreakdown {
    let wide = i128::from(total) * i128::from(commission_rate) / 100;
    let commission_amount = narrow(wide);
    PaymentBreakdown {
        total,
        commission_rate,
        commission_amount,
        freelancer_amount: narrow(i128::from(total) - wide),
    }
}

fn narrow(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}
