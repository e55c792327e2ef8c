//! Fare arithmetic on `rust_decimal`.
//!
//! All amounts are rounded to cents with `MidpointAwayFromZero`, so 0.005
//! becomes 0.01. No `f64` anywhere.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of decimal places kept for money.
pub const MONEY_SCALE: u32 = 2;

/// Round an amount to cents.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// An amount left the range `Decimal` can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{what} overflows the representable money range")]
pub struct AmountOverflow {
    pub what: &'static str,
}

/// `round(amount * rate)`, or `AmountOverflow` naming `what`.
pub(crate) fn rounded_product(
    amount: Decimal,
    rate: Decimal,
    what: &'static str,
) -> Result<Decimal, AmountOverflow> {
    amount
        .checked_mul(rate)
        .map(round_money)
        .ok_or(AmountOverflow { what })
}

/// Platform commission taken from a completed ride's price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicy {
    pub platform_fee_rate: Decimal,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            platform_fee_rate: Decimal::new(15, 2),
        }
    }
}

/// The platform/driver split persisted at completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialSplit {
    pub platform_fee: Decimal,
    pub driver_amount: Decimal,
}

impl FeePolicy {
    /// `platform_fee = round(price * rate)`, `driver_amount = round(price - platform_fee)`.
    ///
    /// The driver amount is derived from the already-rounded fee so the two
    /// parts always add back up to the (rounded) price.
    pub fn split(&self, price: Decimal) -> Result<FinancialSplit, AmountOverflow> {
        let platform_fee = rounded_product(price, self.platform_fee_rate, "platform fee")?;
        let driver_amount = price
            .checked_sub(platform_fee)
            .map(round_money)
            .ok_or(AmountOverflow {
                what: "driver amount",
            })?;
        Ok(FinancialSplit {
            platform_fee,
            driver_amount,
        })
    }
}
