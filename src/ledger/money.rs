//! Fixed-point USDT amounts. Two decimals, half-even rounding (§6).

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// Platform commission rate (§6 "Settlement constants").
pub const COMMISSION_RATE: Decimal = Decimal::from_parts(3, 0, 0, false, 2); // 0.03
/// Flat withdrawal fee.
pub const WITHDRAW_FEE: Decimal = Decimal::from_parts(50, 0, 0, false, 2); // 0.50
/// Withdrawals above this amount require admin approval.
pub const WITHDRAW_APPROVAL_THRESHOLD: Decimal = Decimal::from_parts(50000, 0, 0, false, 2); // 500.00

/// A non-negative or signed two-decimal USDT amount.
///
/// Wraps [`Decimal`] rather than a raw type so every quantity flowing through
/// the ledger is forced through [`Money::round2`] at the boundary where it is
/// computed, instead of accumulating float drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn from_decimal(d: Decimal) -> Self {
        Money(round2(d))
    }

    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, 2))
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// `self * rate`, rounded half-even to two decimals.
    pub fn mul_rate(self, rate: Decimal) -> Money {
        Money::from_decimal(self.0 * rate)
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money::from_decimal)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money::from_decimal)
    }
}

/// Round half-even ("banker's rounding") to two decimal places.
fn round2(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money::from_decimal(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money::from_decimal(self.0 - rhs.0)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl std::str::FromStr for Money {
    type Err = rust_decimal::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Decimal>().map(Money::from_decimal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commission_rounds_half_even() {
        // subtotal=10.00 -> commission=0.30 (S1)
        let subtotal = Money::from_cents(1000);
        assert_eq!(subtotal.mul_rate(COMMISSION_RATE), Money::from_cents(30));
    }

    #[test]
    fn partial_60_percent_of_s1() {
        // S3: payout=6.00, commission=0.18
        let subtotal = Money::from_cents(1000);
        let payout = subtotal.mul_rate(Decimal::new(60, 2));
        assert_eq!(payout, Money::from_cents(600));
        assert_eq!(payout.mul_rate(COMMISSION_RATE), Money::from_cents(18));
    }

    #[test]
    fn half_even_tie_breaks_to_even_cent() {
        // 0.125 rounds to 0.12 (even), not 0.13
        let m = Money::from_decimal(Decimal::new(125, 3));
        assert_eq!(m, Money::from_cents(12));
        // 0.135 rounds to 0.14 (even)
        let m = Money::from_decimal(Decimal::new(135, 3));
        assert_eq!(m, Money::from_cents(14));
    }

    #[test]
    fn display_always_shows_two_decimals() {
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
    }
}
