use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};

use crate::allocation::AllocationError;

/// Converts a decimal currency amount to integer cents, rounding half away from zero.
pub fn to_cents(amount: Decimal) -> Result<i64, AllocationError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| AllocationError::InvalidInput(format!("amount {amount} overflows cents")))
}

/// Boundary conversion for callers holding floating-point currency values.
pub fn to_cents_f64(amount: f64) -> Result<i64, AllocationError> {
    if !amount.is_finite() {
        return Err(AllocationError::InvalidInput(format!(
            "amount {amount} is not a finite number"
        )));
    }
    let decimal = Decimal::from_f64(amount)
        .ok_or_else(|| AllocationError::InvalidInput(format!("amount {amount} out of range")))?;
    to_cents(decimal)
}

/// Exact inverse of [`to_cents`] in decimal; display precision is the caller's concern.
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub fn to_cents(self) -> i64 {
        self.0
    }

    pub fn from_decimal(decimal: Decimal) -> Result<Self, AllocationError> {
        to_cents(decimal).map(Money)
    }

    pub fn to_decimal(self) -> Decimal {
        from_cents(self.0)
    }

    pub fn zero() -> Self {
        Money(0)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

// Operators saturate at the i64 bounds; use the checked methods to detect it.
impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(self.0.saturating_neg())
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |a, b| a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn to_cents_plain() {
        assert_eq!(to_cents(dec("12.34")).unwrap(), 1234);
        assert_eq!(to_cents(dec("0")).unwrap(), 0);
    }

    #[test]
    fn to_cents_rounds_half_away_from_zero() {
        assert_eq!(to_cents(dec("0.005")).unwrap(), 1);
        assert_eq!(to_cents(dec("-0.005")).unwrap(), -1);
        assert_eq!(to_cents(dec("1.004")).unwrap(), 100);
        assert_eq!(to_cents(dec("2.675")).unwrap(), 268);
    }

    #[test]
    fn to_cents_f64_rejects_non_finite() {
        assert!(to_cents_f64(f64::NAN).is_err());
        assert!(to_cents_f64(f64::INFINITY).is_err());
        assert_eq!(to_cents_f64(19.99).unwrap(), 1999);
    }

    #[test]
    fn from_cents_is_exact() {
        assert_eq!(from_cents(1999), dec("19.99"));
        assert_eq!(from_cents(-5), dec("-0.05"));
        assert_eq!(to_cents(from_cents(123_456_789)).unwrap(), 123_456_789);
    }

    #[test]
    fn money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "$12.34");
        assert_eq!(Money::from_cents(-5).to_string(), "-$0.05");
        assert_eq!(Money::zero().to_string(), "$0.00");
    }

    #[test]
    fn money_sum() {
        let total: Money = [100, 250, -50].into_iter().map(Money::from_cents).sum();
        assert_eq!(total.to_cents(), 300);
    }

    #[test]
    fn money_arithmetic_saturates() {
        let max = Money::from_cents(i64::MAX);
        let one = Money::from_cents(1);
        assert_eq!(max + one, max);
        assert_eq!(Money::from_cents(i64::MIN) - one, Money::from_cents(i64::MIN));
        assert_eq!(-Money::from_cents(i64::MIN), max);
        assert_eq!(max.checked_add(one), None);
        assert_eq!(one.checked_sub(one), Some(Money::zero()));
    }
}
