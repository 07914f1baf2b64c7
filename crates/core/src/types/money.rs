//! Integer money amounts.
//!
//! All amounts are stored and computed as integer minor units (bani for MDL).
//! Decimal values only exist at the edges: JSON `price`/`total` fields and
//! email text.

use core::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// ISO 4217 code of the shop currency.
pub const CURRENCY_CODE: &str = "MDL";

/// Errors from money arithmetic and conversion.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoneyError {
    /// The result does not fit in an `i64` number of cents.
    #[error("amount overflow")]
    Overflow,
    /// A negative quantity was used as a multiplier.
    #[error("quantity cannot be negative")]
    NegativeQuantity,
}

/// An amount of money in cents.
///
/// ```
/// use simonia_core::Money;
///
/// let unit = Money::from_cents(35_000);
/// let line = unit.checked_mul(3).unwrap();
/// assert_eq!(line.cents(), 105_000);
/// assert_eq!(line.to_string(), "1050.00 MDL");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Create an amount from cents.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Convert a decimal amount (e.g. `350.5`) to cents, rounding half to even.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] when the value does not fit.
    pub fn from_decimal(amount: Decimal) -> Result<Self, MoneyError> {
        let cents = amount
            .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|d| d.to_i64())
            .ok_or(MoneyError::Overflow)?;
        Ok(Self(cents))
    }

    /// Amount in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Amount as a two-decimal value in the main unit.
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Whether the amount is strictly positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Add two amounts.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] on overflow.
    pub const fn checked_add(self, other: Self) -> Result<Self, MoneyError> {
        match self.0.checked_add(other.0) {
            Some(cents) => Ok(Self(cents)),
            None => Err(MoneyError::Overflow),
        }
    }

    /// Multiply a unit price by a quantity.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::NegativeQuantity`] for negative quantities and
    /// [`MoneyError::Overflow`] on overflow.
    pub fn checked_mul(self, quantity: i32) -> Result<Self, MoneyError> {
        if quantity < 0 {
            return Err(MoneyError::NegativeQuantity);
        }
        self.0
            .checked_mul(i64::from(quantity))
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }

    /// Sum an iterator of amounts.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] if any partial sum overflows.
    pub fn checked_sum<I>(amounts: I) -> Result<Self, MoneyError>
    where
        I: IntoIterator<Item = Self>,
    {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, amount| acc.checked_add(amount))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {CURRENCY_CODE}", self.to_decimal())
    }
}

impl From<i64> for Money {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl From<Money> for i64 {
    fn from(money: Money) -> Self {
        money.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let cents = <i64 as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(cents))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <i64 as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_to_decimal_keeps_two_places() {
        assert_eq!(Money::from_cents(35_000).to_decimal().to_string(), "350.00");
        assert_eq!(Money::from_cents(5).to_decimal().to_string(), "0.05");
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(123_450).to_string(), "1234.50 MDL");
    }

    #[test]
    fn test_checked_mul() {
        let unit = Money::from_cents(1_999);
        assert_eq!(unit.checked_mul(0).unwrap(), Money::ZERO);
        assert_eq!(unit.checked_mul(3).unwrap().cents(), 5_997);
        assert_eq!(unit.checked_mul(-1), Err(MoneyError::NegativeQuantity));
        assert_eq!(
            Money::from_cents(i64::MAX).checked_mul(2),
            Err(MoneyError::Overflow)
        );
    }

    #[test]
    fn test_checked_sum() {
        let lines = [
            Money::from_cents(35_000).checked_mul(2).unwrap(),
            Money::from_cents(160_000).checked_mul(1).unwrap(),
        ];
        assert_eq!(Money::checked_sum(lines).unwrap().cents(), 230_000);
        assert_eq!(Money::checked_sum(Vec::<Money>::new()).unwrap(), Money::ZERO);
        assert_eq!(
            Money::checked_sum([Money::from_cents(i64::MAX), Money::from_cents(1)]),
            Err(MoneyError::Overflow)
        );
    }

    #[test]
    fn test_from_decimal_rounds_half_even() {
        let d = |s: &str| Decimal::from_str(s).unwrap();
        assert_eq!(Money::from_decimal(d("350")).unwrap().cents(), 35_000);
        assert_eq!(Money::from_decimal(d("19.999")).unwrap().cents(), 2_000);
        assert_eq!(Money::from_decimal(d("0.125")).unwrap().cents(), 12);
        assert_eq!(Money::from_decimal(d("0.135")).unwrap().cents(), 14);
    }

    #[test]
    fn test_serde_is_cents() {
        assert_eq!(serde_json::to_string(&Money::from_cents(42)).unwrap(), "42");
    }
}
