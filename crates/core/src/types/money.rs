//! Monetary amounts using decimal arithmetic.
//!
//! The marketplace trades in a single currency, so a `Money` is just a
//! non-negative decimal with at most two fractional digits, no larger than
//! [`Money::MAX`] (the range of a `NUMERIC(14, 2)` column). It serializes as
//! a string (`"19.99"`) and accepts either strings or JSON numbers on input.
//!
//! Arithmetic is checked: sums and products past `MAX` are
//! [`MoneyError::Overflow`], never a panic.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};

/// Errors that can occur when constructing [`Money`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount is below zero.
    #[error("amount cannot be negative")]
    Negative,
    /// The amount has more than two decimal places.
    #[error("amount must have at most {max} decimal places")]
    TooPrecise {
        /// Maximum allowed scale.
        max: u32,
    },
    /// The amount, or the result of arithmetic, is above [`Money::MAX`].
    #[error("amount is too large")]
    Overflow,
}

/// A non-negative amount of money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(try_from = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Maximum number of fractional digits.
    pub const SCALE: u32 = 2;

    /// Zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Largest representable amount: 999,999,999,999.99.
    // 99_999_999_999_999 with scale 2 (`Decimal::new` is not const).
    pub const MAX: Self = Self(Decimal::from_parts(276_447_231, 23_283, 0, false, 2));

    /// Create a `Money` from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is negative, has more than two
    /// decimal places or is above [`Money::MAX`].
    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }
        let normalized = amount.normalize();
        if normalized.scale() > Self::SCALE {
            return Err(MoneyError::TooPrecise { max: Self::SCALE });
        }
        Self::bounded(normalized)
    }

    fn bounded(amount: Decimal) -> Result<Self, MoneyError> {
        if amount > Self::MAX.0 {
            return Err(MoneyError::Overflow);
        }
        Ok(Self(amount))
    }

    /// Create a `Money` from a whole number of cents.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Negative`] for negative input.
    pub fn from_cents(cents: i64) -> Result<Self, MoneyError> {
        Self::new(Decimal::new(cents, Self::SCALE))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// Whether the amount is exactly zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Multiply by a quantity.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] if the product is above `MAX`.
    pub fn times(self, quantity: u32) -> Result<Self, MoneyError> {
        let product = self
            .0
            .checked_mul(Decimal::from(quantity))
            .ok_or(MoneyError::Overflow)?;
        Self::bounded(product)
    }

    /// Add two amounts.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] if the sum is above `MAX`.
    pub fn checked_add(self, other: Self) -> Result<Self, MoneyError> {
        let sum = self.0.checked_add(other.0).ok_or(MoneyError::Overflow)?;
        Self::bounded(sum)
    }

    /// Sum a sequence of amounts.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] as soon as the running total passes
    /// `MAX`.
    pub fn total<I: IntoIterator<Item = Self>>(amounts: I) -> Result<Self, MoneyError> {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, Self::checked_add)
    }

    /// Subtract, returning `None` if the result would be negative.
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        let diff = self.0.checked_sub(other.0)?;
        if diff.is_sign_negative() && !diff.is_zero() {
            None
        } else {
            Some(Self(diff))
        }
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(amount)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
