//! Sale domain values shared by the allocator, the payment lifecycle and the aggregates.

use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Fixed-point monetary amount stored as whole cents.
///
/// Every amount entering the system goes through [`Money::from_decimal`], which rounds to two
/// decimal places once. Sums of `Money` are exact integer additions, so aggregates are
/// independent of the order in which they are accumulated.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

/// Failure raised when a decimal amount cannot be represented in cents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("amount `{0}` is out of range")]
pub struct MoneyOutOfRange(pub Decimal);

impl Money {
    /// Zero amount.
    pub const ZERO: Money = Money(0);

    /// Build an amount from whole cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Amount expressed in whole cents.
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Normalise a decimal amount to cents, rounding half away from zero.
    pub fn from_decimal(value: Decimal) -> Result<Self, MoneyOutOfRange> {
        let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        rounded
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|cents| cents.to_i64())
            .map(Self)
            .ok_or(MoneyOutOfRange(value))
    }

    /// Decimal representation with exactly two fractional digits.
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Multiply a unit price by a quantity, `None` on overflow.
    pub fn checked_mul(self, quantity: u32) -> Option<Self> {
        self.0.checked_mul(i64::from(quantity)).map(Self)
    }

    /// Sum of two amounts, `None` on overflow.
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Percentage of this amount, rounded to the cent.
    pub fn percentage(self, percent: Decimal) -> Result<Self, MoneyOutOfRange> {
        self.to_decimal()
            .checked_mul(percent)
            .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
            .ok_or(MoneyOutOfRange(percent))
            .and_then(Self::from_decimal)
    }

    /// Split the amount into `parts` shares that sum back to the original.
    ///
    /// Leftover cents go one each to the leading shares.
    pub fn split(self, parts: u32) -> Vec<Self> {
        if parts == 0 {
            return Vec::new();
        }
        let parts_i64 = i64::from(parts);
        let base = self.0.div_euclid(parts_i64);
        let remainder = self.0.rem_euclid(parts_i64);
        (0..parts_i64)
            .map(|index| Self(base + i64::from(index < remainder)))
            .collect()
    }

    /// Whether the amount is strictly positive.
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

/// Category of a completed sale; each category owns one global counter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Split The Pot batch purchase.
    Raffle,
    /// Per-number Rolex raffle ticket.
    RolexRaffle,
    /// One-off donation.
    Donation,
    /// Sale recorded by an administrator outside the payment flow.
    Manual,
}

impl EntryType {
    /// Every category, in counter order.
    pub const ALL: [EntryType; 4] = [
        EntryType::Raffle,
        EntryType::RolexRaffle,
        EntryType::Donation,
        EntryType::Manual,
    ];

    /// Stable tag used in storage and gateway metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Raffle => "raffle",
            EntryType::RolexRaffle => "rolex_raffle",
            EntryType::Donation => "donation",
            EntryType::Manual => "manual",
        }
    }

    /// Identifier of the global counter document for this category.
    pub fn counter_id(self) -> &'static str {
        match self {
            EntryType::Raffle => "raffle_totals",
            EntryType::RolexRaffle => "rolex_raffle_totals",
            EntryType::Donation => "donation_totals",
            EntryType::Manual => "manual_totals",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown category tag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown entry type `{0}`")]
pub struct UnknownEntryType(pub String);

impl FromStr for EntryType {
    type Err = UnknownEntryType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EntryType::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == value)
            .ok_or_else(|| UnknownEntryType(value.to_owned()))
    }
}

/// Identity of the person paying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaserInfo {
    /// Full name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Optional phone number.
    #[serde(default)]
    pub phone: Option<String>,
}

/// Terms of a sale frozen when the payment intent is created.
///
/// The webhook handler materialises entries from this snapshot only, never from amounts
/// echoed back by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTerms {
    /// Sale category.
    pub entry_type: EntryType,
    /// Tickets sold; 1 for donations.
    pub quantity: u32,
    /// Fee-excluded amount, the only value that feeds aggregates.
    pub base_amount: Money,
    /// Fee-inclusive amount requested from the gateway.
    pub charged_amount: Money,
    /// Referral code given by the buyer.
    pub referral_code: Option<String>,
    /// Buyer contact details.
    pub purchaser: PurchaserInfo,
    /// Reserved ticket number for single-slot Rolex purchases.
    pub ticket_number: Option<u32>,
    /// Provenance tag.
    pub source_app: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn from_decimal_rounds_half_away_from_zero() {
        assert_eq!(Money::from_decimal(dec!(10.005)).unwrap().cents(), 1001);
        assert_eq!(Money::from_decimal(dec!(10.004)).unwrap().cents(), 1000);
        assert_eq!(Money::from_decimal(dec!(-0.015)).unwrap().cents(), -2);
    }

    #[test]
    fn oversized_decimals_are_out_of_range() {
        assert_eq!(
            Money::from_decimal(Decimal::MAX),
            Err(MoneyOutOfRange(Decimal::MAX))
        );
        assert_eq!(
            Money::from_decimal(Decimal::MIN),
            Err(MoneyOutOfRange(Decimal::MIN))
        );
        assert!(Money::from_cents(i64::MAX).percentage(Decimal::MAX).is_err());
        assert_eq!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)), None);
    }

    #[test]
    fn ten_thousand_dimes_sum_exactly() {
        let dime = Money::from_decimal(dec!(0.10)).unwrap();
        let total: Money = std::iter::repeat_n(dime, 10_000).sum();
        assert_eq!(total.to_decimal(), dec!(1000.00));
        assert_eq!(total.to_string(), "1000.00");
    }

    #[test]
    fn split_hands_remainder_to_leading_shares() {
        let shares = Money::from_cents(1000).split(3);
        assert_eq!(
            shares,
            vec![
                Money::from_cents(334),
                Money::from_cents(333),
                Money::from_cents(333)
            ]
        );
        assert_eq!(shares.into_iter().sum::<Money>(), Money::from_cents(1000));
        assert!(Money::from_cents(10).split(0).is_empty());
    }

    #[test]
    fn percentage_rounds_to_cent() {
        let base = Money::from_cents(5000);
        assert_eq!(base.percentage(dec!(4)).unwrap(), Money::from_cents(200));
        assert_eq!(
            Money::from_cents(333).percentage(dec!(2.9)).unwrap(),
            Money::from_cents(10)
        );
    }

    #[test]
    fn entry_type_tags_are_snake_case() {
        let json = serde_json::to_string(&EntryType::RolexRaffle).unwrap();
        assert_eq!(json, "\"rolex_raffle\"");
        assert_eq!(EntryType::RolexRaffle.as_str(), "rolex_raffle");
        assert_eq!(EntryType::Raffle.counter_id(), "raffle_totals");
        assert_eq!("donation".parse::<EntryType>(), Ok(EntryType::Donation));
        assert!("spin".parse::<EntryType>().is_err());
    }
}
