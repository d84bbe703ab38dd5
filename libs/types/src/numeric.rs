//! Fixed-point numeric types for prices and quantities
//!
//! All core arithmetic runs on 64-bit signed tick counts at scale 10⁻⁸.
//! Decimal strings cross the JSON boundary through `rust_decimal`, so any
//! value with at most 8 fractional digits round-trips exactly.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;
use thiserror::Error;

/// Fractional digits carried by one tick.
pub const SCALE: u32 = 8;

/// Ticks per whole unit (10⁸).
pub const TICKS_PER_UNIT: i64 = 100_000_000;

/// Errors converting between decimal strings and tick counts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumericError {
    #[error("malformed decimal: {0}")]
    Malformed(String),

    #[error("more than {SCALE} fractional digits")]
    TooPrecise,

    #[error("value out of range for 64-bit ticks")]
    OutOfRange,

    #[error("price must be positive")]
    NonPositivePrice,

    #[error("quantity cannot be negative")]
    NegativeQuantity,
}

fn decimal_to_ticks(value: Decimal) -> Result<i64, NumericError> {
    let value = value.normalize();
    if value.scale() > SCALE {
        return Err(NumericError::TooPrecise);
    }
    value
        .checked_mul(Decimal::from(TICKS_PER_UNIT))
        .and_then(|scaled| scaled.to_i64())
        .ok_or(NumericError::OutOfRange)
}

fn ticks_to_decimal(ticks: i64) -> Decimal {
    Decimal::from_i128_with_scale(ticks as i128, SCALE).normalize()
}

/// Price as a positive tick count.
///
/// Level keys and all price comparisons use the integer representation.
/// Serialized as a decimal string to prevent JSON number precision loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(i64);

impl Price {
    /// Create from a raw tick count. Returns `None` unless positive.
    pub fn from_ticks(ticks: i64) -> Option<Self> {
        (ticks > 0).then_some(Self(ticks))
    }

    /// Create from whole units (for tests/convenience).
    pub fn from_units(units: i64) -> Self {
        assert!(units > 0, "price must be positive");
        Self(units * TICKS_PER_UNIT)
    }

    /// Raw tick count.
    pub fn ticks(&self) -> i64 {
        self.0
    }

    /// Decimal view for notional math and rendering.
    pub fn as_decimal(&self) -> Decimal {
        ticks_to_decimal(self.0)
    }
}

impl FromStr for Price {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value =
            Decimal::from_str(s).map_err(|_| NumericError::Malformed(s.to_string()))?;
        let ticks = decimal_to_ticks(value)?;
        Self::from_ticks(ticks).ok_or(NumericError::NonPositivePrice)
    }
}

impl Serialize for Price {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_decimal())
    }
}

/// Quantity as a non-negative tick count.
///
/// Zero is a legal value (the filled quantity of a fresh order). Arithmetic
/// that would go negative panics, mirroring the overfill guards on the
/// order lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(i64);

impl Quantity {
    /// Create from a raw tick count. Returns `None` if negative.
    pub fn from_ticks(ticks: i64) -> Option<Self> {
        (ticks >= 0).then_some(Self(ticks))
    }

    /// Create from whole units (for tests/convenience).
    pub fn from_units(units: i64) -> Self {
        assert!(units >= 0, "quantity cannot be negative");
        Self(units * TICKS_PER_UNIT)
    }

    /// The zero quantity.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Raw tick count.
    pub fn ticks(&self) -> i64 {
        self.0
    }

    /// Decimal view for notional math and rendering.
    pub fn as_decimal(&self) -> Decimal {
        ticks_to_decimal(self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0).max(0))
    }
}

impl Add for Quantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.checked_add(rhs.0).expect("quantity overflow"))
    }
}

impl Sub for Quantity {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        assert!(self.0 >= rhs.0, "quantity subtraction would go negative");
        Self(self.0 - rhs.0)
    }
}

impl FromStr for Quantity {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value =
            Decimal::from_str(s).map_err(|_| NumericError::Malformed(s.to_string()))?;
        let ticks = decimal_to_ticks(value)?;
        Self::from_ticks(ticks).ok_or(NumericError::NegativeQuantity)
    }
}

impl Serialize for Quantity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_decimal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_from_str_exact() {
        let price: Price = "50000.25".parse().unwrap();
        assert_eq!(price.ticks(), 5_000_025_000_000);
        assert_eq!(price.to_string(), "50000.25");
    }

    #[test]
    fn test_price_eight_fractional_digits_roundtrip() {
        let price: Price = "0.00000001".parse().unwrap();
        assert_eq!(price.ticks(), 1);
        assert_eq!(price.to_string(), "0.00000001");
    }

    #[test]
    fn test_price_rejects_excess_precision() {
        let err = "0.000000001".parse::<Price>().unwrap_err();
        assert_eq!(err, NumericError::TooPrecise);
    }

    #[test]
    fn test_price_trailing_zeros_allowed() {
        let price: Price = "1.500000000".parse().unwrap();
        assert_eq!(price.ticks(), 150_000_000);
    }

    #[test]
    fn test_price_rejects_zero_and_negative() {
        assert_eq!(
            "0".parse::<Price>().unwrap_err(),
            NumericError::NonPositivePrice
        );
        assert_eq!(
            "-1".parse::<Price>().unwrap_err(),
            NumericError::NonPositivePrice
        );
    }

    #[test]
    fn test_price_serialization_as_string() {
        let price = Price::from_units(50000);
        let json = serde_json::to_string(&price).unwrap();
        assert_eq!(json, "\"50000\"");

        let back: Price = serde_json::from_str(&json).unwrap();
        assert_eq!(price, back);
    }

    #[test]
    fn test_price_ordering_by_ticks() {
        let low: Price = "49999.99999999".parse().unwrap();
        let high = Price::from_units(50000);
        assert!(low < high);
    }

    #[test]
    fn test_quantity_zero() {
        let qty = Quantity::zero();
        assert!(qty.is_zero());
        assert_eq!(qty.to_string(), "0");
    }

    #[test]
    fn test_quantity_arithmetic() {
        let a: Quantity = "2.5".parse().unwrap();
        let b: Quantity = "1.5".parse().unwrap();

        assert_eq!((a + b).to_string(), "4");
        assert_eq!((a - b).to_string(), "1");
    }

    #[test]
    #[should_panic(expected = "quantity subtraction would go negative")]
    fn test_quantity_negative_subtraction_panics() {
        let a: Quantity = "1.0".parse().unwrap();
        let b: Quantity = "2.0".parse().unwrap();
        let _ = a - b;
    }

    #[test]
    fn test_quantity_saturating_sub() {
        let a: Quantity = "1.0".parse().unwrap();
        let b: Quantity = "2.0".parse().unwrap();
        assert!(a.saturating_sub(b).is_zero());
    }

    #[test]
    fn test_quantity_rejects_negative() {
        assert_eq!(
            "-0.5".parse::<Quantity>().unwrap_err(),
            NumericError::NegativeQuantity
        );
    }

    #[test]
    fn test_quantity_serialization_roundtrip() {
        let qty: Quantity = "0.40000000".parse().unwrap();
        let json = serde_json::to_string(&qty).unwrap();
        assert_eq!(json, "\"0.4\"");

        let back: Quantity = serde_json::from_str(&json).unwrap();
        assert_eq!(qty, back);
    }

    #[test]
    fn test_notional_math_is_deterministic() {
        let price: Price = "50000.98765432".parse().unwrap();
        let qty: Quantity = "0.12345678".parse().unwrap();

        let first = price.as_decimal() * qty.as_decimal();
        let second = price.as_decimal() * qty.as_decimal();
        assert_eq!(first, second);
    }
}
